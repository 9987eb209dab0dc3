pub mod ai;
pub mod config;
pub mod conversation;
pub mod error;
pub mod provider;
pub mod session;
pub mod state;

// Re-export main types for convenience
pub use ai::{available_models, build_client, ClaudeClient, CompletionClient, GeminiClient, OllamaClient, OpenAIClient};
pub use config::Config;
pub use conversation::{ChatMode, Conversation, ModeKind, Script, SessionState, Snapshot, SubmitOutcome};
pub use error::CompletionError;
pub use provider::Provider;
pub use session::{Backend, ChatSession};
pub use state::{interleave, Sender, Utterance};
