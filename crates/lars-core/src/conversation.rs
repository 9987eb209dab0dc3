//! The conversation state machine
//!
//! [`Conversation`] owns the two message sequences and the session state.
//! It never performs I/O: a submit that needs the model returns
//! [`SubmitOutcome::Dispatched`] with the prompt, and whoever runs the call
//! hands the result back through [`Conversation::settle`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CompletionError;
use crate::state::{interleave, Utterance};

/// Fixed bot texts used by the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub greeting: String,
    /// Reply to every message in the scripted variant
    pub scripted_reply: String,
    pub access_granted: String,
    pub access_denied: String,
    /// Shown while a model call is outstanding
    pub placeholder: String,
    /// Used when the model answers with nothing
    pub empty_fallback: String,
    pub failure_notice: String,
    /// Prepended to every user message sent to the model
    pub instruction: String,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            greeting: "Hallo! Ik ben Lars, jouw persoonlijke chatbot. Waar kan ik je mee helpen"
                .to_string(),
            scripted_reply: "Daar moet ik nog even over nadenken.".to_string(),
            access_granted: "Wachtwoord klopt! Je kunt me nu alles vragen.".to_string(),
            access_denied: "Dat is niet het juiste wachtwoord. Probeer het nog eens.".to_string(),
            placeholder: "Lars is aan het typen...".to_string(),
            empty_fallback: "Sorry, daar heb ik geen antwoord op.".to_string(),
            failure_notice: "Er ging iets mis bij het ophalen van een antwoord.".to_string(),
            instruction: "Je bent Lars, een vriendelijke Nederlandstalige chatbot. \
                          Geef een kort en behulpzaam antwoord op het volgende bericht:\n\n"
                .to_string(),
        }
    }
}

/// Which variant of the chat is running
#[derive(Clone, PartialEq, Eq)]
pub enum ChatMode {
    /// Every message gets the scripted reply, the model is never called
    Scripted,
    /// Every message goes to the model
    Open,
    /// The passphrase must be entered once before the model is called
    Gated { secret: String },
}

impl ChatMode {
    pub fn kind(&self) -> ModeKind {
        match self {
            ChatMode::Scripted => ModeKind::Scripted,
            ChatMode::Open => ModeKind::Open,
            ChatMode::Gated { .. } => ModeKind::Gated,
        }
    }
}

// Hand-written so the passphrase never ends up in logs.
impl fmt::Debug for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatMode::Scripted => f.write_str("Scripted"),
            ChatMode::Open => f.write_str("Open"),
            ChatMode::Gated { .. } => f.write_str("Gated { secret: <redacted> }"),
        }
    }
}

/// [`ChatMode`] without its payload, for config files and the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeKind {
    Scripted,
    Open,
    Gated,
}

impl ModeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModeKind::Scripted => "scripted",
            ModeKind::Open => "open",
            ModeKind::Gated => "gated",
        }
    }
}

impl FromStr for ModeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "scripted" => Ok(ModeKind::Scripted),
            "open" => Ok(ModeKind::Open),
            "gated" => Ok(ModeKind::Gated),
            other => Err(format!(
                "unknown mode '{}' (expected one of: scripted, open, gated)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Scripted variant; every submit is answered locally
    Idle,
    /// Gated variant before the passphrase was entered
    AwaitingSecret,
    Ready,
    /// A model call is outstanding
    Busy,
    /// The last model call failed; behaves like `Ready` on the next submit
    Failed,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingSecret => "awaiting passphrase",
            SessionState::Ready => "ready",
            SessionState::Busy => "busy",
            SessionState::Failed => "failed",
        }
    }
}

/// What a submit did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Scripted reply appended
    Scripted,
    AccessGranted,
    AccessDenied,
    /// Placeholder appended; the prompt must be sent to the model
    Dispatched(String),
    /// A call is already outstanding, nothing changed
    Ignored,
}

impl SubmitOutcome {
    /// Whether the submitted text was consumed (the UI clears its input)
    pub fn accepted(&self) -> bool {
        !matches!(self, SubmitOutcome::Ignored)
    }
}

/// Read-only copy of the conversation, published after every change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub mode: ModeKind,
    pub state: SessionState,
    pub user_messages: Vec<String>,
    pub bot_messages: Vec<String>,
    pub last_error: Option<String>,
}

impl Snapshot {
    pub fn utterances(&self) -> Vec<Utterance> {
        interleave(&self.user_messages, &self.bot_messages)
    }

    pub fn is_busy(&self) -> bool {
        self.state == SessionState::Busy
    }
}

pub struct Conversation {
    mode: ChatMode,
    script: Script,
    state: SessionState,
    user_messages: Vec<String>,
    bot_messages: Vec<String>,
    last_error: Option<String>,
}

impl Conversation {
    pub fn new(mode: ChatMode) -> Self {
        Self::with_script(mode, Script::default())
    }

    pub fn with_script(mode: ChatMode, script: Script) -> Self {
        let state = match mode {
            ChatMode::Scripted => SessionState::Idle,
            ChatMode::Open => SessionState::Ready,
            ChatMode::Gated { .. } => SessionState::AwaitingSecret,
        };

        Self {
            bot_messages: vec![script.greeting.clone()],
            user_messages: Vec::new(),
            mode,
            script,
            state,
            last_error: None,
        }
    }

    pub fn mode(&self) -> &ChatMode {
        &self.mode
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state == SessionState::Busy
    }

    /// False only in the gated variant before the passphrase was entered
    pub fn access_granted(&self) -> bool {
        self.state != SessionState::AwaitingSecret
    }

    pub fn user_messages(&self) -> &[String] {
        &self.user_messages
    }

    pub fn bot_messages(&self) -> &[String] {
        &self.bot_messages
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn utterances(&self) -> Vec<Utterance> {
        interleave(&self.user_messages, &self.bot_messages)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            mode: self.mode.kind(),
            state: self.state,
            user_messages: self.user_messages.clone(),
            bot_messages: self.bot_messages.clone(),
            last_error: self.last_error.clone(),
        }
    }

    pub fn submit(&mut self, text: impl Into<String>) -> SubmitOutcome {
        let text = text.into();

        let outcome = match self.state {
            SessionState::Busy => {
                debug!("submit ignored, a reply is still pending");
                return SubmitOutcome::Ignored;
            }
            SessionState::Idle => {
                self.user_messages.push(text);
                self.bot_messages.push(self.script.scripted_reply.clone());
                SubmitOutcome::Scripted
            }
            SessionState::AwaitingSecret => {
                let matches = match &self.mode {
                    ChatMode::Gated { secret } => text == *secret,
                    _ => false,
                };
                self.user_messages.push(text);

                if matches {
                    self.bot_messages.push(self.script.access_granted.clone());
                    self.state = SessionState::Ready;
                    info!("passphrase accepted, model calls unlocked");
                    SubmitOutcome::AccessGranted
                } else {
                    self.bot_messages.push(self.script.access_denied.clone());
                    debug!("passphrase rejected");
                    SubmitOutcome::AccessDenied
                }
            }
            SessionState::Ready | SessionState::Failed => {
                let prompt = format!("{}{}", self.script.instruction, text);
                self.user_messages.push(text);
                self.bot_messages.push(self.script.placeholder.clone());
                self.state = SessionState::Busy;
                info!(prompt_len = prompt.len(), "dispatching model call");
                SubmitOutcome::Dispatched(prompt)
            }
        };

        debug!(state = self.state.label(), "submit handled");
        outcome
    }

    /// Apply the result of the outstanding model call.
    ///
    /// Replaces the placeholder in place. Returns false (and changes nothing)
    /// when no call was outstanding.
    pub fn settle(&mut self, result: Result<Option<String>, CompletionError>) -> bool {
        if self.state != SessionState::Busy {
            warn!(state = self.state.label(), "settle without an outstanding call");
            return false;
        }

        let (reply, state) = match result {
            Ok(Some(text)) if !text.trim().is_empty() => {
                info!(reply_len = text.len(), "model replied");
                self.last_error = None;
                (text, SessionState::Ready)
            }
            Ok(_) => {
                info!("model returned an empty reply, using fallback");
                self.last_error = None;
                (self.script.empty_fallback.clone(), SessionState::Ready)
            }
            Err(err) => {
                warn!(error = %err, "model call failed");
                let notice = format!("{} ({})", self.script.failure_notice, err);
                self.last_error = Some(err.to_string());
                (notice, SessionState::Failed)
            }
        };

        match self.bot_messages.last_mut() {
            Some(last) => *last = reply,
            None => self.bot_messages.push(reply),
        }
        self.state = state;
        true
    }
}
