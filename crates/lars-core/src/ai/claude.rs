use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_status, CompletionClient};
use crate::error::CompletionError;
use crate::provider::Provider;

const CLAUDE_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

#[derive(Serialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ClaudeMessage>,
}

#[derive(Deserialize)]
struct ClaudeContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    #[serde(default)]
    content: Vec<ClaudeContent>,
}

impl ClaudeResponse {
    fn text(self) -> Option<String> {
        self.content.into_iter().find_map(|c| c.text)
    }
}

#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: String,
}

impl ClaudeClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_client(Client::new(), api_key)
    }

    pub fn with_client(client: Client, api_key: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
        }
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "claude-sonnet-4-20250514".to_string(),
            "claude-3-5-haiku-20241022".to_string(),
        ]
    }
}

#[async_trait]
impl CompletionClient for ClaudeClient {
    fn provider(&self) -> Provider {
        Provider::Claude
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<Option<String>, CompletionError> {
        let request = ClaudeRequest {
            model: model.to_string(),
            max_tokens: MAX_TOKENS,
            messages: vec![ClaudeMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        debug!(model, "sending Claude messages request");
        let response = self
            .client
            .post(CLAUDE_MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let response = check_status(Provider::Claude, response).await?;
        let claude_response: ClaudeResponse = response.json().await?;
        Ok(claude_response.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_text_block() {
        let parsed: ClaudeResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"Goedendag"}],"stop_reason":"end_turn"}"#,
        )
        .expect("valid json");
        assert_eq!(parsed.text(), Some("Goedendag".to_string()));
    }

    #[test]
    fn test_empty_content() {
        let parsed: ClaudeResponse = serde_json::from_str(r#"{"content":[]}"#).expect("valid json");
        assert_eq!(parsed.text(), None);
    }
}
