use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_status, CompletionClient};
use crate::error::CompletionError;
use crate::provider::Provider;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

impl OpenAIResponse {
    fn text(self) -> Option<String> {
        self.choices.into_iter().next()?.message.content
    }
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
}

impl OpenAIClient {
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
            "gpt-4o-mini".to_string(),
            "gpt-4o".to_string(),
            "gpt-4-turbo".to_string(),
        ]
    }
}

#[async_trait]
impl CompletionClient for OpenAIClient {
    fn provider(&self) -> Provider {
        Provider::OpenAI
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<Option<String>, CompletionError> {
        let request = OpenAIRequest {
            model: model.to_string(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        debug!(model, "sending OpenAI chat completion request");
        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let response = check_status(Provider::OpenAI, response).await?;
        let openai_response: OpenAIResponse = response.json().await?;
        Ok(openai_response.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_choice_content() {
        let parsed: OpenAIResponse = serde_json::from_str(
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Hoi"}}]}"#,
        )
        .expect("valid json");
        assert_eq!(parsed.text(), Some("Hoi".to_string()));
    }

    #[test]
    fn test_null_content_and_no_choices() {
        let parsed: OpenAIResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#)
                .expect("valid json");
        assert_eq!(parsed.text(), None);

        let parsed: OpenAIResponse = serde_json::from_str(r#"{"choices":[]}"#).expect("valid json");
        assert_eq!(parsed.text(), None);
    }
}
