use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_status, CompletionClient};
use crate::error::CompletionError;
use crate::provider::Provider;

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: Option<String>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn list_models(&self) -> Result<Vec<String>, CompletionError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;
        let response = check_status(Provider::Ollama, response).await?;

        let models_response: OllamaModelsResponse = response.json().await?;
        Ok(models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect())
    }
}

#[async_trait]
impl CompletionClient for OllamaClient {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<Option<String>, CompletionError> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: false,
        };

        debug!(model, url = %url, "sending Ollama generate request");
        let response = self.client.post(&url).json(&request).send().await?;
        let response = check_status(Provider::Ollama, response).await?;

        let ollama_response: OllamaResponse = response.json().await?;
        Ok(ollama_response.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text() {
        let parsed: OllamaResponse =
            serde_json::from_str(r#"{"model":"gemma3","response":"Hoi!","done":true}"#)
                .expect("valid json");
        assert_eq!(parsed.response, Some("Hoi!".to_string()));
    }

    #[test]
    fn test_response_without_text() {
        let parsed: OllamaResponse = serde_json::from_str(r#"{"done":true}"#).expect("valid json");
        assert_eq!(parsed.response, None);
    }

    #[test]
    fn test_models_listing() {
        let parsed: OllamaModelsResponse =
            serde_json::from_str(r#"{"models":[{"name":"gemma3:latest"},{"name":"llama3.2"}]}"#)
                .expect("valid json");
        let names: Vec<String> = parsed.models.into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["gemma3:latest", "llama3.2"]);
    }

    #[test]
    fn test_request_disables_streaming() {
        let request = OllamaRequest {
            model: "gemma3".to_string(),
            prompt: "hi".to_string(),
            stream: false,
        };
        let value = serde_json::to_value(&request).expect("serializable");
        assert_eq!(value["stream"], false);
    }
}
