//! Remote completion clients, one per provider
//!
//! Every client sends a single prompt and returns the reply text, or `None`
//! when the service answered without any.

pub mod claude;
pub mod gemini;
pub mod ollama;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};

use crate::config::Config;
use crate::error::CompletionError;
use crate::provider::Provider;

pub use claude::ClaudeClient;
pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use openai::OpenAIClient;

#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn complete(&self, model: &str, prompt: &str) -> Result<Option<String>, CompletionError>;
}

/// Build the client for `provider` from resolved configuration
pub fn build_client(
    provider: Provider,
    config: &Config,
) -> Result<Arc<dyn CompletionClient>, CompletionError> {
    let http = http_client(config.request_timeout())?;

    let client: Arc<dyn CompletionClient> = match provider {
        Provider::Gemini => Arc::new(GeminiClient::with_client(http, &required_key(provider, config)?)),
        Provider::Ollama => Arc::new(OllamaClient::with_client(http, &config.ollama_url())),
        Provider::Claude => Arc::new(ClaudeClient::with_client(http, &required_key(provider, config)?)),
        Provider::OpenAI => Arc::new(OpenAIClient::with_client(http, &required_key(provider, config)?)),
    };

    Ok(client)
}

/// Models the provider offers; only Ollama is asked, the hosted lists are fixed
pub async fn available_models(provider: Provider, config: &Config) -> Result<Vec<String>, CompletionError> {
    match provider {
        Provider::Gemini => Ok(GeminiClient::list_models()),
        Provider::Claude => Ok(ClaudeClient::list_models()),
        Provider::OpenAI => Ok(OpenAIClient::list_models()),
        Provider::Ollama => {
            let client = OllamaClient::with_client(http_client(config.request_timeout())?, &config.ollama_url());
            client.list_models().await
        }
    }
}

fn required_key(provider: Provider, config: &Config) -> Result<String, CompletionError> {
    config
        .api_key(provider)
        .filter(|key| !key.trim().is_empty())
        .ok_or(CompletionError::MissingApiKey(provider))
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client, CompletionError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Turn a non-2xx response into [`CompletionError::Api`]
pub(crate) async fn check_status(
    provider: Provider,
    response: Response,
) -> Result<Response, CompletionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(CompletionError::Api {
        provider: provider.as_str(),
        status: status.as_u16(),
        body,
    })
}
