use thiserror::Error;

use crate::provider::Provider;

/// Why a remote completion call did not produce a reply
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API error {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{} API key not configured", .0.display_name())]
    MissingApiKey(Provider),

    #[error("no completion client configured")]
    NoClient,

    #[error("completion task ended unexpectedly: {0}")]
    TaskAborted(String),
}
