//! Error types for agent interactions.

use thiserror::Error;

/// Errors that can occur when talking to a reasoning model.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Transport failure reaching the model endpoint
    #[error("Model transport error: {0}")]
    Http(String),

    /// The model endpoint rejected the request
    #[error("Model provider error: {0}")]
    Provider(String),

    /// The response body did not have the expected shape
    #[error("Response format error: {0}")]
    ResponseFormat(String),

    /// Handles JSON serialization and deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ledger-side failure while composing context
    #[error("Ledger error: {0}")]
    Ledger(#[from] omnipds_core::PdsError),
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::Http(err.to_string())
    }
}
