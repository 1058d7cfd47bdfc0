//! Capability interfaces for the two external services a session talks to.
//!
//! Both are injected into [`Session`](crate::Session) so they can be
//! replaced by deterministic fakes in tests.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use archeck_core::{Interaction, PolicyRef};

use crate::providers::ProviderError;
use crate::usage::LlmUsage;

/// Failure of an external collaborator call.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Service error: {status} - {message}")]
    Service { status: u16, message: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Collaborator not configured: {0}")]
    NotConfigured(String),

    #[error("Failed to decode collaborator response: {0}")]
    Decode(String),

    /// The service answered successfully but the body is not a usable
    /// findings payload. Sessions report this as a malformed response.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

impl From<ProviderError> for CollaboratorError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::HttpError(msg) => CollaboratorError::Transport(msg),
            ProviderError::RateLimited { retry_after } => CollaboratorError::Service {
                status: 429,
                message: match retry_after {
                    Some(after) => format!("rate limited, retry after {:?}", after),
                    None => "rate limited".to_string(),
                },
            },
            ProviderError::ApiError { status, message } => {
                CollaboratorError::Service { status, message }
            }
            ProviderError::ParseError(msg) => CollaboratorError::Decode(msg),
            ProviderError::AuthError => CollaboratorError::Service {
                status: 401,
                message: "authentication failed".to_string(),
            },
            ProviderError::Timeout(after) => CollaboratorError::Timeout(after),
            ProviderError::NotConfigured(msg) => CollaboratorError::NotConfigured(msg),
        }
    }
}

/// Produces natural-language answers.
///
/// # Contract
/// - `context` is the conversation so far, oldest first
/// - implementations MUST NOT retry internally in a way that hides failures
/// - timeouts are a property of the implementation and should be configurable
#[async_trait]
pub trait Answerer: Send + Sync {
    /// Answer `question` given the prior interactions.
    async fn generate(
        &self,
        question: &str,
        context: &[Interaction],
    ) -> Result<String, CollaboratorError>;

    /// Token usage accumulated so far, for answerers that meter it.
    fn usage(&self) -> Option<LlmUsage> {
        None
    }

    /// Name for logs.
    fn name(&self) -> &str {
        "answerer"
    }
}

/// Checks a question/answer pair against a formal policy.
///
/// The validator is an opaque oracle: it returns the raw findings payload
/// and the session interprets it. It may be non-deterministic across calls.
/// A successful response whose body cannot be read as JSON is
/// [`CollaboratorError::MalformedPayload`].
#[async_trait]
pub trait Validator: Send + Sync {
    /// Validate `answer` to `question` against `policy`.
    async fn check(
        &self,
        question: &str,
        answer: &str,
        policy: &PolicyRef,
    ) -> Result<serde_json::Value, CollaboratorError>;

    /// Name for logs.
    fn name(&self) -> &str {
        "validator"
    }
}
