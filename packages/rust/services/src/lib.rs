//! External collaborators used during enrichment.
//!
//! The orchestrator only sees the [`Translator`] and [`Explainer`] traits;
//! [`GoogleTranslator`] and [`GeminiClient`] are the HTTP backends used in
//! production. Tests substitute in-memory implementations.

mod gemini;
mod translate;

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use reqwest::StatusCode;

use studykit_shared::StudyKitError;

pub use gemini::{GeminiClient, ModelInfo, ProbeResult, ProbeStatus, probe_models};
pub use translate::GoogleTranslator;

/// User-Agent string for outbound requests.
const USER_AGENT: &str = concat!("StudyKit/", env!("CARGO_PKG_VERSION"));

/// Marker the Gemini API puts in quota errors, whatever the HTTP status.
const QUOTA_MARKER: &str = "RESOURCE_EXHAUSTED";

/// Longest response excerpt kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 300;

// ---------------------------------------------------------------------------
// ServiceError
// ---------------------------------------------------------------------------

/// Failure of a single translation or explanation call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Quota or rate limit hit; the caller may wait and retry.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Non-success HTTP status other than a rate limit.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection, TLS or timeout failure.
    #[error("network error: {0}")]
    Network(String),

    /// The service answered but the payload had an unexpected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Classify a non-success response.
    pub(crate) fn from_response(status: StatusCode, body: &str) -> Self {
        let excerpt = excerpt(body);
        if status == StatusCode::TOO_MANY_REQUESTS || body.contains(QUOTA_MARKER) {
            Self::RateLimited(format!("HTTP {}: {excerpt}", status.as_u16()))
        } else {
            Self::Http {
                status: status.as_u16(),
                body: excerpt,
            }
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<ServiceError> for StudyKitError {
    fn from(e: ServiceError) -> Self {
        StudyKitError::Service(e.to_string())
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    cut.push('…');
    cut
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Text translation service.
pub trait Translator {
    /// Translate `text` from `source` (a language code or `"auto"`) into `target`.
    fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> impl Future<Output = Result<String, ServiceError>> + Send;
}

/// Generative explanation service.
pub trait Explainer {
    /// Send `prompt` to `model` and return the generated text.
    fn explain(
        &self,
        model: &str,
        prompt: &str,
    ) -> impl Future<Output = Result<String, ServiceError>> + Send;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a reqwest client with appropriate settings.
pub(crate) fn build_client(timeout: Duration) -> Result<Client, ServiceError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| ServiceError::Network(format!("failed to build HTTP client: {e}")))
}
