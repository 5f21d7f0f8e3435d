//! Admin client error types

use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by [`AdminClient`](crate::AdminClient) operations
#[derive(Debug, Error)]
pub enum AdminError {
    /// The configured endpoint cannot be used as a base URL
    #[error("Invalid admin endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// A required request attribute was not supplied
    #[error("Missing required attribute: {0}")]
    MissingAttribute(String),

    /// The request was rejected before being sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Connection refused, timeout, or the body could not be read
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-2xx status
    #[error("Admin API returned {status}: {message}")]
    Api {
        status: StatusCode,
        code: Option<String>,
        message: String,
    },

    /// A 2xx response body did not have the expected shape
    #[error("Unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl AdminError {
    pub(crate) fn transport(url: &reqwest::Url, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.to_string(),
            source,
        }
    }

    pub(crate) fn decode(url: &reqwest::Url, reason: impl Into<String>) -> Self {
        Self::Decode {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// HTTP status of an API error
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the API reported the addressed object as missing
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    /// True when the API refused the request as conflicting with existing
    /// state (alias taken, key ID already imported, bucket not empty)
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(StatusCode::CONFLICT)
    }
}

/// Result type for admin client operations
pub type AdminResult<T> = Result<T, AdminError>;
