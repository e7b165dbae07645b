use super::response::{Envelope, ResponseCode};
use http::StatusCode;
use std::fmt;

/// Piece of session context an operation could not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    SystemId,
    DeviceSerial,
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Context::SystemId => write!(f, "system id (call `list_systems()` first)"),
            Context::DeviceSerial => write!(f, "device serial number (call `list_devices()` first)"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Network failure or non-2xx HTTP status.
    #[error("transport error: {message}")]
    Transport {
        status: Option<StatusCode>,
        message: String,
    },

    /// Well-formed envelope carrying a non-zero application code.
    #[error("API returned {}", .0.describe())]
    Status(Envelope),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("no {0} provided or cached")]
    MissingContext(Context),

    #[error("malformed response from `{endpoint}`: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl Error {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Classification of the application code, for `Status` errors.
    pub fn response_code(&self) -> Option<ResponseCode> {
        match self {
            Error::Status(envelope) => envelope.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    /// HTTP 429 or the API credit limit code.
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(StatusCode::TOO_MANY_REQUESTS)
            || self.response_code() == Some(ResponseCode::RateLimited)
    }

    pub(crate) fn malformed(endpoint: &str, reason: impl fmt::Display) -> Self {
        Error::MalformedResponse {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Map transport-level `reqwest` failure (including non-2xx status) to Error
pub(crate) fn map_api_err(error: reqwest::Error) -> Error {
    Error::Transport {
        status: error.status(),
        message: error.to_string(),
    }
}
