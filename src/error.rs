//! Errors raised at the backend boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Connection refused, timeout, TLS failure and the like.
    #[error("transport error on {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint} answered HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("could not decode {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    /// The server-push stream ended or broke mid-frame.
    #[error("notification stream closed: {0}")]
    StreamClosed(String),

    /// The backend accepted the request but refused the operation.
    #[error("{endpoint} rejected the request: {message}")]
    Rejected { endpoint: String, message: String },
}

impl ClientError {
    pub fn transport(endpoint: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: err.to_string(),
        }
    }

    pub fn decode(endpoint: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            endpoint: endpoint.into(),
            message: err.to_string(),
        }
    }

    pub fn rejected(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Network hiccups worth retrying, as opposed to answers the server meant.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::StreamClosed(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode { .. } | Self::Rejected { .. } => false,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
