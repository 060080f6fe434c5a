use std::result::Result as StdResult;

use thiserror::Error;

/// Convenient result type for the backend client.
pub type Result<T> = StdResult<T, Error>;

/// Failures talking to the backend service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// The request could not be delivered or timed out.
    #[error("backend unreachable at {endpoint}: {message}")]
    Unreachable {
        /// Endpoint path, e.g. `GET /settings`.
        endpoint: String,
        /// Transport error text.
        message: String,
    },

    /// The backend answered with a failure status or `success: false`.
    #[error("{endpoint} failed ({status}): {message}")]
    Status {
        /// Endpoint path.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Error text reported by the backend.
        message: String,
    },

    /// The reply body did not match the expected shape.
    #[error("unexpected reply from {endpoint}: {message}")]
    Decode {
        /// Endpoint path.
        endpoint: String,
        /// Decoder error text.
        message: String,
    },

    /// The readiness wait ran out of attempts.
    #[error("backend did not become ready after {attempts} attempts")]
    NotReady {
        /// Number of probes sent.
        attempts: u32,
    },
}

impl Error {
    /// Whether this is a transport-level failure (connect, timeout, never ready).
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::NotReady { .. })
    }

    /// Whether the backend reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}
