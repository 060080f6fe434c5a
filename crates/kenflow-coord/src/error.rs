use std::{path::PathBuf, result::Result as StdResult};

use thiserror::Error;

use crate::hotkeys::Conflict;

/// Convenient result type for the coordination layer.
pub type Result<T> = StdResult<T, Error>;

/// Unified error type for the coordination layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A backend request failed.
    #[error(transparent)]
    Backend(#[from] kenflow_backend::Error),

    /// The hotkey is already held by another owner.
    #[error("{0}")]
    Conflict(Box<Conflict>),

    /// Local state could not be read or written.
    #[error("cannot persist {}: {message}", path.display())]
    Persistence {
        /// File involved.
        path: PathBuf,
        /// Underlying error text.
        message: String,
    },

    /// A hotkey string did not parse.
    #[error("invalid key combination '{0}'")]
    InvalidCombo(String),

    /// The referenced message or combination does not exist.
    #[error("no such item")]
    UnknownOwner,

    /// The window host refused an operation.
    #[error("window host error: {0}")]
    Host(String),

    /// A surface task is gone.
    #[error("surface channel closed")]
    ChannelClosed,

    /// Input rejected before reaching the backend.
    #[error("{0}")]
    Invalid(String),
}

impl Error {
    /// Whether this wraps a transport-level backend failure.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Backend(e) if e.is_unreachable())
    }

    /// The conflict carried by this error, if any.
    pub fn as_conflict(&self) -> Option<&Conflict> {
        match self {
            Self::Conflict(c) => Some(c),
            _ => None,
        }
    }

    /// Build a persistence error for `path`.
    pub(crate) fn persistence(path: impl Into<PathBuf>, err: impl ToString) -> Self {
        Self::Persistence {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<Conflict> for Error {
    fn from(c: Conflict) -> Self {
        Self::Conflict(Box::new(c))
    }
}
