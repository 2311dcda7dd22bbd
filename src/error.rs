//! Error types
//!
//! [`RemoteError`] describes the outcome of a single remote call, [`EngineError`]
//! is what the engine hands back to the host, with the failing matrix cell
//! attached wherever a remote call was involved.

use crate::engine::matrix::MatrixCell;
use thiserror::Error;

/// Failure of one remote call (list page, get, topology lookup)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("resource not found")]
    NotFound,

    #[error("not authorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("invalid request ({status}): {message}")]
    Invalid { status: u16, message: String },

    #[error("throttled ({status})")]
    Throttled { status: u16 },

    #[error("service error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    /// A successful response whose body can't be decoded
    #[error("undecodable response: {0}")]
    Decode(String),

    #[error("call cancelled")]
    Cancelled,
}

impl RemoteError {
    /// Map an HTTP status (with a sanitized message) onto the error taxonomy
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => Self::NotFound,
            401 | 403 => Self::Unauthorized { status, message },
            429 => Self::Throttled { status },
            500..=599 => Self::Server { status, message },
            _ => Self::Invalid { status, message },
        }
    }

    /// Throttling, transport faults and 5xx responses are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Throttled { .. } | Self::Server { .. } | Self::Transport(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Error surfaced by the enumeration engine
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("{operation} failed in {cell}{}: {source}", identifier_suffix(.identifier))]
    Remote {
        operation: &'static str,
        cell: MatrixCell,
        identifier: Option<String>,
        #[source]
        source: RemoteError,
    },

    #[error("connection has no regions configured")]
    NoRegions,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("hydrate {key} failed: {message}")]
    Hydrate { key: String, message: String },

    #[error("query cancelled")]
    Cancelled,
}

fn identifier_suffix(identifier: &Option<String>) -> String {
    match identifier {
        Some(id) => format!(" for {}", id),
        None => String::new(),
    }
}

impl EngineError {
    /// Attribute a remote failure to a matrix cell. Cancellation stays a cancellation.
    pub fn remote(operation: &'static str, cell: &MatrixCell, source: RemoteError) -> Self {
        if source == RemoteError::Cancelled {
            return Self::Cancelled;
        }
        Self::Remote {
            operation,
            cell: cell.clone(),
            identifier: None,
            source,
        }
    }

    /// Same as [`EngineError::remote`], with the resource identifier attached
    pub fn remote_for(
        operation: &'static str,
        cell: &MatrixCell,
        identifier: &str,
        source: RemoteError,
    ) -> Self {
        match Self::remote(operation, cell, source) {
            Self::Remote {
                operation,
                cell,
                source,
                ..
            } => Self::Remote {
                operation,
                cell,
                identifier: Some(identifier.to_string()),
                source,
            },
            other => other,
        }
    }

    /// Cooperative stops are not failures and should not be logged as such
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The underlying remote error, if any
    pub fn remote_source(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(RemoteError::from_status(404, "x"), RemoteError::NotFound);
        assert!(matches!(
            RemoteError::from_status(403, "denied"),
            RemoteError::Unauthorized { status: 403, .. }
        ));
        assert!(matches!(
            RemoteError::from_status(409, "conflict"),
            RemoteError::Invalid { status: 409, .. }
        ));
        assert!(RemoteError::from_status(429, "").is_retryable());
        assert!(RemoteError::from_status(503, "").is_retryable());
        assert!(!RemoteError::from_status(401, "").is_retryable());
        assert!(!RemoteError::NotFound.is_retryable());
        assert!(!RemoteError::Decode("bad json".to_string()).is_retryable());
    }

    #[test]
    fn test_remote_error_carries_cell() {
        let cell = MatrixCell::new("us-ashburn-1", "ocid1.tenancy.oc1..root", None);
        let err = EngineError::remote_for(
            "get",
            &cell,
            "ocid1.instance.oc1.iad.abc",
            RemoteError::from_status(401, "bad key"),
        );
        let text = err.to_string();
        assert!(text.contains("us-ashburn-1"));
        assert!(text.contains("ocid1.instance.oc1.iad.abc"));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancelled_remote_becomes_cancelled() {
        let cell = MatrixCell::new("us-ashburn-1", "root", None);
        assert!(EngineError::remote("list", &cell, RemoteError::Cancelled).is_cancelled());
    }
}
