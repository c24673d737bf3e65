//! Error taxonomy shared by the stores, executors and command handlers.

use thiserror::Error;

/// Failures surfaced to a connection. Auth and protocol failures never reach
/// this type: the router drops those messages before dispatch.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Local code raised or returned an error.
    #[error("{0}")]
    Execution(String),

    /// The remote execution service was unreachable or did not run the code.
    #[error("{0}")]
    Delegate(String),

    /// Invalid project name, secret key or missing field. No state was touched.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// Message reported on a cell. Delegate failures carry a prefix so the
    /// client can tell them apart from local failures.
    pub fn cell_message(&self) -> String {
        match self {
            BridgeError::Delegate(msg) => format!("Cloud Error: {msg}"),
            other => other.to_string(),
        }
    }
}

impl From<tempfile::PersistError> for BridgeError {
    fn from(err: tempfile::PersistError) -> Self {
        BridgeError::Io(err.error)
    }
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delegate_errors_are_prefixed_on_cells() {
        let err = BridgeError::Delegate("connection refused".into());
        assert_eq!(err.cell_message(), "Cloud Error: connection refused");
    }

    #[test]
    fn execution_errors_are_reported_verbatim() {
        let err = BridgeError::Execution("Variable not found: x".into());
        assert_eq!(err.cell_message(), "Variable not found: x");
    }
}
