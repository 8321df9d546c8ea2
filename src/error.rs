use thiserror::Error;

type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation not supported: {0}")]
    OperationNotSupported(String),

    #[error("Backend call failed: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<BoxedCause>,
    },

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DataResult<T> = Result<T, DataError>;

impl DataError {
    /// Wrap a failure raised by an external client library.
    pub fn backend(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DataError::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Backend failure without an underlying cause (e.g. a rejected response).
    pub fn backend_message(message: impl Into<String>) -> Self {
        DataError::Backend {
            message: message.into(),
            source: None,
        }
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        DataError::OperationNotSupported(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        DataError::InvalidArgument(what.into())
    }

    /// Plan errors are detected locally, before anything is sent to a backend.
    pub fn is_plan_error(&self) -> bool {
        matches!(
            self,
            DataError::TableNotFound(_)
                | DataError::ColumnNotFound { .. }
                | DataError::InvalidArgument(_)
        )
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, DataError::OperationNotSupported(_))
    }

    pub fn is_backend_error(&self) -> bool {
        matches!(self, DataError::Backend { .. })
    }
}

impl serde::Serialize for DataError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_messages() {
        let err = DataError::TableNotFound("songs".to_string());
        assert_eq!(err.to_string(), "Table 'songs' not found");

        let err = DataError::ColumnNotFound {
            table: "songs".to_string(),
            column: "artist".to_string(),
        };
        assert_eq!(err.to_string(), "Column 'artist' not found in table 'songs'");

        let err = DataError::invalid("IN requires a list operand");
        assert_eq!(err.to_string(), "Invalid argument: IN requires a list operand");

        let err = DataError::unsupported("drop table");
        assert_eq!(err.to_string(), "Operation not supported: drop table");

        let err = DataError::TypeError("expected boolean".to_string());
        assert_eq!(err.to_string(), "Type error: expected boolean");

        let err = DataError::Config("timeout_secs must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: timeout_secs must be positive"
        );
    }

    #[test]
    fn test_backend_error_keeps_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = DataError::backend("scroll request failed", cause);
        assert_eq!(err.to_string(), "Backend call failed: scroll request failed");
        assert!(err.is_backend_error());
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("reset by peer"));

        let err = DataError::backend_message("index missing");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_classification() {
        assert!(DataError::TableNotFound("t".into()).is_plan_error());
        assert!(DataError::invalid("x").is_plan_error());
        assert!(!DataError::unsupported("x").is_plan_error());
        assert!(DataError::unsupported("x").is_unsupported());
        assert!(!DataError::backend_message("x").is_plan_error());
    }

    #[test]
    fn test_serialize_as_message() {
        let err = DataError::TableNotFound("songs".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Table 'songs' not found\"");
    }
}
