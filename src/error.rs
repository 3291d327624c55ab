// ABOUTME: Error types for the extraction core and its collaborators
// ABOUTME: Keeps store corruption, not-found and execution failures distinguishable

use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a query-execution engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Transport-level failure talking to the engine
    #[error("request to query engine failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Engine answered with a non-success status
    #[error("query engine returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response could not be decoded into rows and a point-in-time token
    #[error("failed to decode query engine response: {0}")]
    Decode(String),

    /// Engine endpoint could not be derived from the configured URL
    #[error("invalid query engine URL: {0}")]
    Url(#[from] url::ParseError),

    /// Engine-specific failure not covered above
    #[error("query engine error: {0}")]
    Other(String),
}

/// Failure reported by a durable document backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request to document backend failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("document backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid document URI '{0}'")]
    InvalidUri(String),

    #[error("invalid permissions: {0}")]
    Permissions(String),

    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure reading or writing the persisted watermark.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation
    #[error("failed to access watermark document {uri}")]
    Backend {
        uri: String,
        #[source]
        source: BackendError,
    },

    /// A document exists at the location but is not a watermark document.
    /// Never treated as "no watermark yet".
    #[error("watermark document {uri} is corrupt: {reason}")]
    Corrupt { uri: String, reason: String },

    /// The document tracks a different constraint column than this job
    #[error(
        "watermark document {uri} tracks column '{stored}' but the job is configured for '{configured}'"
    )]
    ColumnMismatch {
        uri: String,
        stored: String,
        configured: String,
    },

    #[error("failed to serialize watermark document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Why a max-value result could not produce a watermark.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MaxValueError {
    #[error("max-value query returned no rows")]
    NoRows,

    #[error("max-value query returned {0} rows, expected 1")]
    TooManyRows(usize),

    #[error("max-value row has no '{0}' field")]
    MissingField(String),

    #[error("max-value field '{0}' is null or not a scalar")]
    NotScalar(String),
}

/// Anything that aborts a single extraction cycle.
///
/// Every variant leaves the stored watermark untouched.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("query execution failed: {query}")]
    Execution {
        query: String,
        #[source]
        source: EngineError,
    },

    #[error("malformed max-value result for query: {query}")]
    MalformedMaxValue {
        query: String,
        #[source]
        source: MaxValueError,
    },

    #[error("watermark store failure")]
    Store(#[from] StoreError),
}

impl CycleError {
    /// Whether the failure came from corrupt or mismatched persisted state,
    /// which needs operator intervention rather than a retry.
    pub fn is_state_corruption(&self) -> bool {
        matches!(
            self,
            CycleError::Store(StoreError::Corrupt { .. } | StoreError::ColumnMismatch { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_is_flagged() {
        let err = CycleError::Store(StoreError::Corrupt {
            uri: "/state.json".to_string(),
            reason: "expected value at line 1".to_string(),
        });
        assert!(err.is_state_corruption());

        let err = CycleError::Execution {
            query: "op.fromView('a', 'b')".to_string(),
            source: EngineError::Other("timeout".to_string()),
        };
        assert!(!err.is_state_corruption());
    }

    #[test]
    fn test_error_messages_carry_query_text() {
        let err = CycleError::MalformedMaxValue {
            query: "op.fromView('a', 'b').limit(1)".to_string(),
            source: MaxValueError::NoRows,
        };
        assert!(err.to_string().contains("op.fromView('a', 'b').limit(1)"));
        assert_eq!(
            MaxValueError::MissingField("constraint".to_string()).to_string(),
            "max-value row has no 'constraint' field"
        );
    }
}
