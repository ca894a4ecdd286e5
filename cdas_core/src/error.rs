//! Unified error type for the client layer.
//!
//! Every failure falls into one of four categories ([`ErrorKind`]):
//! configuration problems surfaced before any I/O, local validation
//! failures that never reach the engine, engine-reported operation
//! failures, and use of a closed handle.

use thiserror::Error;

use crate::engine::EngineFailure;
use crate::types::DType;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad open configuration or unserializable metadata.
    Config,
    /// Locally detected precondition violation; never sent to the engine.
    Validation,
    /// Failure reported by the engine for an executed operation.
    Operation,
    /// Operation attempted on a closed handle, writer, or reader.
    State,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid store configuration: {0}")]
    Config(String),

    #[error("array must be row-major contiguous; copy it into standard layout before writing")]
    NonContiguous,

    #[error("array holds {actual} dtype but {expected} was requested")]
    DtypeMismatch { expected: DType, actual: DType },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("chunk index {index} out of range (total {len})")]
    IndexOutOfRange { index: isize, len: usize },

    #[error("slicing with a step is not supported")]
    StepNotSupported,

    #[error("cannot concatenate chunks with different dtypes")]
    MixedDtypes,

    #[error("grouped names must not be empty")]
    EmptyNames,

    #[error("duplicate name '{0}' in grouped names")]
    DuplicateName(String),

    #[error("appended group must contain the same set of array names (missing: {missing:?}, extra: {extra:?})")]
    KeySetMismatch {
        missing: Vec<String>,
        extra: Vec<String>,
    },

    #[error("all arrays in a group append must have the same number of rows")]
    RowCountMismatch,

    #[error("store contains {total} chunks, which is not a multiple of the {names} grouped names")]
    GroupAlignment { total: usize, names: usize },

    #[error("chunk count mismatch in grouped store: '{first}' has {expected} chunks but '{name}' has {found}")]
    GroupCountMismatch {
        first: String,
        expected: usize,
        name: String,
        found: usize,
    },

    #[error("operation attempted on a closed store handle")]
    Closed,

    #[error("{message} (code={code}, name='{code_name}')")]
    Operation {
        message: String,
        code: i32,
        code_name: String,
        /// Full JSON response document reported by the engine.
        response: serde_json::Value,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            Config(_) => ErrorKind::Config,
            NonContiguous
            | DtypeMismatch { .. }
            | ShapeMismatch(_)
            | IndexOutOfRange { .. }
            | StepNotSupported
            | MixedDtypes
            | EmptyNames
            | DuplicateName(_)
            | KeySetMismatch { .. }
            | RowCountMismatch
            | GroupAlignment { .. }
            | GroupCountMismatch { .. } => ErrorKind::Validation,
            Closed => ErrorKind::State,
            Operation { .. } => ErrorKind::Operation,
        }
    }

    /// Translate an engine-reported failure triple into an [`Error::Operation`],
    /// pulling the most specific message out of the response document.
    pub(crate) fn from_engine_failure(failure: EngineFailure) -> Self {
        let response: serde_json::Value =
            serde_json::from_str(&failure.response_json).unwrap_or_else(
                |_| serde_json::json!({ "raw_response": failure.response_json }),
            );
        let message = response
            .pointer("/error/message")
            .and_then(|m| m.as_str())
            .unwrap_or("engine operation failed")
            .to_string();
        Error::Operation {
            message,
            code: failure.code,
            code_name: failure.code_name,
            response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_the_taxonomy() {
        assert_eq!(Error::Config("x".into()).kind(), ErrorKind::Config);
        assert_eq!(Error::NonContiguous.kind(), ErrorKind::Validation);
        assert_eq!(Error::StepNotSupported.kind(), ErrorKind::Validation);
        assert_eq!(Error::Closed.kind(), ErrorKind::State);
        let op = Error::from_engine_failure(EngineFailure {
            code: -4,
            code_name: "OPERATION_FAILED".into(),
            response_json: r#"{"error":{"message":"checksum mismatch"}}"#.into(),
        });
        assert_eq!(op.kind(), ErrorKind::Operation);
        assert!(op.to_string().contains("checksum mismatch"));
        assert!(op.to_string().contains("code=-4"));
    }

    #[test]
    fn malformed_failure_document_is_preserved_raw() {
        let op = Error::from_engine_failure(EngineFailure {
            code: -1,
            code_name: "UNKNOWN".into(),
            response_json: "not json".into(),
        });
        match op {
            Error::Operation { response, .. } => {
                assert_eq!(response["raw_response"], "not json");
            }
            other => panic!("expected Operation, got {other:?}"),
        }
    }
}
