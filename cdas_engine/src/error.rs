use cdas_core::engine::EngineFailure;
use thiserror::Error;

/// Engine-side failures, each mapped to a stable numeric code in the
/// response document.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid store configuration: {0}")]
    Config(String),

    #[error("request is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("operation on a closed or unknown store handle")]
    InvalidHandle,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn code(&self) -> i32 {
        match self {
            EngineError::InvalidJson(_) => -2,
            EngineError::InvalidHandle => -3,
            EngineError::OperationFailed(_) | EngineError::Io(_) => -4,
            EngineError::Config(_) | EngineError::InvalidArgument(_) => -6,
        }
    }

    pub fn code_name(&self) -> &'static str {
        match self {
            EngineError::InvalidJson(_) => "INVALID_JSON",
            EngineError::InvalidHandle => "INVALID_HANDLE",
            EngineError::OperationFailed(_) | EngineError::Io(_) => "OPERATION_FAILED",
            EngineError::Config(_) | EngineError::InvalidArgument(_) => "INVALID_ARGUMENT",
        }
    }

    /// Package this error as the wire-level failure the client parses.
    pub fn into_failure(self) -> EngineFailure {
        let response = serde_json::json!({
            "error": {
                "message": self.to_string(),
                "code": self.code(),
            }
        });
        EngineFailure {
            code: self.code(),
            code_name: self.code_name().to_string(),
            response_json: response.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_carries_code_and_message() {
        let failure = EngineError::InvalidArgument("bad shape".into()).into_failure();
        assert_eq!(failure.code, -6);
        assert_eq!(failure.code_name, "INVALID_ARGUMENT");
        let doc: serde_json::Value = serde_json::from_str(&failure.response_json).unwrap();
        assert_eq!(
            doc.pointer("/error/message").and_then(|m| m.as_str()),
            Some("invalid argument: bad shape")
        );
    }
}
