//! In-process reference engine for chunked array stores.
//!
//! Implements the same JSON operation protocol an external engine would
//! speak, backed by a single-file layout with a trailing chunk index. Two
//! encoding families exist on disk: RAW passthrough and zstd; every
//! non-RAW codec tag is stored verbatim in the index but encoded as zstd.

pub mod backend;
pub mod error;
pub mod format;
pub mod store;

use std::sync::Arc;

use cdas_core::engine::{Engine, EngineFailure, EngineProvider};
use cdas_core::protocol::{OpRequest, StoreConfig};

use crate::error::EngineError;
use crate::store::NativeStore;

/// One engine handle bound to one open store.
pub struct NativeEngine {
    /// `None` once closed; every later call fails with an invalid-handle
    /// code.
    store: Option<NativeStore>,
}

impl Engine for NativeEngine {
    fn execute(
        &mut self,
        request_json: &str,
        input: Option<&[u8]>,
        output: Option<&mut [u8]>,
    ) -> Result<String, EngineFailure> {
        let request: OpRequest = match serde_json::from_str(request_json) {
            Ok(request) => request,
            Err(e) => return Err(EngineError::InvalidJson(e.to_string()).into_failure()),
        };
        let store = match self.store.as_mut() {
            Some(store) => store,
            None => return Err(EngineError::InvalidHandle.into_failure()),
        };
        let result = store
            .execute(&request, input, output)
            .map_err(EngineError::into_failure)?;
        Ok(serde_json::json!({ "result": result }).to_string())
    }

    fn close(&mut self) {
        if let Some(mut store) = self.store.take() {
            if let Err(e) = store.close() {
                log::warn!("error while closing store: {e}");
            }
        }
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        self.close();
    }
}

/// Factory for [`NativeEngine`] handles.
pub struct NativeProvider;

impl EngineProvider for NativeProvider {
    fn open(&self, config_json: &str) -> Result<Box<dyn Engine>, EngineFailure> {
        let config: StoreConfig = serde_json::from_str(config_json)
            .map_err(|e| EngineError::InvalidJson(e.to_string()).into_failure())?;
        let store = NativeStore::open(&config).map_err(EngineError::into_failure)?;
        Ok(Box::new(NativeEngine { store: Some(store) }))
    }
}

/// Shared provider handle for client constructors.
pub fn provider() -> Arc<dyn EngineProvider> {
    Arc::new(NativeProvider)
}

/// Create (or truncate) a file-backed store bound to the native engine.
pub fn create_writer(
    path: impl AsRef<std::path::Path>,
    user_metadata: Option<&serde_json::Value>,
) -> cdas_core::Result<cdas_core::ChunkWriter> {
    cdas_core::ChunkWriter::create(provider(), path, user_metadata)
}

/// Open a file-backed store for appending, bound to the native engine.
pub fn append_writer(
    path: impl AsRef<std::path::Path>,
) -> cdas_core::Result<cdas_core::ChunkWriter> {
    cdas_core::ChunkWriter::append_to(provider(), path)
}

/// Open a file-backed store for reading, bound to the native engine.
pub fn open_reader(
    path: impl AsRef<std::path::Path>,
    check_checksums: bool,
) -> cdas_core::Result<cdas_core::ChunkReader> {
    cdas_core::ChunkReader::open(provider(), path, check_checksums)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_request_reports_invalid_json() {
        let mut engine = NativeProvider
            .open(r#"{"backend":{"type":"Memory","mode":"WriteTruncate"}}"#)
            .unwrap();
        let failure = engine.execute("{not json", None, None).unwrap_err();
        assert_eq!(failure.code, -2);
        assert_eq!(failure.code_name, "INVALID_JSON");
    }

    #[test]
    fn closed_handle_reports_invalid_handle() {
        let mut engine = NativeProvider
            .open(r#"{"backend":{"type":"Memory","mode":"WriteTruncate"}}"#)
            .unwrap();
        engine.close();
        let failure = engine
            .execute(r#"{"op_type":"Flush"}"#, None, None)
            .unwrap_err();
        assert_eq!(failure.code, -3);
        assert_eq!(failure.code_name, "INVALID_HANDLE");
    }

    #[test]
    fn bad_config_fails_open() {
        let failure = NativeProvider
            .open(r#"{"backend":{"type":"Memory","mode":"Read"}}"#)
            .unwrap_err();
        assert_eq!(failure.code, -6);
    }
}
