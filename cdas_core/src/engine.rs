//! The seam between this client layer and the external storage engine.
//!
//! An engine is an opaque handle that executes JSON-described operations,
//! each carrying at most one borrowed input buffer (writes) or one
//! caller-allocated output buffer (reads). The actual codec, checksum, and
//! persistence machinery lives behind this trait; `cdas_engine` ships an
//! in-process implementation.

/// Failure triple reported by the engine for a rejected open or operation.
#[derive(Debug, Clone)]
pub struct EngineFailure {
    /// Numeric error code. Well-known values: 0 success, -1 unknown,
    /// -2 invalid JSON, -3 invalid handle, -4 operation failed,
    /// -6 invalid argument.
    pub code: i32,
    /// Symbolic name of the code (e.g. `OPERATION_FAILED`).
    pub code_name: String,
    /// Full JSON response document from the engine.
    pub response_json: String,
}

/// One open storage context.
///
/// Every call is a single synchronous round trip; a handle must not be
/// shared across concurrent callers.
pub trait Engine: Send {
    /// Execute one JSON-described operation.
    ///
    /// `input` is borrowed for the duration of the call (zero-copy write
    /// path); `output` must be pre-sized by the caller for read operations.
    /// On success the engine returns its JSON response document.
    fn execute(
        &mut self,
        request_json: &str,
        input: Option<&[u8]>,
        output: Option<&mut [u8]>,
    ) -> Result<String, EngineFailure>;

    /// Release all engine-side resources. Called at most once.
    fn close(&mut self);
}

impl std::fmt::Debug for dyn Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Engine")
    }
}

/// Factory for engine handles.
///
/// Held as `Arc<dyn EngineProvider>` by writers so that calibration probes
/// can open a second, fully independent memory-backed handle without
/// touching the primary store's state.
pub trait EngineProvider: Send + Sync {
    /// Open a store described by a serialized `StoreConfig` document.
    fn open(&self, config_json: &str) -> Result<Box<dyn Engine>, EngineFailure>;
}
