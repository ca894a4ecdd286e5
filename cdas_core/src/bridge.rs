//! The single choke point between typed client code and the JSON-speaking
//! engine.
//!
//! The bridge exclusively owns the opaque engine handle: it serializes one
//! typed request, runs one blocking round trip, and parses the response
//! envelope back into a typed result. It does not interpret operation
//! semantics beyond that envelope.

use serde::de::DeserializeOwned;

use crate::engine::{Engine, EngineFailure, EngineProvider};
use crate::error::{Error, Result};
use crate::protocol::{OpRequest, StoreConfig};

pub struct EngineBridge {
    /// `None` once closed; every later call fails locally.
    engine: Option<Box<dyn Engine>>,
}

impl EngineBridge {
    /// Open one engine handle for the given store configuration.
    ///
    /// Failures at this stage are configuration errors: they are reported
    /// before any chunk I/O has happened.
    pub fn open(provider: &dyn EngineProvider, config: &StoreConfig) -> Result<Self> {
        let config_json = serde_json::to_string(config)
            .map_err(|e| Error::Config(format!("failed to serialize store configuration: {e}")))?;
        let engine = provider
            .open(&config_json)
            .map_err(|failure| Error::Config(describe_open_failure(&failure)))?;
        Ok(Self {
            engine: Some(engine),
        })
    }

    /// Execute one operation and parse its `result` payload as `R`.
    ///
    /// At most one of `input`/`output` accompanies a request: `input` is the
    /// borrowed write payload, `output` a caller-sized read buffer.
    pub fn execute<R: DeserializeOwned>(
        &mut self,
        request: &OpRequest,
        input: Option<&[u8]>,
        output: Option<&mut [u8]>,
    ) -> Result<R> {
        let engine = self.engine.as_mut().ok_or(Error::Closed)?;
        let request_json = serde_json::to_string(request).map_err(|e| Error::Operation {
            message: format!("failed to serialize operation request: {e}"),
            code: -1,
            code_name: "UNKNOWN".into(),
            response: serde_json::Value::Null,
        })?;

        let response_json = engine
            .execute(&request_json, input, output)
            .map_err(Error::from_engine_failure)?;

        let envelope: serde_json::Value =
            serde_json::from_str(&response_json).map_err(|e| Error::Operation {
                message: format!("engine returned a malformed response document: {e}"),
                code: -1,
                code_name: "UNKNOWN".into(),
                response: serde_json::Value::Null,
            })?;
        let result = envelope
            .get("result")
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));
        serde_json::from_value(result).map_err(|e| Error::Operation {
            message: format!("unexpected result payload: {e}"),
            code: -1,
            code_name: "UNKNOWN".into(),
            response: envelope,
        })
    }

    /// Release the engine handle. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.close();
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.engine.is_none()
    }
}

impl Drop for EngineBridge {
    fn drop(&mut self) {
        self.close();
    }
}

fn describe_open_failure(failure: &EngineFailure) -> String {
    let message = serde_json::from_str::<serde_json::Value>(&failure.response_json)
        .ok()
        .and_then(|doc| {
            doc.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| "engine rejected the open request".into());
    format!(
        "{message} (code={}, name='{}')",
        failure.code, failure.code_name
    )
}
