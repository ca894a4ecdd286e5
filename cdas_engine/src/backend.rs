use std::fs::OpenOptions;
use std::io::{Cursor, Read, Seek, Write};

use cdas_core::protocol::{BackendConfig, OpenMode};

use crate::error::EngineError;

/// Seekable byte storage behind a store.
pub trait Backend: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> Backend for T {}

/// What `open_backend` learned about the target.
pub struct OpenedBackend {
    pub backend: Box<dyn Backend>,
    pub writable: bool,
    /// True when the store has no existing content and needs a fresh
    /// header.
    pub fresh: bool,
}

pub fn open_backend(config: &BackendConfig) -> Result<OpenedBackend, EngineError> {
    match config {
        BackendConfig::File { mode, path } => {
            let display = path.display();
            match mode {
                OpenMode::Read => {
                    let file = OpenOptions::new()
                        .read(true)
                        .open(path)
                        .map_err(|e| EngineError::Config(format!("cannot open {display}: {e}")))?;
                    Ok(OpenedBackend {
                        backend: Box::new(file),
                        writable: false,
                        fresh: false,
                    })
                }
                OpenMode::WriteTruncate => {
                    let file = OpenOptions::new()
                        .read(true)
                        .write(true)
                        .create(true)
                        .truncate(true)
                        .open(path)
                        .map_err(|e| EngineError::Config(format!("cannot create {display}: {e}")))?;
                    Ok(OpenedBackend {
                        backend: Box::new(file),
                        writable: true,
                        fresh: true,
                    })
                }
                OpenMode::WriteAppend => {
                    let file = OpenOptions::new()
                        .read(true)
                        .write(true)
                        .create(true)
                        .open(path)
                        .map_err(|e| EngineError::Config(format!("cannot open {display}: {e}")))?;
                    let len = file
                        .metadata()
                        .map_err(|e| EngineError::Config(format!("cannot stat {display}: {e}")))?
                        .len();
                    Ok(OpenedBackend {
                        backend: Box::new(file),
                        writable: true,
                        fresh: len == 0,
                    })
                }
            }
        }
        BackendConfig::Memory { mode } => match mode {
            OpenMode::WriteTruncate => Ok(OpenedBackend {
                backend: Box::new(Cursor::new(Vec::new())),
                writable: true,
                fresh: true,
            }),
            // A memory store starts empty, so there is nothing to read or
            // append to.
            OpenMode::Read | OpenMode::WriteAppend => Err(EngineError::Config(
                "memory stores only support write-truncate mode".into(),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_rejects_read_mode() {
        let err = open_backend(&BackendConfig::Memory {
            mode: OpenMode::Read,
        })
        .err();
        assert!(matches!(err, Some(EngineError::Config(_))));
    }

    #[test]
    fn memory_write_is_fresh_and_writable() {
        let opened = open_backend(&BackendConfig::Memory {
            mode: OpenMode::WriteTruncate,
        })
        .unwrap();
        assert!(opened.writable);
        assert!(opened.fresh);
    }
}
