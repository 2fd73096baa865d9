// src/collect/sink.rs
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;

use crate::collect::types::Batch;

/// Acknowledgement for one accepted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkAck {
    pub accepted: usize,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink serialization: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Persists one batch per call. The pipeline never retries a sink; a
/// rejected batch is logged and the cycle completes normally.
#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    async fn accept(&self, batch: &Batch) -> Result<SinkAck, SinkError>;
}

/// Appends each batch as one JSON line to a local file, creating parent
/// directories on first write.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Sink for JsonlSink {
    async fn accept(&self, batch: &Batch) -> Result<SinkAck, SinkError> {
        let line = serde_json::to_string(batch)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), std::io::Error> {
            if let Some(dir) = path.parent() {
                if !dir.as_os_str().is_empty() {
                    std::fs::create_dir_all(dir)?;
                }
            }
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            writeln!(file, "{line}")
        })
        .await
        .map_err(|e| SinkError::Unavailable(e.to_string()))??;

        Ok(SinkAck {
            accepted: batch.records.len(),
        })
    }
}

// --- Test helper ---
/// In-memory sink recording every accepted batch.
#[derive(Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Batch>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Batch> {
        self.batches.lock().expect("memory sink mutex poisoned").clone()
    }
}

#[async_trait::async_trait]
impl Sink for MemorySink {
    async fn accept(&self, batch: &Batch) -> Result<SinkAck, SinkError> {
        self.batches
            .lock()
            .expect("memory sink mutex poisoned")
            .push(batch.clone());
        Ok(SinkAck {
            accepted: batch.records.len(),
        })
    }
}
