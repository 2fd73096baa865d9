// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod collect;
pub mod config;
pub mod history;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::collect::normalize::{Coercion, FieldMapping, MappingTable, Normalizer};
pub use crate::collect::retry::{RetryOutcome, RetryPolicy};
pub use crate::collect::scheduler::Scheduler;
pub use crate::collect::sink::{JsonlSink, MemorySink, Sink, SinkAck, SinkError};
pub use crate::collect::types::{
    Batch, CanonicalRecord, ErrorKind, RawRecord, Scalar, SourceAdapter, SourceFailure,
    SourceResult,
};
pub use crate::collect::Pipeline;
pub use crate::config::CollectorConfig;
