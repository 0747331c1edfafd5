//! Worker pool collation for logsift
//!
//! Runs one named entry point of a per-worker processor over a batch of work
//! items on a fixed set of threads and hands back `(item, output)` pairs in
//! completion order.

mod collate;
mod error;
mod processor;

pub use collate::{CollateOptions, Collation, Outcomes, collate};
pub use error::{FailureKind, Outcome, PoolError, ProcessingFailure};
pub use processor::{EntryPoint, Processor};
