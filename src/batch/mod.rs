//! Concurrent batch orchestration over the fetch engine
//!
//! - [`BatchRunner::run`] - one fetch per work item
//! - [`BatchRunner::run_chunked`] - one fetch per bounded group of identifiers
//! - [`BatchRunner::run_fields`] - one fetch per item plus keyed field extraction
//!
//! Dispatch is bounded by [`BatchOptions::max_concurrency`] and joins on every
//! task before returning.

mod chunk;
mod result;
mod runner;

pub use chunk::chunk;
pub use result::{BatchResult, Failure, FieldRecord, ResultOrder, Success};
pub use runner::{BatchOptions, BatchRunner};
