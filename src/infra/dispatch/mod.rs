//! Dispatcher backends.

pub mod memory;
pub mod pool;

pub use memory::{DispatchRecord, RecordingDispatcher, TracingDispatcher};
pub use pool::{DispatchOutcome, DispatchStats, PooledDispatcher};
