//! Infrastructure adapters for dispatch and stage handoff storage.

pub mod dispatch;
pub mod store;

pub use dispatch::{PooledDispatcher, RecordingDispatcher, TracingDispatcher};
pub use store::JsonStore;
