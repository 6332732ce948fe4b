//! Clocks and stage entry points.

pub mod api;
pub mod clock;

pub use api::{execute_stage, plan_stage};
pub use clock::ManualClock;
#[cfg(feature = "tokio-runtime")]
pub use clock::TokioClock;
