//! Planning and execution engine.

pub mod allocator;
pub mod calculator;
pub mod capacity;
pub mod composer;
pub mod dispatch;
pub mod drift;
pub mod effects;
pub mod error;
pub mod events;
pub mod executor;
pub mod model;

pub use allocator::{distribute, AllocationReport, ThreadAllocator};
pub use calculator::{CalculatorSettings, ThreadCalculator, ThreadCounts};
pub use capacity::{HostPool, Placement};
pub use composer::{compose_batches, scale_repeat_counts, verify_ordering};
pub use dispatch::Dispatcher;
pub use drift::DriftCompensator;
pub use effects::{EffectModel, UniformEffectModel};
pub use error::{AppResult, EngineError};
pub use events::{ChannelEventSink, EventSink, InMemoryEventSink, ScheduleEvent};
pub use executor::{Clock, ExecutionReport, Executor};
pub use model::{
    Batch, Host, HostId, OperationDurations, OperationKind, Target, TargetId, TargetState, ThreadAction,
};
