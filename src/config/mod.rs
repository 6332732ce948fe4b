//! Configuration models for the planning and execution stages.

pub mod engine;

pub use engine::{AllocationConfig, AllocationMode, DispatchConfig, EffectCoefficients, EngineConfig};
