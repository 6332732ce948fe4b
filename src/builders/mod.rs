//! Builders to construct engine components from configuration.

pub mod plan_builder;

pub use plan_builder::{build_executor, Plan, PlanBuilder};
