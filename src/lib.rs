//! # Prometheus Batch Scheduler
//!
//! A capacity-aware batch scheduling and thread-allocation engine for timed
//! remote operations against many targets at once.
//!
//! Worker hosts offer a finite, fungible budget of execution threads. Each
//! target needs some mix of three operations (suppress, replenish, extract)
//! whose effects must land at the target in a fixed order. The engine works
//! in four stages, each feeding the next:
//!
//! - **Calculator**: how many threads each operation of a target needs,
//!   scaled down by bisection when a cap is given
//! - **Allocator**: proportional-fair sharing of total capacity by priority
//! - **Composer**: per-target batches whose operations *finish* one interval
//!   apart, all anchored on a common execution start
//! - **Executor**: a single cooperative loop that places whole batches on
//!   hosts, dispatches them, and compensates for clock drift
//!
//! ## Planning
//!
//! ```rust,ignore
//! use prometheus_batch_scheduler::builders::PlanBuilder;
//! use prometheus_batch_scheduler::config::EngineConfig;
//!
//! let planner = PlanBuilder::new(EngineConfig::from_env()?)?;
//! let plan = planner.plan(&hosts, targets)?;
//! ```
//!
//! ## Execution
//!
//! ```rust,ignore
//! use prometheus_batch_scheduler::builders::build_executor;
//! use prometheus_batch_scheduler::infra::TracingDispatcher;
//! use prometheus_batch_scheduler::runtime::TokioClock;
//!
//! let mut executor = build_executor(&config, TokioClock::new(), TracingDispatcher, hosts)?;
//! let report = executor.run(plan.batches).await;
//! ```
//!
//! Planning and execution can also run as separate processes over JSON
//! handoff files; see [`runtime::plan_stage`] and [`runtime::execute_stage`].

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Planning and execution engine.
pub mod core;
/// Engine configuration.
pub mod config;
/// Builders to construct engine components from configuration.
pub mod builders;
/// Dispatch and handoff storage adapters.
pub mod infra;
/// Clocks and stage entry points.
pub mod runtime;
/// Shared utilities.
pub mod util;
