//! Stage entry points over file handoffs.
//!
//! Planning and execution can run as separate processes: `plan_stage` reads
//! hosts and targets and writes the allocated targets and batches,
//! `execute_stage` reads hosts and batches and runs them. Both install the
//! default log subscriber when the caller has not installed one.

use anyhow::Context;
use tracing::info;

use crate::builders::{build_executor, Plan, PlanBuilder};
use crate::config::EngineConfig;
use crate::core::{AppResult, Clock, Dispatcher, EventSink, ExecutionReport};
use crate::infra::store::JsonStore;
use crate::util::init_tracing;

/// Plan from the store's host and target files and write the results back.
///
/// # Errors
///
/// Fails on invalid configuration, missing or malformed handoff files, or a
/// failed write.
pub fn plan_stage(store: &JsonStore, config: &EngineConfig) -> AppResult<Plan> {
    init_tracing(config);
    let builder = PlanBuilder::new(config.clone()).context("building planner")?;
    let hosts = store.load_hosts().context("loading hosts")?;
    let targets = store.load_targets().context("loading targets")?;

    let plan = builder.plan(&hosts, targets).context("planning batches")?;
    store.save_targets(&plan.targets).context("saving allocated targets")?;
    store.save_batches(&plan.batches).context("saving batches")?;
    info!(dir = %store.dir().display(), batches = plan.batches.len(), "plan stage complete");
    Ok(plan)
}

/// Run the store's batches over its hosts.
///
/// # Errors
///
/// Fails on invalid configuration or missing or malformed handoff files.
pub async fn execute_stage<C, D>(
    store: &JsonStore,
    config: &EngineConfig,
    clock: C,
    dispatcher: D,
    events: Option<Box<dyn EventSink>>,
) -> AppResult<ExecutionReport>
where
    C: Clock,
    D: Dispatcher,
{
    init_tracing(config);
    let hosts = store.load_hosts().context("loading hosts")?;
    let batches = store.load_batches().context("loading batches")?;

    let mut executor = build_executor(config, clock, dispatcher, hosts).context("building executor")?;
    if let Some(sink) = events {
        executor = executor.with_events(sink);
    }
    let report = executor.run(batches).await;
    info!(fired = report.fired, expired = report.expired, "execute stage complete");
    Ok(report)
}
