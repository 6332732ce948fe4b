//! Batch composer.
//!
//! Each allocated target becomes one [`Batch`]: its operations are offset so
//! they *finish* one interval apart in dependency order, whatever their own
//! durations. Every batch composed together is anchored on the same
//! execution start, the longest operation duration among them.

use tracing::{debug, info};

use crate::core::calculator::{ThreadCalculator, ThreadCounts};
use crate::core::effects::EffectModel;
use crate::core::model::{Batch, OperationDurations, OperationKind, Target, TargetState, ThreadAction};

/// Dependency-ordered operation slots for a target in `state`.
#[must_use]
pub fn stage_sequence(state: TargetState, counts: &ThreadCounts) -> Vec<(OperationKind, u32)> {
    match state {
        TargetState::NeedsSuppression => vec![
            (OperationKind::Suppress, counts.suppress),
            (OperationKind::Replenish, counts.replenish),
            (OperationKind::Suppress, counts.replenish_suppress),
        ],
        TargetState::NeedsReplenishment => vec![
            (OperationKind::Replenish, counts.replenish),
            (OperationKind::Suppress, counts.replenish_suppress),
        ],
        TargetState::ReadyToExtract => vec![
            (OperationKind::Extract, counts.extract),
            (OperationKind::Suppress, counts.extract_suppress),
            (OperationKind::Replenish, counts.replenish),
            (OperationKind::Suppress, counts.replenish_suppress),
        ],
    }
}

/// Lay out `stages` so consecutive emitted operations finish `interval_ms`
/// apart, then normalize. Zero-thread slots are skipped.
#[must_use]
pub fn build_actions(
    stages: &[(OperationKind, u32)],
    durations: &OperationDurations,
    interval_ms: u64,
) -> Vec<ThreadAction> {
    let longest = to_offset(durations.max());
    let step = to_offset(interval_ms);
    let mut stage_offset = 0_i64;
    let mut actions = Vec::with_capacity(stages.len());
    for &(kind, amount) in stages {
        if amount == 0 {
            continue;
        }
        actions.push(ThreadAction {
            kind,
            amount,
            offset_msec: longest - to_offset(durations.of(kind)) + stage_offset,
        });
        stage_offset += step;
    }
    actions
}

/// Compose one batch per target with assigned threads.
///
/// Thread counts are recomputed with `threads_assigned` as the cap, so a
/// partially funded target gets a degraded but complete plan. Targets whose
/// capped plan is empty produce no batch.
pub fn compose_batches<M: EffectModel>(
    calculator: &ThreadCalculator<M>,
    targets: &[Target],
    interval_ms: u64,
) -> Vec<Batch> {
    let mut batches: Vec<Batch> = targets
        .iter()
        .filter_map(|target| compose_one(calculator, target, interval_ms))
        .collect();

    let execution_start = batches.iter().map(|b| b.max_duration).max().unwrap_or(0);
    for batch in &mut batches {
        batch.execution_start_time = execution_start;
        batch.scheduling_start_time = execution_start - batch.max_duration;
        // A target faster than one interval gets an empty window.
        batch.scheduling_end_time = execution_start
            .saturating_sub(interval_ms)
            .max(batch.scheduling_start_time);
    }

    info!(
        targets = targets.len(),
        batches = batches.len(),
        execution_start,
        "composed batches"
    );
    batches
}

fn compose_one<M: EffectModel>(
    calculator: &ThreadCalculator<M>,
    target: &Target,
    interval_ms: u64,
) -> Option<Batch> {
    if target.threads_assigned == 0 {
        return None;
    }
    let counts = calculator.calculate(target, Some(target.threads_assigned));
    let actions = build_actions(&stage_sequence(target.state, &counts), &target.durations, interval_ms);
    if actions.is_empty() {
        debug!(target_id = %target.id, "no threads after capping, dropping batch");
        return None;
    }

    let mut batch = Batch {
        target_id: target.id.clone(),
        min_duration: target.durations.min(),
        max_duration: target.durations.max(),
        repeat_count: 1,
        scheduling_start_time: 0,
        scheduling_end_time: 0,
        execution_start_time: 0,
        execution_end_time: 0,
        actions,
    };
    batch.normalize(&target.durations);
    debug!(
        target_id = %batch.target_id,
        actions = batch.actions.len(),
        threads = batch.total_threads(),
        execution_end = batch.execution_end_time,
        "composed batch"
    );
    Some(batch)
}

/// True when consecutive actions finish exactly `interval_ms` apart, in order.
#[must_use]
pub fn verify_ordering(batch: &Batch, durations: &OperationDurations, interval_ms: u64) -> bool {
    let step = to_offset(interval_ms);
    batch.actions.windows(2).all(|pair| {
        let first = pair[0].offset_msec + to_offset(durations.of(pair[0].kind));
        let second = pair[1].offset_msec + to_offset(durations.of(pair[1].kind));
        second - first == step
    })
}

/// Raise repeat counts so spare capacity is used.
///
/// The common factor is `floor(capacity / threads per round)`. One round
/// spans `stages * interval`, where `stages` is the widest action count among
/// the batches still kept, since the executor spaces every firing by that
/// width. Batches whose repeated span `factor * span` no longer fits inside
/// `max_duration - span` are dropped and the factor recomputed until every
/// remaining batch fits. If that empties the set, the slower half of the
/// batches is kept with the largest count fitting both capacity and time.
/// When no count of at least one fits, the input is returned unchanged.
#[must_use]
pub fn scale_repeat_counts(batches: Vec<Batch>, capacity: u64, interval_ms: u64) -> Vec<Batch> {
    if batches.is_empty() || capacity == 0 {
        return batches;
    }

    let mut candidates: Vec<&Batch> = batches.iter().collect();
    candidates.sort_by_key(|b| b.max_duration);

    while !candidates.is_empty() {
        let needed: u64 = candidates.iter().map(|b| b.total_threads()).sum();
        if needed == 0 {
            break;
        }
        let factor = capacity / needed;
        if factor < 1 {
            break;
        }
        let span = widest_span(&candidates, interval_ms);
        let before = candidates.len();
        candidates.retain(|b| repeats_fit(b, factor, span));
        if candidates.len() == before {
            let keep: Vec<String> = candidates.iter().map(|b| b.target_id.clone()).collect();
            info!(factor, batches = keep.len(), "scaled repeat counts");
            return with_repeat(batches, &keep, factor);
        }
    }

    match fallback_repeats(&batches, capacity, interval_ms) {
        Some((keep, count)) => {
            info!(count, batches = keep.len(), "scaled repeat counts on slower half");
            with_repeat(batches, &keep, count)
        }
        None => {
            debug!("no repeat scaling fits, keeping single repeats");
            batches
        }
    }
}

fn widest_span(batches: &[&Batch], interval_ms: u64) -> u64 {
    let widest = batches.iter().map(|b| b.actions.len()).max().unwrap_or(0).max(1);
    (widest as u64).saturating_mul(interval_ms)
}

fn repeats_fit(batch: &Batch, factor: u64, span: u64) -> bool {
    batch.max_duration >= span && factor.saturating_mul(span) <= batch.max_duration - span
}

fn fallback_repeats(batches: &[Batch], capacity: u64, interval_ms: u64) -> Option<(Vec<String>, u32)> {
    let fastest = batches.iter().map(|b| b.max_duration).min()?;
    let slowest = batches.iter().map(|b| b.max_duration).max()?;
    let halfway = fastest + (slowest - fastest) / 2;
    let selected: Vec<&Batch> = batches.iter().filter(|b| b.max_duration >= halfway).collect();

    let span = widest_span(&selected, interval_ms);
    let time_limit = selected.iter().map(|b| b.max_duration.saturating_sub(span)).min()?;
    let per_round: u64 = selected.iter().map(|b| b.total_threads()).sum();
    if per_round == 0 {
        return None;
    }
    let high = u32::try_from(capacity / per_round).unwrap_or(u32::MAX);
    let count = crate::core::calculator::bisect_max_threads(high, |c| {
        u64::from(c).saturating_mul(span) <= time_limit
    });
    (count >= 1).then(|| (selected.iter().map(|b| b.target_id.clone()).collect(), count))
}

fn with_repeat(batches: Vec<Batch>, keep: &[String], count: impl TryInto<u32>) -> Vec<Batch> {
    let count = count.try_into().unwrap_or(u32::MAX);
    batches
        .into_iter()
        .filter(|b| keep.contains(&b.target_id))
        .map(|mut b| {
            b.repeat_count = count;
            b
        })
        .collect()
}

fn to_offset(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}
