//! Property tests for allocation, degraded search, and batch layout.

use proptest::prelude::*;

use prometheus_batch_scheduler::core::composer::{build_actions, stage_sequence};
use prometheus_batch_scheduler::core::{
    distribute, verify_ordering, Batch, CalculatorSettings, OperationDurations, Target, TargetState,
    ThreadCalculator, ThreadCounts, UniformEffectModel,
};

fn target(need: u32, priority: f64) -> Target {
    Target {
        id: format!("t{need}"),
        security_current: 5.0,
        security_min: 5.0,
        resource_current: 1_000.0,
        resource_max: 1_000.0,
        durations: OperationDurations::default(),
        min_duration: 0,
        max_duration: 0,
        priority_value: priority,
        state: TargetState::ReadyToExtract,
        threads_needed: need,
        threads_assigned: 0,
    }
}

fn measured(state: TargetState, security_gap: f64, resource_ratio: f64) -> Target {
    Target {
        id: "m".into(),
        security_current: 5.0 + security_gap,
        security_min: 5.0,
        resource_current: 1_000.0 * resource_ratio,
        resource_max: 1_000.0,
        durations: OperationDurations {
            suppress: 4_000,
            replenish: 3_200,
            extract: 1_000,
        },
        min_duration: 1_000,
        max_duration: 4_000,
        priority_value: 1.0,
        state,
        threads_needed: 0,
        threads_assigned: 0,
    }
}

fn calculator() -> ThreadCalculator {
    ThreadCalculator::new(UniformEffectModel::default(), CalculatorSettings::default())
}

fn empty_batch() -> Batch {
    Batch {
        target_id: "b".into(),
        min_duration: 0,
        max_duration: 0,
        repeat_count: 1,
        scheduling_start_time: 0,
        scheduling_end_time: 0,
        execution_start_time: 0,
        execution_end_time: 0,
        actions: Vec::new(),
    }
}

proptest! {
    #[test]
    fn allocation_conserves_capacity(
        needs in proptest::collection::vec((0u32..500, 0.0f64..10.0), 1..20),
        capacity in 0u64..5_000,
    ) {
        let mut targets: Vec<Target> = needs.iter().map(|&(n, p)| target(n, p)).collect();
        let report = distribute(&mut targets, capacity);

        let assigned: u64 = targets.iter().map(|t| u64::from(t.threads_assigned)).sum();
        prop_assert!(assigned <= capacity);
        prop_assert_eq!(assigned, report.assigned);
        prop_assert_eq!(report.remaining, capacity - assigned);
        for t in &targets {
            prop_assert!(t.threads_assigned <= t.threads_needed);
        }
    }

    #[test]
    fn allocation_terminates_within_linear_passes(
        needs in proptest::collection::vec((1u32..1_000, 0.0f64..10.0), 1..30),
        capacity in 0u64..20_000,
    ) {
        let mut targets: Vec<Target> = needs.iter().map(|&(n, p)| target(n, p)).collect();
        let report = distribute(&mut targets, capacity);
        prop_assert!(report.passes <= 2 * targets.len() + 1, "passes={}", report.passes);
    }

    #[test]
    fn allocation_satisfies_everyone_when_capacity_suffices(
        needs in proptest::collection::vec((0u32..300, 0.0f64..10.0), 1..15),
        spare in 0u64..500,
    ) {
        let mut targets: Vec<Target> = needs.iter().map(|&(n, p)| target(n, p)).collect();
        let total: u64 = targets.iter().map(|t| u64::from(t.threads_needed)).sum();
        let report = distribute(&mut targets, total + spare);
        for t in &targets {
            prop_assert_eq!(t.threads_assigned, t.threads_needed);
        }
        prop_assert_eq!(report.remaining, spare);
    }

    #[test]
    fn extract_requirement_is_monotone(steps in 1usize..200) {
        let calc = calculator();
        let t = measured(TargetState::ReadyToExtract, 0.0, 1.0);
        let mut previous = 0_u64;
        for i in 0..=steps {
            let pct = 10.0 * i as f64 / steps as f64;
            let total = calc.total_required_at(&t, pct);
            prop_assert!(total >= previous, "pct={} total={} previous={}", pct, total, previous);
            previous = total;
        }
    }

    #[test]
    fn extract_bisection_matches_linear_scan(limit in 0u32..400) {
        let calc = calculator();
        let t = measured(TargetState::ReadyToExtract, 0.0, 1.0);
        prop_assume!(calc.total_required_at(&t, 0.0) <= u64::from(limit));

        let found = calc.max_feasible_percentage(&t, limit);
        prop_assert!(calc.total_required_at(&t, found) <= u64::from(limit));

        let scan_best = (0..=10_000)
            .map(|i| f64::from(i) / 1_000.0)
            .filter(|&pct| calc.total_required_at(&t, pct) <= u64::from(limit))
            .fold(0.0_f64, f64::max);
        let tolerance = calc.settings().tolerance;
        prop_assert!(found >= scan_best - tolerance - 1e-9, "found={} scan={}", found, scan_best);

        let counts = calc.calculate(&t, Some(limit));
        prop_assert!(counts.total() <= u64::from(limit));
    }

    #[test]
    fn heal_bisection_matches_linear_scan(
        gap in 0.0f64..20.0,
        ratio in 0.05f64..1.0,
        limit in 1u32..2_000,
    ) {
        let calc = calculator();
        let t = measured(TargetState::NeedsSuppression, gap, ratio);
        let counts = calc.calculate(&t, Some(limit));
        prop_assert!(counts.total() <= u64::from(limit));

        let suppress = calc.suppress_threads(&t);
        prop_assume!(suppress <= limit);
        let budget = u64::from(limit - suppress);
        let full = calc.replenish_threads(&t);
        let best = (0..=full)
            .filter(|&g| u64::from(g) + u64::from(calc.replenish_suppress_threads(&t, g)) <= budget)
            .max()
            .unwrap_or(0);
        prop_assert_eq!(counts.replenish, best);
    }

    #[test]
    fn composed_layout_is_ordered_and_normalized(
        suppress in 1u64..50_000,
        replenish in 1u64..50_000,
        extract in 1u64..50_000,
        amounts in proptest::collection::vec(0u32..100, 5),
        interval in 1u64..2_000,
        state_pick in 0usize..3,
    ) {
        let durations = OperationDurations { suppress, replenish, extract };
        let state = [
            TargetState::NeedsSuppression,
            TargetState::NeedsReplenishment,
            TargetState::ReadyToExtract,
        ][state_pick];
        let counts = ThreadCounts {
            suppress: amounts[0],
            replenish: amounts[1],
            replenish_suppress: amounts[2],
            extract: amounts[3],
            extract_suppress: amounts[4],
        };

        let mut batch = empty_batch();
        batch.actions = build_actions(&stage_sequence(state, &counts), &durations, interval);
        batch.normalize(&durations);

        prop_assert!(verify_ordering(&batch, &durations, interval));
        if batch.actions.is_empty() {
            prop_assert_eq!(batch.execution_end_time, 0);
        } else {
            prop_assert_eq!(batch.actions.iter().map(|a| a.offset_msec).min(), Some(0));
            let end = batch
                .actions
                .iter()
                .map(|a| a.offset_msec as u64 + durations.of(a.kind))
                .max()
                .unwrap();
            prop_assert_eq!(batch.execution_end_time, end);
            for pair in batch.actions.windows(2) {
                let first = pair[0].offset_msec as u64 + durations.of(pair[0].kind);
                let second = pair[1].offset_msec as u64 + durations.of(pair[1].kind);
                prop_assert!(first <= second);
            }
        }
    }
}
