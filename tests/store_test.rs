//! Plan and execute stages over JSON handoff files.

use std::fs;

use prometheus_batch_scheduler::config::EngineConfig;
use prometheus_batch_scheduler::core::{EngineError, Host, InMemoryEventSink, OperationDurations, ScheduleEvent, Target, TargetState};
use prometheus_batch_scheduler::infra::store::{BATCHES_FILE, TARGETS_FILE};
use prometheus_batch_scheduler::infra::{JsonStore, RecordingDispatcher};
use prometheus_batch_scheduler::runtime::{execute_stage, plan_stage, ManualClock};

fn scratch_store() -> JsonStore {
    let dir = std::env::temp_dir().join(format!("batch-store-{}", uuid::Uuid::new_v4()));
    JsonStore::open(dir).unwrap()
}

fn target(id: &str, state: TargetState) -> Target {
    Target {
        id: id.into(),
        security_current: 9.0,
        security_min: 3.0,
        resource_current: 400_000.0,
        resource_max: 1_000_000.0,
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

#[tokio::test]
async fn test_plan_then_execute_over_files() {
    let store = scratch_store();
    let hosts = vec![Host::new("h1", 2_000), Host::new("h2", 2_000)];
    store.save_hosts(&hosts).unwrap();
    store
        .save_targets(&[
            target("a", TargetState::NeedsSuppression),
            target("b", TargetState::ReadyToExtract),
        ])
        .unwrap();
    let config = EngineConfig {
        interval_ms: 100,
        ..EngineConfig::default()
    };

    let plan = plan_stage(&store, &config).unwrap();
    assert!(store.dir().join(BATCHES_FILE).exists());
    assert_eq!(store.load_batches().unwrap(), plan.batches);
    let saved = store.load_targets().unwrap();
    assert!(saved.iter().all(|t| t.threads_assigned > 0));
    assert!(saved.iter().all(|t| t.threads_assigned <= t.threads_needed));

    let sink = InMemoryEventSink::new(4_096);
    let dispatcher = RecordingDispatcher::new();
    let report = execute_stage(
        &store,
        &config,
        ManualClock::new(0),
        dispatcher.clone(),
        Some(Box::new(sink.clone())),
    )
    .await
    .unwrap();

    assert!(report.fired >= plan.batches.len() as u64);
    assert_eq!(report.dispatched_threads, dispatcher.accepted_threads());
    assert!(report.dispatched_threads <= 4_000);
    assert!(matches!(sink.events().last(), Some(ScheduleEvent::RunFinished { .. })));

    fs::remove_dir_all(store.dir()).unwrap();
}

#[test]
fn test_plan_stage_without_targets_fails() {
    let store = scratch_store();
    store.save_hosts(&[Host::new("h", 10)]).unwrap();
    let err = plan_stage(&store, &EngineConfig::default()).unwrap_err();
    assert!(format!("{err:#}").contains("loading targets"), "{err:#}");
    assert!(!store.dir().join(TARGETS_FILE).exists());
    fs::remove_dir_all(store.dir()).unwrap();
}

#[test]
fn test_malformed_batches_rejected() {
    let store = scratch_store();
    fs::write(store.dir().join(BATCHES_FILE), "[{\"targetId\": 3}]").unwrap();
    assert!(store.load_batches().is_err());
    fs::remove_dir_all(store.dir()).unwrap();
}

#[test]
fn test_out_of_range_batch_is_invalid_input() {
    let store = scratch_store();
    let json = r#"[{
        "targetId": "a", "minDuration": 100, "maxDuration": 18446744073709551615, "repeatCount": 1,
        "schedulingStartTime": 0, "schedulingEndTime": 1000,
        "executionStartTime": 400, "executionEndTime": 400,
        "actions": [{"kind": "Suppress", "amount": 2, "offsetMsec": 0}]
    }]"#;
    fs::write(store.dir().join(BATCHES_FILE), json).unwrap();
    assert!(matches!(store.load_batches(), Err(EngineError::InvalidInput(_))));

    let backwards = json
        .replace("18446744073709551615", "400")
        .replace("\"schedulingStartTime\": 0", "\"schedulingStartTime\": 2000");
    fs::write(store.dir().join(BATCHES_FILE), backwards).unwrap();
    assert!(matches!(store.load_batches(), Err(EngineError::InvalidInput(_))));
    fs::remove_dir_all(store.dir()).unwrap();
}
