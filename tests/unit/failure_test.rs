//! Tests for failure classification and recording

use std::sync::Arc;

use anyhow::Context;
use fleet_autoscaler::core::{
    Cluster, ClusterStore, ErrorCode, EvaluationError, FailureRecorder,
};
use fleet_autoscaler::infra::InMemoryClusterStore;
use fleet_autoscaler::util::{ManualClock, MetricsRegistry};

fn recorder() -> (FailureRecorder, Arc<InMemoryClusterStore>, Arc<MetricsRegistry>, Cluster) {
    let clock = Arc::new(ManualClock::new(5_000));
    let store = Arc::new(InMemoryClusterStore::new(clock.clone()));
    let cluster = Cluster::new("proj", "inst", "c1");
    store.upsert(cluster.clone());
    let registry = Arc::new(MetricsRegistry::new("autoscaler").unwrap());
    let recorder = FailureRecorder::new(store.clone(), Arc::clone(&registry), clock);
    (recorder, store, registry, cluster)
}

#[test]
fn test_record_persists_classified_failure() {
    let (recorder, store, registry, cluster) = recorder();
    let err = Err::<(), _>(EvaluationError::PermissionDenied("bigtable.clusters.update".into()))
        .context("resize failed")
        .unwrap_err();

    let failure = recorder.record(&cluster, &err);

    assert_eq!(failure.code, ErrorCode::PermissionDenied);
    assert_eq!(
        failure.message,
        "resize failed: permission denied: bigtable.clusters.update"
    );
    assert_eq!(failure.at_ms, 5_000);

    let record = store.get(&cluster.id).unwrap();
    assert_eq!(record.consecutive_failure_count, 1);
    assert_eq!(record.error_code, Some(ErrorCode::PermissionDenied));
    assert_eq!(record.last_failure_ms, Some(5_000));
    assert_eq!(record.last_failure_message.as_deref(), Some(failure.message.as_str()));

    assert_eq!(registry.failures(ErrorCode::PermissionDenied).get(), 1);
}

#[test]
fn test_record_panic_is_unknown() {
    let (recorder, store, registry, cluster) = recorder();

    let failure = recorder.record_panic(&cluster, "index out of bounds");

    assert_eq!(failure.code, ErrorCode::Unknown);
    assert_eq!(failure.message, "panic: index out of bounds");
    assert_eq!(store.get(&cluster.id).unwrap().error_code, Some(ErrorCode::Unknown));
    assert_eq!(registry.failures(ErrorCode::Unknown).get(), 1);
}

#[test]
fn test_store_outage_does_not_lose_the_outcome() {
    let (recorder, store, registry, cluster) = recorder();
    store.set_unavailable(true);

    let failure = recorder.record(&cluster, &anyhow::anyhow!("boom"));

    assert_eq!(failure.code, ErrorCode::Unknown);
    store.set_unavailable(false);
    assert_eq!(store.get(&cluster.id).unwrap().consecutive_failure_count, 0);
    assert_eq!(
        registry.failures(ErrorCode::Unknown).get(),
        1,
        "counted even when persisting fails"
    );
}

#[test]
fn test_repeated_failures_accumulate() {
    let (recorder, store, _registry, cluster) = recorder();
    for _ in 0..3 {
        recorder.record(&cluster, &anyhow::Error::new(EvaluationError::Connectivity("rpc".into())));
    }
    assert_eq!(store.get(&cluster.id).unwrap().consecutive_failure_count, 3);
    assert_eq!(store.list_candidates().unwrap().len(), 1);
}
