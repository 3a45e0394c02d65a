//! Tests for clock and metrics utilities

use std::sync::Arc;
use std::thread;

use fleet_autoscaler::core::{ClusterId, ErrorCode};
use fleet_autoscaler::util::{
    now_ms, Clock, ClusterLoad, ClusterStats, ManualClock, MetricsRegistry, SystemClock,
};

#[test]
fn test_system_clock_tracks_wall_time() {
    let before = now_ms();
    let observed = SystemClock.now_ms();
    assert!(observed >= before);
}

#[test]
fn test_manual_clock_is_shared_through_trait_object() {
    let manual = Arc::new(ManualClock::new(100));
    let clock: Arc<dyn Clock> = manual.clone();
    manual.advance_ms(50);
    assert_eq!(clock.now_ms(), 150);
    manual.set_ms(7);
    assert_eq!(clock.now_ms(), 7);
}

#[test]
fn test_heartbeat_is_shared_across_threads() {
    let registry = Arc::new(MetricsRegistry::new("autoscaler").unwrap());
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..250 {
                    registry.heartbeat().inc();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(registry.heartbeat().get(), 1000);
}

#[test]
fn test_failure_codes_are_separate_series() {
    let registry = MetricsRegistry::new("autoscaler").unwrap();
    registry.failures(ErrorCode::TransientIo).inc();
    registry.failures(ErrorCode::TransientIo).inc();
    registry.failures(ErrorCode::Unknown).inc();

    assert_eq!(registry.failures(ErrorCode::TransientIo).get(), 2);
    assert_eq!(registry.failures(ErrorCode::Unknown).get(), 1);
    assert_eq!(registry.failures(ErrorCode::PermissionDenied).get(), 0);

    let failures = registry
        .gather()
        .into_iter()
        .find(|family| family.get_name() == "autoscaler_autoscale_failure")
        .unwrap();
    // Series appear once a code has been looked up.
    assert_eq!(failures.get_metric().len(), 3);
}

#[test]
fn test_cluster_stats_per_cluster() {
    let stats = ClusterStats::new().unwrap();
    let a = ClusterId::new("p", "i", "a");
    let b = ClusterId::new("p", "i", "b");
    stats.set_load(
        &a,
        ClusterLoad {
            node_count: 3,
            cpu_utilization: 0.5,
            observed_at_ms: 1,
        },
    );
    assert_eq!(stats.len(), 1);
    assert_eq!(stats.load(&a).map(|l| l.node_count), Some(3));
    assert!(stats.load(&b).is_none());
    assert!(stats.remove(&a).is_some());
    assert!(stats.is_empty());
}
