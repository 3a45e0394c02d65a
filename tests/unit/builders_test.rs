//! Tests for assembling an autoscaler

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_autoscaler::builders::AutoscalerBuilder;
use fleet_autoscaler::config::{AutoscalerConfig, DispatcherConfig};
use fleet_autoscaler::core::{
    AppResult, BuildError, Cluster, ClusterId, EvaluationJob, EvaluationJobFactory, JobContext,
    MetricsSource, Session, SessionProvider,
};
use fleet_autoscaler::infra::{InMemoryClusterStore, ProjectFilter};
use fleet_autoscaler::util::{ClusterLoad, ClusterStats, ManualClock, MetricsRegistry};

struct NoopSession;

impl Session for NoopSession {}

struct NoopSessions;

#[async_trait]
impl SessionProvider for NoopSessions {
    async fn open(&self, _cluster: &Cluster) -> AppResult<Box<dyn Session>> {
        Ok(Box::new(NoopSession))
    }
}

struct ResetJob {
    ctx: JobContext,
    store: Arc<InMemoryClusterStore>,
}

#[async_trait]
impl EvaluationJob for ResetJob {
    async fn run(&mut self) -> AppResult<()> {
        self.store.reset_failure_count(&self.ctx.cluster.id)?;
        Ok(())
    }
}

struct ResetJobs(Arc<InMemoryClusterStore>);

impl EvaluationJobFactory for ResetJobs {
    fn create<'s>(&self, _session: &'s dyn Session, ctx: JobContext) -> Box<dyn EvaluationJob + 's> {
        Box::new(ResetJob {
            ctx,
            store: Arc::clone(&self.0),
        })
    }
}

struct Idle;

impl MetricsSource for Idle {
    fn cpu_utilization(&self, _cluster: &Cluster, _window: Duration) -> AppResult<f64> {
        Ok(0.0)
    }
}

fn small_config() -> AutoscalerConfig {
    AutoscalerConfig {
        dispatcher: DispatcherConfig::new().with_worker_count(2),
        ..AutoscalerConfig::default()
    }
}

#[test]
fn test_build_requires_collaborators() {
    let err = AutoscalerBuilder::new(small_config()).build().unwrap_err();
    assert!(matches!(err, BuildError::Missing("store")));

    let err = AutoscalerBuilder::new(small_config())
        .store(Arc::new(InMemoryClusterStore::default()))
        .sessions(Arc::new(NoopSessions))
        .build()
        .unwrap_err();
    assert!(matches!(err, BuildError::Missing("job factory")));
}

#[test]
fn test_build_rejects_invalid_config() {
    let config = AutoscalerConfig {
        dispatcher: DispatcherConfig::new().with_worker_count(0),
        ..AutoscalerConfig::default()
    };
    let err = AutoscalerBuilder::new(config).build().unwrap_err();
    assert!(matches!(err, BuildError::Config(_)));
}

#[test]
fn test_in_memory_end_to_end_cycle() {
    let clock = Arc::new(ManualClock::new(1_000));
    let store = Arc::new(InMemoryClusterStore::new(clock.clone()));
    let mut failing = Cluster::new("prod", "inst", "a");
    failing.consecutive_failure_count = 4;
    store.upsert(failing.clone());
    store.upsert(Cluster::new("prod", "inst", "b").disabled());
    store.upsert(Cluster::new("staging", "inst", "c"));

    let builder = AutoscalerBuilder::new(small_config())
        .store(store.clone())
        .filter(Arc::new(ProjectFilter::new(["prod"])))
        .sessions(Arc::new(NoopSessions))
        .jobs(Arc::new(ResetJobs(Arc::clone(&store))))
        .metrics_source(Arc::new(Idle))
        .clock(clock.clone());
    assert_eq!(builder.config().dispatcher.worker_count, 2);
    let autoscaler = builder.build().unwrap();

    let report = autoscaler.run_cycle();
    assert_eq!(report.candidates, 2);
    assert_eq!(report.admitted, 1);
    assert_eq!(report.succeeded, 1);

    let a = store.get(&failing.id).unwrap();
    assert_eq!(a.last_check_ms, Some(1_000));
    assert_eq!(a.consecutive_failure_count, 0);
    let c = store.get(&Cluster::new("staging", "inst", "c").id).unwrap();
    assert!(c.last_check_ms.is_none(), "filtered cluster keeps its checkpoint");

    autoscaler.close();
    assert_eq!(autoscaler.dispatcher_stats().completed, 1);
}

#[test]
fn test_debug_output_names_the_autoscaler() {
    let autoscaler = AutoscalerBuilder::new(small_config())
        .store(Arc::new(InMemoryClusterStore::default()))
        .sessions(Arc::new(NoopSessions))
        .jobs(Arc::new(ResetJobs(Arc::new(InMemoryClusterStore::default()))))
        .metrics_source(Arc::new(Idle))
        .build()
        .unwrap();

    let rendered = format!("{autoscaler:?}");
    assert!(rendered.starts_with("Autoscaler"));
    assert!(rendered.contains("closed: false"));
    autoscaler.close();
    assert!(format!("{autoscaler:?}").contains("closed: true"));
}

#[test]
fn test_shared_registry_exposes_cluster_gauges_once() {
    let registry = Arc::new(MetricsRegistry::new("fleet").unwrap());
    let stats = Arc::new(ClusterStats::new().unwrap());
    let build = || {
        AutoscalerBuilder::new(small_config())
            .store(Arc::new(InMemoryClusterStore::default()))
            .sessions(Arc::new(NoopSessions))
            .jobs(Arc::new(ResetJobs(Arc::new(InMemoryClusterStore::default()))))
            .metrics_source(Arc::new(Idle))
            .registry(Arc::clone(&registry))
            .stats(Arc::clone(&stats))
            .build()
            .unwrap()
    };
    let first = build();
    let second = build();

    first.run_cycle();
    second.run_cycle();
    stats.set_load(
        &ClusterId::new("prod", "inst", "a"),
        ClusterLoad {
            node_count: 3,
            cpu_utilization: 0.25,
            observed_at_ms: 1,
        },
    );
    assert_eq!(registry.heartbeat().get(), 2);
    let exposed = registry.encode_text().unwrap();
    assert!(exposed.contains("fleet_autoscale_heartbeat 2"));
    assert_eq!(exposed.matches("# TYPE fleet_cluster_cpu_utilization gauge").count(), 1);

    first.close();
    second.close();
}
