//! Prometheus metrics shared by the orchestrator and evaluation jobs.
//!
//! `MetricsRegistry` owns a `prometheus::Registry` with the cycle heartbeat
//! and the failure counter labelled by error code. `ClusterStats` keeps the
//! last observed load of every cluster under management and mirrors it into
//! per-cluster gauges. Both are safe for concurrent use from every worker
//! thread.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use prometheus::proto::MetricFamily;
use prometheus::{
    Encoder, GaugeVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::core::cluster::ClusterId;
use crate::core::error::ErrorCode;
use crate::core::failure::FAILURE_METRIC;
use crate::core::orchestrator::HEARTBEAT_METRIC;

const CLUSTER_CPU_METRIC: &str = "cluster_cpu_utilization";
const CLUSTER_NODES_METRIC: &str = "cluster_node_count";
const CLUSTER_LABELS: &[&str] = &["project", "instance", "cluster"];

/// Exposition name of a metric: Prometheus names allow no dashes.
#[must_use]
pub fn exposition_name(name: &str) -> String {
    name.replace(['-', '.'], "_")
}

/// Registry of the autoscaler's own metrics.
///
/// Every metric is exposed as `<prefix>_<name>`. Jobs receive the registry
/// through their context and may register further collectors on it.
pub struct MetricsRegistry {
    registry: Registry,
    heartbeat: IntCounter,
    failures: IntCounterVec,
}

impl MetricsRegistry {
    /// Create a registry exposing metrics under `prefix`. An empty prefix
    /// exposes bare names.
    ///
    /// # Errors
    ///
    /// Returns a `prometheus::Error` if `prefix` is not a valid metric
    /// namespace.
    pub fn new(prefix: &str) -> prometheus::Result<Self> {
        let namespace = (!prefix.is_empty()).then(|| exposition_name(prefix));
        let registry = Registry::new_custom(namespace, None)?;

        let heartbeat = IntCounter::new(
            exposition_name(HEARTBEAT_METRIC),
            "Autoscale cycles started",
        )?;
        let failures = IntCounterVec::new(
            Opts::new(
                exposition_name(FAILURE_METRIC),
                "Cluster evaluations that failed, by error code",
            ),
            &["code"],
        )?;
        registry.register(Box::new(heartbeat.clone()))?;
        registry.register(Box::new(failures.clone()))?;

        Ok(Self {
            registry,
            heartbeat,
            failures,
        })
    }

    /// Cycle heartbeat counter.
    #[must_use]
    pub const fn heartbeat(&self) -> &IntCounter {
        &self.heartbeat
    }

    /// Failure counter for one error code.
    #[must_use]
    pub fn failures(&self, code: ErrorCode) -> IntCounter {
        self.failures.with_label_values(&[code.as_str()])
    }

    /// Expose a cluster stats store's gauges through this registry.
    ///
    /// # Errors
    ///
    /// `prometheus::Error::AlreadyReg` if the gauges are registered already.
    pub fn register_cluster_stats(&self, stats: &ClusterStats) -> prometheus::Result<()> {
        self.registry.register(Box::new(stats.cpu.clone()))?;
        self.registry.register(Box::new(stats.nodes.clone()))
    }

    /// Underlying Prometheus registry.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Collect every registered metric family.
    #[must_use]
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Render every registered metric in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns a `prometheus::Error` if encoding fails.
    pub fn encode_text(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("heartbeat", &self.heartbeat.get())
            .finish_non_exhaustive()
    }
}

/// Last observed load of one cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterLoad {
    /// Node count at observation time.
    pub node_count: u32,
    /// CPU utilization in `[0, 1]`.
    pub cpu_utilization: f64,
    /// Observation time, milliseconds since epoch.
    pub observed_at_ms: u128,
}

/// Per-cluster load, written by evaluation jobs.
///
/// The full observation stays readable through [`ClusterStats::load`]; CPU
/// and node count are also published as gauges labelled with the cluster
/// identity once the stats are registered with a [`MetricsRegistry`].
pub struct ClusterStats {
    loads: RwLock<HashMap<ClusterId, ClusterLoad>>,
    cpu: GaugeVec,
    nodes: IntGaugeVec,
}

impl ClusterStats {
    /// Empty stats.
    ///
    /// # Errors
    ///
    /// Returns a `prometheus::Error` if the gauges cannot be created.
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            loads: RwLock::new(HashMap::new()),
            cpu: GaugeVec::new(
                Opts::new(CLUSTER_CPU_METRIC, "Last observed CPU utilization per cluster"),
                CLUSTER_LABELS,
            )?,
            nodes: IntGaugeVec::new(
                Opts::new(CLUSTER_NODES_METRIC, "Last observed node count per cluster"),
                CLUSTER_LABELS,
            )?,
        })
    }

    /// Record the latest load for a cluster.
    pub fn set_load(&self, id: &ClusterId, load: ClusterLoad) {
        let labels = labels(id);
        self.cpu.with_label_values(&labels).set(load.cpu_utilization);
        self.nodes
            .with_label_values(&labels)
            .set(i64::from(load.node_count));
        self.loads.write().insert(id.clone(), load);
    }

    /// Latest load for a cluster.
    #[must_use]
    pub fn load(&self, id: &ClusterId) -> Option<ClusterLoad> {
        self.loads.read().get(id).copied()
    }

    /// Forget a cluster that is no longer managed.
    pub fn remove(&self, id: &ClusterId) -> Option<ClusterLoad> {
        let removed = self.loads.write().remove(id);
        if removed.is_some() {
            let labels = labels(id);
            // Absent label sets are not an error worth surfacing.
            let _ = self.cpu.remove_label_values(&labels);
            let _ = self.nodes.remove_label_values(&labels);
        }
        removed
    }

    /// Number of clusters with recorded load.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loads.read().len()
    }

    /// Whether no load has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loads.read().is_empty()
    }
}

impl fmt::Debug for ClusterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterStats")
            .field("clusters", &self.len())
            .finish_non_exhaustive()
    }
}

fn labels(id: &ClusterId) -> [&str; 3] {
    [
        id.project_id.as_str(),
        id.instance_id.as_str(),
        id.cluster_id.as_str(),
    ]
}
