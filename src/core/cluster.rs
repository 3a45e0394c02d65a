//! Cluster identity and the per-cycle cluster snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::ErrorCode;

/// Composite identity of a managed cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId {
    /// Cloud project owning the instance.
    pub project_id: String,
    /// Storage instance within the project.
    pub instance_id: String,
    /// Cluster within the instance.
    pub cluster_id: String,
}

impl ClusterId {
    /// Build an identity from its three parts.
    pub fn new(
        project_id: impl Into<String>,
        instance_id: impl Into<String>,
        cluster_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            instance_id: instance_id.into(),
            cluster_id: cluster_id.into(),
        }
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project_id, self.instance_id, self.cluster_id)
    }
}

/// Snapshot of one cluster record as read from the store.
///
/// The store owns the durable record. The orchestrator only holds this copy
/// for the duration of a cycle and never writes it back directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Identity.
    pub id: ClusterId,
    /// Lower node bound the scaler must respect.
    pub min_nodes: u32,
    /// Upper node bound the scaler must respect.
    pub max_nodes: u32,
    /// Target CPU utilization in `[0, 1]`.
    pub cpu_target: f64,
    /// Whether autoscaling is enabled for this cluster.
    pub enabled: bool,
    /// Last checkpoint written by `mark_checked`.
    pub last_check_ms: Option<u128>,
    /// Last time a resize was applied.
    pub last_change_ms: Option<u128>,
    /// Failures since the last successful evaluation.
    pub consecutive_failure_count: u32,
    /// Time of the last recorded failure.
    pub last_failure_ms: Option<u128>,
    /// Message of the last recorded failure.
    pub last_failure_message: Option<String>,
    /// Code of the last recorded failure.
    pub error_code: Option<ErrorCode>,
}

impl Cluster {
    /// A freshly registered, enabled cluster with default bounds.
    pub fn new(
        project_id: impl Into<String>,
        instance_id: impl Into<String>,
        cluster_id: impl Into<String>,
    ) -> Self {
        Self {
            id: ClusterId::new(project_id, instance_id, cluster_id),
            min_nodes: 1,
            max_nodes: 10,
            cpu_target: 0.8,
            enabled: true,
            last_check_ms: None,
            last_change_ms: None,
            consecutive_failure_count: 0,
            last_failure_ms: None,
            last_failure_message: None,
            error_code: None,
        }
    }

    /// Override node bounds.
    #[must_use]
    pub const fn with_node_bounds(mut self, min_nodes: u32, max_nodes: u32) -> Self {
        self.min_nodes = min_nodes;
        self.max_nodes = max_nodes;
        self
    }

    /// Override the CPU target.
    #[must_use]
    pub const fn with_cpu_target(mut self, cpu_target: f64) -> Self {
        self.cpu_target = cpu_target;
        self
    }

    /// Disable autoscaling.
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
