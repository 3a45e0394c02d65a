//! Boundary traits for the collaborators the orchestrator drives.
//!
//! Implementations live outside the core: the durable cluster store, the
//! admission filter, the session provider for the storage admin API and the
//! evaluation job that actually computes and applies a new node count.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::cluster::{Cluster, ClusterId};
use super::error::{AppResult, ErrorCode, StoreError};
use crate::util::{Clock, ClusterStats, MetricsRegistry};

/// Durable store of cluster records.
///
/// Shared by the cycle driver and every worker; implementations must be safe
/// for concurrent use.
pub trait ClusterStore: Send + Sync {
    /// Point-in-time snapshot of clusters that may be due for evaluation.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the backend cannot be read.
    fn list_candidates(&self) -> Result<Vec<Cluster>, StoreError>;

    /// Persist the "checked" checkpoint for a cluster.
    ///
    /// `Ok(false)` means the checkpoint was not taken (for example another
    /// process already checked the cluster this tick) and the cluster must be
    /// skipped for this cycle.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the checkpoint could not be written.
    fn mark_checked(&self, cluster: &Cluster) -> Result<bool, StoreError>;

    /// Bump the failure counter and remember the last failure.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the record could not be updated.
    fn increase_failure_count(
        &self,
        id: &ClusterId,
        at_ms: u128,
        message: &str,
        code: ErrorCode,
    ) -> Result<(), StoreError>;
}

/// Decides whether a candidate cluster is eligible this cycle.
///
/// Must be free of side effects and must not block for long.
pub trait AdmissionFilter: Send + Sync {
    /// `true` if the cluster should be checked and evaluated.
    fn matches(&self, cluster: &Cluster) -> bool;
}

impl<F> AdmissionFilter for F
where
    F: Fn(&Cluster) -> bool + Send + Sync,
{
    fn matches(&self, cluster: &Cluster) -> bool {
        self(cluster)
    }
}

/// Live connection to one cluster's admin API.
pub trait Session: Send + Sync {
    /// Release the session. Consuming `self` makes a second release
    /// impossible.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying connection failed to shut down
    /// cleanly.
    fn close(self: Box<Self>) -> AppResult<()> {
        Ok(())
    }
}

/// Opens sessions for clusters.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Open a session scoped to `cluster`.
    ///
    /// # Errors
    ///
    /// Connection failures; typically an `std::io::Error` or
    /// `EvaluationError::Connectivity` in the chain.
    async fn open(&self, cluster: &Cluster) -> AppResult<Box<dyn Session>>;
}

/// Telemetry backend used by evaluation jobs.
pub trait MetricsSource: Send + Sync {
    /// Average CPU utilization of `cluster` over the trailing `window`.
    ///
    /// # Errors
    ///
    /// Returns an error if telemetry could not be fetched.
    fn cpu_utilization(&self, cluster: &Cluster, window: Duration) -> AppResult<f64>;
}

/// Lazily supplies the telemetry backend to a job.
pub type MetricsSourceSupplier = Arc<dyn Fn() -> Arc<dyn MetricsSource> + Send + Sync>;

/// Values injected into every evaluation job.
#[derive(Clone)]
pub struct JobContext {
    /// Cluster under evaluation.
    pub cluster: Cluster,
    /// Telemetry backend supplier.
    pub metrics_source: MetricsSourceSupplier,
    /// Shared cluster store.
    pub store: Arc<dyn ClusterStore>,
    /// Shared metrics registry.
    pub registry: Arc<MetricsRegistry>,
    /// Shared per-cluster load gauges.
    pub stats: Arc<ClusterStats>,
    /// Injectable time source.
    pub clock: Arc<dyn Clock>,
}

/// Scale-decision-and-apply logic for one cluster.
#[async_trait]
pub trait EvaluationJob: Send {
    /// Evaluate the cluster and apply any resize.
    ///
    /// # Errors
    ///
    /// Any failure; it is classified and recorded by the caller.
    async fn run(&mut self) -> AppResult<()>;

    /// Release job-held resources. Called once after `run` returns, whether
    /// it succeeded or failed, and before the session is released.
    ///
    /// Not called if `run` panics: the job is dropped during unwinding and
    /// only the session is released. Resources that must be freed on every
    /// path belong in the job's `Drop`.
    ///
    /// # Errors
    ///
    /// Returns an error if cleanup failed.
    fn close(self: Box<Self>) -> AppResult<()> {
        Ok(())
    }
}

/// Builds evaluation jobs.
pub trait EvaluationJobFactory: Send + Sync {
    /// Create a job bound to `session`. The returned job borrows the
    /// session, so it cannot outlive it.
    fn create<'s>(&self, session: &'s dyn Session, ctx: JobContext) -> Box<dyn EvaluationJob + 's>;
}
