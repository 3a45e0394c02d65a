//! Per-cluster evaluation unit: acquire a session, run the job, release.
//!
//! Everything a unit does happens inside an `autoscale_unit` tracing span
//! carrying the cluster identity, so the context is attached to the unit's
//! task and never leaks to other workers.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use futures::FutureExt;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::cluster::Cluster;
use super::collaborators::{
    ClusterStore, EvaluationJobFactory, JobContext, MetricsSourceSupplier, Session,
    SessionProvider,
};
use super::dispatcher::panic_message;
use super::error::AppResult;
use super::executor::{TaskMetadata, WorkerExecutor};
use super::failure::{ClassifiedFailure, FailureRecorder};
use crate::util::{Clock, ClusterStats, MetricsRegistry};

/// One cluster scheduled for evaluation within a cycle.
#[derive(Debug, Clone)]
pub struct EvaluationUnit {
    /// Cycle that admitted the cluster.
    pub cycle_id: Uuid,
    /// Snapshot taken when the cycle listed candidates.
    pub cluster: Cluster,
}

/// Terminal state of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// The job ran to completion.
    Succeeded,
    /// The unit failed; the failure has already been recorded.
    Failed(ClassifiedFailure),
}

impl UnitOutcome {
    /// Whether the unit succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Owns a session and releases it exactly once.
///
/// `release` is the normal path. If the guard is dropped while still
/// holding the session (a panic unwinding through the unit), `Drop`
/// releases it and logs any error.
pub struct ScopedSession {
    session: Option<Box<dyn Session>>,
}

impl ScopedSession {
    /// Take ownership of an open session.
    #[must_use]
    pub fn new(session: Box<dyn Session>) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// Borrow the session for the job.
    #[must_use]
    pub fn get(&self) -> &dyn Session {
        // `release` and `Drop` consume the guard, so the session is present
        // whenever this can be called.
        self.session.as_deref().unwrap_or(&Released)
    }

    /// Release the session.
    ///
    /// # Errors
    ///
    /// Returns the session's close error.
    pub fn release(mut self) -> AppResult<()> {
        self.session
            .take()
            .map_or(Ok(()), |session| session.close())
            .context("failed to release session")
    }
}

/// Stand-in for a session that has already been released.
struct Released;

impl Session for Released {}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close() {
                warn!(error = %e, "Failed to release session during unwind");
            }
        }
    }
}

/// Executor running evaluation units on dispatcher workers.
#[derive(Clone)]
pub struct UnitRunner {
    sessions: Arc<dyn SessionProvider>,
    jobs: Arc<dyn EvaluationJobFactory>,
    metrics_source: MetricsSourceSupplier,
    store: Arc<dyn ClusterStore>,
    registry: Arc<MetricsRegistry>,
    stats: Arc<ClusterStats>,
    clock: Arc<dyn Clock>,
    recorder: FailureRecorder,
}

impl UnitRunner {
    /// Wire a runner from the shared collaborators.
    pub fn new(
        sessions: Arc<dyn SessionProvider>,
        jobs: Arc<dyn EvaluationJobFactory>,
        metrics_source: MetricsSourceSupplier,
        store: Arc<dyn ClusterStore>,
        registry: Arc<MetricsRegistry>,
        stats: Arc<ClusterStats>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let recorder = FailureRecorder::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&clock),
        );
        Self {
            sessions,
            jobs,
            metrics_source,
            store,
            registry,
            stats,
            clock,
            recorder,
        }
    }

    fn job_context(&self, cluster: &Cluster) -> JobContext {
        JobContext {
            cluster: cluster.clone(),
            metrics_source: Arc::clone(&self.metrics_source),
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            stats: Arc::clone(&self.stats),
            clock: Arc::clone(&self.clock),
        }
    }

    /// Acquire, run, release. The session is released on every path out of
    /// this function, including unwinding.
    async fn evaluate(&self, cluster: &Cluster) -> AppResult<()> {
        let session = ScopedSession::new(
            self.sessions
                .open(cluster)
                .await
                .context("failed to open session")?,
        );

        let evaluated = {
            let mut job = self.jobs.create(session.get(), self.job_context(cluster));
            let ran = job.run().await;
            let closed = job.close().context("failed to close evaluation job");
            // A run failure is the more useful one to record.
            ran.and(closed)
        };

        let released = session.release();
        evaluated.and(released)
    }

    /// Run one unit to a terminal outcome. Never panics and never returns an
    /// untagged error.
    pub async fn run_unit(&self, unit: EvaluationUnit) -> UnitOutcome {
        let id = &unit.cluster.id;
        let span = info_span!(
            "autoscale_unit",
            cycle_id = %unit.cycle_id,
            project_id = %id.project_id,
            instance_id = %id.instance_id,
            cluster_id = %id.cluster_id,
        );

        async {
            info!("Autoscaling cluster");
            let cluster = &unit.cluster;
            match AssertUnwindSafe(self.evaluate(cluster)).catch_unwind().await {
                Ok(Ok(())) => UnitOutcome::Succeeded,
                Ok(Err(e)) => UnitOutcome::Failed(self.recorder.record(cluster, &e)),
                Err(panic) => UnitOutcome::Failed(
                    self.recorder
                        .record_panic(cluster, &panic_message(panic.as_ref())),
                ),
            }
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl WorkerExecutor<EvaluationUnit, UnitOutcome> for UnitRunner {
    async fn execute(&self, unit: EvaluationUnit, _meta: TaskMetadata) -> UnitOutcome {
        self.run_unit(unit).await
    }
}
