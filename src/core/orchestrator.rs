//! The cycle orchestrator: fetch, filter, checkpoint, dispatch, join.
//!
//! # Ordering
//!
//! For every candidate the admission filter runs first and `mark_checked`
//! runs only if the filter accepted the cluster. Stamping a filtered cluster
//! as checked would skew any staleness-based admission rule and can starve
//! it. A cluster is dispatched only after its checkpoint was persisted, so a
//! crash mid-evaluation never re-admits it with a stale checkpoint.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::cluster::Cluster;
use super::collaborators::{AdmissionFilter, ClusterStore};
use super::dispatcher::{panic_message, Dispatcher, DispatcherStats};
use super::error::DispatchError;
use super::unit::{EvaluationUnit, UnitOutcome, UnitRunner};
use crate::util::MetricsRegistry;

/// Counter incremented once per cycle start. Exposed as
/// `<prefix>_autoscale_heartbeat`.
pub const HEARTBEAT_METRIC: &str = "autoscale-heartbeat";

/// Summary of one cycle. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Correlates log lines of this cycle.
    pub cycle_id: Uuid,
    /// Clusters returned by the store.
    pub candidates: usize,
    /// Clusters accepted by the admission filter.
    pub admitted: usize,
    /// Clusters whose checkpoint was persisted.
    pub checked: usize,
    /// Units handed to the dispatcher.
    pub dispatched: usize,
    /// Units that succeeded.
    pub succeeded: usize,
    /// Units that failed (already recorded).
    pub failed: usize,
    /// Why the cycle ended early, if it did.
    pub aborted: Option<String>,
}

/// Runs scheduling cycles over the fleet.
pub struct Autoscaler {
    store: Arc<dyn ClusterStore>,
    filter: Arc<dyn AdmissionFilter>,
    registry: Arc<MetricsRegistry>,
    dispatcher: Dispatcher<EvaluationUnit, UnitOutcome, UnitRunner>,
}

impl fmt::Debug for Autoscaler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Autoscaler")
            .field("dispatcher", &self.dispatcher.stats())
            .field("closed", &self.dispatcher.is_shutdown())
            .finish_non_exhaustive()
    }
}

impl Autoscaler {
    /// Create an orchestrator that dispatches through `dispatcher`.
    pub fn new(
        store: Arc<dyn ClusterStore>,
        filter: Arc<dyn AdmissionFilter>,
        registry: Arc<MetricsRegistry>,
        dispatcher: Dispatcher<EvaluationUnit, UnitOutcome, UnitRunner>,
    ) -> Self {
        Self {
            store,
            filter,
            registry,
            dispatcher,
        }
    }

    /// Run one cycle to completion.
    ///
    /// Returns only after every dispatched unit is terminal. Never fails and
    /// never panics: unit failures are recorded per cluster, and a failure
    /// outside the units (listing candidates, a panicking collaborator on
    /// this thread) is logged and ends the cycle early.
    pub fn run_cycle(&self) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        self.registry.heartbeat().inc();

        match panic::catch_unwind(AssertUnwindSafe(|| self.cycle(cycle_id))) {
            Ok(report) => report,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(cycle_id = %cycle_id, panic = %message, "Unexpected panic in autoscale cycle");
                CycleReport {
                    cycle_id,
                    aborted: Some(format!("panic: {message}")),
                    ..CycleReport::default()
                }
            }
        }
    }

    fn cycle(&self, cycle_id: Uuid) -> CycleReport {
        let mut report = CycleReport {
            cycle_id,
            ..CycleReport::default()
        };

        let candidates = match self.store.list_candidates() {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(cycle_id = %cycle_id, error = %e, "Failed to list candidate clusters");
                report.aborted = Some(e.to_string());
                return report;
            }
        };
        report.candidates = candidates.len();

        // Filter every candidate before any checkpoint is written.
        let admitted: Vec<Cluster> = candidates
            .into_iter()
            .filter(|cluster| self.filter.matches(cluster))
            .collect();
        report.admitted = admitted.len();

        // Each cluster is checkpointed right before its own submission, so a
        // closed dispatcher never leaves checkpoints without units behind.
        let mut handles = Vec::with_capacity(admitted.len());
        for cluster in admitted {
            if self.dispatcher.is_shutdown() {
                warn!(cycle_id = %cycle_id, "Dispatcher shut down, ending cycle");
                report.aborted = Some(DispatchError::Shutdown.to_string());
                break;
            }
            if !self.checkpoint(&cluster) {
                continue;
            }
            report.checked += 1;

            let id = cluster.id.clone();
            let unit = EvaluationUnit { cycle_id, cluster };
            match self.dispatcher.submit(unit) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Shut down between the check and the send; a later cycle
                    // picks the cluster up once its checkpoint ages out.
                    warn!(cluster = %id, error = %e, "Failed to dispatch cluster");
                    report.aborted = Some(e.to_string());
                    break;
                }
            }
        }
        report.dispatched = handles.len();

        for outcome in Dispatcher::<EvaluationUnit, UnitOutcome, UnitRunner>::await_all(handles) {
            match outcome {
                Ok(UnitOutcome::Succeeded) => report.succeeded += 1,
                Ok(UnitOutcome::Failed(_)) => report.failed += 1,
                Err(e) => {
                    error!(error = %e, "Unit ended without an outcome");
                    report.failed += 1;
                }
            }
        }

        info!(
            cycle_id = %cycle_id,
            candidates = report.candidates,
            dispatched = report.dispatched,
            succeeded = report.succeeded,
            failed = report.failed,
            "Autoscale cycle complete"
        );
        report
    }

    /// Persist the checkpoint; `false` drops the cluster from this cycle.
    fn checkpoint(&self, cluster: &Cluster) -> bool {
        match self.store.mark_checked(cluster) {
            Ok(true) => true,
            Ok(false) => {
                debug!(cluster = %cluster.id, "Cluster already checked, skipping");
                false
            }
            Err(e) => {
                warn!(cluster = %cluster.id, error = %e, "Failed to mark cluster checked, skipping");
                false
            }
        }
    }

    /// Dispatcher statistics.
    #[must_use]
    pub fn dispatcher_stats(&self) -> DispatcherStats {
        self.dispatcher.stats()
    }

    /// Stop the worker pool. Cycles started afterwards neither checkpoint nor
    /// dispatch anything and report `aborted`.
    pub fn close(&self) {
        self.dispatcher.shutdown();
    }
}
