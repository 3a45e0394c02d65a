//! Classification and durable recording of unit failures.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::cluster::Cluster;
use super::collaborators::ClusterStore;
use super::error::ErrorCode;
use crate::util::{Clock, MetricsRegistry};

/// Failure counter name, labelled with `code`. Exposed as
/// `<prefix>_autoscale_failure`.
pub const FAILURE_METRIC: &str = "autoscale-failure";

/// A unit failure after classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedFailure {
    /// Taxonomy entry.
    pub code: ErrorCode,
    /// Full message including the cause chain.
    pub message: String,
    /// Time the failure was recorded.
    pub at_ms: u128,
}

/// Classifies failures and persists them through the store.
#[derive(Clone)]
pub struct FailureRecorder {
    store: Arc<dyn ClusterStore>,
    registry: Arc<MetricsRegistry>,
    clock: Arc<dyn Clock>,
}

impl FailureRecorder {
    /// Create a recorder.
    pub fn new(
        store: Arc<dyn ClusterStore>,
        registry: Arc<MetricsRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
        }
    }

    /// Classify and record an evaluation error.
    pub fn record(&self, cluster: &Cluster, err: &anyhow::Error) -> ClassifiedFailure {
        let code = ErrorCode::classify(err);
        // `{:#}` renders the whole context chain on one line.
        self.persist(cluster, code, format!("{err:#}"))
    }

    /// Record a panic that escaped the evaluation.
    pub fn record_panic(&self, cluster: &Cluster, message: &str) -> ClassifiedFailure {
        self.persist(cluster, ErrorCode::Unknown, format!("panic: {message}"))
    }

    fn persist(&self, cluster: &Cluster, code: ErrorCode, message: String) -> ClassifiedFailure {
        let at_ms = self.clock.now_ms();
        error!(error_code = %code, error = %message, "Failed to autoscale cluster");

        self.registry.failures(code).inc();

        // Best effort: the unit still reports its failure if this fails.
        if let Err(e) = self
            .store
            .increase_failure_count(&cluster.id, at_ms, &message, code)
        {
            warn!(error = %e, "Failed to persist failure record");
        }

        ClassifiedFailure {
            code,
            message,
            at_ms,
        }
    }
}
