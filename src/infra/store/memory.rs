//! In-memory cluster store for development and testing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::{Cluster, ClusterId, ClusterStore, ErrorCode, StoreError};
use crate::util::{Clock, SystemClock};

/// Cluster records kept in a map.
///
/// `mark_checked` is an optimistic compare-and-set on the last-check stamp:
/// it only succeeds if the record still carries the stamp the caller's
/// snapshot was taken with, so of two racing cycles only one proceeds.
pub struct InMemoryClusterStore {
    clusters: RwLock<BTreeMap<ClusterId, Cluster>>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl Default for InMemoryClusterStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryClusterStore {
    /// Empty store stamping checkpoints with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clusters: RwLock::new(BTreeMap::new()),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Insert or replace a record.
    pub fn upsert(&self, cluster: Cluster) {
        self.clusters.write().insert(cluster.id.clone(), cluster);
    }

    /// Copy of a record.
    #[must_use]
    pub fn get(&self, id: &ClusterId) -> Option<Cluster> {
        self.clusters.read().get(id).cloned()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.read().len()
    }

    /// Whether the store has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.read().is_empty()
    }

    /// Simulate a backend outage: every operation fails with
    /// `StoreError::Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Clear failure state after a successful evaluation.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if the cluster is unknown.
    pub fn reset_failure_count(&self, id: &ClusterId) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut clusters = self.clusters.write();
        let record = clusters
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.consecutive_failure_count = 0;
        record.last_failure_message = None;
        record.error_code = None;
        Ok(())
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store marked unavailable".into()));
        }
        Ok(())
    }
}

impl ClusterStore for InMemoryClusterStore {
    /// Enabled clusters, least recently checked first.
    fn list_candidates(&self) -> Result<Vec<Cluster>, StoreError> {
        self.ensure_available()?;
        let mut candidates: Vec<Cluster> = self
            .clusters
            .read()
            .values()
            .filter(|c| c.enabled)
            .cloned()
            .collect();
        // `None` sorts first: never-checked clusters go ahead of the rest.
        candidates.sort_by_key(|c| c.last_check_ms);
        Ok(candidates)
    }

    fn mark_checked(&self, cluster: &Cluster) -> Result<bool, StoreError> {
        self.ensure_available()?;
        let now = self.clock.now_ms();
        let mut clusters = self.clusters.write();
        let Some(record) = clusters.get_mut(&cluster.id) else {
            return Err(StoreError::NotFound(cluster.id.to_string()));
        };
        if record.last_check_ms != cluster.last_check_ms {
            return Ok(false);
        }
        record.last_check_ms = Some(now);
        Ok(true)
    }

    fn increase_failure_count(
        &self,
        id: &ClusterId,
        at_ms: u128,
        message: &str,
        code: ErrorCode,
    ) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut clusters = self.clusters.write();
        let record = clusters
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.consecutive_failure_count = record.consecutive_failure_count.saturating_add(1);
        record.last_failure_ms = Some(at_ms);
        record.last_failure_message = Some(message.to_string());
        record.error_code = Some(code);
        Ok(())
    }
}
