//! Executor trait run by dispatcher workers.

use async_trait::async_trait;

/// Metadata the dispatcher attaches to every submitted unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskMetadata {
    /// Dispatcher-assigned identifier, unique per dispatcher.
    pub id: u64,
    /// Submission time in milliseconds since epoch.
    pub submitted_at_ms: u128,
}

/// Work executed on a dispatcher worker thread.
///
/// The result type carries no serialization bound; units report tagged
/// outcomes in memory only.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use fleet_autoscaler::core::{TaskMetadata, WorkerExecutor};
///
/// #[derive(Clone)]
/// struct Doubler;
///
/// #[async_trait]
/// impl WorkerExecutor<u64, u64> for Doubler {
///     async fn execute(&self, payload: u64, _meta: TaskMetadata) -> u64 {
///         payload * 2
///     }
/// }
/// ```
#[async_trait]
pub trait WorkerExecutor<P, R>: Send + Sync + Clone + 'static
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Execute one payload.
    ///
    /// # Threading
    ///
    /// Called from a dedicated worker thread inside that worker's
    /// single-threaded tokio runtime. Blocking here occupies exactly one
    /// dispatcher slot.
    async fn execute(&self, payload: P, meta: TaskMetadata) -> R;
}
