//! Builder wiring collaborators, the dispatcher and the orchestrator.

use std::sync::Arc;

use crate::config::AutoscalerConfig;
use crate::core::{
    AdmissionFilter, Autoscaler, BuildError, ClusterStore, Dispatcher, EvaluationJobFactory,
    MetricsSource, MetricsSourceSupplier, SessionProvider, UnitRunner,
};
use crate::infra::AcceptAll;
use crate::util::{Clock, ClusterStats, MetricsRegistry, SystemClock};

/// Prefix of every metric the autoscaler registers by default.
pub const DEFAULT_METRIC_PREFIX: &str = "autoscaler";

/// Assembles an [`Autoscaler`].
///
/// The store, session provider, job factory and metrics source are required.
/// The filter defaults to accepting every cluster, the clock to the system
/// clock, and a fresh registry and stats are created if none are supplied.
#[derive(Default)]
pub struct AutoscalerBuilder {
    config: AutoscalerConfig,
    store: Option<Arc<dyn ClusterStore>>,
    filter: Option<Arc<dyn AdmissionFilter>>,
    sessions: Option<Arc<dyn SessionProvider>>,
    jobs: Option<Arc<dyn EvaluationJobFactory>>,
    metrics_source: Option<MetricsSourceSupplier>,
    registry: Option<Arc<MetricsRegistry>>,
    stats: Option<Arc<ClusterStats>>,
    clock: Option<Arc<dyn Clock>>,
}

impl AutoscalerBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: AutoscalerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Configuration this builder will use.
    #[must_use]
    pub const fn config(&self) -> &AutoscalerConfig {
        &self.config
    }

    /// Cluster store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn ClusterStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Admission filter.
    #[must_use]
    pub fn filter(mut self, filter: Arc<dyn AdmissionFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Session provider.
    #[must_use]
    pub fn sessions(mut self, sessions: Arc<dyn SessionProvider>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Evaluation job factory.
    #[must_use]
    pub fn jobs(mut self, jobs: Arc<dyn EvaluationJobFactory>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Supplier of the telemetry backend.
    #[must_use]
    pub fn metrics_source_supplier(mut self, supplier: MetricsSourceSupplier) -> Self {
        self.metrics_source = Some(supplier);
        self
    }

    /// Shared telemetry backend, supplied as-is to every job.
    #[must_use]
    pub fn metrics_source(self, source: Arc<dyn MetricsSource>) -> Self {
        self.metrics_source_supplier(Arc::new(move || Arc::clone(&source)))
    }

    /// Metrics registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<MetricsRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Cluster stats.
    #[must_use]
    pub fn stats(mut self, stats: Arc<ClusterStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration, start the dispatcher and build.
    ///
    /// # Errors
    ///
    /// - `BuildError::Missing` if a required collaborator is absent
    /// - `BuildError::Config` if the configuration is invalid
    /// - `BuildError::Metrics` if the default metrics cannot be registered
    /// - `BuildError::Dispatch` if worker threads cannot be started
    pub fn build(self) -> Result<Autoscaler, BuildError> {
        self.config.validate()?;

        let store = self.store.ok_or(BuildError::Missing("store"))?;
        let sessions = self.sessions.ok_or(BuildError::Missing("session provider"))?;
        let jobs = self.jobs.ok_or(BuildError::Missing("job factory"))?;
        let metrics_source = self
            .metrics_source
            .ok_or(BuildError::Missing("metrics source"))?;
        let filter = self.filter.unwrap_or_else(|| Arc::new(AcceptAll));
        let registry = match self.registry {
            Some(registry) => registry,
            None => Arc::new(MetricsRegistry::new(DEFAULT_METRIC_PREFIX)?),
        };
        let stats = match self.stats {
            Some(stats) => stats,
            None => Arc::new(ClusterStats::new()?),
        };
        match registry.register_cluster_stats(&stats) {
            // Stats shared between autoscalers on one registry are exposed once.
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e.into()),
        }
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let runner = UnitRunner::new(
            sessions,
            jobs,
            metrics_source,
            Arc::clone(&store),
            Arc::clone(&registry),
            stats,
            clock,
        );
        let dispatcher = Dispatcher::new(self.config.dispatcher, runner)?;
        Ok(Autoscaler::new(store, filter, registry, dispatcher))
    }
}
