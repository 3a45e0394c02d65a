//! Cycle orchestration, dispatch and failure isolation.

pub mod cluster;
pub mod collaborators;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod failure;
pub mod orchestrator;
pub mod unit;

pub use cluster::{Cluster, ClusterId};
pub use collaborators::{
    AdmissionFilter, ClusterStore, EvaluationJob, EvaluationJobFactory, JobContext, MetricsSource,
    MetricsSourceSupplier, Session, SessionProvider,
};
pub use dispatcher::{Dispatcher, DispatcherStats, UnitHandle};
pub use error::{
    AppResult, BuildError, ConfigError, DispatchError, ErrorCode, EvaluationError, StoreError,
};
pub use executor::{TaskMetadata, WorkerExecutor};
pub use failure::{ClassifiedFailure, FailureRecorder, FAILURE_METRIC};
pub use orchestrator::{Autoscaler, CycleReport, HEARTBEAT_METRIC};
pub use unit::{EvaluationUnit, ScopedSession, UnitOutcome, UnitRunner};
