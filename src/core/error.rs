//! Error types and the failure taxonomy persisted with failure records.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a `ClusterStore` implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend could not be reached or timed out.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The addressed cluster record does not exist.
    #[error("cluster not found: {0}")]
    NotFound(String),
    /// Backend-specific failure with context.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Typed failures an evaluation job or session provider may return.
///
/// Returning one of these (directly or anywhere in an `anyhow` context chain)
/// lets the failure recorder pick a precise `ErrorCode`.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// Session or RPC connectivity failure.
    #[error("connectivity failure: {0}")]
    Connectivity(String),
    /// Caller lacks permission on the cluster or project.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Cluster disappeared.
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),
    /// Cluster configuration is inconsistent with the scaling rules.
    #[error("invalid cluster state: {0}")]
    InvalidState(String),
}

/// Errors produced by the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The dispatcher has been shut down and accepts no more units.
    #[error("dispatcher has been shut down")]
    Shutdown,
    /// The executor panicked while running the unit.
    #[error("unit panicked: {0}")]
    Panicked(String),
    /// The unit was dropped without reporting a result.
    #[error("unit terminated without reporting an outcome")]
    Lost,
    /// Configuration validation failed.
    #[error("invalid dispatcher configuration: {0}")]
    InvalidConfig(String),
    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Failure assembling an `Autoscaler`.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A required collaborator was not supplied.
    #[error("missing collaborator: {0}")]
    Missing(&'static str),
    /// Configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The dispatcher could not be started.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// Metrics could not be created or registered.
    #[error("metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Configuration loading or validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Input could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
    /// Values are out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Closed taxonomy of evaluation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Connection or session failure, likely to pass on the next cycle.
    TransientIo,
    /// Missing permission on the cluster or project.
    PermissionDenied,
    /// Cluster disappeared.
    NotFound,
    /// Cluster configuration inconsistent with the scaling rules.
    InvalidState,
    /// Anything not recognised above.
    Unknown,
}

impl ErrorCode {
    /// Stable string form, used for metric tags and persisted records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TransientIo => "TRANSIENT_IO",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidState => "INVALID_STATE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Classify a failure by walking its cause chain, outermost first.
    ///
    /// The first cause with a known type decides the code. Unrecognised
    /// chains map to `Unknown`; this never fails.
    #[must_use]
    pub fn classify(err: &anyhow::Error) -> Self {
        err.chain()
            .find_map(Self::from_cause)
            .unwrap_or(Self::Unknown)
    }

    fn from_cause(cause: &(dyn std::error::Error + 'static)) -> Option<Self> {
        if let Some(e) = cause.downcast_ref::<EvaluationError>() {
            return Some(match e {
                EvaluationError::Connectivity(_) => Self::TransientIo,
                EvaluationError::PermissionDenied(_) => Self::PermissionDenied,
                EvaluationError::ClusterNotFound(_) => Self::NotFound,
                EvaluationError::InvalidState(_) => Self::InvalidState,
            });
        }
        if let Some(e) = cause.downcast_ref::<std::io::Error>() {
            return Some(match e.kind() {
                std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
                std::io::ErrorKind::NotFound => Self::NotFound,
                _ => Self::TransientIo,
            });
        }
        match cause.downcast_ref::<StoreError>() {
            Some(StoreError::Unavailable(_)) => Some(Self::TransientIo),
            Some(StoreError::NotFound(_)) => Some(Self::NotFound),
            Some(StoreError::Backend(_)) | None => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application-facing result using anyhow for collaborator boundaries.
pub type AppResult<T> = Result<T, anyhow::Error>;
