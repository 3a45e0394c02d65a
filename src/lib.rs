//! # Fleet Autoscaler
//!
//! Cycle orchestrator for autoscaling a fleet of managed storage clusters.
//!
//! Every cycle the [`Autoscaler`](core::Autoscaler) asks the cluster store
//! for candidates, runs each through the admission filter, persists a
//! last-checked checkpoint for the ones it admits, and evaluates them
//! concurrently on a fixed pool of worker threads. A cycle returns only after
//! every unit it dispatched has finished.
//!
//! ## Failure isolation
//!
//! Each cluster is evaluated inside its own unit. A unit opens a session,
//! runs the evaluation job against it, and releases the session exactly once
//! on every path, including panics. Failures are classified into a closed
//! [`ErrorCode`](core::ErrorCode) taxonomy, counted, and recorded against the
//! cluster; they never reach sibling units or the cycle itself.
//!
//! ## Backpressure
//!
//! Submission to the [`Dispatcher`](core::Dispatcher) blocks while every
//! worker is busy and the queue is full. With the default queue depth of
//! zero no more units are in flight than there are workers.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fleet_autoscaler::builders::AutoscalerBuilder;
//! use fleet_autoscaler::config::AutoscalerConfig;
//! use fleet_autoscaler::runtime::CycleTimer;
//!
//! let config = AutoscalerConfig::from_env()?;
//! let interval = config.cycle_interval();
//! let autoscaler = AutoscalerBuilder::new(config)
//!     .store(store)
//!     .sessions(sessions)
//!     .jobs(jobs)
//!     .metrics_source(metrics_source)
//!     .build()?;
//!
//! let timer = CycleTimer::start(Arc::new(autoscaler), interval)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Cluster model, collaborator seams, dispatch and orchestration.
pub mod core;
/// Configuration models for the dispatcher and cycle schedule.
pub mod config;
/// Builders wiring collaborators into an autoscaler.
pub mod builders;
/// In-memory store and admission filters.
pub mod infra;
/// Periodic cycle driver.
pub mod runtime;
/// Clock, metrics and telemetry utilities.
pub mod util;
