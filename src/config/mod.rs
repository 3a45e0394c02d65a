//! Configuration models for the dispatcher and the cycle driver.

pub mod autoscaler;

pub use autoscaler::{AutoscalerConfig, DispatcherConfig};
