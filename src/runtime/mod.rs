//! Drivers that run the autoscaler periodically.

pub mod timer;

pub use timer::CycleTimer;
