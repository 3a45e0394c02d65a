//! Builders to assemble an autoscaler from configuration and collaborators.

pub mod autoscaler_builder;

pub use autoscaler_builder::AutoscalerBuilder;
