//! Dispatcher and cycle configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::ConfigError;

/// Smallest stack a worker thread may be given.
const MIN_STACK_SIZE: usize = 64 * 1024;

const ENV_WORKER_COUNT: &str = "AUTOSCALER_WORKER_COUNT";
const ENV_QUEUE_DEPTH: &str = "AUTOSCALER_MAX_QUEUE_DEPTH";
const ENV_STACK_SIZE: &str = "AUTOSCALER_THREAD_STACK_SIZE";
const ENV_INTERVAL: &str = "AUTOSCALER_CYCLE_INTERVAL_SECS";

/// Worker pool sizing for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Number of worker threads, i.e. the maximum number of clusters
    /// evaluated at once.
    pub worker_count: usize,
    /// Units that may wait for a worker before `submit` blocks. Zero makes
    /// every submission wait for an idle worker.
    pub max_queue_depth: usize,
    /// Stack size of each worker thread in bytes.
    pub thread_stack_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().max(1),
            max_queue_depth: 0,
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl DispatcherConfig {
    /// Defaults: one worker per CPU, rendezvous queue, 2 MiB stacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the queue depth.
    #[must_use]
    pub const fn with_max_queue_depth(mut self, max_queue_depth: usize) -> Self {
        self.max_queue_depth = max_queue_depth;
        self
    }

    /// Set the worker stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, thread_stack_size: usize) -> Self {
        self.thread_stack_size = thread_stack_size;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.thread_stack_size < MIN_STACK_SIZE {
            return Err(format!("thread_stack_size must be at least {MIN_STACK_SIZE} bytes"));
        }
        Ok(())
    }
}

/// Root autoscaler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscalerConfig {
    /// Worker pool sizing.
    pub dispatcher: DispatcherConfig,
    /// Seconds between cycle starts.
    pub cycle_interval_secs: u64,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherConfig::default(),
            cycle_interval_secs: 30,
        }
    }
}

impl AutoscalerConfig {
    /// Interval between cycle starts.
    #[must_use]
    pub const fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    /// Validate all values.
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` naming the offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dispatcher
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("dispatcher: {e}")))?;
        if self.cycle_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "cycle_interval_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// `ConfigError::Parse` for malformed JSON, `ConfigError::Invalid` for
    /// out-of-range values.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `AUTOSCALER_*` environment variables,
    /// loading a `.env` file first if one exists. Unset variables keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// `ConfigError::Parse` if a variable is not a valid integer,
    /// `ConfigError::Invalid` for out-of-range values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`AutoscalerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = parse_var(&lookup, ENV_WORKER_COUNT)? {
            cfg.dispatcher.worker_count = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_QUEUE_DEPTH)? {
            cfg.dispatcher.max_queue_depth = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_STACK_SIZE)? {
            cfg.dispatcher.thread_stack_size = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_INTERVAL)? {
            cfg.cycle_interval_secs = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::Parse(format!("{key}: {e}")))
        })
        .transpose()
}
