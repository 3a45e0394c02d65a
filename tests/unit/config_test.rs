//! Tests for configuration loading and validation

use std::collections::HashMap;
use std::time::Duration;

use fleet_autoscaler::config::{AutoscalerConfig, DispatcherConfig};
use fleet_autoscaler::core::ConfigError;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_defaults_are_valid() {
    let cfg = AutoscalerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.dispatcher.max_queue_depth, 0);
    assert!(cfg.dispatcher.worker_count >= 1);
    assert_eq!(cfg.cycle_interval(), Duration::from_secs(30));
}

#[test]
fn test_dispatcher_config_rejects_zero_workers() {
    let cfg = DispatcherConfig::new().with_worker_count(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_dispatcher_config_rejects_tiny_stack() {
    let cfg = DispatcherConfig::new().with_thread_stack_size(1024);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_zero_interval_is_invalid() {
    let cfg = AutoscalerConfig {
        cycle_interval_secs: 0,
        ..AutoscalerConfig::default()
    };
    assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_from_json_partial_document() {
    let cfg = AutoscalerConfig::from_json_str(r#"{"dispatcher": {"worker_count": 3}}"#).unwrap();
    assert_eq!(cfg.dispatcher.worker_count, 3);
    assert_eq!(cfg.dispatcher.max_queue_depth, 0);
    assert_eq!(cfg.cycle_interval_secs, 30);
}

#[test]
fn test_from_json_rejects_malformed_and_invalid() {
    assert!(matches!(
        AutoscalerConfig::from_json_str("{ not json"),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        AutoscalerConfig::from_json_str(r#"{"dispatcher": {"worker_count": 0}}"#),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_from_lookup_overrides_defaults() {
    let cfg = AutoscalerConfig::from_lookup(lookup(&[
        ("AUTOSCALER_WORKER_COUNT", "6"),
        ("AUTOSCALER_MAX_QUEUE_DEPTH", " 2 "),
        ("AUTOSCALER_CYCLE_INTERVAL_SECS", "15"),
    ]))
    .unwrap();
    assert_eq!(cfg.dispatcher.worker_count, 6);
    assert_eq!(cfg.dispatcher.max_queue_depth, 2);
    assert_eq!(cfg.dispatcher.thread_stack_size, DispatcherConfig::default().thread_stack_size);
    assert_eq!(cfg.cycle_interval(), Duration::from_secs(15));
}

#[test]
fn test_from_lookup_reports_bad_values() {
    let err = AutoscalerConfig::from_lookup(lookup(&[("AUTOSCALER_WORKER_COUNT", "many")]))
        .unwrap_err();
    match err {
        ConfigError::Parse(msg) => assert!(msg.starts_with("AUTOSCALER_WORKER_COUNT")),
        ConfigError::Invalid(msg) => panic!("expected parse error, got {msg}"),
    }

    let err = AutoscalerConfig::from_lookup(lookup(&[("AUTOSCALER_WORKER_COUNT", "0")]))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_config_serde_round_trip() {
    let cfg = AutoscalerConfig {
        dispatcher: DispatcherConfig::new().with_worker_count(2).with_max_queue_depth(4),
        cycle_interval_secs: 10,
    };
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(AutoscalerConfig::from_json_str(&json).unwrap(), cfg);
}
