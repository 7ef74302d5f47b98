#![allow(non_snake_case)]

use std::time::Duration;

use recon_config::{config_group, ReconConfig};
use serial_test::serial;
use utils::EnvVarGuard;

mod retry {
    use super::*;
    config_group!({
        ref TEST_INT: usize = 42;
        ref TEST_DELAY: Duration = Duration::from_secs(1);
    });
}

#[test]
fn test_defaults() {
    let config = ReconConfig::default();

    assert_eq!(config.client.endpoint, "http://localhost:5000");
    assert_eq!(config.client.upload_timeout, Duration::from_secs(600));
    assert_eq!(config.client.poll_timeout, Duration::from_secs(60));
    assert_eq!(config.session.poll_interval, Duration::from_secs(3));
    assert_eq!(config.session.poll_error_delay, Duration::from_secs(10));
    assert_eq!(config.session.min_images, 3);
    assert!(config.log.dest.is_none());
    assert_eq!(config.log.prefix, "recon");
}

#[test]
fn test_group_name_comes_from_module() {
    assert_eq!(retry::ConfigValueGroup::group_name(), "retry");
    assert_eq!(recon_config::groups::session::ConfigValueGroup::group_name(), "session");
}

#[test]
#[serial(config_env)]
fn test_env_overrides_use_group_prefix() {
    let _g1 = EnvVarGuard::set("RECON_CLIENT_ENDPOINT", "http://recon.internal:8080");
    let _g2 = EnvVarGuard::set("RECON_SESSION_POLL_INTERVAL", "500ms");
    let _g3 = EnvVarGuard::set("RECON_SESSION_MIN_IMAGES", "5");
    let _g4 = EnvVarGuard::set("RECON_LOG_DEST", "/tmp/recon-logs/");

    let config = ReconConfig::new();

    assert_eq!(config.client.endpoint, "http://recon.internal:8080");
    assert_eq!(config.session.poll_interval, Duration::from_millis(500));
    assert_eq!(config.session.min_images, 5);
    assert_eq!(config.log.dest.as_deref(), Some("/tmp/recon-logs/"));
    // Untouched values keep their defaults.
    assert_eq!(config.session.poll_error_delay, Duration::from_secs(10));
}

#[test]
#[serial(config_env)]
fn test_unparseable_env_value_keeps_default() {
    let _g = EnvVarGuard::set("RECON_RETRY_TEST_INT", "forty-two");
    let _d = EnvVarGuard::set("RECON_RETRY_TEST_DELAY", "2s");

    let mut group = retry::ConfigValueGroup::new();
    group.apply_env_overrides();

    assert_eq!(group.TEST_INT, 42);
    assert_eq!(group.TEST_DELAY, Duration::from_secs(2));
}

#[test]
#[serial(config_env)]
fn test_builder_overrides_env() {
    let _g = EnvVarGuard::set("RECON_CLIENT_ENDPOINT", "http://from-env:1");

    let config = ReconConfig::new().with_endpoint("http://from-flag:2");
    assert_eq!(config.client.endpoint, "http://from-flag:2");
}
