//! Configuration loading from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serial_test::serial;
use subreddit_harvester::config::{Config, ConfigError, HarvestMode};

const VARS: &[&str] = &[
    "SUBREDDIT",
    "START_YEAR",
    "HARVEST_MODE",
    "REDDIT_ACCESS_TOKEN",
    "OUTPUT_DIR",
    "CHUNK_SIZE_MB",
    "PAGE_SIZE",
    "MAX_ATTEMPTS",
    "POST_DELAY_MIN_MS",
    "POST_DELAY_MAX_MS",
    "EXPAND_MORE",
    "PROGRESS_EVERY",
    "LOG_FILE",
];

fn clear_env() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_public_mode_defaults() {
    clear_env();
    std::env::set_var("SUBREDDIT", "r/rust");
    std::env::set_var("START_YEAR", "2023");

    let config = Config::from_env().expect("config");

    assert_eq!(config.source_name, "rust");
    assert_eq!(config.start_year, 2023);
    assert_eq!(config.mode, HarvestMode::Public);
    assert!(!config.expand_more);
    assert_eq!(config.progress_every, 5);
    assert_eq!(config.post_delay.min, Duration::from_millis(1500));
    assert_eq!(config.output_dir, PathBuf::from("./rust_data_noauth"));
    assert_eq!(
        config.log_file,
        Some(PathBuf::from("./rust_data_noauth").join("rust.log"))
    );
    assert_eq!(config.archive.chunk_threshold_bytes, 100 * 1024 * 1024);
    assert!(config.validate().is_ok());

    clear_env();
}

#[test]
#[serial]
fn test_api_mode_defaults_and_overrides() {
    clear_env();
    std::env::set_var("SUBREDDIT", "rust");
    std::env::set_var("START_YEAR", "2022");
    std::env::set_var("HARVEST_MODE", "api");
    std::env::set_var("REDDIT_ACCESS_TOKEN", "secret");
    std::env::set_var("CHUNK_SIZE_MB", "5");
    std::env::set_var("LOG_FILE", "off");
    std::env::set_var("OUTPUT_DIR", "/tmp/harvest");

    let config = Config::from_env().expect("config");

    assert_eq!(config.mode, HarvestMode::Api);
    assert!(config.expand_more);
    assert_eq!(config.progress_every, 10);
    assert_eq!(config.access_token.as_deref(), Some("secret"));
    assert_eq!(config.archive.chunk_threshold_bytes, 5 * 1024 * 1024);
    assert_eq!(config.output_dir, PathBuf::from("/tmp/harvest"));
    assert!(config.log_file.is_none());
    assert!(config.validate().is_ok());

    clear_env();
}

#[test]
#[serial]
fn test_missing_required_vars() {
    clear_env();
    std::env::set_var("START_YEAR", "2023");

    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::MissingEnvVar(ref name)) if name == "SUBREDDIT"
    ));

    clear_env();
}

#[test]
#[serial]
fn test_invalid_values_rejected() {
    clear_env();
    std::env::set_var("SUBREDDIT", "rust");
    std::env::set_var("START_YEAR", "2023");
    std::env::set_var("EXPAND_MORE", "sometimes");

    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::ParseBool { .. })
    ));

    std::env::set_var("EXPAND_MORE", "yes");
    std::env::set_var("HARVEST_MODE", "api");
    let config = Config::from_env().expect("config");
    assert!(config.validate().is_err(), "api mode needs a token");

    clear_env();
}

#[test]
#[serial]
fn test_source_name_outside_alphabet_rejected() {
    clear_env();
    std::env::set_var("START_YEAR", "2023");

    for bad in ["../escaped", "rust/../../tmp", "r\\x", "a_name_that_is_too_long_x"] {
        std::env::set_var("SUBREDDIT", bad);
        let config = Config::from_env().expect("config loads");
        assert!(
            matches!(
                config.validate(),
                Err(ConfigError::InvalidValue { ref name, .. }) if name == "SUBREDDIT"
            ),
            "{bad} should be rejected"
        );
    }

    std::env::set_var("SUBREDDIT", "r/Ask_Science2");
    let config = Config::from_env().expect("config loads");
    assert_eq!(config.source_name, "Ask_Science2");
    assert!(config.validate().is_ok());

    clear_env();
}
