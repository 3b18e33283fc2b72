use std::time::Duration;

use agent_switchboard::config::{GlobalConfig, MAX_TIMEOUT_SECONDS};
use agent_switchboard::AppError;

fn sample_toml() -> &'static str {
    r#"
db_path = "data/switchboard.db"
host_cli = "claude"
host_cli_args = ["--model", "sonnet"]
max_output_length = 1900
event_buffer = 16

[timeouts]
session_seconds = 120
decision_seconds = 45

[status]
interval_ms = 500
preview_chars = 200
"#
}

#[test]
fn parses_valid_config() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("config parses");

    assert_eq!(config.db_path.to_str(), Some("data/switchboard.db"));
    assert_eq!(config.host_cli, "claude");
    assert_eq!(config.host_cli_args, vec!["--model", "sonnet"]);
    assert_eq!(config.max_output_length, 1900);
    assert_eq!(config.event_buffer, 16);
    assert_eq!(config.session_timeout(), Duration::from_secs(120));
    assert_eq!(config.decision_timeout(), Duration::from_secs(45));
    assert_eq!(config.status_interval(), Duration::from_millis(500));
    assert_eq!(config.status.preview_chars, 200);
}

#[test]
fn empty_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("defaults");

    assert_eq!(config, GlobalConfig::default());
    assert_eq!(config.host_cli, "claude");
    assert_eq!(config.max_output_length, 4000);
    assert_eq!(config.session_timeout(), Duration::from_secs(600));
    assert_eq!(config.decision_timeout(), Duration::from_secs(300));
    assert_eq!(config.status_interval(), Duration::from_millis(1500));
    assert_eq!(config.status.preview_chars, 800);
}

#[test]
fn partial_timeout_table_fills_defaults() {
    let config = GlobalConfig::from_toml_str("[timeouts]\nsession_seconds = 30\n").expect("parses");

    assert_eq!(config.session_timeout(), Duration::from_secs(30));
    assert_eq!(config.decision_timeout(), Duration::from_secs(300));
}

#[test]
fn rejects_zero_timeouts() {
    let result = GlobalConfig::from_toml_str("[timeouts]\ndecision_seconds = 0\n");
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("timeouts")));
}

#[test]
fn rejects_timeouts_beyond_one_year() {
    let result = GlobalConfig::from_toml_str("[timeouts]\nsession_seconds = 9223372036854775807\n");
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("must not exceed")));

    let over = MAX_TIMEOUT_SECONDS + 1;
    let result = GlobalConfig::from_toml_str(&format!("[timeouts]\ndecision_seconds = {over}\n"));
    assert!(matches!(result, Err(AppError::Config(_))));

    let config = GlobalConfig::from_toml_str(&format!(
        "[timeouts]\nsession_seconds = {MAX_TIMEOUT_SECONDS}\n"
    ))
    .expect("one year is accepted");
    assert_eq!(config.session_timeout(), Duration::from_secs(MAX_TIMEOUT_SECONDS));
}

#[test]
fn rejects_empty_host_cli() {
    let result = GlobalConfig::from_toml_str("host_cli = \"  \"\n");
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("host_cli")));
}

#[test]
fn rejects_zero_output_length() {
    let result = GlobalConfig::from_toml_str("max_output_length = 0\n");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn rejects_invalid_toml() {
    let result = GlobalConfig::from_toml_str("host_cli = [");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn loads_from_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, sample_toml()).expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("load");
    assert_eq!(config.host_cli_args.len(), 2);
}

#[test]
fn missing_file_is_config_error() {
    let result = GlobalConfig::load_from_path("/definitely/not/here.toml");
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("failed to read config")));
}
