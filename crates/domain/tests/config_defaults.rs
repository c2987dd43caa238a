use std::path::PathBuf;

use mv_domain::config::{BackendKind, Config, ConfigSeverity, RateLimitConfig};

#[test]
fn empty_file_yields_documented_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.server.port, 8002);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.memory.root, PathBuf::from("./data/memories"));
    assert_eq!(config.memory.backend, BackendKind::Local);
    assert_eq!(config.sessions.max_sessions, 1000);
    assert_eq!(config.sessions.idle_timeout_minutes, Some(60));
    assert!(config.compaction.enabled);
    assert_eq!(config.compaction.trigger_input_tokens, 30_000);
    assert_eq!(config.compaction.keep_tool_uses, 3);
    assert_eq!(config.compaction.clear_at_least_tokens, 0);
    assert_eq!(config.compaction.exclude_tools, vec!["memory".to_string()]);
}

#[test]
fn backend_kind_parses_snake_case() {
    let toml_str = r#"
[memory]
root = "/var/lib/memvault"
backend = "in_memory"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.memory.backend, BackendKind::InMemory);
    assert_eq!(config.memory.root, PathBuf::from("/var/lib/memvault"));
}

#[test]
fn idle_timeout_can_be_overridden() {
    let toml_str = r#"
[sessions]
max_sessions = 10
idle_timeout_minutes = 5
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.sessions.max_sessions, 10);
    assert_eq!(config.sessions.idle_timeout_minutes, Some(5));
    assert_eq!(config.sessions.lock_timeout_secs, 30);
}

#[test]
fn default_cors_allows_only_localhost() {
    let config = Config::default();
    assert!(config
        .server
        .cors
        .allowed_origins
        .contains(&"http://localhost:*".to_string()));
    assert!(!config.server.cors.allowed_origins.contains(&"*".to_string()));
}

#[test]
fn validate_rejects_zero_max_sessions() {
    let mut config = Config::default();
    config.sessions.max_sessions = 0;
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|e| e.field == "sessions.max_sessions" && e.severity == ConfigSeverity::Error));
}

#[test]
fn validate_flags_zero_trigger_only_when_enabled() {
    let mut config = Config::default();
    config.compaction.trigger_input_tokens = 0;
    assert!(config
        .validate()
        .iter()
        .any(|e| e.field == "compaction.trigger_input_tokens"));

    config.compaction.enabled = false;
    assert!(!config
        .validate()
        .iter()
        .any(|e| e.field == "compaction.trigger_input_tokens"));
}

#[test]
fn validate_warns_on_wildcard_cors() {
    let mut config = Config::default();
    config.server.cors.allowed_origins = vec!["*".into()];
    let issue = config
        .validate()
        .into_iter()
        .find(|e| e.field == "server.cors.allowed_origins")
        .expect("wildcard should be flagged");
    assert_eq!(issue.severity, ConfigSeverity::Warning);
}

#[test]
fn validate_rejects_out_of_range_sampling_and_zero_rate_limit() {
    let mut config = Config::default();
    config.observability.sample_rate = 1.5;
    config.server.rate_limit = Some(RateLimitConfig {
        requests_per_second: 0,
        burst_size: 10,
    });
    let issues = config.validate();
    for field in ["observability.sample_rate", "server.rate_limit"] {
        assert!(issues
            .iter()
            .any(|e| e.field == field && e.severity == ConfigSeverity::Error));
    }
}
