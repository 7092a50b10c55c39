use super::{
    apply_env_overrides, load_config, parse_cidr, read_config_file, validate_config,
    GatewayConfig, DEFAULT_CONFIG_REL,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent directory");
    }
    std::fs::write(path, contents.as_bytes()).expect("write file");
}

fn env_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[test]
fn defaults_validate_and_fail_closed() {
    let config = GatewayConfig::default();
    validate_config(&config).expect("defaults validate");
    assert_eq!(config.effective_token(), None);
    assert_eq!(config.timestamp_skew_seconds, 300);
    assert_eq!(config.nonce_ttl_seconds, 900);
    assert!(config.allow_cidrs.iter().any(|cidr| cidr == "169.254.0.0/16"));
}

#[test]
fn token_is_trimmed_and_unquoted() {
    let config = GatewayConfig {
        token: Some("  \"s3cret\"  ".to_string()),
        ..GatewayConfig::default()
    };
    assert_eq!(config.effective_token(), Some("s3cret"));

    let blank = GatewayConfig {
        token: Some("''".to_string()),
        ..GatewayConfig::default()
    };
    assert_eq!(blank.effective_token(), None);
}

#[test]
fn yaml_file_overrides_defaults_and_keeps_the_rest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("gateway.yaml");
    write_file(
        &path,
        "token: abc\nallow_cidrs: [\"192.168.1.0/24\"]\nnonce_ttl_seconds: 60\nextra_key: ignored\n",
    );
    let config = read_config_file(&path).expect("read config");
    assert_eq!(config.token.as_deref(), Some("abc"));
    assert_eq!(config.allow_cidrs, vec!["192.168.1.0/24"]);
    assert_eq!(config.nonce_ttl_seconds, 60);
    assert_eq!(config.timestamp_skew_seconds, 300);
    assert_eq!(config.plan_path, PathBuf::from("project/plans/project_plan_v3.yaml"));
}

#[test]
fn env_overrides_take_precedence() {
    let mut config = GatewayConfig::default();
    let env = env_map(&[
        ("PHONE_APPROVALS_TOKEN", "from-env"),
        ("PHONE_TS_SKEW_SEC", "120"),
        ("PHONE_ALLOW_CIDRS", "10.1.0.0/16, ,127.0.0.1"),
        ("PHONE_POLL_SEC", "0"),
    ]);
    apply_env_overrides(&mut config, |key| env.get(key).cloned()).expect("apply env");
    assert_eq!(config.token.as_deref(), Some("from-env"));
    assert_eq!(config.timestamp_skew_seconds, 120);
    assert_eq!(config.allow_cidrs, vec!["10.1.0.0/16", "127.0.0.1"]);
    assert_eq!(config.poll_interval_seconds, 0);
    validate_config(&config).expect("overridden config validates");
}

#[test]
fn env_override_rejects_garbage_numbers() {
    let mut config = GatewayConfig::default();
    let env = env_map(&[("PHONE_NONCE_TTL_SEC", "soon")]);
    let err = apply_env_overrides(&mut config, |key| env.get(key).cloned())
        .expect_err("non-numeric ttl");
    assert!(err.to_string().contains("PHONE_NONCE_TTL_SEC"));
}

#[test]
fn validation_rejects_unsafe_configs() {
    let cases = [
        GatewayConfig {
            allow_cidrs: Vec::new(),
            ..GatewayConfig::default()
        },
        GatewayConfig {
            allow_cidrs: vec!["not-a-net".to_string()],
            ..GatewayConfig::default()
        },
        GatewayConfig {
            timestamp_skew_seconds: 0,
            ..GatewayConfig::default()
        },
        GatewayConfig {
            nonce_ttl_seconds: 0,
            ..GatewayConfig::default()
        },
        GatewayConfig {
            min_nonce_len: 200,
            ..GatewayConfig::default()
        },
        GatewayConfig {
            bind: "localhost-ish".to_string(),
            ..GatewayConfig::default()
        },
    ];
    for config in cases {
        assert!(validate_config(&config).is_err(), "accepted {config:?}");
    }
}

#[test]
fn bare_addresses_are_single_host_networks() {
    let net = parse_cidr("192.168.4.7").expect("bare v4");
    assert_eq!(net.prefix_len(), 32);
    let net = parse_cidr("::1").expect("bare v6");
    assert_eq!(net.prefix_len(), 128);
    let net = parse_cidr("10.9.8.7/8").expect("host bits");
    assert_eq!(net.to_string(), "10.0.0.0/8");
}

#[test]
fn load_config_reads_the_root_default_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(
        &dir.path().join(DEFAULT_CONFIG_REL),
        "bind: 127.0.0.1:9911\nrecent_limit: 7\n",
    );
    let config = load_config(dir.path(), None).expect("load config");
    assert_eq!(config.bind, "127.0.0.1:9911");
    assert_eq!(config.recent_limit, 7);
}

#[test]
fn explicit_missing_config_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = load_config(dir.path(), Some(Path::new("nope.yaml"))).expect_err("missing");
    assert!(err.to_string().contains("config file not found"));
}
