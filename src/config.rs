//! Gateway configuration.
//!
//! Defaults are safe on their own (private-network CIDRs, no token, so the
//! auth path fails closed). A config file and environment variables layer on
//! top, in that order.
use crate::util::strip_wrapping_quotes;
use anyhow::{anyhow, Context, Result};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default config file, relative to the gateway root.
pub const DEFAULT_CONFIG_REL: &str = "config/phone_approvals.yaml";
/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "APPROVALS_CONFIG";

const DEFAULT_ALLOW_CIDRS: [&str; 8] = [
    "127.0.0.0/8",
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "169.254.0.0/16",
    "::1/128",
    "fe80::/10",
    "fc00::/7",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Shared bearer secret. `None` (or empty) rejects every mutating request.
    pub token: Option<String>,
    pub allow_cidrs: Vec<String>,
    pub timestamp_skew_seconds: u64,
    pub nonce_ttl_seconds: u64,
    pub min_nonce_len: usize,
    pub max_nonce_len: usize,
    pub approvals_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub state_dir: PathBuf,
    pub notes_path: PathBuf,
    pub plan_path: PathBuf,
    pub bind: String,
    /// Seconds between dispatcher runs while serving; 0 disables the poller.
    pub poll_interval_seconds: u64,
    pub auth_timeout_ms: u64,
    pub recent_limit: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            token: None,
            allow_cidrs: DEFAULT_ALLOW_CIDRS.iter().map(|c| c.to_string()).collect(),
            timestamp_skew_seconds: 300,
            nonce_ttl_seconds: 900,
            min_nonce_len: 8,
            max_nonce_len: 128,
            approvals_dir: PathBuf::from("tmp/phone/approvals"),
            processed_dir: PathBuf::from("tmp/phone/processed"),
            state_dir: PathBuf::from("tmp/phone/state"),
            notes_path: PathBuf::from("tmp/notes/notes.md"),
            plan_path: PathBuf::from("project/plans/project_plan_v3.yaml"),
            bind: "127.0.0.1:8778".to_string(),
            poll_interval_seconds: 5,
            auth_timeout_ms: 750,
            recent_limit: 25,
        }
    }
}

impl GatewayConfig {
    /// Configured token after trimming and quote stripping; empty means unset.
    pub fn effective_token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(strip_wrapping_quotes)
            .filter(|token| !token.is_empty())
    }

    /// Parse the allow-list; call `validate_config` first for a clear error.
    pub fn allow_nets(&self) -> Result<Vec<IpNet>> {
        self.allow_cidrs
            .iter()
            .map(|cidr| parse_cidr(cidr))
            .collect()
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .trim()
            .parse()
            .with_context(|| format!("invalid bind address {:?}", self.bind))
    }
}

/// Parse a CIDR block, accepting a bare address as a single-host network.
pub fn parse_cidr(raw: &str) -> Result<IpNet> {
    let raw = raw.trim();
    if let Ok(net) = raw.parse::<IpNet>() {
        return Ok(net.trunc());
    }
    let addr = raw
        .parse::<std::net::IpAddr>()
        .map_err(|_| anyhow!("invalid CIDR {raw:?}"))?;
    let prefix = if addr.is_ipv4() { 32 } else { 128 };
    IpNet::new(addr, prefix).map_err(|_| anyhow!("invalid CIDR {raw:?}"))
}

/// Pick the config file: explicit flag, then env, then the root default, then
/// the per-user config dir. Only the explicit choices must exist.
pub fn resolve_config_path(root: &Path, explicit: Option<&Path>) -> Option<(PathBuf, bool)> {
    if let Some(path) = explicit {
        return Some((root.join(path), true));
    }
    if let Ok(raw) = std::env::var(CONFIG_ENV) {
        if !raw.trim().is_empty() {
            return Some((root.join(raw.trim()), true));
        }
    }
    let local = root.join(DEFAULT_CONFIG_REL);
    if local.is_file() {
        return Some((local, false));
    }
    dirs::config_dir()
        .map(|dir| dir.join("approval-gateway").join("config.yaml"))
        .filter(|path| path.is_file())
        .map(|path| (path, false))
}

/// Load config from file (if any) and apply environment overrides.
pub fn load_config(root: &Path, explicit: Option<&Path>) -> Result<GatewayConfig> {
    let mut config = match resolve_config_path(root, explicit) {
        Some((path, required)) => {
            if path.is_file() {
                read_config_file(&path)?
            } else if required {
                return Err(anyhow!("config file not found: {}", path.display()));
            } else {
                GatewayConfig::default()
            }
        }
        None => GatewayConfig::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Parse a YAML (or JSON) config file; unknown keys are ignored.
pub fn read_config_file(path: &Path) -> Result<GatewayConfig> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    if text.trim().is_empty() {
        return Ok(GatewayConfig::default());
    }
    let config: GatewayConfig = serde_yaml::from_str(&text)
        .with_context(|| format!("parse config {}", path.display()))?;
    Ok(config)
}

/// Apply `PHONE_*` overrides using `lookup` so tests need not touch the
/// process environment.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = lookup("PHONE_APPROVALS_TOKEN") {
        if !token.trim().is_empty() {
            config.token = Some(token);
        }
    }
    if let Some(raw) = lookup("PHONE_TS_SKEW_SEC") {
        config.timestamp_skew_seconds = parse_env_u64("PHONE_TS_SKEW_SEC", &raw)?;
    }
    if let Some(raw) = lookup("PHONE_NONCE_TTL_SEC") {
        config.nonce_ttl_seconds = parse_env_u64("PHONE_NONCE_TTL_SEC", &raw)?;
    }
    if let Some(raw) = lookup("PHONE_ALLOW_CIDRS") {
        let cidrs: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|cidr| !cidr.is_empty())
            .map(str::to_string)
            .collect();
        if !cidrs.is_empty() {
            config.allow_cidrs = cidrs;
        }
    }
    if let Some(raw) = lookup("PHONE_BIND") {
        if !raw.trim().is_empty() {
            config.bind = raw.trim().to_string();
        }
    }
    if let Some(raw) = lookup("PHONE_POLL_SEC") {
        config.poll_interval_seconds = parse_env_u64("PHONE_POLL_SEC", &raw)?;
    }
    Ok(())
}

fn parse_env_u64(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .with_context(|| format!("{key} must be a non-negative integer (got {raw:?})"))
}

/// Reject configs that would make the auth path meaningless or fail open.
pub fn validate_config(config: &GatewayConfig) -> Result<()> {
    if config.allow_cidrs.is_empty() {
        return Err(anyhow!("allow_cidrs must list at least one network"));
    }
    for cidr in &config.allow_cidrs {
        parse_cidr(cidr)?;
    }
    if config.timestamp_skew_seconds == 0 {
        return Err(anyhow!("timestamp_skew_seconds must be positive"));
    }
    if config.nonce_ttl_seconds == 0 {
        return Err(anyhow!("nonce_ttl_seconds must be positive"));
    }
    if config.min_nonce_len > config.max_nonce_len {
        return Err(anyhow!(
            "min_nonce_len ({}) exceeds max_nonce_len ({})",
            config.min_nonce_len,
            config.max_nonce_len
        ));
    }
    config.bind_addr()?;
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
