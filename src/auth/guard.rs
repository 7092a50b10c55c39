use super::NonceStore;
use crate::config::GatewayConfig;
use crate::error::AuthError;
use crate::paths::GatewayPaths;
use anyhow::Result;
use ipnet::IpNet;
use serde_json::Value;
use std::net::IpAddr;
use subtle::ConstantTimeEq;

/// Accept-or-reject decision for a mutating request.
///
/// Checks run cheapest-first and the nonce is committed last, so a request
/// rejected for any other reason never consumes its nonce.
#[derive(Debug)]
pub struct AuthGuard {
    token: Option<String>,
    allow: Vec<IpNet>,
    skew_seconds: u64,
    min_nonce_len: usize,
    max_nonce_len: usize,
    nonces: NonceStore,
}

impl AuthGuard {
    pub fn new(config: &GatewayConfig, nonces: NonceStore) -> Result<Self> {
        Ok(Self {
            token: config.effective_token().map(str::to_string),
            allow: config.allow_nets()?,
            skew_seconds: config.timestamp_skew_seconds,
            min_nonce_len: config.min_nonce_len,
            max_nonce_len: config.max_nonce_len,
            nonces,
        })
    }

    /// Build a guard whose nonce store lives under the configured state dir.
    pub fn from_config(config: &GatewayConfig, paths: &GatewayPaths) -> Result<Self> {
        let nonces = NonceStore::new(paths.nonces_path(), config.nonce_ttl_seconds);
        Self::new(config, nonces)
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Drop nonces older than the TTL from the store.
    pub fn purge_nonces(&self, now: i64) -> Result<usize> {
        let purged = self.nonces.purge(now)?;
        if purged > 0 {
            tracing::info!(purged, path = %self.nonces.path().display(), "dropped expired nonces");
        }
        Ok(purged)
    }

    /// Full check for `/approve`: token, remote, timestamp, nonce, then commit.
    pub fn authorize(
        &self,
        authorization: Option<&str>,
        remote: &str,
        timestamp: Option<&Value>,
        nonce: &str,
        now: i64,
    ) -> Result<(), AuthError> {
        self.check_bearer(authorization)?;
        self.check_remote(remote)?;
        self.check_timestamp(timestamp, now)?;
        self.check_nonce_shape(nonce)?;
        match self.nonces.check_and_commit(nonce, now) {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthError::Replay),
            Err(err) => Err(AuthError::PersistFailed(format!("{err:#}"))),
        }
    }

    /// Token-only check used by operator endpoints such as `/process`.
    pub fn check_bearer(&self, authorization: Option<&str>) -> Result<(), AuthError> {
        let expected = self.token.as_deref().ok_or(AuthError::ServerMisconfigured)?;
        let presented = authorization
            .map(str::trim)
            .and_then(|header| header.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(AuthError::BadToken("missing_bearer"))?;
        if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(AuthError::BadToken("bad_token"))
        }
    }

    pub fn check_remote(&self, remote: &str) -> Result<(), AuthError> {
        let ip = parse_remote(remote).ok_or_else(|| AuthError::BadRemote(remote.to_string()))?;
        if self.allow.iter().any(|net| net.contains(&ip)) {
            Ok(())
        } else {
            Err(AuthError::IpNotAllowed(ip.to_string()))
        }
    }

    pub fn check_timestamp(&self, timestamp: Option<&Value>, now: i64) -> Result<(), AuthError> {
        let skew = self.skew_seconds;
        match timestamp.and_then(parse_timestamp) {
            Some(ts) if now.abs_diff(ts) <= skew => Ok(()),
            // Missing or unparsable timestamps report ts=0 so the client still sees the window.
            other => Err(AuthError::TimestampOutOfRange {
                now,
                ts: other.unwrap_or(0),
                skew,
            }),
        }
    }

    fn check_nonce_shape(&self, nonce: &str) -> Result<(), AuthError> {
        let len = nonce.chars().count();
        if len < self.min_nonce_len || len > self.max_nonce_len {
            return Err(AuthError::BadNonce { len });
        }
        Ok(())
    }
}

/// Interpret a client timestamp: integer, float, digit string or RFC 3339.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(raw) => {
            let raw = raw.trim();
            if let Ok(secs) = raw.parse::<i64>() {
                return Some(secs);
            }
            if let Ok(secs) = raw.parse::<f64>() {
                return secs.is_finite().then_some(secs as i64);
            }
            chrono::DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|parsed| parsed.timestamp())
        }
        _ => None,
    }
}

fn parse_remote(remote: &str) -> Option<IpAddr> {
    let remote = remote.trim();
    let ip = remote
        .parse::<IpAddr>()
        .ok()
        .or_else(|| remote.parse::<std::net::SocketAddr>().ok().map(|addr| addr.ip()))?;
    Some(match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;

    const NOW: i64 = 1_700_000_000;

    fn guard(dir: &Path, token: Option<&str>) -> AuthGuard {
        let config = GatewayConfig {
            token: token.map(str::to_string),
            ..GatewayConfig::default()
        };
        let nonces = NonceStore::new(dir.join("nonces.json"), config.nonce_ttl_seconds);
        AuthGuard::new(&config, nonces).expect("guard")
    }

    fn authorize(guard: &AuthGuard, ts: Value, nonce: &str) -> Result<(), AuthError> {
        guard.authorize(Some("Bearer s3cret"), "127.0.0.1", Some(&ts), nonce, NOW)
    }

    #[test]
    fn missing_server_token_fails_closed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let guard = guard(dir.path(), None);
        assert_eq!(
            authorize(&guard, json!(NOW), "abcdef12"),
            Err(AuthError::ServerMisconfigured)
        );
        assert!(!guard.has_token());
    }

    #[test]
    fn token_checks_distinguish_missing_and_wrong() {
        let dir = tempfile::tempdir().expect("tempdir");
        let guard = guard(dir.path(), Some("s3cret"));
        assert_eq!(guard.check_bearer(None), Err(AuthError::BadToken("missing_bearer")));
        assert_eq!(
            guard.check_bearer(Some("Basic s3cret")),
            Err(AuthError::BadToken("missing_bearer"))
        );
        assert_eq!(
            guard.check_bearer(Some("Bearer s3cret-but-longer")),
            Err(AuthError::BadToken("bad_token"))
        );
        assert_eq!(guard.check_bearer(Some("Bearer s3cret")), Ok(()));
    }

    #[test]
    fn remote_must_be_inside_allow_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let guard = guard(dir.path(), Some("s3cret"));
        assert_eq!(guard.check_remote("192.168.1.20"), Ok(()));
        assert_eq!(guard.check_remote("169.254.3.4"), Ok(()));
        assert_eq!(guard.check_remote("::ffff:10.0.0.9"), Ok(()));
        assert_eq!(guard.check_remote("127.0.0.1:5555"), Ok(()));
        assert_eq!(
            guard.check_remote("8.8.8.8"),
            Err(AuthError::IpNotAllowed("8.8.8.8".to_string()))
        );
        assert_eq!(
            guard.check_remote("not-an-ip"),
            Err(AuthError::BadRemote("not-an-ip".to_string()))
        );
    }

    #[test]
    fn timestamp_window_boundaries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let guard = guard(dir.path(), Some("s3cret"));
        assert_eq!(authorize(&guard, json!(NOW - 299), "nonce-299"), Ok(()));
        assert_eq!(authorize(&guard, json!(NOW + 299), "nonce+299"), Ok(()));
        assert_eq!(
            authorize(&guard, json!(NOW - 301), "nonce-301"),
            Err(AuthError::TimestampOutOfRange {
                now: NOW,
                ts: NOW - 301,
                skew: 300
            })
        );
        assert!(matches!(
            authorize(&guard, json!(NOW + 301), "nonce+301"),
            Err(AuthError::TimestampOutOfRange { .. })
        ));
        assert!(matches!(
            guard.authorize(Some("Bearer s3cret"), "127.0.0.1", None, "nonce-none", NOW),
            Err(AuthError::TimestampOutOfRange { ts: 0, .. })
        ));
    }

    #[test]
    fn timestamp_formats() {
        assert_eq!(parse_timestamp(&json!(12)), Some(12));
        assert_eq!(parse_timestamp(&json!(12.9)), Some(12));
        assert_eq!(parse_timestamp(&json!(" 1700000000 ")), Some(1_700_000_000));
        assert_eq!(parse_timestamp(&json!("1700000000.5")), Some(1_700_000_000));
        assert_eq!(
            parse_timestamp(&json!("2023-11-14T22:13:20Z")),
            Some(1_700_000_000)
        );
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!(null)), None);
    }

    #[test]
    fn short_nonce_is_rejected_without_touching_the_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let guard = guard(dir.path(), Some("s3cret"));
        assert_eq!(
            authorize(&guard, json!(NOW), "short"),
            Err(AuthError::BadNonce { len: 5 })
        );
        assert!(!dir.path().join("nonces.json").exists());
        let long = "n".repeat(129);
        assert_eq!(
            authorize(&guard, json!(NOW), &long),
            Err(AuthError::BadNonce { len: 129 })
        );
    }

    #[test]
    fn replay_is_rejected_and_rejections_do_not_burn_nonces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let guard = guard(dir.path(), Some("s3cret"));
        assert!(authorize(&guard, json!(NOW - 1_000), "abcdef12").is_err());
        assert_eq!(authorize(&guard, json!(NOW), "abcdef12"), Ok(()));
        assert_eq!(authorize(&guard, json!(NOW), "abcdef12"), Err(AuthError::Replay));
    }
}
