//! Runtime configuration shared by the host and the CLI.
//!
//! Read from `TABBRIDGE_*` environment variables, then adjusted with the
//! `with_*` builders (command-line flags win over the environment).

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use crate::bridge::codec::DEFAULT_MAX_FRAME_LENGTH;
use crate::bridge::transport::default_socket_path;

pub const ENV_SOCKET: &str = "TABBRIDGE_SOCKET";
pub const ENV_TIMEOUT_SECS: &str = "TABBRIDGE_TIMEOUT_SECS";
pub const ENV_RELAY_TIMEOUT_SECS: &str = "TABBRIDGE_RELAY_TIMEOUT_SECS";
pub const ENV_MAX_CONCURRENT_HANDLERS: &str = "TABBRIDGE_MAX_CONCURRENT_HANDLERS";
pub const ENV_MAX_FRAME_BYTES: &str = "TABBRIDGE_MAX_FRAME_BYTES";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: expected {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Unix socket the host listens on and the CLI connects to.
    pub socket_path: PathBuf,
    /// Per-request deadline; `None` waits until reply or transport failure.
    pub request_timeout: Option<Duration>,
    /// Host-side deadline for relaying a command to the browser. Shorter than
    /// `request_timeout` so the CLI hears why. `None` uses `request_timeout`.
    pub relay_timeout: Option<Duration>,
    /// Cap on concurrently running handlers per router; `None` is unbounded.
    pub max_concurrent_handlers: Option<NonZeroUsize>,
    pub max_frame_length: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            request_timeout: Some(DEFAULT_TIMEOUT),
            relay_timeout: Some(DEFAULT_RELAY_TIMEOUT),
            max_concurrent_handlers: None,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup. Unset or empty variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(path) = get(ENV_SOCKET) {
            config.socket_path = PathBuf::from(path);
        }

        if let Some(raw) = get(ENV_TIMEOUT_SECS) {
            config.request_timeout = timeout_from_secs(parse_secs(ENV_TIMEOUT_SECS, &raw)?);
        }

        if let Some(raw) = get(ENV_RELAY_TIMEOUT_SECS) {
            config.relay_timeout = timeout_from_secs(parse_secs(ENV_RELAY_TIMEOUT_SECS, &raw)?);
        }

        if let Some(raw) = get(ENV_MAX_CONCURRENT_HANDLERS) {
            let n = parse_positive(ENV_MAX_CONCURRENT_HANDLERS, &raw)?;
            config.max_concurrent_handlers = Some(n);
        }

        if let Some(raw) = get(ENV_MAX_FRAME_BYTES) {
            config.max_frame_length = parse_positive(ENV_MAX_FRAME_BYTES, &raw)?.get();
        }

        Ok(config)
    }

    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_relay_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.relay_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_handlers(mut self, n: Option<NonZeroUsize>) -> Self {
        self.max_concurrent_handlers = n;
        self
    }

    pub fn with_max_frame_length(mut self, n: usize) -> Self {
        self.max_frame_length = n;
        self
    }
}

/// `0` means no deadline.
pub fn timeout_from_secs(secs: f64) -> Option<Duration> {
    if secs == 0.0 {
        None
    } else {
        Some(Duration::from_secs_f64(secs))
    }
}

fn parse_secs(var: &'static str, raw: &str) -> Result<f64, ConfigError> {
    raw.trim()
        .parse()
        .ok()
        .filter(|s: &f64| s.is_finite() && *s >= 0.0)
        .ok_or_else(|| ConfigError::Invalid {
            var,
            expected: "a non-negative number of seconds",
            value: raw.to_string(),
        })
}

fn parse_positive(var: &'static str, raw: &str) -> Result<NonZeroUsize, ConfigError> {
    raw.trim()
        .parse::<NonZeroUsize>()
        .map_err(|_| ConfigError::Invalid {
            var,
            expected: "a positive integer",
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = BridgeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.relay_timeout, Some(Duration::from_secs(25)));
        assert_eq!(config.max_concurrent_handlers, None);
        assert_eq!(config.max_frame_length, DEFAULT_MAX_FRAME_LENGTH);
        assert!(config.socket_path.ends_with("tabbridge.sock") || {
            let name = config.socket_path.file_name().unwrap().to_string_lossy();
            name.starts_with("tabbridge-") && name.ends_with(".sock")
        });
    }

    #[test]
    fn reads_all_variables() {
        let config = BridgeConfig::from_lookup(lookup(&[
            (ENV_SOCKET, "/tmp/x.sock"),
            (ENV_TIMEOUT_SECS, "2.5"),
            (ENV_RELAY_TIMEOUT_SECS, "2"),
            (ENV_MAX_CONCURRENT_HANDLERS, "4"),
            (ENV_MAX_FRAME_BYTES, "1024"),
        ]))
        .unwrap();

        assert_eq!(config.socket_path, PathBuf::from("/tmp/x.sock"));
        assert_eq!(config.request_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.relay_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.max_concurrent_handlers, NonZeroUsize::new(4));
        assert_eq!(config.max_frame_length, 1024);
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let config = BridgeConfig::from_lookup(lookup(&[
            (ENV_TIMEOUT_SECS, "0"),
            (ENV_RELAY_TIMEOUT_SECS, "0"),
        ]))
        .unwrap();
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.relay_timeout, None);
    }

    #[test]
    fn empty_variable_keeps_default() {
        let config = BridgeConfig::from_lookup(lookup(&[(ENV_MAX_CONCURRENT_HANDLERS, " ")])).unwrap();
        assert_eq!(config.max_concurrent_handlers, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = BridgeConfig::from_lookup(lookup(&[(ENV_TIMEOUT_SECS, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: ENV_TIMEOUT_SECS, .. }));

        let err = BridgeConfig::from_lookup(lookup(&[(ENV_TIMEOUT_SECS, "-1")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: ENV_TIMEOUT_SECS, .. }));

        let err = BridgeConfig::from_lookup(lookup(&[(ENV_RELAY_TIMEOUT_SECS, "NaN")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: ENV_RELAY_TIMEOUT_SECS, .. }));

        let err =
            BridgeConfig::from_lookup(lookup(&[(ENV_MAX_CONCURRENT_HANDLERS, "0")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TABBRIDGE_MAX_CONCURRENT_HANDLERS: expected a positive integer, got \"0\""
        );
    }

    #[test]
    fn builders_override() {
        let config = BridgeConfig::default()
            .with_socket_path("/run/t.sock")
            .with_request_timeout(None)
            .with_relay_timeout(Some(Duration::from_secs(1)))
            .with_max_concurrent_handlers(NonZeroUsize::new(2))
            .with_max_frame_length(10);

        assert_eq!(config.socket_path, PathBuf::from("/run/t.sock"));
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.relay_timeout, Some(Duration::from_secs(1)));
        assert_eq!(config.max_concurrent_handlers, NonZeroUsize::new(2));
        assert_eq!(config.max_frame_length, 10);
    }
}
