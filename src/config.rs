//! Configuration management for the WebDrop relay

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default public reflection servers handed to clients
pub const DEFAULT_STUN_SERVERS: &[&str] = &[
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub ice: IceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Base URL of the web client; session links are `{public_url}/receiver/{id}`
    pub public_url: String,
    /// Seconds an unjoined session may live; 0 disables expiry
    pub session_ttl_secs: u64,
    /// Seconds between expiry sweeps
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IceConfig {
    pub stun_urls: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            relay: RelayConfig {
                public_url: "http://localhost:5173".to_string(),
                session_ttl_secs: 600,
                sweep_interval_secs: 30,
            },
            ice: IceConfig {
                stun_urls: DEFAULT_STUN_SERVERS.iter().map(|s| s.to_string()).collect(),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var(&lookup, "SERVER_PORT", defaults.server.port)?,
            },
            relay: RelayConfig {
                public_url: lookup("PUBLIC_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.relay.public_url),
                session_ttl_secs: parse_var(&lookup, "SESSION_TTL_SECS", defaults.relay.session_ttl_secs)?,
                sweep_interval_secs: parse_var(
                    &lookup,
                    "SWEEP_INTERVAL_SECS",
                    defaults.relay.sweep_interval_secs,
                )?
                .max(1),
            },
            ice: IceConfig {
                stun_urls: lookup("STUN_SERVERS")
                    .map(|list| {
                        list.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or(defaults.ice.stun_urls),
            },
        })
    }

    /// Unjoined-session expiry, `None` when disabled
    pub fn session_ttl(&self) -> Option<chrono::Duration> {
        match self.relay.session_ttl_secs {
            0 => None,
            secs => chrono::Duration::try_seconds(secs.min(i64::MAX as u64) as i64),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.relay.sweep_interval_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_var<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.relay.public_url, "http://localhost:5173");
        assert_eq!(config.session_ttl(), Some(chrono::Duration::seconds(600)));
        assert_eq!(config.ice.stun_urls.len(), 2);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("SERVER_PORT", "8080"),
            ("PUBLIC_URL", "https://drop.example.com/"),
            ("SESSION_TTL_SECS", "0"),
            ("STUN_SERVERS", "stun:a:1, stun:b:2,"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.relay.public_url, "https://drop.example.com");
        assert_eq!(config.session_ttl(), None);
        assert_eq!(config.ice.stun_urls, vec!["stun:a:1", "stun:b:2"]);
    }

    #[test]
    fn test_invalid_port() {
        let err = Config::from_lookup(lookup(&[("SERVER_PORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("SERVER_PORT"));
    }
}
