use std::time::Duration;

use serde::Deserialize;

use crate::service::{proxy::ShardHandle, sharding::subscriber::Backoff};

/// Prefix of every environment variable read by [`Config::from_env`]
pub const ENV_PREFIX: &str = "SHARDING_";

/// Environment config, e.g. `SHARDING_REDIS_HOST=redis.internal`
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_redis_host")]
    pub redis_host: String,
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,
    #[serde(default)]
    pub redis_password: Option<String>,

    /// Milliseconds the destination shard gets to pre-load before the handoff
    #[serde(default = "default_preload_delay")]
    pub preload_delay: u64,

    #[serde(default = "default_reconnect_min_delay")]
    pub reconnect_min_delay: u64,
    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay: u64,

    /// Backend servers as `name=address`, comma separated
    #[serde(default)]
    pub servers: Vec<String>,
}

fn default_redis_host() -> String {
    "localhost".into()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_preload_delay() -> u64 {
    100
}

fn default_reconnect_min_delay() -> u64 {
    500
}

fn default_reconnect_max_delay() -> u64 {
    30_000
}

impl Default for Config {
    fn default() -> Self {
        Config {
            enabled: false,
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            redis_password: None,
            preload_delay: default_preload_delay(),
            reconnect_min_delay: default_reconnect_min_delay(),
            reconnect_max_delay: default_reconnect_max_delay(),
            servers: Vec::new(),
        }
    }
}

impl Config {
    /// Reads the config from the process environment, unreadable values
    /// fall back to the defaults
    pub fn from_env() -> Config {
        match envy::prefixed(ENV_PREFIX).from_env::<Config>() {
            Ok(config) => config,
            Err(e) => {
                warn!("Could not read sharding config from environment, using defaults: {}", e);
                Config::default()
            }
        }
    }

    pub fn preload_delay(&self) -> Duration {
        Duration::from_millis(self.preload_delay)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.reconnect_min_delay),
            Duration::from_millis(self.reconnect_max_delay),
        )
    }

    /// Password to authenticate with, an empty one means none
    pub fn redis_password(&self) -> Option<&str> {
        self.redis_password.as_deref().filter(|p| !p.is_empty())
    }

    pub fn connection_info(&self) -> redis::ConnectionInfo {
        redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(self.redis_host.clone(), self.redis_port),
            redis: redis::RedisConnectionInfo {
                db: 0,
                username: None,
                password: self.redis_password().map(str::to_string),
            },
        }
    }

    /// Parses the configured server list, skipping entries without a name
    pub fn servers(&self) -> Vec<ShardHandle> {
        self.servers
            .iter()
            .filter_map(|entry| {
                let (name, address) = entry.split_once('=').unwrap_or((entry.as_str(), ""));
                let name = name.trim();
                if name.is_empty() {
                    warn!("Ignoring server entry without a name: '{}'", entry);
                    return None;
                }
                Some(ShardHandle::new(name, address.trim()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        envy::prefixed(ENV_PREFIX)
            .from_iter(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<Vec<_>>(),
            )
            .unwrap()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = from_pairs(&[]);

        assert_eq!(config, Config::default());
        assert!(!config.enabled);
        assert_eq!(config.redis_host, "localhost");
        assert_eq!(config.redis_port, 6379);
        assert_eq!(config.preload_delay(), Duration::from_millis(100));
    }

    #[test]
    fn reads_prefixed_variables() {
        let config = from_pairs(&[
            ("SHARDING_ENABLED", "true"),
            ("SHARDING_REDIS_HOST", "redis.internal"),
            ("SHARDING_REDIS_PORT", "6380"),
            ("SHARDING_REDIS_PASSWORD", "hunter2"),
            ("SHARDING_PRELOAD_DELAY", "250"),
            ("SHARDING_SERVERS", "alpha=10.0.0.2:25565,beta=10.0.0.3:25565"),
            ("UNRELATED", "ignored"),
        ]);

        assert!(config.enabled);
        assert_eq!(config.redis_host, "redis.internal");
        assert_eq!(config.redis_port, 6380);
        assert_eq!(config.redis_password(), Some("hunter2"));
        assert_eq!(config.preload_delay(), Duration::from_millis(250));
        assert_eq!(
            config.servers(),
            vec![
                ShardHandle::new("alpha", "10.0.0.2:25565"),
                ShardHandle::new("beta", "10.0.0.3:25565"),
            ]
        );
    }

    #[test]
    fn empty_password_means_none() {
        let config = from_pairs(&[("SHARDING_REDIS_PASSWORD", "")]);

        assert_eq!(config.redis_password(), None);
        assert_eq!(config.connection_info().redis.password, None);
    }

    #[test]
    fn connection_info_targets_configured_host() {
        let config = Config {
            redis_host: "redis.internal".into(),
            redis_port: 6380,
            redis_password: Some("secret".into()),
            ..Config::default()
        };

        let info = config.connection_info();
        match info.addr {
            redis::ConnectionAddr::Tcp(ref host, port) => {
                assert_eq!(host, "redis.internal");
                assert_eq!(port, 6380);
            }
            ref other => panic!("unexpected address {:?}", other),
        }
        assert_eq!(info.redis.password.as_deref(), Some("secret"));
    }

    #[test]
    fn server_entries_without_name_are_skipped() {
        let config = Config {
            servers: vec!["=10.0.0.9:25565".into(), "lobby".into()],
            ..Config::default()
        };

        assert_eq!(config.servers(), vec![ShardHandle::new("lobby", "")]);
    }
}
