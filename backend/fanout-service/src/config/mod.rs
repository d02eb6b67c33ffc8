use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub fanout: FanoutConfig,
    pub gateway: GatewayConfig,
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Unset means the in-memory store (local development only)
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Unset means the in-process event bus (single gateway process)
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    pub topic: String,
    pub publish_timeout_ms: u64,
    pub max_publish_attempts: u32,
}

impl FanoutConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            topic: default_fanout_topic(),
            publish_timeout_ms: 500,
            max_publish_attempts: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Capacity of the channel feeding the dispatch loop
    pub dispatch_buffer: usize,
    /// Per-connection outbox capacity; a full outbox drops the connection
    pub connection_buffer: usize,
    pub write_timeout_ms: u64,
}

impl GatewayConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            dispatch_buffer: 1024,
            connection_buffer: 64,
            write_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub read_timeout_ms: u64,
}

impl FeedConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
            read_timeout_ms: 3000,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let fanout_defaults = FanoutConfig::default();
        let gateway_defaults = GatewayConfig::default();
        let feed_defaults = FeedConfig::default();

        let config = Config {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                port: parse_env("APP_PORT", 8080)?,
            },
            database: DatabaseConfig {
                url: non_empty_env("DATABASE_URL"),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            redis: RedisConfig {
                url: non_empty_env("REDIS_URL"),
            },
            fanout: FanoutConfig {
                topic: std::env::var("FANOUT_TOPIC").unwrap_or_else(|_| default_fanout_topic()),
                publish_timeout_ms: parse_env(
                    "FANOUT_PUBLISH_TIMEOUT_MS",
                    fanout_defaults.publish_timeout_ms,
                )?,
                max_publish_attempts: parse_env(
                    "FANOUT_MAX_PUBLISH_ATTEMPTS",
                    fanout_defaults.max_publish_attempts,
                )?,
            },
            gateway: GatewayConfig {
                dispatch_buffer: parse_env(
                    "GATEWAY_DISPATCH_BUFFER",
                    gateway_defaults.dispatch_buffer,
                )?,
                connection_buffer: parse_env(
                    "GATEWAY_CONNECTION_BUFFER",
                    gateway_defaults.connection_buffer,
                )?,
                write_timeout_ms: parse_env(
                    "GATEWAY_WRITE_TIMEOUT_MS",
                    gateway_defaults.write_timeout_ms,
                )?,
            },
            feed: FeedConfig {
                default_page_size: parse_env(
                    "FEED_DEFAULT_PAGE_SIZE",
                    feed_defaults.default_page_size,
                )?,
                max_page_size: parse_env("FEED_MAX_PAGE_SIZE", feed_defaults.max_page_size)?,
                read_timeout_ms: parse_env("FEED_READ_TIMEOUT_MS", feed_defaults.read_timeout_ms)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fanout.max_publish_attempts == 0 {
            anyhow::bail!("FANOUT_MAX_PUBLISH_ATTEMPTS must be at least 1");
        }
        if self.gateway.dispatch_buffer == 0 || self.gateway.connection_buffer == 0 {
            anyhow::bail!("gateway buffers must be non-zero");
        }
        if self.feed.max_page_size == 0 {
            anyhow::bail!("FEED_MAX_PAGE_SIZE must be at least 1");
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid value for {}: {}", key, e)),
        _ => Ok(default),
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn default_fanout_topic() -> String {
    "new_post".to_string()
}
