use serde::Deserialize;

/// Environment prefix for configuration overrides, e.g.
/// `CAMPAIGN_REDIRECT__REDIS__HOST=cache.internal`.
pub const ENV_PREFIX: &str = "CAMPAIGN_REDIRECT";

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `CAMPAIGN_REDIRECT__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub public: PublicConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Full connection URL. Takes precedence over the discrete fields below.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub db: i64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    /// Redis list the analytics consumer drains.
    #[serde(default = "default_queue_key")]
    pub queue_key: String,
    /// Offset applied to event timestamps, in minutes east of UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublicConfig {
    /// Externally reachable base URL, substituted into the tracking script.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8081
}
fn default_redis_host() -> String {
    "localhost".to_string()
}
fn default_redis_port() -> u16 {
    6379
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_queue_key() -> String {
    "tasks".to_string()
}
fn default_base_url() -> String {
    "http://localhost:8081".to_string()
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_redis_host(),
            port: default_redis_port(),
            password: None,
            tls: false,
            db: 0,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            queue_key: default_queue_key(),
            utc_offset_minutes: 0,
        }
    }
}

impl Default for PublicConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            redis: RedisConfig::default(),
            analytics: AnalyticsConfig::default(),
            public: PublicConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl RedisConfig {
    /// Connection URL for the Redis client.
    ///
    /// Uses `url` verbatim when set, otherwise assembles one from host, port,
    /// password, db and the TLS flag (`rediss://`).
    pub fn connection_url(&self) -> Result<String, url::ParseError> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }

        let scheme = if self.tls { "rediss" } else { "redis" };
        let mut url = url::Url::parse(&format!("{scheme}://{}:{}", self.host, self.port))?;

        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            // Only fails for URLs without a host, which the format above rules out.
            let _ = url.set_password(Some(password));
        }
        if self.db != 0 {
            url.set_path(&format!("/{}", self.db));
        }

        Ok(url.to_string())
    }
}

impl AppConfig {
    /// Load configuration from an optional config file and the environment.
    ///
    /// Environment variables win over file values.
    pub fn load(file: Option<&str>) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(
                config::File::with_name(file.unwrap_or("campaign-redirect"))
                    .required(file.is_some()),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.http_port, 8081);
        assert_eq!(config.analytics.queue_key, "tasks");
        assert!(!config.redis.tls);
    }

    #[test]
    fn test_redis_url_plain() {
        let redis = RedisConfig::default();
        assert_eq!(redis.connection_url().unwrap(), "redis://localhost:6379");
    }

    #[test]
    fn test_redis_url_with_tls_password_and_db() {
        let redis = RedisConfig {
            host: "cache.internal".to_string(),
            port: 6380,
            password: Some("s3cret".to_string()),
            tls: true,
            db: 2,
            ..Default::default()
        };
        assert_eq!(
            redis.connection_url().unwrap(),
            "rediss://:s3cret@cache.internal:6380/2"
        );
    }

    #[test]
    fn test_redis_url_override() {
        let redis = RedisConfig {
            url: Some("redis://other:1234".to_string()),
            ..Default::default()
        };
        assert_eq!(redis.connection_url().unwrap(), "redis://other:1234");
    }
}
