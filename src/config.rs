use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address for HTTP and the agent websocket
    pub bind: String,
    /// Order history file
    pub data_file: PathBuf,
    /// Directory holding committed order images
    pub maps_dir: PathBuf,
    /// Directory served at `/`
    pub static_dir: PathBuf,
    /// Shared secret for order submission. Unset means submissions are refused.
    #[serde(default)]
    pub order_password: Option<String>,
    /// Trailing window in which an agent counts as active
    #[serde(default = "default_liveness_window_secs")]
    pub liveness_window_secs: u64,
    /// Liveness aggregation period
    #[serde(default = "default_liveness_tick_ms")]
    pub liveness_tick_ms: u64,
    /// Buffered order broadcasts per connection before it starts lagging
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    /// Largest accepted upload in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_liveness_window_secs() -> u64 {
    11 * 60
}

fn default_liveness_tick_ms() -> u64 {
    1000
}

fn default_broadcast_capacity() -> usize {
    64
}

fn default_max_upload_bytes() -> usize {
    32 * 1024 * 1024
}

impl ServerConfig {
    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness_window_secs)
    }

    pub fn liveness_tick(&self) -> Duration {
        Duration::from_millis(self.liveness_tick_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Command server websocket (e.g. ws://host:3987/api/ws)
    pub command_url: String,
    /// Base URL order images are downloaded from
    pub maps_url: String,
    /// Identity reported to the command server
    pub brand: String,
    /// Painting service websocket for canvas frame subscriptions
    pub canvas_ws_url: String,
    /// Painting service GraphQL endpoint for placements
    pub placement_url: String,
    /// Page the access token is scraped from
    pub token_url: String,
    /// Fixed access token; skips scraping when set
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_token_refresh_secs")]
    pub token_refresh_secs: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// How long a tile fetch waits for the frame-ready push
    #[serde(default = "default_frame_timeout_secs")]
    pub frame_timeout_secs: u64,
}

fn default_ping_interval_secs() -> u64 {
    5
}

fn default_token_refresh_secs() -> u64 {
    30 * 60
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_frame_timeout_secs() -> u64 {
    30
}

impl AgentConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn token_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.token_refresh_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_secs(self.frame_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let mut builder = Config::builder()
            // Start with default values
            .set_default("server.bind", "0.0.0.0:3987")?
            .set_default("server.data_file", "data.json")?
            .set_default("server.maps_dir", "maps")?
            .set_default("server.static_dir", "static")?
            .set_default("agent.command_url", "ws://127.0.0.1:3987/api/ws")?
            .set_default("agent.maps_url", "http://127.0.0.1:3987/maps")?
            .set_default("agent.brand", "rustagentV1")?
            .set_default("agent.canvas_ws_url", "wss://gql-realtime-2.reddit.com/query")?
            .set_default("agent.placement_url", "https://gql-realtime-2.reddit.com/query")?
            .set_default("agent.token_url", "https://www.reddit.com/r/place/")?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("PLACE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (PLACE_SERVER__BIND, etc.)
            .add_source(
                Environment::with_prefix("PLACE")
                    .separator("__")
                    .try_parsing(true),
            );

        // Older deployments set the submission secret as PASSWORD.
        if let Ok(password) = std::env::var("PASSWORD") {
            builder = builder.set_default("server.order_password", password)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!("server.bind is not a socket address: {}", self.server.bind));
        }

        if self.server.liveness_window_secs == 0 {
            errors.push("server.liveness_window_secs must be positive".to_string());
        }

        if self.server.liveness_tick_ms == 0 {
            errors.push("server.liveness_tick_ms must be positive".to_string());
        }

        if self.server.broadcast_capacity == 0 {
            errors.push("server.broadcast_capacity must be positive".to_string());
        }

        if self
            .server
            .order_password
            .as_deref()
            .is_some_and(|p| p.trim().is_empty())
        {
            errors.push("server.order_password must not be blank".to_string());
        }

        for (name, value) in [
            ("agent.ping_interval_secs", self.agent.ping_interval_secs),
            ("agent.token_refresh_secs", self.agent.token_refresh_secs),
            ("agent.reconnect_delay_ms", self.agent.reconnect_delay_ms),
            ("agent.frame_timeout_secs", self.agent.frame_timeout_secs),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be positive"));
            }
        }

        if !crate::protocol::is_valid_brand(&self.agent.brand) {
            errors.push(format!(
                "agent.brand must be 1-32 characters of A-Z, a-z, 0-9 or '-': {}",
                self.agent.brand
            ));
        }

        for (name, raw, schemes) in [
            ("agent.command_url", &self.agent.command_url, &["ws", "wss"][..]),
            ("agent.canvas_ws_url", &self.agent.canvas_ws_url, &["ws", "wss"][..]),
            ("agent.maps_url", &self.agent.maps_url, &["http", "https"][..]),
            ("agent.placement_url", &self.agent.placement_url, &["http", "https"][..]),
            ("agent.token_url", &self.agent.token_url, &["http", "https"][..]),
        ] {
            match url::Url::parse(raw) {
                Ok(url) if schemes.contains(&url.scheme()) => {}
                Ok(url) => errors.push(format!("{name} has unsupported scheme {}", url.scheme())),
                Err(e) => errors.push(format!("{name} is not a valid URL: {e}")),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                bind: "127.0.0.1:3987".to_string(),
                data_file: PathBuf::from("data.json"),
                maps_dir: PathBuf::from("maps"),
                static_dir: PathBuf::from("static"),
                order_password: Some("hunter2".to_string()),
                liveness_window_secs: default_liveness_window_secs(),
                liveness_tick_ms: default_liveness_tick_ms(),
                broadcast_capacity: default_broadcast_capacity(),
                max_upload_bytes: default_max_upload_bytes(),
            },
            agent: AgentConfig {
                command_url: "ws://127.0.0.1:3987/api/ws".to_string(),
                maps_url: "http://127.0.0.1:3987/maps".to_string(),
                brand: "rustagentV1".to_string(),
                canvas_ws_url: "wss://gql-realtime-2.reddit.com/query".to_string(),
                placement_url: "https://gql-realtime-2.reddit.com/query".to_string(),
                token_url: "https://www.reddit.com/r/place/".to_string(),
                access_token: None,
                ping_interval_secs: 5,
                token_refresh_secs: 1800,
                reconnect_delay_ms: 1000,
                frame_timeout_secs: 30,
            },
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_sample_config_is_valid() {
        assert_eq!(sample().validate(), Ok(()));
        assert_eq!(sample().server.liveness_window(), Duration::from_secs(660));
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let mut config = sample();
        config.server.bind = "nowhere".to_string();
        config.agent.brand = "bad brand".to_string();
        config.agent.command_url = "http://127.0.0.1/api/ws".to_string();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_zero_agent_intervals_are_rejected() {
        let mut config = sample();
        config.agent.ping_interval_secs = 0;
        config.agent.token_refresh_secs = 0;
        config.agent.reconnect_delay_ms = 0;
        config.agent.frame_timeout_secs = 0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("agent.ping_interval_secs")));
        assert!(errors.iter().any(|e| e.contains("agent.reconnect_delay_ms")));
    }

    #[test]
    fn test_load_from_empty_dir_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.server.liveness_window_secs, 660);
        assert_eq!(config.agent.ping_interval(), Duration::from_secs(5));
        assert_eq!(config.agent.reconnect_delay(), Duration::from_millis(1000));
    }
}
