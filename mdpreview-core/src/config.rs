//! Configuration management for mdpreview

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{PreviewError, Result};

/// Default endpoint of the GitHub markdown rendering API
pub const GITHUB_MARKDOWN_ENDPOINT: &str = "https://api.github.com/markdown/raw";

/// Main system configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub render: RenderConfig,
    pub session: SessionConfig,
    /// Verbose logging, replaces the old process-wide debug toggle
    pub debug: bool,
}

impl Config {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PreviewError::config(format!("Failed to read config file: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| PreviewError::config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PreviewError::config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| PreviewError::config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(PreviewError::config("Invalid port number"));
        }
        if self.server.hostname.trim().is_empty() {
            return Err(PreviewError::config("Hostname cannot be empty"));
        }

        if self.render.timeout_secs == 0 {
            return Err(PreviewError::config("Render timeout must be greater than 0"));
        }
        if self.render.mode == RenderMode::Github && self.render.endpoint.trim().is_empty() {
            return Err(PreviewError::config(
                "Remote rendering requires a non-empty endpoint",
            ));
        }

        self.session.validate()
    }

    /// Address the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.hostname, self.server.port)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub hostname: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port: 8080,
            shutdown_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Which backend turns markdown into HTML
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Embedded GFM renderer
    #[default]
    Local,
    /// GitHub markdown API
    Github,
}

/// Renderer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub mode: RenderMode,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            mode: RenderMode::Local,
            endpoint: GITHUB_MARKDOWN_ENDPOINT.to_string(),
            timeout_secs: 10,
        }
    }
}

impl RenderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Timing and size limits of a live-sync session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ping_interval_ms: u64,
    pub write_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub rewatch_delay_ms: u64,
    pub max_message_bytes: usize,
    pub reply_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: 2_000,
            write_timeout_ms: 10_000,
            read_timeout_ms: 60_000,
            rewatch_delay_ms: 100,
            max_message_bytes: 5 * 1024 * 1024,
            reply_queue_capacity: 16,
        }
    }
}

impl SessionConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn rewatch_delay(&self) -> Duration {
        Duration::from_millis(self.rewatch_delay_ms)
    }

    /// Validate the session limits
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("ping_interval_ms", self.ping_interval_ms),
            ("write_timeout_ms", self.write_timeout_ms),
            ("read_timeout_ms", self.read_timeout_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(PreviewError::config(format!(
                    "session.{} must be greater than 0",
                    name
                )));
            }
        }

        if self.max_message_bytes == 0 {
            return Err(PreviewError::config(
                "session.max_message_bytes must be greater than 0",
            ));
        }
        if self.reply_queue_capacity == 0 {
            return Err(PreviewError::config(
                "session.reply_queue_capacity must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.hostname, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.render.mode, RenderMode::Local);
        assert_eq!(config.render.endpoint, GITHUB_MARKDOWN_ENDPOINT);
        assert_eq!(config.session.ping_interval(), Duration::from_secs(2));
        assert_eq!(config.session.write_timeout(), Duration::from_secs(10));
        assert_eq!(config.session.max_message_bytes, 5 * 1024 * 1024);
        assert!(!config.debug);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{ "server": { "port": 9000 }, "render": { "mode": "github" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.hostname, "127.0.0.1");
        assert_eq!(config.render.mode, RenderMode::Github);
        assert_eq!(config.render.timeout_secs, 10);
        assert_eq!(config.session.rewatch_delay_ms, 100);
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = Config::default();
        config.server.port = 0;
        assert_err!(config.validate());

        let mut config = Config::default();
        config.session.ping_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ping_interval_ms"));

        let mut config = Config::default();
        config.session.max_message_bytes = 0;
        assert_err!(config.validate());

        let mut config = Config::default();
        config.render.mode = RenderMode::Github;
        config.render.endpoint = String::new();
        assert_err!(config.validate());
    }

    #[test]
    fn test_config_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mdpreview.json");

        let mut config = Config::default();
        config.server.port = 7000;
        config.debug = true;
        assert_ok!(config.save_to_file(&path));

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.server.port, 7000);
        assert!(loaded.debug);
        assert_eq!(loaded.bind_address(), "127.0.0.1:7000");
    }

    #[test]
    fn test_config_file_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            Config::from_file(&missing),
            Err(PreviewError::Config(_))
        ));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            Config::from_file(&broken),
            Err(PreviewError::Config(_))
        ));
    }
}
