//! Configuration management for plainweb.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::handler::DEFAULT_COOKIE_NAME;
use crate::server::ServerConfig;
use crate::watchdog::Watchdog;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerSection,
    /// Session configuration.
    pub session: SessionSection,
    /// Template configuration.
    pub templates: TemplatesSection,
    /// Development watchdog configuration.
    pub watch: WatchSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Enable graceful shutdown.
    pub graceful_shutdown: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            graceful_shutdown: true,
        }
    }
}

/// Session configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Cookie carrying the session identifier.
    pub cookie_name: String,
    /// Seconds a session may stay idle before it is swept.
    pub idle_timeout_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            idle_timeout_secs: 30 * 60,
        }
    }
}

/// Template configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesSection {
    /// Glob pattern of template files.
    pub pattern: String,
    /// Re-read template files on every render.
    pub reload: bool,
}

impl Default for TemplatesSection {
    fn default() -> Self {
        Self {
            pattern: "templates/*.html".to_string(),
            reload: false,
        }
    }
}

/// File-change watchdog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    /// Enable the watchdog.
    pub enabled: bool,
    /// Glob pattern of watched files.
    pub pattern: String,
    /// Poll interval in milliseconds.
    pub interval_ms: u64,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            enabled: false,
            pattern: "src/**/*.rs".to_string(),
            interval_ms: 500,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("PLAINWEB_HOST") {
            self.server.host = host;
        }

        if let Ok(port) = std::env::var("PLAINWEB_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }

        if let Ok(pattern) = std::env::var("PLAINWEB_TEMPLATES") {
            if !pattern.is_empty() {
                self.templates.pattern = pattern;
            }
        }

        if let Ok(level) = std::env::var("PLAINWEB_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = args.host {
            self.server.host = host.to_string();
        }

        if let Some(port) = args.port {
            self.server.port = port;
        }

        if let Some(ref pattern) = args.templates {
            self.templates.pattern = pattern.clone();
        }

        if let Some(ref name) = args.cookie_name {
            self.session.cookie_name = name.clone();
        }

        if let Some(secs) = args.idle_timeout {
            self.session.idle_timeout_secs = secs;
        }

        if args.watch {
            self.watch.enabled = true;
            self.templates.reload = true;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut config = Config::default();

        // Load from config file if specified
        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        // Apply environment variable overrides
        config.apply_env();

        // Apply CLI argument overrides (highest priority)
        config.apply_args(args);

        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "session.idle_timeout_secs",
                "0".to_string(),
            ));
        }
        if self.session.cookie_name.is_empty()
            || !self
                .session
                .cookie_name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(ConfigError::InvalidValue(
                "session.cookie_name",
                self.session.cookie_name.clone(),
            ));
        }
        Ok(())
    }

    /// Convert to ServerConfig for the HTTP server.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.server.host.clone()))?;

        let mut server_config = ServerConfig::new(host.to_string(), self.server.port);
        if !self.server.graceful_shutdown {
            server_config = server_config.without_graceful_shutdown();
        }

        Ok(server_config)
    }

    /// Session idle timeout.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session.idle_timeout_secs)
    }

    /// The configured watchdog, if enabled.
    pub fn watchdog(&self) -> Option<Watchdog> {
        self.watch.enabled.then(|| {
            Watchdog::new(
                self.watch.pattern.clone(),
                Duration::from_millis(self.watch.interval_ms),
            )
        })
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Invalid host address.
    InvalidHost(String),
    /// Setting with an unusable value.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidHost(host) => write!(f, "invalid host address: {}", host),
            Self::InvalidValue(name, value) => write!(f, "invalid value for {}: '{}'", name, value),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.session.cookie_name, "PLAINWEB_SESSION_ID");
        assert_eq!(config.idle_timeout(), Duration::from_secs(1800));
        assert_eq!(config.templates.pattern, "templates/*.html");
        assert!(config.watchdog().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "server": {
                "host": "0.0.0.0",
                "port": 3000
            },
            "session": {
                "cookie_name": "SID",
                "idle_timeout_secs": 600
            },
            "watch": {
                "enabled": true,
                "interval_ms": 250
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.session.cookie_name, "SID");
        assert_eq!(config.idle_timeout(), Duration::from_secs(600));

        let dog = config.watchdog().unwrap();
        assert_eq!(dog.pattern(), "src/**/*.rs");
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{
            "server": {
                "port": 9000
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.host, "127.0.0.1"); // Default
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.session.idle_timeout_secs, 1800);
    }

    #[test]
    fn test_config_bad_json() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let result = Config::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        let args = Args {
            host: Some("192.168.1.1".parse().unwrap()),
            port: Some(5000),
            templates: Some("views/*.html".to_string()),
            cookie_name: Some("SID".to_string()),
            idle_timeout: Some(60),
            watch: true,
            ..Args::default()
        };

        config.apply_args(&args);

        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.templates.pattern, "views/*.html");
        assert_eq!(config.session.cookie_name, "SID");
        assert_eq!(config.idle_timeout(), Duration::from_secs(60));
        assert!(config.watchdog().is_some());
        assert!(config.templates.reload);
    }

    #[test]
    fn test_template_reload_from_json() {
        let config: Config =
            serde_json::from_str(r#"{"templates": {"reload": true}}"#).unwrap();
        assert!(config.templates.reload);
        assert_eq!(config.templates.pattern, "templates/*.html");
        assert!(!Config::default().templates.reload);
    }

    #[test]
    fn test_args_without_host_keep_file_value() {
        let mut config = Config::default();
        config.server.host = "0.0.0.0".to_string();

        config.apply_args(&Args::default());

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.session.idle_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue("session.idle_timeout_secs", _))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_cookie_name() {
        let mut config = Config::default();
        config.session.cookie_name = "bad name;".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_server_config() {
        let config = Config::default();
        let server_config = config.to_server_config().unwrap();

        assert_eq!(server_config.host, "127.0.0.1");
        assert_eq!(server_config.port, 8080);
        assert!(server_config.graceful_shutdown);
    }

    #[test]
    fn test_invalid_host() {
        let mut config = Config::default();
        config.server.host = "not-an-ip".to_string();

        let result = config.to_server_config();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"cookie_name\""));
        assert!(json.contains("\"idle_timeout_secs\""));
    }
}
