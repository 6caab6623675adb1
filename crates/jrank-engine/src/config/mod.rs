use chrono::{FixedOffset, Offset, Utc};
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the scoring service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let engine = EngineConfig::from_env()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            engine,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Deployment-wide settings consumed by the criteria engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Offset of the fixed reference timezone in which active hours and weekend
    /// multipliers are evaluated.
    pub reference_offset: FixedOffset,
    /// Optional JSON rule document backing the file repository.
    pub rules_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reference_offset: utc_offset(),
            rules_path: None,
        }
    }
}

impl EngineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let reference_offset = match env::var("JRANK_REFERENCE_UTC_OFFSET_MINUTES") {
            Ok(raw) => parse_offset_minutes(&raw)?,
            Err(_) => utc_offset(),
        };

        let rules_path = env::var("JRANK_RULES_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            reference_offset,
            rules_path,
        })
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

pub fn parse_offset_minutes(raw: &str) -> Result<FixedOffset, ConfigError> {
    let minutes = raw
        .trim()
        .parse::<i32>()
        .map_err(|_| ConfigError::InvalidReferenceOffset(raw.to_string()))?;
    if !(-1439..=1439).contains(&minutes) {
        return Err(ConfigError::InvalidReferenceOffset(raw.to_string()));
    }
    FixedOffset::east_opt(minutes * 60)
        .ok_or_else(|| ConfigError::InvalidReferenceOffset(raw.to_string()))
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidReferenceOffset(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidReferenceOffset(value) => write!(
                f,
                "JRANK_REFERENCE_UTC_OFFSET_MINUTES must be whole minutes within +/-1439, got '{}'",
                value
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidReferenceOffset(_) => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("JRANK_REFERENCE_UTC_OFFSET_MINUTES");
        env::remove_var("JRANK_RULES_PATH");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.engine.reference_offset.local_minus_utc(), 0);
        assert!(config.engine.rules_path.is_none());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn reads_reference_offset_and_rules_path() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("JRANK_REFERENCE_UTC_OFFSET_MINUTES", "330");
        env::set_var("JRANK_RULES_PATH", "rules/engagement.json");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.engine.reference_offset.local_minus_utc(), 330 * 60);
        assert_eq!(
            config.engine.rules_path,
            Some(PathBuf::from("rules/engagement.json"))
        );
        reset_env();
    }

    #[test]
    fn rejects_out_of_range_offset() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("JRANK_REFERENCE_UTC_OFFSET_MINUTES", "1440");
        let err = AppConfig::load().expect_err("offset out of range");
        assert!(matches!(err, ConfigError::InvalidReferenceOffset(_)));
        reset_env();
    }
}
