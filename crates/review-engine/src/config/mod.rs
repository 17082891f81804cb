use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

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

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub distribution: DistributionConfig,
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

        let distribution = DistributionConfig::from_env()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            distribution,
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

/// Limits applied to reviewer pull requests and manual redistribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionConfig {
    pub default_batch_size: usize,
    pub max_batch_size: usize,
}

impl DistributionConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let default_batch_size = read_size("REVIEW_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        let max_batch_size = read_size("REVIEW_MAX_BATCH_SIZE", DEFAULT_MAX_BATCH_SIZE)?;

        if max_batch_size < default_batch_size {
            return Err(ConfigError::BatchLimits {
                default: default_batch_size,
                max: max_batch_size,
            });
        }

        Ok(Self {
            default_batch_size,
            max_batch_size,
        })
    }

    /// Resolve the quantity a caller asked for against the configured limits.
    pub fn clamp(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_batch_size)
            .min(self.max_batch_size)
    }
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            default_batch_size: DEFAULT_BATCH_SIZE,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

fn read_size(key: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|value| *value > 0)
            .ok_or(ConfigError::InvalidSize { key }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidSize { key: &'static str },
    BatchLimits { default: usize, max: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidSize { key } => {
                write!(f, "{key} must be a positive integer")
            }
            ConfigError::BatchLimits { default, max } => write!(
                f,
                "REVIEW_MAX_BATCH_SIZE ({max}) must not be below REVIEW_BATCH_SIZE ({default})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidSize { .. }
            | ConfigError::BatchLimits { .. } => None,
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
        env::remove_var("REVIEW_BATCH_SIZE");
        env::remove_var("REVIEW_MAX_BATCH_SIZE");
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
        assert_eq!(config.distribution, DistributionConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn rejects_max_batch_below_default() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("REVIEW_BATCH_SIZE", "20");
        env::set_var("REVIEW_MAX_BATCH_SIZE", "5");
        let err = AppConfig::load().expect_err("limits rejected");
        assert!(matches!(
            err,
            ConfigError::BatchLimits {
                default: 20,
                max: 5
            }
        ));
        reset_env();
    }

    #[test]
    fn rejects_zero_batch_size() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("REVIEW_BATCH_SIZE", "0");
        let err = AppConfig::load().expect_err("zero rejected");
        assert!(matches!(
            err,
            ConfigError::InvalidSize {
                key: "REVIEW_BATCH_SIZE"
            }
        ));
        reset_env();
    }

    #[test]
    fn clamp_applies_default_and_cap() {
        let limits = DistributionConfig {
            default_batch_size: 10,
            max_batch_size: 25,
        };
        assert_eq!(limits.clamp(None), 10);
        assert_eq!(limits.clamp(Some(3)), 3);
        assert_eq!(limits.clamp(Some(400)), 25);
    }
}
