use std::env;
use std::fmt;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use crate::screening::ScreeningConfig;

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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub screening: ScreeningConfig,
}

impl AppConfig {
    /// Reads `APP_*` settings, then the optional screening file at `SCANNER_CONFIG_PATH`,
    /// then `SCANNER_*` overrides on top of it.
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
        let include_targets = environment != AppEnvironment::Production;

        let mut screening = match env::var("SCANNER_CONFIG_PATH") {
            Ok(path) if !path.trim().is_empty() => load_screening_file(PathBuf::from(path))?,
            _ => ScreeningConfig::default(),
        };
        apply_overrides(&mut screening)?;
        validate_screening(&screening)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                include_targets,
            },
            screening,
        })
    }
}

fn load_screening_file(path: PathBuf) -> Result<ScreeningConfig, ConfigError> {
    let raw = fs::read_to_string(&path).map_err(|source| ConfigError::File {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
}

fn apply_overrides(screening: &mut ScreeningConfig) -> Result<(), ConfigError> {
    if let Some(months) = env_list::<u32>("SCANNER_HOLDING_MONTHS")? {
        screening.scenarios.holding_months = months;
    }
    if let Some(timeout_ms) = env_value::<u64>("SCANNER_LOOKUP_TIMEOUT_MS")? {
        screening.lookups.timeout_ms = timeout_ms;
    }
    if let Some(retries) = env_value::<u32>("SCANNER_LOOKUP_RETRIES")? {
        screening.lookups.max_retries = retries;
    }
    if let Some(limit) = env_value::<usize>("SCANNER_MAX_CONCURRENCY")? {
        screening.lookups.max_concurrent_parcels = limit.max(1);
    }
    if let Some(top_n) = env_value::<usize>("SCANNER_TOP_N")? {
        screening.scoring.top_n = top_n;
    }
    Ok(())
}

fn validate_screening(screening: &ScreeningConfig) -> Result<(), ConfigError> {
    let months = &screening.scenarios.holding_months;
    if months.is_empty() || months.contains(&0) {
        return Err(ConfigError::InvalidHoldingMonths {
            months: months.clone(),
        });
    }
    Ok(())
}

fn env_value<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        _ => Ok(None),
    }
}

fn env_list<T: FromStr>(key: &'static str) -> Result<Option<Vec<T>>, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| item.parse::<T>())
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        _ => Ok(None),
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
    pub include_targets: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidValue {
        key: &'static str,
        value: String,
    },
    InvalidHoldingMonths {
        months: Vec<u32>,
    },
    File {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "{key} has an invalid value '{value}'")
            }
            ConfigError::InvalidHoldingMonths { months } => {
                write!(
                    f,
                    "holding_months must be a non-empty list of positive periods, got {months:?}"
                )
            }
            ConfigError::File { path, .. } => {
                write!(f, "unable to read screening config {}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "screening config {} is invalid: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort
            | ConfigError::InvalidValue { .. }
            | ConfigError::InvalidHoldingMonths { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::File { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
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
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "SCANNER_CONFIG_PATH",
            "SCANNER_HOLDING_MONTHS",
            "SCANNER_LOOKUP_TIMEOUT_MS",
            "SCANNER_LOOKUP_RETRIES",
            "SCANNER_MAX_CONCURRENCY",
            "SCANNER_TOP_N",
        ] {
            env::remove_var(key);
        }
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
        assert_eq!(
            config.screening.scenarios.holding_months,
            vec![12, 18, 24, 36, 48]
        );
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
    fn scanner_overrides_replace_file_defaults() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SCANNER_HOLDING_MONTHS", "18, 84");
        env::set_var("SCANNER_MAX_CONCURRENCY", "0");

        let config = AppConfig::load().expect("config loads");

        assert_eq!(config.screening.scenarios.holding_months, vec![18, 84]);
        assert_eq!(config.screening.lookups.max_concurrent_parcels, 1);
        reset_env();
    }

    #[test]
    fn malformed_override_names_the_variable() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SCANNER_LOOKUP_RETRIES", "many");

        match AppConfig::load() {
            Err(ConfigError::InvalidValue { key, value }) => {
                assert_eq!(key, "SCANNER_LOOKUP_RETRIES");
                assert_eq!(value, "many");
            }
            other => panic!("expected invalid value, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn screening_file_is_loaded_from_path() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let path = env::temp_dir().join(format!("site-scanner-config-{}.json", std::process::id()));
        fs::write(&path, r#"{ "scoring": { "top_n": 5 } }"#).expect("write config");
        env::set_var("SCANNER_CONFIG_PATH", &path);

        let config = AppConfig::load().expect("config loads");

        assert_eq!(config.screening.scoring.top_n, 5);
        fs::remove_file(&path).ok();
        reset_env();
    }

    #[test]
    fn zero_holding_period_override_is_rejected() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SCANNER_HOLDING_MONTHS", "0,12");

        match AppConfig::load() {
            Err(ConfigError::InvalidHoldingMonths { months }) => assert_eq!(months, vec![0, 12]),
            other => panic!("expected invalid holding months, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn empty_holding_periods_in_file_are_rejected() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let path = env::temp_dir().join(format!(
            "site-scanner-empty-months-{}.json",
            std::process::id()
        ));
        fs::write(&path, r#"{ "scenarios": { "holding_months": [] } }"#).expect("write config");
        env::set_var("SCANNER_CONFIG_PATH", &path);

        let result = AppConfig::load();

        fs::remove_file(&path).ok();
        reset_env();
        match result {
            Err(ConfigError::InvalidHoldingMonths { months }) => assert!(months.is_empty()),
            other => panic!("expected invalid holding months, got {other:?}"),
        }
    }
}
