use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::registry::domain::{Season, Term};

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

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Everything the binary needs, resolved once at startup from the process
/// environment (a `.env` file is honored when present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub registrar: RegistrarConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(&env_or("APP_ENV", "development"));

        let server = ServerConfig {
            host: env_or("APP_HOST", "127.0.0.1"),
            port: env_or("APP_PORT", "3000")
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
        };

        let telemetry = TelemetryConfig {
            log_level: env_or("APP_LOG_LEVEL", "info"),
        };

        let lock_wait_ms = env_or("REGISTRAR_LOCK_WAIT_MS", "5000")
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidLockWait)?;

        let term_raw = env::var("REGISTRAR_TERM").unwrap_or_default();
        let term = if term_raw.trim().is_empty() {
            Term::new(Season::Fall, 2026)
        } else {
            Term::from_str(&term_raw).map_err(|reason| ConfigError::InvalidTerm { reason })?
        };

        let maintenance = env::var("REGISTRAR_MAINTENANCE")
            .map(|raw| matches!(raw.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            environment,
            server,
            telemetry,
            registrar: RegistrarConfig {
                lock_wait_ms,
                term,
                maintenance,
            },
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

/// Registrar-specific settings: lock wait bound, current term, maintenance
/// flag. The current semester and maintenance state mirror what the settings
/// store exposes to the rest of the records application.
#[derive(Debug, Clone)]
pub struct RegistrarConfig {
    pub lock_wait_ms: u64,
    pub term: Term,
    pub maintenance: bool,
}

impl RegistrarConfig {
    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APP_PORT must be a valid u16")]
    InvalidPort,
    #[error("APP_HOST must parse to an IPv4 or IPv6 address")]
    InvalidHost { source: std::net::AddrParseError },
    #[error("REGISTRAR_LOCK_WAIT_MS must be a number of milliseconds")]
    InvalidLockWait,
    #[error("REGISTRAR_TERM is invalid: {reason}")]
    InvalidTerm { reason: String },
}

#[cfg(test)]
mod test {
    use super::ServerConfig;

    #[test]
    fn localhost_resolves_to_loopback() {
        let config = ServerConfig {
            host: "localhost".to_string(),
            port: 8080,
        };
        let addr = config.socket_addr().expect("resolvable");
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn bogus_host_is_rejected() {
        let config = ServerConfig {
            host: "not-an-ip".to_string(),
            port: 8080,
        };
        assert!(config.socket_addr().is_err());
    }
}
