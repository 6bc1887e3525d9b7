//! Configuration module for the Sangh web server.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_LISTEN_RETRIES: u32 = 5;
const DEFAULT_LISTEN_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_API_BASE_URL: &str = "https://api.bhavyasangh.com";

/// Deployment environment, read from `NODE_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
    Test,
}

impl FromStr for Environment {
    type Err = std::convert::Infallible;

    /// Unknown values fall back to development.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "test" => Environment::Test,
            _ => Environment::Development,
        })
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Test => "test",
        };
        f.write_str(name)
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on
    pub port: u16,
    /// Host address to bind to
    pub host: IpAddr,
    /// Deployment environment
    pub environment: Environment,
    /// Root of the static SPA build
    pub build_dir: PathBuf,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Extra bind attempts when the port is already in use
    pub listen_retries: u32,
    /// Delay between bind attempts
    pub listen_retry_delay: Duration,
    /// Maximum accepted upload body size in bytes
    pub max_upload_bytes: usize,
    /// Base URL of the backend REST API
    pub api_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_or("PORT", lookup("PORT"), DEFAULT_PORT);
        let host = parse_or("HOST", lookup("HOST"), IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let environment = lookup("NODE_ENV")
            .and_then(|v| v.parse().ok())
            .unwrap_or(Environment::Development);

        let build_dir = lookup("BUILD_DIR")
            .unwrap_or_else(|| "./build".to_string())
            .into();

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let listen_retries = parse_or(
            "LISTEN_RETRIES",
            lookup("LISTEN_RETRIES"),
            DEFAULT_LISTEN_RETRIES,
        );
        let listen_retry_delay = Duration::from_millis(parse_or(
            "LISTEN_RETRY_DELAY_MS",
            lookup("LISTEN_RETRY_DELAY_MS"),
            DEFAULT_LISTEN_RETRY_DELAY_MS,
        ));

        let max_upload_bytes = parse_or(
            "MAX_UPLOAD_BYTES",
            lookup("MAX_UPLOAD_BYTES"),
            DEFAULT_MAX_UPLOAD_BYTES,
        );

        let api_base_url = lookup("API_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        Self {
            port,
            host,
            environment,
            build_dir,
            log_level,
            listen_retries,
            listen_retry_delay,
            max_upload_bytes,
            api_base_url,
        }
    }

    /// Socket address the server binds to.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid {} value {:?}, using default", key, value);
            default
        }),
        None => default,
    }
}
