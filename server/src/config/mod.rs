use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_HANDOFF_TTL_SECS: i64 = 2 * 60 * 60;
const DEFAULT_PREDICTION_TIMEOUT_SECS: u64 = 5;
const DEFAULT_UPLOAD_DIR: &str = "./uploads";
const DEFAULT_PUBLIC_ASSET_BASE_URL: &str = "http://localhost:3001/uploads";
const DEFAULT_LOG_FILTER: &str = "dramaticket_server=debug,tower_http=info";
const DEV_JWT_SECRET: &str = "dramaticket-development-secret-change-me";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs the server on the in-memory store.
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub session_ttl_secs: i64,
    pub admin_user_id: Option<Uuid>,
    pub prediction_api_url: Option<String>,
    pub prediction_timeout: Duration,
    pub upload_dir: PathBuf,
    pub public_asset_base_url: String,
    pub handoff_ttl_secs: i64,
    pub cors_allowed_origins: Option<String>,
    pub is_production: bool,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            admin_user_id: None,
            prediction_api_url: None,
            prediction_timeout: Duration::from_secs(DEFAULT_PREDICTION_TIMEOUT_SECS),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            public_asset_base_url: DEFAULT_PUBLIC_ASSET_BASE_URL.to_string(),
            handoff_ttl_secs: DEFAULT_HANDOFF_TTL_SECS,
            cors_allowed_origins: None,
            is_production: false,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let is_production = get("RUST_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None if is_production => return Err(ConfigError::Missing("JWT_SECRET")),
            None => {
                tracing::warn!("JWT_SECRET not set, using the development secret");
                defaults.jwt_secret
            }
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            bind_addr: parse(
                "BIND_ADDR",
                get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            )?,
            jwt_secret,
            session_ttl_secs: parse_or("SESSION_TTL_SECS", get("SESSION_TTL_SECS"), defaults.session_ttl_secs)?,
            admin_user_id: get("ADMIN_USER_ID").map(|v| parse("ADMIN_USER_ID", v)).transpose()?,
            prediction_api_url: get("PREDICTION_API_URL"),
            prediction_timeout: Duration::from_secs(parse_or(
                "PREDICTION_TIMEOUT_SECS",
                get("PREDICTION_TIMEOUT_SECS"),
                DEFAULT_PREDICTION_TIMEOUT_SECS,
            )?),
            upload_dir: get("UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            public_asset_base_url: get("PUBLIC_ASSET_BASE_URL").unwrap_or(defaults.public_asset_base_url),
            handoff_ttl_secs: parse_or("HANDOFF_TTL_SECS", get("HANDOFF_TTL_SECS"), defaults.handoff_ttl_secs)?,
            cors_allowed_origins: get("CORS_ALLOWED_ORIGINS"),
            is_production,
            log_filter: get("RUST_LOG").unwrap_or(defaults.log_filter),
        })
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    value.map(|v| parse(key, v)).unwrap_or(Ok(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_run_in_memory() {
        let config = config_from(&[]).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.bind_addr.port(), 3001);
        assert!(config.admin_user_id.is_none());
        assert!(!config.is_production);
    }

    #[test]
    fn test_production_requires_jwt_secret() {
        let result = config_from(&[("RUST_ENV", "production")]);
        assert_eq!(result.unwrap_err(), ConfigError::Missing("JWT_SECRET"));

        let config = config_from(&[("RUST_ENV", "Production"), ("JWT_SECRET", "s3cret")]).unwrap();
        assert!(config.is_production);
        assert_eq!(config.jwt_secret, "s3cret");
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let result = config_from(&[("ADMIN_USER_ID", "not-a-uuid")]);
        assert!(matches!(result, Err(ConfigError::Invalid { key: "ADMIN_USER_ID", .. })));

        let result = config_from(&[("SESSION_TTL_SECS", "soon")]);
        assert!(matches!(result, Err(ConfigError::Invalid { key: "SESSION_TTL_SECS", .. })));
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let config = config_from(&[("DATABASE_URL", "  "), ("PREDICTION_API_URL", "")]).unwrap();
        assert!(config.database_url.is_none());
        assert!(config.prediction_api_url.is_none());
    }
}
