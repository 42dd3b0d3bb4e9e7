//! Application configuration loaded from environment variables.
//!
//! Provider credentials are optional: a provider whose settings are absent is
//! simply not registered with the auth service.

use std::env;
use std::time::Duration;

/// Facebook app credentials.
#[derive(Debug, Clone)]
pub struct FacebookConfig {
    pub app_id: String,
    pub app_secret: String,
}

/// Google OAuth client settings.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// OAuth client ID that access tokens must be issued to
    pub client_id: String,
    /// API key for the People API
    pub api_key: String,
}

/// Fenix OAuth application settings.
#[derive(Debug, Clone)]
pub struct FenixConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    /// Base URL of the Fenix instance (no trailing slash)
    pub base_url: String,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Lifetime of a session token
    pub session_ttl: Duration,
    /// Lifetime of a refresh token
    pub refresh_ttl: Duration,
    /// Deadline applied to every identity provider call
    pub provider_timeout: Duration,
    /// Maximum number of concurrent sessions kept per user
    pub max_sessions: usize,

    pub facebook: Option<FacebookConfig>,
    pub google: Option<GoogleConfig>,
    pub fenix: Option<FenixConfig>,
}

const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;
const DEFAULT_REFRESH_TTL_SECS: u64 = 30 * 24 * 60 * 60;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MAX_SESSIONS: usize = 20;
const DEFAULT_FENIX_BASE_URL: &str = "https://fenix.tecnico.ulisboa.pt";

impl Config {
    /// Config for tests: all providers configured with dummy credentials.
    pub fn test_default() -> Self {
        Self {
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!!".to_vec(),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            refresh_ttl: Duration::from_secs(DEFAULT_REFRESH_TTL_SECS),
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
            max_sessions: DEFAULT_MAX_SESSIONS,
            facebook: Some(FacebookConfig {
                app_id: "test_app_id".to_string(),
                app_secret: "test_app_secret".to_string(),
            }),
            google: Some(GoogleConfig {
                client_id: "test_client_id.apps.googleusercontent.com".to_string(),
                api_key: "test_api_key".to_string(),
            }),
            fenix: Some(FenixConfig {
                client_id: "test_fenix_client".to_string(),
                client_secret: "test_fenix_secret".to_string(),
                redirect_url: "http://localhost:8080/auth/fenix/callback".to_string(),
                base_url: DEFAULT_FENIX_BASE_URL.to_string(),
            }),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file is honoured for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let jwt_signing_key = env::var("JWT_SIGNING_KEY")
            .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
            .into_bytes();
        if jwt_signing_key.len() < 32 {
            return Err(ConfigError::Invalid(
                "JWT_SIGNING_KEY",
                "must be at least 32 bytes".to_string(),
            ));
        }

        let facebook = match (optional("FACEBOOK_APP_ID"), optional("FACEBOOK_APP_SECRET")) {
            (Some(app_id), Some(app_secret)) => Some(FacebookConfig { app_id, app_secret }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("FACEBOOK_APP_SECRET")),
            (None, Some(_)) => return Err(ConfigError::Missing("FACEBOOK_APP_ID")),
        };

        let google = match optional("GOOGLE_CLIENT_ID") {
            Some(client_id) => Some(GoogleConfig {
                client_id,
                api_key: optional("GOOGLE_API_KEY")
                    .ok_or(ConfigError::Missing("GOOGLE_API_KEY"))?,
            }),
            None => None,
        };

        let fenix = match optional("FENIX_CLIENT_ID") {
            Some(client_id) => Some(FenixConfig {
                client_id,
                client_secret: optional("FENIX_CLIENT_SECRET")
                    .ok_or(ConfigError::Missing("FENIX_CLIENT_SECRET"))?,
                redirect_url: optional("FENIX_REDIRECT_URL")
                    .ok_or(ConfigError::Missing("FENIX_REDIRECT_URL"))?,
                base_url: optional("FENIX_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_FENIX_BASE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
            }),
            None => None,
        };

        Ok(Self {
            jwt_signing_key,
            session_ttl: Duration::from_secs(parse_or("SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?),
            refresh_ttl: Duration::from_secs(parse_or("REFRESH_TTL_SECS", DEFAULT_REFRESH_TTL_SECS)?),
            provider_timeout: Duration::from_secs(parse_or(
                "PROVIDER_TIMEOUT_SECS",
                DEFAULT_PROVIDER_TIMEOUT_SECS,
            )?),
            max_sessions: at_least_one(
                "MAX_SESSIONS",
                parse_or("MAX_SESSIONS", DEFAULT_MAX_SESSIONS)?,
            )?,
            facebook,
            google,
            fenix,
        })
    }
}

/// Read a trimmed, non-empty environment variable.
fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid(name, format!("cannot parse {raw:?}"))),
        None => Ok(default),
    }
}

fn at_least_one(name: &'static str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(name, "must be at least 1".to_string()));
    }
    Ok(value)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!!");
        env::set_var("GOOGLE_CLIENT_ID", "client.apps.googleusercontent.com");
        env::set_var("GOOGLE_API_KEY", "key");
        env::set_var("SESSION_TTL_SECS", "120");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.session_ttl, Duration::from_secs(120));
        assert_eq!(
            config.provider_timeout,
            Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS)
        );
        assert_eq!(config.max_sessions, DEFAULT_MAX_SESSIONS);
        let google = config.google.expect("google configured");
        assert_eq!(google.client_id, "client.apps.googleusercontent.com");
    }

    #[test]
    fn test_zero_max_sessions_rejected() {
        let err = at_least_one("MAX_SESSIONS", 0).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("MAX_SESSIONS", _)));
        assert_eq!(
            err.to_string(),
            "Invalid value for MAX_SESSIONS: must be at least 1"
        );
        assert_eq!(at_least_one("MAX_SESSIONS", 1).unwrap(), 1);
    }

    #[test]
    fn test_default_has_all_providers() {
        let config = Config::test_default();
        assert!(config.facebook.is_some());
        assert!(config.google.is_some());
        assert!(config.fenix.is_some());
    }
}
