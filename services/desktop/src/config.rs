//! services/desktop/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which OAuth delivery the provider is asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OAuthFlow {
    /// Tokens arrive in the redirect URL fragment.
    Implicit,
    /// An authorization code arrives as a query parameter and is exchanged with a PKCE verifier.
    Pkce,
}

impl std::str::FromStr for OAuthFlow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "implicit" => Ok(OAuthFlow::Implicit),
            "pkce" => Ok(OAuthFlow::Pkce),
            other => Err(format!("'{}' is not one of implicit, pkce", other)),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Loopback port the OAuth provider redirects to. Fixed by provider configuration.
    pub callback_port: u16,
    /// Loopback port used as the single-instance lock and argv relay.
    pub instance_port: u16,
    pub url_scheme: String,
    pub settings_path: PathBuf,
    pub log_level: Level,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub oauth_flow: OAuthFlow,
    pub exchange_timeout: Duration,
    pub dev_mode: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Load Loopback Settings ---
        let callback_port = parse_or("CALLBACK_PORT", &lookup, 8989u16)?;
        let instance_port = parse_or("INSTANCE_PORT", &lookup, 8990u16)?;
        if callback_port == instance_port {
            return Err(ConfigError::InvalidValue(
                "INSTANCE_PORT".to_string(),
                "must differ from CALLBACK_PORT".to_string(),
            ));
        }

        let url_scheme = lookup("URL_SCHEME").unwrap_or_else(|| "memowave".to_string());
        if url_scheme.is_empty()
            || !url_scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        {
            return Err(ConfigError::InvalidValue(
                "URL_SCHEME".to_string(),
                format!("'{}' is not a valid URL scheme", url_scheme),
            ));
        }

        let settings_path = lookup("SETTINGS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./memowave-settings.json"));

        let dev_mode = lookup("MEMOWAVE_DEV").is_some_and(|v| v == "1" || v == "true");

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Identity Backend Settings (as optional) ---
        let supabase_url = lookup("SUPABASE_URL").filter(|v| !v.is_empty());
        let supabase_anon_key = lookup("SUPABASE_ANON_KEY").filter(|v| !v.is_empty());
        if supabase_url.is_some() && supabase_anon_key.is_none() {
            return Err(ConfigError::MissingVar("SUPABASE_ANON_KEY".to_string()));
        }

        let oauth_flow = parse_or("OAUTH_FLOW", &lookup, OAuthFlow::Implicit)?;

        let timeout_secs = parse_or("EXCHANGE_TIMEOUT_SECS", &lookup, 30u64)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "EXCHANGE_TIMEOUT_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            callback_port,
            instance_port,
            url_scheme,
            settings_path,
            log_level,
            supabase_url,
            supabase_anon_key,
            oauth_flow,
            exchange_timeout: Duration::from_secs(timeout_secs),
            dev_mode,
        })
    }

    /// The redirect URI registered with the identity provider.
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}", self.callback_port)
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_registered_redirect() {
        let config = load(&[]).unwrap();
        assert_eq!(config.callback_port, 8989);
        assert_eq!(config.redirect_uri(), "http://localhost:8989");
        assert_eq!(config.url_scheme, "memowave");
        assert_eq!(config.exchange_timeout, Duration::from_secs(30));
        assert!(config.supabase_url.is_none());
        assert!(!config.dev_mode);
        assert_eq!(config.oauth_flow, OAuthFlow::Implicit);
    }

    #[test]
    fn reads_code_flow() {
        let config = load(&[("OAUTH_FLOW", "PKCE")]).unwrap();
        assert_eq!(config.oauth_flow, OAuthFlow::Pkce);
        assert!(load(&[("OAUTH_FLOW", "device")]).is_err());
    }

    #[test]
    fn backend_url_requires_a_key() {
        let err = load(&[("SUPABASE_URL", "https://x.supabase.co")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(v) if v == "SUPABASE_ANON_KEY"));
    }

    #[test]
    fn rejects_bad_port_and_log_level() {
        assert!(matches!(
            load(&[("CALLBACK_PORT", "http")]),
            Err(ConfigError::InvalidValue(..))
        ));
        assert!(matches!(
            load(&[("RUST_LOG", "loud")]),
            Err(ConfigError::InvalidValue(..))
        ));
    }

    #[test]
    fn rejects_colliding_ports() {
        assert!(load(&[("CALLBACK_PORT", "9000"), ("INSTANCE_PORT", "9000")]).is_err());
    }

    #[test]
    fn rejects_scheme_with_separator() {
        assert!(load(&[("URL_SCHEME", "memo://")]).is_err());
    }
}
