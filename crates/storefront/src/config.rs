//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `PLATFORM_URL` - Base URL of the hosted data platform
//! - `PLATFORM_SERVICE_KEY` - Platform service key (server-side only)
//! - `CHECKOUT_API_URL` - Hosted payments provider API base URL
//! - `CHECKOUT_SECRET_KEY` - Payments provider secret key
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_DATA_DIR` - Local data directory for guest carts (default: ./data)
//! - `PLATFORM_TIMEOUT_SECS` - Request timeout for platform calls (default: 10)
//! - `META_PIXEL_ID` - Meta (Facebook) pixel ID
//! - `META_ACCESS_TOKEN` - Meta Conversions API access token
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Minimum acceptable length for service keys.
const MIN_SECRET_LENGTH: usize = 16;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Local data directory (guest cart storage lives under it)
    pub data_dir: PathBuf,
    /// Hosted data platform configuration
    pub platform: PlatformConfig,
    /// Hosted payments provider configuration
    pub checkout: CheckoutConfig,
    /// Conversion tracking configuration
    pub analytics: AnalyticsConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Hosted data platform configuration.
///
/// Implements `Debug` manually to redact the service key.
#[derive(Clone)]
pub struct PlatformConfig {
    /// Platform base URL (e.g., <https://project-ref.example.co>)
    pub url: String,
    /// Service key used for server-side table access
    pub service_key: SecretString,
    /// Per-request timeout; a timed-out write is a confirmed failure
    pub request_timeout: Duration,
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("url", &self.url)
            .field("service_key", &"[REDACTED]")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Hosted payments provider configuration.
///
/// Implements `Debug` manually to redact the secret key.
#[derive(Clone)]
pub struct CheckoutConfig {
    /// Provider API base URL
    pub api_url: String,
    /// Provider secret key (server-side only)
    pub secret_key: SecretString,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl std::fmt::Debug for CheckoutConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutConfig")
            .field("api_url", &self.api_url)
            .field("secret_key", &"[REDACTED]")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Conversion tracking configuration.
#[derive(Clone, Default)]
pub struct AnalyticsConfig {
    /// Meta (Facebook) pixel ID
    pub meta_pixel_id: Option<String>,
    /// Meta Conversions API access token
    pub meta_access_token: Option<SecretString>,
}

impl std::fmt::Debug for AnalyticsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsConfig")
            .field("meta_pixel_id", &self.meta_pixel_id)
            .field(
                "meta_access_token",
                &self.meta_access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail placeholder validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("STOREFRONT_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_HOST".to_string(), e.to_string())
            })?;
        let port = get_env_or_default("STOREFRONT_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_PORT".to_string(), e.to_string())
            })?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?;
        let data_dir = PathBuf::from(get_env_or_default("STOREFRONT_DATA_DIR", "./data"));

        let platform = PlatformConfig::from_env()?;
        let checkout = CheckoutConfig::from_env()?;
        let analytics = AnalyticsConfig::from_env();
        let sentry_dsn = get_optional_env("SENTRY_DSN");

        Ok(Self {
            host,
            port,
            base_url,
            data_dir,
            platform,
            checkout,
            analytics,
            sentry_dsn,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl PlatformConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let timeout_secs = get_env_or_default("PLATFORM_TIMEOUT_SECS", "10")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("PLATFORM_TIMEOUT_SECS".to_string(), e.to_string())
            })?;

        Ok(Self {
            url: get_required_env("PLATFORM_URL")?,
            service_key: get_validated_secret("PLATFORM_SERVICE_KEY")?,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl CheckoutConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: get_required_env("CHECKOUT_API_URL")?,
            secret_key: get_validated_secret("CHECKOUT_SECRET_KEY")?,
            request_timeout: Duration::from_secs(10),
        })
    }
}

impl AnalyticsConfig {
    fn from_env() -> Self {
        Self {
            meta_pixel_id: get_optional_env("META_PIXEL_ID"),
            meta_access_token: get_optional_env("META_ACCESS_TOKEN").map(SecretString::from),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Validate that a secret is not an obvious placeholder.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    if secret.len() < MIN_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SECRET_LENGTH,
                secret.len()
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InsecureSecret(_, _)
        ));
    }

    #[test]
    fn test_validate_secret_strength_changeme() {
        assert!(validate_secret_strength("changeme123", "TEST_VAR").is_err());
    }

    #[test]
    fn test_validate_secret_strength_too_short() {
        assert!(validate_secret_strength("k9f2m1", "TEST_VAR").is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        assert!(validate_secret_strength("aB3kXy9QmK2nL5pW7rT0", "TEST_VAR").is_ok());
    }

    #[test]
    fn test_socket_addr() {
        let config = StorefrontConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            data_dir: PathBuf::from("./data"),
            platform: PlatformConfig {
                url: "https://project-ref.example.co".to_string(),
                service_key: SecretString::from("aB3kXy9QmK2nL5pW7rT0"),
                request_timeout: Duration::from_secs(10),
            },
            checkout: CheckoutConfig {
                api_url: "https://api.payments.example".to_string(),
                secret_key: SecretString::from("aB3kXy9QmK2nL5pW7rT0"),
                request_timeout: Duration::from_secs(10),
            },
            analytics: AnalyticsConfig::default(),
            sentry_dsn: None,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_platform_config_debug_redacts_service_key() {
        let config = PlatformConfig {
            url: "https://project-ref.example.co".to_string(),
            service_key: SecretString::from("super_private_service_key_value"),
            request_timeout: Duration::from_secs(10),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("project-ref.example.co"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_private_service_key_value"));
    }
}
