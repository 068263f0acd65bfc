//! Application configuration.
//!
//! All secrets come from environment variables only: the provider API key,
//! the webhook shared secret, and the admin token are never hardcoded or
//! logged. Everything else (sender identity, base URL, rate limit) has a
//! sensible default for local runs.

use std::env;

use thiserror::Error;
use tracing::warn;
use url::Url;

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("{0} environment variable not set")]
    MissingVar(&'static str),

    /// A variable is present but unusable.
    #[error("invalid value for {var}: {reason}")]
    InvalidVar {
        /// Variable name
        var: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Runtime configuration, loaded once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Email provider API key (`WAITLIST_PROVIDER_API_KEY`).
    pub provider_api_key: String,
    /// Shared secret for webhook HMAC verification (`WAITLIST_WEBHOOK_SECRET`).
    pub webhook_secret: String,
    /// Bearer token for the admin endpoints (`WAITLIST_ADMIN_TOKEN`).
    pub admin_token: String,
    /// Sender identity, e.g. `Waitlist <hello@example.com>` (`WAITLIST_FROM`).
    pub sender: String,
    /// Public base URL used in confirmation links (`WAITLIST_BASE_URL`).
    pub base_url: Url,
    /// Webhook requests per minute per IP (`WAITLIST_RATE_LIMIT`).
    pub rate_limit_rpm: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Fails when a required secret is missing or a value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider_api_key = required("WAITLIST_PROVIDER_API_KEY")?;
        let webhook_secret = required("WAITLIST_WEBHOOK_SECRET")?;
        let admin_token = required("WAITLIST_ADMIN_TOKEN")?;

        if webhook_secret.len() < 32 {
            warn!("WAITLIST_WEBHOOK_SECRET is less than 32 characters");
        }
        if admin_token.len() < 32 {
            warn!("WAITLIST_ADMIN_TOKEN is less than 32 characters");
        }

        let sender = env::var("WAITLIST_FROM")
            .unwrap_or_else(|_| "Waitlist <hello@waitlist.example>".to_string());

        let base_url = env::var("WAITLIST_BASE_URL")
            .unwrap_or_else(|_| "https://waitlist.example".to_string());
        let base_url = Url::parse(&base_url).map_err(|e| ConfigError::InvalidVar {
            var: "WAITLIST_BASE_URL",
            reason: e.to_string(),
        })?;

        let rate_limit_rpm = env::var("WAITLIST_RATE_LIMIT")
            .unwrap_or_else(|_| "100".to_string())
            .parse::<u32>()
            .map_err(|e| ConfigError::InvalidVar {
                var: "WAITLIST_RATE_LIMIT",
                reason: e.to_string(),
            })?;
        if rate_limit_rpm == 0 {
            return Err(ConfigError::InvalidVar {
                var: "WAITLIST_RATE_LIMIT",
                reason: "rate limit cannot be 0".to_string(),
            });
        }

        Ok(Self {
            provider_api_key,
            webhook_secret,
            admin_token,
            sender,
            base_url,
            rate_limit_rpm,
        })
    }

    /// Fixed configuration for tests; no environment access.
    pub fn for_tests() -> Self {
        Self {
            provider_api_key: "re_test_key".to_string(),
            webhook_secret: "whsec_test_shared_secret_0123456789abcdef".to_string(),
            admin_token: "admin-test-token-0123456789abcdefghijklmn".to_string(),
            sender: "Waitlist <hello@waitlist.test>".to_string(),
            base_url: Url::parse("https://waitlist.test").expect("static url"),
            rate_limit_rpm: 100,
        }
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    let value = env::var(var).map_err(|_| ConfigError::MissingVar(var))?;
    if value.is_empty() {
        return Err(ConfigError::InvalidVar {
            var,
            reason: "value cannot be empty".to_string(),
        });
    }
    Ok(value)
}
