//! Configuration module for environment variable parsing.
//!
//! All configuration is read from environment variables once at startup and
//! handed to each component as an immutable value.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::provider::ProviderErrorKind;

/// Default Graph API base URL for the WhatsApp Business Cloud API.
pub const DEFAULT_WHATSAPP_API_BASE_URL: &str = "https://graph.facebook.com/v21.0";

/// Errors that abort startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Shared key the Hub presents in the `Api-Key` header
    pub api_key: String,

    // =========================================================================
    // WhatsApp provider
    // =========================================================================
    /// Business phone number ID used in the send endpoint path
    pub whatsapp_phone_number_id: Option<String>,

    /// Bearer token for the Graph API
    pub whatsapp_access_token: Option<String>,

    /// Token echoed by Meta during the subscription handshake
    pub whatsapp_verify_token: Option<String>,

    /// App secret used to sign webhook payloads
    pub whatsapp_app_secret: Option<String>,

    /// Graph API base URL (overridable for testing)
    pub whatsapp_api_base_url: String,

    /// Language code used for template messages when the caller gives none
    pub whatsapp_template_language: String,

    /// Provider error codes overriding the built-in error table
    pub whatsapp_error_codes: Vec<(i64, ProviderErrorKind)>,

    /// Timeout for calls to the provider, in milliseconds
    pub provider_timeout_ms: u64,

    // =========================================================================
    // Hub
    // =========================================================================
    /// Hub endpoint receiving normalized events
    pub hub_webhook_url: Option<String>,

    /// Shared secret sent to the Hub with every event
    pub hub_webhook_secret: Option<String>,

    /// Timeout for calls to the Hub, in milliseconds
    pub hub_timeout_ms: u64,

    // =========================================================================
    // Rate limiting
    // =========================================================================
    /// Maximum messages per recipient per hour (0 disables)
    pub rate_limit_per_hour: u32,

    /// Maximum messages per recipient per day (0 disables)
    pub rate_limit_per_day: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = var("MESSAGING_SERVICE_API_KEY")
            .ok_or(ConfigError::Missing("MESSAGING_SERVICE_API_KEY"))?;

        let whatsapp_api_base_url = match var("WHATSAPP_API_BASE_URL") {
            Some(raw) => {
                parse_url("WHATSAPP_API_BASE_URL", &raw)?;
                raw.trim_end_matches('/').to_string()
            }
            None => DEFAULT_WHATSAPP_API_BASE_URL.to_string(),
        };

        let hub_webhook_url = var("HUB_WEBHOOK_URL");
        let hub_webhook_secret = var("HUB_WEBHOOK_SECRET");
        if let Some(raw) = &hub_webhook_url {
            parse_url("HUB_WEBHOOK_URL", raw)?;
            if hub_webhook_secret.is_none() {
                return Err(ConfigError::Missing("HUB_WEBHOOK_SECRET"));
            }
        }

        Ok(Config {
            port: parse_or("PORT", var("PORT"), 8080),

            api_key,

            whatsapp_phone_number_id: var("WHATSAPP_PHONE_NUMBER_ID"),

            whatsapp_access_token: var("WHATSAPP_ACCESS_TOKEN"),

            whatsapp_verify_token: var("WHATSAPP_VERIFY_TOKEN"),

            whatsapp_app_secret: var("WHATSAPP_APP_SECRET"),

            whatsapp_api_base_url,

            whatsapp_template_language: var("WHATSAPP_TEMPLATE_LANGUAGE")
                .unwrap_or_else(|| "en_US".to_string()),

            whatsapp_error_codes: var("WHATSAPP_ERROR_CODES")
                .map(|raw| parse_error_codes(&raw))
                .unwrap_or_default(),

            provider_timeout_ms: parse_or("PROVIDER_TIMEOUT_MS", var("PROVIDER_TIMEOUT_MS"), 15_000),

            hub_webhook_url,

            hub_webhook_secret,

            hub_timeout_ms: parse_or("HUB_TIMEOUT_MS", var("HUB_TIMEOUT_MS"), 10_000),

            rate_limit_per_hour: parse_or("RATE_LIMIT_PER_HOUR", var("RATE_LIMIT_PER_HOUR"), 10),

            rate_limit_per_day: parse_or("RATE_LIMIT_PER_DAY", var("RATE_LIMIT_PER_DAY"), 30),
        })
    }

    /// Whether outbound sending has the credentials it needs.
    pub fn sending_enabled(&self) -> bool {
        self.whatsapp_phone_number_id.is_some() && self.whatsapp_access_token.is_some()
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn hub_timeout(&self) -> Duration {
        Duration::from_millis(self.hub_timeout_ms)
    }
}

/// Parse a value, falling back to the default with a warning when malformed.
fn parse_or<T: FromStr + Copy>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(env_var = name, value = %raw, "invalid_number_using_default");
                default
            }
        },
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

/// Parse a comma-separated list of `code=kind` pairs.
///
/// Malformed entries are skipped with a warning.
fn parse_error_codes(raw: &str) -> Vec<(i64, ProviderErrorKind)> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|entry| {
            let parsed = entry.split_once('=').and_then(|(code, kind)| {
                let code = code.trim().parse::<i64>().ok()?;
                let kind = kind.trim().parse::<ProviderErrorKind>().ok()?;
                Some((code, kind))
            });
            if parsed.is_none() {
                warn!(env_var = "WHATSAPP_ERROR_CODES", entry = %entry, "invalid_error_code_entry");
            }
            parsed
        })
        .collect()
}
