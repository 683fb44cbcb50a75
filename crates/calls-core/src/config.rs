//! Configuration for calls-core
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables prefixed with `CALLS__` (nested keys separated by
//! `__`, e.g. `CALLS__LIMITS__MAX_ACTIVE_CALLS=3`).

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CallError, Result};

/// Main configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CallsConfig {
    pub database_url: String,
    pub api_bind_address: String,
    pub provider: ProviderConfig,
    pub webhook: WebhookConfig,
    pub limits: LimitsConfig,
    pub logging: LoggingConfig,
}

/// Telephony provider settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Sent to the provider as the assistant's `serverUrl`
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

/// Push-boundary settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Shared secret expected in the webhook header.
    ///
    /// Unset or empty disables authentication; development only.
    pub secret: Option<String>,
}

/// Admission and staleness thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_active_calls: u32,
    /// Calls stuck in pending/queued longer than this are failed outright
    pub stale_call_threshold_secs: u64,
    /// Calls queued longer than this get a provider poll
    pub stale_queued_sync_secs: u64,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl CallsConfig {
    /// Load configuration from defaults, an optional file, and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("CALLS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: CallsConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the environment only
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    pub fn validate(&self) -> Result<()> {
        if self.limits.max_active_calls == 0 {
            return Err(CallError::config("limits.max_active_calls must be at least 1"));
        }
        if self.provider.timeout_secs == 0 {
            return Err(CallError::config("provider.timeout_secs must be at least 1"));
        }
        if self.limits.stale_queued_sync_secs >= self.limits.stale_call_threshold_secs {
            return Err(CallError::config(
                "limits.stale_queued_sync_secs must be shorter than limits.stale_call_threshold_secs",
            ));
        }
        Ok(())
    }

    /// Webhook secret, if authentication is enabled
    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook.secret.as_deref().filter(|s| !s.is_empty())
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LimitsConfig {
    pub fn stale_call_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_call_threshold_secs)
    }

    pub fn stale_queued_sync(&self) -> Duration {
        Duration::from_secs(self.stale_queued_sync_secs)
    }
}

impl Default for CallsConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://calls.db?mode=rwc".to_string(),
            api_bind_address: "127.0.0.1:8082".to_string(),
            provider: ProviderConfig::default(),
            webhook: WebhookConfig::default(),
            limits: LimitsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.vapi.ai".to_string(),
            api_key: None,
            webhook_url: None,
            timeout_secs: 30,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_active_calls: 2,
            stale_call_threshold_secs: 10 * 60,
            stale_queued_sync_secs: 2 * 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
