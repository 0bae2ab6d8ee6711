//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::flow::StepName;

/// Environment variable names read by [`FlowConfig::from_env`].
pub mod env_keys {
    pub const API_BASE_URL: &str = "FLOWS_API_BASE_URL";
    pub const API_TOKEN: &str = "FLOWS_API_TOKEN";
    pub const CONVERSION_DEBOUNCE_MS: &str = "FLOWS_CONVERSION_DEBOUNCE_MS";
    pub const SKIP_STEPS: &str = "FLOWS_SKIP_STEPS";
}

/// Flow engine configuration, passed explicitly to each component.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Base URL of the API gateway used by the HTTP transport.
    pub api_base_url: String,
    /// Bearer token for the HTTP transport.
    pub api_token: Option<SecretString>,
    /// Quiet period before a money field edit issues a conversion request.
    pub conversion_debounce: Duration,
    /// Steps removed from the catalog before indexing.
    pub skip_steps: Vec<StepName>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:4000".to_string(),
            api_token: None,
            conversion_debounce: Duration::from_millis(500),
            skip_steps: Vec::new(),
        }
    }
}

impl FlowConfig {
    /// Build a config from `FLOWS_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(env_keys::API_BASE_URL) {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }

        config.api_token = lookup(env_keys::API_TOKEN)
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from);

        if let Some(raw) = lookup(env_keys::CONVERSION_DEBOUNCE_MS) {
            let ms: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: env_keys::CONVERSION_DEBOUNCE_MS.to_string(),
                message: format!("expected milliseconds, got {raw:?}"),
            })?;
            config.conversion_debounce = Duration::from_millis(ms);
        }

        if let Some(raw) = lookup(env_keys::SKIP_STEPS) {
            config.skip_steps = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<StepName>().map_err(|_| ConfigError::InvalidValue {
                        key: env_keys::SKIP_STEPS.to_string(),
                        message: format!("unknown step {s:?}"),
                    })
                })
                .collect::<Result<_, _>>()?;
        }

        Ok(config)
    }
}
