//! Session client configuration.
//!
//! Loaded from `SDK_*` environment variables with defaults. Applications
//! embedding the client usually build it with [`Config::from_vars`] or
//! [`Config::default`] and override fields directly.

use crate::types::DependentAssets;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default locale passed to `init`.
pub const DEFAULT_LOCALE: &str = "en-US";

/// Default session actor mailbox capacity.
pub const DEFAULT_COMMAND_CHANNEL_BUFFER: usize = 256;

/// Default capacity of the collaborator notification channel.
pub const DEFAULT_ENGINE_EVENT_BUFFER: usize = 512;

/// Default wait for the chat privilege acknowledgement, in milliseconds.
pub const DEFAULT_PRIVILEGE_ACK_TIMEOUT_MS: u64 = 10_000;

/// Default number of chat messages kept in history.
pub const DEFAULT_CHAT_HISTORY_LIMIT: usize = 1000;

/// Session client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Locale handed to the session layer on `init` (default: "en-US").
    pub locale: String,

    /// Where the engine loads its runtime assets from (default: Global).
    pub dependent_assets: DependentAssets,

    /// Session actor mailbox capacity (default: 256).
    pub command_channel_buffer: usize,

    /// Capacity of the [`crate::engine::engine_channel`] (default: 512).
    pub engine_event_buffer: usize,

    /// How long `changePrivilege` waits for the acknowledgement (default: 10s).
    pub privilege_ack_timeout: Duration,

    /// Chat history bound (default: 1000).
    pub chat_history_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            dependent_assets: DependentAssets::Global,
            command_channel_buffer: DEFAULT_COMMAND_CHANNEL_BUFFER,
            engine_event_buffer: DEFAULT_ENGINE_EVENT_BUFFER,
            privilege_ack_timeout: Duration::from_millis(DEFAULT_PRIVILEGE_ACK_TIMEOUT_MS),
            chat_history_limit: DEFAULT_CHAT_HISTORY_LIMIT,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Parse a strictly positive number, or fall back to `default` when unset.
fn positive<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
{
    let Some(raw) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("{name} must be a number, got {raw:?}")))?;

    if value == T::default() {
        return Err(ConfigError::InvalidValue(format!(
            "{name} must be greater than zero"
        )));
    }
    Ok(value)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let locale = match vars.get("SDK_LOCALE") {
            Some(value) if value.trim().is_empty() => {
                return Err(ConfigError::InvalidValue(
                    "SDK_LOCALE must not be empty".to_string(),
                ));
            }
            Some(value) => value.trim().to_string(),
            None => DEFAULT_LOCALE.to_string(),
        };

        let dependent_assets = match vars.get("SDK_DEPENDENT_ASSETS") {
            Some(value) => DependentAssets::from_str(value).map_err(|_| {
                ConfigError::InvalidValue("SDK_DEPENDENT_ASSETS must not be empty".to_string())
            })?,
            None => DependentAssets::Global,
        };

        let command_channel_buffer = positive(
            vars,
            "SDK_COMMAND_CHANNEL_BUFFER",
            DEFAULT_COMMAND_CHANNEL_BUFFER,
        )?;

        let engine_event_buffer =
            positive(vars, "SDK_ENGINE_EVENT_BUFFER", DEFAULT_ENGINE_EVENT_BUFFER)?;

        let privilege_ack_timeout_ms = positive(
            vars,
            "SDK_PRIVILEGE_ACK_TIMEOUT_MS",
            DEFAULT_PRIVILEGE_ACK_TIMEOUT_MS,
        )?;

        let chat_history_limit =
            positive(vars, "SDK_CHAT_HISTORY_LIMIT", DEFAULT_CHAT_HISTORY_LIMIT)?;

        Ok(Config {
            locale,
            dependent_assets,
            command_channel_buffer,
            engine_event_buffer,
            privilege_ack_timeout: Duration::from_millis(privilege_ack_timeout_ms),
            chat_history_limit,
        })
    }
}
