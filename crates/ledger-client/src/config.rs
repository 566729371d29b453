//! Emulator connection settings.
//!
//! Settings come from one of three places:
//!
//! - [`EmulatorConfig::default`]: `127.0.0.1`, APDU port `9999`, button port
//!   `42000`
//! - [`EmulatorConfig::from_env`]: the defaults overridden by `CFX_LEDGER_*`
//!   environment variables
//! - [`EmulatorConfig::from_json`]: a JSON document, with missing fields
//!   taking their defaults
//!
//! # Environment Variables
//!
//! | Variable                  | Field             |
//! |---------------------------|-------------------|
//! | `CFX_LEDGER_HOST`         | `host`            |
//! | `CFX_LEDGER_APDU_PORT`    | `apdu_port`       |
//! | `CFX_LEDGER_BUTTON_PORT`  | `button_port`     |
//! | `CFX_LEDGER_SETTLE_MS`    | `settle_delay_ms` |
//! | `CFX_LEDGER_TIMEOUT_MS`   | `io_timeout_ms`   |
//!
//! # Example
//!
//! ```
//! use cfx_ledger_client::config::EmulatorConfig;
//!
//! let config = EmulatorConfig::from_json(r#"{ "apdu_port": 40000 }"#).unwrap();
//! assert_eq!(config.apdu_addr(), "127.0.0.1:40000");
//! assert_eq!(config.button_port, 42000);
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Environment variable overriding [`EmulatorConfig::host`].
pub const ENV_HOST: &str = "CFX_LEDGER_HOST";
/// Environment variable overriding [`EmulatorConfig::apdu_port`].
pub const ENV_APDU_PORT: &str = "CFX_LEDGER_APDU_PORT";
/// Environment variable overriding [`EmulatorConfig::button_port`].
pub const ENV_BUTTON_PORT: &str = "CFX_LEDGER_BUTTON_PORT";
/// Environment variable overriding [`EmulatorConfig::settle_delay_ms`].
pub const ENV_SETTLE_MS: &str = "CFX_LEDGER_SETTLE_MS";
/// Environment variable overriding [`EmulatorConfig::io_timeout_ms`].
pub const ENV_TIMEOUT_MS: &str = "CFX_LEDGER_TIMEOUT_MS";

/// Connection settings for the emulator's APDU and button sockets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmulatorConfig {
    /// Emulator host name or address.
    pub host: String,

    /// Port of the APDU socket.
    pub apdu_port: u16,

    /// Port of the button socket.
    pub button_port: u16,

    /// Delay after each button action, letting the emulated screen settle.
    pub settle_delay_ms: u64,

    /// Read timeout on the APDU socket. `0` blocks indefinitely.
    pub io_timeout_ms: u64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            apdu_port: 9999,
            button_port: 42000,
            settle_delay_ms: 500,
            io_timeout_ms: 0,
        }
    }
}

impl EmulatorConfig {
    /// Loads the defaults, overridden by any `CFX_LEDGER_*` variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parses settings from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the document is invalid or has unknown
    /// fields.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns the `host:port` address of the APDU socket.
    #[must_use]
    pub fn apdu_addr(&self) -> String {
        format!("{}:{}", self.host, self.apdu_port)
    }

    /// Returns the `host:port` address of the button socket.
    #[must_use]
    pub fn button_addr(&self) -> String {
        format!("{}:{}", self.host, self.button_port)
    }

    /// Returns the button settle delay.
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Returns the APDU read timeout, if any.
    #[must_use]
    pub const fn io_timeout(&self) -> Option<Duration> {
        match self.io_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup(ENV_HOST) {
            config.host = host;
        }
        if let Some(value) = lookup(ENV_APDU_PORT) {
            config.apdu_port = parse_var(ENV_APDU_PORT, &value)?;
        }
        if let Some(value) = lookup(ENV_BUTTON_PORT) {
            config.button_port = parse_var(ENV_BUTTON_PORT, &value)?;
        }
        if let Some(value) = lookup(ENV_SETTLE_MS) {
            config.settle_delay_ms = parse_var(ENV_SETTLE_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_TIMEOUT_MS) {
            config.io_timeout_ms = parse_var(ENV_TIMEOUT_MS, &value)?;
        }

        debug!(?config, "loaded emulator configuration");
        Ok(config)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{key}={value:?}: {e}")))
}
