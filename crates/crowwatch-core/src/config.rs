//! Monitor configuration.
//!
//! Every field has a default matching the WEMIX `CROW` deployment, so an
//! empty JSON object (`{}`) is a valid config file.

use std::collections::HashMap;
use std::path::Path;

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policy::ReconnectConfig;

/// Default WebSocket endpoint.
pub const DEFAULT_WS_URL: &str = "wss://ws.wemix.com";

/// Token contract watched by default.
pub const DEFAULT_CONTRACT: Address = address!("770d9d14c4ae2f78dca810958c1d9b7ea4620289");

/// Transfers from this address are mints, transfers to it are burns.
pub const DEFAULT_MINT_SOURCE: Address = Address::ZERO;

/// Dev wallet excluded from the mint/burn rules.
pub const DEFAULT_DEV_ADDRESS: Address = address!("26e07c47ef5925dafbcb9eb2525e013b1e5ec85d");

/// Immutable monitor configuration, fixed at process start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// WebSocket JSON-RPC endpoint (`ws://` or `wss://`).
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Token contract whose logs are subscribed to.
    #[serde(default = "default_contract")]
    pub contract: Address,
    /// Mint/burn sentinel.
    #[serde(default = "default_mint_source")]
    pub mint_source: Address,
    /// Address that suppresses the mint/burn rules.
    #[serde(default = "default_dev_address")]
    pub dev_address: Address,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// How amounts are scaled and labelled in output lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Base-10 exponent between smallest units and whole tokens.
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    /// Fractional digits shown.
    #[serde(default = "default_precision")]
    pub precision: usize,
}

/// Log level per component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Override per component: component_name → level
    #[serde(default)]
    pub components: HashMap<String, String>,
    /// Emit JSON structured logs (true) or human-readable text (false)
    #[serde(default)]
    pub json: bool,
}

fn default_ws_url() -> String { DEFAULT_WS_URL.to_string() }
fn default_contract() -> Address { DEFAULT_CONTRACT }
fn default_mint_source() -> Address { DEFAULT_MINT_SOURCE }
fn default_dev_address() -> Address { DEFAULT_DEV_ADDRESS }
fn default_symbol() -> String { "CROW".to_string() }
fn default_decimals() -> u8 { 18 }
fn default_precision() -> usize { 5 }
fn default_level() -> String { "info".to_string() }

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            contract: DEFAULT_CONTRACT,
            mint_source: DEFAULT_MINT_SOURCE,
            dev_address: DEFAULT_DEV_ADDRESS,
            token: TokenConfig::default(),
            reconnect: ReconnectConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            decimals: default_decimals(),
            precision: default_precision(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: HashMap::new(),
            json: false,
        }
    }
}

impl MonitorConfig {
    /// Parse a JSON config document. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Check the values that serde alone cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(&self.ws_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.ws_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidUrl {
                url: self.ws_url.clone(),
                reason: format!("unsupported scheme `{}`, expected ws or wss", parsed.scheme()),
            });
        }
        // 10^78 no longer fits in a U256
        if self.token.decimals > 77 {
            return Err(ConfigError::Decimals(self.token.decimals));
        }
        self.reconnect.validate().map_err(ConfigError::Reconnect)
    }
}
