//! crowwatch-core: everything the CrowWatch monitor needs except the wire.
//!
//! # Overview
//!
//! - [`MonitorConfig`]: immutable endpoint, contract and sentinel addresses
//! - [`ChainClient`] / [`ChainConnection`]: dial, subscribe, unsubscribe, close
//! - [`TransferFormatter`]: Transfer decoding, mint/burn classification, output lines
//! - [`Monitor`]: the reconnecting subscription loop
//! - [`policy`]: reconnect backoff

pub mod client;
pub mod config;
pub mod error;
pub mod monitor;
pub mod policy;
pub mod transfer;

pub use client::{ChainClient, ChainConnection, LogEntry, LogFilter, LogSubscription, SubscriptionId};
pub use config::{LogConfig, MonitorConfig, TokenConfig};
pub use error::{ConfigError, DecodeError, MonitorError, TransportError};
pub use monitor::{Monitor, MonitorStats};
pub use policy::{Backoff, ReconnectConfig};
pub use transfer::{format_units, Classified, Transfer, TransferFormatter, TransferKind, TRANSFER_SIGNATURE};
