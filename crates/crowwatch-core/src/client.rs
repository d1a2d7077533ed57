//! Chain client capability: dial a node, subscribe to filtered logs,
//! unsubscribe, tear the connection down.
//!
//! The subscription loop only sees these traits, so a mock client can stand
//! in for the WebSocket implementation in tests.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::TransportError;

/// A log entry delivered by the node for a matching on-chain event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogEntry {
    /// Contract that emitted the log.
    pub address: Address,
    /// topics[0] is the event signature hash; the rest are indexed params.
    pub topics: Vec<B256>,
    /// ABI-encoded non-indexed params.
    pub data: Vec<u8>,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
    /// Set by the node when a reorg dropped the log.
    pub removed: bool,
}

/// Log filter sent with `eth_subscribe("logs", ..)`. No block range: the
/// subscription watches from the current head forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    pub address: Vec<Address>,
}

impl LogFilter {
    /// Filter matching every log emitted by `contract`.
    pub fn for_contract(contract: Address) -> Self {
        Self { address: vec![contract] }
    }
}

/// A unique subscription ID returned by `eth_subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One live log subscription.
///
/// `logs` yields entries in delivery order. `errors` fires at most once,
/// when the subscription dies (socket drop, node-side close). Dropping the
/// handle drops both receivers, so a replaced subscription can never be
/// read again.
#[derive(Debug)]
pub struct LogSubscription {
    pub id: SubscriptionId,
    pub logs: mpsc::UnboundedReceiver<LogEntry>,
    pub errors: oneshot::Receiver<TransportError>,
}

/// Dials node endpoints.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Make one connection attempt to `url`. No timeout is applied.
    async fn dial(&self, url: &str) -> Result<Box<dyn ChainConnection>, TransportError>;
}

/// An established connection to a node.
#[async_trait]
pub trait ChainConnection: Send + Sync {
    /// Register a log subscription for `filter`.
    async fn subscribe_logs(&self, filter: &LogFilter) -> Result<LogSubscription, TransportError>;

    /// Cancel `subscription` on the node and release its channels.
    async fn unsubscribe(&self, subscription: LogSubscription) -> Result<(), TransportError>;

    /// Close the connection. Further calls fail with [`TransportError::Closed`].
    async fn close(&mut self);
}
