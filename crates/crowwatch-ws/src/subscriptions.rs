//! Live `eth_subscribe("logs")` subscriptions on one WebSocket connection.
//!
//! Routes `eth_subscription` notifications to the matching subscription's
//! log channel and fans a connection failure out to every error channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, Bytes, B256, U64};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crowwatch_core::{LogEntry, LogSubscription, SubscriptionId, TransportError};

/// The caller-facing halves of one subscription.
struct SubscriptionEntry {
    logs: mpsc::UnboundedSender<LogEntry>,
    /// Taken when the connection fails; fires at most once.
    errors: Option<oneshot::Sender<TransportError>>,
}

/// Active subscriptions keyed by the node-assigned ID.
#[derive(Clone, Default)]
pub struct SubscriptionManager {
    entries: Arc<Mutex<HashMap<SubscriptionId, SubscriptionEntry>>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription the node just confirmed.
    pub fn register(&self, id: SubscriptionId) -> LogSubscription {
        let (logs_tx, logs) = mpsc::unbounded_channel();
        let (errors_tx, errors) = oneshot::channel();
        self.entries.lock().unwrap().insert(
            id.clone(),
            SubscriptionEntry {
                logs: logs_tx,
                errors: Some(errors_tx),
            },
        );
        LogSubscription { id, logs, errors }
    }

    /// Forward the `result` of an `eth_subscription` notification.
    pub fn dispatch(&self, id: &SubscriptionId, result: &Value) {
        let entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get(id) else {
            tracing::debug!(subscription = %id, "notification for unknown subscription");
            return;
        };
        match parse_log(result) {
            Ok(log) => {
                let _ = entry.logs.send(log);
            }
            Err(e) => tracing::warn!(subscription = %id, error = %e, "dropping unparseable log"),
        }
    }

    /// Remove a subscription (e.g. before `eth_unsubscribe`).
    pub fn remove(&self, id: &SubscriptionId) {
        self.entries.lock().unwrap().remove(id);
    }

    /// Report `reason` on every subscription's error channel and forget them all.
    pub fn fail_all(&self, reason: &str) {
        let drained: Vec<_> = self.entries.lock().unwrap().drain().collect();
        for (id, mut entry) in drained {
            if let Some(tx) = entry.errors.take() {
                tracing::debug!(subscription = %id, "signalling subscription error");
                let _ = tx.send(TransportError::Closed(reason.to_string()));
            }
        }
    }

    /// Drop every subscription without signalling errors (local close).
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Returns `true` if there are no active subscriptions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An Ethereum log object as it appears in `eth_subscription` notifications.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    topics: Vec<B256>,
    #[serde(default)]
    data: Bytes,
    block_number: Option<U64>,
    transaction_hash: Option<B256>,
    log_index: Option<U64>,
    #[serde(default)]
    removed: bool,
}

/// Parse the `result` of a log notification.
pub fn parse_log(result: &Value) -> Result<LogEntry, serde_json::Error> {
    let log = RpcLog::deserialize(result)?;
    Ok(LogEntry {
        address: log.address,
        topics: log.topics,
        data: log.data.to_vec(),
        block_number: log.block_number.map(|n| n.to::<u64>()),
        transaction_hash: log.transaction_hash,
        log_index: log.log_index.map(|n| n.to::<u64>()),
        removed: log.removed,
    })
}
