//! The subscription loop.
//!
//! ```text
//!            ┌──────────────┐  dial ok   ┌─────────────┐
//!   ┌──────▶ │ Disconnected │ ─────────▶ │ Subscribing │
//!   │        └──────────────┘            └─────────────┘
//!   │  backoff     ▲   dial / subscribe failed  │ subscribe ok
//!   │              └────────────────────────────┤
//!   │                                           ▼
//!   │   subscription error              ┌─────────────┐  shutdown  ┌──────────────┐
//!   └────────────────────────────────── │   Active    │ ─────────▶ │ ShuttingDown │
//!                                       └─────────────┘            └──────────────┘
//! ```
//!
//! Startup (first dial, first subscribe) is fatal on failure. After that,
//! reconnect failures back off and retry until `max_attempts`, if set. A
//! subscribe the node rejects on a live socket is retried on that socket;
//! only a lost connection sends the loop back to `Disconnected`.

use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client::{ChainClient, ChainConnection, LogEntry, LogFilter, LogSubscription};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, TransportError};
use crate::policy::Backoff;
use crate::transfer::{Classified, TransferFormatter, TransferKind};

/// How long `release` waits for the node to confirm `eth_unsubscribe`.
const UNSUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Counters reported when the monitor exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub logs_received: u64,
    pub mints: u64,
    pub burns: u64,
    pub transfers: u64,
    /// Logs that were not Transfer events.
    pub ignored: u64,
    /// Transfer logs that failed to decode.
    pub malformed: u64,
    /// Logs the node flagged as removed by a reorg.
    pub removed: u64,
    /// Subscriptions re-established after a loss.
    pub reconnections: u64,
}

/// Where the loop currently is. Handles only exist in the phases that own them.
enum Phase {
    Disconnected,
    Subscribing(Box<dyn ChainConnection>),
    Active(Box<dyn ChainConnection>, LogSubscription),
    ShuttingDown,
}

/// Outcome of a backoff wait.
enum Retry {
    Again,
    Shutdown,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Subscribing(_) => "subscribing",
            Self::Active(..) => "active",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

/// Watches one contract's Transfer events and writes one line per event.
pub struct Monitor<C> {
    client: C,
    url: String,
    filter: LogFilter,
    formatter: TransferFormatter,
    backoff: Backoff,
    stats: MonitorStats,
}

impl<C: ChainClient> Monitor<C> {
    pub fn new(config: &MonitorConfig, client: C) -> Self {
        Self {
            client,
            url: config.ws_url.clone(),
            filter: LogFilter::for_contract(config.contract),
            formatter: TransferFormatter::new(config),
            backoff: Backoff::new(config.reconnect.clone()),
            stats: MonitorStats::default(),
        }
    }

    /// Run until `shutdown` resolves, writing event lines to `out`.
    ///
    /// Returns the final counters on a clean shutdown.
    pub async fn run<F, W>(mut self, shutdown: F, mut out: W) -> Result<MonitorStats, MonitorError>
    where
        F: Future<Output = ()>,
        W: Write,
    {
        tokio::pin!(shutdown);

        let mut conn = self.connect().await.map_err(MonitorError::Startup)?;
        let sub = match self.subscribe(conn.as_ref()).await {
            Ok(sub) => sub,
            Err(e) => {
                conn.close().await;
                return Err(MonitorError::Startup(e));
            }
        };
        let mut phase = Phase::Active(conn, sub);

        loop {
            debug!(state = phase.name(), "monitor state");
            phase = match phase {
                Phase::Disconnected => match self.connect().await {
                    Ok(conn) => Phase::Subscribing(conn),
                    Err(e) => match self.back_off(e, shutdown.as_mut()).await? {
                        Retry::Again => Phase::Disconnected,
                        Retry::Shutdown => Phase::ShuttingDown,
                    },
                },

                Phase::Subscribing(mut conn) => match self.subscribe(conn.as_ref()).await {
                    Ok(sub) => {
                        self.backoff.reset();
                        self.stats.reconnections += 1;
                        Phase::Active(conn, sub)
                    }
                    // the socket is gone: redial before subscribing again
                    Err(e) if e.is_connection_lost() => {
                        conn.close().await;
                        match self.back_off(e, shutdown.as_mut()).await? {
                            Retry::Again => Phase::Disconnected,
                            Retry::Shutdown => Phase::ShuttingDown,
                        }
                    }
                    // node refused the request on a working socket
                    Err(e) => match self.back_off(e, shutdown.as_mut()).await {
                        Ok(Retry::Again) => Phase::Subscribing(conn),
                        Ok(Retry::Shutdown) => {
                            conn.close().await;
                            Phase::ShuttingDown
                        }
                        Err(exhausted) => {
                            conn.close().await;
                            return Err(exhausted);
                        }
                    },
                },

                Phase::Active(conn, mut sub) => {
                    tokio::select! {
                        _ = shutdown.as_mut() => {
                            info!("interrupt signal received, shutting down");
                            release(conn, sub).await;
                            Phase::ShuttingDown
                        }
                        err = &mut sub.errors => {
                            let reason = match err {
                                Ok(e) => e.to_string(),
                                Err(_) => "error channel dropped".to_string(),
                            };
                            warn!(subscription = %sub.id, error = %reason, "subscription error, reconnecting");
                            release(conn, sub).await;
                            Phase::Disconnected
                        }
                        log = sub.logs.recv() => match log {
                            Some(log) => {
                                self.handle_log(&log, &mut out);
                                Phase::Active(conn, sub)
                            }
                            None => {
                                warn!(subscription = %sub.id, "log stream ended, reconnecting");
                                release(conn, sub).await;
                                Phase::Disconnected
                            }
                        },
                    }
                }

                Phase::ShuttingDown => break,
            };
        }

        let s = &self.stats;
        info!(
            logs = s.logs_received,
            mints = s.mints,
            burns = s.burns,
            transfers = s.transfers,
            reconnections = s.reconnections,
            "exiting"
        );
        Ok(self.stats)
    }

    async fn connect(&self) -> Result<Box<dyn ChainConnection>, TransportError> {
        info!(url = %self.url, "connecting to node");
        let conn = self.client.dial(&self.url).await?;
        info!(url = %self.url, "connected");
        Ok(conn)
    }

    async fn subscribe(&self, conn: &dyn ChainConnection) -> Result<LogSubscription, TransportError> {
        let sub = conn.subscribe_logs(&self.filter).await?;
        info!(subscription = %sub.id, contract = ?self.filter.address, "subscribed to logs");
        Ok(sub)
    }

    /// Record a failed reconnect attempt and wait out the backoff delay.
    /// The shutdown signal cuts the wait short.
    async fn back_off<F>(&mut self, error: TransportError, shutdown: Pin<&mut F>) -> Result<Retry, MonitorError>
    where
        F: Future<Output = ()>,
    {
        let Some(delay) = self.backoff.record_failure() else {
            return Err(MonitorError::ReconnectExhausted {
                attempts: self.backoff.failures(),
                last: error,
            });
        };
        warn!(
            error = %error,
            attempt = self.backoff.failures(),
            "reconnect failed, retrying in {delay:?}"
        );
        tokio::select! {
            _ = shutdown => {
                info!("interrupt signal received, shutting down");
                Ok(Retry::Shutdown)
            }
            _ = tokio::time::sleep(delay) => Ok(Retry::Again),
        }
    }

    fn handle_log<W: Write>(&mut self, log: &LogEntry, out: &mut W) {
        self.stats.logs_received += 1;
        if log.removed {
            debug!(tx = ?log.transaction_hash, "skipping removed log");
            self.stats.removed += 1;
            return;
        }
        let line = match self.formatter.classify_and_format(log) {
            Classified::Event { kind, line } => {
                match kind {
                    TransferKind::Mint => self.stats.mints += 1,
                    TransferKind::Burn => self.stats.burns += 1,
                    TransferKind::Transfer => self.stats.transfers += 1,
                }
                line
            }
            Classified::Ignored => {
                self.stats.ignored += 1;
                return;
            }
            Classified::Malformed(_) => {
                self.stats.malformed += 1;
                return;
            }
        };
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            warn!(error = %e, "failed to write event line");
        }
    }
}

/// Drop the subscription, then the connection it rides on.
async fn release(mut conn: Box<dyn ChainConnection>, sub: LogSubscription) {
    let id = sub.id.clone();
    match tokio::time::timeout(UNSUBSCRIBE_TIMEOUT, conn.unsubscribe(sub)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(subscription = %id, error = %e, "unsubscribe failed"),
        Err(_) => debug!(subscription = %id, "unsubscribe timed out"),
    }
    conn.close().await;
}
