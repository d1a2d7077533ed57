//! WebSocket JSON-RPC chain client.
//!
//! Each connection is owned by a background task that multiplexes
//! requests, responses and `eth_subscription` notifications over the one
//! socket. The task never reconnects: when the socket fails it reports the
//! failure on every subscription's error channel and exits, and the monitor
//! decides what to do next.
//!
//! A silent peer counts as a failure too. The task pings the node every
//! [`KeepAlive::ping_interval`] and gives up when nothing at all has arrived
//! for `ping_interval + pong_timeout`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crowwatch_core::{
    ChainClient, ChainConnection, LogFilter, LogSubscription, SubscriptionId, TransportError,
};

use crate::request::{JsonRpcRequest, JsonRpcResponse, RpcId};
use crate::subscriptions::SubscriptionManager;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Liveness probing for an open connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    /// How often a ping is sent.
    pub ping_interval: Duration,
    /// Extra silence tolerated after a ping before the socket is declared dead.
    pub pong_timeout: Duration,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(30),
        }
    }
}

/// Dials WebSocket node endpoints.
#[derive(Debug, Clone, Default)]
pub struct WsChainClient {
    keepalive: KeepAlive,
}

impl WsChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client whose connections check liveness with `keepalive`.
    pub fn with_keepalive(keepalive: KeepAlive) -> Self {
        Self { keepalive }
    }
}

#[async_trait]
impl ChainClient for WsChainClient {
    async fn dial(&self, url: &str) -> Result<Box<dyn ChainConnection>, TransportError> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(WsConnection::start(url, ws, self.keepalive)))
    }
}

/// Where the task delivers the response to a request.
enum Reply {
    Call(oneshot::Sender<Result<Value, TransportError>>),
    /// `eth_subscribe`: the task registers the subscription itself, before
    /// reading the next frame, so no notification can outrun it.
    Subscribe(oneshot::Sender<Result<LogSubscription, TransportError>>),
}

impl Reply {
    fn fail(self, err: TransportError) {
        match self {
            Self::Call(tx) => {
                let _ = tx.send(Err(err));
            }
            Self::Subscribe(tx) => {
                let _ = tx.send(Err(err));
            }
        }
    }
}

/// Command sent from the connection handle to its background task.
enum WsCommand {
    Send { req: JsonRpcRequest, reply: Reply },
    Close,
}

/// One open WebSocket connection.
pub struct WsConnection {
    url: String,
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    subscriptions: SubscriptionManager,
    next_id: AtomicU64,
    task: Option<JoinHandle<()>>,
}

impl WsConnection {
    fn start(url: &str, ws: WsStream, keepalive: KeepAlive) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let subscriptions = SubscriptionManager::new();
        let task = tokio::spawn(ws_task(
            url.to_string(),
            ws,
            keepalive,
            cmd_rx,
            subscriptions.clone(),
        ));
        Self {
            url: url.to_string(),
            cmd_tx,
            subscriptions,
            next_id: AtomicU64::new(1),
            task: Some(task),
        }
    }

    /// The endpoint this connection was dialed to.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn request(&self, method: &str, params: Vec<Value>, reply: Reply) -> Result<(), TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);
        self.cmd_tx
            .send(WsCommand::Send { req, reply })
            .map_err(|_| TransportError::Closed("WS task stopped".into()))
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

#[async_trait]
impl ChainConnection for WsConnection {
    async fn subscribe_logs(&self, filter: &LogFilter) -> Result<LogSubscription, TransportError> {
        let (tx, rx) = oneshot::channel();
        let params = vec![Value::String("logs".into()), serde_json::to_value(filter)?];
        self.request("eth_subscribe", params, Reply::Subscribe(tx))?;
        rx.await
            .map_err(|_| TransportError::Closed("WS response dropped".into()))?
    }

    async fn unsubscribe(&self, subscription: LogSubscription) -> Result<(), TransportError> {
        let id = subscription.id.clone();
        self.subscriptions.remove(&id);
        drop(subscription);

        let (tx, rx) = oneshot::channel();
        self.request("eth_unsubscribe", vec![Value::String(id.0.clone())], Reply::Call(tx))?;
        let result = rx
            .await
            .map_err(|_| TransportError::Closed("WS response dropped".into()))??;
        if result != Value::Bool(true) {
            tracing::debug!(subscription = %id, result = %result, "node did not confirm eth_unsubscribe");
        }
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Background task that owns the WebSocket connection.
async fn ws_task(
    url: String,
    ws: WsStream,
    keepalive: KeepAlive,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
    subscriptions: SubscriptionManager,
) {
    let (mut sink, mut stream) = ws.split();
    let mut pending: HashMap<u64, Reply> = HashMap::new();

    let deadline = keepalive.ping_interval + keepalive.pong_timeout;
    let mut ping_timer = time::interval_at(Instant::now() + keepalive.ping_interval, keepalive.ping_interval);
    ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    let reason = loop {
        tokio::select! {
            // Incoming commands from the connection handle
            cmd = cmd_rx.recv() => match cmd {
                None | Some(WsCommand::Close) => {
                    tracing::debug!(url = %url, "closing WebSocket");
                    let _ = sink.send(Message::Close(None)).await;
                    subscriptions.clear();
                    for (_, reply) in pending.drain() {
                        reply.fail(TransportError::Closed("connection closed".into()));
                    }
                    return;
                }
                Some(WsCommand::Send { req, reply }) => {
                    let id = match &req.id { RpcId::Number(n) => *n, _ => 0 };
                    let text = match serde_json::to_string(&req) {
                        Ok(text) => text,
                        Err(e) => {
                            reply.fail(e.into());
                            continue;
                        }
                    };
                    tracing::debug!(url = %url, method = %req.method, id, "WS send");
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        reply.fail(TransportError::WebSocket(e.to_string()));
                        break format!("send failed: {e}");
                    }
                    pending.insert(id, reply);
                }
            },
            // Keepalive
            _ = ping_timer.tick() => {
                let silent = last_seen.elapsed();
                if silent >= deadline {
                    break format!("pong timeout: nothing received for {silent:?}");
                }
                if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                    break format!("ping failed: {e}");
                }
            }
            // Incoming messages from the node
            msg = stream.next() => match msg {
                None => break "stream ended".to_string(),
                Some(Err(e)) => break e.to_string(),
                Some(Ok(frame)) => {
                    last_seen = Instant::now();
                    match frame {
                        Message::Text(text) => {
                            tracing::trace!(len = text.len(), "WS message");
                            handle_message(text.as_str(), &mut pending, &subscriptions);
                        }
                        Message::Ping(data) => {
                            let _ = sink.send(Message::Pong(data)).await;
                        }
                        Message::Close(frame) => {
                            break match frame {
                                Some(frame) => format!("closed by server: {} {}", frame.code, frame.reason),
                                None => "closed by server".to_string(),
                            };
                        }
                        _ => {} // binary / pong / raw frames
                    }
                }
            },
        }
    };

    tracing::warn!(url = %url, reason = %reason, "WebSocket connection lost");
    for (_, reply) in pending.drain() {
        reply.fail(TransportError::Closed(reason.clone()));
    }
    subscriptions.fail_all(&reason);
}

fn handle_message(text: &str, pending: &mut HashMap<u64, Reply>, subscriptions: &SubscriptionManager) {
    let Ok(val) = serde_json::from_str::<Value>(text) else {
        tracing::debug!("failed to parse WS message as JSON");
        return;
    };

    // Subscription notification
    if val.get("method").and_then(Value::as_str) == Some("eth_subscription") {
        let params = &val["params"];
        if let Some(id) = params["subscription"].as_str() {
            subscriptions.dispatch(&SubscriptionId(id.to_string()), &params["result"]);
        }
        return;
    }

    // Regular JSON-RPC response
    let resp = match serde_json::from_value::<JsonRpcResponse>(val) {
        Ok(resp) => resp,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring WS message that is neither response nor notification");
            return;
        }
    };
    let RpcId::Number(id) = resp.id else {
        return;
    };
    let Some(reply) = pending.remove(&id) else {
        tracing::debug!(id, "response for unknown request");
        return;
    };

    match reply {
        Reply::Call(tx) => {
            let _ = tx.send(resp.into_result());
        }
        Reply::Subscribe(tx) => {
            let result = resp
                .into_result()
                .and_then(|v| serde_json::from_value::<String>(v).map_err(TransportError::from))
                .map(|id| subscriptions.register(SubscriptionId(id)));
            // caller gave up waiting: forget the registration again
            if let Err(Ok(sub)) = tx.send(result) {
                subscriptions.remove(&sub.id);
            }
        }
    }
}
