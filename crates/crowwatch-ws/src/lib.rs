//! crowwatch-ws: WebSocket JSON-RPC implementation of the CrowWatch chain client.
//!
//! # Features
//! - One background task per connection multiplexing requests and notifications
//! - Log subscriptions (eth_subscribe / eth_unsubscribe)
//! - Connection loss surfaced on every subscription's error channel
//! - Ping/pong keepalive with a dead-peer deadline

pub mod client;
pub mod request;
pub mod subscriptions;

pub use client::{KeepAlive, WsChainClient, WsConnection};
pub use request::{JsonRpcRequest, JsonRpcResponse, RpcId};
pub use subscriptions::{parse_log, SubscriptionManager};
