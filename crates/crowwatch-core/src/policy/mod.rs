//! Reconnect policy.

pub mod backoff;

pub use backoff::{Backoff, ReconnectConfig};
