//! Resilient publish/subscribe client over a secure WebSocket transport.
//!
//! [`client::RtmClient`] speaks the wire protocol on one connection:
//! publish, subscribe with optional history replay, unsubscribe, and an
//! application-level ping with round-trip measurement. All requests are
//! correlated with their `*/ok` / `*/error` terminals through a pending
//! table, and a per-connection writer serializes outbound operations so
//! wire order equals enqueue order.
//!
//! [`client::ResilientClient`] supervises a wire client, rebuilding it
//! through an injected factory when the transport fails and replaying the
//! desired subscription set on the fresh connection.

pub mod client;
pub mod core;
pub mod metrics;
pub mod testing;
pub mod transport;

pub use client::{
    ChannelData, ClientFactory, ClientState, ClientStats, ErrorCallbacks, ErrorHook,
    GetClientStats, LatencySnapshot, Publish, RequestCallbacks, RequestHook, ResilientClient,
    ResilientClientArgs, RtmClient, RtmClientArgs, Start, Stop, Subscribe, SubscriptionCallbacks,
    SubscriptionHandle, SubscriptionHook, Unsubscribe,
};
pub use crate::core::{
    History, RtmConfig, RtmError, RtmResult, SubscriptionOptions, WireEncoding, WsFrame,
};
pub use metrics::{NoopMetrics, RtmMetricsHook, RtmMetricsReporter};
pub use transport::tungstenite::TungsteniteTransport;
