//! Metrics hook.
//!
//! The client reports into an externally synchronized registry through this
//! trait; every method has an empty default so integrations implement only
//! what their backend exposes.

use std::sync::Arc;
use std::time::Duration;

/// Counter/histogram surface reported by the client core.
#[allow(unused_variables)]
pub trait RtmMetricsReporter: Send + Sync + 'static {
    /// A client finished its start sequence successfully.
    fn client_started(&self) {}

    /// A transport or bookkeeping failure, labeled by where it happened.
    fn client_error(&self, context: &'static str) {}

    /// An inbound PDU was classified.
    fn action_received(&self, action: &str) {}

    /// A control frame (ping/pong/close) arrived.
    fn frame_received(&self, kind: &'static str) {}

    /// An inbound frame could not be decoded.
    fn decode_error(&self) {}

    fn bytes_read(&self, bytes: u64) {}

    fn bytes_written(&self, bytes: u64) {}

    /// Channel data arrived: `count` messages in one PDU of `bytes` bytes.
    fn messages_received(&self, channel: &str, count: u64, bytes: u64) {}

    /// A publish was written to the wire.
    fn message_sent(&self, channel: &str, bytes: u64) {}

    fn ping_sent(&self) {}

    /// Round trip measured between an application ping and its pong.
    fn observe_ping_rtt(&self, rtt: Duration) {}

    /// Time between issuing a publish and its `rtm/publish/ok`.
    fn observe_publish_ack(&self, latency: Duration) {}

    /// Time a request spent queued before the transport write completed.
    fn observe_write_delay(&self, delay: Duration) {}

    /// A `rtm/subscription/error` arrived for the channel.
    fn subscription_error(&self, channel: &str) {}

    /// A terminal `*/error` PDU or write failure, labeled by request kind.
    fn request_error(&self, kind: &'static str) {}
}

/// Shared handle for passing the reporter around.
pub type RtmMetricsHook = Arc<dyn RtmMetricsReporter>;

/// Default reporter that drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl RtmMetricsReporter for NoopMetrics {}

pub fn noop_metrics() -> RtmMetricsHook {
    Arc::new(NoopMetrics)
}
