use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, Stream};

use crate::core::{RtmError, RtmResult, WsFrame};

pub mod tungstenite;

/// Parameters for one websocket upgrade.
#[derive(Clone, Debug)]
pub struct ConnectParams {
    /// Full upgrade URL, including target path and appkey query.
    pub url: String,
    /// Sub-protocol requested in the upgrade, when the binary encoding is
    /// selected.
    pub subprotocol: Option<&'static str>,
    /// Inbound messages larger than this are rejected by the transport.
    pub read_message_limit: usize,
}

pub type ConnectFuture<R, W> =
    Pin<Box<dyn Future<Output = RtmResult<(R, W)>> + Send>>;

/// Transport boundary: a secure websocket carrying discrete messages.
///
/// Intentionally minimal so the client core can be driven by the in-memory
/// mock in tests and by tokio-tungstenite in production without touching
/// protocol or state logic.
pub trait WsTransport: Clone + Send + Sync + 'static {
    type Reader: Stream<Item = Result<WsFrame, RtmError>> + Send + Unpin + 'static;
    type Writer: Sink<WsFrame, Error = RtmError> + Send + Sync + Unpin + 'static;

    fn connect(&self, params: ConnectParams) -> ConnectFuture<Self::Reader, Self::Writer>;
}
