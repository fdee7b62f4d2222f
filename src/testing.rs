//! Reusable test utilities for exercising the client without a real socket.
//!
//! [`MockTransport`] hands out one in-memory connection per `connect` call;
//! the paired [`MockServer`] accepts sessions, inspects outbound frames and
//! pushes inbound ones, so tests can emulate server behavior including
//! mid-flight socket drops and reconnects.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::Sink;
use sonic_rs::Value;
use tokio::sync::mpsc;

use crate::client::{ChannelData, ErrorCallbacks, RequestCallbacks, SubscriptionCallbacks};
use crate::client::SubscriptionHandle;
use crate::core::{RtmError, WsFrame, frame_bytes};
use crate::metrics::RtmMetricsReporter;
use crate::transport::{ConnectFuture, ConnectParams, WsTransport};

/// In-memory transport. Each `connect` call produces a fresh session on the
/// paired [`MockServer`].
#[derive(Clone)]
pub struct MockTransport {
    sessions_tx: mpsc::UnboundedSender<MockSession>,
    fail_connects: Arc<AtomicBool>,
}

impl MockTransport {
    /// Build a transport + server control pair.
    pub fn channel_pair() -> (Self, MockServer) {
        let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
        (
            Self {
                sessions_tx,
                fail_connects: Arc::new(AtomicBool::new(false)),
            },
            MockServer { sessions_rx },
        )
    }

    /// Make subsequent `connect` calls fail until reset.
    pub fn set_failing(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }
}

impl WsTransport for MockTransport {
    type Reader = MockReader;
    type Writer = MockWriter;

    fn connect(&self, params: ConnectParams) -> ConnectFuture<Self::Reader, Self::Writer> {
        let sessions_tx = self.sessions_tx.clone();
        let fail = self.fail_connects.load(Ordering::SeqCst);
        Box::pin(async move {
            if fail {
                return Err(RtmError::transport("connect", "connection refused"));
            }
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            sessions_tx
                .send(MockSession {
                    params,
                    outbound_rx,
                    inbound_tx: Some(inbound_tx),
                })
                .map_err(|_| RtmError::transport("connect", "mock server dropped"))?;
            Ok((
                MockReader { rx: inbound_rx },
                MockWriter { tx: outbound_tx },
            ))
        })
    }
}

/// Server-side control handle paired with [`MockTransport`].
pub struct MockServer {
    sessions_rx: mpsc::UnboundedReceiver<MockSession>,
}

impl MockServer {
    /// Wait for the next connection attempt.
    pub async fn accept(&mut self) -> Option<MockSession> {
        self.sessions_rx.recv().await
    }

    pub async fn accept_timeout(&mut self, timeout: Duration) -> Option<MockSession> {
        tokio::time::timeout(timeout, self.sessions_rx.recv())
            .await
            .unwrap_or_default()
    }
}

/// One accepted connection, seen from the server side.
pub struct MockSession {
    /// Upgrade parameters the client connected with.
    pub params: ConnectParams,
    outbound_rx: mpsc::UnboundedReceiver<WsFrame>,
    inbound_tx: Option<mpsc::UnboundedSender<WsFrame>>,
}

impl MockSession {
    /// Receive a frame the client wrote to the wire.
    pub async fn recv_outbound(&mut self) -> Option<WsFrame> {
        self.outbound_rx.recv().await
    }

    pub async fn recv_outbound_timeout(&mut self, timeout: Duration) -> Option<WsFrame> {
        tokio::time::timeout(timeout, self.outbound_rx.recv())
            .await
            .unwrap_or_default()
    }

    /// Push an inbound frame to the client.
    pub fn send_frame(&self, frame: WsFrame) -> bool {
        self.inbound_tx
            .as_ref()
            .map(|tx| tx.send(frame).is_ok())
            .unwrap_or(false)
    }

    /// Push a UTF-8 payload as a text message.
    pub fn send_text(&self, text: impl AsRef<str>) -> bool {
        self.send_frame(WsFrame::Text(Bytes::copy_from_slice(
            text.as_ref().as_bytes(),
        )))
    }

    /// Reply to an application ping.
    pub fn send_pong(&self, payload: impl AsRef<str>) -> bool {
        self.send_frame(WsFrame::Pong(Bytes::copy_from_slice(
            payload.as_ref().as_bytes(),
        )))
    }

    /// Simulate a server-side socket drop: the client's read stream ends.
    pub fn drop_socket(&mut self) {
        self.inbound_tx = None;
    }
}

/// Reader side for [`MockTransport`].
pub struct MockReader {
    rx: mpsc::UnboundedReceiver<WsFrame>,
}

impl futures_util::Stream for MockReader {
    type Item = Result<WsFrame, RtmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.rx).poll_recv(cx) {
            Poll::Ready(Some(frame)) => Poll::Ready(Some(Ok(frame))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Writer side for [`MockTransport`].
pub struct MockWriter {
    tx: mpsc::UnboundedSender<WsFrame>,
}

impl Sink<WsFrame> for MockWriter {
    type Error = RtmError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WsFrame) -> Result<(), Self::Error> {
        self.get_mut()
            .tx
            .send(item)
            .map_err(|_| RtmError::transport("write", "mock socket closed"))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// Parse an outbound text/binary frame as a JSON PDU.
pub fn frame_pdu(frame: &WsFrame) -> Option<Value> {
    sonic_rs::from_slice(frame_bytes(frame)?).ok()
}

/// Request sink that counts `on_ok` and collects errors.
#[derive(Default)]
pub struct RecordingRequestSink {
    ok: AtomicUsize,
    errors: Mutex<Vec<RtmError>>,
}

impl RecordingRequestSink {
    pub fn ok_count(&self) -> usize {
        self.ok.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> Vec<RtmError> {
        self.errors.lock().expect("sink lock").clone()
    }
}

impl RequestCallbacks for RecordingRequestSink {
    fn on_ok(&self) {
        self.ok.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, error: RtmError) {
        self.errors.lock().expect("sink lock").push(error);
    }
}

/// Subscription sink that collects payloads and errors.
#[derive(Default)]
pub struct CollectingSubscriptionSink {
    data: Mutex<Vec<Value>>,
    errors: Mutex<Vec<RtmError>>,
}

impl CollectingSubscriptionSink {
    pub fn payloads(&self) -> Vec<Value> {
        self.data.lock().expect("sink lock").clone()
    }

    pub fn errors(&self) -> Vec<RtmError> {
        self.errors.lock().expect("sink lock").clone()
    }
}

impl SubscriptionCallbacks for CollectingSubscriptionSink {
    fn on_data(&self, _handle: &SubscriptionHandle, data: ChannelData) {
        self.data.lock().expect("sink lock").push(data.payload);
    }

    fn on_error(&self, error: RtmError) {
        self.errors.lock().expect("sink lock").push(error);
    }
}

/// Connection-level sink that collects reported errors.
#[derive(Default)]
pub struct RecordingErrorSink {
    errors: Mutex<Vec<RtmError>>,
}

impl RecordingErrorSink {
    pub fn errors(&self) -> Vec<RtmError> {
        self.errors.lock().expect("sink lock").clone()
    }
}

impl ErrorCallbacks for RecordingErrorSink {
    fn on_error(&self, error: RtmError) {
        self.errors.lock().expect("sink lock").push(error);
    }
}

/// Metrics reporter capturing latency observations.
#[derive(Default)]
pub struct RecordingMetrics {
    ping_rtts: Mutex<Vec<Duration>>,
    publish_acks: Mutex<Vec<Duration>>,
}

impl RecordingMetrics {
    pub fn ping_rtts(&self) -> Vec<Duration> {
        self.ping_rtts.lock().expect("metrics lock").clone()
    }

    pub fn publish_acks(&self) -> Vec<Duration> {
        self.publish_acks.lock().expect("metrics lock").clone()
    }
}

impl RtmMetricsReporter for RecordingMetrics {
    fn observe_ping_rtt(&self, rtt: Duration) {
        self.ping_rtts.lock().expect("metrics lock").push(rtt);
    }

    fn observe_publish_ack(&self, latency: Duration) {
        self.publish_acks.lock().expect("metrics lock").push(latency);
    }
}
