//! The wire client.
//!
//! One actor owns the whole connection: lifecycle state machine, request
//! table, subscription registry, ping scheduler and the IO tasks. The
//! transport reader runs as a plain tokio task outside the actor and posts
//! frames into the mailbox; the writer is a separate actor serializing
//! outbound operations.

use std::time::Instant;

use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage, WeakActorRef};
use sonic_rs::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::ping::PingTable;
use super::requests::{PendingRequest, PendingRequests, RequestKind};
use super::subscriptions::SubscriptionRegistry;
use super::timings::ClientTimings;
use super::writer::{CompletedOp, Outbound, WriterActor};
use super::{
    ClientState, ClientStats, ErrorHook, GetClientStats, Publish, RequestHook, Start, StateCell,
    Stop, Subscribe, Unsubscribe,
};
use crate::core::{RtmConfig, RtmError, RtmResult, WsFrame, codec};
use crate::core::pdu;
use crate::metrics::{RtmMetricsHook, noop_metrics};
use crate::protocol_violation;
use crate::transport::{ConnectParams, WsTransport};

/// Construction arguments for one wire client.
pub struct RtmClientArgs<T: WsTransport> {
    pub config: RtmConfig,
    pub transport: T,
    /// Sink for connection-level failures; the resilient layer installs its
    /// restart hook here.
    pub error_sink: ErrorHook,
    pub metrics: Option<RtmMetricsHook>,
}

pub struct RtmClient<T: WsTransport> {
    pub(crate) config: RtmConfig,
    transport: T,
    error_sink: ErrorHook,
    pub(crate) metrics: RtmMetricsHook,
    state: StateCell,
    actor_ref: ActorRef<Self>,

    pub(crate) subscriptions: SubscriptionRegistry,
    pub(crate) requests: PendingRequests,
    pub(crate) pings: PingTable,
    pub(crate) timings: ClientTimings,
    /// Monotonic id allocator shared by data requests and ping nonces;
    /// scoped to this client instance so counters reset with the connection.
    request_id_seq: u64,

    writer_ref: Option<ActorRef<WriterActor<T>>>,
    reader_task: Option<JoinHandle<()>>,
    ping_task: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

/// A frame handed out of the transport, stamped at receipt.
pub(crate) struct InboundFrame {
    pub(crate) frame: WsFrame,
    pub(crate) arrival: Instant,
}

/// The read loop ended: by cancellation after `Stop`, or by a transport
/// failure (`error`, or a silent remote close when `error` is `None`).
pub(crate) struct ReadClosed {
    pub(crate) cancelled: bool,
    pub(crate) error: Option<String>,
}

/// One-shot ping timer fired.
pub(crate) struct PingTick;

/// Completion of an outbound operation, reported by the writer.
pub(crate) struct RequestDone {
    pub(crate) op: CompletedOp,
    pub(crate) result: Result<(), RtmError>,
}

impl<T: WsTransport> Actor for RtmClient<T> {
    type Args = RtmClientArgs<T>;
    type Error = RtmError;

    fn name() -> &'static str {
        "RtmClient"
    }

    async fn on_start(args: Self::Args, ctx: ActorRef<Self>) -> RtmResult<Self> {
        let RtmClientArgs {
            config,
            transport,
            error_sink,
            metrics,
        } = args;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            transport,
            error_sink,
            metrics: metrics.unwrap_or_else(noop_metrics),
            state: StateCell::new(),
            actor_ref: ctx,
            subscriptions: SubscriptionRegistry::new(),
            requests: PendingRequests::new(),
            pings: PingTable::new(),
            timings: ClientTimings::new(),
            request_id_seq: 1,
            writer_ref: None,
            reader_task: None,
            ping_task: None,
            shutdown_tx,
            shutdown_rx,
        })
    }

    async fn on_stop(
        &mut self,
        _ctx: WeakActorRef<Self>,
        _reason: kameo::error::ActorStopReason,
    ) -> RtmResult<()> {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.ping_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.reader_task.take() {
            let _ = handle.await;
        }
        self.teardown_writer().await;
        Ok(())
    }

    fn on_panic(
        &mut self,
        _actor_ref: kameo::actor::WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        async move {
            tracing::error!(error = ?err, "client actor panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

impl<T: WsTransport> KameoMessage<Start> for RtmClient<T> {
    type Reply = RtmResult<()>;

    async fn handle(&mut self, _msg: Start, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if self.state.get() != ClientState::Stopped {
            protocol_violation!("start invoked in state {}", self.state.get());
            return Err(RtmError::Unknown);
        }

        info!(
            host = %self.config.host,
            port = self.config.port,
            encoding = ?self.config.encoding,
            "starting client"
        );

        let params = ConnectParams {
            url: self.config.endpoint_url(),
            subprotocol: self.config.encoding.subprotocol(),
            read_message_limit: self.config.read_message_limit,
        };

        let (reader, sink) = match self.transport.connect(params).await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, "client start failed");
                self.metrics.client_error("connect");
                return Err(err);
            }
        };

        info!("websocket open");
        self.metrics.client_started();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = shutdown_tx;
        self.shutdown_rx = shutdown_rx;

        let writer = WriterActor::spawn(WriterActor::new(
            sink,
            self.actor_ref.clone(),
            self.shutdown_rx.clone(),
        ));
        self.writer_ref = Some(writer);

        self.state.set(ClientState::Running);
        self.arm_ping_timer();
        self.spawn_reader(reader);
        Ok(())
    }
}

impl<T: WsTransport> KameoMessage<Stop> for RtmClient<T> {
    type Reply = RtmResult<()>;

    async fn handle(&mut self, _msg: Stop, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if self.state.get() != ClientState::Running {
            protocol_violation!("stop invoked in state {}", self.state.get());
            return Err(RtmError::Unknown);
        }

        info!("stopping client");
        self.state.set(ClientState::PendingStopped);
        // Cancels the ping timer and the outstanding read; the reader posts
        // `ReadClosed { cancelled: true }` and teardown completes there.
        let _ = self.shutdown_tx.send(true);

        // If the read loop already exited (transport died earlier) there is
        // no cancellation left to observe; complete the teardown here.
        let reader_gone = self
            .reader_task
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(true);
        if reader_gone {
            self.finish_teardown().await;
        }
        Ok(())
    }
}

impl<T: WsTransport> KameoMessage<Publish> for RtmClient<T> {
    type Reply = ();

    async fn handle(&mut self, msg: Publish, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if !self.check_running("publish") {
            return;
        }

        let request_id = self.next_request_id();
        let pdu = pdu::publish(request_id, &msg.channel, msg.message);
        self.send_request(request_id, RequestKind::Publish, msg.channel, pdu, msg.callbacks)
            .await;
    }
}

impl<T: WsTransport> KameoMessage<Subscribe> for RtmClient<T> {
    type Reply = ();

    async fn handle(&mut self, msg: Subscribe, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if !self.check_running("subscribe") {
            return;
        }

        // Inserted before the server confirms: data for a fresh channel may
        // interleave with the acknowledgement.
        if !self
            .subscriptions
            .add(&msg.channel, msg.handle, msg.data_sink)
        {
            protocol_violation!("subscription already exists for channel {}", msg.channel);
            return;
        }

        let request_id = self.next_request_id();
        let pdu = pdu::subscribe(request_id, &msg.channel, msg.options.as_ref());
        self.send_request(
            request_id,
            RequestKind::Subscribe,
            msg.channel,
            pdu,
            msg.callbacks,
        )
        .await;
    }
}

impl<T: WsTransport> KameoMessage<Unsubscribe> for RtmClient<T> {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: Unsubscribe,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if !self.check_running("unsubscribe") {
            return;
        }

        let Some(channel) = self
            .subscriptions
            .channel_of(&msg.handle)
            .map(str::to_string)
        else {
            protocol_violation!("unsubscribe for unknown handle {:?}", msg.handle);
            return;
        };

        // The registry entry stays until the terminal PDU arrives so late
        // data still dispatches correctly.
        let request_id = self.next_request_id();
        let pdu = pdu::unsubscribe(request_id, &channel);
        self.send_request(request_id, RequestKind::Unsubscribe, channel, pdu, msg.callbacks)
            .await;
    }
}

impl<T: WsTransport> KameoMessage<PingTick> for RtmClient<T> {
    type Reply = ();

    async fn handle(&mut self, _msg: PingTick, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if self.state.get() != ClientState::Running {
            debug!("ping tick ignored in state {}", self.state.get());
            return;
        }

        let nonce = self.next_request_id();
        self.pings.record(nonce, Instant::now());
        debug!(nonce, "sending application ping");
        self.enqueue(Outbound::Ping { nonce }).await;
    }
}

impl<T: WsTransport> KameoMessage<RequestDone> for RtmClient<T> {
    type Reply = ();

    async fn handle(&mut self, msg: RequestDone, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        match msg.op {
            CompletedOp::Write { request_id } => match msg.result {
                Ok(()) => {
                    if let Some(info) = self.requests.get(request_id) {
                        self.metrics.observe_write_delay(info.issued_at.elapsed());
                        self.metrics.bytes_written(info.byte_size as u64);
                        if info.kind == RequestKind::Publish {
                            self.metrics
                                .message_sent(&info.channel, info.byte_size as u64);
                        }
                    }
                }
                Err(err) => {
                    self.metrics.client_error("write");
                    if let Some(info) = self.requests.remove(request_id) {
                        warn!(request_id, error = %err, pdu = ?info.pdu, "write request failed");
                        self.metrics.request_error(info.kind.label());
                        if let Some(callbacks) = info.callbacks.as_ref() {
                            callbacks.on_error(info.kind.error());
                        }
                    }
                }
            },
            CompletedOp::Ping { nonce } => match msg.result {
                Ok(()) => {
                    self.metrics.ping_sent();
                    if self.state.get() == ClientState::Running {
                        self.arm_ping_timer();
                    }
                }
                Err(err) => {
                    if self.state.get() == ClientState::Running {
                        warn!(nonce, error = %err, "ping write failed");
                        self.metrics.client_error("ping");
                        self.error_sink
                            .on_error(RtmError::transport("ping", err));
                    } else {
                        debug!(nonce, "ping abandoned while stopping");
                    }
                }
            },
        }
    }
}

impl<T: WsTransport> KameoMessage<InboundFrame> for RtmClient<T> {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: InboundFrame,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.handle_frame(msg.frame, msg.arrival);
    }
}

impl<T: WsTransport> KameoMessage<ReadClosed> for RtmClient<T> {
    type Reply = ();

    async fn handle(&mut self, msg: ReadClosed, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if msg.cancelled || self.state.get() == ClientState::PendingStopped {
            if !msg.cancelled {
                info!(error = ?msg.error, "ignoring read failure while stopping");
            }
            self.finish_teardown().await;
            return;
        }

        if self.state.get() == ClientState::Running {
            let error = msg
                .error
                .unwrap_or_else(|| "connection closed by remote".to_string());
            warn!(error = %error, "transport read failed");
            self.metrics.client_error("read");
            // The resilient layer is the retry layer; this client only
            // reports the failure.
            self.error_sink
                .on_error(RtmError::Transport { context: "read", error });
        }
    }
}

impl<T: WsTransport> KameoMessage<GetClientStats> for RtmClient<T> {
    type Reply = RtmResult<ClientStats>;

    async fn handle(
        &mut self,
        _msg: GetClientStats,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(ClientStats {
            state: self.state.get(),
            pending_requests: self.requests.len(),
            subscriptions: self.subscriptions.len(),
            pings_outstanding: self.pings.len(),
            ping_rtt: self.timings.ping_rtt(),
            publish_ack: self.timings.publish_ack(),
        })
    }
}

impl<T: WsTransport> RtmClient<T> {
    fn next_request_id(&mut self) -> u64 {
        let id = self.request_id_seq;
        self.request_id_seq += 1;
        id
    }

    /// Gate for data-plane operations: silently dropped while stopping, a
    /// programming error when stopped.
    fn check_running(&self, operation: &'static str) -> bool {
        match self.state.get() {
            ClientState::Running => true,
            ClientState::PendingStopped => {
                debug!(operation, "ignored while client is pending stop");
                false
            }
            state => {
                protocol_violation!("{operation} invoked in state {state}");
                false
            }
        }
    }

    async fn send_request(
        &mut self,
        request_id: u64,
        kind: RequestKind,
        channel: String,
        pdu: Value,
        callbacks: Option<RequestHook>,
    ) {
        let bytes = match codec::encode(self.config.encoding, &pdu) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(request_id, error = %err, "failed to encode request");
                self.metrics.client_error("encode");
                if let Some(callbacks) = callbacks.as_ref() {
                    callbacks.on_error(err);
                }
                return;
            }
        };

        let byte_size = bytes.len();
        let inserted = self.requests.insert(
            request_id,
            PendingRequest {
                kind,
                channel,
                pdu,
                issued_at: Instant::now(),
                byte_size,
                callbacks,
            },
        );
        if !inserted {
            protocol_violation!("duplicate request id {request_id}");
            return;
        }

        debug!(request_id, kind = kind.label(), byte_size, "enqueueing request");
        let frame = codec::into_frame(self.config.encoding, bytes);
        self.enqueue(Outbound::Write { request_id, frame }).await;
    }

    async fn enqueue(&mut self, outbound: Outbound) {
        let Some(writer) = self.writer_ref.clone() else {
            protocol_violation!("outbound request with no writer attached");
            return;
        };
        let _ = writer.tell(outbound).send().await;
    }

    /// One-shot timer; re-armed by the completion of the ping it triggers.
    fn arm_ping_timer(&mut self) {
        if let Some(handle) = self.ping_task.take() {
            handle.abort();
        }

        let actor_ref = self.actor_ref.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();
        let interval = self.config.ping_interval;
        self.ping_task = Some(tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = tokio::time::sleep(interval) => {
                    let _ = actor_ref.tell(PingTick).send().await;
                }
            }
        }));
    }

    fn spawn_reader(&mut self, reader: T::Reader) {
        use futures_util::StreamExt;

        let actor_ref = self.actor_ref.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();
        self.reader_task = Some(tokio::spawn(async move {
            let mut read = reader;
            loop {
                tokio::select! {
                    res = shutdown_rx.changed() => {
                        if res.is_err() || *shutdown_rx.borrow_and_update() {
                            let _ = actor_ref
                                .tell(ReadClosed { cancelled: true, error: None })
                                .send()
                                .await;
                            break;
                        }
                    }
                    frame = read.next() => {
                        // Stamped once here so per-message callbacks all see
                        // the same arrival time regardless of dispatch cost.
                        let arrival = Instant::now();
                        match frame {
                            Some(Ok(frame)) => {
                                if actor_ref
                                    .tell(InboundFrame { frame, arrival })
                                    .send()
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Some(Err(err)) => {
                                let _ = actor_ref
                                    .tell(ReadClosed {
                                        cancelled: false,
                                        error: Some(err.to_string()),
                                    })
                                    .send()
                                    .await;
                                break;
                            }
                            None => {
                                let _ = actor_ref
                                    .tell(ReadClosed { cancelled: false, error: None })
                                    .send()
                                    .await;
                                break;
                            }
                        }
                    }
                }
            }
        }));
    }

    async fn teardown_writer(&mut self) {
        if let Some(writer) = self.writer_ref.take() {
            let _ = writer.stop_gracefully().await;
            writer.wait_for_shutdown().await;
        }
    }

    /// Final transition into `STOPPED`: every table must come out empty.
    async fn finish_teardown(&mut self) {
        self.state.set(ClientState::Stopped);

        if let Some(handle) = self.ping_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.reader_task.take() {
            let _ = handle.await;
        }
        self.teardown_writer().await;

        self.subscriptions.clear();
        self.pings.clear();
        for (request_id, info) in self.requests.take_all() {
            debug!(request_id, "failing pending request on teardown");
            if let Some(callbacks) = info.callbacks.as_ref() {
                callbacks.on_error(RtmError::transport("teardown", "connection stopped"));
            }
        }

        info!("client stopped");
    }
}
