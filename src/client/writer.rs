//! Write serializer.
//!
//! One writer actor per connection owns the transport sink. Its mailbox is
//! the FIFO of outbound requests and handlers run one at a time, so at most
//! one write or ping is ever in flight and wire order equals enqueue order.
//! Pings travel the same lane as data writes so they cannot race ahead and
//! measured round-trips stay representative of message latency.

use bytes::Bytes;
use futures_util::SinkExt;
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage};
use tokio::sync::watch;
use tracing::debug;

use super::secure::{RequestDone, RtmClient};
use crate::core::{RtmError, RtmResult, WsFrame};
use crate::transport::WsTransport;

/// Outbound request: an encoded PDU write or an application ping.
pub(crate) enum Outbound {
    Write { request_id: u64, frame: WsFrame },
    Ping { nonce: u64 },
}

/// Identity of a completed outbound operation, reported back to the client.
#[derive(Clone, Copy, Debug)]
pub(crate) enum CompletedOp {
    Write { request_id: u64 },
    Ping { nonce: u64 },
}

pub(crate) struct WriterActor<T: WsTransport> {
    sink: T::Writer,
    client: ActorRef<RtmClient<T>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<T: WsTransport> WriterActor<T> {
    pub(crate) fn new(
        sink: T::Writer,
        client: ActorRef<RtmClient<T>>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            sink,
            client,
            shutdown_rx,
        }
    }
}

impl<T: WsTransport> Actor for WriterActor<T> {
    type Args = Self;
    type Error = RtmError;

    fn name() -> &'static str {
        "RtmWriterActor"
    }

    async fn on_start(args: Self::Args, _ctx: ActorRef<Self>) -> RtmResult<Self> {
        Ok(args)
    }

    fn on_panic(
        &mut self,
        _actor_ref: kameo::actor::WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        async move {
            tracing::error!(error = ?err, "writer actor panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

impl<T: WsTransport> KameoMessage<Outbound> for WriterActor<T> {
    type Reply = ();

    async fn handle(&mut self, msg: Outbound, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let (op, frame) = match msg {
            Outbound::Write { request_id, frame } => {
                (CompletedOp::Write { request_id }, frame)
            }
            Outbound::Ping { nonce } => (
                CompletedOp::Ping { nonce },
                WsFrame::Ping(Bytes::from(nonce.to_string())),
            ),
        };

        let result = if *self.shutdown_rx.borrow() {
            Err(RtmError::NotConnected)
        } else {
            debug!(op = ?op, "dispatching outbound request to transport");
            self.sink.send(frame).await
        };

        let _ = self
            .client
            .tell(RequestDone { op, result })
            .send()
            .await;
    }
}
