//! The resilient client.
//!
//! Wraps one wire client and keeps the set of desired subscriptions. When
//! the inner client reports a transport failure, a fresh one is built
//! through the injected factory and every desired subscription is replayed
//! in insertion order on the new connection.

use std::sync::Arc;

use kameo::error::SendError;
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage};
use tracing::{debug, info, warn};

use super::secure::RtmClient;
use super::{
    ClientStats, ErrorCallbacks, ErrorHook, GetClientStats, Publish, Start, Stop, Subscribe,
    Unsubscribe,
};
use crate::core::{RtmError, RtmResult};
use crate::protocol_violation;
use crate::transport::WsTransport;

/// Builds a fresh wire client wired to the given connection-level error
/// sink. The factory owns endpoint configuration and transport.
pub type ClientFactory<T> = Box<dyn Fn(ErrorHook) -> ActorRef<RtmClient<T>> + Send + Sync>;

pub struct ResilientClientArgs<T: WsTransport> {
    pub factory: ClientFactory<T>,
    /// Outer sink; hit only when a restart itself fails.
    pub error_sink: ErrorHook,
}

pub struct ResilientClient<T: WsTransport> {
    factory: ClientFactory<T>,
    error_sink: ErrorHook,
    actor_ref: ActorRef<Self>,
    inner: Option<ActorRef<RtmClient<T>>>,
    /// Subscriptions to restore after a reconnect, in insertion order.
    desired: Vec<Subscribe>,
    started: bool,
}

/// Posted by the hook installed as the inner client's error sink.
pub(crate) struct InnerFailed {
    pub(crate) error: RtmError,
}

struct RestartOnError<T: WsTransport> {
    target: ActorRef<ResilientClient<T>>,
}

impl<T: WsTransport> ErrorCallbacks for RestartOnError<T> {
    fn on_error(&self, error: RtmError) {
        let target = self.target.clone();
        tokio::spawn(async move {
            let _ = target.tell(InnerFailed { error }).send().await;
        });
    }
}

impl<T: WsTransport> Actor for ResilientClient<T> {
    type Args = ResilientClientArgs<T>;
    type Error = RtmError;

    fn name() -> &'static str {
        "ResilientClient"
    }

    async fn on_start(args: Self::Args, ctx: ActorRef<Self>) -> RtmResult<Self> {
        Ok(Self {
            factory: args.factory,
            error_sink: args.error_sink,
            actor_ref: ctx,
            inner: None,
            desired: Vec::new(),
            started: false,
        })
    }
}

impl<T: WsTransport> KameoMessage<Start> for ResilientClient<T> {
    type Reply = RtmResult<()>;

    async fn handle(&mut self, _msg: Start, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if self.inner.is_none() {
            debug!("creating new client");
            self.inner = Some(self.spawn_inner());
        }
        self.started = true;

        let inner = self.inner.as_ref().expect("inner client just created").clone();
        Self::start_inner(&inner).await
    }
}

impl<T: WsTransport> KameoMessage<Stop> for ResilientClient<T> {
    type Reply = RtmResult<()>;

    async fn handle(&mut self, _msg: Stop, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.started = false;
        let Some(inner) = self.inner.clone() else {
            protocol_violation!("stop with no inner client");
            return Err(RtmError::NotConnected);
        };
        match inner.ask(Stop).await {
            Ok(()) => Ok(()),
            Err(SendError::HandlerError(err)) => Err(err),
            Err(_) => {
                warn!("inner client unreachable during stop");
                Err(RtmError::Unknown)
            }
        }
    }
}

impl<T: WsTransport> KameoMessage<Publish> for ResilientClient<T> {
    type Reply = ();

    async fn handle(&mut self, msg: Publish, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let Some(inner) = self.inner.clone() else {
            protocol_violation!("publish before start");
            return;
        };
        let _ = inner.tell(msg).send().await;
    }
}

impl<T: WsTransport> KameoMessage<Subscribe> for ResilientClient<T> {
    type Reply = ();

    async fn handle(&mut self, msg: Subscribe, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let Some(inner) = self.inner.clone() else {
            protocol_violation!("subscribe before start");
            return;
        };
        self.desired.push(msg.clone());
        let _ = inner.tell(msg).send().await;
    }
}

impl<T: WsTransport> KameoMessage<Unsubscribe> for ResilientClient<T> {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: Unsubscribe,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let Some(inner) = self.inner.clone() else {
            protocol_violation!("unsubscribe before start");
            return;
        };
        let handle = msg.handle.clone();
        let _ = inner.tell(msg).send().await;
        self.desired.retain(|sub| sub.handle != handle);
    }
}

impl<T: WsTransport> KameoMessage<InnerFailed> for ResilientClient<T> {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: InnerFailed,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        info!(error = %msg.error, "restarting client because of error");

        if let Some(old) = self.inner.take() {
            let _ = old.stop_gracefully().await;
            old.wait_for_shutdown().await;
        }

        debug!("creating new client");
        let inner = self.spawn_inner();
        self.inner = Some(inner.clone());

        if !self.started {
            return;
        }

        debug!("starting new client");
        if let Err(err) = Self::start_inner(&inner).await {
            warn!(error = %err, "can't restart client");
            self.error_sink.on_error(err);
            return;
        }

        debug!(subscriptions = self.desired.len(), "restoring subscriptions");
        for sub in &self.desired {
            let _ = inner.tell(sub.clone()).send().await;
        }

        info!("client restart done");
    }
}

impl<T: WsTransport> KameoMessage<GetClientStats> for ResilientClient<T> {
    type Reply = RtmResult<ClientStats>;

    async fn handle(
        &mut self,
        _msg: GetClientStats,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let Some(inner) = self.inner.clone() else {
            return Err(RtmError::NotConnected);
        };
        match inner.ask(GetClientStats).await {
            Ok(stats) => Ok(stats),
            Err(SendError::HandlerError(err)) => Err(err),
            Err(_) => Err(RtmError::Unknown),
        }
    }
}

impl<T: WsTransport> ResilientClient<T> {
    fn spawn_inner(&self) -> ActorRef<RtmClient<T>> {
        let sink: ErrorHook = Arc::new(RestartOnError {
            target: self.actor_ref.clone(),
        });
        (self.factory)(sink)
    }

    async fn start_inner(inner: &ActorRef<RtmClient<T>>) -> RtmResult<()> {
        match inner.ask(Start).await {
            Ok(()) => Ok(()),
            Err(SendError::HandlerError(err)) => Err(err),
            Err(_) => {
                warn!("inner client unreachable during start");
                Err(RtmError::Unknown)
            }
        }
    }
}
