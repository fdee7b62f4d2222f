//! The connection-and-request core.
//!
//! [`secure::RtmClient`] is the wire client: one kameo actor owning the
//! transport, the write serializer, the request table, the subscription
//! registry and the ping scheduler. [`resilient::ResilientClient`] wraps it
//! and restores state across reconnects. The actor mailbox is the event
//! loop: public operations are messages, so invocation from any thread is a
//! safe hand-off and all table mutation happens inside handlers.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Instant;

use sonic_rs::Value;

use crate::core::{RtmError, SubscriptionOptions};

pub mod dispatcher;
pub mod ping;
pub mod requests;
pub mod resilient;
pub mod secure;
pub mod subscriptions;
pub mod timings;
pub mod writer;

pub use resilient::{ClientFactory, ResilientClient, ResilientClientArgs};
pub use secure::{RtmClient, RtmClientArgs};
pub use timings::LatencySnapshot;

/// Lifecycle states of a wire client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    Stopped = 0,
    Running = 1,
    PendingStopped = 2,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientState::Stopped => f.write_str("STOPPED"),
            ClientState::Running => f.write_str("RUNNING"),
            ClientState::PendingStopped => f.write_str("PENDING_STOPPED"),
        }
    }
}

/// Atomic cell holding the lifecycle state.
///
/// All transitions happen on the actor; the atomic only makes reads from
/// other threads race-free.
#[derive(Clone, Debug)]
pub(crate) struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ClientState::Stopped as u8)))
    }

    pub(crate) fn get(&self) -> ClientState {
        match self.0.load(Ordering::SeqCst) {
            0 => ClientState::Stopped,
            1 => ClientState::Running,
            _ => ClientState::PendingStopped,
        }
    }

    pub(crate) fn set(&self, state: ClientState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Opaque identity of one active subscription.
///
/// Each handle owns a unique id allocated at construction; equality is
/// identity, never structure, so a handle can be cloned freely and still
/// name the same subscription.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn new() -> Self {
        static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn id(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriptionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// One element of a `rtm/subscription/data` PDU, stamped with the instant
/// the carrying frame left the transport.
#[derive(Clone, Debug)]
pub struct ChannelData {
    pub payload: Value,
    pub arrival_time: Instant,
}

/// Completion sink for one request; borrowed for the lifetime of that
/// request and dropped with its pending record.
pub trait RequestCallbacks: Send + Sync {
    fn on_ok(&self) {}
    fn on_error(&self, _error: RtmError) {}
}

/// Data sink for one subscription; borrowed for the lifetime of the
/// subscription record.
pub trait SubscriptionCallbacks: Send + Sync {
    fn on_data(&self, handle: &SubscriptionHandle, data: ChannelData);
    fn on_error(&self, _error: RtmError) {}
}

/// Connection-level error sink supplied by the owner.
pub trait ErrorCallbacks: Send + Sync {
    fn on_error(&self, error: RtmError);
}

pub type RequestHook = Arc<dyn RequestCallbacks>;
pub type SubscriptionHook = Arc<dyn SubscriptionCallbacks>;
pub type ErrorHook = Arc<dyn ErrorCallbacks>;

/// Publish `message` on `channel`. Requires `RUNNING`.
#[derive(Clone)]
pub struct Publish {
    pub channel: String,
    pub message: Value,
    pub callbacks: Option<RequestHook>,
}

/// Subscribe `handle` to `channel`, optionally replaying history.
/// The subscription record is inserted before the server confirms.
#[derive(Clone)]
pub struct Subscribe {
    pub channel: String,
    pub handle: SubscriptionHandle,
    pub data_sink: SubscriptionHook,
    pub callbacks: Option<RequestHook>,
    pub options: Option<SubscriptionOptions>,
}

/// Tear down the subscription named by `handle`. Unknown handles are a
/// programming error.
#[derive(Clone)]
pub struct Unsubscribe {
    pub handle: SubscriptionHandle,
    pub callbacks: Option<RequestHook>,
}

/// Start the client: connect, upgrade, arm the ping timer, begin reading.
pub struct Start;

/// Stop the client: cancel the ping timer and close the transport; tables
/// are cleared once the read loop observes cancellation.
pub struct Stop;

/// Snapshot request for tests and operational introspection.
pub struct GetClientStats;

#[derive(Clone, Debug)]
pub struct ClientStats {
    pub state: ClientState,
    pub pending_requests: usize,
    pub subscriptions: usize,
    pub pings_outstanding: usize,
    pub ping_rtt: LatencySnapshot,
    pub publish_ack: LatencySnapshot,
}
