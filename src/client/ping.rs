//! Ping nonce table.
//!
//! Every application ping carries a fresh request id as its nonce (decimal
//! string payload); the pong echoes it back and the table yields the send
//! instant for round-trip measurement. Entries are bounded by the ping
//! cadence and cleared with the connection.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Default)]
pub(crate) struct PingTable {
    inflight: HashMap<u64, Instant>,
}

impl PingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, nonce: u64, sent_at: Instant) {
        self.inflight.insert(nonce, sent_at);
    }

    /// Match a pong against its ping, returning the round trip. `None`
    /// means the nonce was never issued on this connection.
    pub(crate) fn resolve(&mut self, nonce: u64, arrival: Instant) -> Option<Duration> {
        let sent_at = self.inflight.remove(&nonce)?;
        Some(arrival.saturating_duration_since(sent_at))
    }

    pub(crate) fn len(&self) -> usize {
        self.inflight.len()
    }

    pub(crate) fn clear(&mut self) {
        self.inflight.clear();
    }
}
