//! Pending-request table: one record per outbound request id, removed when
//! the matching terminal PDU arrives or the write itself fails.

use std::collections::HashMap;
use std::time::Instant;

use sonic_rs::Value;

use super::RequestHook;
use crate::core::RtmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RequestKind {
    Publish,
    Subscribe,
    Unsubscribe,
}

impl RequestKind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            RequestKind::Publish => "publish",
            RequestKind::Subscribe => "subscribe",
            RequestKind::Unsubscribe => "unsubscribe",
        }
    }

    /// Error surfaced to the per-request sink when this kind fails.
    pub(crate) fn error(self) -> RtmError {
        match self {
            RequestKind::Publish => RtmError::Publish,
            RequestKind::Subscribe => RtmError::Subscribe,
            RequestKind::Unsubscribe => RtmError::Unsubscribe,
        }
    }
}

pub(crate) struct PendingRequest {
    pub(crate) kind: RequestKind,
    pub(crate) channel: String,
    /// Snapshot of the outbound PDU, kept for diagnostics.
    pub(crate) pdu: Value,
    pub(crate) issued_at: Instant,
    pub(crate) byte_size: usize,
    pub(crate) callbacks: Option<RequestHook>,
}

#[derive(Default)]
pub(crate) struct PendingRequests {
    entries: HashMap<u64, PendingRequest>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a request under its id. Ids are never reused, so a collision
    /// means a broken id allocator; the caller treats false as fatal.
    pub(crate) fn insert(&mut self, id: u64, request: PendingRequest) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, request);
        true
    }

    pub(crate) fn get(&self, id: u64) -> Option<&PendingRequest> {
        self.entries.get(&id)
    }

    pub(crate) fn remove(&mut self, id: u64) -> Option<PendingRequest> {
        self.entries.remove(&id)
    }

    /// Drain every record, e.g. when the connection is torn down.
    pub(crate) fn take_all(&mut self) -> Vec<(u64, PendingRequest)> {
        self.entries.drain().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use sonic_rs::json;

    use super::*;

    fn request(kind: RequestKind) -> PendingRequest {
        PendingRequest {
            kind,
            channel: "c".to_string(),
            pdu: json!({"action": "rtm/publish", "id": 1}),
            issued_at: Instant::now(),
            byte_size: 32,
            callbacks: None,
        }
    }

    #[test]
    fn ids_are_unique() {
        let mut pending = PendingRequests::new();
        assert!(pending.insert(1, request(RequestKind::Publish)));
        assert!(!pending.insert(1, request(RequestKind::Subscribe)));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn remove_consumes_the_record() {
        let mut pending = PendingRequests::new();
        pending.insert(1, request(RequestKind::Unsubscribe));

        let info = pending.remove(1).expect("record");
        assert_eq!(info.kind, RequestKind::Unsubscribe);
        assert!(pending.remove(1).is_none());
        assert!(pending.is_empty());
    }

    #[test]
    fn kind_maps_to_its_error() {
        assert_eq!(RequestKind::Publish.error(), RtmError::Publish);
        assert_eq!(RequestKind::Subscribe.error(), RtmError::Subscribe);
        assert_eq!(RequestKind::Unsubscribe.error(), RtmError::Unsubscribe);
    }
}
