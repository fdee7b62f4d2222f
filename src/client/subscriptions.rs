//! Subscription registry: one backing record set, double-indexed by channel
//! name and by handle identity. Both indexes must agree at all times.

use std::collections::HashMap;

use super::{SubscriptionHandle, SubscriptionHook};

pub(crate) struct SubscriptionRecord {
    pub(crate) channel: String,
    pub(crate) handle: SubscriptionHandle,
    pub(crate) data_sink: SubscriptionHook,
}

#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    by_channel: HashMap<String, SubscriptionRecord>,
    by_handle: HashMap<u64, String>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert a record. Returns false when the channel or the handle is
    /// already present; the caller treats that as a broken invariant.
    pub(crate) fn add(
        &mut self,
        channel: &str,
        handle: SubscriptionHandle,
        data_sink: SubscriptionHook,
    ) -> bool {
        if self.by_channel.contains_key(channel) || self.by_handle.contains_key(&handle.id()) {
            return false;
        }
        self.by_handle.insert(handle.id(), channel.to_string());
        self.by_channel.insert(
            channel.to_string(),
            SubscriptionRecord {
                channel: channel.to_string(),
                handle,
                data_sink,
            },
        );
        true
    }

    pub(crate) fn find_by_channel(&self, channel: &str) -> Option<&SubscriptionRecord> {
        self.by_channel.get(channel)
    }

    /// Channel the handle is subscribed to, if any.
    pub(crate) fn channel_of(&self, handle: &SubscriptionHandle) -> Option<&str> {
        self.by_handle.get(&handle.id()).map(String::as_str)
    }

    /// Remove a record through its channel index, keeping both indexes in
    /// step.
    pub(crate) fn delete_by_channel(&mut self, channel: &str) -> Option<SubscriptionRecord> {
        let record = self.by_channel.remove(channel)?;
        self.by_handle.remove(&record.handle.id());
        Some(record)
    }

    pub(crate) fn clear(&mut self) {
        self.by_channel.clear();
        self.by_handle.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.by_channel.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_channel.is_empty()
    }
}
