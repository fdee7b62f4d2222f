//! Inbound PDU dispatch.
//!
//! Every inbound frame is decoded and classified by its `action`, then
//! routed to the subscription registry or the pending-request table. The
//! arrival instant is stamped once in the reader task and threaded through
//! to every per-message callback.

use std::time::Instant;

use sonic_rs::Value;
use tracing::{debug, info, warn};

use super::requests::{PendingRequest, RequestKind};
use super::secure::RtmClient;
use super::ChannelData;
use crate::core::pdu::{self, actions};
use crate::core::{RtmError, WsFrame, codec};
use crate::protocol_violation;
use crate::transport::WsTransport;

impl<T: WsTransport> RtmClient<T> {
    pub(crate) fn handle_frame(&mut self, frame: WsFrame, arrival: Instant) {
        match frame {
            WsFrame::Pong(payload) => {
                self.metrics.frame_received("pong");
                self.on_pong(payload.as_ref(), arrival);
            }
            // The transport layer answers server pings itself.
            WsFrame::Ping(payload) => {
                self.metrics.frame_received("ping");
                debug!(len = payload.len(), "received ping frame");
            }
            WsFrame::Close(frame) => {
                self.metrics.frame_received("close");
                info!(close = ?frame, "received close frame");
            }
            WsFrame::Text(bytes) | WsFrame::Binary(bytes) => {
                self.metrics.bytes_read(bytes.len() as u64);
                match codec::decode(self.config.encoding, bytes.as_ref()) {
                    Ok(pdu) => self.dispatch_pdu(&pdu, bytes.len(), arrival),
                    Err(err) => {
                        // A single bad frame never tears down the connection.
                        warn!(error = %err, "inbound frame could not be decoded");
                        self.metrics.decode_error();
                    }
                }
            }
        }
    }

    fn on_pong(&mut self, payload: &[u8], arrival: Instant) {
        let nonce = std::str::from_utf8(payload)
            .ok()
            .and_then(|s| s.parse::<u64>().ok());
        let Some(nonce) = nonce else {
            protocol_violation!("invalid pong payload: {payload:?}");
            return;
        };

        let Some(rtt) = self.pings.resolve(nonce, arrival) else {
            protocol_violation!("unexpected pong nonce: {nonce}");
            return;
        };

        debug!(nonce, rtt_us = rtt.as_micros() as u64, "pong matched");
        self.timings.record_ping_rtt(rtt);
        self.metrics.observe_ping_rtt(rtt);
    }

    pub(crate) fn dispatch_pdu(&mut self, pdu: &Value, byte_size: usize, arrival: Instant) {
        let Some(action) = pdu::action(pdu) else {
            protocol_violation!("no action in pdu: {pdu:?}");
            return;
        };
        self.metrics.action_received(action);

        match action {
            actions::SUBSCRIPTION_DATA => self.on_subscription_data(pdu, byte_size, arrival),
            actions::SUBSCRIPTION_ERROR => self.on_subscription_error(pdu),
            actions::PUBLISH_OK => {
                if let Some(info) = self.take_confirmed(pdu, arrival) {
                    if let Some(callbacks) = info.callbacks.as_ref() {
                        callbacks.on_ok();
                    }
                }
            }
            actions::PUBLISH_ERROR => {
                warn!(pdu = ?pdu, "got publish error");
                self.metrics.request_error("publish");
                if let Some(info) = self.take_confirmed(pdu, arrival) {
                    if let Some(callbacks) = info.callbacks.as_ref() {
                        callbacks.on_error(RtmError::Publish);
                    }
                }
            }
            actions::SUBSCRIBE_OK => {
                // The optimistically inserted subscription record stays.
                if let Some(info) = self.take_confirmed(pdu, arrival) {
                    if let Some(callbacks) = info.callbacks.as_ref() {
                        callbacks.on_ok();
                    }
                }
            }
            actions::SUBSCRIBE_ERROR => {
                warn!(pdu = ?pdu, "got subscribe error");
                self.metrics.request_error("subscribe");
                if let Some(info) = self.take_confirmed(pdu, arrival) {
                    if let Some(callbacks) = info.callbacks.as_ref() {
                        callbacks.on_error(RtmError::Subscribe);
                    }
                    self.drop_subscription(&info, pdu);
                }
            }
            actions::UNSUBSCRIBE_OK => {
                if let Some(info) = self.take_confirmed(pdu, arrival) {
                    if let Some(callbacks) = info.callbacks.as_ref() {
                        callbacks.on_ok();
                    }
                    self.drop_subscription(&info, pdu);
                }
            }
            actions::UNSUBSCRIBE_ERROR => {
                warn!(pdu = ?pdu, "got unsubscribe error");
                self.metrics.request_error("unsubscribe");
                if let Some(info) = self.take_confirmed(pdu, arrival) {
                    if let Some(callbacks) = info.callbacks.as_ref() {
                        callbacks.on_error(RtmError::Unsubscribe);
                    }
                    self.drop_subscription(&info, pdu);
                }
            }
            actions::GENERIC_ERROR => {
                protocol_violation!("got unexpected error: {pdu:?}");
            }
            other => {
                protocol_violation!("unsupported action {other}: {pdu:?}");
            }
        }
    }

    fn on_subscription_data(&mut self, pdu: &Value, byte_size: usize, arrival: Instant) {
        let Some(record) = Self::subscription_record(&self.subscriptions, pdu) else {
            return;
        };
        let Some(messages) = pdu::messages(pdu) else {
            protocol_violation!("no messages in body: {pdu:?}");
            return;
        };

        self.metrics
            .messages_received(&record.channel, messages.len() as u64, byte_size as u64);

        for element in messages.iter() {
            record.data_sink.on_data(
                &record.handle,
                ChannelData {
                    payload: element.clone(),
                    arrival_time: arrival,
                },
            );
        }
    }

    fn on_subscription_error(&mut self, pdu: &Value) {
        warn!(pdu = ?pdu, "subscription error");
        let Some(record) = Self::subscription_record(&self.subscriptions, pdu) else {
            return;
        };
        self.metrics.subscription_error(&record.channel);
        // The record stays: the server either follows up with an
        // unsubscribe terminal or the connection is torn down.
        record.data_sink.on_error(RtmError::Subscription);
    }

    fn subscription_record<'a>(
        subscriptions: &'a super::subscriptions::SubscriptionRegistry,
        pdu: &Value,
    ) -> Option<&'a super::subscriptions::SubscriptionRecord> {
        let Some(channel) = pdu::subscription_id(pdu) else {
            protocol_violation!("no subscription_id in body: {pdu:?}");
            return None;
        };
        let record = subscriptions.find_by_channel(channel);
        if record.is_none() {
            protocol_violation!("no subscription for pdu: {pdu:?}");
        }
        record
    }

    /// Resolve a `*/ok` / `*/error` terminal against the pending table.
    fn take_confirmed(&mut self, pdu: &Value, arrival: Instant) -> Option<PendingRequest> {
        let Some(request_id) = pdu::request_id(pdu) else {
            protocol_violation!("no id in pdu: {pdu:?}");
            return None;
        };
        let Some(info) = self.requests.remove(request_id) else {
            protocol_violation!("unexpected confirmation: {pdu:?}");
            return None;
        };

        if info.kind == RequestKind::Publish {
            let latency = arrival.saturating_duration_since(info.issued_at);
            self.timings.record_publish_ack(latency);
            self.metrics.observe_publish_ack(latency);
        }

        Some(info)
    }

    /// Subscription records are inserted at request time, so the terminal
    /// must find one to delete.
    fn drop_subscription(&mut self, info: &PendingRequest, pdu: &Value) {
        if self.subscriptions.delete_by_channel(&info.channel).is_none() {
            protocol_violation!("failed to delete subscription: {pdu:?}");
        }
    }
}
