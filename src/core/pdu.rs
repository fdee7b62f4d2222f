//! PDU construction and field access.
//!
//! A PDU is a document tree with a required top-level object carrying an
//! `action`, an optional request `id` and an optional `body`. The tree is
//! represented as [`sonic_rs::Value`]; [`crate::core::codec`] turns it into
//! wire bytes.

use sonic_rs::{JsonContainerTrait, JsonValueTrait, Value, json};

/// Wire action names.
pub mod actions {
    pub const PUBLISH: &str = "rtm/publish";
    pub const PUBLISH_OK: &str = "rtm/publish/ok";
    pub const PUBLISH_ERROR: &str = "rtm/publish/error";
    pub const SUBSCRIBE: &str = "rtm/subscribe";
    pub const SUBSCRIBE_OK: &str = "rtm/subscribe/ok";
    pub const SUBSCRIBE_ERROR: &str = "rtm/subscribe/error";
    pub const UNSUBSCRIBE: &str = "rtm/unsubscribe";
    pub const UNSUBSCRIBE_OK: &str = "rtm/unsubscribe/ok";
    pub const UNSUBSCRIBE_ERROR: &str = "rtm/unsubscribe/error";
    pub const SUBSCRIPTION_DATA: &str = "rtm/subscription/data";
    pub const SUBSCRIPTION_ERROR: &str = "rtm/subscription/error";
    pub const GENERIC_ERROR: &str = "/error";
}

/// Replay window requested at subscribe time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct History {
    pub age: Option<u64>,
    pub count: Option<u64>,
}

/// Per-subscription options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionOptions {
    pub history: History,
}

/// `{"action":"rtm/publish","id":<id>,"body":{"channel":...,"message":...}}`
pub fn publish(id: u64, channel: &str, message: Value) -> Value {
    json!({
        "action": actions::PUBLISH,
        "id": id,
        "body": {"channel": channel, "message": message},
    })
}

/// `{"action":"rtm/subscribe","id":<id>,"body":{...}}`
///
/// The channel string doubles as the subscription identifier on the wire, so
/// `channel` and `subscription_id` are always equal. A history object is
/// attached only when at least one bound is present.
pub fn subscribe(id: u64, channel: &str, options: Option<&SubscriptionOptions>) -> Value {
    let history = options.map(|o| o.history).unwrap_or_default();
    let history = match (history.age, history.count) {
        (Some(age), Some(count)) => Some(json!({"age": age, "count": count})),
        (Some(age), None) => Some(json!({"age": age})),
        (None, Some(count)) => Some(json!({"count": count})),
        (None, None) => None,
    };

    let body = match history {
        Some(history) => json!({
            "channel": channel,
            "subscription_id": channel,
            "history": history,
        }),
        None => json!({"channel": channel, "subscription_id": channel}),
    };

    json!({"action": actions::SUBSCRIBE, "id": id, "body": body})
}

/// `{"action":"rtm/unsubscribe","id":<id>,"body":{"subscription_id":...}}`
pub fn unsubscribe(id: u64, channel: &str) -> Value {
    json!({
        "action": actions::UNSUBSCRIBE,
        "id": id,
        "body": {"subscription_id": channel},
    })
}

#[inline]
pub fn action(pdu: &Value) -> Option<&str> {
    pdu.get("action").and_then(|a| a.as_str())
}

#[inline]
pub fn request_id(pdu: &Value) -> Option<u64> {
    pdu.get("id").and_then(|id| id.as_u64())
}

#[inline]
pub fn body(pdu: &Value) -> Option<&Value> {
    pdu.get("body")
}

/// `body.subscription_id` of a subscription PDU.
#[inline]
pub fn subscription_id(pdu: &Value) -> Option<&str> {
    body(pdu)
        .and_then(|b| b.get("subscription_id"))
        .and_then(|s| s.as_str())
}

/// `body.messages` of a `rtm/subscription/data` PDU.
#[inline]
pub fn messages(pdu: &Value) -> Option<&sonic_rs::Array> {
    body(pdu)
        .and_then(|b| b.get("messages"))
        .and_then(|m| m.as_array())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_pdu_shape() {
        let pdu = publish(1, "t", json!(42));
        assert_eq!(
            pdu,
            json!({"action": "rtm/publish", "id": 1, "body": {"channel": "t", "message": 42}})
        );
        assert_eq!(action(&pdu), Some(actions::PUBLISH));
        assert_eq!(request_id(&pdu), Some(1));
    }

    #[test]
    fn subscribe_pdu_without_history() {
        let pdu = subscribe(2, "c", None);
        assert_eq!(
            pdu,
            json!({
                "action": "rtm/subscribe",
                "id": 2,
                "body": {"channel": "c", "subscription_id": "c"},
            })
        );
    }

    #[test]
    fn subscribe_pdu_with_full_history() {
        let options = SubscriptionOptions {
            history: History {
                age: Some(60),
                count: Some(5),
            },
        };
        let pdu = subscribe(1, "c", Some(&options));
        assert_eq!(
            body(&pdu).cloned(),
            Some(json!({
                "channel": "c",
                "subscription_id": "c",
                "history": {"age": 60, "count": 5},
            }))
        );
    }

    #[test]
    fn subscribe_pdu_with_partial_history() {
        let options = SubscriptionOptions {
            history: History {
                age: None,
                count: Some(3),
            },
        };
        let pdu = subscribe(7, "c", Some(&options));
        assert_eq!(
            body(&pdu).cloned(),
            Some(json!({
                "channel": "c",
                "subscription_id": "c",
                "history": {"count": 3},
            }))
        );
    }

    #[test]
    fn unsubscribe_pdu_shape() {
        let pdu = unsubscribe(3, "c");
        assert_eq!(
            pdu,
            json!({"action": "rtm/unsubscribe", "id": 3, "body": {"subscription_id": "c"}})
        );
    }

    #[test]
    fn accessors_on_inbound_data_pdu() {
        let pdu = json!({
            "action": "rtm/subscription/data",
            "body": {"subscription_id": "t", "messages": [1, "two", {"k": 3}]},
        });
        assert_eq!(action(&pdu), Some(actions::SUBSCRIPTION_DATA));
        assert_eq!(request_id(&pdu), None);
        assert_eq!(subscription_id(&pdu), Some("t"));
        assert_eq!(messages(&pdu).map(|m| m.len()), Some(3));
    }
}
