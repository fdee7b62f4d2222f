//! Wire encoding of PDUs.
//!
//! The same document tree is carried either as JSON text or as binary CBOR;
//! the encoding is fixed per client at construction time and also selects
//! the websocket sub-protocol and the per-message binary bit.

use bytes::Bytes;
use sonic_rs::Value;

use super::error::{RtmError, RtmResult};
use super::frame::WsFrame;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WireEncoding {
    #[default]
    Json,
    Cbor,
}

impl WireEncoding {
    /// Sub-protocol requested during the websocket upgrade.
    pub fn subprotocol(self) -> Option<&'static str> {
        match self {
            WireEncoding::Json => None,
            WireEncoding::Cbor => Some("cbor"),
        }
    }

    pub fn is_binary(self) -> bool {
        matches!(self, WireEncoding::Cbor)
    }
}

/// Serialize a PDU into wire bytes.
pub fn encode(encoding: WireEncoding, pdu: &Value) -> RtmResult<Bytes> {
    match encoding {
        WireEncoding::Json => sonic_rs::to_vec(pdu)
            .map(Bytes::from)
            .map_err(|err| RtmError::InvalidMessage(err.to_string())),
        WireEncoding::Cbor => {
            let mut buf = Vec::new();
            ciborium::ser::into_writer(pdu, &mut buf)
                .map_err(|err| RtmError::InvalidMessage(err.to_string()))?;
            Ok(Bytes::from(buf))
        }
    }
}

/// Parse wire bytes back into a PDU.
pub fn decode(encoding: WireEncoding, bytes: &[u8]) -> RtmResult<Value> {
    match encoding {
        WireEncoding::Json => {
            sonic_rs::from_slice(bytes).map_err(|err| RtmError::ResponseParsing(err.to_string()))
        }
        WireEncoding::Cbor => ciborium::de::from_reader(bytes)
            .map_err(|err| RtmError::ResponseParsing(err.to_string())),
    }
}

/// Wrap encoded bytes in the frame kind matching the encoding.
pub fn into_frame(encoding: WireEncoding, bytes: Bytes) -> WsFrame {
    if encoding.is_binary() {
        WsFrame::Binary(bytes)
    } else {
        WsFrame::Text(bytes)
    }
}

#[cfg(test)]
mod tests {
    use sonic_rs::json;

    use super::*;
    use crate::core::pdu;

    fn sample_pdus() -> Vec<Value> {
        vec![
            pdu::publish(1, "t", json!(42)),
            pdu::publish(2, "t", json!({"nested": [1, 2.5, "x", null, true]})),
            pdu::subscribe(3, "c", None),
            pdu::subscribe(
                4,
                "c",
                Some(&pdu::SubscriptionOptions {
                    history: pdu::History {
                        age: Some(60),
                        count: Some(5),
                    },
                }),
            ),
            pdu::unsubscribe(5, "c"),
        ]
    }

    #[test]
    fn json_round_trip_is_identity() {
        for pdu in sample_pdus() {
            let bytes = encode(WireEncoding::Json, &pdu).expect("encode");
            let back = decode(WireEncoding::Json, &bytes).expect("decode");
            assert_eq!(back, pdu);
        }
    }

    #[test]
    fn cbor_round_trip_is_identity() {
        for pdu in sample_pdus() {
            let bytes = encode(WireEncoding::Cbor, &pdu).expect("encode");
            let back = decode(WireEncoding::Cbor, &bytes).expect("decode");
            assert_eq!(back, pdu);
        }
    }

    #[test]
    fn json_encoding_is_text_on_the_wire() {
        let pdu = pdu::publish(1, "t", json!("payload"));
        let bytes = encode(WireEncoding::Json, &pdu).expect("encode");
        assert!(matches!(
            into_frame(WireEncoding::Json, bytes),
            WsFrame::Text(_)
        ));
        assert!(WireEncoding::Json.subprotocol().is_none());
    }

    #[test]
    fn cbor_encoding_is_binary_on_the_wire() {
        let pdu = pdu::publish(1, "t", json!("payload"));
        let bytes = encode(WireEncoding::Cbor, &pdu).expect("encode");
        assert!(matches!(
            into_frame(WireEncoding::Cbor, bytes),
            WsFrame::Binary(_)
        ));
        assert_eq!(WireEncoding::Cbor.subprotocol(), Some("cbor"));
    }

    #[test]
    fn garbage_bytes_surface_parse_errors() {
        assert!(matches!(
            decode(WireEncoding::Json, b"{not json"),
            Err(RtmError::ResponseParsing(_))
        ));
        assert!(matches!(
            decode(WireEncoding::Cbor, &[0xff, 0x00, 0x01]),
            Err(RtmError::ResponseParsing(_))
        ));
    }
}
