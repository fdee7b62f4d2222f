pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod pdu;

pub use codec::WireEncoding;
pub use config::RtmConfig;
pub use error::{RtmError, RtmResult};
pub use frame::{WsCloseFrame, WsFrame, frame_bytes};
pub use pdu::{History, SubscriptionOptions};
