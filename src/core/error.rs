use thiserror::Error;

/// Convenience result alias for client operations.
pub type RtmResult<T> = Result<T, RtmError>;

/// Error surface reported to per-request sinks, subscription sinks and the
/// connection-level error sink.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RtmError {
    #[error("unknown error")]
    Unknown,

    #[error("client is not connected")]
    NotConnected,

    #[error("error parsing response: {0}")]
    ResponseParsing(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("subscription error")]
    Subscription,

    #[error("subscribe error")]
    Subscribe,

    #[error("unsubscribe error")]
    Unsubscribe,

    #[error("publish error")]
    Publish,

    #[error("transport error ({context}): {error}")]
    Transport {
        context: &'static str,
        error: String,
    },
}

impl RtmError {
    pub(crate) fn transport(context: &'static str, error: impl ToString) -> Self {
        Self::Transport {
            context,
            error: error.to_string(),
        }
    }
}

/// Report a broken protocol or bookkeeping invariant.
///
/// These conditions (unknown pong nonce, unknown request id, unsupported
/// action, duplicate subscription) mean either a server speaking a different
/// protocol version or a bug in this crate. Debug builds abort so the
/// condition is caught immediately; release builds log at error level and the
/// call site skips the offending input.
#[macro_export]
macro_rules! protocol_violation {
    ($($arg:tt)*) => {{
        if cfg!(debug_assertions) {
            panic!($($arg)*);
        } else {
            ::tracing::error!($($arg)*);
        }
    }};
}
