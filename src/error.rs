//! Error taxonomy for the feed engine.
//!
//! None of these are fatal: the engine logs them and settles into a
//! well-defined state (disconnected, or batch skipped).

/// Errors produced while talking to the feed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// Inbound text was not valid JSON.
    #[error("malformed message: {0}")]
    Parse(String),

    /// Inbound JSON was valid but not the expected array of records.
    #[error("unexpected message shape: expected array, got {0}")]
    UnexpectedShape(&'static str),

    /// Socket-level failure reported by the transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// A control message was attempted with no open connection.
    #[error("not connected")]
    NotConnected,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Parse(err.to_string())
    }
}
