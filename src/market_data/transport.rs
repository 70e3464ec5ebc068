use crate::error::FeedError;
use crate::market_data::types::ConnectionId;

/// Socket capability the engine drives.
///
/// Calls return immediately; the outcome of `connect` (open, messages,
/// close, error) comes back later as [`TransportNotice`]s tagged with the
/// `conn` passed here.
///
/// [`TransportNotice`]: crate::market_data::types::TransportNotice
pub trait Transport: Send {
    fn connect(&mut self, url: &str, conn: ConnectionId) -> Result<(), FeedError>;

    fn send(&mut self, text: String) -> Result<(), FeedError>;

    /// Safe to call with no open connection.
    fn close(&mut self);
}
