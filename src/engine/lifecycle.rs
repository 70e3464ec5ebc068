//! Connection state machine over the [`Transport`] capability.
//!
//! ```text
//! DISCONNECTED ──connect──▶ CONNECTING ──open──▶ CONNECTED
//!      ▲                        │                   │
//!      │                      error               close/error
//!      └────── close ◀── ERRORED ◀──────────────────┤
//!      └────── close ◀── CLOSING ◀── shutdown ──────┘
//!
//! any (but RESETTING) ──reset──▶ RESETTING ──settle delay──▶ CONNECTING
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::FeedError;
use crate::market_data::router;
use crate::market_data::transport::Transport;
use crate::market_data::types::{ConnectionId, InboundMessage, TransportEvent, TransportNotice};
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Errored,
    Resetting,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
            ConnectionState::Errored => "errored",
            ConnectionState::Resetting => "resetting",
        }
    }

    fn has_live_socket(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Closing
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a transport notice meant for the rest of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleOutcome {
    /// Stale connection, or nothing to do in the current state.
    Ignored,
    Opened,
    Inbound(InboundMessage),
    /// Message body could not be classified; state unchanged.
    Malformed(FeedError),
    /// The connection is gone; subscriptions cannot outlive it.
    Lost,
}

#[derive(Debug)]
pub struct ConnectionLifecycle {
    url: String,
    settle: Duration,
    state: ConnectionState,
    conn: ConnectionId,
    catalog_received: bool,
    reset_deadline: Option<Instant>,
}

impl ConnectionLifecycle {
    pub fn new(url: impl Into<String>, settle: Duration) -> Self {
        Self {
            url: url.into(),
            settle,
            state: ConnectionState::Disconnected,
            conn: 0,
            catalog_received: false,
            reset_deadline: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.conn
    }

    pub fn catalog_received(&self) -> bool {
        self.catalog_received
    }

    pub fn reset_deadline(&self) -> Option<Instant> {
        self.reset_deadline
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            debug!(conn = self.conn, from = %self.state, to = %next, "connection transition");
            metrics::record_connection_transition(next.as_str());
            self.state = next;
        }
    }

    /// Opens a fresh connection. Refused while one is live or a reset is pending.
    pub fn connect(&mut self, transport: &mut dyn Transport) -> bool {
        if !matches!(self.state, ConnectionState::Disconnected | ConnectionState::Errored) {
            debug!(state = %self.state, "connect ignored, already connecting or resetting");
            return false;
        }

        self.conn += 1;
        self.catalog_received = false;
        info!(conn = self.conn, url = %self.url, "opening feed connection");

        match transport.connect(&self.url, self.conn) {
            Ok(()) => {
                self.transition(ConnectionState::Connecting);
                true
            }
            Err(err) => {
                warn!(conn = self.conn, error = %err, "transport refused to connect");
                self.transition(ConnectionState::Disconnected);
                false
            }
        }
    }

    pub fn on_transport(&mut self, notice: TransportNotice) -> LifecycleOutcome {
        if notice.conn != self.conn {
            debug!(conn = notice.conn, current = self.conn, "ignoring event from superseded connection");
            return LifecycleOutcome::Ignored;
        }

        match (self.state, notice.event) {
            (ConnectionState::Connecting, TransportEvent::Open) => {
                info!(conn = self.conn, "feed connection open");
                self.transition(ConnectionState::Connected);
                LifecycleOutcome::Opened
            }
            (ConnectionState::Connected, TransportEvent::Message(text)) => {
                match router::classify(&text, self.catalog_received) {
                    Ok(message) => {
                        if matches!(message, InboundMessage::Catalog(_)) {
                            self.catalog_received = true;
                        }
                        LifecycleOutcome::Inbound(message)
                    }
                    Err(err) => LifecycleOutcome::Malformed(err),
                }
            }
            (
                ConnectionState::Connecting | ConnectionState::Connected,
                TransportEvent::Error(reason),
            ) => {
                warn!(conn = self.conn, %reason, "feed transport error");
                self.transition(ConnectionState::Errored);
                LifecycleOutcome::Lost
            }
            (
                ConnectionState::Connecting
                | ConnectionState::Connected
                | ConnectionState::Closing
                | ConnectionState::Errored,
                TransportEvent::Close(reason),
            ) => {
                info!(conn = self.conn, %reason, "feed connection closed");
                self.transition(ConnectionState::Disconnected);
                LifecycleOutcome::Lost
            }
            (state, event) => {
                debug!(conn = self.conn, %state, ?event, "transport event ignored in current state");
                LifecycleOutcome::Ignored
            }
        }
    }

    /// Starts a reset: closes a live socket and arms the settling delay.
    /// Returns false if a reset is already pending.
    pub fn begin_reset(&mut self, now: Instant, transport: &mut dyn Transport) -> bool {
        if self.state == ConnectionState::Resetting {
            debug!("reset ignored, already resetting");
            return false;
        }

        info!(conn = self.conn, settle_ms = self.settle.as_millis() as u64, "resetting feed connection");
        if self.state.has_live_socket() {
            transport.close();
        }
        self.catalog_received = false;
        self.reset_deadline = Some(now + self.settle);
        self.transition(ConnectionState::Resetting);
        true
    }

    /// Finishes a due reset by reconnecting. Returns true exactly once per reset,
    /// so a late or repeated timer fire never applies it twice.
    pub fn complete_reset(&mut self, now: Instant, transport: &mut dyn Transport) -> bool {
        match self.reset_deadline {
            Some(deadline) if self.state == ConnectionState::Resetting && now >= deadline => {
                self.reset_deadline = None;
                self.transition(ConnectionState::Disconnected);
                self.connect(transport);
                true
            }
            _ => false,
        }
    }

    /// Abandons a pending reset, leaving the engine disconnected. Idempotent.
    pub fn cancel_reset(&mut self) -> bool {
        if self.state != ConnectionState::Resetting {
            return false;
        }
        info!("pending reset cancelled");
        self.reset_deadline = None;
        self.transition(ConnectionState::Disconnected);
        true
    }

    /// Closes for good. A pending reset is abandoned.
    pub fn shutdown(&mut self, transport: &mut dyn Transport) {
        self.reset_deadline = None;
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                transport.close();
                self.transition(ConnectionState::Closing);
            }
            ConnectionState::Resetting => self.transition(ConnectionState::Disconnected),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingTransport {
        connects: Vec<ConnectionId>,
        closes: usize,
        refuse: bool,
    }

    impl Transport for RecordingTransport {
        fn connect(&mut self, _url: &str, conn: ConnectionId) -> Result<(), FeedError> {
            if self.refuse {
                return Err(FeedError::Transport("refused".to_string()));
            }
            self.connects.push(conn);
            Ok(())
        }

        fn send(&mut self, _text: String) -> Result<(), FeedError> {
            Ok(())
        }

        fn close(&mut self) {
            self.closes += 1;
        }
    }

    fn notice(conn: ConnectionId, event: TransportEvent) -> TransportNotice {
        TransportNotice::new(conn, event)
    }

    fn connected() -> (ConnectionLifecycle, RecordingTransport) {
        let mut lifecycle = ConnectionLifecycle::new("ws://test", Duration::from_millis(1_000));
        let mut transport = RecordingTransport::default();
        assert!(lifecycle.connect(&mut transport));
        assert_eq!(lifecycle.on_transport(notice(1, TransportEvent::Open)), LifecycleOutcome::Opened);
        (lifecycle, transport)
    }

    #[test]
    fn test_connect_then_open() {
        let (lifecycle, transport) = connected();
        assert_eq!(lifecycle.state(), ConnectionState::Connected);
        assert_eq!(transport.connects, vec![1]);
    }

    #[test]
    fn test_connect_guarded_while_live() {
        let (mut lifecycle, mut transport) = connected();
        assert!(!lifecycle.connect(&mut transport));
        assert_eq!(transport.connects.len(), 1);
    }

    #[test]
    fn test_refused_connect_stays_disconnected() {
        let mut lifecycle = ConnectionLifecycle::new("ws://test", Duration::ZERO);
        let mut transport = RecordingTransport {
            refuse: true,
            ..Default::default()
        };
        assert!(!lifecycle.connect(&mut transport));
        assert_eq!(lifecycle.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_first_array_catalog_then_updates() {
        let (mut lifecycle, _) = connected();

        let first = lifecycle.on_transport(notice(1, TransportEvent::Message(r#"[{"Id":1,"Name":"A"}]"#.into())));
        assert!(matches!(first, LifecycleOutcome::Inbound(InboundMessage::Catalog(_))));
        assert!(lifecycle.catalog_received());

        let second = lifecycle.on_transport(notice(1, TransportEvent::Message(r#"[{"Id":1,"Name":"A"}]"#.into())));
        assert!(matches!(second, LifecycleOutcome::Inbound(InboundMessage::Updates { .. })));
    }

    #[test]
    fn test_malformed_message_keeps_connection() {
        let (mut lifecycle, _) = connected();
        let outcome = lifecycle.on_transport(notice(1, TransportEvent::Message("{oops".into())));

        assert!(matches!(outcome, LifecycleOutcome::Malformed(FeedError::Parse(_))));
        assert_eq!(lifecycle.state(), ConnectionState::Connected);
        assert!(!lifecycle.catalog_received());
    }

    #[test]
    fn test_error_then_close() {
        let (mut lifecycle, _) = connected();

        assert_eq!(
            lifecycle.on_transport(notice(1, TransportEvent::Error("reset by peer".into()))),
            LifecycleOutcome::Lost
        );
        assert_eq!(lifecycle.state(), ConnectionState::Errored);
        assert!(!lifecycle.is_connected());

        assert_eq!(
            lifecycle.on_transport(notice(1, TransportEvent::Close("gone".into()))),
            LifecycleOutcome::Lost
        );
        assert_eq!(lifecycle.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_stale_connection_events_ignored() {
        let (mut lifecycle, _) = connected();
        assert_eq!(
            lifecycle.on_transport(notice(0, TransportEvent::Close("old".into()))),
            LifecycleOutcome::Ignored
        );
        assert!(lifecycle.is_connected());
    }

    #[test]
    fn test_reset_closes_waits_and_reconnects() {
        let (mut lifecycle, mut transport) = connected();
        let now = Instant::now();

        assert!(lifecycle.begin_reset(now, &mut transport));
        assert_eq!(transport.closes, 1);
        assert_eq!(lifecycle.state(), ConnectionState::Resetting);

        // Second request while pending is treated as already resetting.
        assert!(!lifecycle.begin_reset(now, &mut transport));
        assert_eq!(transport.closes, 1);

        // Close from the old socket does not leave RESETTING.
        assert_eq!(
            lifecycle.on_transport(notice(1, TransportEvent::Close("client".into()))),
            LifecycleOutcome::Ignored
        );

        assert!(!lifecycle.complete_reset(now + Duration::from_millis(999), &mut transport));
        assert!(lifecycle.complete_reset(now + Duration::from_millis(1_000), &mut transport));
        assert_eq!(lifecycle.state(), ConnectionState::Connecting);
        assert_eq!(transport.connects, vec![1, 2]);

        // A late duplicate timer fire is a no-op.
        assert!(!lifecycle.complete_reset(now + Duration::from_secs(5), &mut transport));
        assert_eq!(transport.connects.len(), 2);
    }

    #[test]
    fn test_reset_from_disconnected_skips_close() {
        let (mut lifecycle, mut transport) = connected();
        lifecycle.on_transport(notice(1, TransportEvent::Close("server".into())));

        assert!(lifecycle.begin_reset(Instant::now(), &mut transport));
        assert_eq!(transport.closes, 0);
    }

    #[test]
    fn test_cancel_reset() {
        let (mut lifecycle, mut transport) = connected();
        let now = Instant::now();
        lifecycle.begin_reset(now, &mut transport);

        assert!(lifecycle.cancel_reset());
        assert!(!lifecycle.cancel_reset());
        assert!(!lifecycle.complete_reset(now + Duration::from_secs(2), &mut transport));
        assert_eq!(lifecycle.state(), ConnectionState::Disconnected);
        assert_eq!(transport.connects, vec![1]);
    }

    #[test]
    fn test_shutdown_closes_socket() {
        let (mut lifecycle, mut transport) = connected();
        lifecycle.shutdown(&mut transport);

        assert_eq!(transport.closes, 1);
        assert_eq!(lifecycle.state(), ConnectionState::Closing);
        assert_eq!(
            lifecycle.on_transport(notice(1, TransportEvent::Close("client".into()))),
            LifecycleOutcome::Lost
        );
        assert_eq!(lifecycle.state(), ConnectionState::Disconnected);
    }
}
