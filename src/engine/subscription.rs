use std::collections::HashSet;

use tracing::{debug, info};

use crate::error::FeedError;
use crate::market_data::transport::Transport;
use crate::market_data::types::ControlMessage;
use crate::metrics;
use crate::state::record::RecordId;

/// Tracks the user's ticker selection and the local subscription flag.
///
/// The flag is set by our own start/stop calls; nothing waits for the
/// server to acknowledge them.
#[derive(Debug, Default)]
pub struct SubscriptionController {
    selected: Vec<RecordId>,
    subscribed_count: usize,
    active: bool,
}

impl SubscriptionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> &[RecordId] {
        &self.selected
    }

    pub fn subscribed_count(&self) -> usize {
        self.subscribed_count
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn select(&mut self, mut ids: Vec<RecordId>) {
        let mut seen = HashSet::with_capacity(ids.len());
        ids.retain(|id| seen.insert(id.clone()));
        debug!(selected = ids.len(), "selection changed");
        self.selected = ids;
    }

    /// Sends `subscribe` for the current selection. No-op (Ok(false)) when not
    /// connected or nothing is selected.
    pub fn start(&mut self, connected: bool, transport: &mut dyn Transport) -> Result<bool, FeedError> {
        if !connected || self.selected.is_empty() {
            debug!(connected, selected = self.selected.len(), "subscribe skipped");
            return Ok(false);
        }

        let message = ControlMessage::Subscribe {
            product_ids: self.selected.clone(),
        };
        send_control(transport, &message)?;
        self.active = true;
        self.subscribed_count = message.product_count();
        Ok(true)
    }

    /// Sends `unsubscribe` for the current selection, even an empty one, as
    /// long as a connection exists.
    pub fn stop(&mut self, connected: bool, transport: &mut dyn Transport) -> Result<bool, FeedError> {
        if !connected {
            debug!("unsubscribe skipped, not connected");
            return Ok(false);
        }

        let message = ControlMessage::Unsubscribe {
            product_ids: self.selected.clone(),
        };
        send_control(transport, &message)?;
        self.active = false;
        self.subscribed_count = 0;
        Ok(true)
    }

    /// The connection went away; an active subscription cannot outlive it.
    pub fn force_off(&mut self) {
        self.active = false;
    }

    /// A fresh catalog invalidates the previous selection and subscription.
    pub fn reset(&mut self) {
        self.selected.clear();
        self.subscribed_count = 0;
        self.active = false;
    }
}

fn send_control(transport: &mut dyn Transport, message: &ControlMessage) -> Result<(), FeedError> {
    let text = message.to_json()?;
    transport.send(text)?;
    info!(
        kind = message.kind(),
        product_ids = message.product_count(),
        "sent control message"
    );
    metrics::record_control_message(message.kind());
    Ok(())
}
