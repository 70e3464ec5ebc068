use serde::Serialize;

use crate::error::FeedError;
use crate::state::record::{Fields, RecordId, UpdatePayload};

/// Identifies one transport connection attempt. Events from a superseded
/// connection are ignored.
pub type ConnectionId = u64;

/// Transport callbacks, flattened into one event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Close(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportNotice {
    pub conn: ConnectionId,
    pub event: TransportEvent,
}

impl TransportNotice {
    pub fn new(conn: ConnectionId, event: TransportEvent) -> Self {
        Self { conn, event }
    }
}

/// One subscribable ticker from the initial catalog message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub id: RecordId,
    pub name: String,
}

impl CatalogEntry {
    /// Multi-select option shape: label is the name, value is the id.
    pub fn label(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &RecordId {
        &self.id
    }
}

/// An inbound message after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Catalog(Vec<CatalogEntry>),
    Updates {
        payloads: Vec<UpdatePayload>,
        /// Raw first element (with `Id`), used to derive the column layout.
        sample: Option<Fields>,
    },
}

/// Outbound control message: `{"type": "subscribe", "product_ids": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Subscribe { product_ids: Vec<RecordId> },
    Unsubscribe { product_ids: Vec<RecordId> },
}

impl ControlMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Subscribe { .. } => "subscribe",
            ControlMessage::Unsubscribe { .. } => "unsubscribe",
        }
    }

    pub fn product_count(&self) -> usize {
        match self {
            ControlMessage::Subscribe { product_ids } | ControlMessage::Unsubscribe { product_ids } => {
                product_ids.len()
            }
        }
    }

    pub fn to_json(&self) -> Result<String, FeedError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_message_wire_format() {
        let subscribe = ControlMessage::Subscribe {
            product_ids: vec![RecordId::Int(1), RecordId::Text("ETH-USD".to_string())],
        };
        assert_eq!(
            subscribe.to_json().unwrap(),
            r#"{"type":"subscribe","product_ids":[1,"ETH-USD"]}"#
        );

        let unsubscribe = ControlMessage::Unsubscribe { product_ids: vec![] };
        assert_eq!(
            unsubscribe.to_json().unwrap(),
            r#"{"type":"unsubscribe","product_ids":[]}"#
        );
        assert_eq!(unsubscribe.kind(), "unsubscribe");
    }
}
