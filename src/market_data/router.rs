//! Classifies inbound feed text.
//!
//! The wire carries no message-type tag: the first array received on a
//! connection is the catalog, every later array is an update batch.

use serde_json::Value;
use tracing::debug;

use crate::error::FeedError;
use crate::market_data::types::{CatalogEntry, InboundMessage};
use crate::state::record::{ID_FIELD, NAME_FIELD, RecordId, UpdatePayload};

fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn classify(text: &str, catalog_received: bool) -> Result<InboundMessage, FeedError> {
    let value: Value = serde_json::from_str(text)?;
    let items = match value {
        Value::Array(items) => items,
        other => return Err(FeedError::UnexpectedShape(shape_of(&other))),
    };

    if !catalog_received {
        return Ok(InboundMessage::Catalog(parse_catalog(items)));
    }

    let sample = items.first().and_then(Value::as_object).cloned();
    let payloads = items.into_iter().map(UpdatePayload::from_value).collect();
    Ok(InboundMessage::Updates { payloads, sample })
}

fn parse_catalog(items: Vec<Value>) -> Vec<CatalogEntry> {
    let total = items.len();
    let entries: Vec<CatalogEntry> = items
        .into_iter()
        .filter_map(|item| {
            let id = item.get(ID_FIELD).and_then(RecordId::from_value)?;
            let name = match item.get(NAME_FIELD) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            Some(CatalogEntry { id, name })
        })
        .collect();

    if entries.len() != total {
        debug!(skipped = total - entries.len(), "catalog entries without usable Id");
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_array_is_catalog() {
        let msg = classify(
            r#"[{"Id":1,"Name":"BTC","Price":1},{"Id":"ETH","Name":"Ether"},{"Name":"orphan"}]"#,
            false,
        )
        .unwrap();

        let InboundMessage::Catalog(entries) = msg else {
            panic!("expected catalog");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].label(), "BTC");
        assert_eq!(entries[1].value(), &RecordId::Text("ETH".to_string()));
    }

    #[test]
    fn test_later_arrays_are_updates() {
        let msg = classify(r#"[{"Id":1,"Price":2},{"Price":3}]"#, true).unwrap();

        let InboundMessage::Updates { payloads, sample } = msg else {
            panic!("expected update batch");
        };
        assert_eq!(payloads.len(), 2);
        assert!(payloads[1].id.is_none());
        let sample = sample.unwrap();
        assert_eq!(sample.keys().collect::<Vec<_>>(), vec!["Id", "Price"]);
    }

    #[test]
    fn test_empty_update_batch_has_no_sample() {
        let msg = classify("[]", true).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Updates {
                payloads: vec![],
                sample: None
            }
        );
    }

    #[test]
    fn test_malformed_text_is_parse_error() {
        assert!(matches!(classify("{not json", true), Err(FeedError::Parse(_))));
    }

    #[test]
    fn test_non_array_is_unexpected_shape() {
        assert_eq!(
            classify(r#"{"type":"heartbeat"}"#, false),
            Err(FeedError::UnexpectedShape("object"))
        );
    }
}
