use serde::Serialize;

use crate::state::record::{ACTIVE_FIELD, Fields};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnKind {
    RowNumber,
    Field,
    Active,
}

/// One column of the tabular view, derived once per connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub field: String,
    pub header_name: String,
    pub kind: ColumnKind,
}

/// `last_price` -> `Last price`, `bid` -> `Bid`.
pub fn header_name(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => {
            let rest: String = chars.as_str().replace('_', " ");
            first.to_uppercase().chain(rest.chars()).collect()
        }
        None => String::new(),
    }
}

/// Row number, then the sample's keys in wire order, then the active flag.
///
/// `sample` is the raw first payload of the first update batch, `Id` included.
pub fn derive_columns(sample: &Fields) -> Vec<ColumnDef> {
    let mut columns = Vec::with_capacity(sample.len() + 2);
    columns.push(ColumnDef {
        field: "#".to_string(),
        header_name: "#".to_string(),
        kind: ColumnKind::RowNumber,
    });

    for key in sample.keys().filter(|k| k.as_str() != ACTIVE_FIELD) {
        columns.push(ColumnDef {
            field: key.clone(),
            header_name: header_name(key),
            kind: ColumnKind::Field,
        });
    }

    columns.push(ColumnDef {
        field: ACTIVE_FIELD.to_string(),
        header_name: "Is Active".to_string(),
        kind: ColumnKind::Active,
    });
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_name() {
        assert_eq!(header_name("last_price"), "Last price");
        assert_eq!(header_name("Id"), "Id");
        assert_eq!(header_name("volume_24_h"), "Volume 24 h");
        assert_eq!(header_name(""), "");
    }

    #[test]
    fn test_derive_columns_keeps_wire_order() {
        let sample = json!({"Id": 1, "Name": "X", "best_bid": 1.0})
            .as_object()
            .cloned()
            .unwrap();

        let columns = derive_columns(&sample);
        let fields: Vec<&str> = columns
            .iter()
            .map(|c| c.field.as_str())
            .collect();

        assert_eq!(fields, vec!["#", "Id", "Name", "best_bid", "isActive"]);
    }
}
