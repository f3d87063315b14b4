use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::entities::row::ComplianceRow;
use crate::domain::entities::table::TableKind;

/// One field change of one saved row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub table: String,
    pub row: usize,
    pub at: DateTime<Utc>,
    pub user: String,
    pub field: String,
    #[serde(default, deserialize_with = "scalar_text")]
    pub prev: String,
    #[serde(default, deserialize_with = "scalar_text")]
    pub curr: String,
}

/// Server history stores raw cell values; numbers and nulls arrive untyped.
fn scalar_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        other => other.to_string(),
    })
}

/// Field-level differences between the last saved version of a row and the
/// version about to replace it. A missing previous version diffs against an
/// empty row, so every filled field of a new row is reported.
pub fn diff_rows(
    kind: TableKind,
    row_index: usize,
    previous: Option<&ComplianceRow>,
    current: &ComplianceRow,
    user: &str,
    at: DateTime<Utc>,
) -> Vec<ChangeRecord> {
    let empty = ComplianceRow::empty(kind);
    let previous = previous.unwrap_or(&empty);
    kind.columns()
        .into_iter()
        .filter_map(|field| {
            let prev = previous.get(field).unwrap_or_default();
            let curr = current.get(field).unwrap_or_default();
            (prev != curr).then(|| ChangeRecord {
                table: kind.slug().to_string(),
                row: row_index,
                at,
                user: user.to_string(),
                field: field.key().to_string(),
                prev,
                curr,
            })
        })
        .collect()
}
