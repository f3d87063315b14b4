use dioxus::prelude::{use_signal, Signal};

use crate::config::AppConfig;
use crate::domain::entities::history::ChangeRecord;
use crate::domain::entities::row::Field;
use crate::usecase::services::table_service::ComplianceTable;

pub struct AppState {
    pub config: Signal<Option<AppConfig>>,
    pub table: Signal<Option<ComplianceTable>>,
    pub busy: Signal<bool>,
    pub status: Signal<String>,
    pub show_history: Signal<bool>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            config: use_signal(|| None::<AppConfig>),
            table: use_signal(|| None::<ComplianceTable>),
            busy: use_signal(|| false),
            status: use_signal(|| "Ready".to_string()),
            show_history: use_signal(|| false),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellView {
    pub field: Field,
    pub value: String,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowView {
    /// Stable identity used as the render key.
    pub id: u64,
    /// 1-based position shown in the gutter.
    pub number: usize,
    pub cells: Vec<CellView>,
    pub has_attachments: bool,
    /// A save of this row is in flight.
    pub saving: bool,
}

/// Render snapshot of a table, taken once per frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableView {
    pub title: String,
    pub columns: Vec<Field>,
    pub rows: Vec<RowView>,
    pub history: Vec<ChangeRecord>,
}

impl TableView {
    pub fn from_table(table: &ComplianceTable) -> Self {
        let columns = table.kind().columns();
        let rows = table
            .rows()
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let dirty = table.dirty_fields(idx).unwrap_or_default();
                RowView {
                    id: table.row_id(idx).unwrap_or_default(),
                    number: idx + 1,
                    cells: columns
                        .iter()
                        .map(|field| CellView {
                            field: *field,
                            value: row.get(*field).unwrap_or_default(),
                            dirty: dirty.contains(field),
                        })
                        .collect(),
                    has_attachments: row.has_attachments(),
                    saving: table.is_saving(idx),
                }
            })
            .collect();
        Self {
            title: format!(
                "{} · {} {} · {}",
                table.kind(),
                table.target().consent.as_str(),
                table.target().item_id,
                table.profile().client_name
            ),
            columns,
            rows,
            history: table.history().to_vec(),
        }
    }
}

/// One history entry, preformatted for display.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryLine {
    pub summary: String,
    pub prev: String,
    pub curr: String,
}

impl From<&ChangeRecord> for HistoryLine {
    fn from(record: &ChangeRecord) -> Self {
        let label = Field::from_key(&record.field)
            .map(Field::label)
            .unwrap_or(record.field.as_str());
        Self {
            summary: format!(
                "{} · {} · row {} · {}",
                record.at.format("%Y-%m-%d %H:%M"),
                record.user,
                record.row + 1,
                label
            ),
            prev: record.prev.clone(),
            curr: record.curr.clone(),
        }
    }
}
