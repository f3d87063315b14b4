use thiserror::Error;

use crate::domain::entities::history::ChangeRecord;
use crate::domain::entities::row::ComplianceRow;
use crate::domain::entities::table::TableTarget;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0}")]
    Message(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("server responded {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

/// Who made a change; recorded next to history entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveContext {
    pub user: String,
}

/// Persistence of compliance tables. Implementations return the stored form
/// of a saved row, which may differ from what was sent (resolved image
/// references, server-side normalization).
pub trait ComplianceStore: Send + Sync {
    fn load_rows(&self, target: &TableTarget) -> Result<Vec<ComplianceRow>, StoreError>;

    /// Saves a row without attachments as JSON.
    fn save_row(
        &self,
        target: &TableTarget,
        row_index: usize,
        row: &ComplianceRow,
        context: &SaveContext,
    ) -> Result<ComplianceRow, StoreError>;

    /// Saves a row together with its attached images.
    fn upload_row(
        &self,
        target: &TableTarget,
        row_index: usize,
        row: &ComplianceRow,
        context: &SaveContext,
    ) -> Result<ComplianceRow, StoreError>;

    /// Overwrites the whole table.
    fn save_all(
        &self,
        target: &TableTarget,
        rows: &[ComplianceRow],
        context: &SaveContext,
    ) -> Result<(), StoreError>;

    fn history(&self, target: &TableTarget) -> Result<Vec<ChangeRecord>, StoreError>;
}
