use thiserror::Error;

use crate::domain::entities::row::Field;
use crate::domain::entities::table::TableKind;
use crate::usecase::ports::store::StoreError;

/// Problems caught before any I/O is attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("row {}: {field} is required", .row + 1)]
    MissingField { row: usize, field: Field },

    #[error("{field} is not a column of the {kind} table")]
    UnsupportedField { field: Field, kind: TableKind },

    #[error("row {} does not exist (table has {len} rows)", .index + 1)]
    RowOutOfRange { index: usize, len: usize },

    #[error("row {} has unsaved image attachments; save that row first", .row + 1)]
    PendingAttachments { row: usize },

    #[error("row {} is already being saved", .row + 1)]
    SaveInFlight { row: usize },

    #[error("no column of the sheet matches any {kind} field")]
    UnrecognizedSheet { kind: TableKind },
}

/// An image that could not be embedded into an audit report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("image {reference} for SKU {sku_code} was skipped: {reason}")]
pub struct PartialAssetError {
    pub sku_code: String,
    pub reference: String,
    pub reason: String,
}

/// Outcome of a single user action on a compliance table.
#[derive(Error, Debug)]
pub enum ComplianceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("transport error: {0}")]
    Transport(#[from] StoreError),
}

impl ComplianceError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ComplianceError::Validation(_))
    }
}
