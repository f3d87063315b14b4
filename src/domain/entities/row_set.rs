use crate::domain::codes::backfill_system_codes;
use crate::domain::derive::{commit_field, derive_on_change};
use crate::domain::entities::row::{ComplianceRow, Field, ImageRef, ImageSlot};
use crate::domain::entities::table::{ClientProfile, TableKind};
use crate::errors::ValidationError;

/// Everything the editor can do to the rows of one table.
#[derive(Debug, Clone, PartialEq)]
pub enum RowEvent {
    AddRow,
    DeleteRow {
        index: usize,
    },
    Edit {
        index: usize,
        field: Field,
        value: String,
    },
    /// The cell lost focus.
    Commit {
        index: usize,
        field: Field,
    },
    AttachImage {
        index: usize,
        slot: ImageSlot,
        file_name: String,
        bytes: Vec<u8>,
    },
    ClearImage {
        index: usize,
        slot: ImageSlot,
    },
}

/// In-memory rows of one compliance table.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    kind: TableKind,
    rows: Vec<ComplianceRow>,
}

impl RowSet {
    pub fn new(kind: TableKind) -> Self {
        Self {
            kind,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(kind: TableKind, rows: Vec<ComplianceRow>) -> Self {
        Self { kind, rows }
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn rows(&self) -> &[ComplianceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&ComplianceRow, ValidationError> {
        self.rows.get(index).ok_or(ValidationError::RowOutOfRange {
            index,
            len: self.rows.len(),
        })
    }

    fn get_mut(&mut self, index: usize) -> Result<&mut ComplianceRow, ValidationError> {
        let len = self.rows.len();
        self.rows
            .get_mut(index)
            .ok_or(ValidationError::RowOutOfRange { index, len })
    }

    pub fn replace(&mut self, index: usize, row: ComplianceRow) -> Result<(), ValidationError> {
        *self.get_mut(index)? = row;
        Ok(())
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = ComplianceRow>) {
        self.rows.extend(rows);
    }

    pub fn remove(&mut self, index: usize) -> Result<ComplianceRow, ValidationError> {
        self.get(index)?;
        Ok(self.rows.remove(index))
    }

    pub fn backfill_system_codes(&mut self, profile: &ClientProfile) -> Vec<usize> {
        backfill_system_codes(&mut self.rows, profile)
    }

    pub fn apply(
        &mut self,
        event: RowEvent,
        profile: &ClientProfile,
    ) -> Result<(), ValidationError> {
        match event {
            RowEvent::AddRow => self.rows.push(ComplianceRow::empty(self.kind)),
            RowEvent::DeleteRow { index } => {
                self.remove(index)?;
            }
            RowEvent::Edit {
                index,
                field,
                value,
            } => {
                let row = derive_on_change(&self.rows, index, field, &value, profile)?;
                self.rows[index] = row;
            }
            RowEvent::Commit { index, field } => {
                let row = self.get(index)?.clone();
                self.rows[index] = commit_field(row, field);
            }
            RowEvent::AttachImage {
                index,
                slot,
                file_name,
                bytes,
            } => {
                self.get_mut(index)?
                    .set_image(slot, Some(ImageRef::Attached { file_name, bytes }));
            }
            RowEvent::ClearImage { index, slot } => {
                self.get_mut(index)?.set_image(slot, None);
            }
        }
        Ok(())
    }
}

/// Pure form of [`RowSet::apply`].
pub fn reduce(
    mut state: RowSet,
    event: RowEvent,
    profile: &ClientProfile,
) -> Result<RowSet, ValidationError> {
    state.apply(event, profile)?;
    Ok(state)
}
