use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domain::codes::{next_code, system_prefix};
use crate::domain::entities::history::{diff_rows, ChangeRecord};
use crate::domain::entities::row::{ComplianceRow, Field, ImageSlot};
use crate::domain::entities::row_set::{RowEvent, RowSet};
use crate::domain::entities::sheet::{SheetRow, TabularData};
use crate::domain::entities::table::{ClientProfile, TableKind, TableTarget};
use crate::domain::reconcile::reconcile;
use crate::errors::{ComplianceError, ValidationError};
use crate::usecase::ports::assets::ImageSource;
use crate::usecase::ports::store::{ComplianceStore, SaveContext, StoreError};
use crate::usecase::services::report_service::{build_report, AuditReport};

/// Handle for one history request. Results carrying a superseded ticket are
/// dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryTicket(u64);

/// Handle for one load request; a newer load supersedes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket(u64);

/// Result of a row save. `index` is where the row sits once the save lands,
/// or `None` when it was deleted while the request was in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub index: Option<usize>,
    pub row: ComplianceRow,
    pub changes: Vec<ChangeRecord>,
}

/// A row save in flight. Rows are tracked by identity, so deletions and
/// inserts made meanwhile do not misdirect the result.
#[derive(Debug, Clone)]
pub struct SaveTicket {
    row_id: u64,
    index: usize,
    sent_from: ComplianceRow,
    previous: Option<ComplianceRow>,
}

/// The I/O half of a row save, detached from the table so it can run on a
/// worker.
pub struct SaveRequest {
    store: Arc<dyn ComplianceStore>,
    target: TableTarget,
    index: usize,
    row: ComplianceRow,
    context: SaveContext,
}

impl std::fmt::Debug for SaveRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveRequest")
            .field("target", &self.target)
            .field("index", &self.index)
            .field("row", &self.row)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl SaveRequest {
    /// Rows with attached images go through the upload path; everything else
    /// is sent as JSON.
    pub fn send(&self) -> Result<ComplianceRow, StoreError> {
        if self.row.has_attachments() {
            self.store
                .upload_row(&self.target, self.index, &self.row, &self.context)
        } else {
            self.store
                .save_row(&self.target, self.index, &self.row, &self.context)
        }
    }
}

pub struct ReportRequest {
    target: TableTarget,
    profile: ClientProfile,
    rows: Vec<ComplianceRow>,
}

impl ReportRequest {
    pub fn build(&self, images: &dyn ImageSource) -> AuditReport {
        build_report(&self.target, &self.profile, &self.rows, images)
    }
}

#[derive(Debug, Clone)]
pub struct BulkSaveTicket {
    sent: Vec<(u64, ComplianceRow)>,
}

pub struct BulkSaveRequest {
    store: Arc<dyn ComplianceStore>,
    target: TableTarget,
    rows: Vec<ComplianceRow>,
    context: SaveContext,
}

impl BulkSaveRequest {
    pub fn send(&self) -> Result<(), StoreError> {
        self.store.save_all(&self.target, &self.rows, &self.context)
    }
}

pub struct LoadRequest {
    store: Arc<dyn ComplianceStore>,
    target: TableTarget,
}

impl LoadRequest {
    pub fn send(&self) -> Result<Vec<ComplianceRow>, StoreError> {
        self.store.load_rows(&self.target)
    }
}

pub struct HistoryRequest {
    store: Arc<dyn ComplianceStore>,
    target: TableTarget,
}

impl HistoryRequest {
    pub fn send(&self) -> Result<Vec<ChangeRecord>, StoreError> {
        self.store.history(&self.target)
    }
}

/// Controller for one compliance table: owns the working rows, the last
/// saved version of each row, and the loaded history.
///
/// Store calls are split into a `begin`/`prepare` step that snapshots what
/// the request needs, a request that runs anywhere, and a `finish`/`complete`
/// step that folds the result back in. `ids`, `saved` and `rows` stay
/// index-aligned.
pub struct ComplianceTable {
    target: TableTarget,
    profile: ClientProfile,
    user: String,
    rows: RowSet,
    ids: Vec<u64>,
    next_id: u64,
    saved: Vec<Option<ComplianceRow>>,
    saving: HashSet<u64>,
    load_generation: u64,
    history: Vec<ChangeRecord>,
    history_generation: u64,
    store: Arc<dyn ComplianceStore>,
}

impl ComplianceTable {
    pub fn new(
        target: TableTarget,
        profile: ClientProfile,
        user: impl Into<String>,
        store: Arc<dyn ComplianceStore>,
    ) -> Self {
        let rows = RowSet::new(target.kind);
        Self {
            target,
            profile,
            user: user.into(),
            rows,
            ids: Vec::new(),
            next_id: 0,
            saved: Vec::new(),
            saving: HashSet::new(),
            load_generation: 0,
            history: Vec::new(),
            history_generation: 0,
            store,
        }
    }

    pub fn target(&self) -> &TableTarget {
        &self.target
    }

    pub fn kind(&self) -> TableKind {
        self.target.kind
    }

    pub fn profile(&self) -> &ClientProfile {
        &self.profile
    }

    pub fn rows(&self) -> &[ComplianceRow] {
        self.rows.rows()
    }

    pub fn history(&self) -> &[ChangeRecord] {
        &self.history
    }

    fn issue_ids(&mut self, count: usize) -> Vec<u64> {
        let start = self.next_id;
        self.next_id += count as u64;
        (start..self.next_id).collect()
    }

    fn position_of(&self, row_id: u64) -> Option<usize> {
        self.ids.iter().position(|id| *id == row_id)
    }

    /// Stable identity of the row at `index`, unchanged by inserts and deletes
    /// around it.
    pub fn row_id(&self, index: usize) -> Option<u64> {
        self.ids.get(index).copied()
    }

    pub fn is_saving(&self, index: usize) -> bool {
        self.row_id(index)
            .is_some_and(|row_id| self.saving.contains(&row_id))
    }

    pub fn begin_load(&mut self) -> (LoadTicket, LoadRequest) {
        self.load_generation += 1;
        let request = LoadRequest {
            store: self.store.clone(),
            target: self.target.clone(),
        };
        (LoadTicket(self.load_generation), request)
    }

    /// Replaces the working rows with the stored table unless a newer load
    /// was issued. Rows missing a system code get one locally; they show up
    /// as unsaved changes. Saves still in flight for the old rows are
    /// reported without touching the new ones.
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<Vec<ComplianceRow>, StoreError>,
    ) -> Result<Option<usize>, ComplianceError> {
        if ticket.0 != self.load_generation {
            debug!("dropping stale load result");
            return Ok(None);
        }
        let stored = result?;
        self.saved = stored.iter().cloned().map(Some).collect();
        self.ids = self.issue_ids(stored.len());
        self.saving.clear();
        self.rows = RowSet::from_rows(self.target.kind, stored);
        let filled = self.rows.backfill_system_codes(&self.profile);
        if !filled.is_empty() {
            debug!(rows = ?filled, "backfilled system codes");
        }
        self.cancel_history_fetch();
        self.history.clear();
        info!(table = %self.target.kind, rows = self.rows.len(), "loaded table");
        Ok(Some(self.rows.len()))
    }

    pub fn load(&mut self) -> Result<usize, ComplianceError> {
        let (ticket, request) = self.begin_load();
        let result = request.send();
        let loaded = self.finish_load(ticket, result)?;
        Ok(loaded.unwrap_or(self.rows.len()))
    }

    fn apply(&mut self, event: RowEvent) -> Result<(), ValidationError> {
        self.rows.apply(event, &self.profile)
    }

    pub fn add_row(&mut self) -> usize {
        // AddRow cannot fail.
        let _ = self.apply(RowEvent::AddRow);
        let ids = self.issue_ids(1);
        self.ids.extend(ids);
        self.saved.push(None);
        self.rows.len() - 1
    }

    /// Removes a row locally once `confirm` agrees. Storage is untouched until
    /// the next bulk save.
    pub fn delete_row<F>(
        &mut self,
        index: usize,
        confirm: F,
    ) -> Result<Option<ComplianceRow>, ValidationError>
    where
        F: FnOnce(&ComplianceRow) -> bool,
    {
        if !confirm(self.rows.get(index)?) {
            return Ok(None);
        }
        let removed = self.rows.remove(index)?;
        self.saved.remove(index);
        self.ids.remove(index);
        debug!(index, "deleted row locally");
        Ok(Some(removed))
    }

    pub fn edit(&mut self, index: usize, field: Field, value: &str) -> Result<(), ValidationError> {
        self.apply(RowEvent::Edit {
            index,
            field,
            value: value.to_string(),
        })
    }

    pub fn commit(&mut self, index: usize, field: Field) -> Result<(), ValidationError> {
        self.apply(RowEvent::Commit { index, field })
    }

    pub fn attach_image(
        &mut self,
        index: usize,
        slot: ImageSlot,
        file_name: String,
        bytes: Vec<u8>,
    ) -> Result<(), ValidationError> {
        self.apply(RowEvent::AttachImage {
            index,
            slot,
            file_name,
            bytes,
        })
    }

    pub fn clear_image(&mut self, index: usize, slot: ImageSlot) -> Result<(), ValidationError> {
        self.apply(RowEvent::ClearImage { index, slot })
    }

    /// Fields that differ from the last saved version of the row.
    pub fn dirty_fields(&self, index: usize) -> Result<Vec<Field>, ValidationError> {
        let row = self.rows.get(index)?;
        let kind = self.kind();
        let changes = diff_rows(
            kind,
            index,
            self.saved.get(index).and_then(Option::as_ref),
            row,
            &self.user,
            Utc::now(),
        );
        Ok(changes
            .iter()
            .filter_map(|change| Field::from_key(&change.field))
            .collect())
    }

    pub fn validate_row(&self, index: usize) -> Result<(), ValidationError> {
        let row = self.rows.get(index)?;
        for field in self.kind().required_fields() {
            let value = row.get(*field).unwrap_or_default();
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField { row: index, field: *field });
            }
        }
        Ok(())
    }

    /// Snapshots one row for saving. Only one save per row may be in flight;
    /// other rows stay editable and savable meanwhile.
    pub fn prepare_save(&mut self, index: usize) -> Result<(SaveTicket, SaveRequest), ComplianceError> {
        self.validate_row(index)?;
        let row_id = self.row_id(index).ok_or(ValidationError::RowOutOfRange {
            index,
            len: self.ids.len(),
        })?;
        if self.saving.contains(&row_id) {
            return Err(ValidationError::SaveInFlight { row: index }.into());
        }
        let working = self.rows.get(index)?.clone();
        let mut outgoing = working.clone();
        if outgoing.core.system_code.trim().is_empty() {
            outgoing.core.system_code = next_code(
                self.rows.rows(),
                &system_prefix(&self.profile),
                Field::SystemCode,
            );
        }

        self.saving.insert(row_id);
        debug!(index, row_id, "issued row save");
        let ticket = SaveTicket {
            row_id,
            index,
            sent_from: working,
            previous: self.saved.get(index).cloned().flatten(),
        };
        let request = SaveRequest {
            store: self.store.clone(),
            target: self.target.clone(),
            index,
            row: outgoing,
            context: SaveContext {
                user: self.user.clone(),
            },
        };
        Ok((ticket, request))
    }

    /// Folds a finished row save back in. The stored row becomes the saved
    /// version; it replaces the working row only if the user did not edit the
    /// row while the request was in flight.
    pub fn complete_save(
        &mut self,
        ticket: SaveTicket,
        result: Result<ComplianceRow, StoreError>,
    ) -> Result<SaveOutcome, ComplianceError> {
        self.saving.remove(&ticket.row_id);
        let stored = result.map_err(|err| {
            warn!(index = ticket.index, error = %err, "row save failed");
            err
        })?;

        let index = self.position_of(ticket.row_id);
        let changes = diff_rows(
            self.kind(),
            index.unwrap_or(ticket.index),
            ticket.previous.as_ref(),
            &stored,
            &self.user,
            Utc::now(),
        );
        match index {
            Some(index) => {
                let current = self.rows.get(index)?;
                if *current == ticket.sent_from {
                    self.rows.replace(index, stored.clone())?;
                } else if current.core.system_code.trim().is_empty() {
                    let mut edited = current.clone();
                    edited.core.system_code = stored.core.system_code.clone();
                    self.rows.replace(index, edited)?;
                }
                if let Some(slot) = self.saved.get_mut(index) {
                    *slot = Some(stored.clone());
                }
                info!(index, changed = changes.len(), "saved row");
            }
            None => debug!(row_id = ticket.row_id, "saved row is no longer in the table"),
        }
        Ok(SaveOutcome {
            index,
            row: stored,
            changes,
        })
    }

    /// Persists one row and waits for the store.
    pub fn save_row(&mut self, index: usize) -> Result<SaveOutcome, ComplianceError> {
        let (ticket, request) = self.prepare_save(index)?;
        let result = request.send();
        self.complete_save(ticket, result)
    }

    /// Snapshots the whole table for a bulk overwrite. Attachments are not
    /// carried by this path, so rows still holding one must be saved first.
    pub fn prepare_save_all(&mut self) -> Result<(BulkSaveTicket, BulkSaveRequest), ComplianceError> {
        if let Some(row) = self.rows.rows().iter().position(ComplianceRow::has_attachments) {
            return Err(ValidationError::PendingAttachments { row }.into());
        }
        self.rows.backfill_system_codes(&self.profile);

        let rows = self.rows.rows().to_vec();
        let ticket = BulkSaveTicket {
            sent: self.ids.iter().copied().zip(rows.iter().cloned()).collect(),
        };
        let request = BulkSaveRequest {
            store: self.store.clone(),
            target: self.target.clone(),
            rows,
            context: SaveContext {
                user: self.user.clone(),
            },
        };
        Ok((ticket, request))
    }

    /// Marks every row that was sent, and is still present, as saved in the
    /// form it was sent.
    pub fn complete_save_all(
        &mut self,
        ticket: BulkSaveTicket,
        result: Result<(), StoreError>,
    ) -> Result<usize, ComplianceError> {
        result.map_err(|err| {
            warn!(error = %err, "bulk save failed");
            err
        })?;
        let count = ticket.sent.len();
        for (row_id, row) in ticket.sent {
            let Some(index) = self.position_of(row_id) else {
                continue;
            };
            if let Some(slot) = self.saved.get_mut(index) {
                *slot = Some(row);
            }
        }
        info!(rows = count, path = %self.target.storage_path(), "saved all rows");
        Ok(count)
    }

    /// Overwrites the stored table with the working rows and waits for the
    /// store.
    pub fn save_all(&mut self) -> Result<usize, ComplianceError> {
        let (ticket, request) = self.prepare_save_all()?;
        let result = request.send();
        self.complete_save_all(ticket, result)
    }

    /// Header row plus one text row per compliance row, in editor column order.
    pub fn export_rows(&self) -> TabularData {
        let columns = self.kind().columns();
        TabularData {
            columns: columns.iter().map(|field| field.label().to_string()).collect(),
            rows: self
                .rows
                .rows()
                .iter()
                .map(|row| {
                    columns
                        .iter()
                        .map(|field| row.get(*field).unwrap_or_default())
                        .collect()
                })
                .collect(),
        }
    }

    /// Appends reconciled rows for a parsed sheet; returns how many were added.
    pub fn import_rows(&mut self, parsed: &[SheetRow]) -> Result<usize, ValidationError> {
        let new_rows = reconcile(parsed, self.rows.rows(), self.kind(), &self.profile)?;
        let added = new_rows.len();
        self.saved.extend(std::iter::repeat(None).take(added));
        let ids = self.issue_ids(added);
        self.ids.extend(ids);
        self.rows.extend(new_rows);
        info!(added, "imported rows");
        Ok(added)
    }

    /// Snapshot of the rows for a report built off the UI thread.
    pub fn report_request(&self) -> ReportRequest {
        ReportRequest {
            target: self.target.clone(),
            profile: self.profile.clone(),
            rows: self.rows.rows().to_vec(),
        }
    }

    pub fn begin_history_fetch(&mut self) -> HistoryTicket {
        self.history_generation += 1;
        HistoryTicket(self.history_generation)
    }

    pub fn history_request(&self) -> HistoryRequest {
        HistoryRequest {
            store: self.store.clone(),
            target: self.target.clone(),
        }
    }

    /// Invalidates any fetch in flight.
    pub fn cancel_history_fetch(&mut self) {
        self.history_generation += 1;
    }

    /// Applies a fetched history unless the ticket was superseded. Returns
    /// whether the records were applied.
    pub fn finish_history_fetch(
        &mut self,
        ticket: HistoryTicket,
        result: Result<Vec<ChangeRecord>, StoreError>,
    ) -> Result<bool, ComplianceError> {
        if ticket.0 != self.history_generation {
            debug!("dropping stale history result");
            return Ok(false);
        }
        self.history = result?;
        Ok(true)
    }

    pub fn refresh_history(&mut self) -> Result<&[ChangeRecord], ComplianceError> {
        let ticket = self.begin_history_fetch();
        let result = self.history_request().send();
        self.finish_history_fetch(ticket, result)?;
        Ok(&self.history)
    }
}
