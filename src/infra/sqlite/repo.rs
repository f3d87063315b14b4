use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::domain::entities::history::ChangeRecord;
use crate::domain::entities::row::{ComplianceRow, ImageRef, ImageSlot};
use crate::domain::entities::table::TableTarget;
use crate::infra::sqlite::queries::{load_history, load_rows, replace_rows, upsert_row};
use crate::infra::sqlite::schema::init_db;
use crate::usecase::ports::store::{ComplianceStore, SaveContext, StoreError};

/// Local store: rows in SQLite, uploaded images as files next to it.
pub struct SqliteRepo {
    pub db_path: PathBuf,
    pub asset_dir: PathBuf,
}

impl SqliteRepo {
    pub fn open(db_path: PathBuf, asset_dir: PathBuf) -> Result<Self, StoreError> {
        init_db(&db_path).map_err(|err| StoreError::Message(err.to_string()))?;
        Ok(Self { db_path, asset_dir })
    }

    /// Writes attached images to the asset directory and swaps them for
    /// `file://` references.
    fn persist_attachments(
        &self,
        target: &TableTarget,
        row_idx: usize,
        row: &ComplianceRow,
    ) -> Result<ComplianceRow> {
        let dir = self
            .asset_dir
            .join(sanitize(&target.client_id))
            .join(target.consent.as_str())
            .join(sanitize(&target.item_id));
        let mut stored = row.clone();
        for slot in [ImageSlot::Product, ImageSlot::Component] {
            let Some(ImageRef::Attached { file_name, bytes }) = row.image(slot) else {
                continue;
            };
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create asset dir: {}", dir.display()))?;
            let path = dir.join(format!(
                "{}-{}-{}-{}",
                target.kind.slug(),
                row_idx,
                Utc::now().timestamp_millis(),
                sanitize(file_name)
            ));
            std::fs::write(&path, bytes)
                .with_context(|| format!("failed to write asset: {}", path.display()))?;
            stored.set_image(slot, Some(ImageRef::Stored(file_url(&path))));
        }
        Ok(stored)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.to_string_lossy().replace('\\', "/"))
}

impl ComplianceStore for SqliteRepo {
    fn load_rows(&self, target: &TableTarget) -> Result<Vec<ComplianceRow>, StoreError> {
        load_rows(&self.db_path, target).map_err(|err| StoreError::Message(err.to_string()))
    }

    fn save_row(
        &self,
        target: &TableTarget,
        row_index: usize,
        row: &ComplianceRow,
        context: &SaveContext,
    ) -> Result<ComplianceRow, StoreError> {
        upsert_row(&self.db_path, target, row_index, row, &context.user)
            .map_err(|err| StoreError::Message(err.to_string()))?;
        Ok(row.clone())
    }

    fn upload_row(
        &self,
        target: &TableTarget,
        row_index: usize,
        row: &ComplianceRow,
        context: &SaveContext,
    ) -> Result<ComplianceRow, StoreError> {
        let stored = self
            .persist_attachments(target, row_index, row)
            .map_err(|err| StoreError::Message(err.to_string()))?;
        self.save_row(target, row_index, &stored, context)
    }

    fn save_all(
        &self,
        target: &TableTarget,
        rows: &[ComplianceRow],
        context: &SaveContext,
    ) -> Result<(), StoreError> {
        replace_rows(&self.db_path, target, rows, &context.user)
            .map_err(|err| StoreError::Message(err.to_string()))
    }

    fn history(&self, target: &TableTarget) -> Result<Vec<ChangeRecord>, StoreError> {
        load_history(&self.db_path, target).map_err(|err| StoreError::Message(err.to_string()))
    }
}
