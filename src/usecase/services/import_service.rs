use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::domain::entities::sheet::TabularData;
use crate::infra::import::csv::{read_csv, write_csv};
use crate::infra::import::xlsx::{read_first_sheet, write_workbook};
use crate::usecase::services::table_service::ComplianceTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Csv,
    Workbook,
}

impl SheetFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Some(SheetFormat::Csv),
            "xlsx" | "xlsm" | "xls" | "ods" => Some(SheetFormat::Workbook),
            _ => None,
        }
    }
}

/// Spreadsheet boundary of a compliance table.
pub struct ImportService;

impl ImportService {
    pub fn read_sheet(path: &Path) -> Result<TabularData> {
        match SheetFormat::from_path(path) {
            Some(SheetFormat::Csv) => read_csv(path),
            Some(SheetFormat::Workbook) => read_first_sheet(path),
            None => anyhow::bail!("unsupported spreadsheet: {}", path.display()),
        }
    }

    pub fn import_file(table: &mut ComplianceTable, path: &Path) -> Result<usize> {
        let data = Self::read_sheet(path)?;
        Self::import_sheet(table, path, &data)
    }

    /// Reconciles an already parsed sheet into the table.
    pub fn import_sheet(table: &mut ComplianceTable, path: &Path, data: &TabularData) -> Result<usize> {
        let added = table
            .import_rows(&data.to_sheet_rows())
            .with_context(|| format!("failed to import {}", path.display()))?;
        info!(path = %path.display(), added, "imported spreadsheet");
        Ok(added)
    }

    pub fn export_file(table: &ComplianceTable, path: &Path) -> Result<usize> {
        Self::write_sheet(path, table.kind().label(), &table.export_rows())
    }

    /// Writes one named worksheet to an `.xlsx` workbook, or plain CSV for a
    /// `.csv` path.
    pub fn write_sheet(path: &Path, sheet: &str, data: &TabularData) -> Result<usize> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "xlsx" => write_workbook(path, sheet, data)?,
            "csv" => write_csv(path, data)?,
            _ => anyhow::bail!("export needs an .xlsx or .csv path: {}", path.display()),
        }
        info!(path = %path.display(), sheet, rows = data.rows.len(), "exported spreadsheet");
        Ok(data.rows.len())
    }
}
