use std::path::Path;

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Range, Reader};
use rust_xlsxwriter::Workbook;

use crate::domain::entities::sheet::TabularData;

pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(v) => v.trim().to_string(),
        Data::Float(v) => format_float(*v),
        Data::Int(v) => v.to_string(),
        Data::Bool(v) => v.to_string(),
        Data::DateTime(v) => v.to_string(),
        Data::DateTimeIso(v) => v.to_string(),
        Data::DurationIso(v) => v.to_string(),
        Data::Error(v) => format!("{v:?}"),
        Data::Empty => String::new(),
    }
}

/// Whole numbers stored as floats come back without a trailing `.0`.
fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// First row is the header; rows after it are data. Empty headers are kept
/// so cell positions line up.
pub fn range_to_tabular(range: &Range<Data>) -> TabularData {
    let mut rows = range.rows();
    let columns: Vec<String> = rows
        .next()
        .map(|header| header.iter().map(cell_to_string).collect())
        .unwrap_or_default();
    let rows = rows
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();
    TabularData { columns, rows }
}

/// Reads the first worksheet of an xlsx / xls / ods workbook.
pub fn read_first_sheet(path: &Path) -> Result<TabularData> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook: {}", path.display()))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .with_context(|| format!("workbook has no sheets: {}", path.display()))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("failed to read sheet: {sheet_name}"))?;
    Ok(range_to_tabular(&range))
}

const SHEET_NAME_LIMIT: usize = 31;

/// Worksheet names drop the characters Excel rejects and are capped at 31.
pub fn sheet_name(label: &str) -> String {
    let name: String = label
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(SHEET_NAME_LIMIT)
        .collect();
    let name = name.trim().trim_matches('\'').to_string();
    if name.is_empty() {
        "Sheet1".to_string()
    } else {
        name
    }
}

/// Writes `data` as the only worksheet of a new xlsx workbook. Cells are
/// written as text so codes and three-decimal values read back unchanged.
pub fn write_workbook(path: &Path, sheet: &str, data: &TabularData) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent dir: {}", parent.display()))?;
    }
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(sheet_name(sheet))
        .with_context(|| format!("invalid worksheet name: {sheet}"))?;

    let records = std::iter::once(&data.columns).chain(data.rows.iter());
    for (row_idx, record) in records.enumerate() {
        for (col_idx, value) in record.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("failed to write cell {row_idx}:{col_idx}"))?;
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("failed to write workbook: {}", path.display()))
}
