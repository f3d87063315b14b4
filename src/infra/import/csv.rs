use std::path::Path;

use anyhow::{Context, Result};

use crate::domain::entities::sheet::TabularData;

pub fn read_csv(path: &Path) -> Result<TabularData> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open csv: {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read headers from csv: {}", path.display()))?
        .clone();

    if headers.is_empty() {
        anyhow::bail!("csv header is required")
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("failed to parse csv record")?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(TabularData {
        columns: headers.iter().map(|h| h.trim().to_string()).collect(),
        rows,
    })
}

pub fn write_csv(path: &Path, data: &TabularData) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent dir: {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create csv: {}", path.display()))?;
    writer
        .write_record(&data.columns)
        .context("failed to write csv header")?;
    for row in &data.rows {
        writer.write_record(row).context("failed to write csv row")?;
    }
    writer.flush().context("failed to flush csv")?;
    Ok(())
}
