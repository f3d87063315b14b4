/// One parsed spreadsheet row, cells keyed by header text in sheet order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetRow {
    pub cells: Vec<(String, String)>,
}

impl SheetRow {
    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(header, _)| header.as_str())
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == header)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, value)| value.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabularData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TabularData {
    /// Blank rows are dropped; short rows are padded with empty cells.
    pub fn to_sheet_rows(&self) -> Vec<SheetRow> {
        self.rows
            .iter()
            .map(|row| SheetRow {
                cells: self
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(idx, header)| {
                        (header.clone(), row.get(idx).cloned().unwrap_or_default())
                    })
                    .collect(),
            })
            .filter(|row| !row.is_blank())
            .collect()
    }
}
