//! Turns parsed spreadsheet rows into compliance rows.
//!
//! Headers are matched to fields by case-insensitive patterns. Code reuse
//! and allocation see the existing rows plus every row already built in the
//! same batch, so duplicates inside one file share a code.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::domain::codes::{next_code, resolve_component_code, resolve_supplier_code, system_prefix};
use crate::domain::entities::row::{ComplianceRow, Field, YesNo};
use crate::domain::entities::sheet::SheetRow;
use crate::domain::entities::table::{ClientProfile, TableKind};
use crate::errors::ValidationError;

/// Pattern order matters: more specific headers come first so that, for
/// example, "Annual Consumption (MT)" is claimed before "Annual Consumption".
const HEADER_PATTERNS: &[(Field, &str)] = &[
    (Field::SkuCode, r"sku.*code"),
    (Field::SkuDescription, r"sku.*desc"),
    (Field::SkuUom, r"sku.*(uom|unit)"),
    (Field::PackagingType, r"packaging.*type"),
    (Field::IndustryCategory, r"industry"),
    (Field::GenerateSupplierCode, r"generate.*supplier"),
    (Field::Generate, r"^\s*generate\b"),
    (Field::ComponentCode, r"^\s*component\s*code"),
    (Field::ComponentDescription, r"component.*desc"),
    (Field::SystemCode, r"system.*code"),
    (Field::SupplierName, r"supplier.*name"),
    (Field::SupplierCode, r"^\s*supplier\s*code"),
    (Field::SupplierType, r"supplier.*type"),
    (Field::ProductImage, r"product.*image"),
    (Field::ComponentImage, r"component.*image"),
    (Field::ComponentPolymer, r"component.*polymer"),
    (Field::PolymerType, r"polymer"),
    (Field::Category, r"^\s*category"),
    (Field::ContainerCapacity, r"container.*capacity"),
    (Field::LayerType, r"layer"),
    (Field::Thickness, r"thickness"),
    (Field::FoodGrade, r"food.*grade"),
    (Field::EprCertificateNumber, r"epr.*cert"),
    (Field::FssaiLicenseNumber, r"fssai"),
    (Field::ComponentWeight, r"component.*weight"),
    (Field::Recyclability, r"recyclab"),
    (Field::AnnualConsumptionMt, r"annual.*consumption.*\bmt\b"),
    (Field::AnnualConsumption, r"annual.*consumption"),
    (Field::PerPieceWeight, r"piece.*weight"),
    (Field::UsedRecycledQtyMt, r"recycled.*(qty|quantity)"),
    (Field::UsedRecycledPercent, r"recycled.*(%|percent)"),
    (Field::Uom, r"^\s*(uom|unit of measure)"),
];

fn header_patterns() -> &'static [(Field, Regex)] {
    static PATTERNS: OnceLock<Vec<(Field, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        HEADER_PATTERNS
            .iter()
            .map(|(field, pattern)| {
                let regex = Regex::new(&format!("(?i){pattern}"))
                    .expect("header patterns are valid regular expressions");
                (*field, regex)
            })
            .collect()
    })
}

/// Maps sheet headers to the fields of `kind`. For each field the first
/// matching header wins; a header claimed once is not reused.
pub fn map_headers<'h, I>(headers: I, kind: TableKind) -> Vec<(Field, String)>
where
    I: IntoIterator<Item = &'h str>,
{
    let headers: Vec<&str> = headers.into_iter().collect();
    let mut claimed = vec![false; headers.len()];
    let mut mapping = Vec::new();
    for (field, regex) in header_patterns() {
        if !kind.has_field(*field) {
            continue;
        }
        let hit = headers
            .iter()
            .enumerate()
            .find(|(idx, header)| !claimed[*idx] && regex.is_match(header));
        if let Some((idx, header)) = hit {
            claimed[idx] = true;
            mapping.push((*field, header.to_string()));
        }
    }
    mapping
}

/// Builds a row from mapped cells only; no codes are touched.
pub fn row_from_sheet(sheet_row: &SheetRow, mapping: &[(Field, String)], kind: TableKind) -> ComplianceRow {
    let mut row = ComplianceRow::empty(kind);
    for (field, header) in mapping {
        let value = sheet_row.get(header).unwrap_or_default().trim();
        // `map_headers` only yields fields of `kind`.
        let _ = row.set(*field, value);
    }
    row
}

/// New rows to append for `parsed`. `existing` is never modified.
pub fn reconcile(
    parsed: &[SheetRow],
    existing: &[ComplianceRow],
    kind: TableKind,
    profile: &ClientProfile,
) -> Result<Vec<ComplianceRow>, ValidationError> {
    let Some(first) = parsed.first() else {
        return Ok(Vec::new());
    };
    let mapping = map_headers(first.headers(), kind);
    if mapping.is_empty() {
        return Err(ValidationError::UnrecognizedSheet { kind });
    }
    debug!(columns = mapping.len(), rows = parsed.len(), "mapped sheet headers");

    let system_prefix = system_prefix(profile);
    let mut built: Vec<ComplianceRow> = Vec::with_capacity(parsed.len());
    for sheet_row in parsed.iter().filter(|row| !row.is_blank()) {
        let mut row = row_from_sheet(sheet_row, &mapping, kind);

        if row.core.component_code.trim().is_empty() && row.core.generate != Some(YesNo::Yes) {
            let cumulative = existing.iter().chain(built.iter());
            row.core.component_code =
                resolve_component_code(cumulative.clone(), cumulative, &row, profile);
        }

        if row.core.supplier_code.trim().is_empty()
            && !row.core.supplier_name.trim().is_empty()
            && row.core.generate_supplier_code != Some(YesNo::Yes)
        {
            let cumulative = existing.iter().chain(built.iter());
            row.core.supplier_code =
                resolve_supplier_code(cumulative.clone(), cumulative, &row, profile);
        }

        row.core.system_code = next_code(
            existing.iter().chain(built.iter()),
            &system_prefix,
            Field::SystemCode,
        );
        built.push(row);
    }
    Ok(built)
}
