//! Dependent-field recomputation for compliance rows.
//!
//! `derive_on_change` handles keystroke-level edits; `commit_field` is the
//! blur step. Recycled percent is only normalized on commit so partial input
//! such as `5` on the way to `50` is left alone while typing.

use crate::domain::codes::{resolve_component_code, resolve_supplier_code};
use crate::domain::entities::row::{ComplianceRow, Field, RecycledDetail, Uom, YesNo};
use crate::domain::entities::table::ClientProfile;
use crate::errors::ValidationError;

const KG_PER_TONNE: f64 = 1000.0;

/// Fields whose change recomputes annual consumption in tonnes.
pub const CONSUMPTION_TRIGGERS: [Field; 3] =
    [Field::AnnualConsumption, Field::Uom, Field::PerPieceWeight];

pub fn parse_number(value: &str) -> Option<f64> {
    let cleaned = value.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|number| number.is_finite())
}

pub fn format_tonnes(value: f64) -> String {
    // -0.0 would render as "-0.000".
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{value:.3}")
}

/// Annual consumption converted to tonnes. `None` while no unit is chosen.
pub fn annual_consumption_mt(
    consumption: &str,
    uom: Option<Uom>,
    per_piece_weight_kg: &str,
) -> Option<f64> {
    let consumption = parse_number(consumption).unwrap_or(0.0);
    let tonnes = match uom? {
        Uom::Kg => consumption / KG_PER_TONNE,
        Uom::Mt => consumption,
        Uom::Units | Uom::Roll | Uom::Nos => {
            consumption * parse_number(per_piece_weight_kg).unwrap_or(0.0) / KG_PER_TONNE
        }
        Uom::NotApplicable => 0.0,
    };
    Some(tonnes)
}

/// Recycled share as a fraction; values above 1 are read as percentages.
pub fn recycled_fraction(raw: &str) -> Option<f64> {
    let value = parse_number(raw)?;
    Some(if value > 1.0 { value / 100.0 } else { value })
}

fn recompute_consumption(detail: &mut RecycledDetail) {
    detail.annual_consumption_mt = annual_consumption_mt(
        &detail.annual_consumption,
        detail.uom,
        &detail.per_piece_weight,
    )
    .map(format_tonnes)
    .unwrap_or_default();
    recompute_recycled_qty(detail);
}

fn recompute_recycled_qty(detail: &mut RecycledDetail) {
    let tonnes = parse_number(&detail.annual_consumption_mt);
    let fraction = recycled_fraction(&detail.used_recycled_percent);
    detail.used_recycled_qty_mt = match (tonnes, fraction) {
        (Some(tonnes), Some(fraction)) => format_tonnes(tonnes * fraction),
        _ => String::new(),
    };
}

fn zero_recycled_fields(detail: &mut RecycledDetail) {
    detail.annual_consumption = "0".to_string();
    detail.per_piece_weight = "0".to_string();
    detail.used_recycled_percent = "0".to_string();
    detail.annual_consumption_mt = format_tonnes(0.0);
    detail.used_recycled_qty_mt = format_tonnes(0.0);
}

/// Applies `value` to `rows[index].field` and returns the row with every
/// dependent field recomputed. `rows` is only read; code reuse looks at the
/// other rows, allocation looks at all of them.
pub fn derive_on_change(
    rows: &[ComplianceRow],
    index: usize,
    field: Field,
    value: &str,
    profile: &ClientProfile,
) -> Result<ComplianceRow, ValidationError> {
    let mut row = rows
        .get(index)
        .cloned()
        .ok_or(ValidationError::RowOutOfRange {
            index,
            len: rows.len(),
        })?;
    row.set(field, value)?;

    let others = || {
        rows.iter()
            .enumerate()
            .filter(move |(idx, _)| *idx != index)
            .map(|(_, other)| other)
    };

    match field {
        Field::Generate => match row.core.generate {
            Some(YesNo::Yes) => row.core.component_code.clear(),
            Some(YesNo::No) => {
                row.core.component_code = resolve_component_code(others(), rows, &row, profile);
            }
            None => {}
        },
        Field::GenerateSupplierCode => match row.core.generate_supplier_code {
            Some(YesNo::Yes) => row.core.supplier_code.clear(),
            Some(YesNo::No) => {
                row.core.supplier_code = resolve_supplier_code(others(), rows, &row, profile);
            }
            None => {}
        },
        _ => {}
    }

    if let Some(detail) = row.recycled_mut() {
        if field == Field::Uom && detail.uom == Some(Uom::NotApplicable) {
            zero_recycled_fields(detail);
        }
        if CONSUMPTION_TRIGGERS.contains(&field) {
            recompute_consumption(detail);
        }
    }

    Ok(row)
}

/// Blur-time normalization. Only the recycled percent has one; every other
/// field passes through untouched.
pub fn commit_field(mut row: ComplianceRow, field: Field) -> ComplianceRow {
    if field != Field::UsedRecycledPercent {
        return row;
    }
    if let Some(detail) = row.recycled_mut() {
        if let Some(fraction) = recycled_fraction(&detail.used_recycled_percent) {
            detail.used_recycled_percent = format_tonnes(fraction);
        }
        recompute_recycled_qty(detail);
    }
    row
}
