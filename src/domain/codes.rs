//! Sequential code allocation for component, supplier and system codes.
//!
//! Codes are `prefix + zero-padded sequence`. The next sequence is one past
//! the highest numeric suffix among the rows the caller passes in, so codes
//! are only unique within that collection. Callers allocating for several
//! rows in one batch must include the rows already allocated.

use crate::domain::entities::row::{ComplianceRow, Field};
use crate::domain::entities::table::ClientProfile;

const UNKNOWN_SHORT_NAME: &str = "UNK";
const UNKNOWN_PLANT: &str = "PLT";
const COMPONENT_SEGMENT: &str = "Com";

/// First whitespace token, uppercased, at most three characters.
pub fn short_name(name: &str) -> String {
    match name.split_whitespace().next() {
        Some(token) => token.to_uppercase().chars().take(3).collect(),
        None => UNKNOWN_SHORT_NAME.to_string(),
    }
}

pub fn plant_code(plant_name: &str) -> String {
    let trimmed = plant_name.trim();
    if trimmed.is_empty() {
        UNKNOWN_PLANT.to_string()
    } else {
        trimmed.chars().take(4).collect()
    }
}

pub fn component_prefix(profile: &ClientProfile) -> String {
    format!(
        "{}/{}/{COMPONENT_SEGMENT}/",
        short_name(&profile.client_name),
        plant_code(&profile.plant_name)
    )
}

pub fn system_prefix(profile: &ClientProfile) -> String {
    format!("{}/{COMPONENT_SEGMENT}/", short_name(&profile.client_name))
}

pub fn supplier_prefix(supplier_name: &str, profile: &ClientProfile) -> String {
    format!(
        "{}/{}/",
        short_name(supplier_name),
        short_name(&profile.client_name)
    )
}

pub fn next_code<'a, I>(rows: I, prefix: &str, code_field: Field) -> String
where
    I: IntoIterator<Item = &'a ComplianceRow>,
{
    let max = rows
        .into_iter()
        .filter_map(|row| row.get(code_field))
        .filter_map(|code| {
            code.strip_prefix(prefix)
                .and_then(|suffix| suffix.parse::<u64>().ok())
        })
        // A suffix at the top of the range cannot be followed.
        .filter(|sequence| *sequence < u64::MAX)
        .max()
        .unwrap_or(0);
    format!("{prefix}{:03}", max + 1)
}

/// Code of the first row describing the same component of the same SKU.
pub fn find_component_code<'a, I>(rows: I, sku_code: &str, description: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a ComplianceRow>,
{
    let sku_code = sku_code.trim();
    let description = description.trim();
    if description.is_empty() {
        return None;
    }
    rows.into_iter()
        .find(|row| {
            row.core.sku_code.trim() == sku_code
                && row.core.component_description.trim() == description
                && !row.core.component_code.trim().is_empty()
        })
        .map(|row| row.core.component_code.clone())
}

pub fn find_supplier_code<'a, I>(rows: I, supplier_name: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a ComplianceRow>,
{
    let supplier_name = supplier_name.trim();
    if supplier_name.is_empty() {
        return None;
    }
    rows.into_iter()
        .find(|row| {
            row.core.supplier_name.trim() == supplier_name
                && !row.core.supplier_code.trim().is_empty()
        })
        .map(|row| row.core.supplier_code.clone())
}

/// Reuses a matching component's code from `candidates`, otherwise mints the
/// next code over `universe`.
pub fn resolve_component_code<'a, C, U>(
    candidates: C,
    universe: U,
    row: &ComplianceRow,
    profile: &ClientProfile,
) -> String
where
    C: IntoIterator<Item = &'a ComplianceRow>,
    U: IntoIterator<Item = &'a ComplianceRow>,
{
    find_component_code(candidates, &row.core.sku_code, &row.core.component_description)
        .unwrap_or_else(|| next_code(universe, &component_prefix(profile), Field::ComponentCode))
}

pub fn resolve_supplier_code<'a, C, U>(
    candidates: C,
    universe: U,
    row: &ComplianceRow,
    profile: &ClientProfile,
) -> String
where
    C: IntoIterator<Item = &'a ComplianceRow>,
    U: IntoIterator<Item = &'a ComplianceRow>,
{
    find_supplier_code(candidates, &row.core.supplier_name).unwrap_or_else(|| {
        next_code(
            universe,
            &supplier_prefix(&row.core.supplier_name, profile),
            Field::SupplierCode,
        )
    })
}

/// Gives every row without a system code the next one, in row order.
/// Returns the indices that were filled.
pub fn backfill_system_codes(rows: &mut [ComplianceRow], profile: &ClientProfile) -> Vec<usize> {
    let prefix = system_prefix(profile);
    let mut filled = Vec::new();
    for idx in 0..rows.len() {
        if !rows[idx].core.system_code.trim().is_empty() {
            continue;
        }
        let code = next_code(rows.iter(), &prefix, Field::SystemCode);
        rows[idx].core.system_code = code;
        filled.push(idx);
    }
    filled
}
