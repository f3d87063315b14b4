use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::domain::entities::row::{ComplianceRow, Field, ImageRef, ImageSlot};
use crate::domain::entities::table::{ClientProfile, TableTarget};
use crate::errors::PartialAssetError;
use crate::usecase::ports::assets::ImageSource;

pub const GALLERY_COLUMNS: usize = 3;
const UNASSIGNED_SKU: &str = "Unassigned";

const DETAIL_FIELDS: [Field; 5] = [
    Field::SkuCode,
    Field::SkuDescription,
    Field::SkuUom,
    Field::PackagingType,
    Field::IndustryCategory,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddedImage {
    pub caption: String,
    pub data_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkuSection {
    pub sku_code: String,
    pub details: ReportTable,
    pub components: ReportTable,
    /// Images laid out in rows of [`GALLERY_COLUMNS`].
    pub gallery: Vec<Vec<EmbeddedImage>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub client_name: String,
    pub plant_name: String,
    pub consent: String,
    pub item_id: String,
    pub table: String,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<SkuSection>,
    #[serde(skip)]
    pub skipped_images: Vec<PartialAssetError>,
}

/// Groups rows by SKU code in order of first appearance.
pub fn group_by_sku(rows: &[ComplianceRow]) -> Vec<(String, Vec<&ComplianceRow>)> {
    let mut groups: Vec<(String, Vec<&ComplianceRow>)> = Vec::new();
    for row in rows {
        let key = row.core.sku_code.trim().to_string();
        match groups.iter_mut().find(|(sku, _)| *sku == key) {
            Some((_, members)) => members.push(row),
            None => groups.push((key, vec![row])),
        }
    }
    groups
}

fn component_fields(rows: &[&ComplianceRow]) -> Vec<Field> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    first
        .kind()
        .columns()
        .into_iter()
        .filter(|field| !DETAIL_FIELDS.contains(field) && !field.is_image())
        .collect()
}

fn details_table(first: &ComplianceRow) -> ReportTable {
    ReportTable {
        headers: vec!["Field".to_string(), "Value".to_string()],
        rows: DETAIL_FIELDS
            .iter()
            .map(|field| {
                vec![
                    field.label().to_string(),
                    first.get(*field).unwrap_or_default(),
                ]
            })
            .collect(),
    }
}

fn components_table(rows: &[&ComplianceRow]) -> ReportTable {
    let fields = component_fields(rows);
    ReportTable {
        headers: fields.iter().map(|field| field.label().to_string()).collect(),
        rows: rows
            .iter()
            .map(|row| {
                fields
                    .iter()
                    .map(|field| row.get(*field).unwrap_or_default())
                    .collect()
            })
            .collect(),
    }
}

/// Stored images repeat across rows by URL; attachments are unique to the
/// row and slot that hold them, whatever their file name.
#[derive(PartialEq, Eq)]
enum ImageKey<'a> {
    Stored(&'a str),
    Attached(usize, ImageSlot),
}

fn collect_images(
    sku_code: &str,
    rows: &[&ComplianceRow],
    images: &dyn ImageSource,
    skipped: &mut Vec<PartialAssetError>,
) -> Vec<EmbeddedImage> {
    let mut seen: Vec<ImageKey> = Vec::new();
    let mut embedded = Vec::new();
    for (position, row) in rows.iter().enumerate() {
        for slot in [ImageSlot::Product, ImageSlot::Component] {
            let Some(image) = row.image(slot) else {
                continue;
            };
            let key = match image {
                ImageRef::Stored(url) => ImageKey::Stored(url.as_str()),
                ImageRef::Attached { .. } => ImageKey::Attached(position, slot),
            };
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            let reference = image.display_name();
            match images.load(image) {
                Ok(loaded) => embedded.push(EmbeddedImage {
                    caption: image_caption(row, slot, image),
                    data_uri: format!(
                        "data:{};base64,{}",
                        loaded.content_type,
                        base64::engine::general_purpose::STANDARD.encode(&loaded.bytes)
                    ),
                }),
                Err(err) => {
                    warn!(sku = sku_code, image = reference, error = %err, "skipping report image");
                    skipped.push(PartialAssetError {
                        sku_code: sku_code.to_string(),
                        reference: reference.to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }
    }
    embedded
}

fn image_caption(row: &ComplianceRow, slot: ImageSlot, image: &ImageRef) -> String {
    let subject = match slot {
        ImageSlot::Product => row.core.sku_description.trim(),
        ImageSlot::Component => row.core.component_description.trim(),
    };
    if subject.is_empty() {
        image.display_name().rsplit('/').next().unwrap_or_default().to_string()
    } else {
        subject.to_string()
    }
}

/// One section per SKU. Images that fail to load are left out and listed in
/// `skipped_images`; they never fail the report.
pub fn build_report(
    target: &TableTarget,
    profile: &ClientProfile,
    rows: &[ComplianceRow],
    images: &dyn ImageSource,
) -> AuditReport {
    let mut skipped_images = Vec::new();
    let sections = group_by_sku(rows)
        .into_iter()
        .map(|(sku_code, members)| {
            let label = if sku_code.is_empty() {
                UNASSIGNED_SKU.to_string()
            } else {
                sku_code
            };
            let gallery = collect_images(&label, &members, images, &mut skipped_images)
                .chunks(GALLERY_COLUMNS)
                .map(<[EmbeddedImage]>::to_vec)
                .collect();
            SkuSection {
                details: details_table(members[0]),
                components: components_table(&members),
                gallery,
                sku_code: label,
            }
        })
        .collect();

    AuditReport {
        client_name: profile.client_name.clone(),
        plant_name: profile.plant_name.clone(),
        consent: target.consent.as_str().to_string(),
        item_id: target.item_id.clone(),
        table: target.kind.label().to_string(),
        generated_at: Utc::now(),
        sections,
        skipped_images,
    }
}
