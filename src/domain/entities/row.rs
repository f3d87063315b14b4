use serde_json::{Map, Value};

use crate::domain::entities::table::TableKind;
use crate::errors::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    SkuCode,
    SkuDescription,
    SkuUom,
    PackagingType,
    IndustryCategory,
    ComponentCode,
    ComponentDescription,
    Generate,
    SystemCode,
    SupplierName,
    SupplierCode,
    GenerateSupplierCode,
    SupplierType,
    ProductImage,
    ComponentImage,
    ComponentPolymer,
    Category,
    ContainerCapacity,
    LayerType,
    Thickness,
    FoodGrade,
    EprCertificateNumber,
    FssaiLicenseNumber,
    PolymerType,
    ComponentWeight,
    Recyclability,
    AnnualConsumption,
    Uom,
    PerPieceWeight,
    AnnualConsumptionMt,
    UsedRecycledPercent,
    UsedRecycledQtyMt,
}

impl Field {
    /// Key used in stored documents and JSON payloads.
    pub fn key(self) -> &'static str {
        match self {
            Field::SkuCode => "skuCode",
            Field::SkuDescription => "skuDescription",
            Field::SkuUom => "skuUom",
            Field::PackagingType => "packagingType",
            Field::IndustryCategory => "industryCategory",
            Field::ComponentCode => "componentCode",
            Field::ComponentDescription => "componentDescription",
            Field::Generate => "generate",
            Field::SystemCode => "systemCode",
            Field::SupplierName => "supplierName",
            Field::SupplierCode => "supplierCode",
            Field::GenerateSupplierCode => "generateSupplierCode",
            Field::SupplierType => "supplierType",
            Field::ProductImage => "productImage",
            Field::ComponentImage => "componentImage",
            Field::ComponentPolymer => "componentPolymer",
            Field::Category => "category",
            Field::ContainerCapacity => "containerCapacity",
            Field::LayerType => "layerType",
            Field::Thickness => "thickness",
            Field::FoodGrade => "foodGrade",
            Field::EprCertificateNumber => "eprCertificateNumber",
            Field::FssaiLicenseNumber => "fssaiLicenseNumber",
            Field::PolymerType => "polymerType",
            Field::ComponentWeight => "componentWeight",
            Field::Recyclability => "recyclability",
            Field::AnnualConsumption => "annualConsumption",
            Field::Uom => "uom",
            Field::PerPieceWeight => "perPieceWeight",
            Field::AnnualConsumptionMt => "annualConsumptionMt",
            Field::UsedRecycledPercent => "usedRecycledPercent",
            Field::UsedRecycledQtyMt => "usedRecycledQtyMt",
        }
    }

    /// Spreadsheet / table header.
    pub fn label(self) -> &'static str {
        match self {
            Field::SkuCode => "SKU Code",
            Field::SkuDescription => "SKU Description",
            Field::SkuUom => "SKU UOM",
            Field::PackagingType => "Packaging Type",
            Field::IndustryCategory => "Industry Category",
            Field::ComponentCode => "Component Code",
            Field::ComponentDescription => "Component Description",
            Field::Generate => "Generate",
            Field::SystemCode => "System Code",
            Field::SupplierName => "Supplier Name",
            Field::SupplierCode => "Supplier Code",
            Field::GenerateSupplierCode => "Generate Supplier Code",
            Field::SupplierType => "Supplier Type",
            Field::ProductImage => "Product Image",
            Field::ComponentImage => "Component Image",
            Field::ComponentPolymer => "Component Polymer",
            Field::Category => "Category",
            Field::ContainerCapacity => "Container Capacity",
            Field::LayerType => "Layer Type",
            Field::Thickness => "Thickness (micron)",
            Field::FoodGrade => "Food Grade",
            Field::EprCertificateNumber => "EPR Certificate Number",
            Field::FssaiLicenseNumber => "FSSAI License Number",
            Field::PolymerType => "Polymer Type",
            Field::ComponentWeight => "Component Weight",
            Field::Recyclability => "Recyclability",
            Field::AnnualConsumption => "Annual Consumption",
            Field::Uom => "UOM",
            Field::PerPieceWeight => "Per Piece Weight (kg)",
            Field::AnnualConsumptionMt => "Annual Consumption (MT)",
            Field::UsedRecycledPercent => "Used Recycled %",
            Field::UsedRecycledQtyMt => "Used Recycled Qty (MT)",
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|field| field.key() == key)
    }

    /// Computed by the derivation engine; the editor renders these read-only.
    pub fn is_derived(self) -> bool {
        matches!(
            self,
            Field::SystemCode | Field::AnnualConsumptionMt | Field::UsedRecycledQtyMt
        )
    }

    pub fn is_image(self) -> bool {
        matches!(self, Field::ProductImage | Field::ComponentImage)
    }

    pub const ALL: [Field; 32] = [
        Field::SkuCode,
        Field::SkuDescription,
        Field::SkuUom,
        Field::PackagingType,
        Field::IndustryCategory,
        Field::ComponentCode,
        Field::ComponentDescription,
        Field::Generate,
        Field::SystemCode,
        Field::SupplierName,
        Field::SupplierCode,
        Field::GenerateSupplierCode,
        Field::SupplierType,
        Field::ProductImage,
        Field::ComponentImage,
        Field::ComponentPolymer,
        Field::Category,
        Field::ContainerCapacity,
        Field::LayerType,
        Field::Thickness,
        Field::FoodGrade,
        Field::EprCertificateNumber,
        Field::FssaiLicenseNumber,
        Field::PolymerType,
        Field::ComponentWeight,
        Field::Recyclability,
        Field::AnnualConsumption,
        Field::Uom,
        Field::PerPieceWeight,
        Field::AnnualConsumptionMt,
        Field::UsedRecycledPercent,
        Field::UsedRecycledQtyMt,
    ];
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum YesNo {
    Yes,
    No,
}

impl YesNo {
    pub fn parse(value: &str) -> Option<YesNo> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" => Some(YesNo::Yes),
            "no" | "n" => Some(YesNo::No),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            YesNo::Yes => "Yes",
            YesNo::No => "No",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Uom {
    Kg,
    Mt,
    Units,
    Roll,
    Nos,
    NotApplicable,
}

impl Uom {
    pub const ALL: [Uom; 6] = [
        Uom::Kg,
        Uom::Mt,
        Uom::Units,
        Uom::Roll,
        Uom::Nos,
        Uom::NotApplicable,
    ];

    pub fn parse(value: &str) -> Option<Uom> {
        match value.trim().to_ascii_lowercase().as_str() {
            "kg" | "kgs" => Some(Uom::Kg),
            "mt" => Some(Uom::Mt),
            "units" | "unit" => Some(Uom::Units),
            "roll" | "rolls" => Some(Uom::Roll),
            "nos" | "no." => Some(Uom::Nos),
            "not applicable" | "na" | "n/a" => Some(Uom::NotApplicable),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Uom::Kg => "KG",
            Uom::Mt => "MT",
            Uom::Units => "Units",
            Uom::Roll => "Roll",
            Uom::Nos => "Nos",
            Uom::NotApplicable => "Not Applicable",
        }
    }
}

/// An image cell: either a reference the store already holds or a file the
/// user attached and has not saved yet.
#[derive(Clone, PartialEq, Eq)]
pub enum ImageRef {
    Stored(String),
    Attached { file_name: String, bytes: Vec<u8> },
}

impl ImageRef {
    pub fn display_name(&self) -> &str {
        match self {
            ImageRef::Stored(url) => url,
            ImageRef::Attached { file_name, .. } => file_name,
        }
    }

    pub fn stored_url(&self) -> Option<&str> {
        match self {
            ImageRef::Stored(url) => Some(url),
            ImageRef::Attached { .. } => None,
        }
    }

    pub fn is_attached(&self) -> bool {
        matches!(self, ImageRef::Attached { .. })
    }
}

impl std::fmt::Debug for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageRef::Stored(url) => f.debug_tuple("Stored").field(url).finish(),
            ImageRef::Attached { file_name, bytes } => f
                .debug_struct("Attached")
                .field("file_name", file_name)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSlot {
    Product,
    Component,
}

impl ImageSlot {
    pub fn field(self) -> Field {
        match self {
            ImageSlot::Product => Field::ProductImage,
            ImageSlot::Component => Field::ComponentImage,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowCore {
    pub sku_code: String,
    pub sku_description: String,
    pub sku_uom: String,
    pub packaging_type: String,
    pub industry_category: String,
    pub component_code: String,
    pub component_description: String,
    pub generate: Option<YesNo>,
    pub system_code: String,
    pub supplier_name: String,
    pub supplier_code: String,
    pub generate_supplier_code: Option<YesNo>,
    pub supplier_type: String,
    pub product_image: Option<ImageRef>,
    pub component_image: Option<ImageRef>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductDetail {
    pub component_polymer: String,
    pub category: String,
    pub container_capacity: String,
    pub layer_type: String,
    pub thickness: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupplierDetail {
    pub food_grade: String,
    pub epr_certificate_number: String,
    pub fssai_license_number: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentDetail {
    pub polymer_type: String,
    pub component_weight: String,
    pub recyclability: String,
}

/// Numeric cells are kept as typed text so partial input survives edits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecycledDetail {
    pub annual_consumption: String,
    pub uom: Option<Uom>,
    pub per_piece_weight: String,
    pub annual_consumption_mt: String,
    pub used_recycled_percent: String,
    pub used_recycled_qty_mt: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowDetail {
    ProductCompliance(ProductDetail),
    SupplierCompliance(SupplierDetail),
    ComponentDetails(ComponentDetail),
    RecycledQuantity(RecycledDetail),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComplianceRow {
    pub core: RowCore,
    pub detail: RowDetail,
}

impl ComplianceRow {
    pub fn empty(kind: TableKind) -> Self {
        let detail = match kind {
            TableKind::ProductCompliance => RowDetail::ProductCompliance(ProductDetail::default()),
            TableKind::SupplierCompliance => {
                RowDetail::SupplierCompliance(SupplierDetail::default())
            }
            TableKind::ComponentDetails => RowDetail::ComponentDetails(ComponentDetail::default()),
            TableKind::RecycledQuantity => RowDetail::RecycledQuantity(RecycledDetail::default()),
        };
        Self {
            core: RowCore::default(),
            detail,
        }
    }

    pub fn kind(&self) -> TableKind {
        match self.detail {
            RowDetail::ProductCompliance(_) => TableKind::ProductCompliance,
            RowDetail::SupplierCompliance(_) => TableKind::SupplierCompliance,
            RowDetail::ComponentDetails(_) => TableKind::ComponentDetails,
            RowDetail::RecycledQuantity(_) => TableKind::RecycledQuantity,
        }
    }

    pub fn recycled(&self) -> Option<&RecycledDetail> {
        match &self.detail {
            RowDetail::RecycledQuantity(detail) => Some(detail),
            _ => None,
        }
    }

    pub fn recycled_mut(&mut self) -> Option<&mut RecycledDetail> {
        match &mut self.detail {
            RowDetail::RecycledQuantity(detail) => Some(detail),
            _ => None,
        }
    }

    pub fn image(&self, slot: ImageSlot) -> Option<&ImageRef> {
        match slot {
            ImageSlot::Product => self.core.product_image.as_ref(),
            ImageSlot::Component => self.core.component_image.as_ref(),
        }
    }

    pub fn set_image(&mut self, slot: ImageSlot, image: Option<ImageRef>) {
        match slot {
            ImageSlot::Product => self.core.product_image = image,
            ImageSlot::Component => self.core.component_image = image,
        }
    }

    pub fn has_attachments(&self) -> bool {
        [ImageSlot::Product, ImageSlot::Component]
            .into_iter()
            .any(|slot| self.image(slot).is_some_and(ImageRef::is_attached))
    }

    /// Text value of a field, `None` when this row's table has no such column.
    pub fn get(&self, field: Field) -> Option<String> {
        let core = &self.core;
        let value = match field {
            Field::SkuCode => core.sku_code.clone(),
            Field::SkuDescription => core.sku_description.clone(),
            Field::SkuUom => core.sku_uom.clone(),
            Field::PackagingType => core.packaging_type.clone(),
            Field::IndustryCategory => core.industry_category.clone(),
            Field::ComponentCode => core.component_code.clone(),
            Field::ComponentDescription => core.component_description.clone(),
            Field::Generate => yes_no_text(core.generate),
            Field::SystemCode => core.system_code.clone(),
            Field::SupplierName => core.supplier_name.clone(),
            Field::SupplierCode => core.supplier_code.clone(),
            Field::GenerateSupplierCode => yes_no_text(core.generate_supplier_code),
            Field::SupplierType => core.supplier_type.clone(),
            Field::ProductImage => image_text(core.product_image.as_ref()),
            Field::ComponentImage => image_text(core.component_image.as_ref()),
            _ => return self.detail_value(field),
        };
        Some(value)
    }

    fn detail_value(&self, field: Field) -> Option<String> {
        let value = match (&self.detail, field) {
            (RowDetail::ProductCompliance(d), Field::ComponentPolymer) => &d.component_polymer,
            (RowDetail::ProductCompliance(d), Field::Category) => &d.category,
            (RowDetail::ProductCompliance(d), Field::ContainerCapacity) => &d.container_capacity,
            (RowDetail::ProductCompliance(d), Field::LayerType) => &d.layer_type,
            (RowDetail::ProductCompliance(d), Field::Thickness) => &d.thickness,
            (RowDetail::SupplierCompliance(d), Field::FoodGrade) => &d.food_grade,
            (RowDetail::SupplierCompliance(d), Field::EprCertificateNumber) => {
                &d.epr_certificate_number
            }
            (RowDetail::SupplierCompliance(d), Field::FssaiLicenseNumber) => {
                &d.fssai_license_number
            }
            (RowDetail::ComponentDetails(d), Field::PolymerType) => &d.polymer_type,
            (RowDetail::ComponentDetails(d), Field::ComponentWeight) => &d.component_weight,
            (RowDetail::ComponentDetails(d), Field::Recyclability) => &d.recyclability,
            (RowDetail::RecycledQuantity(d), Field::Uom) => {
                return Some(d.uom.map(Uom::as_str).unwrap_or_default().to_string())
            }
            (RowDetail::RecycledQuantity(d), Field::AnnualConsumption) => &d.annual_consumption,
            (RowDetail::RecycledQuantity(d), Field::PerPieceWeight) => &d.per_piece_weight,
            (RowDetail::RecycledQuantity(d), Field::AnnualConsumptionMt) => {
                &d.annual_consumption_mt
            }
            (RowDetail::RecycledQuantity(d), Field::UsedRecycledPercent) => {
                &d.used_recycled_percent
            }
            (RowDetail::RecycledQuantity(d), Field::UsedRecycledQtyMt) => &d.used_recycled_qty_mt,
            _ => return None,
        };
        Some(value.clone())
    }

    /// Writes a text value. Image fields accept a stored reference; an empty
    /// value clears them. Unknown enum text clears the enum cell.
    pub fn set(&mut self, field: Field, value: &str) -> Result<(), ValidationError> {
        let kind = self.kind();
        let core = &mut self.core;
        let text = value.to_string();
        match field {
            Field::SkuCode => core.sku_code = text,
            Field::SkuDescription => core.sku_description = text,
            Field::SkuUom => core.sku_uom = text,
            Field::PackagingType => core.packaging_type = text,
            Field::IndustryCategory => core.industry_category = text,
            Field::ComponentCode => core.component_code = text,
            Field::ComponentDescription => core.component_description = text,
            Field::Generate => core.generate = YesNo::parse(value),
            Field::SystemCode => core.system_code = text,
            Field::SupplierName => core.supplier_name = text,
            Field::SupplierCode => core.supplier_code = text,
            Field::GenerateSupplierCode => core.generate_supplier_code = YesNo::parse(value),
            Field::SupplierType => core.supplier_type = text,
            Field::ProductImage => core.product_image = stored_image(value),
            Field::ComponentImage => core.component_image = stored_image(value),
            _ => {
                let slot = self
                    .detail_slot(field)
                    .ok_or(ValidationError::UnsupportedField { field, kind })?;
                match slot {
                    DetailSlot::Text(cell) => *cell = text,
                    DetailSlot::Uom(cell) => *cell = Uom::parse(value),
                }
            }
        }
        Ok(())
    }

    fn detail_slot(&mut self, field: Field) -> Option<DetailSlot<'_>> {
        let cell = match (&mut self.detail, field) {
            (RowDetail::ProductCompliance(d), Field::ComponentPolymer) => &mut d.component_polymer,
            (RowDetail::ProductCompliance(d), Field::Category) => &mut d.category,
            (RowDetail::ProductCompliance(d), Field::ContainerCapacity) => {
                &mut d.container_capacity
            }
            (RowDetail::ProductCompliance(d), Field::LayerType) => &mut d.layer_type,
            (RowDetail::ProductCompliance(d), Field::Thickness) => &mut d.thickness,
            (RowDetail::SupplierCompliance(d), Field::FoodGrade) => &mut d.food_grade,
            (RowDetail::SupplierCompliance(d), Field::EprCertificateNumber) => {
                &mut d.epr_certificate_number
            }
            (RowDetail::SupplierCompliance(d), Field::FssaiLicenseNumber) => {
                &mut d.fssai_license_number
            }
            (RowDetail::ComponentDetails(d), Field::PolymerType) => &mut d.polymer_type,
            (RowDetail::ComponentDetails(d), Field::ComponentWeight) => &mut d.component_weight,
            (RowDetail::ComponentDetails(d), Field::Recyclability) => &mut d.recyclability,
            (RowDetail::RecycledQuantity(d), Field::Uom) => return Some(DetailSlot::Uom(&mut d.uom)),
            (RowDetail::RecycledQuantity(d), Field::AnnualConsumption) => {
                &mut d.annual_consumption
            }
            (RowDetail::RecycledQuantity(d), Field::PerPieceWeight) => &mut d.per_piece_weight,
            (RowDetail::RecycledQuantity(d), Field::AnnualConsumptionMt) => {
                &mut d.annual_consumption_mt
            }
            (RowDetail::RecycledQuantity(d), Field::UsedRecycledPercent) => {
                &mut d.used_recycled_percent
            }
            (RowDetail::RecycledQuantity(d), Field::UsedRecycledQtyMt) => {
                &mut d.used_recycled_qty_mt
            }
            _ => return None,
        };
        Some(DetailSlot::Text(cell))
    }

    /// Flat `{fieldKey: value}` object, the shape stores exchange. Attached
    /// images serialize as `null`; they travel as upload parts instead.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for field in self.kind().columns() {
            let value = if field.is_image() {
                self.image(image_slot(field))
                    .and_then(ImageRef::stored_url)
                    .map(|url| Value::String(url.to_string()))
                    .unwrap_or(Value::Null)
            } else {
                Value::String(self.get(field).unwrap_or_default())
            };
            object.insert(field.key().to_string(), value);
        }
        Value::Object(object)
    }

    /// Reads a stored row. Unknown keys are ignored; numbers are kept as
    /// their textual form.
    pub fn from_json(kind: TableKind, value: &Value) -> Self {
        let mut row = ComplianceRow::empty(kind);
        let Some(object) = value.as_object() else {
            return row;
        };
        for (key, cell) in object {
            let Some(field) = Field::from_key(key) else {
                continue;
            };
            if !kind.has_field(field) {
                continue;
            }
            let text = match cell {
                Value::String(text) => text.clone(),
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                _ => String::new(),
            };
            // `has_field` above guarantees the column exists.
            let _ = row.set(field, &text);
        }
        row
    }
}

enum DetailSlot<'a> {
    Text(&'a mut String),
    Uom(&'a mut Option<Uom>),
}

fn yes_no_text(value: Option<YesNo>) -> String {
    value.map(YesNo::as_str).unwrap_or_default().to_string()
}

fn image_text(image: Option<&ImageRef>) -> String {
    image
        .map(|image| image.display_name().to_string())
        .unwrap_or_default()
}

fn stored_image(value: &str) -> Option<ImageRef> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| ImageRef::Stored(trimmed.to_string()))
}

fn image_slot(field: Field) -> ImageSlot {
    if field == Field::ProductImage {
        ImageSlot::Product
    } else {
        ImageSlot::Component
    }
}
