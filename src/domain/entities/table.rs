use serde::{Deserialize, Serialize};

use crate::domain::entities::row::Field;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableKind {
    ProductCompliance,
    SupplierCompliance,
    ComponentDetails,
    RecycledQuantity,
}

impl TableKind {
    /// Name of the row array inside a production-facility item.
    pub fn storage_field(self) -> &'static str {
        match self {
            TableKind::ProductCompliance => "productComplianceRows",
            TableKind::SupplierCompliance => "supplierComplianceRows",
            TableKind::ComponentDetails => "componentDetailsRows",
            TableKind::RecycledQuantity => "recycledQuantityRows",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TableKind::ProductCompliance => "Product Compliance",
            TableKind::SupplierCompliance => "Supplier Compliance",
            TableKind::ComponentDetails => "Component Details",
            TableKind::RecycledQuantity => "Recycled Quantity Used",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            TableKind::ProductCompliance => "product-compliance",
            TableKind::SupplierCompliance => "supplier-compliance",
            TableKind::ComponentDetails => "component-details",
            TableKind::RecycledQuantity => "recycled-quantity",
        }
    }

    /// Column order used by the editor and by spreadsheet export.
    pub fn columns(self) -> Vec<Field> {
        let mut columns = vec![
            Field::SystemCode,
            Field::SkuCode,
            Field::SkuDescription,
            Field::SkuUom,
            Field::PackagingType,
            Field::IndustryCategory,
            Field::ComponentCode,
            Field::ComponentDescription,
            Field::Generate,
            Field::SupplierName,
            Field::SupplierCode,
            Field::GenerateSupplierCode,
            Field::SupplierType,
        ];
        columns.extend_from_slice(match self {
            TableKind::ProductCompliance => &[
                Field::ComponentPolymer,
                Field::Category,
                Field::ContainerCapacity,
                Field::LayerType,
                Field::Thickness,
            ],
            TableKind::SupplierCompliance => &[
                Field::FoodGrade,
                Field::EprCertificateNumber,
                Field::FssaiLicenseNumber,
            ],
            TableKind::ComponentDetails => &[
                Field::PolymerType,
                Field::ComponentWeight,
                Field::Recyclability,
            ],
            TableKind::RecycledQuantity => &[
                Field::AnnualConsumption,
                Field::Uom,
                Field::PerPieceWeight,
                Field::AnnualConsumptionMt,
                Field::UsedRecycledPercent,
                Field::UsedRecycledQtyMt,
            ],
        });
        columns.extend_from_slice(&[Field::ProductImage, Field::ComponentImage]);
        columns
    }

    pub fn has_field(self, field: Field) -> bool {
        self.columns().contains(&field)
    }

    /// Fields that must be filled before a row can be saved.
    pub fn required_fields(self) -> &'static [Field] {
        match self {
            TableKind::SupplierCompliance => &[Field::ComponentCode, Field::SupplierName],
            _ => &[Field::ComponentCode],
        }
    }
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Consent authorization a compliance table hangs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConsentType {
    Cte,
    Cto,
}

impl ConsentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsentType::Cte => "CTE",
            ConsentType::Cto => "CTO",
        }
    }
}

/// Locates one table inside a client document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableTarget {
    pub client_id: String,
    pub consent: ConsentType,
    pub item_id: String,
    pub kind: TableKind,
}

impl TableTarget {
    /// Dotted document path of the whole row array.
    pub fn storage_path(&self) -> String {
        format!(
            "productionFacility.{}.{}.{}",
            self.consent.as_str(),
            self.item_id,
            self.kind.storage_field()
        )
    }
}

/// Client identity used to build code prefixes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientProfile {
    pub client_name: String,
    pub plant_name: String,
}
