use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use calamine::{Data, Range, Reader};
use chrono::{TimeZone, Utc};

use crate::config::{AppConfig, StoreConfig, API_URL_ENV, DB_PATH_ENV};
use crate::domain::entities::history::ChangeRecord;
use crate::domain::entities::row::{ComplianceRow, Field, ImageRef, ImageSlot, Uom, YesNo};
use crate::domain::entities::row_set::{reduce, RowEvent, RowSet};
use crate::domain::entities::sheet::{SheetRow, TabularData};
use crate::domain::entities::table::{ClientProfile, ConsentType, TableKind, TableTarget};
use crate::domain::reconcile::{map_headers, reconcile};
use crate::errors::{ComplianceError, ValidationError};
use crate::infra::assets::fetch::ImageFetcher;
use crate::infra::import::xlsx::range_to_tabular;
use crate::infra::report::html::render_report;
use crate::infra::sqlite::repo::SqliteRepo;
use crate::usecase::ports::assets::{AssetError, ImageSource, LoadedImage};
use crate::usecase::ports::store::{ComplianceStore, SaveContext, StoreError};
use crate::usecase::services::import_service::ImportService;
use crate::usecase::services::report_service::build_report;
use crate::usecase::services::table_service::ComplianceTable;

fn unique_test_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be after epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("compliance-{prefix}-{nanos}"))
}

fn target(kind: TableKind) -> TableTarget {
    TableTarget {
        client_id: "client-1".to_string(),
        consent: ConsentType::Cto,
        item_id: "item-1".to_string(),
        kind,
    }
}

fn profile() -> ClientProfile {
    ClientProfile {
        client_name: "Acme Industries".to_string(),
        plant_name: "Bhiwandi".to_string(),
    }
}

fn product_row(sku: &str, description: &str, code: &str) -> ComplianceRow {
    let mut row = ComplianceRow::empty(TableKind::ProductCompliance);
    row.core.sku_code = sku.to_string();
    row.core.component_description = description.to_string();
    row.core.component_code = code.to_string();
    row
}

fn supplier_row(name: &str, code: &str) -> ComplianceRow {
    let mut row = ComplianceRow::empty(TableKind::SupplierCompliance);
    row.core.component_code = "ACM/Bhiw/Com/001".to_string();
    row.core.supplier_name = name.to_string();
    row.core.supplier_code = code.to_string();
    row
}

fn sheet(columns: &[&str], rows: &[&[&str]]) -> Vec<SheetRow> {
    TabularData {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows: rows
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect(),
    }
    .to_sheet_rows()
}

/// In-memory store that records every call it receives.
#[derive(Default)]
struct MemoryStore {
    rows: Mutex<Vec<ComplianceRow>>,
    history: Mutex<Vec<ChangeRecord>>,
    calls: Mutex<Vec<&'static str>>,
    failure: Mutex<Option<StoreError>>,
}

impl MemoryStore {
    fn with_rows(rows: Vec<ComplianceRow>) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(rows),
            ..Self::default()
        })
    }

    fn fail_with(&self, err: StoreError) {
        *self.failure.lock().expect("failure lock") = Some(err);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn stored(&self) -> Vec<ComplianceRow> {
        self.rows.lock().expect("rows lock").clone()
    }

    fn record(&self, call: &'static str) -> Result<(), StoreError> {
        self.calls.lock().expect("calls lock").push(call);
        match self.failure.lock().expect("failure lock").clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn put(&self, row_index: usize, row: &ComplianceRow) {
        let mut rows = self.rows.lock().expect("rows lock");
        if row_index < rows.len() {
            rows[row_index] = row.clone();
        } else {
            rows.push(row.clone());
        }
    }
}

impl ComplianceStore for MemoryStore {
    fn load_rows(&self, _target: &TableTarget) -> Result<Vec<ComplianceRow>, StoreError> {
        self.record("load")?;
        Ok(self.stored())
    }

    fn save_row(
        &self,
        _target: &TableTarget,
        row_index: usize,
        row: &ComplianceRow,
        _context: &SaveContext,
    ) -> Result<ComplianceRow, StoreError> {
        self.record("save")?;
        self.put(row_index, row);
        Ok(row.clone())
    }

    fn upload_row(
        &self,
        _target: &TableTarget,
        row_index: usize,
        row: &ComplianceRow,
        _context: &SaveContext,
    ) -> Result<ComplianceRow, StoreError> {
        self.record("upload")?;
        let mut stored = row.clone();
        for slot in [ImageSlot::Product, ImageSlot::Component] {
            if let Some(ImageRef::Attached { file_name, .. }) = row.image(slot) {
                stored.set_image(
                    slot,
                    Some(ImageRef::Stored(format!(
                        "https://assets.example.test/{file_name}"
                    ))),
                );
            }
        }
        self.put(row_index, &stored);
        Ok(stored)
    }

    fn save_all(
        &self,
        _target: &TableTarget,
        rows: &[ComplianceRow],
        _context: &SaveContext,
    ) -> Result<(), StoreError> {
        self.record("save_all")?;
        *self.rows.lock().expect("rows lock") = rows.to_vec();
        Ok(())
    }

    fn history(&self, _target: &TableTarget) -> Result<Vec<ChangeRecord>, StoreError> {
        self.record("history")?;
        Ok(self.history.lock().expect("history lock").clone())
    }
}

fn open_table(kind: TableKind, store: Arc<MemoryStore>) -> ComplianceTable {
    let mut table = ComplianceTable::new(target(kind), profile(), "auditor", store);
    table.load().expect("load should succeed");
    table
}

/// Serves attachments as PNGs and treats every stored reference as offline.
struct OfflineImages;

impl ImageSource for OfflineImages {
    fn load(&self, image: &ImageRef) -> Result<LoadedImage, AssetError> {
        match image {
            ImageRef::Attached { bytes, .. } => Ok(LoadedImage {
                content_type: "image/png".to_string(),
                bytes: bytes.clone(),
            }),
            ImageRef::Stored(url) => Err(AssetError::Unreachable {
                reference: url.clone(),
                reason: "offline".to_string(),
            }),
        }
    }
}

#[test]
fn load_backfills_missing_system_codes_in_row_order() {
    let mut coded = product_row("S1", "Lid", "ACM/Bhiw/Com/002");
    coded.core.system_code = "ACM/Com/002".to_string();
    let store = MemoryStore::with_rows(vec![
        product_row("S1", "Cap", "ACM/Bhiw/Com/001"),
        coded,
        product_row("S2", "Seal", "ACM/Bhiw/Com/003"),
    ]);

    let table = open_table(TableKind::ProductCompliance, store);

    let codes: Vec<&str> = table
        .rows()
        .iter()
        .map(|row| row.core.system_code.as_str())
        .collect();
    assert_eq!(codes, vec!["ACM/Com/003", "ACM/Com/002", "ACM/Com/004"]);
    assert_eq!(
        table.dirty_fields(0).expect("row 0 exists"),
        vec![Field::SystemCode],
        "backfilled codes show as unsaved"
    );
    assert!(table.dirty_fields(1).expect("row 1 exists").is_empty());
}

#[test]
fn generate_no_reuses_matching_component_code() {
    let store = MemoryStore::with_rows(vec![
        product_row("S1", "Cap", "ACM/Bhiw/Com/001"),
        product_row("S1", "Lid", "ACM/Bhiw/Com/004"),
    ]);
    let mut table = open_table(TableKind::ProductCompliance, store);
    let idx = table.add_row();

    table.edit(idx, Field::SkuCode, "S1").expect("edit sku");
    table
        .edit(idx, Field::ComponentDescription, " Cap ")
        .expect("edit description");
    table.edit(idx, Field::Generate, "No").expect("edit generate");
    assert_eq!(table.rows()[idx].core.component_code, "ACM/Bhiw/Com/001");

    table
        .edit(idx, Field::ComponentDescription, "Seal")
        .expect("edit description");
    assert_eq!(
        table.rows()[idx].core.component_code,
        "ACM/Bhiw/Com/001",
        "description edits alone do not reassign the code"
    );

    table.edit(idx, Field::Generate, "No").expect("edit generate");
    assert_eq!(table.rows()[idx].core.component_code, "ACM/Bhiw/Com/005");

    table.edit(idx, Field::Generate, "Yes").expect("edit generate");
    assert_eq!(table.rows()[idx].core.component_code, "");
    assert_eq!(table.rows()[idx].core.generate, Some(YesNo::Yes));
}

#[test]
fn generate_supplier_code_reuses_or_allocates_per_supplier() {
    let store = MemoryStore::with_rows(vec![supplier_row("Polyfab Traders", "POL/ACM/001")]);
    let mut table = open_table(TableKind::SupplierCompliance, store);

    let same = table.add_row();
    table
        .edit(same, Field::SupplierName, "Polyfab Traders")
        .expect("edit supplier");
    table
        .edit(same, Field::GenerateSupplierCode, "No")
        .expect("edit flag");
    assert_eq!(table.rows()[same].core.supplier_code, "POL/ACM/001");

    let other = table.add_row();
    table
        .edit(other, Field::SupplierName, "Zenith Plastics")
        .expect("edit supplier");
    table
        .edit(other, Field::GenerateSupplierCode, "no")
        .expect("edit flag");
    assert_eq!(table.rows()[other].core.supplier_code, "ZEN/ACM/001");

    table
        .edit(other, Field::GenerateSupplierCode, "Yes")
        .expect("edit flag");
    assert_eq!(table.rows()[other].core.supplier_code, "");
}

#[test]
fn recycled_percent_is_normalized_on_commit() {
    let store = MemoryStore::with_rows(Vec::new());
    let mut table = open_table(TableKind::RecycledQuantity, store);
    let idx = table.add_row();

    table.edit(idx, Field::Uom, "KG").expect("edit uom");
    table
        .edit(idx, Field::AnnualConsumption, "2000")
        .expect("edit consumption");
    let detail = table.rows()[idx].recycled().expect("recycled row").clone();
    assert_eq!(detail.uom, Some(Uom::Kg));
    assert_eq!(detail.annual_consumption_mt, "2.000");
    assert_eq!(detail.used_recycled_qty_mt, "");

    table
        .edit(idx, Field::UsedRecycledPercent, "45")
        .expect("edit percent");
    let detail = table.rows()[idx].recycled().expect("recycled row").clone();
    assert_eq!(detail.used_recycled_percent, "45", "typing is left alone");
    assert_eq!(detail.used_recycled_qty_mt, "");

    table
        .commit(idx, Field::UsedRecycledPercent)
        .expect("commit percent");
    let detail = table.rows()[idx].recycled().expect("recycled row").clone();
    assert_eq!(detail.used_recycled_percent, "0.450");
    assert_eq!(detail.used_recycled_qty_mt, "0.900");

    for (typed, normalized, qty) in [("0.2", "0.200", "0.400"), ("0", "0.000", "0.000")] {
        table
            .edit(idx, Field::UsedRecycledPercent, typed)
            .expect("edit percent");
        table
            .commit(idx, Field::UsedRecycledPercent)
            .expect("commit percent");
        let detail = table.rows()[idx].recycled().expect("recycled row").clone();
        assert_eq!(detail.used_recycled_percent, normalized, "typed {typed}");
        assert_eq!(detail.used_recycled_qty_mt, qty, "typed {typed}");
    }
}

#[test]
fn consumption_converts_by_unit() {
    let store = MemoryStore::with_rows(Vec::new());
    let mut table = open_table(TableKind::RecycledQuantity, store);
    let idx = table.add_row();

    table
        .edit(idx, Field::AnnualConsumption, "10")
        .expect("edit consumption");
    assert_eq!(
        table.rows()[idx].recycled().expect("recycled row").annual_consumption_mt,
        "",
        "no unit chosen yet"
    );

    table.edit(idx, Field::Uom, "Units").expect("edit uom");
    table
        .edit(idx, Field::PerPieceWeight, "5")
        .expect("edit weight");
    assert_eq!(
        table.rows()[idx].recycled().expect("recycled row").annual_consumption_mt,
        "0.050"
    );

    table.edit(idx, Field::Uom, "MT").expect("edit uom");
    table
        .edit(idx, Field::AnnualConsumption, "3.5")
        .expect("edit consumption");
    assert_eq!(
        table.rows()[idx].recycled().expect("recycled row").annual_consumption_mt,
        "3.500"
    );

    table
        .edit(idx, Field::UsedRecycledPercent, "0.5")
        .expect("edit percent");
    table
        .edit(idx, Field::AnnualConsumption, "1,000")
        .expect("edit consumption");
    let detail = table.rows()[idx].recycled().expect("recycled row").clone();
    assert_eq!(detail.annual_consumption_mt, "1000.000");
    assert_eq!(detail.used_recycled_qty_mt, "500.000");
}

#[test]
fn not_applicable_unit_zeroes_quantities() {
    let store = MemoryStore::with_rows(Vec::new());
    let mut table = open_table(TableKind::RecycledQuantity, store);
    let idx = table.add_row();
    table.edit(idx, Field::Uom, "KG").expect("edit uom");
    table
        .edit(idx, Field::AnnualConsumption, "1500")
        .expect("edit consumption");
    table
        .edit(idx, Field::PerPieceWeight, "2")
        .expect("edit weight");
    table
        .edit(idx, Field::UsedRecycledPercent, "30")
        .expect("edit percent");

    table
        .edit(idx, Field::Uom, "Not Applicable")
        .expect("edit uom");

    let detail = table.rows()[idx].recycled().expect("recycled row").clone();
    assert_eq!(detail.uom, Some(Uom::NotApplicable));
    assert_eq!(detail.annual_consumption, "0");
    assert_eq!(detail.per_piece_weight, "0");
    assert_eq!(detail.used_recycled_percent, "0");
    assert_eq!(detail.annual_consumption_mt, "0.000");
    assert_eq!(detail.used_recycled_qty_mt, "0.000");
}

#[test]
fn editing_a_column_of_another_table_is_rejected() {
    let store = MemoryStore::with_rows(vec![product_row("S1", "Cap", "C-1")]);
    let mut table = open_table(TableKind::ProductCompliance, store);

    let err = table
        .edit(0, Field::Uom, "KG")
        .expect_err("product rows have no UOM column");

    assert_eq!(
        err,
        ValidationError::UnsupportedField {
            field: Field::Uom,
            kind: TableKind::ProductCompliance
        }
    );
    assert_eq!(
        table.edit(3, Field::SkuCode, "S9"),
        Err(ValidationError::RowOutOfRange { index: 3, len: 1 })
    );
}

#[test]
fn delete_row_keeps_order_and_respects_confirmation() {
    let rows: Vec<ComplianceRow> = ["A", "B", "C"]
        .iter()
        .enumerate()
        .map(|(idx, sku)| {
            let mut row = product_row(sku, "Cap", &format!("C-{idx}"));
            row.core.system_code = format!("ACM/Com/00{}", idx + 1);
            row
        })
        .collect();
    let store = MemoryStore::with_rows(rows);
    let mut table = open_table(TableKind::ProductCompliance, store.clone());

    let declined = table
        .delete_row(1, |_| false)
        .expect("row 1 exists");
    assert!(declined.is_none());
    assert_eq!(table.rows().len(), 3);

    let removed = table
        .delete_row(1, |row| row.core.sku_code == "B")
        .expect("row 1 exists")
        .expect("confirmed delete returns the row");
    assert_eq!(removed.core.sku_code, "B");

    let skus: Vec<&str> = table.rows().iter().map(|r| r.core.sku_code.as_str()).collect();
    assert_eq!(skus, vec!["A", "C"]);
    assert!(
        table.dirty_fields(1).expect("row 1 exists").is_empty(),
        "saved snapshots shift with their rows"
    );
    assert_eq!(store.calls(), vec!["load"], "deletes stay local");
}

#[test]
fn save_row_blocks_missing_required_fields_before_io() {
    let store = MemoryStore::with_rows(Vec::new());
    let mut table = open_table(TableKind::ProductCompliance, store.clone());
    let idx = table.add_row();
    table.edit(idx, Field::SkuCode, "S1").expect("edit sku");

    let err = table.save_row(idx).expect_err("component code is required");

    assert!(err.is_validation());
    assert!(matches!(
        err,
        ComplianceError::Validation(ValidationError::MissingField {
            row: 0,
            field: Field::ComponentCode
        })
    ));
    assert_eq!(err.to_string(), "row 1: Component Code is required");
    assert_eq!(store.calls(), vec!["load"]);
}

#[test]
fn supplier_rows_require_supplier_name() {
    let store = MemoryStore::with_rows(vec![supplier_row("", "")]);
    let mut table = open_table(TableKind::SupplierCompliance, store);

    let err = table.save_row(0).expect_err("supplier name is required");

    assert!(matches!(
        err,
        ComplianceError::Validation(ValidationError::MissingField {
            row: 0,
            field: Field::SupplierName
        })
    ));
}

#[test]
fn save_row_sends_json_and_reports_changes() {
    let store = MemoryStore::with_rows(Vec::new());
    let mut table = open_table(TableKind::ProductCompliance, store.clone());
    let idx = table.add_row();
    table.edit(idx, Field::SkuCode, "S1").expect("edit sku");
    table
        .edit(idx, Field::ComponentCode, "C-1")
        .expect("edit code");

    let outcome = table.save_row(idx).expect("save should succeed");

    assert_eq!(store.calls(), vec!["load", "save"]);
    assert_eq!(outcome.row.core.system_code, "ACM/Com/001");
    let mut fields: Vec<&str> = outcome.changes.iter().map(|c| c.field.as_str()).collect();
    fields.sort_unstable();
    assert_eq!(fields, vec!["componentCode", "skuCode", "systemCode"]);
    assert!(outcome.changes.iter().all(|c| c.user == "auditor" && c.prev.is_empty()));
    assert_eq!(table.rows()[idx], outcome.row);
    assert!(table.dirty_fields(idx).expect("row exists").is_empty());
    assert_eq!(store.stored(), vec![outcome.row]);
}

#[test]
fn transport_failure_leaves_row_unsaved() {
    let store = MemoryStore::with_rows(vec![product_row("S1", "Cap", "C-1")]);
    let mut table = open_table(TableKind::ProductCompliance, store.clone());
    table
        .edit(0, Field::ComponentDescription, "Cap v2")
        .expect("edit description");
    store.fail_with(StoreError::Status {
        status: 500,
        body: "boom".to_string(),
    });

    let err = table.save_row(0).expect_err("store rejects the save");

    assert!(matches!(
        err,
        ComplianceError::Transport(StoreError::Status { status: 500, .. })
    ));
    assert_eq!(table.rows()[0].core.component_description, "Cap v2");
    assert!(table
        .dirty_fields(0)
        .expect("row exists")
        .contains(&Field::ComponentDescription));
    assert_eq!(store.stored()[0].core.component_description, "Cap");
}

#[test]
fn rows_with_attachments_use_upload_path() {
    let store = MemoryStore::with_rows(vec![product_row("S1", "Cap", "C-1")]);
    let mut table = open_table(TableKind::ProductCompliance, store.clone());
    table
        .attach_image(0, ImageSlot::Product, "cap.png".to_string(), vec![1, 2, 3])
        .expect("attach image");
    assert!(table.rows()[0].has_attachments());
    assert_eq!(
        table.rows()[0].get(Field::ProductImage).as_deref(),
        Some("cap.png")
    );

    let outcome = table.save_row(0).expect("upload should succeed");

    assert_eq!(store.calls(), vec!["load", "upload"]);
    assert_eq!(
        outcome.row.image(ImageSlot::Product),
        Some(&ImageRef::Stored(
            "https://assets.example.test/cap.png".to_string()
        ))
    );
    assert!(!table.rows()[0].has_attachments());
}

#[test]
fn overlapping_row_saves_land_on_their_own_rows() {
    let store = MemoryStore::with_rows(vec![
        product_row("S1", "Cap", "ACM/Bhiw/Com/001"),
        product_row("S1", "Lid", "ACM/Bhiw/Com/002"),
        product_row("S2", "Seal", "ACM/Bhiw/Com/003"),
    ]);
    let mut table = open_table(TableKind::ProductCompliance, store);
    table.edit(1, Field::ComponentPolymer, "PP").expect("edit lid");
    table.edit(2, Field::ComponentPolymer, "HDPE").expect("edit seal");

    let (lid_ticket, lid_request) = table.prepare_save(1).expect("lid save issued");
    let (seal_ticket, seal_request) = table.prepare_save(2).expect("seal save issued");
    assert!(table.is_saving(1) && table.is_saving(2));
    assert!(!table.is_saving(0), "other rows stay free");
    let err = table.prepare_save(2).expect_err("one save per row at a time");
    assert!(matches!(
        err,
        ComplianceError::Validation(ValidationError::SaveInFlight { row: 2 })
    ));
    table.save_row(0).expect("an idle row saves meanwhile");

    let lid_result = lid_request.send();
    let seal_result = seal_request.send();

    // Cap is deleted and the seal edited again before either save returns.
    table.delete_row(0, |_| true).expect("delete cap");
    table.edit(1, Field::ComponentPolymer, "LDPE").expect("edit seal again");

    let seal = table
        .complete_save(seal_ticket, seal_result)
        .expect("seal saved");
    assert_eq!(seal.index, Some(1));
    assert_eq!(seal.row.get(Field::ComponentPolymer).as_deref(), Some("HDPE"));
    assert_eq!(
        table.rows()[1].get(Field::ComponentPolymer).as_deref(),
        Some("LDPE"),
        "edit made while saving is kept"
    );
    assert_eq!(
        table.dirty_fields(1).expect("seal row exists"),
        vec![Field::ComponentPolymer]
    );

    let lid = table.complete_save(lid_ticket, lid_result).expect("lid saved");
    assert_eq!(lid.index, Some(0));
    assert_eq!(table.rows()[0], lid.row);
    assert_eq!(table.rows()[0].core.component_description, "Lid");
    assert!(table.dirty_fields(0).expect("lid row exists").is_empty());
    assert!(!table.is_saving(0) && !table.is_saving(1));
}

#[test]
fn results_for_removed_rows_and_superseded_loads_are_dropped() {
    let store = MemoryStore::with_rows(vec![
        product_row("S1", "Cap", "ACM/Bhiw/Com/001"),
        product_row("S1", "Lid", "ACM/Bhiw/Com/002"),
    ]);
    let mut table = open_table(TableKind::ProductCompliance, store.clone());

    let (ticket, request) = table.prepare_save(0).expect("save issued");
    let result = request.send();
    table.delete_row(0, |_| true).expect("delete cap");
    let outcome = table.complete_save(ticket, result).expect("store accepted it");
    assert_eq!(outcome.index, None);
    assert_eq!(outcome.row.core.component_description, "Cap");
    assert_eq!(table.rows().len(), 1);
    assert_eq!(table.rows()[0].core.component_description, "Lid");

    let (stale, stale_request) = table.begin_load();
    let (fresh, fresh_request) = table.begin_load();
    let fresh_rows = fresh_request.send();
    store.put(5, &product_row("S9", "Late", "ACM/Bhiw/Com/009"));
    let stale_rows = stale_request.send();

    assert_eq!(table.finish_load(fresh, fresh_rows).expect("fresh load"), Some(2));
    assert_eq!(table.finish_load(stale, stale_rows).expect("stale is not an error"), None);
    assert_eq!(table.rows().len(), 2);
}

#[test]
fn save_all_rejects_pending_attachments_then_overwrites_table() {
    let store = MemoryStore::with_rows(vec![product_row("S1", "Cap", "C-1")]);
    let mut table = open_table(TableKind::ProductCompliance, store.clone());
    let idx = table.add_row();
    table
        .attach_image(idx, ImageSlot::Component, "lid.jpg".to_string(), vec![9])
        .expect("attach image");

    let err = table.save_all().expect_err("attachment is pending");
    assert!(matches!(
        err,
        ComplianceError::Validation(ValidationError::PendingAttachments { row: 1 })
    ));
    assert_eq!(store.calls(), vec!["load"]);

    table
        .clear_image(idx, ImageSlot::Component)
        .expect("clear image");
    let saved = table.save_all().expect("bulk save should succeed");

    assert_eq!(saved, 2);
    let stored = store.stored();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].core.system_code, "ACM/Com/001");
    assert_eq!(stored[1].core.system_code, "ACM/Com/002");
    assert!(table.dirty_fields(1).expect("row exists").is_empty());
}

#[test]
fn map_headers_prefers_specific_patterns() {
    let headers = [
        "Sku Code",
        "Annual Consumption (MT)",
        "annual consumption",
        "UOM",
        "Used Recycled %",
        "Used Recycled Qty (MT)",
        "Remarks",
    ];

    let mapping = map_headers(headers.iter().copied(), TableKind::RecycledQuantity);

    let find = |field: Field| {
        mapping
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, header)| header.as_str())
    };
    assert_eq!(find(Field::SkuCode), Some("Sku Code"));
    assert_eq!(find(Field::AnnualConsumptionMt), Some("Annual Consumption (MT)"));
    assert_eq!(find(Field::AnnualConsumption), Some("annual consumption"));
    assert_eq!(find(Field::Uom), Some("UOM"));
    assert_eq!(find(Field::UsedRecycledPercent), Some("Used Recycled %"));
    assert_eq!(find(Field::UsedRecycledQtyMt), Some("Used Recycled Qty (MT)"));
    assert_eq!(mapping.len(), 6);

    let product = map_headers(headers.iter().copied(), TableKind::ProductCompliance);
    assert!(product.iter().all(|(field, _)| *field != Field::Uom));
}

#[test]
fn reconcile_rejects_unrecognized_sheet() {
    let parsed = sheet(&["Foo", "Bar"], &[&["1", "2"]]);

    let err = reconcile(&parsed, &[], TableKind::ComponentDetails, &profile())
        .expect_err("nothing maps");

    assert_eq!(
        err,
        ValidationError::UnrecognizedSheet {
            kind: TableKind::ComponentDetails
        }
    );
    assert_eq!(
        reconcile(&[], &[], TableKind::ComponentDetails, &profile()),
        Ok(Vec::new())
    );
}

#[test]
fn reconcile_shares_codes_within_batch_and_allocates_fresh_system_codes() {
    let mut existing = product_row("S1", "Cap", "ACM/Bhiw/Com/001");
    existing.core.system_code = "ACM/Com/005".to_string();
    let existing = vec![existing];
    let parsed = sheet(
        &[
            "SKU Code",
            "Component Description",
            "Component Code",
            "Generate",
            "Supplier Name",
            "Supplier Code",
        ],
        &[
            &["S1", "Cap", "", "", "Polyfab Traders", ""],
            &["S1", "Lid", "", "No", "Polyfab Traders", ""],
            &["S1", "Lid", "", "", "", ""],
            &["", "", "", "", "", ""],
            &["S2", "Seal", "", "Yes", "", ""],
            &["S3", "Tube", "X-9", "", "", ""],
        ],
    );

    let built = reconcile(&parsed, &existing, TableKind::ProductCompliance, &profile())
        .expect("sheet should map");

    assert_eq!(built.len(), 5, "blank rows are skipped");
    let codes: Vec<(&str, &str, &str)> = built
        .iter()
        .map(|row| {
            (
                row.core.component_code.as_str(),
                row.core.supplier_code.as_str(),
                row.core.system_code.as_str(),
            )
        })
        .collect();
    assert_eq!(
        codes,
        vec![
            ("ACM/Bhiw/Com/001", "POL/ACM/001", "ACM/Com/006"),
            ("ACM/Bhiw/Com/002", "POL/ACM/001", "ACM/Com/007"),
            ("ACM/Bhiw/Com/002", "", "ACM/Com/008"),
            ("", "", "ACM/Com/009"),
            ("X-9", "", "ACM/Com/010"),
        ]
    );
    assert_eq!(built[3].core.generate, Some(YesNo::Yes));
    assert_eq!(existing.len(), 1);
}

#[test]
fn csv_export_then_import_into_empty_table_round_trips() {
    let temp_dir = unique_test_dir("csv-round-trip");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let csv_path = temp_dir.join("rows.csv");

    let mut first = product_row("S1", "Cap", "ACM/Bhiw/Com/001");
    first.core.generate = Some(YesNo::No);
    first.core.supplier_name = "Polyfab Traders".to_string();
    first.core.supplier_code = "POL/ACM/001".to_string();
    first.core.product_image = Some(ImageRef::Stored(
        "https://assets.example.test/cap.png".to_string(),
    ));
    first
        .set(Field::ComponentPolymer, "PP")
        .expect("product column");
    first.set(Field::Thickness, "40").expect("product column");
    let mut second = product_row("S2", "Seal, inner", "");
    second.core.generate = Some(YesNo::Yes);
    second.core.sku_description = "Bottle \"1L\"".to_string();

    let source = open_table(
        TableKind::ProductCompliance,
        MemoryStore::with_rows(vec![first, second]),
    );
    let exported = ImportService::export_file(&source, &csv_path).expect("export should succeed");
    assert_eq!(exported, 2);

    let mut imported = open_table(
        TableKind::ProductCompliance,
        MemoryStore::with_rows(Vec::new()),
    );
    let added = ImportService::import_file(&mut imported, &csv_path).expect("import should succeed");

    assert_eq!(added, 2);
    assert_eq!(imported.rows(), source.rows());

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn workbook_export_writes_a_named_sheet_that_imports_back() {
    let temp_dir = unique_test_dir("xlsx-round-trip");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let xlsx_path = temp_dir.join("rows.xlsx");

    let mut first = supplier_row("Polyfab Traders", "POL/ACM/001");
    first.core.sku_code = "S1".to_string();
    first.core.component_description = "Cap".to_string();
    let mut second = supplier_row("Lg Chem", "LG/ACM/001");
    second.core.sku_code = "S2".to_string();
    second.core.component_code = "ACM/Bhiw/Com/002".to_string();
    second.core.component_description = "Seal".to_string();

    let source = open_table(
        TableKind::SupplierCompliance,
        MemoryStore::with_rows(vec![first, second]),
    );
    let exported =
        ImportService::export_file(&source, &xlsx_path).expect("export should succeed");
    assert_eq!(exported, 2);

    let workbook: calamine::Xlsx<_> =
        calamine::open_workbook(&xlsx_path).expect("calamine should open the export");
    assert_eq!(workbook.sheet_names(), vec!["Supplier Compliance".to_string()]);

    let mut imported = open_table(
        TableKind::SupplierCompliance,
        MemoryStore::with_rows(Vec::new()),
    );
    let added =
        ImportService::import_file(&mut imported, &xlsx_path).expect("import should succeed");

    assert_eq!(added, 2);
    assert_eq!(imported.rows(), source.rows());

    let err = ImportService::export_file(&source, &temp_dir.join("rows.ods"))
        .expect_err("ods cannot be written");
    assert!(err.to_string().contains(".xlsx or .csv"));

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn import_rejects_unknown_file_types() {
    let mut table = open_table(
        TableKind::ProductCompliance,
        MemoryStore::with_rows(Vec::new()),
    );

    let err = ImportService::import_file(&mut table, &PathBuf::from("rows.txt"))
        .expect_err("txt is not a spreadsheet");

    assert!(err.to_string().contains("unsupported spreadsheet"));
    assert!(table.rows().is_empty());
}

#[test]
fn range_to_tabular_uses_first_row_as_header() {
    let mut range: Range<Data> = Range::new((0, 0), (2, 2));
    range.set_value((0, 0), Data::String("SKU Code".to_string()));
    range.set_value((0, 1), Data::String("Annual Consumption".to_string()));
    range.set_value((0, 2), Data::String("UOM".to_string()));
    range.set_value((1, 0), Data::String(" S1 ".to_string()));
    range.set_value((1, 1), Data::Float(2000.0));
    range.set_value((1, 2), Data::String("KG".to_string()));
    range.set_value((2, 1), Data::Float(12.5));

    let data = range_to_tabular(&range);

    assert_eq!(data.columns, vec!["SKU Code", "Annual Consumption", "UOM"]);
    assert_eq!(
        data.rows,
        vec![
            vec!["S1".to_string(), "2000".to_string(), "KG".to_string()],
            vec![String::new(), "12.5".to_string(), String::new()],
        ]
    );
}

#[test]
fn reduce_applies_events_to_a_copy() {
    let state = RowSet::new(TableKind::ComponentDetails);
    let state = reduce(state, RowEvent::AddRow, &profile()).expect("add row");
    let state = reduce(
        state,
        RowEvent::Edit {
            index: 0,
            field: Field::PolymerType,
            value: "HDPE".to_string(),
        },
        &profile(),
    )
    .expect("edit polymer");

    assert_eq!(state.len(), 1);
    assert_eq!(state.rows()[0].get(Field::PolymerType).as_deref(), Some("HDPE"));

    let err = reduce(state, RowEvent::DeleteRow { index: 4 }, &profile())
        .expect_err("row 4 does not exist");
    assert_eq!(err, ValidationError::RowOutOfRange { index: 4, len: 1 });
}

#[test]
fn report_groups_by_sku_and_skips_unreachable_images() {
    let mut cap = product_row("S1", "Cap", "C-1");
    cap.core.product_image = Some(ImageRef::Attached {
        file_name: "cap.png".to_string(),
        bytes: vec![0x89, b'P', b'N', b'G'],
    });
    let mut bottle = product_row("S2", "Bottle", "C-2");
    bottle.core.component_image = Some(ImageRef::Stored("https://cdn.example.test/b.png".to_string()));
    let mut lid = product_row("S1", "Lid", "C-3");
    lid.core.component_image = Some(ImageRef::Stored("https://cdn.example.test/b.png".to_string()));
    let loose = product_row("", "Label", "C-4");
    let rows = vec![cap, bottle, lid, loose];

    let report = build_report(
        &target(TableKind::ProductCompliance),
        &profile(),
        &rows,
        &OfflineImages,
    );

    let skus: Vec<&str> = report.sections.iter().map(|s| s.sku_code.as_str()).collect();
    assert_eq!(skus, vec!["S1", "S2", "Unassigned"]);
    assert_eq!(report.sections[0].components.rows.len(), 2);
    assert_eq!(report.sections[0].details.rows[0], vec!["SKU Code", "S1"]);
    let gallery: Vec<_> = report.sections[0].gallery.iter().flatten().collect();
    assert_eq!(gallery.len(), 1);
    assert_eq!(gallery[0].caption, "cap.png", "no SKU description to caption with");
    assert!(gallery[0].data_uri.starts_with("data:image/png;base64,"));
    assert_eq!(report.skipped_images.len(), 2, "one per SKU section");
    assert_eq!(report.skipped_images[0].sku_code, "S1");
    assert_eq!(report.skipped_images[1].sku_code, "S2");
    assert_eq!(report.client_name, "Acme Industries");
    assert_eq!(report.consent, "CTO");

    let html = render_report(&report).expect("report should render");
    assert!(html.contains("SKU S1"));
    assert!(html.contains("Unassigned"));
    assert!(html.contains(&gallery[0].data_uri));
}

#[test]
fn same_named_attachments_in_different_rows_are_all_embedded() {
    let photo = |bytes: Vec<u8>| ImageRef::Attached {
        file_name: "photo.png".to_string(),
        bytes,
    };
    let mut cap = product_row("S1", "Cap", "C-1");
    cap.core.component_image = Some(photo(vec![1, 1, 1]));
    let mut lid = product_row("S1", "Lid", "C-2");
    lid.core.component_image = Some(photo(vec![2, 2, 2]));
    lid.core.product_image = Some(photo(vec![3, 3, 3]));

    let report = build_report(
        &target(TableKind::ProductCompliance),
        &profile(),
        &[cap, lid],
        &OfflineImages,
    );

    let gallery: Vec<_> = report.sections[0].gallery.iter().flatten().collect();
    assert_eq!(gallery.len(), 3);
    let mut uris: Vec<&str> = gallery.iter().map(|image| image.data_uri.as_str()).collect();
    uris.dedup();
    assert_eq!(uris.len(), 3, "each attachment keeps its own bytes");
    assert!(report.skipped_images.is_empty());
}

#[test]
fn stale_history_results_are_dropped() {
    let store = MemoryStore::with_rows(Vec::new());
    let record = ChangeRecord {
        table: "product-compliance".to_string(),
        row: 0,
        at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
        user: "auditor".to_string(),
        field: "skuCode".to_string(),
        prev: String::new(),
        curr: "S1".to_string(),
    };
    store
        .history
        .lock()
        .expect("history lock")
        .push(record.clone());
    let mut table = open_table(TableKind::ProductCompliance, store);

    let first = table.begin_history_fetch();
    let second = table.begin_history_fetch();
    let applied = table
        .finish_history_fetch(first, Ok(vec![record.clone()]))
        .expect("stale result is not an error");
    assert!(!applied);
    assert!(table.history().is_empty());

    table.cancel_history_fetch();
    assert!(!table
        .finish_history_fetch(second, Ok(vec![record.clone()]))
        .expect("cancelled result is not an error"));

    let history = table.refresh_history().expect("history should load");
    assert_eq!(history, &[record]);
}

#[test]
fn sqlite_store_records_field_history() {
    let temp_dir = unique_test_dir("sqlite-history");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let repo = SqliteRepo::open(temp_dir.join("app.sqlite"), temp_dir.join("assets"))
        .expect("sqlite store should open");
    let table = target(TableKind::ProductCompliance);
    let context = SaveContext {
        user: "auditor".to_string(),
    };

    let mut row = product_row("S1", "Cap", "C-1");
    repo.save_row(&table, 0, &row, &context)
        .expect("first save should succeed");
    row.core.component_description = "Cap v2".to_string();
    repo.save_row(&table, 0, &row, &context)
        .expect("second save should succeed");

    assert_eq!(repo.load_rows(&table).expect("rows should load"), vec![row.clone()]);
    let history = repo.history(&table).expect("history should load");
    assert_eq!(history.len(), 4);
    let last = history.last().expect("history is not empty");
    assert_eq!(last.field, "componentDescription");
    assert_eq!(last.prev, "Cap");
    assert_eq!(last.curr, "Cap v2");
    assert_eq!(last.user, "auditor");

    let other_item = TableTarget {
        item_id: "item-2".to_string(),
        ..table.clone()
    };
    assert!(repo.load_rows(&other_item).expect("rows should load").is_empty());

    let replacement = product_row("S9", "Tube", "C-9");
    repo.save_all(&table, &[replacement.clone()], &context)
        .expect("bulk save should succeed");
    assert_eq!(
        repo.load_rows(&table).expect("rows should load"),
        vec![replacement]
    );

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn sqlite_upload_writes_assets_readable_by_fetcher() {
    let temp_dir = unique_test_dir("sqlite-upload");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let repo = Arc::new(
        SqliteRepo::open(temp_dir.join("app.sqlite"), temp_dir.join("assets"))
            .expect("sqlite store should open"),
    );

    let mut table = ComplianceTable::new(
        target(TableKind::ProductCompliance),
        profile(),
        "auditor",
        repo.clone(),
    );
    table.load().expect("empty table should load");
    let idx = table.add_row();
    table
        .edit(idx, Field::ComponentCode, "C-1")
        .expect("edit code");
    table
        .attach_image(idx, ImageSlot::Product, "front view.png".to_string(), vec![7, 7, 7])
        .expect("attach image");

    let outcome = table.save_row(idx).expect("upload should succeed");

    let reference = outcome
        .row
        .image(ImageSlot::Product)
        .and_then(ImageRef::stored_url)
        .expect("image is stored after upload")
        .to_string();
    assert!(reference.starts_with("file://"));
    assert!(reference.ends_with("front_view.png"));

    let mut reopened = ComplianceTable::new(
        target(TableKind::ProductCompliance),
        profile(),
        "auditor",
        repo,
    );
    reopened.load().expect("table should reload");
    assert_eq!(reopened.rows(), &[outcome.row.clone()]);

    let fetcher = ImageFetcher::new(Duration::from_secs(5)).expect("fetcher should build");
    let loaded = fetcher
        .load(&ImageRef::Stored(reference))
        .expect("stored asset should load");
    assert_eq!(loaded.content_type, "image/png");
    assert_eq!(loaded.bytes, vec![7, 7, 7]);

    let missing = fetcher.load(&ImageRef::Stored(
        temp_dir.join("missing.png").to_string_lossy().into_owned(),
    ));
    assert!(matches!(missing, Err(AssetError::Unreachable { .. })));

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn config_file_and_environment_overrides() {
    let temp_dir = unique_test_dir("config");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let path = temp_dir.join("config.toml");

    let missing = AppConfig::from_file(&path).expect("missing file yields defaults");
    assert_eq!(missing.store, StoreConfig::Sqlite { path: None });
    assert_eq!(missing.client_id, "local");

    fs::write(
        &path,
        r#"
client_id = "client-7"
client_name = "Acme Industries"
plant_name = "Bhiwandi"
consent = "CTE"
item_id = "plant-a"
table = "recycled-quantity"

[store]
kind = "http"
base_url = "https://api.example.test"
timeout_secs = 30
"#,
    )
    .expect("should write config");

    let config = AppConfig::from_file(&path).expect("config should parse");
    assert_eq!(
        config.store,
        StoreConfig::Http {
            base_url: "https://api.example.test".to_string(),
            timeout_secs: Some(30),
        }
    );
    let table = config.target();
    assert_eq!(table.kind, TableKind::RecycledQuantity);
    assert_eq!(
        table.storage_path(),
        "productionFacility.CTE.plant-a.recycledQuantityRows"
    );
    assert_eq!(config.profile(), profile());

    let local = config
        .clone()
        .apply_env(|key| (key == DB_PATH_ENV).then(|| "/tmp/other.sqlite".to_string()));
    assert_eq!(
        local.store,
        StoreConfig::Sqlite {
            path: Some(PathBuf::from("/tmp/other.sqlite"))
        }
    );
    let remote = AppConfig::default()
        .apply_env(|key| (key == API_URL_ENV).then(|| "https://other.example.test".to_string()));
    assert!(matches!(remote.store, StoreConfig::Http { ref base_url, .. } if base_url == "https://other.example.test"));

    fs::write(&path, "consent = 3").expect("should write config");
    assert!(AppConfig::from_file(&path).is_err());

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}
