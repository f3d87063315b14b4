use std::time::Duration;

use reqwest::blocking::{multipart, Client, Response};
use serde_json::{json, Value};
use tracing::debug;

use crate::domain::entities::history::ChangeRecord;
use crate::domain::entities::row::{ComplianceRow, Field, ImageRef, ImageSlot};
use crate::domain::entities::table::TableTarget;
use crate::usecase::ports::assets::content_type_for;
use crate::usecase::ports::store::{ComplianceStore, SaveContext, StoreError};

/// Store backed by the compliance web API.
pub struct HttpStore {
    base_url: String,
    client: Client,
}

impl HttpStore {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, StoreError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| StoreError::Request(err.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn client_url(&self, target: &TableTarget, suffix: &str) -> String {
        format!("{}/api/client/{}{}", self.base_url, target.client_id, suffix)
    }
}

fn request_error(err: reqwest::Error) -> StoreError {
    StoreError::Request(err.to_string())
}

fn read_json(response: Response) -> Result<Value, StoreError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(StoreError::Status {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<Value>()
        .map_err(|err| StoreError::Decode(err.to_string()))
}

/// Responses are either the payload itself or wrapped in `data`.
fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut object) if object.contains_key("data") => {
            object.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// The stored row echoed by the server. Acknowledgements that carry no row
/// (`{"success":true}`) leave the outgoing row as the saved version.
fn saved_row(
    target: &TableTarget,
    value: Value,
    outgoing: &ComplianceRow,
) -> Result<ComplianceRow, StoreError> {
    let value = unwrap_data(value);
    if let Some(row) = value.get("row") {
        if !row.is_object() {
            return Err(StoreError::Decode("saved row is not an object".to_string()));
        }
        return Ok(ComplianceRow::from_json(target.kind, row));
    }
    let Some(object) = value.as_object() else {
        return Err(StoreError::Decode("saved row is not an object".to_string()));
    };
    let carries_row = object
        .keys()
        .filter_map(|key| Field::from_key(key))
        .any(|field| target.kind.has_field(field));
    if carries_row {
        Ok(ComplianceRow::from_json(target.kind, &value))
    } else {
        Ok(outgoing.clone())
    }
}

fn rows_at_path(document: &Value, target: &TableTarget) -> Vec<ComplianceRow> {
    let segments = [
        "productionFacility",
        target.consent.as_str(),
        target.item_id.as_str(),
        target.kind.storage_field(),
    ];
    let mut node = document;
    for segment in segments {
        match node.get(segment) {
            Some(next) => node = next,
            None => return Vec::new(),
        }
    }
    node.as_array()
        .map(|rows| {
            rows.iter()
                .map(|row| ComplianceRow::from_json(target.kind, row))
                .collect()
        })
        .unwrap_or_default()
}

fn history_records(value: Value) -> Result<Vec<ChangeRecord>, StoreError> {
    let records = match unwrap_data(value) {
        Value::Object(mut object) => object.remove("history").unwrap_or(Value::Null),
        other => other,
    };
    serde_json::from_value(records).map_err(|err| StoreError::Decode(err.to_string()))
}

impl ComplianceStore for HttpStore {
    fn load_rows(&self, target: &TableTarget) -> Result<Vec<ComplianceRow>, StoreError> {
        let response = self
            .client
            .get(self.client_url(target, ""))
            .send()
            .map_err(request_error)?;
        let document = unwrap_data(read_json(response)?);
        Ok(rows_at_path(&document, target))
    }

    fn save_row(
        &self,
        target: &TableTarget,
        row_index: usize,
        row: &ComplianceRow,
        _context: &SaveContext,
    ) -> Result<ComplianceRow, StoreError> {
        let body = json!({
            "type": target.consent.as_str(),
            "itemId": target.item_id,
            "rowIndex": row_index,
            "row": row.to_json(),
        });
        debug!(row_index, "posting compliance row");
        let response = self
            .client
            .post(self.client_url(target, "/product-compliance"))
            .json(&body)
            .send()
            .map_err(request_error)?;
        saved_row(target, read_json(response)?, row)
    }

    fn upload_row(
        &self,
        target: &TableTarget,
        row_index: usize,
        row: &ComplianceRow,
        _context: &SaveContext,
    ) -> Result<ComplianceRow, StoreError> {
        let row_json = serde_json::to_string(&row.to_json())
            .map_err(|err| StoreError::Message(err.to_string()))?;
        let mut form = multipart::Form::new()
            .text("type", target.consent.as_str().to_string())
            .text("itemId", target.item_id.clone())
            .text("rowIndex", row_index.to_string())
            .text("row", row_json);

        for slot in [ImageSlot::Product, ImageSlot::Component] {
            let Some(ImageRef::Attached { file_name, bytes }) = row.image(slot) else {
                continue;
            };
            let mime = content_type_for(file_name).unwrap_or("application/octet-stream");
            let part = multipart::Part::bytes(bytes.clone())
                .file_name(file_name.clone())
                .mime_str(mime)
                .map_err(request_error)?;
            form = form.part(slot.field().key(), part);
        }

        debug!(row_index, "uploading compliance row");
        let response = self
            .client
            .post(self.client_url(target, "/product-compliance/upload-row"))
            .multipart(form)
            .send()
            .map_err(request_error)?;
        saved_row(target, read_json(response)?, row)
    }

    fn save_all(
        &self,
        target: &TableTarget,
        rows: &[ComplianceRow],
        _context: &SaveContext,
    ) -> Result<(), StoreError> {
        let rows: Vec<Value> = rows.iter().map(ComplianceRow::to_json).collect();
        let mut body = serde_json::Map::new();
        body.insert(target.storage_path(), Value::Array(rows));
        let response = self
            .client
            .put(self.client_url(target, ""))
            .json(&Value::Object(body))
            .send()
            .map_err(request_error)?;
        read_json(response).map(|_| ())
    }

    fn history(&self, target: &TableTarget) -> Result<Vec<ChangeRecord>, StoreError> {
        let response = self
            .client
            .get(self.client_url(target, "/product-compliance-history"))
            .query(&[
                ("type", target.consent.as_str()),
                ("itemId", target.item_id.as_str()),
            ])
            .send()
            .map_err(request_error)?;
        history_records(read_json(response)?)
    }
}
