use std::time::Duration;

use dioxus::prelude::*;
use rfd::{FileDialog, MessageButtons, MessageDialog, MessageDialogResult, MessageLevel};

use crate::bootstrap;
use crate::domain::entities::row::{Field, ImageSlot, Uom, YesNo};
use crate::infra::assets::fetch::ImageFetcher;
use crate::infra::report::html::write_report;
use crate::platform::desktop::blocking::run_blocking;
use crate::ui::state::app_state::{AppState, CellView, HistoryLine, TableView};
use crate::usecase::services::import_service::ImportService;
use crate::usecase::ports::store::StoreError;
use crate::usecase::services::table_service::{ComplianceTable, SaveOutcome};

const DEFAULT_IMAGE_TIMEOUT_SECS: u64 = 15;
const HEADER_CELL_STYLE: &str = "position: sticky; top: 0; background: #e8eef7; border: 1px solid #bbb; padding: 4px 6px; white-space: nowrap; z-index: 1;";
const INPUT_STYLE: &str = "width: 100%; min-width: 90px; border: 1px solid #ccc; padding: 2px 4px; box-sizing: border-box;";

fn choice_options(field: Field) -> Option<Vec<&'static str>> {
    match field {
        Field::Generate | Field::GenerateSupplierCode => {
            Some(vec!["", YesNo::Yes.as_str(), YesNo::No.as_str()])
        }
        Field::Uom => Some(
            std::iter::once("")
                .chain(Uom::ALL.iter().map(|uom| uom.as_str()))
                .collect(),
        ),
        _ => None,
    }
}

fn cell_style(dirty: bool) -> &'static str {
    if dirty {
        "border: 1px solid #ddd; padding: 2px; background: #fff7d6;"
    } else {
        "border: 1px solid #ddd; padding: 2px;"
    }
}

#[component]
fn Cell(
    mut table: Signal<Option<ComplianceTable>>,
    mut status: Signal<String>,
    row_idx: usize,
    cell: CellView,
) -> Element {
    let field = cell.field;
    let style = cell_style(cell.dirty);
    let mut edit = move |value: String| {
        if let Some(current) = table.write().as_mut() {
            if let Err(err) = current.edit(row_idx, field, &value) {
                status.set(err.to_string());
            }
        }
    };

    if field.is_derived() {
        return rsx! {
            td { style: "{style} color: #555;", "{cell.value}" }
        };
    }

    if field.is_image() {
        let slot = if field == Field::ProductImage {
            ImageSlot::Product
        } else {
            ImageSlot::Component
        };
        let has_image = !cell.value.is_empty();
        return rsx! {
            td { style: "{style} white-space: nowrap;",
                span { style: "display: inline-block; max-width: 140px; overflow: hidden; text-overflow: ellipsis; vertical-align: middle;",
                    "{cell.value}"
                }
                button {
                    onclick: move |_| {
                        let Some(path) = FileDialog::new()
                            .add_filter("Image", &["png", "jpg", "jpeg", "gif", "webp"])
                            .pick_file() else {
                            return;
                        };
                        let bytes = match std::fs::read(&path) {
                            Ok(bytes) => bytes,
                            Err(err) => {
                                status.set(format!("Could not read image: {err}"));
                                return;
                            }
                        };
                        let file_name = path
                            .file_name()
                            .map(|name| name.to_string_lossy().into_owned())
                            .unwrap_or_else(|| "image".to_string());
                        if let Some(current) = table.write().as_mut() {
                            match current.attach_image(row_idx, slot, file_name, bytes) {
                                Ok(()) => status.set(format!("Image attached to row {}; save the row to upload it", row_idx + 1)),
                                Err(err) => status.set(err.to_string()),
                            }
                        }
                    },
                    "Attach"
                }
                if has_image {
                    button {
                        onclick: move |_| {
                            if let Some(current) = table.write().as_mut() {
                                if let Err(err) = current.clear_image(row_idx, slot) {
                                    status.set(err.to_string());
                                }
                            }
                        },
                        "×"
                    }
                }
            }
        };
    }

    if let Some(choices) = choice_options(field) {
        return rsx! {
            td { style: "{style}",
                select {
                    style: "{INPUT_STYLE}",
                    value: "{cell.value}",
                    onchange: move |event| edit(event.value()),
                    for choice in choices {
                        option { value: "{choice}", "{choice}" }
                    }
                }
            }
        };
    }

    rsx! {
        td { style: "{style}",
            input {
                style: "{INPUT_STYLE}",
                value: "{cell.value}",
                oninput: move |event| edit(event.value()),
                onblur: move |_| {
                    if let Some(current) = table.write().as_mut() {
                        if let Err(err) = current.commit(row_idx, field) {
                            status.set(err.to_string());
                        }
                    }
                },
            }
        }
    }
}

/// Worker failures (a panicked task) surface as transport errors.
fn worker_error<T>(err: anyhow::Error) -> Result<T, StoreError> {
    Err(StoreError::Message(format!("{err:#}")))
}

#[component]
fn RowActions(
    mut table: Signal<Option<ComplianceTable>>,
    mut status: Signal<String>,
    row_idx: usize,
    has_attachments: bool,
    saving: bool,
) -> Element {
    let save_label = if saving {
        "Saving…"
    } else if has_attachments {
        "Upload"
    } else {
        "Save"
    };
    rsx! {
        td { style: "border: 1px solid #ddd; padding: 2px; white-space: nowrap;",
            button {
                disabled: saving,
                onclick: move |_| {
                    let prepared = match table.write().as_mut() {
                        Some(current) => current.prepare_save(row_idx),
                        None => return,
                    };
                    let (ticket, request) = match prepared {
                        Ok(prepared) => prepared,
                        Err(err) => {
                            status.set(format!("Cannot save: {err}"));
                            return;
                        }
                    };
                    status.set(format!("Saving row {}", row_idx + 1));
                    spawn(async move {
                        let result = run_blocking(move || request.send())
                            .await
                            .unwrap_or_else(worker_error);
                        let outcome = table
                            .write()
                            .as_mut()
                            .map(|current| current.complete_save(ticket, result));
                        match outcome {
                            Some(Ok(SaveOutcome { index: Some(index), changes, .. })) => {
                                status.set(format!(
                                    "Saved row {} ({} field changes)",
                                    index + 1,
                                    changes.len()
                                ))
                            }
                            Some(Ok(_)) => status.set("Saved a row that has since been removed".to_string()),
                            Some(Err(err)) => status.set(format!("Save failed: {err}")),
                            None => {}
                        }
                    });
                },
                "{save_label}"
            }
            button {
                onclick: move |_| {
                    let result = table.write().as_mut().map(|current| {
                        current.delete_row(row_idx, |row| {
                            let label = if row.core.component_code.is_empty() {
                                format!("row {}", row_idx + 1)
                            } else {
                                format!("row {} ({})", row_idx + 1, row.core.component_code)
                            };
                            MessageDialog::new()
                                .set_level(MessageLevel::Warning)
                                .set_title("Delete row")
                                .set_description(format!(
                                    "Delete {label}? The stored table changes on the next Save All."
                                ))
                                .set_buttons(MessageButtons::YesNo)
                                .show()
                                == MessageDialogResult::Yes
                        })
                    });
                    match result {
                        Some(Ok(Some(_))) => status.set(format!("Deleted row {}", row_idx + 1)),
                        Some(Err(err)) => status.set(err.to_string()),
                        _ => {}
                    }
                },
                "Delete"
            }
        }
    }
}

#[component]
pub fn App() -> Element {
    let AppState {
        mut config,
        mut table,
        mut busy,
        mut status,
        mut show_history,
    } = AppState::new();

    use_effect(move || {
        busy.set(true);
        spawn(async move {
            match run_blocking(bootstrap).await.and_then(|loaded| loaded) {
                Ok((loaded_config, loaded_table)) => {
                    let row_count = loaded_table.rows().len();
                    config.set(Some(loaded_config));
                    table.set(Some(loaded_table));
                    status.set(format!("Loaded {row_count} rows"));
                }
                Err(err) => status.set(format!("Startup failed: {err:#}")),
            }
            busy.set(false);
        });
    });

    let view = table.read().as_ref().map(TableView::from_table);
    let has_table = view.is_some();
    let view = view.unwrap_or_default();
    let history_lines: Vec<HistoryLine> = view.history.iter().map(HistoryLine::from).collect();

    rsx! {
        div {
            style: "display: flex; flex-direction: column; height: 100vh; font-family: sans-serif; font-size: 13px;",
            nav {
                style: "display: flex; gap: 8px; align-items: center; flex-wrap: wrap; padding: 8px;",
                strong { "{view.title}" }
                button {
                    disabled: busy() || !has_table,
                    onclick: move |_| {
                        if let Some(current) = table.write().as_mut() {
                            let idx = current.add_row();
                            status.set(format!("Added row {}", idx + 1));
                        }
                    },
                    "Add Row"
                }
                button {
                    disabled: busy() || !has_table,
                    onclick: move |_| {
                        let prepared = match table.write().as_mut() {
                            Some(current) => current.prepare_save_all(),
                            None => return,
                        };
                        let (ticket, request) = match prepared {
                            Ok(prepared) => prepared,
                            Err(err) => {
                                status.set(format!("Cannot save all: {err}"));
                                return;
                            }
                        };
                        busy.set(true);
                        status.set("Saving all rows".to_string());
                        spawn(async move {
                            let result = run_blocking(move || request.send())
                                .await
                                .unwrap_or_else(worker_error);
                            let saved = table
                                .write()
                                .as_mut()
                                .map(|current| current.complete_save_all(ticket, result));
                            match saved {
                                Some(Ok(count)) => status.set(format!("Saved {count} rows")),
                                Some(Err(err)) => status.set(format!("Save all failed: {err}")),
                                None => {}
                            }
                            busy.set(false);
                        });
                    },
                    "Save All"
                }
                button {
                    disabled: busy() || !has_table,
                    onclick: move |_| {
                        let Some((ticket, request)) = table.write().as_mut().map(ComplianceTable::begin_load) else {
                            return;
                        };
                        busy.set(true);
                        spawn(async move {
                            let result = run_blocking(move || request.send())
                                .await
                                .unwrap_or_else(worker_error);
                            let loaded = table
                                .write()
                                .as_mut()
                                .map(|current| current.finish_load(ticket, result));
                            match loaded {
                                Some(Ok(Some(count))) => status.set(format!("Reloaded {count} rows")),
                                Some(Err(err)) => status.set(format!("Reload failed: {err}")),
                                _ => {}
                            }
                            busy.set(false);
                        });
                    },
                    "Reload"
                }
                button {
                    disabled: busy() || !has_table,
                    onclick: move |_| {
                        let Some(path) = FileDialog::new()
                            .add_filter("Spreadsheet", &["xlsx", "xls", "ods", "csv"])
                            .pick_file() else {
                            status.set("Import cancelled".to_string());
                            return;
                        };
                        busy.set(true);
                        status.set(format!("Importing {}", path.display()));
                        spawn(async move {
                            let sheet_path = path.clone();
                            let parsed = run_blocking(move || ImportService::read_sheet(&sheet_path))
                                .await
                                .and_then(|read| read);
                            let result = parsed.and_then(|data| match table.write().as_mut() {
                                Some(current) => ImportService::import_sheet(current, &path, &data),
                                None => Ok(0),
                            });
                            match result {
                                Ok(added) => status.set(format!("Imported {added} rows")),
                                Err(err) => status.set(format!("Import failed: {err:#}")),
                            }
                            busy.set(false);
                        });
                    },
                    "Import"
                }
                button {
                    disabled: busy() || !has_table,
                    onclick: move |_| {
                        let Some(path) = FileDialog::new()
                            .add_filter("Excel workbook", &["xlsx"])
                            .add_filter("CSV", &["csv"])
                            .set_file_name("compliance.xlsx")
                            .save_file() else {
                            return;
                        };
                        let Some((sheet, data)) = table
                            .read()
                            .as_ref()
                            .map(|current| (current.kind().label(), current.export_rows())) else {
                            return;
                        };
                        spawn(async move {
                            let sheet_path = path.clone();
                            let result = run_blocking(move || ImportService::write_sheet(&sheet_path, sheet, &data))
                                .await
                                .and_then(|written| written);
                            match result {
                                Ok(count) => status.set(format!("Exported {count} rows to {}", path.display())),
                                Err(err) => status.set(format!("Export failed: {err:#}")),
                            }
                        });
                    },
                    "Export"
                }
                button {
                    disabled: busy() || !has_table,
                    onclick: move |_| {
                        let Some(path) = FileDialog::new()
                            .add_filter("HTML", &["html"])
                            .set_file_name("audit-report.html")
                            .save_file() else {
                            return;
                        };
                        let Some(request) = table.read().as_ref().map(ComplianceTable::report_request) else {
                            return;
                        };
                        let timeout = config
                            .read()
                            .as_ref()
                            .map(|current| current.image_timeout_secs)
                            .unwrap_or(DEFAULT_IMAGE_TIMEOUT_SECS);
                        busy.set(true);
                        status.set("Building audit report".to_string());
                        spawn(async move {
                            let report_path = path.clone();
                            let result = run_blocking(move || -> anyhow::Result<usize> {
                                let fetcher = ImageFetcher::new(Duration::from_secs(timeout))?;
                                let report = request.build(&fetcher);
                                write_report(&report, &report_path)?;
                                Ok(report.skipped_images.len())
                            })
                            .await
                            .and_then(|written| written);
                            match result {
                                Ok(0) => status.set(format!("Report written to {}", path.display())),
                                Ok(skipped) => status.set(format!(
                                    "Report written to {} ({skipped} images skipped)",
                                    path.display()
                                )),
                                Err(err) => status.set(format!("Report failed: {err:#}")),
                            }
                            busy.set(false);
                        });
                    },
                    "Audit Report"
                }
                button {
                    disabled: !has_table,
                    onclick: move |_| {
                        let open = !show_history();
                        show_history.set(open);
                        if !open {
                            if let Some(current) = table.write().as_mut() {
                                current.cancel_history_fetch();
                            }
                            return;
                        }
                        let request = table
                            .write()
                            .as_mut()
                            .map(|current| (current.begin_history_fetch(), current.history_request()));
                        let Some((ticket, request)) = request else {
                            return;
                        };
                        spawn(async move {
                            let result = run_blocking(move || request.send())
                                .await
                                .unwrap_or_else(worker_error);
                            let applied = table
                                .write()
                                .as_mut()
                                .map(|current| current.finish_history_fetch(ticket, result));
                            if let Some(Err(err)) = applied {
                                status.set(format!("History failed: {err}"));
                            }
                        });
                    },
                    if show_history() { "Hide History" } else { "History" }
                }
                span { style: "color: #444;", " {status}" }
            }

            div {
                style: "flex: 1; overflow: auto; padding: 0 8px 8px;",
                table {
                    style: "border-collapse: collapse;",
                    thead {
                        tr {
                            th { style: "{HEADER_CELL_STYLE}", "#" }
                            for label in view.columns.iter().map(|field| field.label()) {
                                th { style: "{HEADER_CELL_STYLE}", "{label}" }
                            }
                            th { style: "{HEADER_CELL_STYLE}", "" }
                        }
                    }
                    tbody {
                        for (row_idx, row) in view.rows.iter().cloned().enumerate() {
                            tr { key: "{row.id}",
                                td { style: "border: 1px solid #ddd; padding: 2px 6px; color: #777;", "{row.number}" }
                                for cell in row.cells.iter().cloned() {
                                    Cell { table, status, row_idx, cell }
                                }
                                RowActions {
                                    table,
                                    status,
                                    row_idx,
                                    has_attachments: row.has_attachments,
                                    saving: row.saving,
                                }
                            }
                        }
                    }
                }
            }

            if show_history() {
                div {
                    style: "max-height: 30vh; overflow: auto; border-top: 1px solid #bbb; padding: 8px;",
                    if view.history.is_empty() {
                        p { "No recorded changes" }
                    }
                    for entry in history_lines.iter().cloned() {
                        div {
                            "{entry.summary}: "
                            span { style: "color: #a33; text-decoration: line-through;", "{entry.prev}" }
                            " → "
                            span { style: "color: #282;", "{entry.curr}" }
                        }
                    }
                }
            }
        }
    }
}
