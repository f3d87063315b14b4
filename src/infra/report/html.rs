use std::path::Path;

use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde_json::json;

use crate::usecase::services::report_service::{AuditReport, GALLERY_COLUMNS};

const REPORT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{{report.table}} audit report - {{report.client_name}}</title>
<style>
  body { font-family: sans-serif; font-size: 12px; margin: 24px; }
  h1 { font-size: 18px; margin-bottom: 4px; }
  h2 { font-size: 15px; margin-top: 28px; page-break-before: always; }
  h2:first-of-type { page-break-before: auto; }
  table.grid { border-collapse: collapse; width: 100%; margin: 8px 0 16px; }
  table.grid th, table.grid td { border: 1px solid #888; padding: 4px 6px; text-align: left; }
  table.grid th { background: #e8eef7; }
  table.gallery { width: 100%; table-layout: fixed; }
  table.gallery td { width: {{column_width}}%; text-align: center; vertical-align: top; padding: 6px; }
  table.gallery img { max-width: 100%; max-height: 200px; }
  .meta { color: #555; }
</style>
</head>
<body>
<h1>{{report.table}} audit report</h1>
<div class="meta">{{report.client_name}} / {{report.plant_name}} / {{report.consent}} {{report.item_id}} / generated {{report.generated_at}}</div>
{{#each report.sections}}
<h2>SKU {{this.sku_code}}</h2>
<table class="grid">
  <tr>{{#each this.details.headers}}<th>{{this}}</th>{{/each}}</tr>
  {{#each this.details.rows}}<tr>{{#each this}}<td>{{this}}</td>{{/each}}</tr>{{/each}}
</table>
<table class="grid">
  <tr>{{#each this.components.headers}}<th>{{this}}</th>{{/each}}</tr>
  {{#each this.components.rows}}<tr>{{#each this}}<td>{{this}}</td>{{/each}}</tr>{{/each}}
</table>
{{#if this.gallery}}
<table class="gallery">
  {{#each this.gallery}}<tr>{{#each this}}<td><img src="{{{this.data_uri}}}"><div>{{this.caption}}</div></td>{{/each}}</tr>{{/each}}
</table>
{{/if}}
{{/each}}
</body>
</html>
"#;

pub fn render_report(report: &AuditReport) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars
        .register_template_string("report", REPORT_TEMPLATE)
        .context("failed to register report template")?;
    let data = json!({
        "report": report,
        "column_width": 100 / GALLERY_COLUMNS,
    });
    handlebars
        .render("report", &data)
        .context("failed to render report")
}

pub fn write_report(report: &AuditReport, path: &Path) -> Result<()> {
    let html = render_report(report)?;
    std::fs::write(path, html)
        .with_context(|| format!("failed to write report: {}", path.display()))
}
