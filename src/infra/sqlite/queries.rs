use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};

use crate::domain::entities::history::{diff_rows, ChangeRecord};
use crate::domain::entities::row::ComplianceRow;
use crate::domain::entities::table::{TableKind, TableTarget};
use crate::infra::sqlite::schema::open_connection;

fn row_body(row: &ComplianceRow) -> Result<String> {
    serde_json::to_string(&row.to_json()).context("failed to serialize row")
}

fn parse_body(kind: TableKind, body: &str) -> Result<ComplianceRow> {
    let value: serde_json::Value =
        serde_json::from_str(body).context("failed to parse stored row")?;
    Ok(ComplianceRow::from_json(kind, &value))
}

pub fn load_rows(db_path: &Path, target: &TableTarget) -> Result<Vec<ComplianceRow>> {
    let conn = open_connection(db_path)?;
    let mut stmt = conn
        .prepare(
            "SELECT body
             FROM compliance_row
             WHERE client_id = ?1 AND consent = ?2 AND item_id = ?3 AND table_kind = ?4
             ORDER BY row_idx ASC",
        )
        .context("failed to prepare row query")?;

    let bodies = stmt
        .query_map(
            params![
                target.client_id,
                target.consent.as_str(),
                target.item_id,
                target.kind.slug()
            ],
            |row| row.get::<_, String>(0),
        )
        .context("failed to query rows")?;

    let mut rows = Vec::new();
    for body in bodies {
        let body = body.context("failed to read stored row")?;
        rows.push(parse_body(target.kind, &body)?);
    }
    Ok(rows)
}

fn stored_row(
    tx: &Transaction<'_>,
    target: &TableTarget,
    row_idx: usize,
) -> Result<Option<ComplianceRow>> {
    let body: Option<String> = tx
        .query_row(
            "SELECT body FROM compliance_row
             WHERE client_id = ?1 AND consent = ?2 AND item_id = ?3 AND table_kind = ?4
               AND row_idx = ?5",
            params![
                target.client_id,
                target.consent.as_str(),
                target.item_id,
                target.kind.slug(),
                row_idx as i64
            ],
            |row| row.get(0),
        )
        .optional()
        .context("failed to read previous row")?;
    body.map(|body| parse_body(target.kind, &body)).transpose()
}

fn record_changes(
    tx: &Transaction<'_>,
    target: &TableTarget,
    changes: &[ChangeRecord],
) -> Result<()> {
    let mut insert = tx
        .prepare(
            "INSERT INTO change_history
                (client_id, consent, item_id, table_kind, row_idx, at, user, field, prev, curr)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .context("failed to prepare history insert")?;
    for change in changes {
        insert
            .execute(params![
                target.client_id,
                target.consent.as_str(),
                target.item_id,
                change.table,
                change.row as i64,
                change.at.to_rfc3339(),
                change.user,
                change.field,
                change.prev,
                change.curr
            ])
            .context("failed to insert history record")?;
    }
    Ok(())
}

fn write_row(
    tx: &Transaction<'_>,
    target: &TableTarget,
    row_idx: usize,
    row: &ComplianceRow,
) -> Result<()> {
    tx.execute(
        "INSERT INTO compliance_row (client_id, consent, item_id, table_kind, row_idx, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (client_id, consent, item_id, table_kind, row_idx)
         DO UPDATE SET body = excluded.body, updated_at = CURRENT_TIMESTAMP",
        params![
            target.client_id,
            target.consent.as_str(),
            target.item_id,
            target.kind.slug(),
            row_idx as i64,
            row_body(row)?
        ],
    )
    .context("failed to upsert row")?;
    Ok(())
}

/// Stores one row and appends a history record per changed field.
pub fn upsert_row(
    db_path: &Path,
    target: &TableTarget,
    row_idx: usize,
    row: &ComplianceRow,
    user: &str,
) -> Result<Vec<ChangeRecord>> {
    let mut conn = open_connection(db_path)?;
    let tx = conn.transaction().context("failed to start row transaction")?;

    let previous = stored_row(&tx, target, row_idx)?;
    let changes = diff_rows(
        target.kind,
        row_idx,
        previous.as_ref(),
        row,
        user,
        Utc::now(),
    );
    write_row(&tx, target, row_idx, row)?;
    record_changes(&tx, target, &changes)?;

    tx.commit().context("failed to commit row")?;
    Ok(changes)
}

/// Replaces every row of the table, recording differences index by index.
pub fn replace_rows(
    db_path: &Path,
    target: &TableTarget,
    rows: &[ComplianceRow],
    user: &str,
) -> Result<()> {
    let mut conn = open_connection(db_path)?;
    let tx = conn
        .transaction()
        .context("failed to start bulk save transaction")?;
    let at = Utc::now();

    let mut changes = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        let previous = stored_row(&tx, target, idx)?;
        changes.extend(diff_rows(target.kind, idx, previous.as_ref(), row, user, at));
    }

    tx.execute(
        "DELETE FROM compliance_row
         WHERE client_id = ?1 AND consent = ?2 AND item_id = ?3 AND table_kind = ?4",
        params![
            target.client_id,
            target.consent.as_str(),
            target.item_id,
            target.kind.slug()
        ],
    )
    .context("failed to clear table rows")?;
    for (idx, row) in rows.iter().enumerate() {
        write_row(&tx, target, idx, row)?;
    }
    record_changes(&tx, target, &changes)?;

    tx.commit().context("failed to commit bulk save")?;
    Ok(())
}

pub fn load_history(db_path: &Path, target: &TableTarget) -> Result<Vec<ChangeRecord>> {
    let conn = open_connection(db_path)?;
    let mut stmt = conn
        .prepare(
            "SELECT table_kind, row_idx, at, user, field, prev, curr
             FROM change_history
             WHERE client_id = ?1 AND consent = ?2 AND item_id = ?3
             ORDER BY id ASC",
        )
        .context("failed to prepare history query")?;

    let records = stmt
        .query_map(
            params![target.client_id, target.consent.as_str(), target.item_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .context("failed to query history")?;

    let mut history = Vec::new();
    for record in records {
        let (table, row, at, user, field, prev, curr) =
            record.context("failed to read history record")?;
        let at = DateTime::parse_from_rfc3339(&at)
            .with_context(|| format!("invalid history timestamp: {at}"))?
            .with_timezone(&Utc);
        history.push(ChangeRecord {
            table,
            row: row.max(0) as usize,
            at,
            user,
            field,
            prev,
            curr,
        });
    }
    Ok(history)
}
