use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn open_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("failed to open db: {}", db_path.display()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("failed to enable foreign key enforcement")?;
    Ok(conn)
}

pub fn init_db(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent dir: {}", parent.display()))?;
    }

    let conn = open_connection(db_path)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS compliance_row (
            client_id   TEXT NOT NULL,
            consent     TEXT NOT NULL,
            item_id     TEXT NOT NULL,
            table_kind  TEXT NOT NULL,
            row_idx     INTEGER NOT NULL,
            body        TEXT NOT NULL,
            updated_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (client_id, consent, item_id, table_kind, row_idx)
        );

        CREATE TABLE IF NOT EXISTS change_history (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            client_id   TEXT NOT NULL,
            consent     TEXT NOT NULL,
            item_id     TEXT NOT NULL,
            table_kind  TEXT NOT NULL,
            row_idx     INTEGER NOT NULL,
            at          TEXT NOT NULL,
            user        TEXT NOT NULL,
            field       TEXT NOT NULL,
            prev        TEXT NOT NULL,
            curr        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_history_target
            ON change_history(client_id, consent, item_id, id);
        ",
    )
    .context("failed to initialize schema")?;

    Ok(())
}
