//! Ordered schema steps, tracked in `PRAGMA user_version`.
//!
//! Steps are additive and each runs in its own transaction. Column
//! additions consult `PRAGMA table_info` first, so a database created
//! before versioning existed (user_version 0, columns possibly present)
//! upgrades in place without losing rows.

use rusqlite::{Connection, Result};

pub(crate) const TABLE: &str = "glibc_versions";

pub(crate) struct Migration {
    pub name: &'static str,
    apply: fn(&Connection) -> Result<()>,
}

pub(crate) const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "create glibc_versions",
        apply: create_base_table,
    },
    Migration {
        name: "add debug_path",
        apply: add_debug_path,
    },
    Migration {
        name: "add source_path",
        apply: add_source_path,
    },
];

fn create_base_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS glibc_versions (
            version TEXT PRIMARY KEY,
            libc_path TEXT NOT NULL,
            interpreter_path TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        ",
    )
}

fn add_debug_path(conn: &Connection) -> Result<()> {
    add_column_if_missing(conn, "debug_path", "TEXT")
}

fn add_source_path(conn: &Connection) -> Result<()> {
    add_column_if_missing(conn, "source_path", "TEXT")
}

fn add_column_if_missing(conn: &Connection, column: &str, decl: &str) -> Result<()> {
    if columns(conn)?.iter().any(|c| c == column) {
        return Ok(());
    }
    conn.execute_batch(&format!("ALTER TABLE {TABLE} ADD COLUMN {column} {decl}"))
}

pub(crate) fn columns(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({TABLE})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    names.collect()
}

pub(crate) fn schema_version(conn: &Connection) -> Result<usize> {
    conn.pragma_query_value(None, "user_version", |row| row.get::<_, i64>(0))
        .map(|v| usize::try_from(v).unwrap_or(0))
}

/// Bring the schema up to date. Returns the number of steps applied.
pub(crate) fn apply(conn: &mut Connection) -> Result<usize> {
    let current = schema_version(conn)?;
    let mut applied = 0;

    for (index, step) in MIGRATIONS.iter().enumerate().skip(current) {
        let tx = conn.transaction()?;
        (step.apply)(&tx)?;
        tx.pragma_update(None, "user_version", (index + 1) as i64)?;
        tx.commit()?;
        tracing::debug!("applied migration {}: {}", index + 1, step.name);
        applied += 1;
    }

    Ok(applied)
}
