//! Record/audit table definitions and additive migration.
//!
//! # Responsibility
//! - Create the three category tables and the audit table when absent.
//! - Add any column the current definition has but an existing table lacks.
//!
//! # Invariants
//! - `initialize` is idempotent and safe to call on every process start.
//! - Existing columns are never dropped or renamed; added columns default to
//!   `NULL`.
//! - Applied schema version is mirrored to `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use crate::model::category::{quote_column, Category};
use log::info;
use rusqlite::{Connection, Transaction, TransactionBehavior};

pub const AUDIT_TABLE: &str = "audit_log";
pub const COL_ID: &str = "id";
pub const COL_UPDATED_AT: &str = "updated_at";
pub const COL_DELETED_AT: &str = "deleted_at";

/// Version 1 stored the category tables only; version 2 added soft delete
/// and the audit table.
const SCHEMA_VERSION: u32 = 2;

/// System columns every category table carries besides `id`, with their
/// declared types.
const SYSTEM_COLUMNS: &[(&str, &str)] = &[(COL_UPDATED_AT, "INTEGER"), (COL_DELETED_AT, "INTEGER")];

const AUDIT_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT,
    record_id INTEGER,
    action TEXT NOT NULL,
    employee_name TEXT,
    changes TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_log_table ON audit_log (table_name, id);";

/// Returns the latest schema version known by this binary.
pub fn latest_version() -> u32 {
    SCHEMA_VERSION
}

/// Creates missing tables and columns, then stamps the schema version.
pub fn initialize(conn: &mut Connection) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    if current_version > SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: SCHEMA_VERSION,
        });
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut added_columns = 0usize;
    for category in Category::ALL {
        tx.execute_batch(&create_table_sql(category))?;
        added_columns += add_missing_columns(&tx, category)?;
    }
    tx.execute_batch(AUDIT_TABLE_SQL)?;
    tx.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
    tx.commit()?;

    info!(
        "event=schema_init module=db status=ok from_version={} to_version={} added_columns={}",
        current_version, SCHEMA_VERSION, added_columns
    );
    Ok(())
}

/// Lists a table's live column names in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(columns)
}

fn create_table_sql(category: Category) -> String {
    let data_columns = category
        .columns()
        .iter()
        .map(|column| format!("{} TEXT", quote_column(column)))
        .collect::<Vec<_>>()
        .join(",\n    ");
    let system_columns = SYSTEM_COLUMNS
        .iter()
        .map(|(column, kind)| format!("{column} {kind}"))
        .collect::<Vec<_>>()
        .join(",\n    ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
    {COL_ID} INTEGER PRIMARY KEY AUTOINCREMENT,
    {data_columns},
    {system_columns}
);",
        category.table()
    )
}

fn add_missing_columns(tx: &Transaction<'_>, category: Category) -> DbResult<usize> {
    let existing = table_columns(tx, category.table())?;
    let wanted = category
        .columns()
        .iter()
        .map(|column| (*column, "TEXT"))
        .chain(SYSTEM_COLUMNS.iter().copied());

    let mut added = 0usize;
    for (column, kind) in wanted {
        if existing.iter().any(|present| present == column) {
            continue;
        }
        tx.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {} {kind};",
            category.table(),
            quote_column(column)
        ))?;
        info!(
            "event=schema_add_column module=db status=ok table={} column={}",
            category.table(),
            column
        );
        added += 1;
    }
    Ok(added)
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
