//! Append-only audit log persistence.
//!
//! # Invariants
//! - Entries are only ever inserted inside the transaction of the mutation
//!   they describe; nothing updates or deletes them.
//! - `table_name IS NULL` marks system-level entries.

use crate::model::category::Category;
use crate::model::record::{AuditAction, AuditEntry, AuditFilter, RecordId};
use crate::repo::employee_repo::{StoreError, StoreResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction};

/// Audit row to be written; `id` is assigned by storage.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AuditRecord {
    pub category: Option<Category>,
    pub record_id: Option<RecordId>,
    pub action: AuditAction,
    pub subject: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: i64,
}

pub(crate) fn insert_audit(tx: &Transaction<'_>, record: &AuditRecord) -> StoreResult<i64> {
    tx.execute(
        "INSERT INTO audit_log (
            table_name,
            record_id,
            action,
            employee_name,
            changes,
            created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            record.category.map(Category::table),
            record.record_id,
            record.action.as_db(),
            record.subject.as_deref(),
            record.payload.to_string(),
            record.created_at,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

/// Returns the newest `limit` entries matching `filter`, newest first.
pub(crate) fn list_audit(
    conn: &Connection,
    filter: AuditFilter,
    limit: u32,
) -> StoreResult<Vec<AuditEntry>> {
    let mut sql = String::from(
        "SELECT id, table_name, record_id, action, employee_name, changes, created_at
         FROM audit_log",
    );
    let mut bind_values: Vec<Value> = Vec::new();

    match filter {
        AuditFilter::All => {}
        AuditFilter::Category(category) => {
            sql.push_str(" WHERE table_name = ?");
            bind_values.push(Value::Text(category.table().to_string()));
        }
        AuditFilter::System => sql.push_str(" WHERE table_name IS NULL"),
    }

    sql.push_str(" ORDER BY id DESC LIMIT ?");
    bind_values.push(Value::Integer(i64::from(limit)));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        entries.push(parse_audit_row(row)?);
    }
    Ok(entries)
}

fn parse_audit_row(row: &Row<'_>) -> StoreResult<AuditEntry> {
    let category = match row.get::<_, Option<String>>("table_name")? {
        Some(table) => Some(Category::from_table(&table).ok_or_else(|| {
            StoreError::InvalidData(format!("unknown table `{table}` in audit_log.table_name"))
        })?),
        None => None,
    };

    let action_text: String = row.get("action")?;
    let action = AuditAction::parse(&action_text).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid action `{action_text}` in audit_log.action"))
    })?;

    let changes: String = row.get("changes")?;
    let payload = serde_json::from_str(&changes).map_err(|err| {
        StoreError::InvalidData(format!("invalid json in audit_log.changes: {err}"))
    })?;

    Ok(AuditEntry {
        id: row.get("id")?,
        category,
        record_id: row.get("record_id")?,
        action,
        subject: row.get("employee_name")?,
        payload,
        created_at: row.get("created_at")?,
    })
}
