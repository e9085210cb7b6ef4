//! Employee record store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD, soft delete, restore and hard delete over the three
//!   category tables.
//! - Pair every successful mutation with exactly one audit entry written in
//!   the same transaction.
//!
//! # Invariants
//! - Every write path normalizes input through `normalize_known` first.
//! - Each operation opens its own connection and releases it on return.
//! - Soft-deleted rows are hidden from default reads but stay addressable by id.
//! - Failed or no-op mutations write no audit entry.

use crate::config::StoreConfig;
use crate::db::schema::{COL_DELETED_AT, COL_ID, COL_UPDATED_AT};
use crate::db::{connect, open_db, DbError};
use crate::model::category::{quote_column, Category, COL_EMPLOYEE_NO, COL_KANA, COL_NAME};
use crate::model::cell::CellValue;
use crate::model::record::{AuditAction, EmployeeRecord, FieldChange, RecordId};
use crate::normalize::{normalize, normalize_known};
use crate::repo::audit_repo::{insert_audit, AuditRecord};
use chrono::{NaiveDateTime, Utc};
use log::{info, warn};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde_json::{json, Map};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

pub type StoreResult<T> = Result<T, StoreError>;

/// Error for record store, import and analytics operations.
#[derive(Debug)]
pub enum StoreError {
    /// Caller input cannot be applied (no recognized fields, missing source).
    Validation(String),
    /// Write-lock contention outlived the busy timeout; safe to retry.
    Transient(DbError),
    /// An import sheet could not be parsed.
    SourceFormat { category: Category, message: String },
    /// Persisted data does not match the expected shape.
    InvalidData(String),
    Db(DbError),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "validation failed: {message}"),
            Self::Transient(err) => write!(f, "database busy, retry later: {err}"),
            Self::SourceFormat { category, message } => {
                write!(f, "sheet `{}` unreadable: {message}", category.sheet_name())
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transient(err) | Self::Db(err) => Some(err),
            Self::Validation(_) | Self::SourceFormat { .. } | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        if value.is_busy() {
            Self::Transient(value)
        } else {
            Self::Db(value)
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::from(DbError::Sqlite(value))
    }
}

/// Query options for listing one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Keep only rows matching the category's in-service predicate.
    pub active_only: bool,
    /// Include soft-deleted rows.
    pub include_deleted: bool,
}

impl ListQuery {
    pub fn active() -> Self {
        Self {
            active_only: true,
            include_deleted: false,
        }
    }
}

/// Repository interface for employee record operations.
///
/// Not-found ids are reported as `Ok(None)` / `Ok(false)`, never as errors.
pub trait EmployeeRepository {
    fn get_all(&self, category: Category, query: &ListQuery) -> StoreResult<Vec<EmployeeRecord>>;
    fn get_by_id(&self, category: Category, id: RecordId) -> StoreResult<Option<EmployeeRecord>>;
    /// Soft-deleted rows, most recently deleted first.
    fn get_deleted(&self, category: Category) -> StoreResult<Vec<EmployeeRecord>>;
    fn add(&self, category: Category, fields: &[(&str, CellValue)]) -> StoreResult<RecordId>;
    fn update(
        &self,
        category: Category,
        id: RecordId,
        fields: &[(&str, CellValue)],
    ) -> StoreResult<bool>;
    fn delete(&self, category: Category, id: RecordId) -> StoreResult<bool>;
    fn restore(&self, category: Category, id: RecordId) -> StoreResult<bool>;
    /// Irreversibly removes the row. Callers gate this behind confirmation.
    fn hard_delete(&self, category: Category, id: RecordId) -> StoreResult<bool>;
}

/// SQLite-backed employee store using one connection per operation.
#[derive(Debug, Clone)]
pub struct SqliteEmployeeStore {
    config: StoreConfig,
}

impl SqliteEmployeeStore {
    /// Validates `config`, opens the database once and initializes its schema.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        config
            .validate()
            .map_err(|err| StoreError::Validation(err.to_string()))?;
        drop(open_db(&config)?);
        Ok(Self { config })
    }

    /// Opens a store at `path` with default tuning.
    pub fn open_path(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open(StoreConfig::new(path.as_ref()))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Opens a fresh connection for one read or write.
    pub fn connect(&self) -> StoreResult<Connection> {
        Ok(connect(&self.config)?)
    }

    /// Runs `op` inside an immediate write transaction, committing on success.
    ///
    /// Dropping the transaction on any error path rolls it back.
    pub(crate) fn write<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StoreResult<T>,
    {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = op(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Case-insensitive substring search on name or kana across categories.
    pub fn search(&self, text: &str, active_only: bool) -> StoreResult<Vec<EmployeeRecord>> {
        let needle = text.trim();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = format!("%{}%", escape_like(needle));

        let conn = self.connect()?;
        let mut found = Vec::new();
        for category in Category::ALL {
            let mut sql = format!(
                "{} WHERE {COL_DELETED_AT} IS NULL
                   AND ({} LIKE ?1 ESCAPE '\\' OR {} LIKE ?1 ESCAPE '\\')",
                select_sql(category),
                quote_column(COL_NAME),
                quote_column(COL_KANA)
            );
            if active_only {
                sql.push_str(&format!(" AND {}", category.active_predicate_sql()));
            }
            sql.push_str(&format!(" ORDER BY {COL_ID} ASC"));
            found.extend(query_records(&conn, category, &sql, [pattern.as_str()])?);
        }
        Ok(found)
    }

    /// Live records carrying company employee number `employee_no`, in
    /// category order.
    ///
    /// The number is normalized first, so `"1001"`, `1001.0` and `"1,001"`
    /// all match a stored `1001`.
    pub fn find_by_employee_no(
        &self,
        employee_no: impl Into<CellValue>,
    ) -> StoreResult<Vec<(Category, EmployeeRecord)>> {
        let Some(needle) = normalize(COL_EMPLOYEE_NO, &employee_no.into()) else {
            return Ok(Vec::new());
        };

        let conn = self.connect()?;
        let mut found = Vec::new();
        for category in Category::ALL {
            let sql = format!(
                "{} WHERE {COL_DELETED_AT} IS NULL AND {} = ?1 ORDER BY {COL_ID} ASC",
                select_sql(category),
                quote_column(COL_EMPLOYEE_NO)
            );
            found.extend(
                query_records(&conn, category, &sql, [needle.as_str()])?
                    .into_iter()
                    .map(|record| (category, record)),
            );
        }
        Ok(found)
    }

    /// Returns true when any category holds at least one non-deleted row.
    pub fn has_data(&self) -> StoreResult<bool> {
        let conn = self.connect()?;
        for category in Category::ALL {
            let exists: i64 = conn.query_row(
                &format!(
                    "SELECT EXISTS(SELECT 1 FROM {} WHERE {COL_DELETED_AT} IS NULL);",
                    category.table()
                ),
                [],
                |row| row.get(0),
            )?;
            if exists == 1 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Returns per-table row counts and last-update times.
    pub fn db_info(&self) -> StoreResult<DbInfo> {
        let conn = self.connect()?;
        let mut tables = BTreeMap::new();
        for category in Category::ALL {
            let info = conn.query_row(
                &format!(
                    "SELECT
                        COUNT(*) FILTER (WHERE {COL_DELETED_AT} IS NULL),
                        COUNT(*) FILTER (WHERE {COL_DELETED_AT} IS NOT NULL),
                        MAX({COL_UPDATED_AT})
                     FROM {};",
                    category.table()
                ),
                [],
                |row| {
                    Ok(TableInfo {
                        rows: row.get::<_, i64>(0)? as u64,
                        deleted: row.get::<_, i64>(1)? as u64,
                        last_updated: timestamp_from(row.get_ref(2)?),
                    })
                },
            )?;
            tables.insert(category, info);
        }
        Ok(DbInfo {
            path: self.config.db_path.display().to_string(),
            tables,
        })
    }
}

/// Storage metadata for one category table.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TableInfo {
    /// Non-deleted rows.
    pub rows: u64,
    /// Soft-deleted rows awaiting restore or hard delete.
    pub deleted: u64,
    /// Epoch milliseconds of the newest `updated_at`.
    pub last_updated: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DbInfo {
    pub path: String,
    pub tables: BTreeMap<Category, TableInfo>,
}

impl EmployeeRepository for SqliteEmployeeStore {
    fn get_all(&self, category: Category, query: &ListQuery) -> StoreResult<Vec<EmployeeRecord>> {
        let mut sql = format!("{} WHERE 1 = 1", select_sql(category));
        if !query.include_deleted {
            sql.push_str(&format!(" AND {COL_DELETED_AT} IS NULL"));
        }
        if query.active_only {
            sql.push_str(&format!(" AND {}", category.active_predicate_sql()));
        }
        sql.push_str(&format!(" ORDER BY {COL_ID} ASC"));

        let conn = self.connect()?;
        query_records(&conn, category, &sql, [])
    }

    fn get_by_id(&self, category: Category, id: RecordId) -> StoreResult<Option<EmployeeRecord>> {
        let conn = self.connect()?;
        load_record(&conn, category, id)
    }

    fn get_deleted(&self, category: Category) -> StoreResult<Vec<EmployeeRecord>> {
        let sql = format!(
            "{} WHERE {COL_DELETED_AT} IS NOT NULL ORDER BY {COL_DELETED_AT} DESC, {COL_ID} DESC",
            select_sql(category)
        );
        let conn = self.connect()?;
        query_records(&conn, category, &sql, [])
    }

    fn add(&self, category: Category, fields: &[(&str, CellValue)]) -> StoreResult<RecordId> {
        let normalized = normalize_known(category, fields.iter().map(|(k, v)| (*k, v.clone())));
        if normalized.is_empty() {
            warn!(
                "event=record_insert module=store status=rejected category={} reason=no_known_fields",
                category.table()
            );
            return Err(StoreError::Validation(format!(
                "no recognized {} fields supplied",
                category.table()
            )));
        }

        let id = self.write(|tx| {
            let now = now_ms();
            let id = insert_row(tx, category, &normalized, now)?;
            let snapshot = normalized
                .iter()
                .map(|(column, value)| (column.to_string(), json!(value)))
                .collect::<Map<_, _>>();
            insert_audit(
                tx,
                &AuditRecord {
                    category: Some(category),
                    record_id: Some(id),
                    action: AuditAction::Insert,
                    subject: subject_of(&normalized),
                    payload: serde_json::Value::Object(snapshot),
                    created_at: now,
                },
            )?;
            Ok(id)
        })?;

        info!(
            "event=record_insert module=store status=ok category={} id={} fields={}",
            category.table(),
            id,
            normalized.len()
        );
        Ok(id)
    }

    fn update(
        &self,
        category: Category,
        id: RecordId,
        fields: &[(&str, CellValue)],
    ) -> StoreResult<bool> {
        let normalized = normalize_known(category, fields.iter().map(|(k, v)| (*k, v.clone())));
        if normalized.is_empty() {
            return Err(StoreError::Validation(format!(
                "no recognized {} fields supplied",
                category.table()
            )));
        }

        let outcome = self.write(|tx| {
            let Some(current) = load_record(tx, category, id)? else {
                return Ok(None);
            };

            let changes = diff_fields(&current, &normalized);
            if changes.is_empty() {
                return Ok(Some(0));
            }

            let now = now_ms();
            let assignments = changes
                .keys()
                .enumerate()
                .map(|(index, column)| format!("{} = ?{}", quote_column(column), index + 1))
                .collect::<Vec<_>>()
                .join(", ");
            let mut bind_values: Vec<Value> = changes
                .values()
                .map(|change| optional_text(change.new.as_deref()))
                .collect();
            bind_values.push(Value::Integer(now));
            bind_values.push(Value::Integer(id));
            let count = bind_values.len();
            tx.execute(
                &format!(
                    "UPDATE {} SET {assignments}, {COL_UPDATED_AT} = ?{} WHERE {COL_ID} = ?{count};",
                    category.table(),
                    count - 1
                ),
                params_from_iter(bind_values),
            )?;

            let subject = match changes.get(COL_NAME) {
                Some(change) => change.new.clone(),
                None => current.name().map(str::to_string),
            };
            insert_audit(
                tx,
                &AuditRecord {
                    category: Some(category),
                    record_id: Some(id),
                    action: AuditAction::Update,
                    subject,
                    payload: serde_json::to_value(&changes)
                        .map_err(|err| StoreError::InvalidData(err.to_string()))?,
                    created_at: now,
                },
            )?;
            Ok(Some(changes.len()))
        })?;

        match outcome {
            None => Ok(false),
            Some(changed) => {
                info!(
                    "event=record_update module=store status=ok category={} id={} changed={}",
                    category.table(),
                    id,
                    changed
                );
                Ok(true)
            }
        }
    }

    fn delete(&self, category: Category, id: RecordId) -> StoreResult<bool> {
        let deleted = self.write(|tx| {
            let Some(current) = load_record(tx, category, id)? else {
                return Ok(false);
            };
            if current.is_deleted() {
                return Ok(false);
            }

            let now = now_ms();
            tx.execute(
                &format!(
                    "UPDATE {} SET {COL_DELETED_AT} = ?1 WHERE {COL_ID} = ?2;",
                    category.table()
                ),
                [now, id],
            )?;
            insert_audit(
                tx,
                &lifecycle_audit(category, &current, AuditAction::Delete, now),
            )?;
            Ok(true)
        })?;

        log_lifecycle("record_delete", category, id, deleted);
        Ok(deleted)
    }

    fn restore(&self, category: Category, id: RecordId) -> StoreResult<bool> {
        let restored = self.write(|tx| {
            let Some(current) = load_record(tx, category, id)? else {
                return Ok(false);
            };
            if !current.is_deleted() {
                return Ok(false);
            }

            let now = now_ms();
            tx.execute(
                &format!(
                    "UPDATE {} SET {COL_DELETED_AT} = NULL, {COL_UPDATED_AT} = ?1 WHERE {COL_ID} = ?2;",
                    category.table()
                ),
                [now, id],
            )?;
            insert_audit(
                tx,
                &lifecycle_audit(category, &current, AuditAction::Restore, now),
            )?;
            Ok(true)
        })?;

        log_lifecycle("record_restore", category, id, restored);
        Ok(restored)
    }

    fn hard_delete(&self, category: Category, id: RecordId) -> StoreResult<bool> {
        let removed = self.write(|tx| {
            let Some(current) = load_record(tx, category, id)? else {
                return Ok(false);
            };

            let now = now_ms();
            tx.execute(
                &format!("DELETE FROM {} WHERE {COL_ID} = ?1;", category.table()),
                [id],
            )?;
            // Last copy of the row's values; the row itself is gone after commit.
            let mut audit = lifecycle_audit(category, &current, AuditAction::HardDelete, now);
            audit.payload = serde_json::to_value(current.field_map())
                .map_err(|err| StoreError::InvalidData(err.to_string()))?;
            insert_audit(tx, &audit)?;
            Ok(true)
        })?;

        if removed {
            warn!(
                "event=record_hard_delete module=store status=ok category={} id={}",
                category.table(),
                id
            );
        }
        Ok(removed)
    }
}

/// Inserts one normalized row and returns its new id.
pub(crate) fn insert_row(
    tx: &Transaction<'_>,
    category: Category,
    values: &[(&'static str, Option<String>)],
    now: i64,
) -> StoreResult<RecordId> {
    let mut columns: Vec<String> = values.iter().map(|(column, _)| quote_column(column)).collect();
    columns.push(COL_UPDATED_AT.to_string());
    let placeholders = (1..=columns.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut bind_values: Vec<Value> = values
        .iter()
        .map(|(_, value)| optional_text(value.as_deref()))
        .collect();
    bind_values.push(Value::Integer(now));

    tx.execute(
        &format!(
            "INSERT INTO {} ({}) VALUES ({placeholders});",
            category.table(),
            columns.join(", ")
        ),
        params_from_iter(bind_values),
    )?;
    Ok(tx.last_insert_rowid())
}

/// Builds the `SELECT ... FROM table` prefix in canonical column order.
pub(crate) fn select_sql(category: Category) -> String {
    let columns = category
        .columns()
        .iter()
        .map(|column| quote_column(column))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT {COL_ID}, {columns}, {COL_UPDATED_AT}, {COL_DELETED_AT} FROM {}",
        category.table()
    )
}

pub(crate) fn query_records<P: rusqlite::Params>(
    conn: &Connection,
    category: Category,
    sql: &str,
    params: P,
) -> StoreResult<Vec<EmployeeRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(parse_record_row(category, row)?);
    }
    Ok(records)
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn load_record(
    conn: &Connection,
    category: Category,
    id: RecordId,
) -> StoreResult<Option<EmployeeRecord>> {
    let sql = format!("{} WHERE {COL_ID} = ?1", select_sql(category));
    let record = conn
        .query_row(&sql, [id], |row| Ok(parse_record_row(category, row)))
        .optional()?;
    record.transpose()
}

fn parse_record_row(category: Category, row: &Row<'_>) -> StoreResult<EmployeeRecord> {
    let column_count = category.columns().len();
    let id: RecordId = row.get(0)?;
    let mut values = Vec::with_capacity(column_count);
    for index in 1..=column_count {
        values.push(text_from(row.get_ref(index)?));
    }

    Ok(EmployeeRecord {
        id,
        category,
        values,
        updated_at: timestamp_from(row.get_ref(column_count + 1)?),
        deleted_at: timestamp_from(row.get_ref(column_count + 2)?),
    })
}

/// Compares normalized input against stored values, treating null as `""`.
fn diff_fields(
    current: &EmployeeRecord,
    normalized: &[(&'static str, Option<String>)],
) -> BTreeMap<&'static str, FieldChange> {
    normalized
        .iter()
        .filter_map(|(column, new)| {
            let old = current.get(column);
            if old.unwrap_or("") == new.as_deref().unwrap_or("") {
                return None;
            }
            Some((
                *column,
                FieldChange {
                    old: old.map(str::to_string),
                    new: new.clone(),
                },
            ))
        })
        .collect()
}

fn lifecycle_audit(
    category: Category,
    record: &EmployeeRecord,
    action: AuditAction,
    now: i64,
) -> AuditRecord {
    AuditRecord {
        category: Some(category),
        record_id: Some(record.id),
        action,
        subject: record.name().map(str::to_string),
        payload: json!({}),
        created_at: now,
    }
}

fn subject_of(values: &[(&'static str, Option<String>)]) -> Option<String> {
    values
        .iter()
        .find(|(column, _)| *column == COL_NAME)
        .and_then(|(_, value)| value.clone())
}

fn log_lifecycle(event: &str, category: Category, id: RecordId, applied: bool) {
    info!(
        "event={} module=store status={} category={} id={}",
        event,
        if applied { "ok" } else { "skipped" },
        category.table(),
        id
    );
}

fn optional_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

fn text_from(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(number) => Some(number.to_string()),
        ValueRef::Real(number) => Some(number.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Reads epoch milliseconds, accepting legacy `YYYY-MM-DD HH:MM:SS` text.
pub(crate) fn timestamp_from(value: ValueRef<'_>) -> Option<i64> {
    match value {
        ValueRef::Integer(number) => Some(number),
        ValueRef::Real(number) => Some(number as i64),
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes).ok()?;
            NaiveDateTime::parse_from_str(text.trim(), "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|datetime| datetime.and_utc().timestamp_millis())
        }
        ValueRef::Null | ValueRef::Blob(_) => None,
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
