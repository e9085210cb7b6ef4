//! Employee record and audit entry models.
//!
//! # Responsibility
//! - Define the persisted record shape shared by all three categories.
//! - Define immutable audit entries describing one mutation each.
//!
//! # Invariants
//! - `values` is aligned with `category.columns()` index-for-index.
//! - `id` is assigned by storage on insert and never reused.
//! - A record with `deleted_at` set is tombstoned, not gone.

use crate::model::category::{Category, COL_NAME};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Surrogate row identifier assigned on insert.
pub type RecordId = i64;

/// Lifecycle state derived from the soft-delete timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Active,
    Deleted,
}

/// One employee row in its category's fixed column layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmployeeRecord {
    pub id: RecordId,
    pub category: Category,
    /// Normalized stored values, one per `category.columns()` entry.
    pub values: Vec<Option<String>>,
    /// Epoch milliseconds of the last mutation.
    pub updated_at: Option<i64>,
    /// Epoch milliseconds of the soft delete, if any.
    pub deleted_at: Option<i64>,
}

impl EmployeeRecord {
    /// Returns the stored value of `column`, or `None` when null or unknown.
    pub fn get(&self, column: &str) -> Option<&str> {
        let index = self
            .category
            .columns()
            .iter()
            .position(|candidate| *candidate == column)?;
        self.values.get(index)?.as_deref()
    }

    /// Employee name, used as the audit subject label.
    pub fn name(&self) -> Option<&str> {
        self.get(COL_NAME)
    }

    pub fn state(&self) -> RecordState {
        if self.deleted_at.is_some() {
            RecordState::Deleted
        } else {
            RecordState::Active
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.state() == RecordState::Deleted
    }

    /// Iterates `(column, value)` pairs in canonical column order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, Option<&str>)> + '_ {
        self.category
            .columns()
            .iter()
            .copied()
            .zip(self.values.iter().map(Option::as_deref))
    }

    /// Returns non-null fields keyed by column name.
    pub fn field_map(&self) -> BTreeMap<&'static str, &str> {
        self.fields()
            .filter_map(|(column, value)| value.map(|value| (column, value)))
            .collect()
    }
}

/// Kind of mutation an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Insert,
    Update,
    Delete,
    Restore,
    HardDelete,
    Import,
}

impl AuditAction {
    pub fn as_db(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Restore => "RESTORE",
            Self::HardDelete => "HARD_DELETE",
            Self::Import => "IMPORT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            "RESTORE" => Some(Self::Restore),
            "HARD_DELETE" => Some(Self::HardDelete),
            "IMPORT" => Some(Self::Import),
            _ => None,
        }
    }
}

/// Old/new pair for one changed field in an update payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Option<String>,
    pub new: Option<String>,
}

/// Immutable record of one store mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    /// `None` for system-level events such as imports.
    pub category: Option<Category>,
    pub record_id: Option<RecordId>,
    pub action: AuditAction,
    /// Employee name at the time of the action.
    pub subject: Option<String>,
    /// Changed fields for updates, stored fields for inserts, counts for imports.
    pub payload: serde_json::Value,
    /// Epoch milliseconds.
    pub created_at: i64,
}

/// Category restriction for audit log reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditFilter {
    #[default]
    All,
    Category(Category),
    /// Only entries not tied to a category (imports).
    System,
}
