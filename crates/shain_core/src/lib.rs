//! Core domain logic for the employee registry.
//! This crate is the single source of truth for record, import and
//! analytics invariants.

pub mod config;
pub mod db;
pub mod export;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod repo;
pub mod service;
pub mod source;

pub use config::{ConfigError, JournalMode, StoreConfig};
pub use db::{DbError, DbResult};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status, LoggingError};
pub use model::category::{Category, FieldRole};
pub use model::cell::CellValue;
pub use model::record::{
    AuditAction, AuditEntry, AuditFilter, EmployeeRecord, FieldChange, RecordId, RecordState,
};
pub use repo::employee_repo::{
    DbInfo, EmployeeRepository, ListQuery, SqliteEmployeeStore, StoreError, StoreResult,
    TableInfo,
};
pub use service::analytics_service::{
    profit_margin, AnalyticsService, Severity, SummaryStats, VisaAlert,
};
pub use service::import_service::{ImportReport, ImportService, SheetPreview};
pub use source::{ExcelWorkbook, MemoryWorkbook, Sheet, SourceError, WorkbookSource};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
