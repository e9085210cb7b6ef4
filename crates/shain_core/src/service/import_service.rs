//! Bulk workbook import and preview.
//!
//! # Responsibility
//! - Replace each category's rows with the rows of its workbook sheet.
//! - Preview what an import would store without writing anything.
//!
//! # Invariants
//! - Import is a destructive replace per category, including soft-deleted rows.
//! - A category whose sheet cannot be read keeps its existing rows and is
//!   reported in `ImportReport::failures`; the other categories still import.
//! - All truncations, inserts and the single system-level audit entry commit
//!   in one transaction.
//! - Rows whose every normalized value is null are skipped.

use crate::model::category::{Category, COL_STATUS};
use crate::model::record::AuditAction;
use crate::normalize::normalize;
use crate::repo::audit_repo::{insert_audit, AuditRecord};
use crate::repo::employee_repo::{
    insert_row, now_ms, SqliteEmployeeStore, StoreError, StoreResult,
};
use crate::source::{ExcelWorkbook, Sheet, SourceError, WorkbookSource};
use log::{info, warn};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

/// Formula-only columns that do not survive tabular export.
pub const DROPPED_COLUMNS: &[&str] = &["ｱﾗｰﾄ(ﾋﾞｻﾞ更新)"];
/// Number of rows included in each sheet preview.
pub const PREVIEW_ROWS: usize = 5;

type NormalizedRow = Vec<(&'static str, Option<String>)>;

/// Outcome of one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Imported row count per category; zero for failed sheets.
    pub counts: BTreeMap<Category, usize>,
    /// Read failure message per category whose sheet was unusable.
    pub failures: BTreeMap<Category, String>,
}

impl ImportReport {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// True when every category's sheet was read.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Read-only view of one sheet as it would be imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SheetPreview {
    Ready {
        category: Category,
        label: &'static str,
        row_count: usize,
        /// Headers after remap and formula-column removal.
        columns: Vec<String>,
        /// Headers that match no canonical column and will be ignored.
        ignored_columns: Vec<String>,
        /// Required columns the sheet does not carry.
        missing_required: Vec<String>,
        /// First rows, normalized the way import would store them.
        head: Vec<Vec<Option<String>>>,
    },
    Failed {
        category: Category,
        label: &'static str,
        error: String,
    },
}

/// Import use-case service over a record store.
pub struct ImportService<'a> {
    store: &'a SqliteEmployeeStore,
}

impl<'a> ImportService<'a> {
    pub fn new(store: &'a SqliteEmployeeStore) -> Self {
        Self { store }
    }

    /// Opens the workbook at `path` and imports it.
    ///
    /// # Errors
    /// - `Validation` when the file is missing or cannot be opened.
    pub fn import_file(
        &self,
        path: impl AsRef<Path>,
        progress: Option<&mut dyn FnMut(&str, f64)>,
    ) -> StoreResult<ImportReport> {
        let mut workbook = open_workbook(path.as_ref())?;
        self.import_from(&mut workbook, progress)
    }

    /// Opens the workbook at `path` and previews it.
    pub fn preview_file(&self, path: impl AsRef<Path>) -> StoreResult<Vec<SheetPreview>> {
        let mut workbook = open_workbook(path.as_ref())?;
        Ok(self.preview_from(&mut workbook))
    }

    /// Replaces all three categories from `source`.
    ///
    /// `progress` receives `(message, fraction)` at each category boundary;
    /// passing `None` changes nothing else.
    pub fn import_from<S: WorkbookSource + ?Sized>(
        &self,
        source: &mut S,
        mut progress: Option<&mut dyn FnMut(&str, f64)>,
    ) -> StoreResult<ImportReport> {
        let started_at = Instant::now();
        let steps = Category::ALL.len() as f64;
        let mut report = ImportReport::default();
        let mut prepared: Vec<(Category, Vec<NormalizedRow>)> = Vec::new();

        for (index, category) in Category::ALL.into_iter().enumerate() {
            emit(
                &mut progress,
                &format!("{} シートを読み込み中…", category.label()),
                index as f64 / steps,
            );
            match source.read_sheet(category.sheet_name()) {
                Ok(mut sheet) => {
                    prepare_sheet(category, &mut sheet);
                    prepared.push((category, normalized_rows(category, &sheet)));
                }
                Err(err) => {
                    let failure = StoreError::SourceFormat {
                        category,
                        message: source_message(&err),
                    };
                    warn!(
                        "event=import_sheet module=import status=error category={} error={}",
                        category.table(),
                        failure
                    );
                    report.counts.insert(category, 0);
                    report.failures.insert(category, failure.to_string());
                }
            }
        }

        if prepared.is_empty() {
            warn!("event=import module=import status=error reason=no_readable_sheets");
            return Ok(report);
        }

        let imported = self.store.write(|tx| {
            let mut imported = Vec::with_capacity(prepared.len());
            let now = now_ms();
            for (category, rows) in &prepared {
                tx.execute(&format!("DELETE FROM {};", category.table()), [])?;
                for row in rows {
                    insert_row(tx, *category, row, now)?;
                }
                imported.push((*category, rows.len()));
            }

            let counts = imported
                .iter()
                .map(|(category, count)| (category.table().to_string(), json!(count)))
                .chain(
                    report
                        .failures
                        .keys()
                        .map(|category| (category.table().to_string(), json!(0))),
                )
                .collect::<serde_json::Map<_, _>>();
            let failed = report
                .failures
                .keys()
                .map(|category| category.table())
                .collect::<Vec<_>>();
            insert_audit(
                tx,
                &AuditRecord {
                    category: None,
                    record_id: None,
                    action: AuditAction::Import,
                    subject: None,
                    payload: json!({ "counts": counts, "failed": failed }),
                    created_at: now,
                },
            )?;
            Ok(imported)
        })?;

        for (category, count) in imported {
            report.counts.insert(category, count);
            let step = Category::ALL
                .iter()
                .position(|candidate| *candidate == category)
                .unwrap_or(0);
            emit(
                &mut progress,
                &format!("✅ {}: {} 件インポート完了", category.label(), count),
                (step + 1) as f64 / steps,
            );
        }

        info!(
            "event=import module=import status={} duration_ms={} rows={} failed_sheets={}",
            if report.is_complete() { "ok" } else { "partial" },
            started_at.elapsed().as_millis(),
            report.total(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Reads every sheet and reports what import would do; never writes.
    pub fn preview_from<S: WorkbookSource + ?Sized>(&self, source: &mut S) -> Vec<SheetPreview> {
        Category::ALL
            .into_iter()
            .map(|category| match source.read_sheet(category.sheet_name()) {
                Ok(mut sheet) => {
                    prepare_sheet(category, &mut sheet);
                    let ignored_columns = sheet
                        .headers
                        .iter()
                        .filter(|header| !category.has_column(header))
                        .cloned()
                        .collect();
                    let missing_required = category
                        .required_columns()
                        .iter()
                        .filter(|column| !sheet.headers.iter().any(|header| header == *column))
                        .map(|column| column.to_string())
                        .collect();
                    let head = sheet
                        .rows
                        .iter()
                        .take(PREVIEW_ROWS)
                        .map(|row| {
                            sheet
                                .headers
                                .iter()
                                .zip(row)
                                .map(|(header, cell)| normalize(header, cell))
                                .collect()
                        })
                        .collect();
                    SheetPreview::Ready {
                        category,
                        label: category.label(),
                        row_count: normalized_rows(category, &sheet).len(),
                        columns: sheet.headers.clone(),
                        ignored_columns,
                        missing_required,
                        head,
                    }
                }
                Err(err) => SheetPreview::Failed {
                    category,
                    label: category.label(),
                    error: source_message(&err),
                },
            })
            .collect()
    }
}

/// Applies the per-category header remap and drops formula-only columns.
pub fn prepare_sheet(category: Category, sheet: &mut Sheet) {
    if category == Category::Staff
        && sheet
            .headers
            .first()
            .is_some_and(|header| header != COL_STATUS)
    {
        sheet.rename_header(0, COL_STATUS);
    }
    for column in DROPPED_COLUMNS {
        sheet.drop_column(column);
    }
}

fn normalized_rows(category: Category, sheet: &Sheet) -> Vec<NormalizedRow> {
    let present: Vec<(&'static str, usize)> = category
        .columns()
        .iter()
        .filter_map(|column| {
            sheet
                .headers
                .iter()
                .position(|header| header == column)
                .map(|index| (*column, index))
        })
        .collect();

    sheet
        .rows
        .iter()
        .filter_map(|row| {
            let values: NormalizedRow = present
                .iter()
                .map(|(column, index)| {
                    let value = row.get(*index).and_then(|cell| normalize(column, cell));
                    (*column, value)
                })
                .collect();
            if values.iter().all(|(_, value)| value.is_none()) {
                None
            } else {
                Some(values)
            }
        })
        .collect()
}

fn open_workbook(path: &Path) -> StoreResult<ExcelWorkbook> {
    ExcelWorkbook::open(path).map_err(|err| StoreError::Validation(err.to_string()))
}

fn source_message(err: &SourceError) -> String {
    match err {
        SourceError::Sheet { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

fn emit(progress: &mut Option<&mut dyn FnMut(&str, f64)>, message: &str, fraction: f64) {
    info!(
        "event=import_progress module=import status=ok fraction={:.2}",
        fraction
    );
    if let Some(callback) = progress.as_deref_mut() {
        callback(message, fraction);
    }
}
