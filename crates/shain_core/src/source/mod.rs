//! Tabular import sources.
//!
//! # Responsibility
//! - Define the sheet-by-name read contract the importer consumes.
//! - Provide an in-memory source for programmatic imports.
//!
//! # Invariants
//! - A sheet's first row is its header row; every later row is data.
//! - Failing to read one sheet never poisons reads of other sheets.

use crate::model::cell::CellValue;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

mod excel;

pub use excel::ExcelWorkbook;

#[derive(Debug)]
pub enum SourceError {
    /// The workbook file does not exist.
    Missing(PathBuf),
    /// The workbook exists but could not be opened.
    Open(String),
    /// One sheet is absent or unreadable.
    Sheet { sheet: String, message: String },
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(path) => write!(f, "workbook not found: {}", path.display()),
            Self::Open(message) => write!(f, "workbook could not be opened: {message}"),
            Self::Sheet { sheet, message } => write!(f, "sheet `{sheet}`: {message}"),
        }
    }
}

impl Error for SourceError {}

/// One sheet as a header row plus data rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Sheet {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { headers, rows }
    }

    /// Returns the cell under `header` in `row`, `Empty` when absent.
    pub fn cell(&self, row: usize, header: &str) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.headers
            .iter()
            .position(|candidate| candidate == header)
            .and_then(|index| self.rows.get(row)?.get(index))
            .unwrap_or(&EMPTY)
    }

    /// Renames the header at `index`.
    pub fn rename_header(&mut self, index: usize, name: &str) {
        if let Some(header) = self.headers.get_mut(index) {
            *header = name.to_string();
        }
    }

    /// Removes a column by header name, returning whether it existed.
    pub fn drop_column(&mut self, header: &str) -> bool {
        let Some(index) = self.headers.iter().position(|candidate| candidate == header) else {
            return false;
        };
        self.headers.remove(index);
        for row in &mut self.rows {
            if index < row.len() {
                row.remove(index);
            }
        }
        true
    }
}

/// Read access to a multi-sheet workbook.
pub trait WorkbookSource {
    fn read_sheet(&mut self, name: &str) -> Result<Sheet, SourceError>;
}

/// Workbook assembled in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    sheets: HashMap<String, Sheet>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a sheet.
    pub fn with_sheet(mut self, name: impl Into<String>, sheet: Sheet) -> Self {
        self.sheets.insert(name.into(), sheet);
        self
    }
}

impl WorkbookSource for MemoryWorkbook {
    fn read_sheet(&mut self, name: &str) -> Result<Sheet, SourceError> {
        self.sheets
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::Sheet {
                sheet: name.to_string(),
                message: "sheet not found".to_string(),
            })
    }
}
