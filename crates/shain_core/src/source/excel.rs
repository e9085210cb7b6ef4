//! Spreadsheet workbook source backed by calamine.
//!
//! Supports `.xlsx`, `.xlsm`, `.xls` and `.ods`. Formula cells are read as
//! their cached values; cells holding spreadsheet errors read as empty.

use super::{Sheet, SourceError, WorkbookSource};
use crate::model::cell::CellValue;
use calamine::{open_workbook_auto, Data, Reader, Sheets};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Workbook file opened for sheet-by-sheet reads.
pub struct ExcelWorkbook {
    workbook: Sheets<BufReader<File>>,
}

impl ExcelWorkbook {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SourceError::Missing(path.to_path_buf()));
        }
        let workbook = open_workbook_auto(path).map_err(|err| SourceError::Open(err.to_string()))?;
        Ok(Self { workbook })
    }

    /// Sheet names in workbook order.
    pub fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names()
    }
}

impl WorkbookSource for ExcelWorkbook {
    fn read_sheet(&mut self, name: &str) -> Result<Sheet, SourceError> {
        let available = self.sheet_names();
        if !available.iter().any(|sheet| sheet == name) {
            return Err(SourceError::Sheet {
                sheet: name.to_string(),
                message: format!("sheet not found; workbook has [{}]", available.join(", ")),
            });
        }

        let range = self
            .workbook
            .worksheet_range(name)
            .map_err(|err| SourceError::Sheet {
                sheet: name.to_string(),
                message: err.to_string(),
            })?;

        let mut rows = range.rows();
        let Some(header_row) = rows.next() else {
            return Err(SourceError::Sheet {
                sheet: name.to_string(),
                message: "sheet has no header row".to_string(),
            });
        };
        let headers = header_row
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();
        let data = rows
            .map(|row| row.iter().map(cell_value).collect())
            .collect();

        Ok(Sheet::new(headers, data))
    }
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text) => {
            CellValue::Text(text.clone())
        }
        Data::Float(number) => CellValue::Number(*number),
        Data::Int(number) => CellValue::Number(*number as f64),
        Data::Bool(flag) => CellValue::Bool(*flag),
        Data::DateTime(datetime) => datetime
            .as_datetime()
            .map_or(CellValue::Number(datetime.as_f64()), CellValue::DateTime),
    }
}

#[cfg(test)]
mod tests {
    use super::cell_value;
    use crate::model::cell::CellValue;
    use calamine::{CellErrorType, Data};

    #[test]
    fn maps_scalar_cells() {
        assert_eq!(cell_value(&Data::Int(42)), CellValue::Number(42.0));
        assert_eq!(cell_value(&Data::Float(1.5)), CellValue::Number(1.5));
        assert_eq!(cell_value(&Data::Bool(true)), CellValue::Bool(true));
        assert_eq!(
            cell_value(&Data::String("在職中".to_string())),
            CellValue::Text("在職中".to_string())
        );
    }

    #[test]
    fn error_cells_read_as_empty() {
        assert_eq!(cell_value(&Data::Error(CellErrorType::NA)), CellValue::Empty);
        assert_eq!(cell_value(&Data::Error(CellErrorType::Div0)), CellValue::Empty);
    }
}
