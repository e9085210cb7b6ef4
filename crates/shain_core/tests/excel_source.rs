use chrono::NaiveDate;
use shain_core::{
    CellValue, Category, EmployeeRepository, ExcelWorkbook, ImportService, ListQuery,
    SourceError, SqliteEmployeeStore, WorkbookSource,
};
use std::path::PathBuf;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/shain_sample.xlsx")
}

#[test]
fn reads_headers_dates_and_error_cells() {
    let mut workbook = ExcelWorkbook::open(fixture()).unwrap();
    assert_eq!(workbook.sheet_names(), vec!["DBGenzaiX", "DBUkeoiX"]);

    let sheet = workbook.read_sheet("DBGenzaiX").unwrap();
    assert_eq!(
        sheet.headers,
        vec!["現在", "社員№", "氏名", "ビザ期限", "派遣先", "時給"]
    );
    assert_eq!(sheet.rows.len(), 2);

    let first = &sheet.rows[0];
    assert_eq!(first[1], CellValue::Number(1001.0));
    assert_eq!(
        first[3],
        CellValue::DateTime(
            NaiveDate::from_ymd_opt(2026, 4, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        )
    );
    assert_eq!(first[4], CellValue::Empty);
    assert_eq!(sheet.rows[1][5], CellValue::Text("1,100".to_string()));
}

#[test]
fn missing_sheet_error_lists_available_sheets() {
    let mut workbook = ExcelWorkbook::open(fixture()).unwrap();

    match workbook.read_sheet("DBStaffX").unwrap_err() {
        SourceError::Sheet { sheet, message } => {
            assert_eq!(sheet, "DBStaffX");
            assert!(message.contains("DBGenzaiX, DBUkeoiX"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn import_file_loads_workbook_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteEmployeeStore::open_path(dir.path().join("shain.db")).unwrap();

    let report = ImportService::new(&store).import_file(fixture(), None).unwrap();

    assert_eq!(report.counts[&Category::Dispatched], 2);
    assert_eq!(report.counts[&Category::Contracted], 1);
    assert!(report.failures.contains_key(&Category::Staff));

    let dispatched = store
        .get_all(Category::Dispatched, &ListQuery::default())
        .unwrap();
    assert_eq!(dispatched[0].get("社員№"), Some("1001"));
    assert_eq!(dispatched[0].get("ビザ期限"), Some("2026-04-01"));
    assert_eq!(dispatched[0].get("派遣先"), None);
    assert_eq!(dispatched[0].get("時給"), Some("1200"));
    assert_eq!(dispatched[1].name(), Some("リー"));
    assert_eq!(dispatched[1].get("ビザ期限"), Some("2025-12-09"));
    assert_eq!(dispatched[1].get("時給"), Some("1100"));

    let contracted = store
        .get_all(Category::Contracted, &ListQuery::default())
        .unwrap();
    assert_eq!(contracted[0].name(), Some("請負A"));
    assert_eq!(contracted[0].get("社員№"), Some("2001"));
}
