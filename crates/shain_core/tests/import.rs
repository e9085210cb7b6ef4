use shain_core::{
    AnalyticsService, AuditAction, AuditFilter, CellValue, Category, EmployeeRepository,
    ImportService, ListQuery, MemoryWorkbook, Sheet, SheetPreview, SqliteEmployeeStore,
    StoreError,
};
use tempfile::TempDir;

fn open_store() -> (TempDir, SqliteEmployeeStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteEmployeeStore::open_path(dir.path().join("shain.db")).unwrap();
    (dir, store)
}

fn sheet(headers: &[&str], rows: Vec<Vec<CellValue>>) -> Sheet {
    Sheet::new(headers.iter().map(|h| h.to_string()).collect(), rows)
}

fn dispatched_sheet() -> Sheet {
    let row = |status: &str, no: i64, name: &str| {
        vec![
            CellValue::from(status),
            CellValue::from(no),
            CellValue::from(name),
            CellValue::from(46_113.0),
            CellValue::from("⚠"),
        ]
    };
    sheet(
        &["現在", "社員№", "氏名", "ビザ期限", "ｱﾗｰﾄ(ﾋﾞｻﾞ更新)"],
        vec![
            row("在職中", 1, "A"),
            row("在職中", 2, "B"),
            vec![CellValue::Empty, CellValue::from("0"), CellValue::from("nan"), CellValue::Empty, CellValue::Empty],
            row("退社", 3, "C"),
            row("在職中", 4, "D"),
        ],
    )
}

fn contracted_sheet() -> Sheet {
    sheet(
        &["現在", "氏名", "未知の列"],
        (0..3)
            .map(|i| {
                vec![
                    CellValue::from("在職中"),
                    CellValue::from(format!("U{i}")),
                    CellValue::from("ignored"),
                ]
            })
            .collect(),
    )
}

fn staff_sheet() -> Sheet {
    sheet(
        &["№", "氏名", "入社日"],
        vec![vec![
            CellValue::from("在職中"),
            CellValue::from("S"),
            CellValue::from(chrono::NaiveDate::from_ymd_opt(2021, 4, 1).unwrap()),
        ]],
    )
}

fn full_workbook() -> MemoryWorkbook {
    MemoryWorkbook::new()
        .with_sheet("DBGenzaiX", dispatched_sheet())
        .with_sheet("DBUkeoiX", contracted_sheet())
        .with_sheet("DBStaffX", staff_sheet())
}

#[test]
fn import_replaces_all_categories() {
    let (_dir, store) = open_store();

    let report = ImportService::new(&store)
        .import_from(&mut full_workbook(), None)
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.counts[&Category::Dispatched], 4);
    assert_eq!(report.counts[&Category::Contracted], 3);
    assert_eq!(report.counts[&Category::Staff], 1);
    assert_eq!(report.total(), 8);

    let dispatched = store
        .get_all(Category::Dispatched, &ListQuery::default())
        .unwrap();
    assert_eq!(dispatched.len(), 4);
    assert_eq!(dispatched[0].get("社員№"), Some("1"));
    assert_eq!(dispatched[0].get("ビザ期限"), Some("2026-04-01"));

    let staff = store.get_all(Category::Staff, &ListQuery::default()).unwrap();
    assert_eq!(staff[0].get("現在"), Some("在職中"));
    assert_eq!(staff[0].get("入社日"), Some("2021-04-01"));

    let audit = AnalyticsService::new(&store)
        .audit_log(AuditFilter::System, 10)
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, AuditAction::Import);
    assert_eq!(audit[0].category, None);
    assert_eq!(audit[0].payload["counts"]["genzai"], 4);
    assert_eq!(audit[0].payload["counts"]["staff"], 1);
    assert_eq!(audit[0].payload["failed"].as_array().unwrap().len(), 0);
}

#[test]
fn import_truncates_existing_rows_including_soft_deleted() {
    let (_dir, store) = open_store();
    let stale = store
        .add(Category::Dispatched, &[("氏名", CellValue::from("old"))])
        .unwrap();
    store
        .add(Category::Dispatched, &[("氏名", CellValue::from("gone"))])
        .map(|id| store.delete(Category::Dispatched, id).unwrap())
        .unwrap();

    ImportService::new(&store)
        .import_from(&mut full_workbook(), None)
        .unwrap();

    assert!(store.get_by_id(Category::Dispatched, stale).unwrap().is_none());
    assert!(store.get_deleted(Category::Dispatched).unwrap().is_empty());
    assert_eq!(
        store
            .get_all(Category::Dispatched, &ListQuery::default())
            .unwrap()
            .len(),
        4
    );
}

#[test]
fn missing_sheet_is_reported_and_leaves_its_rows_untouched() {
    let (_dir, store) = open_store();
    store
        .add(Category::Staff, &[("氏名", CellValue::from("残る人"))])
        .unwrap();

    let mut workbook = MemoryWorkbook::new()
        .with_sheet("DBGenzaiX", dispatched_sheet())
        .with_sheet("DBUkeoiX", contracted_sheet());
    let report = ImportService::new(&store)
        .import_from(&mut workbook, None)
        .unwrap();

    assert!(!report.is_complete());
    assert!(report.failures.contains_key(&Category::Staff));
    assert_eq!(report.counts[&Category::Staff], 0);
    assert_eq!(report.total(), 7);

    let staff = store.get_all(Category::Staff, &ListQuery::default()).unwrap();
    assert_eq!(staff.len(), 1);
    assert_eq!(staff[0].name(), Some("残る人"));

    let audit = AnalyticsService::new(&store)
        .audit_log(AuditFilter::System, 1)
        .unwrap();
    assert_eq!(audit[0].payload["failed"][0], "staff");
}

#[test]
fn workbook_without_readable_sheets_writes_nothing() {
    let (_dir, store) = open_store();
    store
        .add(Category::Staff, &[("氏名", CellValue::from("残る人"))])
        .unwrap();

    let report = ImportService::new(&store)
        .import_from(&mut MemoryWorkbook::new(), None)
        .unwrap();

    assert_eq!(report.total(), 0);
    assert_eq!(report.failures.len(), 3);
    assert!(store.has_data().unwrap());
    assert!(AnalyticsService::new(&store)
        .audit_log(AuditFilter::System, 10)
        .unwrap()
        .is_empty());
}

#[test]
fn progress_reports_each_category_boundary() {
    let (_dir, store) = open_store();
    let mut events: Vec<(String, f64)> = Vec::new();
    let mut record = |message: &str, fraction: f64| events.push((message.to_string(), fraction));

    ImportService::new(&store)
        .import_from(&mut full_workbook(), Some(&mut record))
        .unwrap();

    assert_eq!(events.len(), 6);
    assert_eq!(events[0].1, 0.0);
    assert!(events[0].0.contains("派遣社員"));
    assert!(events.iter().all(|(_, fraction)| (0.0..=1.0).contains(fraction)));
    let (last_message, last_fraction) = events.last().unwrap();
    assert_eq!(*last_fraction, 1.0);
    assert!(last_message.contains("スタッフ"));
    assert!(last_message.contains('1'));
}

#[test]
fn preview_reports_columns_without_writing() {
    let (_dir, store) = open_store();

    let previews = ImportService::new(&store).preview_from(&mut full_workbook());

    assert_eq!(previews.len(), 3);
    match &previews[0] {
        SheetPreview::Ready {
            category,
            row_count,
            columns,
            missing_required,
            head,
            ..
        } => {
            assert_eq!(*category, Category::Dispatched);
            assert_eq!(*row_count, 4);
            assert_eq!(missing_required, &vec!["派遣先".to_string()]);
            assert!(!columns.iter().any(|c| c == "ｱﾗｰﾄ(ﾋﾞｻﾞ更新)"));
            assert_eq!(head[0][3].as_deref(), Some("2026-04-01"));
        }
        other => panic!("unexpected preview: {other:?}"),
    }
    match &previews[1] {
        SheetPreview::Ready {
            ignored_columns,
            missing_required,
            ..
        } => {
            assert_eq!(ignored_columns, &vec!["未知の列".to_string()]);
            assert_eq!(missing_required, &vec!["社員№".to_string()]);
        }
        other => panic!("unexpected preview: {other:?}"),
    }
    match &previews[2] {
        SheetPreview::Ready {
            columns,
            row_count,
            missing_required,
            ..
        } => {
            assert_eq!(columns[0], "現在");
            assert_eq!(*row_count, 1);
            assert_eq!(missing_required, &vec!["社員№".to_string()]);
        }
        other => panic!("unexpected preview: {other:?}"),
    }

    assert!(!store.has_data().unwrap());
}

#[test]
fn import_file_rejects_missing_workbook() {
    let (dir, store) = open_store();

    let err = ImportService::new(&store)
        .import_file(dir.path().join("missing.xlsm"), None)
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[test]
fn imported_scenario_summary_and_visa_alerts() {
    let (_dir, store) = open_store();
    let expiry = chrono::Local::now().date_naive() + chrono::Duration::days(20);

    let mut workbook = MemoryWorkbook::new()
        .with_sheet(
            "DBGenzaiX",
            sheet(
                &["現在", "氏名", "ビザ期限"],
                vec![
                    vec![
                        CellValue::from("在職中"),
                        CellValue::from("X"),
                        CellValue::from(expiry),
                    ],
                    vec![CellValue::from("退社"), CellValue::from("R"), CellValue::Empty],
                ],
            ),
        )
        .with_sheet(
            "DBUkeoiX",
            sheet(
                &["現在", "氏名"],
                vec![vec![CellValue::from("在職中"), CellValue::from("U")]],
            ),
        )
        .with_sheet(
            "DBStaffX",
            sheet(
                &["", "氏名", "入社日"],
                vec![vec![
                    CellValue::from("在職中"),
                    CellValue::from("S"),
                    CellValue::from("2022-10-01"),
                ]],
            ),
        );
    ImportService::new(&store)
        .import_from(&mut workbook, None)
        .unwrap();

    let analytics = AnalyticsService::new(&store);
    let stats = analytics.summary_stats().unwrap();
    assert_eq!(
        (stats.total.total, stats.total.active, stats.total.retired),
        (4, 3, 1)
    );

    let alerts = analytics.visa_alerts(30, true).unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].name.as_deref(), Some("X"));
    assert_eq!(alerts[0].days_left, 20);
    assert_eq!(alerts[0].severity, shain_core::Severity::Urgent);
    assert!(analytics.visa_alerts(5, true).unwrap().is_empty());
}

#[test]
fn preview_with_all_required_columns_reports_none_missing() {
    let (_dir, store) = open_store();
    let mut workbook = MemoryWorkbook::new().with_sheet(
        "DBStaffX",
        sheet(
            &["現在", "社員№", "氏名"],
            vec![
                vec![CellValue::from("在職中"), CellValue::from(7), CellValue::from("S")],
                vec![CellValue::Empty, CellValue::Empty, CellValue::Empty],
            ],
        ),
    );

    let previews = ImportService::new(&store).preview_from(&mut workbook);

    assert!(matches!(previews[0], SheetPreview::Failed { .. }));
    match &previews[2] {
        SheetPreview::Ready {
            row_count,
            missing_required,
            ..
        } => {
            assert_eq!(*row_count, 1);
            assert!(missing_required.is_empty());
        }
        other => panic!("unexpected preview: {other:?}"),
    }
}
