use rusqlite::Connection;
use shain_core::db::schema::{latest_version, table_columns};
use shain_core::db::{open_db, DbError};
use shain_core::{Category, StoreConfig};

#[test]
fn open_db_creates_all_tables() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(dir.path().join("nested").join("shain.db"));

    let conn = open_db(&config).unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for category in Category::ALL {
        assert_table_exists(&conn, category.table());
        let columns = table_columns(&conn, category.table()).unwrap();
        assert_eq!(columns.len(), category.columns().len() + 3);
        assert_eq!(columns[0], "id");
        assert!(columns.iter().any(|column| column == "deleted_at"));
    }
    assert_table_exists(&conn, "audit_log");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(dir.path().join("shain.db"));

    let first = open_db(&config).unwrap();
    let before = table_columns(&first, "genzai").unwrap();
    drop(first);

    let second = open_db(&config).unwrap();
    assert_eq!(schema_version(&second), latest_version());
    assert_eq!(table_columns(&second, "genzai").unwrap(), before);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&StoreConfig::new(&path)).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn legacy_table_gains_missing_columns_and_keeps_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE ukeoi (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            \"現在\" TEXT,
            \"氏名\" TEXT,
            updated_at TEXT
        );
        INSERT INTO ukeoi (\"現在\", \"氏名\", updated_at)
        VALUES ('在職中', '田中', '2024-03-01 09:30:00');",
    )
    .unwrap();
    drop(conn);

    let conn = open_db(&StoreConfig::new(&path)).unwrap();
    let columns = table_columns(&conn, "ukeoi").unwrap();
    for column in Category::Contracted.columns() {
        assert!(columns.iter().any(|present| present == column), "{column} missing");
    }
    assert!(columns.iter().any(|column| column == "deleted_at"));

    let (name, deleted_at): (String, Option<i64>) = conn
        .query_row(
            "SELECT \"氏名\", deleted_at FROM ukeoi WHERE id = 1;",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(name, "田中");
    assert_eq!(deleted_at, None);
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
