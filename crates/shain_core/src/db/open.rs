//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open per-operation SQLite connections with the store's pragmas.
//! - Run schema initialization once when a store is opened.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`, the configured journal mode
//!   and the configured busy timeout.
//! - Connections are owned by the caller and released on drop, including on
//!   error paths.

use super::schema::initialize;
use super::DbResult;
use crate::config::StoreConfig;
use log::{error, info};
use rusqlite::Connection;
use std::time::Instant;

/// Opens the configured database file, creating its parent directory, and
/// runs schema initialization.
///
/// # Side effects
/// - May create the parent directory and the database file.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(config: &StoreConfig) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=file");

    let result = prepare_parent_dir(config)
        .and_then(|()| connect(config))
        .and_then(|mut conn| {
            initialize(&mut conn)?;
            Ok(conn)
        });

    match result {
        Ok(conn) => {
            info!(
                "event=db_open module=db status=ok mode=file duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=file duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Opens a short-lived connection for one store operation.
///
/// Does not touch the schema; callers rely on `open_db` having run once.
pub fn connect(config: &StoreConfig) -> DbResult<Connection> {
    let conn = Connection::open(&config.db_path)?;
    conn.busy_timeout(config.busy_timeout())?;
    // journal_mode returns the resulting mode as a row.
    conn.query_row(
        &format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()),
        [],
        |row| row.get::<_, String>(0),
    )?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

fn prepare_parent_dir(config: &StoreConfig) -> DbResult<()> {
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
