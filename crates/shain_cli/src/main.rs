//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `shain_core` linkage and, given `SHAIN_DB_PATH`, store access.
//! - Keep output deterministic for quick local sanity checks.

use shain_core::{AnalyticsService, SqliteEmployeeStore, StoreConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("shain_core version={}", shain_core::core_version());

    if std::env::var_os(shain_core::config::ENV_DB_PATH).is_none() {
        return ExitCode::SUCCESS;
    }

    match print_summary() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn print_summary() -> Result<(), String> {
    let config = StoreConfig::from_env().map_err(|err| err.to_string())?;
    shain_core::init_from_config(&config).map_err(|err| err.to_string())?;

    let store = SqliteEmployeeStore::open(config).map_err(|err| err.to_string())?;
    let stats = AnalyticsService::new(&store)
        .summary_stats()
        .map_err(|err| err.to_string())?;

    println!("db_path={}", store.config().db_path.display());
    for (category, counts) in &stats.categories {
        println!(
            "{} total={} active={} retired={}",
            category.table(),
            counts.total,
            counts.active,
            counts.retired
        );
    }
    println!("all total={}", stats.total.total);
    Ok(())
}
