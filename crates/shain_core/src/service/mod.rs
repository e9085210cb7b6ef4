//! Use-case services over the record store.
//!
//! # Responsibility
//! - Orchestrate workbook import and read-only analytics.
//! - Keep callers decoupled from SQL and workbook details.

pub mod analytics_service;
pub mod import_service;
