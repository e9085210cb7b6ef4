//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the record store contract over the three category tables.
//! - Isolate SQLite query details from import and analytics orchestration.
//!
//! # Invariants
//! - Repository writes normalize input before persistence.
//! - Every committed mutation carries exactly one audit row.
//! - Repository APIs report missing ids as `None`/`false` rather than errors.

pub mod audit_repo;
pub mod employee_repo;
