//! Domain model for the employee registry.
//!
//! # Responsibility
//! - Define categories, their column sets and field roles.
//! - Define raw input cells, stored records and audit entries.
//!
//! # Invariants
//! - Categories are closed variants with fixed column lists; there is no
//!   shared polymorphic row shape beyond overlapping column names.
//! - Deletion is represented by a soft-delete timestamp until hard delete.

pub mod category;
pub mod cell;
pub mod record;
