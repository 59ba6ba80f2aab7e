//! Relational and document schema models
//!
//! Graph edges between tables (foreign keys) and between collections
//! (merged attributes) are names resolved through lookups, so the
//! relational side may be cyclic while collections stay a strict tree.

pub mod document;
pub mod relational;

pub use document::{Attachment, Collection, NoSqlModel};
pub use relational::{ForeignKey, RelationalModel, Table};
