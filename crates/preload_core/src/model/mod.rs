//! Catalog records and their relation metadata.
//!
//! # Responsibility
//! - Define the `Item`, `Tag` and `SubTag` records shared by repository and
//!   query code.
//! - Describe each record's table, columns and many-to-many relations in
//!   static metadata so preload paths can be validated before SQL runs.
//!
//! # Invariants
//! - `id == None` means the record has not been persisted yet.
//! - A relation container is only meaningful after it was preloaded; a plain
//!   find leaves it empty.

pub mod item;
pub mod schema;
pub mod tag;
pub mod validation;

pub use item::Item;
pub use schema::{Model, ModelSchema, RecordId, Relation};
pub use tag::{SubTag, Tag};
pub use validation::RecordValidationError;
