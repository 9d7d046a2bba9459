//! Static relation metadata and the `Model` contract.
//!
//! # Responsibility
//! - Map record types to tables, selectable columns and relations.
//! - Let the query layer hydrate one relation on a batch of owners without
//!   knowing concrete record types.
//!
//! # Invariants
//! - Every table has an integer `id` primary key.
//! - Junction tables hold exactly `(owner_key, related_key)` pairs.

use crate::query::{PreloadNode, QueryResult};
use rusqlite::{Connection, Row};

/// Row identifier of every catalog table.
pub type RecordId = i64;

/// Table-level description of one record type.
#[derive(Debug)]
pub struct ModelSchema {
    /// Record type name used in errors and logs.
    pub name: &'static str,
    pub table: &'static str,
    /// Columns read by `Model::from_row`, `id` first.
    pub columns: &'static [&'static str],
    pub relations: &'static [Relation],
}

impl ModelSchema {
    /// Looks up a relation by its preload name (e.g. `Tags`).
    pub fn relation(&'static self, name: &str) -> Option<&'static Relation> {
        self.relations.iter().find(|relation| relation.name == name)
    }

    /// Comma separated, table-qualified column list for `SELECT`.
    pub fn select_list(&self) -> String {
        self.columns
            .iter()
            .map(|column| format!("{}.{}", self.table, column))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Many-to-many relation mediated by a junction table.
#[derive(Debug)]
pub struct Relation {
    /// Preload path segment naming this relation.
    pub name: &'static str,
    pub target: &'static ModelSchema,
    pub join_table: &'static str,
    /// Junction column referencing the owning record.
    pub owner_key: &'static str,
    /// Junction column referencing the related record.
    pub related_key: &'static str,
}

/// Contract implemented by every catalog record.
pub trait Model: Clone + Sized {
    fn schema() -> &'static ModelSchema;

    fn id(&self) -> Option<RecordId>;

    /// Decodes one record from a row selected with `ModelSchema::select_list`.
    ///
    /// Relation containers are left empty.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Loads `relation` for every owner in `owners` and replaces the
    /// corresponding container, recursing into `node`'s children.
    fn attach(
        conn: &Connection,
        owners: &mut [Self],
        relation: &'static Relation,
        node: &PreloadNode,
    ) -> QueryResult<()>;
}
