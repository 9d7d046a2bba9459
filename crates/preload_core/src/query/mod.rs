//! Record queries with eager loading of many-to-many relations.
//!
//! # Responsibility
//! - Build root `SELECT`s for one record type from a composable [`Scope`].
//! - Resolve preload paths (`Tags`, `Tags.SubTags`, `*`) against static
//!   relation metadata and hydrate every requested level in batches.
//!
//! # Invariants
//! - Preload paths are validated before any SQL is executed.
//! - Every preloaded owner gets its container replaced, empty when nothing
//!   matched the relation's scope.
//! - One relation query per level (per id chunk), never one per owner.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod find;
pub mod preload;
mod scope;

pub use find::Query;
pub use preload::PreloadNode;
pub use scope::{Condition, Direction, Param, Scope};

pub type QueryResult<T> = Result<T, QueryError>;

/// Query-layer error for clause validation, path resolution and SQL failures.
#[derive(Debug)]
pub enum QueryError {
    Db(DbError),
    /// Preload path names a relation the model does not declare.
    UnknownRelation {
        model: &'static str,
        relation: String,
    },
    InvalidPreloadPath {
        path: String,
        reason: &'static str,
    },
    /// Column reference is not `column` or `table.column`.
    InvalidIdentifier(String),
    /// Raw join/where fragment rejected before execution.
    InvalidClause {
        sql: String,
        reason: String,
    },
    InvalidData(String),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UnknownRelation { model, relation } => {
                write!(f, "{model} has no relation named `{relation}`")
            }
            Self::InvalidPreloadPath { path, reason } => {
                write!(f, "invalid preload path `{path}`: {reason}")
            }
            Self::InvalidIdentifier(value) => write!(f, "invalid column identifier `{value}`"),
            Self::InvalidClause { sql, reason } => write!(f, "invalid clause `{sql}`: {reason}"),
            Self::InvalidData(message) => write!(f, "invalid persisted record data: {message}"),
        }
    }
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for QueryError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for QueryError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
