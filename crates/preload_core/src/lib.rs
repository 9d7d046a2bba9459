//! Catalog storage with eager loading of many-to-many relations.
//!
//! Items own tags, tags own sub-tags, both through junction tables in an
//! embedded SQLite database. [`Query`] loads root records and preloads
//! requested relation paths, each level optionally narrowed by its own
//! [`Scope`].

pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;

pub use db::{open_db, open_db_in_memory, open_db_with, DbError, DbLocation, DbOptions};
pub use logging::{default_log_level, init_logging, logging_status, LogConfig};
pub use model::item::TAGS_RELATION;
pub use model::tag::SUB_TAGS_RELATION;
pub use model::{Item, Model, RecordId, RecordValidationError, SubTag, Tag};
pub use query::preload::ALL_RELATIONS;
pub use query::{Condition, Direction, Param, Query, QueryError, QueryResult, Scope};
pub use repo::catalog_repo::{
    CatalogRepository, RepoError, RepoResult, SqliteCatalogRepository,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
