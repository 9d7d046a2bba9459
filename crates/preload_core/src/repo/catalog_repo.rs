//! Catalog repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist items, tags and sub-tags together with their junction rows.
//! - Own relation replacement logic (`replace_item_tags`,
//!   `replace_tag_sub_tags`) with atomic semantics.
//!
//! # Invariants
//! - Records created without id get the generated rowid written back.
//! - Attached records that already carry an id are inserted only when
//!   missing; existing rows are linked, never overwritten.
//! - Caller structs are only updated after the transaction commits.

use crate::db::DbError;
use crate::model::item::ITEM_SCHEMA;
use crate::model::tag::{SUB_TAG_SCHEMA, TAG_SCHEMA};
use crate::model::{Item, RecordId, RecordValidationError, SubTag, Tag};
use log::debug;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for catalog persistence operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(RecordValidationError),
    Db(DbError),
    NotFound { model: &'static str, id: RecordId },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { model, id } => write!(f, "{model} not found: {id}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RecordValidationError> for RepoError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for catalog writes.
pub trait CatalogRepository {
    /// Creates an item plus its attached tags and sub-tags.
    fn create_item(&mut self, item: &mut Item) -> RepoResult<RecordId>;
    /// Creates a tag plus its attached sub-tags.
    fn create_tag(&mut self, tag: &mut Tag) -> RepoResult<RecordId>;
    fn create_sub_tag(&mut self, sub_tag: &mut SubTag) -> RepoResult<RecordId>;
    /// Replaces all tag links of one item in one transaction.
    fn replace_item_tags(&mut self, item_id: RecordId, tag_ids: &[RecordId]) -> RepoResult<()>;
    /// Replaces all sub-tag links of one tag in one transaction.
    fn replace_tag_sub_tags(
        &mut self,
        tag_id: RecordId,
        sub_tag_ids: &[RecordId],
    ) -> RepoResult<()>;
    /// Deletes one item; its junction rows cascade.
    fn delete_item(&mut self, item_id: RecordId) -> RepoResult<()>;
}

/// SQLite-backed catalog repository.
pub struct SqliteCatalogRepository<'conn> {
    conn: &'conn mut Connection,
}

/// How an insert treats an explicit id that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnExisting {
    Fail,
    Keep,
}

impl OnExisting {
    fn insert_verb(self) -> &'static str {
        match self {
            Self::Fail => "INSERT",
            Self::Keep => "INSERT OR IGNORE",
        }
    }
}

impl<'conn> SqliteCatalogRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_catalog_connection_ready(conn)?;
        Ok(Self { conn })
    }

    /// Read access for queries issued while the repository is alive.
    pub fn connection(&self) -> &Connection {
        &*self.conn
    }

    fn begin(&mut self) -> RepoResult<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

impl CatalogRepository for SqliteCatalogRepository<'_> {
    fn create_item(&mut self, item: &mut Item) -> RepoResult<RecordId> {
        item.validate()?;

        let mut staged = item.clone();
        let created_at = *staged.created_at.get_or_insert_with(now_epoch_ms);
        let tx = self.begin()?;
        let item_id = match staged.id {
            Some(id) => {
                tx.execute(
                    "INSERT INTO items (id, name, created_at) VALUES (?1, ?2, ?3);",
                    params![id, staged.name.as_str(), created_at],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO items (name, created_at) VALUES (?1, ?2);",
                    params![staged.name.as_str(), created_at],
                )?;
                tx.last_insert_rowid()
            }
        };
        staged.id = Some(item_id);

        for tag in &mut staged.tags {
            let tag_id = save_tag(&tx, tag, OnExisting::Keep)?;
            tx.execute(
                "INSERT OR IGNORE INTO item_tags (item_id, tag_id) VALUES (?1, ?2);",
                params![item_id, tag_id],
            )?;
        }
        tx.commit()?;

        debug!(
            "event=record_create module=repo status=ok model=Item tags={}",
            staged.tags.len()
        );
        *item = staged;
        Ok(item_id)
    }

    fn create_tag(&mut self, tag: &mut Tag) -> RepoResult<RecordId> {
        tag.validate()?;

        let mut staged = tag.clone();
        let tx = self.begin()?;
        let tag_id = save_tag(&tx, &mut staged, OnExisting::Fail)?;
        tx.commit()?;

        *tag = staged;
        Ok(tag_id)
    }

    fn create_sub_tag(&mut self, sub_tag: &mut SubTag) -> RepoResult<RecordId> {
        sub_tag.validate()?;

        let mut staged = sub_tag.clone();
        let tx = self.begin()?;
        let sub_tag_id = save_sub_tag(&tx, &mut staged, OnExisting::Fail)?;
        tx.commit()?;

        *sub_tag = staged;
        Ok(sub_tag_id)
    }

    fn replace_item_tags(&mut self, item_id: RecordId, tag_ids: &[RecordId]) -> RepoResult<()> {
        let tx = self.begin()?;
        if !record_exists(&tx, ITEM_SCHEMA.table, item_id)? {
            return Err(RepoError::NotFound {
                model: ITEM_SCHEMA.name,
                id: item_id,
            });
        }

        tx.execute("DELETE FROM item_tags WHERE item_id = ?1;", [item_id])?;
        for tag_id in tag_ids.iter().copied().collect::<BTreeSet<_>>() {
            if !record_exists(&tx, TAG_SCHEMA.table, tag_id)? {
                return Err(RepoError::NotFound {
                    model: TAG_SCHEMA.name,
                    id: tag_id,
                });
            }
            tx.execute(
                "INSERT INTO item_tags (item_id, tag_id) VALUES (?1, ?2);",
                params![item_id, tag_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn replace_tag_sub_tags(
        &mut self,
        tag_id: RecordId,
        sub_tag_ids: &[RecordId],
    ) -> RepoResult<()> {
        let tx = self.begin()?;
        if !record_exists(&tx, TAG_SCHEMA.table, tag_id)? {
            return Err(RepoError::NotFound {
                model: TAG_SCHEMA.name,
                id: tag_id,
            });
        }

        tx.execute("DELETE FROM tag_sub_tags WHERE tag_id = ?1;", [tag_id])?;
        for sub_tag_id in sub_tag_ids.iter().copied().collect::<BTreeSet<_>>() {
            if !record_exists(&tx, SUB_TAG_SCHEMA.table, sub_tag_id)? {
                return Err(RepoError::NotFound {
                    model: SUB_TAG_SCHEMA.name,
                    id: sub_tag_id,
                });
            }
            tx.execute(
                "INSERT INTO tag_sub_tags (tag_id, sub_tag_id) VALUES (?1, ?2);",
                params![tag_id, sub_tag_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn delete_item(&mut self, item_id: RecordId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM items WHERE id = ?1;", [item_id])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                model: ITEM_SCHEMA.name,
                id: item_id,
            });
        }
        Ok(())
    }
}

fn save_tag(tx: &Transaction<'_>, tag: &mut Tag, on_existing: OnExisting) -> RepoResult<RecordId> {
    let tag_id = match tag.id {
        Some(id) => {
            tx.execute(
                &format!(
                    "{} INTO tags (id, name, status) VALUES (?1, ?2, ?3);",
                    on_existing.insert_verb()
                ),
                params![id, tag.name.as_str(), tag.status.as_str()],
            )?;
            id
        }
        None => {
            tx.execute(
                "INSERT INTO tags (name, status) VALUES (?1, ?2);",
                params![tag.name.as_str(), tag.status.as_str()],
            )?;
            tx.last_insert_rowid()
        }
    };
    tag.id = Some(tag_id);

    for sub_tag in &mut tag.sub_tags {
        let sub_tag_id = save_sub_tag(tx, sub_tag, OnExisting::Keep)?;
        tx.execute(
            "INSERT OR IGNORE INTO tag_sub_tags (tag_id, sub_tag_id) VALUES (?1, ?2);",
            params![tag_id, sub_tag_id],
        )?;
    }

    Ok(tag_id)
}

fn save_sub_tag(
    tx: &Transaction<'_>,
    sub_tag: &mut SubTag,
    on_existing: OnExisting,
) -> RepoResult<RecordId> {
    let sub_tag_id = match sub_tag.id {
        Some(id) => {
            tx.execute(
                &format!(
                    "{} INTO sub_tags (id, name, status) VALUES (?1, ?2, ?3);",
                    on_existing.insert_verb()
                ),
                params![id, sub_tag.name.as_str(), sub_tag.status.as_str()],
            )?;
            id
        }
        None => {
            tx.execute(
                "INSERT INTO sub_tags (name, status) VALUES (?1, ?2);",
                params![sub_tag.name.as_str(), sub_tag.status.as_str()],
            )?;
            tx.last_insert_rowid()
        }
    };
    sub_tag.id = Some(sub_tag_id);
    Ok(sub_tag_id)
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn record_exists(tx: &Transaction<'_>, table: &str, id: RecordId) -> RepoResult<bool> {
    let exists: i64 = tx.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1);"),
        [id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn ensure_catalog_connection_ready(conn: &Connection) -> RepoResult<()> {
    const REQUIRED: &[(&str, &[&str])] = &[
        ("items", &["id", "name", "created_at"]),
        ("tags", &["id", "name", "status"]),
        ("sub_tags", &["id", "name", "status"]),
        ("item_tags", &["item_id", "tag_id"]),
        ("tag_sub_tags", &["tag_id", "sub_tag_id"]),
    ];

    for &(table, columns) in REQUIRED {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
