//! Root record queries.

use super::preload::{preload_into, PreloadNode, PreloadRequest};
use super::scope::{Condition, Direction, Param, Scope};
use super::{QueryError, QueryResult};
use crate::model::Model;
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::time::Instant;

/// Query over one record type with optional preloads.
///
/// ```ignore
/// let items = Query::<Item>::new()
///     .preload_with("Tags", |scope| scope.where_eq("tags.status", "active"))
///     .find(&conn)?;
/// ```
pub struct Query<M: Model> {
    scope: Scope,
    preloads: Vec<PreloadRequest>,
    limit: Option<u32>,
    offset: u32,
    marker: PhantomData<fn() -> M>,
}

impl<M: Model> Query<M> {
    pub fn new() -> Self {
        Self {
            scope: Scope::new(),
            preloads: Vec::new(),
            limit: None,
            offset: 0,
            marker: PhantomData,
        }
    }

    /// Eagerly loads every row of the relation path (e.g. `Tags.SubTags`).
    pub fn preload(mut self, path: impl Into<String>) -> Self {
        self.preloads.push(PreloadRequest {
            path: path.into(),
            scope: None,
        });
        self
    }

    /// Eagerly loads the relation path, restricted by the scope `build`
    /// returns. For nested paths the scope applies to the last segment only.
    pub fn preload_with(
        mut self,
        path: impl Into<String>,
        build: impl FnOnce(Scope) -> Scope,
    ) -> Self {
        self.preloads.push(PreloadRequest {
            path: path.into(),
            scope: Some(build(Scope::new())),
        });
        self
    }

    pub fn joins(mut self, clause: impl Into<String>) -> Self {
        self.scope = self.scope.joins(clause);
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.scope = self.scope.filter(condition);
        self
    }

    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Param>) -> Self {
        self.filter(Condition::eq(column, value))
    }

    pub fn where_ne(self, column: impl Into<String>, value: impl Into<Param>) -> Self {
        self.filter(Condition::not_eq(column, value))
    }

    pub fn where_in<V: Into<Param>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filter(Condition::is_in(column, values))
    }

    pub fn where_sql<V: Into<Param>>(
        self,
        sql: impl Into<String>,
        params: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filter(Condition::raw(sql, params))
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.scope = self.scope.order_by(column, direction);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Returns matching rows ordered by the requested order, then id, with
    /// every requested relation hydrated.
    ///
    /// # Errors
    /// - Returns `UnknownRelation`/`InvalidPreloadPath` for bad preload paths,
    ///   before touching the database.
    /// - Returns `InvalidIdentifier`/`InvalidClause` for rejected root or
    ///   preload scopes, also before touching the database.
    /// - Returns `Db` for SQLite failures.
    pub fn find(&self, conn: &Connection) -> QueryResult<Vec<M>> {
        let started_at = Instant::now();
        let schema = M::schema();
        let tree = PreloadNode::build(schema, &self.preloads)?;
        let rendered = self.scope.render()?;

        let distinct = if rendered.joins.is_empty() {
            ""
        } else {
            "DISTINCT "
        };
        let mut sql = format!(
            "SELECT {distinct}{} FROM {}",
            schema.select_list(),
            schema.table
        );
        rendered.write_tail(&mut sql, &[], &format!("{}.id ASC", schema.table));

        let mut bind_values = rendered.params.clone();
        match (self.limit, self.offset) {
            (None, 0) => {}
            (limit, offset) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                bind_values.push(Value::Integer(limit.map_or(-1, i64::from)));
                bind_values.push(Value::Integer(i64::from(offset)));
            }
        }

        let mut records = Vec::new();
        {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(bind_values))?;
            while let Some(row) = rows.next()? {
                records.push(M::from_row(row)?);
            }
        }

        preload_into(conn, &mut records, &tree)?;

        debug!(
            "event=find module=query status=ok model={} rows={} preloads={} duration_ms={}",
            schema.name,
            records.len(),
            self.preloads.len(),
            started_at.elapsed().as_millis()
        );
        Ok(records)
    }

    /// Returns the first matching row, if any.
    pub fn first(&self, conn: &Connection) -> QueryResult<Option<M>> {
        let mut single = self.clone();
        single.limit = Some(1);
        Ok(single.find(conn)?.into_iter().next())
    }

    /// Counts matching root rows; preloads, ordering and paging are ignored.
    pub fn count(&self, conn: &Connection) -> QueryResult<u64> {
        let schema = M::schema();
        let rendered = self.scope.render()?;
        let mut sql = format!(
            "SELECT COUNT(DISTINCT {table}.id) FROM {table}",
            table = schema.table
        );
        for join in &rendered.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !rendered.predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&rendered.predicates.join(" AND "));
        }

        let count: i64 =
            conn.query_row(&sql, params_from_iter(rendered.params.iter()), |row| {
                row.get(0)
            })?;
        u64::try_from(count)
            .map_err(|_| QueryError::InvalidData(format!("negative row count {count}")))
    }
}

impl<M: Model> Default for Query<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Clone for Query<M> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            preloads: self.preloads.clone(),
            limit: self.limit,
            offset: self.offset,
            marker: PhantomData,
        }
    }
}

impl<M: Model> Debug for Query<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("model", &M::schema().name)
            .field("scope", &self.scope)
            .field("preloads", &self.preloads)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}
