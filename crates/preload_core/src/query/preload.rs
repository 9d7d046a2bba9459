//! Preload path resolution and batched many-to-many loading.
//!
//! # Responsibility
//! - Turn requested paths (`Tags`, `Tags.SubTags`, `*`) into a tree of
//!   relations, each node carrying its own optional [`Scope`].
//! - Load one relation level for a batch of owners through its junction
//!   table and hand the rows back grouped by owner id.
//!
//! # Invariants
//! - Intermediate path segments are loaded unconditioned unless they were
//!   requested with their own scope.
//! - Related rows are unique per `(owner, related id)`, even when a scope
//!   joins the junction table a second time.
//! - An empty owner batch never reaches the database.
//! - Scopes are validated when the tree is built, whether or not any owner
//!   rows exist.

use super::scope::{placeholders, RenderedScope, Scope};
use super::{QueryError, QueryResult};
use crate::model::{Model, ModelSchema, RecordId, Relation};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;

/// Path segment selecting every relation of the current level.
pub const ALL_RELATIONS: &str = "*";

const OWNER_ID_CHUNK: usize = 500;
const OWNER_ID_COLUMN: &str = "preload_owner_id";
const LINK_ALIAS: &str = "preload_link";

/// One `preload`/`preload_with` call, resolved lazily at execution time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PreloadRequest {
    pub path: String,
    pub scope: Option<Scope>,
}

/// Node of the resolved preload tree.
///
/// The root node has no scope; every child is keyed by the relation it loads.
#[derive(Debug, Clone, Default)]
pub struct PreloadNode {
    scope: Option<Scope>,
    children: Vec<(&'static Relation, PreloadNode)>,
}

impl PreloadNode {
    /// Resolves `requests` against `schema`, in request order, then checks
    /// that every scope left in the tree renders.
    pub(crate) fn build(
        schema: &'static ModelSchema,
        requests: &[PreloadRequest],
    ) -> QueryResult<Self> {
        let mut root = Self::default();
        for request in requests {
            let segments = split_path(&request.path)?;
            root.insert(schema, &segments, request.scope.as_ref(), &request.path)?;
        }
        root.check_scopes()?;
        Ok(root)
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    pub fn children(&self) -> impl Iterator<Item = (&'static Relation, &PreloadNode)> + '_ {
        self.children.iter().map(|(relation, node)| (*relation, node))
    }

    pub fn child(&self, relation: &str) -> Option<&PreloadNode> {
        self.children
            .iter()
            .find(|(candidate, _)| candidate.name == relation)
            .map(|(_, node)| node)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn insert(
        &mut self,
        schema: &'static ModelSchema,
        segments: &[&str],
        scope: Option<&Scope>,
        path: &str,
    ) -> QueryResult<()> {
        let Some((head, rest)) = segments.split_first() else {
            return Ok(());
        };

        if *head == ALL_RELATIONS {
            if !rest.is_empty() {
                return Err(QueryError::InvalidPreloadPath {
                    path: path.to_string(),
                    reason: "`*` must be the last segment",
                });
            }
            for relation in schema.relations {
                let child = self.child_mut(relation);
                if scope.is_some() {
                    child.scope = scope.cloned();
                }
            }
            return Ok(());
        }

        let relation = schema
            .relation(head)
            .ok_or_else(|| QueryError::UnknownRelation {
                model: schema.name,
                relation: (*head).to_string(),
            })?;
        let child = self.child_mut(relation);
        if rest.is_empty() {
            child.scope = scope.cloned();
            Ok(())
        } else {
            child.insert(relation.target, rest, scope, path)
        }
    }

    fn check_scopes(&self) -> QueryResult<()> {
        if let Some(scope) = &self.scope {
            scope.render()?;
        }
        self.children
            .iter()
            .try_for_each(|(_, child)| child.check_scopes())
    }

    fn child_mut(&mut self, relation: &'static Relation) -> &mut PreloadNode {
        let index = match self
            .children
            .iter()
            .position(|(candidate, _)| candidate.name == relation.name)
        {
            Some(index) => index,
            None => {
                self.children.push((relation, PreloadNode::default()));
                self.children.len() - 1
            }
        };
        &mut self.children[index].1
    }
}

fn split_path(path: &str) -> QueryResult<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').map(str::trim).collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(QueryError::InvalidPreloadPath {
            path: path.to_string(),
            reason: "path segments must not be empty",
        });
    }
    Ok(segments)
}

/// Hydrates every relation under `node` on `records`.
pub(crate) fn preload_into<M: Model>(
    conn: &Connection,
    records: &mut [M],
    node: &PreloadNode,
) -> QueryResult<()> {
    if records.is_empty() {
        return Ok(());
    }
    for (relation, child) in node.children() {
        M::attach(conn, records, relation, child)?;
    }
    Ok(())
}

/// Loads `relation` for `owners` and replaces each owner's container.
///
/// `slot` selects the container on an owner. Owners without an id, or without
/// matching rows, end up with an empty container.
pub fn attach_many<O, R, F>(
    conn: &Connection,
    owners: &mut [O],
    relation: &'static Relation,
    node: &PreloadNode,
    slot: F,
) -> QueryResult<()>
where
    O: Model,
    R: Model,
    F: Fn(&mut O) -> &mut Vec<R>,
{
    let owner_ids: Vec<RecordId> = owners.iter().filter_map(|owner| owner.id()).collect();
    let grouped = load_many_to_many::<R>(conn, relation, &owner_ids, node)?;
    for owner in owners.iter_mut() {
        let related = owner
            .id()
            .and_then(|id| grouped.get(&id).cloned())
            .unwrap_or_default();
        *slot(owner) = related;
    }
    Ok(())
}

/// Loads related `R` rows for `owner_ids` through `relation`'s junction table.
///
/// Rows are filtered by the node's scope, then nested relations of the node
/// are hydrated on the loaded rows before grouping.
pub fn load_many_to_many<R: Model>(
    conn: &Connection,
    relation: &'static Relation,
    owner_ids: &[RecordId],
    node: &PreloadNode,
) -> QueryResult<HashMap<RecordId, Vec<R>>> {
    let unique_ids: Vec<RecordId> = owner_ids
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if unique_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let started_at = Instant::now();
    let rendered = match node.scope() {
        Some(scope) => scope.render()?,
        None => RenderedScope::default(),
    };

    let mut owners: Vec<RecordId> = Vec::new();
    let mut related: Vec<R> = Vec::new();
    let mut seen: HashSet<(RecordId, RecordId)> = HashSet::new();
    for chunk in unique_ids.chunks(OWNER_ID_CHUNK) {
        let sql = relation_sql(relation, &rendered, chunk.len());
        let bind_values: Vec<Value> = chunk
            .iter()
            .map(|id| Value::Integer(*id))
            .chain(rendered.params.iter().cloned())
            .collect();

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        while let Some(row) = rows.next()? {
            let owner_id: RecordId = row.get(OWNER_ID_COLUMN)?;
            let record = R::from_row(row)?;
            let related_id = record.id().ok_or_else(|| {
                QueryError::InvalidData(format!(
                    "{} row without id loaded through {}",
                    relation.target.name, relation.join_table
                ))
            })?;
            if seen.insert((owner_id, related_id)) {
                owners.push(owner_id);
                related.push(record);
            }
        }
    }

    preload_into(conn, &mut related, node)?;

    let row_count = related.len();
    let mut grouped: HashMap<RecordId, Vec<R>> = HashMap::new();
    for (owner_id, record) in owners.into_iter().zip(related) {
        grouped.entry(owner_id).or_default().push(record);
    }

    debug!(
        "event=preload module=query status=ok relation={} owners={} rows={} scoped={} duration_ms={}",
        relation.name,
        unique_ids.len(),
        row_count,
        node.scope().is_some_and(|scope| !scope.is_empty()),
        started_at.elapsed().as_millis()
    );
    Ok(grouped)
}

fn relation_sql(relation: &Relation, rendered: &RenderedScope, owner_count: usize) -> String {
    let target = relation.target;
    let mut sql = format!(
        "SELECT {LINK_ALIAS}.{owner_key} AS {OWNER_ID_COLUMN}, {columns} \
         FROM {table} \
         INNER JOIN {join_table} AS {LINK_ALIAS} ON {LINK_ALIAS}.{related_key} = {table}.id",
        owner_key = relation.owner_key,
        columns = target.select_list(),
        table = target.table,
        join_table = relation.join_table,
        related_key = relation.related_key,
    );
    let owner_filter = format!(
        "{LINK_ALIAS}.{} IN ({})",
        relation.owner_key,
        placeholders(owner_count)
    );
    rendered.write_tail(
        &mut sql,
        &[owner_filter],
        &format!("{}.id ASC", target.table),
    );
    sql
}
