//! Item record: the root of the catalog graph.

use super::schema::{Model, ModelSchema, RecordId, Relation};
use super::tag::{Tag, TAG_SCHEMA};
use super::validation::{ensure_id, ensure_name, RecordValidationError};
use crate::query::preload::attach_many;
use crate::query::{PreloadNode, QueryError, QueryResult};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

/// Preload name of `Item::tags`.
pub const TAGS_RELATION: &str = "Tags";

static ITEM_RELATIONS: [Relation; 1] = [Relation {
    name: TAGS_RELATION,
    target: &TAG_SCHEMA,
    join_table: "item_tags",
    owner_key: "item_id",
    related_key: "tag_id",
}];

pub static ITEM_SCHEMA: ModelSchema = ModelSchema {
    name: "Item",
    table: "items",
    columns: &["id", "name", "created_at"],
    relations: &ITEM_RELATIONS,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: Option<RecordId>,
    pub name: String,
    /// Unix epoch milliseconds; filled on create when `None`.
    pub created_at: Option<i64>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Item {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_tags(name, Vec::new())
    }

    /// Creates an unsaved item that links `tags` when persisted.
    pub fn with_tags(name: impl Into<String>, tags: Vec<Tag>) -> Self {
        Self {
            id: None,
            name: name.into(),
            created_at: None,
            tags,
        }
    }

    /// Validates this item and every attached tag and sub-tag.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        ensure_id(ITEM_SCHEMA.name, self.id)?;
        ensure_name(ITEM_SCHEMA.name, &self.name)?;
        self.tags.iter().try_for_each(Tag::validate)
    }
}

impl Model for Item {
    fn schema() -> &'static ModelSchema {
        &ITEM_SCHEMA
    }

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            name: row.get("name")?,
            created_at: Some(row.get("created_at")?),
            tags: Vec::new(),
        })
    }

    fn attach(
        conn: &Connection,
        owners: &mut [Self],
        relation: &'static Relation,
        node: &PreloadNode,
    ) -> QueryResult<()> {
        match relation.name {
            TAGS_RELATION => attach_many(conn, owners, relation, node, |item: &mut Item| {
                &mut item.tags
            }),
            other => Err(QueryError::UnknownRelation {
                model: ITEM_SCHEMA.name,
                relation: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Item, ITEM_SCHEMA};
    use crate::model::{RecordValidationError, SubTag, Tag};

    #[test]
    fn validate_walks_nested_graph() {
        let item = Item::with_tags(
            "Item1",
            vec![Tag::with_sub_tags("Tag1", "active", vec![SubTag::new(" ", "active")])],
        );
        assert_eq!(
            item.validate(),
            Err(RecordValidationError::BlankName { model: "SubTag" })
        );
    }

    #[test]
    fn validate_rejects_non_positive_ids() {
        let mut item = Item::new("Item1");
        item.id = Some(0);
        assert!(matches!(
            item.validate(),
            Err(RecordValidationError::NonPositiveId { model: "Item", id: 0 })
        ));
    }

    #[test]
    fn schema_resolves_tags_relation() {
        let relation = ITEM_SCHEMA.relation("Tags").expect("Tags should be declared");
        assert_eq!(relation.join_table, "item_tags");
        assert_eq!(relation.target.table, "tags");
        assert!(ITEM_SCHEMA.relation("tags").is_none());
        assert_eq!(
            ITEM_SCHEMA.select_list(),
            "items.id, items.name, items.created_at"
        );
    }
}
