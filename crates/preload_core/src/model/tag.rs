//! Tag and SubTag records.

use super::schema::{Model, ModelSchema, RecordId, Relation};
use super::validation::{ensure_id, ensure_name, RecordValidationError};
use crate::query::preload::attach_many;
use crate::query::{PreloadNode, QueryError, QueryResult};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

/// Preload name of `Tag::sub_tags`.
pub const SUB_TAGS_RELATION: &str = "SubTags";

static TAG_RELATIONS: [Relation; 1] = [Relation {
    name: SUB_TAGS_RELATION,
    target: &SUB_TAG_SCHEMA,
    join_table: "tag_sub_tags",
    owner_key: "tag_id",
    related_key: "sub_tag_id",
}];

pub static TAG_SCHEMA: ModelSchema = ModelSchema {
    name: "Tag",
    table: "tags",
    columns: &["id", "name", "status"],
    relations: &TAG_RELATIONS,
};

pub static SUB_TAG_SCHEMA: ModelSchema = ModelSchema {
    name: "SubTag",
    table: "sub_tags",
    columns: &["id", "name", "status"],
    relations: &[],
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Option<RecordId>,
    pub name: String,
    /// Free-text lifecycle marker such as `active` or `inactive`.
    pub status: String,
    #[serde(default)]
    pub sub_tags: Vec<SubTag>,
}

impl Tag {
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self::with_sub_tags(name, status, Vec::new())
    }

    pub fn with_sub_tags(
        name: impl Into<String>,
        status: impl Into<String>,
        sub_tags: Vec<SubTag>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            status: status.into(),
            sub_tags,
        }
    }

    pub fn validate(&self) -> Result<(), RecordValidationError> {
        ensure_id(TAG_SCHEMA.name, self.id)?;
        ensure_name(TAG_SCHEMA.name, &self.name)?;
        self.sub_tags.iter().try_for_each(SubTag::validate)
    }
}

impl Model for Tag {
    fn schema() -> &'static ModelSchema {
        &TAG_SCHEMA
    }

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            name: row.get("name")?,
            status: row.get("status")?,
            sub_tags: Vec::new(),
        })
    }

    fn attach(
        conn: &Connection,
        owners: &mut [Self],
        relation: &'static Relation,
        node: &PreloadNode,
    ) -> QueryResult<()> {
        match relation.name {
            SUB_TAGS_RELATION => attach_many(conn, owners, relation, node, |tag: &mut Tag| {
                &mut tag.sub_tags
            }),
            other => Err(QueryError::UnknownRelation {
                model: TAG_SCHEMA.name,
                relation: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTag {
    pub id: Option<RecordId>,
    pub name: String,
    pub status: String,
}

impl SubTag {
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            status: status.into(),
        }
    }

    pub fn validate(&self) -> Result<(), RecordValidationError> {
        ensure_id(SUB_TAG_SCHEMA.name, self.id)?;
        ensure_name(SUB_TAG_SCHEMA.name, &self.name)
    }
}

impl Model for SubTag {
    fn schema() -> &'static ModelSchema {
        &SUB_TAG_SCHEMA
    }

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            name: row.get("name")?,
            status: row.get("status")?,
        })
    }

    fn attach(
        _conn: &Connection,
        _owners: &mut [Self],
        relation: &'static Relation,
        _node: &PreloadNode,
    ) -> QueryResult<()> {
        Err(QueryError::UnknownRelation {
            model: SUB_TAG_SCHEMA.name,
            relation: relation.name.to_string(),
        })
    }
}
