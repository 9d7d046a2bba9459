//! Composable join/filter/order clauses.
//!
//! A [`Scope`] is what a preload callback returns: extra `JOIN`s, `WHERE`
//! predicates and ordering applied on top of the relation query. The same
//! type filters root rows in [`super::Query`].
//!
//! # Invariants
//! - Column references must be `column` or `table.column`.
//! - Raw fragments use anonymous `?` placeholders and their count must match
//!   the bound parameters.
//! - Parameters are always bound, never interpolated into SQL text.

use super::{QueryError, QueryResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("valid identifier regex")
});

/// Bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param(Value);

impl Param {
    pub fn null() -> Self {
        Self(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        self.0 == Value::Null
    }

    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Self(Value::Text(value.to_string()))
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Self(Value::Text(value))
    }
}

impl From<&String> for Param {
    fn from(value: &String) -> Self {
        Self(Value::Text(value.clone()))
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Self(Value::Integer(value))
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Self(Value::Integer(i64::from(value)))
    }
}

impl From<u32> for Param {
    fn from(value: u32) -> Self {
        Self(Value::Integer(i64::from(value)))
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Self(Value::Integer(i64::from(value)))
    }
}

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Self(Value::Real(value))
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Self::null, Into::into)
    }
}

/// One `WHERE` predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column = value`, or `column IS NULL` for a null value.
    Eq { column: String, value: Param },
    /// `column <> value`, or `column IS NOT NULL` for a null value.
    NotEq { column: String, value: Param },
    /// `column IN (...)`; an empty list matches no rows.
    In { column: String, values: Vec<Param> },
    /// Verbatim SQL fragment with `?` placeholders.
    Raw { sql: String, params: Vec<Param> },
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Into<Param>) -> Self {
        Self::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn not_eq(column: impl Into<String>, value: impl Into<Param>) -> Self {
        Self::NotEq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn is_in<V: Into<Param>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn raw<V: Into<Param>>(sql: impl Into<String>, params: impl IntoIterator<Item = V>) -> Self {
        Self::Raw {
            sql: sql.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    fn render(&self, predicates: &mut Vec<String>, params: &mut Vec<Value>) -> QueryResult<()> {
        match self {
            Self::Eq { column, value } => {
                let column = checked_identifier(column)?;
                if value.is_null() {
                    predicates.push(format!("{column} IS NULL"));
                } else {
                    predicates.push(format!("{column} = ?"));
                    params.push(value.value().clone());
                }
            }
            Self::NotEq { column, value } => {
                let column = checked_identifier(column)?;
                if value.is_null() {
                    predicates.push(format!("{column} IS NOT NULL"));
                } else {
                    predicates.push(format!("{column} <> ?"));
                    params.push(value.value().clone());
                }
            }
            Self::In { column, values } => {
                let column = checked_identifier(column)?;
                if values.is_empty() {
                    predicates.push("0 = 1".to_string());
                } else {
                    predicates.push(format!("{column} IN ({})", placeholders(values.len())));
                    params.extend(values.iter().map(|value| value.value().clone()));
                }
            }
            Self::Raw { sql, params: bound } => {
                let sql = checked_fragment(sql)?;
                let expected = count_placeholders(sql)?;
                if expected != bound.len() {
                    return Err(QueryError::InvalidClause {
                        sql: sql.to_string(),
                        reason: format!(
                            "expected {expected} parameters for placeholders, got {}",
                            bound.len()
                        ),
                    });
                }
                predicates.push(format!("({sql})"));
                params.extend(bound.iter().map(|value| value.value().clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct OrderBy {
    column: String,
    direction: Direction,
}

/// Join/filter/order clause applied to one query level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    joins: Vec<String>,
    conditions: Vec<Condition>,
    order: Vec<OrderBy>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a verbatim join clause, e.g.
    /// `JOIN item_tags ON item_tags.tag_id = tags.id`.
    pub fn joins(mut self, clause: impl Into<String>) -> Self {
        self.joins.push(clause.into());
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
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

    /// Adds a raw predicate such as `tags.status = ?`.
    pub fn where_sql<V: Into<Param>>(
        self,
        sql: impl Into<String>,
        params: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filter(Condition::raw(sql, params))
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order.push(OrderBy {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty() && self.conditions.is_empty() && self.order.is_empty()
    }

    pub(crate) fn render(&self) -> QueryResult<RenderedScope> {
        let mut rendered = RenderedScope::default();
        for join in &self.joins {
            let join = checked_fragment(join)?;
            if count_placeholders(join)? > 0 {
                return Err(QueryError::InvalidClause {
                    sql: join.to_string(),
                    reason: "join fragments cannot bind parameters".to_string(),
                });
            }
            rendered.joins.push(join.to_string());
        }
        for condition in &self.conditions {
            condition.render(&mut rendered.predicates, &mut rendered.params)?;
        }
        for order in &self.order {
            let column = checked_identifier(&order.column)?;
            rendered
                .order_by
                .push(format!("{column} {}", order.direction.as_sql()));
        }
        Ok(rendered)
    }
}

/// SQL pieces of a validated [`Scope`], ready to splice into a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RenderedScope {
    pub joins: Vec<String>,
    pub predicates: Vec<String>,
    /// Values for `predicates`, in placeholder order.
    pub params: Vec<Value>,
    pub order_by: Vec<String>,
}

impl RenderedScope {
    /// Appends joins, `WHERE` (after `leading` predicates) and `ORDER BY`
    /// (before `tie_breaker`) to `sql`.
    pub fn write_tail(&self, sql: &mut String, leading: &[String], tie_breaker: &str) {
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }

        let predicates: Vec<&str> = leading
            .iter()
            .chain(self.predicates.iter())
            .map(String::as_str)
            .collect();
        if !predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }

        sql.push_str(" ORDER BY ");
        for order in &self.order_by {
            sql.push_str(order);
            sql.push_str(", ");
        }
        sql.push_str(tie_breaker);
    }
}

pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn checked_identifier(value: &str) -> QueryResult<&str> {
    let trimmed = value.trim();
    if IDENTIFIER_RE.is_match(trimmed) {
        Ok(trimmed)
    } else {
        Err(QueryError::InvalidIdentifier(value.to_string()))
    }
}

fn checked_fragment(sql: &str) -> QueryResult<&str> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(QueryError::InvalidClause {
            sql: sql.to_string(),
            reason: "fragment is empty".to_string(),
        });
    }
    if trimmed.contains(';') {
        return Err(QueryError::InvalidClause {
            sql: sql.to_string(),
            reason: "fragment must not contain `;`".to_string(),
        });
    }
    Ok(trimmed)
}

/// Counts `?` placeholders outside string literals and quoted identifiers.
fn count_placeholders(sql: &str) -> QueryResult<usize> {
    let mut count = 0;
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();
    while let Some(current) = chars.next() {
        if let Some(open) = quote {
            if current == open {
                // A doubled quote is an escaped quote inside the literal.
                if chars.peek() == Some(&open) {
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }
        match current {
            '\'' | '"' => quote = Some(current),
            '?' => {
                if chars.peek().is_some_and(|next| next.is_ascii_digit()) {
                    return Err(QueryError::InvalidClause {
                        sql: sql.to_string(),
                        reason: "numbered placeholders are not supported; use `?`".to_string(),
                    });
                }
                count += 1;
            }
            _ => {}
        }
    }
    Ok(count)
}
