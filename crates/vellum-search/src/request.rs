use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vellum_store::OrderBy;
use vellum_types::{CanonicalId, ObjectType};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Which rows a search may return.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Everything the caller may read: public rows and the caller's own.
    /// Admins see every row.
    #[default]
    Visible,
    /// Only rows owned by the caller.
    Mine,
    /// Only public rows, whoever asks.
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Mine => "mine",
            Self::Public => "public",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One page request against one object type.
///
/// `filters` maps a column to the value it must equal; an array value
/// matches any of its elements. A `cursor` (the last id of the previous
/// page) bounds relational pages; hybrid pages use `offset` instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub object_type: ObjectType,
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
    #[serde(default)]
    pub sort: Option<OrderBy>,
    #[serde(default)]
    pub cursor: Option<CanonicalId>,
    #[serde(default)]
    pub offset: u64,
    #[serde(default = "default_take")]
    pub take: u64,
    /// Free text. A non-blank query on a type with text search switches to
    /// hybrid ranking.
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
}

fn default_take() -> u64 {
    20
}

impl SearchRequest {
    pub fn new(object_type: ObjectType) -> Self {
        Self {
            object_type,
            filters: BTreeMap::new(),
            sort: None,
            cursor: None,
            offset: 0,
            take: default_take(),
            query: None,
            visibility: Visibility::default(),
            date_from: None,
            date_to: None,
        }
    }

    pub fn take(mut self, take: u64) -> Self {
        self.take = take;
        self
    }

    pub fn after(mut self, cursor: CanonicalId) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn sort(mut self, order: OrderBy) -> Self {
        self.sort = Some(order);
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    /// The query trimmed, lower-cased and with whitespace collapsed, or
    /// `None` when it is blank.
    pub fn normalized_query(&self) -> Option<String> {
        let normalized = self
            .query
            .as_deref()?
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ");
        (!normalized.is_empty()).then_some(normalized)
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub cursor: CanonicalId,
    pub node: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<CanonicalId>,
}

/// One page of results.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub edges: Vec<Edge>,
    pub page_info: PageInfo,
}

impl Connection {
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn ids(&self) -> Vec<CanonicalId> {
        self.edges.iter().map(|e| e.cursor).collect()
    }
}
