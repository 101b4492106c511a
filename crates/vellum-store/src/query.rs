use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vellum_types::{CanonicalId, Record};

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Which columns a read or write returns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection(Option<Vec<String>>);

impl Projection {
    /// Every column.
    pub fn all() -> Self {
        Self(None)
    }

    /// Only the listed columns.
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Some(fields.into_iter().map(Into::into).collect()))
    }

    pub fn is_all(&self) -> bool {
        self.0.is_none()
    }

    /// Copy the projected columns out of `record`. Missing columns are
    /// omitted rather than reported.
    pub fn apply(&self, record: &Record) -> Record {
        match &self.0 {
            None => record.clone(),
            Some(fields) => fields
                .iter()
                .filter_map(|f| record.get(f).map(|v| (f.clone(), v.clone())))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Row predicate understood by every backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Eq { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    /// Inclusive bounds; either side may be open.
    Range {
        field: String,
        gte: Option<Value>,
        lte: Option<Value>,
    },
    /// Case-insensitive substring match on a string column.
    Contains { field: String, needle: String },
    All(Vec<Filter>),
    Any(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Conjunction that flattens away trivial cases.
    pub fn all(mut filters: Vec<Filter>) -> Option<Self> {
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Self::All(filters)),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Eq { field, value } => record
                .get(field)
                .is_some_and(|v| compare_values(v, value) == Ordering::Equal),
            Self::In { field, values } => record.get(field).is_some_and(|v| {
                values
                    .iter()
                    .any(|candidate| compare_values(v, candidate) == Ordering::Equal)
            }),
            Self::Range { field, gte, lte } => {
                let Some(v) = record.get(field).filter(|v| !v.is_null()) else {
                    return false;
                };
                gte.as_ref()
                    .map_or(true, |lo| compare_values(v, lo) != Ordering::Less)
                    && lte
                        .as_ref()
                        .map_or(true, |hi| compare_values(v, hi) != Ordering::Greater)
            }
            Self::Contains { field, needle } => record
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|s| s.to_lowercase().contains(&needle.to_lowercase())),
            Self::All(filters) => filters.iter().all(|f| f.matches(record)),
            Self::Any(filters) => filters.iter().any(|f| f.matches(record)),
        }
    }
}

/// Total order over JSON scalars used for sorting and comparisons.
///
/// Null < bool < number < string < array < object. Numbers compare
/// numerically, strings lexically (RFC 3339 timestamps therefore sort
/// chronologically). A numeric string compared with a number is compared
/// numerically so that ids sent either way line up.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            match (s.parse::<f64>(), n.as_f64()) {
                (Ok(parsed), Some(num)) => {
                    let ord = parsed.partial_cmp(&num).unwrap_or(Ordering::Equal);
                    if matches!(a, Value::String(_)) {
                        ord
                    } else {
                        ord.reverse()
                    }
                }
                _ => rank(a).cmp(&rank(b)),
            }
        }
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(l, r)| compare_values(l, r))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Primary sort column. Rows always tie-break on the id column in the same
/// direction, so the order is total.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// A relational read.
///
/// When `cursor` is set, the result starts *at* the cursor row and `skip`
/// is applied from there, so `skip: 1` yields the rows after the cursor. A
/// cursor that names no matching row yields an empty result.
#[derive(Clone, Debug, PartialEq)]
pub struct FindQuery {
    pub table: String,
    pub id_field: String,
    pub filter: Option<Filter>,
    pub order_by: Option<OrderBy>,
    pub cursor: Option<CanonicalId>,
    pub skip: u64,
    pub take: Option<u64>,
    pub select: Projection,
}

impl FindQuery {
    pub fn new(table: impl Into<String>, id_field: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id_field: id_field.into(),
            filter: None,
            order_by: None,
            cursor: None,
            skip: 0,
            take: None,
            select: Projection::all(),
        }
    }
}

/// Parameterised distance-ranking query over a table's stored embeddings.
///
/// Returns ids nearest-first. Rows without an embedding never match.
#[derive(Clone, Debug, PartialEq)]
pub struct SimilarityQuery {
    pub table: String,
    pub id_field: String,
    pub embedding: Vec<f32>,
    pub filter: Option<Filter>,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Write operations
// ---------------------------------------------------------------------------

/// One write inside an atomic transaction.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreOp {
    Create {
        table: String,
        id_field: String,
        data: Record,
        select: Projection,
    },
    Update {
        table: String,
        id_field: String,
        id: CanonicalId,
        data: Record,
        select: Projection,
    },
    DeleteMany {
        table: String,
        id_field: String,
        ids: Vec<CanonicalId>,
    },
}

impl StoreOp {
    pub fn table(&self) -> &str {
        match self {
            Self::Create { table, .. } | Self::Update { table, .. } | Self::DeleteMany { table, .. } => {
                table
            }
        }
    }
}

/// Output of one [`StoreOp`], in operation order.
#[derive(Clone, Debug, PartialEq)]
pub enum OpOutput {
    /// The created or updated row, projected.
    Row(Record),
    /// Number of rows removed by a delete-many.
    Deleted(u64),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn projection_selects_fields() {
        let r = record(json!({"id": "1", "title": "A", "secret": true}));
        let p = Projection::fields(["id", "title", "missing"]);
        assert_eq!(Value::Object(p.apply(&r)), json!({"id": "1", "title": "A"}));
        assert_eq!(Projection::all().apply(&r), r);
    }

    #[test]
    fn range_filter_is_inclusive() {
        let r = record(json!({"createdAt": "2024-05-01T00:00:00Z"}));
        let inside = Filter::Range {
            field: "createdAt".into(),
            gte: Some(json!("2024-05-01T00:00:00Z")),
            lte: Some(json!("2024-06-01T00:00:00Z")),
        };
        let outside = Filter::Range {
            field: "createdAt".into(),
            gte: Some(json!("2024-05-02T00:00:00Z")),
            lte: None,
        };
        assert!(inside.matches(&r));
        assert!(!outside.matches(&r));
    }

    #[test]
    fn eq_matches_numeric_strings() {
        let r = record(json!({"ownerId": "42"}));
        assert!(Filter::eq("ownerId", 42).matches(&r));
        assert!(!Filter::eq("ownerId", 43).matches(&r));
    }

    #[test]
    fn contains_is_case_insensitive() {
        let r = record(json!({"title": "Hello World"}));
        let f = Filter::Contains {
            field: "title".into(),
            needle: "WORLD".into(),
        };
        assert!(f.matches(&r));
    }

    #[test]
    fn all_flattens() {
        assert_eq!(Filter::all(vec![]), None);
        let single = Filter::eq("a", 1);
        assert_eq!(Filter::all(vec![single.clone()]), Some(single));
    }

    #[test]
    fn value_ordering() {
        assert_eq!(compare_values(&json!(null), &json!(false)), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&json!("10"), &json!(9)), Ordering::Greater);
        assert_eq!(compare_values(&json!(9), &json!("10")), Ordering::Less);
    }
}
