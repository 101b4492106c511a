//! Declarative input schemas.
//!
//! [`ObjectSchema`] is the stock [`InputSchema`]: a list of [`FieldRule`]s
//! that check presence, cast loosely typed JSON into the declared kind and
//! bound lengths. Errors carry dotted paths relative to the input root.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};
use vellum_types::Record;

use crate::error::FieldError;
use crate::hooks::InputSchema;

/// What a field holds after casting.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    /// Strings; numbers and booleans are rendered as text.
    String,
    /// Integers; integral floats and numeric strings are accepted.
    Int,
    Float,
    /// Booleans; `"true"` and `"false"` are accepted.
    Bool,
    /// Identifiers: non-empty strings or integers, emitted as strings.
    /// Placeholders are ids too.
    Id,
    /// RFC 3339 timestamps or epoch milliseconds, emitted as UTC RFC 3339.
    DateTime,
    /// A nested object, optionally validated by its own schema.
    Object(Option<Box<ObjectSchema>>),
    List(Box<FieldKind>),
    Any,
}

/// One field's constraints.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldRule {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub nullable: bool,
    /// Characters for strings, items for lists.
    pub max_len: Option<usize>,
    pub trim: bool,
    /// Inserted when the field is absent.
    pub default: Option<Value>,
}

impl FieldRule {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            nullable: false,
            max_len: None,
            trim: false,
            default: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Int)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    pub fn id(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Id)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    pub fn object(name: impl Into<String>, schema: Option<ObjectSchema>) -> Self {
        Self::new(name, FieldKind::Object(schema.map(Box::new)))
    }

    pub fn list(name: impl Into<String>, item: FieldKind) -> Self {
        Self::new(name, FieldKind::List(Box::new(item)))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn max_len(mut self, max: usize) -> Self {
        self.max_len = Some(max);
        self
    }

    pub fn trim(mut self) -> Self {
        self.trim = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Rules for one object.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectSchema {
    pub fields: Vec<FieldRule>,
    /// Keep fields without a rule instead of rejecting them.
    pub allow_unknown: bool,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, rule: FieldRule) -> Self {
        self.fields.push(rule);
        self
    }

    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    /// The same rules with nothing required and no defaults, for updates.
    pub fn partial(&self) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .cloned()
                .map(|mut rule| {
                    rule.required = false;
                    rule.default = None;
                    rule
                })
                .collect(),
            allow_unknown: self.allow_unknown,
        }
    }

    fn check(&self, input: &Record) -> Result<Record, Vec<FieldError>> {
        let mut output = Record::new();
        let mut errors = Vec::new();

        for rule in &self.fields {
            match input.get(&rule.name) {
                None => {
                    if let Some(default) = &rule.default {
                        output.insert(rule.name.clone(), default.clone());
                    } else if rule.required {
                        errors.push(FieldError::new(&rule.name, "is required"));
                    }
                }
                Some(Value::Null) => {
                    if rule.nullable {
                        output.insert(rule.name.clone(), Value::Null);
                    } else {
                        errors.push(FieldError::new(&rule.name, "must not be null"));
                    }
                }
                Some(value) => match cast(&rule.kind, rule, value) {
                    Ok(cast) => {
                        output.insert(rule.name.clone(), cast);
                    }
                    Err(nested) => {
                        errors.extend(nested.into_iter().map(|e| e.nested(&rule.name)));
                    }
                },
            }
        }

        for (key, value) in input {
            if self.fields.iter().any(|r| &r.name == key) {
                continue;
            }
            if self.allow_unknown {
                output.insert(key.clone(), value.clone());
            } else {
                errors.push(FieldError::new(key, "unknown field"));
            }
        }

        if errors.is_empty() {
            Ok(output)
        } else {
            Err(errors)
        }
    }
}

impl InputSchema for ObjectSchema {
    fn validate(&self, input: &Record) -> Result<Record, Vec<FieldError>> {
        self.check(input)
    }
}

fn fail(message: impl Into<String>) -> Vec<FieldError> {
    vec![FieldError::new("", message)]
}

fn cast(kind: &FieldKind, rule: &FieldRule, value: &Value) -> Result<Value, Vec<FieldError>> {
    match kind {
        FieldKind::String => {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return Err(fail("expected a string")),
            };
            let text = if rule.trim {
                text.trim().to_string()
            } else {
                text
            };
            if let Some(max) = rule.max_len {
                if text.chars().count() > max {
                    return Err(fail(format!("longer than {max} characters")));
                }
            }
            Ok(Value::String(text))
        }
        FieldKind::Int => match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::from(i))
                } else {
                    match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                            Ok(Value::from(f as i64))
                        }
                        _ => Err(fail("expected an integer")),
                    }
                }
            }
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| fail("expected an integer")),
            _ => Err(fail("expected an integer")),
        },
        FieldKind::Float => {
            let f = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            f.and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| fail("expected a number"))
        }
        FieldKind::Bool => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(fail("expected a boolean")),
        },
        FieldKind::Id => match value {
            Value::String(s) if !s.trim().is_empty() => Ok(Value::String(s.trim().to_string())),
            Value::Number(n) if n.is_u64() || n.is_i64() => Ok(Value::String(n.to_string())),
            _ => Err(fail("expected an id")),
        },
        FieldKind::DateTime => {
            let parsed = match value {
                Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc)),
                Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
                _ => None,
            };
            parsed
                .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)))
                .ok_or_else(|| fail("expected an RFC 3339 timestamp"))
        }
        FieldKind::Object(schema) => {
            let Value::Object(map) = value else {
                return Err(fail("expected an object"));
            };
            match schema {
                Some(schema) => schema.check(map).map(Value::Object),
                None => Ok(value.clone()),
            }
        }
        FieldKind::List(item) => {
            let Value::Array(items) = value else {
                return Err(fail("expected a list"));
            };
            if let Some(max) = rule.max_len {
                if items.len() > max {
                    return Err(fail(format!("more than {max} items")));
                }
            }
            let item_rule = FieldRule {
                max_len: None,
                ..rule.clone()
            };
            let mut output = Vec::with_capacity(items.len());
            let mut errors = Vec::new();
            for (i, v) in items.iter().enumerate() {
                match cast(item, &item_rule, v) {
                    Ok(cast) => output.push(cast),
                    Err(nested) => errors.extend(
                        nested
                            .into_iter()
                            .map(|e| e.nested(&format!("[{i}]"))),
                    ),
                }
            }
            if errors.is_empty() {
                Ok(Value::Array(output))
            } else {
                Err(errors)
            }
        }
        FieldKind::Any => Ok(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    fn note_schema() -> ObjectSchema {
        ObjectSchema::new()
            .field(FieldRule::string("title").required().trim().max_len(10))
            .field(FieldRule::int("priority").default_value(json!(0)))
            .field(FieldRule::boolean("isPublic"))
            .field(FieldRule::id("parentId").nullable())
            .field(FieldRule::datetime("dueAt"))
            .field(FieldRule::list("tags", FieldKind::String).max_len(3))
    }

    #[test]
    fn casts_and_defaults() {
        let out = note_schema()
            .validate(&record(json!({
                "title": "  hello ",
                "isPublic": "true",
                "parentId": 42,
                "dueAt": "2024-03-01T12:00:00+02:00",
                "tags": ["a", 1]
            })))
            .unwrap();
        assert_eq!(out["title"], json!("hello"));
        assert_eq!(out["priority"], json!(0));
        assert_eq!(out["isPublic"], json!(true));
        assert_eq!(out["parentId"], json!("42"));
        assert_eq!(out["dueAt"], json!("2024-03-01T10:00:00.000Z"));
        assert_eq!(out["tags"], json!(["a", "1"]));
    }

    #[test]
    fn collects_every_error_with_paths() {
        let errors = note_schema()
            .validate(&record(json!({
                "priority": "high",
                "tags": ["ok", {"no": 1}],
                "extra": true
            })))
            .unwrap_err();
        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"title"));
        assert!(paths.contains(&"priority"));
        assert!(paths.contains(&"tags[1]"));
        assert!(paths.contains(&"extra"));
    }

    #[test]
    fn max_len_bounds_strings_and_lists() {
        let errors = note_schema()
            .validate(&record(json!({
                "title": "far too long a title",
                "tags": ["a", "b", "c", "d"]
            })))
            .unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn null_handling() {
        let schema = note_schema();
        assert!(schema
            .validate(&record(json!({"title": "x", "parentId": null})))
            .is_ok());
        let errors = schema
            .validate(&record(json!({"title": "x", "priority": null})))
            .unwrap_err();
        assert_eq!(errors[0].message, "must not be null");
    }

    #[test]
    fn partial_drops_required_and_defaults() {
        let out = note_schema()
            .partial()
            .validate(&record(json!({"isPublic": false})))
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn nested_object_schema() {
        let schema = ObjectSchema::new().field(FieldRule::object(
            "meta",
            Some(ObjectSchema::new().field(FieldRule::id("id").required())),
        ));
        let errors = schema
            .validate(&record(json!({"meta": {"other": 1}})))
            .unwrap_err();
        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["meta.id", "meta.other"]);
    }

    #[test]
    fn allow_unknown_keeps_extra_fields() {
        let out = ObjectSchema::new()
            .allow_unknown()
            .validate(&record(json!({"anything": [1]})))
            .unwrap();
        assert_eq!(out["anything"], json!([1]));
    }
}
