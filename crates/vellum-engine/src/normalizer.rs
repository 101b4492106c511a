use serde_json::Value;
use vellum_types::{Action, ObjectType, Record};

use crate::batch::MutationItem;
use crate::error::{EngineError, EngineResult, FieldError, FieldErrors};
use crate::registry::TypeRegistry;

/// A batch item after validation and casting.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedItem {
    /// Position in the caller's batch.
    pub index: usize,
    pub action: Action,
    pub object_type: ObjectType,
    /// Cast input. The id field is always present as a string. Deletes
    /// carry nothing else.
    pub input: Record,
    /// The id exactly as the caller sent it (numbers rendered as text).
    pub client_id: String,
}

impl NormalizedItem {
    pub fn id_value<'a>(&'a self, id_field: &str) -> Option<&'a Value> {
        self.input.get(id_field)
    }
}

/// Validate and cast every item against its type's schema.
///
/// Every item is checked and every error collected before returning, so a
/// caller sees all problems in one round trip. With `skip_validation` the
/// schemas are not consulted; id presence and object shape still are.
pub fn normalize(
    registry: &TypeRegistry,
    batch: &[MutationItem],
    skip_validation: bool,
) -> EngineResult<Vec<NormalizedItem>> {
    let mut items = Vec::with_capacity(batch.len());
    let mut errors = Vec::new();

    for (index, item) in batch.iter().enumerate() {
        let at = index.to_string();
        let descriptor = match registry.get(&item.object_type) {
            Ok(d) => d,
            Err(_) => {
                errors.push(FieldError::new(
                    format!("{at}.objectType"),
                    format!("unknown object type {}", item.object_type),
                ));
                continue;
            }
        };
        let Value::Object(input) = &item.input else {
            errors.push(FieldError::new(&at, "expected an object"));
            continue;
        };

        let id_field = descriptor.id_field.as_str();
        let client_id = match input.get(id_field) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) if n.is_u64() || n.is_i64() => n.to_string(),
            Some(_) => {
                errors.push(FieldError::new(format!("{at}.{id_field}"), "expected an id"));
                continue;
            }
            None => {
                errors.push(FieldError::new(format!("{at}.{id_field}"), "is required"));
                continue;
            }
        };

        let mut data = match item.action {
            Action::Delete => Record::new(),
            Action::Create | Action::Update => {
                let mut data = input.clone();
                data.remove(id_field);
                if skip_validation {
                    data
                } else {
                    let schema = match item.action {
                        Action::Create => &descriptor.create_schema,
                        _ => &descriptor.update_schema,
                    };
                    match schema.validate(&data) {
                        Ok(cast) => cast,
                        Err(field_errors) => {
                            errors.extend(field_errors.into_iter().map(|e| e.nested(&at)));
                            continue;
                        }
                    }
                }
            }
        };
        data.insert(id_field.to_string(), Value::String(client_id.clone()));

        items.push(NormalizedItem {
            index,
            action: item.action,
            object_type: item.object_type.clone(),
            input: data,
            client_id,
        });
    }

    if errors.is_empty() {
        tracing::debug!(batch_len = items.len(), "batch normalized");
        Ok(items)
    } else {
        tracing::debug!(errors = errors.len(), "batch failed validation");
        Err(EngineError::Validation(FieldErrors(errors)))
    }
}
