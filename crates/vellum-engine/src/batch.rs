use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vellum_guard::{BypassFlags, GuardReport};
use vellum_store::Projection;
use vellum_types::{Action, ObjectType};

/// One requested write. Its position in the batch is its index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationItem {
    pub action: Action,
    pub object_type: ObjectType,
    /// The object for creates and updates; `{ <id field>: … }` for deletes.
    pub input: Value,
}

impl MutationItem {
    pub fn create(object_type: ObjectType, input: Value) -> Self {
        Self {
            action: Action::Create,
            object_type,
            input,
        }
    }

    pub fn update(object_type: ObjectType, input: Value) -> Self {
        Self {
            action: Action::Update,
            object_type,
            input,
        }
    }

    pub fn delete(object_type: ObjectType, input: Value) -> Self {
        Self {
            action: Action::Delete,
            object_type,
            input,
        }
    }
}

/// Per-call switches.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MutationOptions {
    /// Columns returned by creates and updates, overriding every type's
    /// standard projection.
    pub projection: Option<Projection>,
    /// Passed to every shaper.
    pub additional_data: Value,
    /// Set by seeding scripts.
    pub seeding: bool,
    pub bypass: BypassFlags,
}

impl MutationOptions {
    /// Whether these options switch off a check or mark a seeding run.
    /// Only admin callers may send them.
    pub fn is_privileged(&self) -> bool {
        self.seeding || self.bypass != BypassFlags::default()
    }
}

/// One batch item's result.
#[derive(Clone, Debug, PartialEq)]
pub enum ResultSlot {
    /// The formatted row written by a create or update.
    Object(Value),
    /// The delete found the row and removed it.
    Deleted(bool),
    /// The update shaped to an empty payload and was not sent.
    Skipped,
    /// The delete targeted a row that did not exist at check time.
    Unset,
}

impl ResultSlot {
    pub fn as_object(&self) -> Option<&Value> {
        match self {
            Self::Object(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

impl Serialize for ResultSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Object(v) => v.serialize(serializer),
            Self::Deleted(b) => serializer.serialize_bool(*b),
            Self::Skipped | Self::Unset => serializer.serialize_none(),
        }
    }
}

/// A post-commit hook that returned an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerFailure {
    pub object_type: ObjectType,
    pub message: String,
}

/// What a committed batch produced.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    /// One slot per input, in input order.
    pub results: Vec<ResultSlot>,
    /// Hook failures after commit. The writes stand regardless.
    pub trigger_failures: Vec<TriggerFailure>,
    /// Guard audit trail. `None` for empty batches.
    pub guard: Option<GuardReport>,
}

impl BatchOutcome {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            trigger_failures: Vec::new(),
            guard: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn item_wire_format() {
        let item: MutationItem = serde_json::from_value(json!({
            "action": "Create",
            "objectType": "Note",
            "input": {"id": "tmp1"}
        }))
        .unwrap();
        assert_eq!(item.action, Action::Create);
        assert_eq!(item.object_type.as_str(), "Note");
    }

    #[test]
    fn slots_serialize_flat() {
        let slots = vec![
            ResultSlot::Object(json!({"id": "1"})),
            ResultSlot::Deleted(true),
            ResultSlot::Skipped,
            ResultSlot::Unset,
        ];
        assert_eq!(
            serde_json::to_value(&slots).unwrap(),
            json!([{"id": "1"}, true, null, null])
        );
    }

    #[test]
    fn options_default_from_empty_object() {
        let options: MutationOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(options, MutationOptions::default());
        let options: MutationOptions =
            serde_json::from_value(json!({"seeding": true, "bypass": {"quota": true}})).unwrap();
        assert!(options.seeding && options.bypass.quota);
        assert!(options.is_privileged());
        let projection_only = MutationOptions {
            additional_data: json!({"source": "import"}),
            ..Default::default()
        };
        assert!(!projection_only.is_privileged());
    }
}
