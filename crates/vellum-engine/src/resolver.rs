//! Placeholder id resolution.
//!
//! Clients refer to objects created in the same batch through placeholders
//! (`"tmp1"`). Resolution runs in two passes:
//!
//! 1. Walk every create's tree. Each node whose id (the descriptor's id
//!    field at the root, `id` below it) is not a canonical id gets a freshly
//!    minted one. The same placeholder always maps to the same id.
//! 2. Rewrite every string or number anywhere in the batch that matches a
//!    placeholder, so references between sibling creates line up.
//!
//! Rewriting builds new trees. A resolved batch contains no placeholder
//! keys, so resolving it again changes nothing.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use vellum_types::{Action, CanonicalId, IdGenerator, Record};

use crate::error::EngineResult;
use crate::normalizer::NormalizedItem;
use crate::registry::TypeRegistry;

/// Nested nodes carry their id under this key.
const NESTED_ID_FIELD: &str = "id";

/// Read-only map from client placeholder to the canonical id minted for it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaceholderMap(HashMap<String, CanonicalId>);

impl PlaceholderMap {
    pub fn get(&self, placeholder: &str) -> Option<CanonicalId> {
        self.0.get(placeholder).copied()
    }

    pub fn contains(&self, placeholder: &str) -> bool {
        self.0.contains_key(placeholder)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, CanonicalId)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// The canonical id a value denotes: itself when already canonical,
    /// otherwise whatever its placeholder resolved to.
    pub fn resolve_value(&self, value: &Value) -> Option<CanonicalId> {
        CanonicalId::from_value(value).or_else(|| placeholder_key(value).and_then(|k| self.get(&k)))
    }
}

/// Text used to look a primitive up in the map. Strings are trimmed the
/// way item ids are; numbers are compared by their decimal rendering.
/// Blank strings are never placeholders.
fn placeholder_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Pass 1
// ---------------------------------------------------------------------------

/// Mint a canonical id for every placeholder used as a create's id.
pub fn collect_placeholders(
    items: &[NormalizedItem],
    registry: &TypeRegistry,
    generator: &IdGenerator,
) -> EngineResult<PlaceholderMap> {
    let mut found = Vec::new();
    let mut taken = HashSet::new();

    for item in items.iter().filter(|i| i.action == Action::Create) {
        let descriptor = registry.get(&item.object_type)?;
        if let Some(id) = item.input.get(&descriptor.id_field) {
            note_id(id, &mut found, &mut taken);
        }
        for (key, value) in &item.input {
            if key != &descriptor.id_field {
                collect_nested(value, &mut found, &mut taken);
            }
        }
    }

    let mut map = HashMap::with_capacity(found.len());
    for placeholder in found {
        if map.contains_key(&placeholder) {
            continue;
        }
        let id = loop {
            let candidate = generator.next_id();
            if taken.insert(candidate) {
                break candidate;
            }
        };
        map.insert(placeholder, id);
    }
    Ok(PlaceholderMap(map))
}

fn note_id(value: &Value, found: &mut Vec<String>, taken: &mut HashSet<CanonicalId>) {
    if let Some(id) = CanonicalId::from_value(value) {
        taken.insert(id);
    } else if let Some(key) = placeholder_key(value) {
        found.push(key);
    }
}

fn collect_nested(value: &Value, found: &mut Vec<String>, taken: &mut HashSet<CanonicalId>) {
    match value {
        Value::Object(map) => {
            if let Some(id) = map.get(NESTED_ID_FIELD) {
                note_id(id, found, taken);
            }
            for child in map.values() {
                collect_nested(child, found, taken);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_nested(child, found, taken);
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Pass 2
// ---------------------------------------------------------------------------

/// A copy of `value` with every placeholder replaced by its canonical id,
/// written as a decimal string. Object keys are left alone.
pub fn rewrite(value: &Value, map: &PlaceholderMap) -> Value {
    match value {
        Value::String(_) | Value::Number(_) => placeholder_key(value)
            .and_then(|k| map.get(&k))
            .map_or_else(|| value.clone(), |id| id.to_value()),
        Value::Array(items) => Value::Array(items.iter().map(|v| rewrite(v, map)).collect()),
        Value::Object(record) => Value::Object(rewrite_record(record, map)),
        Value::Null | Value::Bool(_) => value.clone(),
    }
}

pub fn rewrite_record(record: &Record, map: &PlaceholderMap) -> Record {
    record
        .iter()
        .map(|(k, v)| (k.clone(), rewrite(v, map)))
        .collect()
}

/// Run both passes over the batch.
pub fn resolve(
    items: Vec<NormalizedItem>,
    registry: &TypeRegistry,
    generator: &IdGenerator,
) -> EngineResult<(Vec<NormalizedItem>, PlaceholderMap)> {
    let map = collect_placeholders(&items, registry, generator)?;
    if map.is_empty() {
        return Ok((items, map));
    }
    tracing::debug!(placeholders = map.len(), "resolving placeholder ids");
    let items = items
        .into_iter()
        .map(|item| NormalizedItem {
            input: rewrite_record(&item.input, &map),
            ..item
        })
        .collect();
    Ok((items, map))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;
    use vellum_types::ObjectType;

    use super::*;
    use crate::registry::ObjectTypeDescriptor;

    fn note() -> ObjectType {
        ObjectType::new("Note").unwrap()
    }

    fn registry() -> TypeRegistry {
        TypeRegistry::builder()
            .register(ObjectTypeDescriptor::builder(note()).build())
            .register(
                ObjectTypeDescriptor::builder(ObjectType::new("Doc").unwrap())
                    .id_field("docId")
                    .build(),
            )
            .build()
            .unwrap()
    }

    fn item(index: usize, action: Action, object_type: &str, input: Value) -> NormalizedItem {
        let input = input.as_object().cloned().unwrap();
        let id_field = if object_type == "Doc" { "docId" } else { "id" };
        NormalizedItem {
            index,
            action,
            object_type: ObjectType::new(object_type).unwrap(),
            client_id: input[id_field].as_str().unwrap_or_default().to_string(),
            input,
        }
    }

    #[test]
    fn sibling_references_are_rewritten() {
        let generator = IdGenerator::new(1).unwrap();
        let items = vec![
            item(0, Action::Create, "Note", json!({"id": "tmp1", "title": "A"})),
            item(1, Action::Create, "Note", json!({"id": "tmp2", "title": "B", "parentId": "tmp1"})),
        ];
        let (items, map) = resolve(items, &registry(), &generator).unwrap();
        let c1 = map.get("tmp1").unwrap();
        let c2 = map.get("tmp2").unwrap();
        assert_ne!(c1, c2);
        assert_eq!(items[0].input["id"], json!(c1.to_string()));
        assert_eq!(items[1].input["id"], json!(c2.to_string()));
        assert_eq!(items[1].input["parentId"], json!(c1.to_string()));
        assert_eq!(items[1].client_id, "tmp2");
    }

    #[test]
    fn canonical_ids_are_kept_and_never_reminted() {
        let generator = IdGenerator::new(1).unwrap();
        let items = vec![item(0, Action::Create, "Note", json!({"id": "12345", "title": "A"}))];
        let (items, map) = resolve(items, &registry(), &generator).unwrap();
        assert!(map.is_empty());
        assert_eq!(items[0].input["id"], json!("12345"));
    }

    #[test]
    fn nested_nodes_and_custom_id_fields() {
        let generator = IdGenerator::new(1).unwrap();
        let items = vec![
            item(
                0,
                Action::Create,
                "Doc",
                json!({"docId": "d", "sections": [{"id": "s1"}, {"id": "s2", "after": "s1"}]}),
            ),
            item(1, Action::Update, "Note", json!({"id": "77", "docRef": "d", "tags": ["s2", "x"]})),
            item(2, Action::Delete, "Note", json!({"id": "s1"})),
        ];
        let (items, map) = resolve(items, &registry(), &generator).unwrap();
        assert_eq!(map.len(), 3);
        let d = map.get("d").unwrap().to_value();
        let s1 = map.get("s1").unwrap().to_value();
        let s2 = map.get("s2").unwrap().to_value();
        assert_eq!(items[0].input["docId"], d);
        assert_eq!(items[0].input["sections"], json!([{"id": s1}, {"id": s2, "after": s1}]));
        assert_eq!(items[1].input["docRef"], d);
        assert_eq!(items[1].input["tags"], json!([s2, "x"]));
        assert_eq!(items[2].input["id"], s1);
    }

    #[test]
    fn updates_do_not_introduce_placeholders() {
        let generator = IdGenerator::new(1).unwrap();
        let items = vec![item(0, Action::Update, "Note", json!({"id": "tmp9"}))];
        let (items, map) = resolve(items, &registry(), &generator).unwrap();
        assert!(map.is_empty());
        assert_eq!(items[0].input["id"], json!("tmp9"));
    }

    #[test]
    fn numbers_match_placeholders_by_text() {
        let generator = IdGenerator::new(1).unwrap();
        let items = vec![
            item(0, Action::Create, "Note", json!({"id": "0", "children": [{"id": 0}]})),
            item(1, Action::Create, "Note", json!({"id": "-5", "rank": -5, "flag": true})),
        ];
        let (items, map) = resolve(items, &registry(), &generator).unwrap();
        assert_eq!(map.len(), 2);
        let zero = map.get("0").unwrap().to_value();
        assert_eq!(items[0].input["children"], json!([{"id": zero}]));
        // Numeric fields equal to a placeholder are rewritten too.
        assert_eq!(items[1].input["rank"], map.get("-5").unwrap().to_value());
        assert_eq!(items[1].input["flag"], json!(true));
    }

    #[test]
    fn padded_references_match_trimmed_ids() {
        let generator = IdGenerator::new(1).unwrap();
        // The normalizer trims the item's own id; references arrive as sent.
        let items = vec![
            item(0, Action::Create, "Note", json!({"id": "tmp1", "children": [{"id": ""}]})),
            item(1, Action::Create, "Note", json!({"id": "tmp2", "parentId": " tmp1 ", "note": ""})),
        ];
        let (items, map) = resolve(items, &registry(), &generator).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(items[1].input["parentId"], map.get("tmp1").unwrap().to_value());
        assert_eq!(items[0].input["children"], json!([{"id": ""}]));
        assert_eq!(items[1].input["note"], json!(""));
    }

    #[test]
    fn resolve_value_handles_both_forms() {
        let generator = IdGenerator::new(1).unwrap();
        let items = vec![item(0, Action::Create, "Note", json!({"id": "tmp"}))];
        let (_, map) = resolve(items, &registry(), &generator).unwrap();
        assert_eq!(map.resolve_value(&json!("tmp")), map.get("tmp"));
        assert_eq!(map.resolve_value(&json!(9)), CanonicalId::new(9).ok());
        assert_eq!(map.resolve_value(&json!("nope")), None);
    }

    fn arb_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            "tmp[0-9]".prop_map(Value::String),
            "[a-z]{1,6}".prop_map(Value::String),
            (1u64..50).prop_map(|n| json!(n)),
            (1u64..50).prop_map(|n| json!(n.to_string())),
            any::<bool>().prop_map(Value::Bool),
            Just(Value::Null),
        ]
    }

    fn arb_tree() -> impl Strategy<Value = Value> {
        arb_leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                (prop::option::of(arb_leaf()), prop::collection::btree_map("[a-c]", inner, 0..3))
                    .prop_map(|(id, fields)| {
                        let mut map: Record = fields.into_iter().collect();
                        if let Some(id) = id {
                            map.insert("id".into(), id);
                        }
                        Value::Object(map)
                    }),
            ]
        })
    }

    fn arb_batch() -> impl Strategy<Value = Vec<NormalizedItem>> {
        prop::collection::vec(
            (
                prop_oneof![Just(Action::Create), Just(Action::Update), Just(Action::Delete)],
                prop_oneof!["tmp[0-9]".prop_map(Value::String), (1u64..50).prop_map(|n| json!(n.to_string()))],
                arb_tree(),
            ),
            0..8,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(index, (action, id, body))| {
                    let mut input = Record::new();
                    input.insert("body".into(), body);
                    input.insert("id".into(), id.clone());
                    NormalizedItem {
                        index,
                        action,
                        object_type: note(),
                        client_id: id.as_str().unwrap_or_default().to_string(),
                        input,
                    }
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn resolving_twice_changes_nothing(batch in arb_batch()) {
            let generator = IdGenerator::new(3).unwrap();
            let registry = registry();
            let (once, _) = resolve(batch, &registry, &generator).unwrap();
            let (twice, second_map) = resolve(once.clone(), &registry, &generator).unwrap();
            prop_assert!(second_map.is_empty());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn placeholders_get_distinct_fresh_ids(batch in arb_batch()) {
            let generator = IdGenerator::new(3).unwrap();
            let mut existing = HashSet::new();
            for item in batch.iter().filter(|i| i.action == Action::Create) {
                if let Some(id) = CanonicalId::from_value(&item.input["id"]) {
                    existing.insert(id);
                }
                let mut stack = vec![&item.input["body"]];
                while let Some(v) = stack.pop() {
                    match v {
                        Value::Object(m) => {
                            if let Some(id) = m.get("id").and_then(CanonicalId::from_value) {
                                existing.insert(id);
                            }
                            stack.extend(m.values());
                        }
                        Value::Array(a) => stack.extend(a.iter()),
                        _ => {}
                    }
                }
            }
            let map = collect_placeholders(&batch, &registry(), &generator).unwrap();
            let minted: HashSet<CanonicalId> = map.iter().map(|(_, id)| id).collect();
            prop_assert_eq!(minted.len(), map.len());
            prop_assert!(minted.is_disjoint(&existing));
            for (placeholder, _) in map.iter() {
                prop_assert!(!CanonicalId::is_canonical(placeholder));
            }
        }
    }
}
