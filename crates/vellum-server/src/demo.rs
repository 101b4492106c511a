//! Object types served by the standalone binary.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use vellum_engine::{
    EngineResult, FieldKind, FieldRule, ObjectSchema, ObjectTypeDescriptor, SearchSettings,
    ShapeContext, Shaper, TypeRegistry,
};
use vellum_search::{EmbeddingIndexer, EmbeddingProvider};
use vellum_types::{ObjectType, Record};

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Stamps `createdAt` on creates and `updatedAt` on every write.
struct TimestampShaper;

impl Shaper for TimestampShaper {
    fn shape_create(&self, mut input: Record, _ctx: &ShapeContext<'_>) -> EngineResult<Record> {
        let now = Value::String(now_rfc3339());
        input.entry("createdAt").or_insert_with(|| now.clone());
        input.insert("updatedAt".into(), now);
        Ok(input)
    }

    fn shape_update(&self, mut input: Record, _ctx: &ShapeContext<'_>) -> EngineResult<Record> {
        if input.is_empty() {
            return Ok(input);
        }
        input.remove("createdAt");
        input.insert("updatedAt".into(), Value::String(now_rfc3339()));
        Ok(input)
    }
}

fn note_schema() -> ObjectSchema {
    ObjectSchema::new()
        .field(FieldRule::string("title").required().trim().max_len(200))
        .field(FieldRule::string("body").max_len(20_000))
        .field(FieldRule::boolean("isPublic").default_value(Value::Bool(false)))
        .field(FieldRule::id("parentId").nullable())
        .field(FieldRule::list("tagIds", FieldKind::Id))
}

/// `Note` (owned, searchable, indexed) and `Tag` (ownerless, admin-written).
pub fn registry(embedder: Arc<dyn EmbeddingProvider>) -> EngineResult<TypeRegistry> {
    let note = ObjectType::new("Note")?;
    let tag = ObjectType::new("Tag")?;
    let create = note_schema();
    let update = create.partial();

    TypeRegistry::builder()
        .register(
            ObjectTypeDescriptor::builder(note.clone())
                .table("notes")
                .owner_field("ownerId")
                .public_field("isPublic")
                .editors_field("editorIds")
                .reference("parentId", note)
                .reference("tagIds", tag.clone())
                .create_schema(Arc::new(create))
                .update_schema(Arc::new(update))
                .shaper(Arc::new(TimestampShaper))
                .observer(Arc::new(EmbeddingIndexer::new(
                    embedder,
                    "notes",
                    "id",
                    ["title", "body"],
                )))
                .search(
                    SearchSettings::sorted_by("createdAt")
                        .with_text_search(["title", "body"])
                        .with_date_field("createdAt"),
                )
                .build(),
        )
        .register(
            ObjectTypeDescriptor::builder(tag)
                .table("tags")
                .create_schema(Arc::new(
                    ObjectSchema::new().field(FieldRule::string("label").required().trim().max_len(64)),
                ))
                .search(SearchSettings::sorted_by("label"))
                .build(),
        )
        .build()
}
