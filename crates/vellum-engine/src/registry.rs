use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vellum_store::{OrderBy, Projection, SortDirection};
use vellum_types::ObjectType;

use crate::error::{EngineError, EngineResult};
use crate::hooks::{
    AcceptAll, InputSchema, JsonFormatter, OutputFormatter, PassThroughShaper, Shaper,
    TypeObserver,
};

// ---------------------------------------------------------------------------
// Search settings
// ---------------------------------------------------------------------------

/// How a type can be listed and searched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Columns callers may sort by. The id is always a tiebreaker.
    pub sortable_fields: Vec<String>,
    pub default_sort: OrderBy,
    /// Whether free-text queries use vector ranking.
    pub supports_text_search: bool,
    /// Columns whose text is embedded for ranking.
    pub text_fields: Vec<String>,
    /// Column holding an RFC 3339 timestamp used for date bounds.
    pub date_field: Option<String>,
}

impl SearchSettings {
    /// Sortable by `field` only, newest first.
    pub fn sorted_by(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            sortable_fields: vec![field.clone()],
            default_sort: OrderBy::desc(field),
            supports_text_search: false,
            text_fields: Vec::new(),
            date_field: None,
        }
    }

    /// Enable vector ranking over `fields`.
    pub fn with_text_search<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supports_text_search = true;
        self.text_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_date_field(mut self, field: impl Into<String>) -> Self {
        self.date_field = Some(field.into());
        self
    }

    pub fn is_sortable(&self, field: &str) -> bool {
        self.sortable_fields.iter().any(|f| f == field)
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            sortable_fields: Vec::new(),
            default_sort: OrderBy {
                field: String::new(),
                direction: SortDirection::Asc,
            },
            supports_text_search: false,
            text_fields: Vec::new(),
            date_field: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Ownership columns
// ---------------------------------------------------------------------------

/// Columns that carry ownership and visibility facts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipFields {
    /// User id of the owner. Stamped on creates when the shaper leaves it
    /// empty.
    pub owner: Option<String>,
    /// Boolean column; `true` makes a row visible and referenceable to all.
    pub public: Option<String>,
    /// Array of user ids allowed to write the row.
    pub editors: Option<String>,
}

// ---------------------------------------------------------------------------
// ObjectTypeDescriptor
// ---------------------------------------------------------------------------

/// Everything the pipeline needs to know about one object type.
pub struct ObjectTypeDescriptor {
    pub object_type: ObjectType,
    /// Table handed to the store.
    pub table: String,
    pub id_field: String,
    pub create_schema: Arc<dyn InputSchema>,
    pub update_schema: Arc<dyn InputSchema>,
    pub shaper: Arc<dyn Shaper>,
    pub observer: Option<Arc<dyn TypeObserver>>,
    pub formatter: Arc<dyn OutputFormatter>,
    /// Columns returned by creates and updates.
    pub projection: Projection,
    /// Field name to the type it references.
    pub references: BTreeMap<String, ObjectType>,
    pub ownership: OwnershipFields,
    pub search: SearchSettings,
}

impl ObjectTypeDescriptor {
    pub fn builder(object_type: ObjectType) -> DescriptorBuilder {
        DescriptorBuilder::new(object_type)
    }
}

impl fmt::Debug for ObjectTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectTypeDescriptor")
            .field("object_type", &self.object_type)
            .field("table", &self.table)
            .field("id_field", &self.id_field)
            .field("has_observer", &self.observer.is_some())
            .field("references", &self.references)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ObjectTypeDescriptor`]. Everything except the type tag
/// has a default: table named after the type, `id` id field, pass-through
/// schema, shaper and formatter.
pub struct DescriptorBuilder {
    inner: ObjectTypeDescriptor,
}

impl DescriptorBuilder {
    fn new(object_type: ObjectType) -> Self {
        Self {
            inner: ObjectTypeDescriptor {
                table: object_type.as_str().to_string(),
                object_type,
                id_field: "id".into(),
                create_schema: Arc::new(AcceptAll),
                update_schema: Arc::new(AcceptAll),
                shaper: Arc::new(PassThroughShaper),
                observer: None,
                formatter: Arc::new(JsonFormatter),
                projection: Projection::all(),
                references: BTreeMap::new(),
                ownership: OwnershipFields::default(),
                search: SearchSettings::default(),
            },
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.inner.table = table.into();
        self
    }

    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.inner.id_field = field.into();
        self
    }

    pub fn create_schema(mut self, schema: Arc<dyn InputSchema>) -> Self {
        self.inner.create_schema = schema;
        self
    }

    pub fn update_schema(mut self, schema: Arc<dyn InputSchema>) -> Self {
        self.inner.update_schema = schema;
        self
    }

    pub fn shaper(mut self, shaper: Arc<dyn Shaper>) -> Self {
        self.inner.shaper = shaper;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn TypeObserver>) -> Self {
        self.inner.observer = Some(observer);
        self
    }

    pub fn formatter(mut self, formatter: Arc<dyn OutputFormatter>) -> Self {
        self.inner.formatter = formatter;
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.inner.projection = projection;
        self
    }

    pub fn reference(mut self, field: impl Into<String>, target: ObjectType) -> Self {
        self.inner.references.insert(field.into(), target);
        self
    }

    pub fn owner_field(mut self, field: impl Into<String>) -> Self {
        self.inner.ownership.owner = Some(field.into());
        self
    }

    pub fn public_field(mut self, field: impl Into<String>) -> Self {
        self.inner.ownership.public = Some(field.into());
        self
    }

    pub fn editors_field(mut self, field: impl Into<String>) -> Self {
        self.inner.ownership.editors = Some(field.into());
        self
    }

    pub fn search(mut self, search: SearchSettings) -> Self {
        self.inner.search = search;
        self
    }

    pub fn build(self) -> ObjectTypeDescriptor {
        self.inner
    }
}

// ---------------------------------------------------------------------------
// TypeRegistry
// ---------------------------------------------------------------------------

/// Immutable map from type tag to descriptor.
///
/// Built once at startup through [`RegistryBuilder`], which checks that
/// every descriptor is complete and consistent with the others.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<ObjectType, ObjectTypeDescriptor>,
}

impl TypeRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, object_type: &ObjectType) -> EngineResult<&ObjectTypeDescriptor> {
        self.types
            .get(object_type)
            .ok_or_else(|| EngineError::UnknownType(object_type.to_string()))
    }

    pub fn contains(&self, object_type: &ObjectType) -> bool {
        self.types.contains_key(object_type)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn object_types(&self) -> impl Iterator<Item = &ObjectType> {
        self.types.keys()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    descriptors: Vec<ObjectTypeDescriptor>,
}

impl RegistryBuilder {
    pub fn register(mut self, descriptor: ObjectTypeDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Validate and freeze the registry.
    pub fn build(self) -> EngineResult<TypeRegistry> {
        let mut types = HashMap::with_capacity(self.descriptors.len());
        for descriptor in self.descriptors {
            check_descriptor(&descriptor)?;
            let tag = descriptor.object_type.clone();
            if types.insert(tag.clone(), descriptor).is_some() {
                return Err(EngineError::Config(format!("{tag} registered twice")));
            }
        }

        for descriptor in types.values() {
            for (field, target) in &descriptor.references {
                if !types.contains_key(target) {
                    return Err(EngineError::Config(format!(
                        "{}.{field} references unregistered type {target}",
                        descriptor.object_type
                    )));
                }
            }
        }

        tracing::debug!(types = types.len(), "type registry built");
        Ok(TypeRegistry { types })
    }
}

fn check_descriptor(d: &ObjectTypeDescriptor) -> EngineResult<()> {
    let tag = &d.object_type;
    if d.table.trim().is_empty() {
        return Err(EngineError::Config(format!("{tag} has an empty table name")));
    }
    if d.id_field.trim().is_empty() {
        return Err(EngineError::Config(format!("{tag} has an empty id field")));
    }
    if d.references.contains_key(&d.id_field) {
        return Err(EngineError::Config(format!(
            "{tag} declares its id field as a reference"
        )));
    }

    let search = &d.search;
    if !search.default_sort.field.is_empty() && !search.is_sortable(&search.default_sort.field) {
        return Err(EngineError::Config(format!(
            "{tag} default sort {} is not a sortable field",
            search.default_sort.field
        )));
    }
    if search.supports_text_search && search.text_fields.is_empty() {
        return Err(EngineError::Config(format!(
            "{tag} supports text search but names no text fields"
        )));
    }
    Ok(())
}
