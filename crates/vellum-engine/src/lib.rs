//! Batch mutation pipeline for the Vellum object engine.
//!
//! Every create, update and delete funnels through
//! [`MutationEngine::perform_batch_mutation`]:
//!
//! ```text
//! caller -> Normalizer -> ID Resolver -> Context Builder -> Guard Chain
//!        -> Planner -> Executor -> Result Mapper -> Trigger Dispatcher -> caller
//! ```
//!
//! Nothing reaches the store before the guard chain has accepted the whole
//! batch, and the store sees the batch as one atomic transaction.
//!
//! # Key Types
//!
//! - [`TypeRegistry`] -- Immutable map from type tag to [`ObjectTypeDescriptor`]
//! - [`MutationEngine`] -- The pipeline; built with [`MutationEngine::builder`]
//! - [`MutationItem`] / [`MutationOptions`] -- One requested write / per-call switches
//! - [`BatchOutcome`] -- One [`ResultSlot`] per input plus trigger failures and the guard audit trail
//! - [`PlaceholderMap`] / [`PreShapeMap`] / [`CrossReferenceMap`] -- Per-batch read-only maps
//! - [`ObjectSchema`] -- Declarative [`InputSchema`]
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use vellum_engine::{MutationEngine, MutationItem, MutationOptions, ObjectTypeDescriptor, TypeRegistry};
//! use vellum_store::InMemoryStore;
//! use vellum_types::{Caller, ObjectType};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let note = ObjectType::new("Note").unwrap();
//! let registry = TypeRegistry::builder()
//!     .register(ObjectTypeDescriptor::builder(note.clone()).owner_field("ownerId").build())
//!     .build()
//!     .unwrap();
//! let engine = MutationEngine::builder(Arc::new(registry), Arc::new(InMemoryStore::new()))
//!     .build()
//!     .unwrap();
//!
//! let outcome = engine
//!     .perform_batch_mutation(
//!         vec![
//!             MutationItem::create(note.clone(), json!({"id": "tmp1", "title": "A"})),
//!             MutationItem::create(note, json!({"id": "tmp2", "parentId": "tmp1"})),
//!         ],
//!         &Caller::user("alice"),
//!         MutationOptions::default(),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(outcome.results.len(), 2);
//! # });
//! ```

pub mod authz;
pub mod batch;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod mapper;
pub mod normalizer;
pub mod planner;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod triggers;

// Re-exports for convenience.
pub use authz::{StoreAuthorization, StoreQuotaLookup};
pub use batch::{BatchOutcome, MutationItem, MutationOptions, ResultSlot, TriggerFailure};
pub use config::EngineConfig;
pub use context::{ContextBuilder, MutationContext, PreShapeMap, TypeGroup};
pub use engine::{EngineBuilder, MutationEngine};
pub use error::{EngineError, EngineResult, FieldError, FieldErrors};
pub use hooks::{
    AcceptAll, DeletionContext, InputSchema, JsonFormatter, MutationSummary, OutputFormatter,
    PassThroughShaper, PreShapeInput, ShapeContext, Shaper, TypeObserver,
};
pub use mapper::CrossReferenceMap;
pub use normalizer::NormalizedItem;
pub use planner::{DeletionRecord, PlanStep, StepKind, TransactionPlan};
pub use registry::{
    DescriptorBuilder, ObjectTypeDescriptor, OwnershipFields, RegistryBuilder, SearchSettings,
    TypeRegistry,
};
pub use resolver::PlaceholderMap;
pub use schema::{FieldKind, FieldRule, ObjectSchema};
