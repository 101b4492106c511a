//! Storage boundaries for the Vellum object engine.
//!
//! The engine never talks to a database directly. It talks to a
//! [`RelationalStore`] (typed CRUD, one atomic multi-operation transaction,
//! and a parameterised similarity-ranking query) and to a [`CacheStore`]
//! (get / set-with-TTL). This crate defines both boundaries and ships
//! in-memory backends used by tests and by the demo server.
//!
//! # Design Rules
//!
//! 1. A transaction either applies every operation or none of them.
//! 2. Reads outside a transaction are advisory; they may be stale by commit.
//! 3. Rows are keyed by canonical id; the id column name is supplied by the
//!    caller per table.
//! 4. All backend errors are propagated, never silently ignored.

pub mod cache;
pub mod error;
pub mod memory;
pub mod query;
pub mod traits;

pub use cache::{CacheStore, InMemoryCache};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use query::{
    compare_values, Filter, FindQuery, OpOutput, OrderBy, Projection, SimilarityQuery,
    SortDirection, StoreOp,
};
pub use traits::RelationalStore;
