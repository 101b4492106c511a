//! Read pipeline for the Vellum object engine.
//!
//! Two paths share one entry point, [`SearchEngine::search`]:
//!
//! - **Relational**: rows ordered by `(sort key, id)`, filtered by
//!   visibility, date bounds and equality filters, paged by cursor with a
//!   one-row look-ahead.
//! - **Hybrid**: a non-blank query on a type with text search is embedded
//!   and ranked by vector distance under the same filters. Ranked id windows
//!   are cached so later pages and repeat queries skip the embedding call.
//!
//! # Key Types
//!
//! - [`SearchEngine`] -- Entry point; built with [`SearchEngine::builder`]
//! - [`SearchRequest`] / [`Connection`] -- One page request / one page of edges
//! - [`EmbeddingProvider`] -- Text to vector; [`HashEmbedder`] for development
//! - [`EmbeddingCache`] -- Position-indexed id windows over a cache store
//! - [`EmbeddingIndexer`] -- Observer that keeps stored embeddings current

pub mod cache;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod indexer;
pub mod request;

pub use cache::{CacheKeyParts, EmbeddingCache};
pub use config::SearchConfig;
pub use embedding::{EmbeddingProvider, HashEmbedder};
pub use engine::{SearchEngine, SearchEngineBuilder};
pub use error::{SearchError, SearchResult};
pub use indexer::EmbeddingIndexer;
pub use request::{Connection, Edge, PageInfo, SearchRequest, Visibility};
