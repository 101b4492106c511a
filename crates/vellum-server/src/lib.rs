//! HTTP adapter for the Vellum object engine.
//!
//! Exposes the mutation and search pipelines as JSON endpoints:
//!
//! - `GET  /v1/health`
//! - `POST /v1/mutate` -- `{"batch": [...], "options": {...}}`
//! - `POST /v1/search` -- a search request, answered with one page
//! - `GET  /v1/objects/:object_type/:id`
//!
//! The caller is taken from the `x-vellum-user` and `x-vellum-admin`
//! headers through an [`IdentityProvider`].

pub mod auth;
pub mod config;
pub mod demo;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use auth::{Credentials, IdentityProvider, TrustedHeaders};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::VellumServer;
