//! Foundation types for the Vellum object engine.
//!
//! Every other Vellum crate depends on `vellum-types`. It carries the
//! identifiers and tags that flow through the mutation and search pipelines.
//!
//! # Key Types
//!
//! - [`CanonicalId`] -- Snowflake-style, time-ordered identifier minted by the engine
//! - [`IdGenerator`] -- Thread-safe Snowflake generator (time + worker + sequence bits)
//! - [`ObjectType`] -- Type tag used to look up per-type behaviour
//! - [`Action`] -- Create / Update / Delete
//! - [`Caller`] -- The identity on whose behalf a request runs
//! - [`Record`] -- A JSON object row as exchanged with the store

pub mod caller;
pub mod error;
pub mod id;
pub mod object;

pub use caller::Caller;
pub use error::TypeError;
pub use id::{CanonicalId, IdGenerator, SNOWFLAKE_EPOCH_MS};
pub use object::{Action, ObjectType, Record};
