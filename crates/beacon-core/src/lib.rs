//! beacon-core — shared types, announce schema, and the probe wire format.
//! All other beacon crates depend on this one.

pub mod config;
pub mod schema;
pub mod wire;

pub use schema::{Action, Announce, SchemaError};
