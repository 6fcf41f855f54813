//! Core database functionality
//!
//! Connection management, the schema registry, and the version stamp
//! accessor shared by the provisioning engine and the query executor.

pub mod connection;
pub mod schema;
pub mod version;

pub use connection::DatabaseConn;
pub use schema::{SchemaDefinitions, SchemaRegistry};
