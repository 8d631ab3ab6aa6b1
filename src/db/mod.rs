//! Database module: row models and SQL repositories.
//!
//! - `model`: view models returned by repositories.
//! - `repo`: SQL-only functions over the admin tables.
//!
//! The admin framework owns the schema in production; the embedded migration
//! only creates the tables this crate reads and writes.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::ClientRow;
