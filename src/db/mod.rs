//! Database module for StatusWatch.
//!
//! Provides SQLite snapshot storage with automatic migrations.

mod models;
mod store;

pub use models::*;
pub use store::*;
