//! Persistence layer: SQLite-backed whole-document service configs.

mod schema;
mod services;
mod types;

pub use schema::Database;
pub use types::DatabaseError;
