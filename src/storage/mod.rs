//! SQLite storage: database contexts, schema creation and row access

pub mod context;
pub mod rows;
pub mod schema;

pub use context::{ConnectionGuard, DbContext, DbContextKind, DbContextService, DbContextType};
pub use schema::ensure_table;
