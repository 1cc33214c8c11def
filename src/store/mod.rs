mod models;
mod schema;
mod sqlite_store;
mod trait_def;

pub use models::*;
pub use sqlite_store::SqliteSetlistStore;
pub use trait_def::{SetlistStore, StoreError, StoreResult};
