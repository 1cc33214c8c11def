//! Setlist Catalog Library
//!
//! Band song lists with one self-healing master catalog per band, catalog-first
//! membership, optimistic reordering and reversible bulk import.

pub mod broadcast;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod import;
pub mod membership;
mod ownership;
pub mod reorder;
pub mod songs;
pub mod sort;
pub mod sqlite_persistence;
pub mod store;
pub mod view;

// Re-export commonly used types for convenience
pub use engine::{EngineSettings, SetlistEngine};
pub use error::{ErrorKind, SetlistError, SetlistResult};
pub use store::{SetlistStore, SqliteSetlistStore};
