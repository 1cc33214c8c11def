//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestEngine, BAND_1};
//!
//! #[test]
//! fn test_catalog_exists() {
//!     let env = TestEngine::new();
//!     let catalog_id = env.engine.catalog().ensure_catalog(BAND_1).unwrap();
//!     assert!(!catalog_id.is_empty());
//! }
//! ```
#![allow(dead_code)]

mod constants;
mod fixtures;
mod flaky_store;

pub use constants::*;
pub use fixtures::{list_titles, stored_positions, stored_titles, TestEngine};
pub use flaky_store::FlakyStore;
