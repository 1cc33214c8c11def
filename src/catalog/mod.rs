mod invariant;
mod setlists;

pub use invariant::{CatalogInvariantManager, CatalogSettings};
pub use setlists::SetlistManager;
