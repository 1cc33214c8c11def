use super::invariant::CatalogInvariantManager;
use crate::error::{require_band, SetlistError, SetlistResult};
use crate::ownership::owned_setlist;
use crate::songs::normalize::collapse_whitespace;
use crate::store::{SetlistStore, Setlist, SetlistSummary};
use std::sync::Arc;
use tracing::info;

/// Band-level list management. The catalog itself can never be renamed or deleted here.
#[derive(Clone)]
pub struct SetlistManager {
    store: Arc<dyn SetlistStore>,
    catalog: Arc<CatalogInvariantManager>,
}

impl SetlistManager {
    pub fn new(store: Arc<dyn SetlistStore>, catalog: Arc<CatalogInvariantManager>) -> Self {
        Self { store, catalog }
    }

    /// All lists of the band with their aggregates, catalog first.
    pub fn list_setlists(&self, band_id: &str) -> SetlistResult<Vec<SetlistSummary>> {
        let catalog_id = self.catalog.ensure_catalog(band_id)?;
        let mut lists = self.store.list_setlists(band_id)?;
        lists.sort_by_key(|l| l.setlist.id != catalog_id);
        Ok(lists)
    }

    pub fn get_setlist(&self, band_id: &str, setlist_id: &str) -> SetlistResult<Setlist> {
        owned_setlist(self.store.as_ref(), band_id, setlist_id)
    }

    fn validate_name(&self, name: &str) -> SetlistResult<String> {
        let name = collapse_whitespace(name);
        if name.is_empty() {
            return Err(SetlistError::Validation("list name is required".to_string()));
        }
        if self.catalog.settings().is_reserved_name(&name) {
            return Err(SetlistError::Validation(format!(
                "'{}' is reserved for the catalog",
                name
            )));
        }
        Ok(name)
    }

    pub fn create_setlist(&self, band_id: &str, name: &str) -> SetlistResult<Setlist> {
        require_band(band_id)?;
        let name = self.validate_name(name)?;
        self.catalog.ensure_catalog(band_id)?;
        let setlist = self.store.create_setlist(band_id, &name, false)?;
        info!("Created list {} '{}' for band {}", setlist.id, name, band_id);
        Ok(setlist)
    }

    pub fn rename_setlist(&self, band_id: &str, setlist_id: &str, name: &str) -> SetlistResult<()> {
        owned_setlist(self.store.as_ref(), band_id, setlist_id)?;
        if setlist_id == self.catalog.ensure_catalog(band_id)? {
            return Err(SetlistError::CatalogProtected("renamed"));
        }
        let name = self.validate_name(name)?;
        self.store.update_setlist(setlist_id, Some(&name), None)?;
        info!("Renamed list {} to '{}'", setlist_id, name);
        Ok(())
    }

    /// Deletes a performance list. Its songs stay in the catalog.
    pub fn delete_setlist(&self, band_id: &str, setlist_id: &str) -> SetlistResult<()> {
        owned_setlist(self.store.as_ref(), band_id, setlist_id)?;
        if setlist_id == self.catalog.ensure_catalog(band_id)? {
            return Err(SetlistError::CatalogProtected("deleted"));
        }
        if !self.store.delete_setlist(setlist_id)? {
            return Err(SetlistError::NotFound(format!("list {}", setlist_id)));
        }
        info!("Deleted list {} of band {}", setlist_id, band_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogSettings;
    use crate::store::SqliteSetlistStore;

    fn manager() -> SetlistManager {
        let store: Arc<dyn SetlistStore> = Arc::new(SqliteSetlistStore::in_memory().unwrap());
        let catalog = Arc::new(CatalogInvariantManager::new(
            store.clone(),
            CatalogSettings::default(),
        ));
        SetlistManager::new(store, catalog)
    }

    #[test]
    fn listing_creates_the_catalog_first() {
        let manager = manager();
        let gig = manager.create_setlist("b1", "Friday Gig").unwrap();
        let lists = manager.list_setlists("b1").unwrap();
        assert_eq!(lists.len(), 2);
        assert!(lists[0].setlist.is_catalog);
        assert_eq!(lists[1].setlist.id, gig.id);
    }

    #[test]
    fn catalog_cannot_be_renamed_or_deleted() {
        let manager = manager();
        let lists = manager.list_setlists("b1").unwrap();
        let catalog = &lists[0];
        assert!(matches!(
            manager.rename_setlist("b1", &catalog.setlist.id, "Whatever"),
            Err(SetlistError::CatalogProtected("renamed"))
        ));
        assert!(matches!(
            manager.delete_setlist("b1", &catalog.setlist.id),
            Err(SetlistError::CatalogProtected("deleted"))
        ));
    }

    #[test]
    fn reserved_names_are_rejected() {
        let manager = manager();
        assert!(matches!(
            manager.create_setlist("b1", "  all   songs "),
            Err(SetlistError::Validation(_))
        ));
        let gig = manager.create_setlist("b1", "Gig").unwrap();
        assert!(matches!(
            manager.rename_setlist("b1", &gig.id, "catalog"),
            Err(SetlistError::Validation(_))
        ));
    }

    #[test]
    fn other_bands_cannot_touch_a_list() {
        let manager = manager();
        let gig = manager.create_setlist("b1", "Gig").unwrap();
        assert!(matches!(
            manager.delete_setlist("b2", &gig.id),
            Err(SetlistError::Permission(_))
        ));
        assert!(matches!(
            manager.rename_setlist("b1", "missing", "New"),
            Err(SetlistError::NotFound(_))
        ));
        manager.delete_setlist("b1", &gig.id).unwrap();
    }
}
