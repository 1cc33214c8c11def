use super::parser::ImportRow;
use crate::catalog::CatalogInvariantManager;
use crate::error::{require_band, SetlistError, SetlistResult};
use crate::membership::{ListMembershipService, Placement};
use crate::ownership::owned_setlist;
use crate::songs::{SongDetails, SongRegistry};
use crate::store::SetlistStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRow {
    pub row: ImportRow,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkAddResult {
    /// Songs newly placed on the target list.
    pub added_count: usize,
    /// Target-list memberships created by this import; what an undo removes.
    pub target_list_membership_ids: Vec<String>,
    pub failed_rows: Vec<FailedRow>,
    /// Rows whose song was already on the target list.
    pub already_present: usize,
}

/// Everything needed to revert one import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportUndoToken {
    pub band_id: String,
    pub list_id: String,
    pub membership_ids: Vec<String>,
}

impl BulkAddResult {
    pub fn undo_token(&self, band_id: &str, list_id: &str) -> ImportUndoToken {
        ImportUndoToken {
            band_id: band_id.to_string(),
            list_id: list_id.to_string(),
            membership_ids: self.target_list_membership_ids.clone(),
        }
    }
}

#[derive(Clone)]
pub struct BulkImportEngine {
    store: Arc<dyn SetlistStore>,
    catalog: Arc<CatalogInvariantManager>,
    registry: SongRegistry,
    membership: ListMembershipService,
    batch_size: usize,
}

impl BulkImportEngine {
    pub fn new(
        store: Arc<dyn SetlistStore>,
        catalog: Arc<CatalogInvariantManager>,
        registry: SongRegistry,
        membership: ListMembershipService,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            catalog,
            registry,
            membership,
            batch_size: batch_size.max(1),
        }
    }

    /// Creates or finds every row's song, puts it in the catalog and then on `list_id`.
    ///
    /// A row that fails is logged and reported, and the import goes on with the next one.
    pub fn bulk_add(
        &self,
        band_id: &str,
        list_id: &str,
        rows: &[ImportRow],
    ) -> SetlistResult<BulkAddResult> {
        require_band(band_id)?;
        owned_setlist(self.store.as_ref(), band_id, list_id)?;
        let catalog_id = self.catalog.ensure_catalog(band_id)?;
        let into_catalog = list_id == catalog_id;

        let mut result = BulkAddResult::default();
        let batch_count = rows.len().div_ceil(self.batch_size);
        for (batch_index, batch) in rows.chunks(self.batch_size).enumerate() {
            debug!(
                "bulk_add({list_id}) batch {}/{} ({} rows)",
                batch_index + 1,
                batch_count,
                batch.len()
            );
            for row in batch {
                match self.add_row(band_id, &catalog_id, list_id, row) {
                    Ok(placement) => {
                        let created = if into_catalog {
                            placement.catalog_membership
                        } else {
                            placement.list_membership
                        };
                        match created {
                            Some(membership) => {
                                result.added_count += 1;
                                if !into_catalog {
                                    result.target_list_membership_ids.push(membership.id);
                                }
                            }
                            None => result.already_present += 1,
                        }
                    }
                    Err(err) => {
                        warn!(
                            "Import of '{}' by {} into list {} failed: {}",
                            row.title, row.artist, list_id, err
                        );
                        result.failed_rows.push(FailedRow {
                            row: row.clone(),
                            reason: err.user_message(),
                        });
                    }
                }
            }
        }

        info!(
            "Imported {} songs into list {} ({} already present, {} failed)",
            result.added_count,
            list_id,
            result.already_present,
            result.failed_rows.len()
        );
        Ok(result)
    }

    fn add_row(
        &self,
        band_id: &str,
        catalog_id: &str,
        list_id: &str,
        row: &ImportRow,
    ) -> SetlistResult<Placement> {
        let details = SongDetails {
            bpm: row.bpm,
            tuning: row.tuning.clone(),
            ..Default::default()
        };
        let song_id = self
            .registry
            .create_or_find_song(band_id, &row.title, &row.artist, &details)?;
        self.membership.place_song(catalog_id, list_id, &song_id)
    }

    /// Removes the target-list memberships an import created. Catalog memberships are
    /// never touched, so the imported songs stay in the band's catalog.
    pub fn undo(&self, band_id: &str, membership_ids: &[String]) -> SetlistResult<usize> {
        require_band(band_id)?;
        let catalog_id = self.catalog.ensure_catalog(band_id)?;

        let mut to_delete = Vec::with_capacity(membership_ids.len());
        for membership in self.store.get_memberships_by_ids(membership_ids)? {
            let list = owned_setlist(self.store.as_ref(), band_id, &membership.setlist_id)?;
            if list.id == catalog_id {
                warn!(
                    "Import undo skipped catalog membership {} of song {}",
                    membership.id, membership.song_id
                );
                continue;
            }
            to_delete.push(membership.id);
        }
        if to_delete.is_empty() {
            return Ok(0);
        }

        let removed = self.store.delete_memberships(&to_delete)?;
        info!(
            "Undid import for band {}: removed {} of {} memberships",
            band_id,
            removed,
            membership_ids.len()
        );
        Ok(removed)
    }

    pub fn undo_import(&self, token: &ImportUndoToken) -> SetlistResult<usize> {
        if token.membership_ids.is_empty() {
            return Err(SetlistError::Validation("nothing to undo".to_string()));
        }
        self.undo(&token.band_id, &token.membership_ids)
    }
}
