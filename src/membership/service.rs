use crate::broadcast::{MetadataBroadcast, SongEvent};
use crate::catalog::CatalogInvariantManager;
use crate::error::{SetlistError, SetlistResult};
use crate::ownership::{owned_setlist, owned_song};
use crate::store::{Membership, MembershipOverrides, SetlistStore, StoreError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddSongOutcome {
    pub success: bool,
    pub was_already_in_catalog: bool,
    pub was_already_in_list: bool,
}

/// Where a song ended up after [`ListMembershipService::place_song`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Placement {
    pub catalog_membership: Option<Membership>,
    /// The newly created target-list membership; None when the target is the catalog
    /// or the song was already there.
    pub list_membership: Option<Membership>,
    pub was_already_in_catalog: bool,
    pub was_already_in_list: bool,
}

/// What a catalog removal managed to do before it finished or stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub song_id: String,
    pub removed_from_lists: Vec<String>,
    pub song_deleted: bool,
}

#[derive(Clone)]
pub struct ListMembershipService {
    store: Arc<dyn SetlistStore>,
    catalog: Arc<CatalogInvariantManager>,
    broadcast: MetadataBroadcast,
}

impl ListMembershipService {
    pub fn new(
        store: Arc<dyn SetlistStore>,
        catalog: Arc<CatalogInvariantManager>,
        broadcast: MetadataBroadcast,
    ) -> Self {
        Self {
            store,
            catalog,
            broadcast,
        }
    }

    /// Adds a song to a list, putting it in the catalog first if it is not there yet.
    /// `title` and `artist` only label the song in logs and error messages.
    pub fn add_song_ensure_catalog(
        &self,
        band_id: &str,
        list_id: &str,
        song_id: &str,
        title: &str,
        artist: &str,
    ) -> SetlistResult<AddSongOutcome> {
        owned_setlist(self.store.as_ref(), band_id, list_id)?;
        owned_song(self.store.as_ref(), band_id, song_id)?;
        let catalog_id = self.catalog.ensure_catalog(band_id)?;
        debug!("add_song_ensure_catalog({list_id}) '{title}' by {artist}");

        let placement = self.place_song(&catalog_id, list_id, song_id)?;
        Ok(AddSongOutcome {
            success: true,
            was_already_in_catalog: placement.was_already_in_catalog,
            was_already_in_list: placement.was_already_in_list,
        })
    }

    /// Catalog membership first, then the target list. Ownership must already be checked.
    pub(crate) fn place_song(
        &self,
        catalog_id: &str,
        list_id: &str,
        song_id: &str,
    ) -> SetlistResult<Placement> {
        let (catalog_membership, was_already_in_catalog) =
            self.insert_if_absent(catalog_id, song_id)?;

        if list_id == catalog_id {
            return Ok(Placement {
                catalog_membership,
                list_membership: None,
                was_already_in_catalog,
                was_already_in_list: was_already_in_catalog,
            });
        }

        let (list_membership, was_already_in_list) = self.insert_if_absent(list_id, song_id)?;
        if let Some(membership) = &list_membership {
            info!(
                "Added song {} to list {} at position {}",
                song_id, list_id, membership.position
            );
        }
        Ok(Placement {
            catalog_membership,
            list_membership,
            was_already_in_catalog,
            was_already_in_list,
        })
    }

    /// Returns the new membership, or None and `true` if the song was already a member.
    fn insert_if_absent(
        &self,
        list_id: &str,
        song_id: &str,
    ) -> SetlistResult<(Option<Membership>, bool)> {
        if self.store.get_membership(list_id, song_id)?.is_some() {
            return Ok((None, true));
        }
        match self.store.insert_membership(list_id, song_id) {
            Ok(membership) => Ok((Some(membership), false)),
            // Someone else added it between the check and the insert.
            Err(StoreError::Conflict(_)) => Ok((None, true)),
            Err(err) => Err(err.into()),
        }
    }

    /// Removes a song from one performance list. The song stays in the catalog and in
    /// every other list.
    pub fn remove_from_list(&self, band_id: &str, list_id: &str, song_id: &str) -> SetlistResult<()> {
        owned_setlist(self.store.as_ref(), band_id, list_id)?;
        if list_id == self.catalog.ensure_catalog(band_id)? {
            return Err(SetlistError::Validation(
                "songs leave the catalog through remove_from_catalog".to_string(),
            ));
        }
        let Some(membership) = self.store.get_membership(list_id, song_id)? else {
            return Err(SetlistError::NotFound(format!(
                "song {} in list {}",
                song_id, list_id
            )));
        };
        self.store.delete_membership(&membership.id)?;
        info!("Removed song {} from list {}", song_id, list_id);
        Ok(())
    }

    /// Deletes a song from the band entirely: every membership, catalog last, then the song.
    ///
    /// Steps are not rolled back. If one fails, the report of what was already removed is
    /// logged and the error returned; the song record is only deleted once no membership
    /// references it, so a retry finishes the job.
    pub fn remove_from_catalog(&self, band_id: &str, song_id: &str) -> SetlistResult<CascadeReport> {
        owned_song(self.store.as_ref(), band_id, song_id)?;
        let catalog_id = self.catalog.ensure_catalog(band_id)?;

        let mut memberships = self.store.get_song_memberships(song_id)?;
        // Non-catalog lists first so catalog-first holds at every step.
        memberships.sort_by_key(|m| m.setlist_id == catalog_id);

        let mut report = CascadeReport {
            song_id: song_id.to_string(),
            ..Default::default()
        };
        for membership in memberships {
            if let Err(err) = self.store.delete_membership(&membership.id) {
                warn!(
                    "Catalog removal of song {} stopped at list {} after removing it from {:?}: {}",
                    song_id, membership.setlist_id, report.removed_from_lists, err
                );
                return Err(err.into());
            }
            debug!("remove_from_catalog({song_id}) removed from {}", membership.setlist_id);
            report.removed_from_lists.push(membership.setlist_id);
        }

        match self.store.delete_song(song_id) {
            Ok(deleted) => report.song_deleted = deleted,
            Err(err) => {
                warn!(
                    "Song {} lost all {} memberships but could not be deleted: {}",
                    song_id,
                    report.removed_from_lists.len(),
                    err
                );
                return Err(err.into());
            }
        }
        info!(
            "Removed song {} from catalog and {} other lists",
            song_id,
            report.removed_from_lists.len().saturating_sub(1)
        );
        self.broadcast.publish(SongEvent::deleted(song_id));
        Ok(report)
    }

    /// Sets the values that shadow the song's own on this list only.
    pub fn set_overrides(
        &self,
        band_id: &str,
        list_id: &str,
        song_id: &str,
        overrides: MembershipOverrides,
    ) -> SetlistResult<Membership> {
        owned_setlist(self.store.as_ref(), band_id, list_id)?;
        if overrides.bpm.is_some_and(|bpm| bpm <= 0) {
            return Err(SetlistError::Validation("bpm override must be positive".to_string()));
        }
        if overrides.duration_seconds.is_some_and(|d| d < 0) {
            return Err(SetlistError::Validation(
                "duration override must be non-negative".to_string(),
            ));
        }
        let Some(mut membership) = self.store.get_membership(list_id, song_id)? else {
            return Err(SetlistError::NotFound(format!(
                "song {} in list {}",
                song_id, list_id
            )));
        };
        self.store
            .update_membership_overrides(&membership.id, &overrides)?;
        membership.overrides = overrides;
        Ok(membership)
    }
}
