//! Keeps exactly one catalog list per band.
//!
//! The catalog is found (or made) by a small bounded state machine:
//!
//! ```text
//! Checking ──0 candidates──▶ Creating ──▶ Done
//!    │ ──1, misnamed/unflagged──▶ Renaming ──▶ Done
//!    │ ──1, healthy──▶ Done
//!    └ ──many──▶ Deduping ──▶ Checking
//! ```
//!
//! Corrective writes that fail are logged and skipped; the next call tries again.

use crate::error::{require_band, SetlistError, SetlistResult};
use crate::songs::normalize::normalize_key;
use crate::store::{SetlistStore, SetlistSummary, StoreError};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// How many times the band's lists are re-read before settling for the best candidate.
const MAX_VERIFICATION_PASSES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSettings {
    pub canonical_name: String,
    /// Older names a catalog may carry, matched case-insensitively.
    pub legacy_names: Vec<String>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            canonical_name: "Catalog".to_string(),
            legacy_names: vec![
                "Master Catalog".to_string(),
                "Master List".to_string(),
                "All Songs".to_string(),
                "Song Catalog".to_string(),
            ],
        }
    }
}

impl CatalogSettings {
    /// Whether `name` would be taken for a catalog when no list is flagged.
    pub fn is_reserved_name(&self, name: &str) -> bool {
        let key = normalize_key(name);
        normalize_key(&self.canonical_name) == key
            || self.legacy_names.iter().any(|n| normalize_key(n) == key)
    }
}

enum HealingState {
    Checking,
    Deduping(Vec<SetlistSummary>),
    Creating,
    Renaming(SetlistSummary),
    Done(String),
}

pub struct CatalogInvariantManager {
    store: Arc<dyn SetlistStore>,
    settings: CatalogSettings,
    band_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Most memberships wins; ties go to the oldest list.
fn elect(candidates: &[SetlistSummary]) -> Option<&SetlistSummary> {
    candidates
        .iter()
        .enumerate()
        .max_by_key(|(index, c)| (c.song_count, Reverse(c.setlist.created), Reverse(*index)))
        .map(|(_, c)| c)
}

impl CatalogInvariantManager {
    pub fn new(store: Arc<dyn SetlistStore>, settings: CatalogSettings) -> Self {
        Self {
            store,
            settings,
            band_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    fn band_lock(&self, band_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.band_locks.lock().unwrap();
        locks
            .entry(band_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Flagged lists if any exist, otherwise lists carrying a catalog name.
    fn candidates(&self, lists: Vec<SetlistSummary>) -> Vec<SetlistSummary> {
        let (flagged, unflagged): (Vec<_>, Vec<_>) =
            lists.into_iter().partition(|l| l.setlist.is_catalog);
        if !flagged.is_empty() {
            return flagged;
        }
        unflagged
            .into_iter()
            .filter(|l| self.settings.is_reserved_name(&l.setlist.name))
            .collect()
    }

    /// Returns the id of the band's catalog, creating or repairing it if needed.
    /// A second call on a healthy band only reads.
    pub fn ensure_catalog(&self, band_id: &str) -> SetlistResult<String> {
        require_band(band_id)?;
        let lock = self.band_lock(band_id);
        let _guard = lock.lock().unwrap();

        let mut state = HealingState::Checking;
        let mut passes = 0;
        let mut last_seen: Vec<SetlistSummary> = Vec::new();
        loop {
            state = match state {
                HealingState::Checking => {
                    if passes == MAX_VERIFICATION_PASSES {
                        return self.settle(band_id, &last_seen);
                    }
                    passes += 1;
                    let lists = self.store.list_setlists(band_id)?;
                    let candidates = self.candidates(lists);
                    last_seen = candidates.clone();
                    if candidates.len() > 1 {
                        HealingState::Deduping(candidates)
                    } else if let Some(only) = candidates.into_iter().next() {
                        if only.setlist.is_catalog
                            && only.setlist.name == self.settings.canonical_name
                        {
                            HealingState::Done(only.setlist.id)
                        } else {
                            HealingState::Renaming(only)
                        }
                    } else {
                        HealingState::Creating
                    }
                }
                HealingState::Deduping(candidates) => {
                    self.merge_duplicates(band_id, &candidates);
                    HealingState::Checking
                }
                HealingState::Creating => {
                    let created = self.store.create_setlist(
                        band_id,
                        &self.settings.canonical_name,
                        true,
                    )?;
                    info!("Created catalog {} for band {}", created.id, band_id);
                    HealingState::Done(created.id)
                }
                HealingState::Renaming(candidate) => {
                    let id = candidate.setlist.id;
                    match self.store.update_setlist(
                        &id,
                        Some(&self.settings.canonical_name),
                        Some(true),
                    ) {
                        Ok(()) => info!(
                            "Renamed catalog {} of band {} from '{}'",
                            id, band_id, candidate.setlist.name
                        ),
                        Err(err) => warn!("Could not rename catalog {} of band {}: {}", id, band_id, err),
                    }
                    HealingState::Done(id)
                }
                HealingState::Done(id) => return Ok(id),
            };
        }
    }

    /// Gives up re-verifying and returns the best candidate seen last.
    fn settle(&self, band_id: &str, last_seen: &[SetlistSummary]) -> SetlistResult<String> {
        match elect(last_seen) {
            Some(best) => {
                warn!(
                    "Catalog of band {} still not healthy after {} passes, using {}",
                    band_id, MAX_VERIFICATION_PASSES, best.setlist.id
                );
                Ok(best.setlist.id.clone())
            }
            None => Err(SetlistError::Transient(format!(
                "could not establish a catalog for band {}",
                band_id
            ))),
        }
    }

    /// Folds every candidate except the elected one into it, then deletes them.
    /// A duplicate whose songs could not all be copied is kept for the next pass.
    fn merge_duplicates(&self, band_id: &str, candidates: &[SetlistSummary]) {
        let Some(keeper) = elect(candidates) else {
            return;
        };
        let keeper_id = keeper.setlist.id.clone();
        info!(
            "Band {} has {} catalog candidates, keeping {}",
            band_id,
            candidates.len(),
            keeper_id
        );

        let mut present: HashSet<String> = match self.store.get_list_entries(&keeper_id) {
            Ok(entries) => entries.into_iter().map(|e| e.song.id).collect(),
            Err(err) => {
                warn!("Could not read catalog candidate {}: {}", keeper_id, err);
                return;
            }
        };

        for duplicate in candidates.iter().filter(|c| c.setlist.id != keeper_id) {
            let duplicate_id = &duplicate.setlist.id;
            let entries = match self.store.get_list_entries(duplicate_id) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!("Could not read duplicate catalog {}: {}", duplicate_id, err);
                    continue;
                }
            };

            let mut complete = true;
            for entry in entries {
                if present.contains(&entry.song.id) {
                    continue;
                }
                match self.store.insert_membership(&keeper_id, &entry.song.id) {
                    Ok(_) | Err(StoreError::Conflict(_)) => {
                        present.insert(entry.song.id);
                    }
                    Err(err) => {
                        warn!(
                            "Could not move song {} from {} into catalog {}: {}",
                            entry.song.id, duplicate_id, keeper_id, err
                        );
                        complete = false;
                    }
                }
            }

            if !complete {
                continue;
            }
            match self.store.delete_setlist(duplicate_id) {
                Ok(_) => debug!("Deleted duplicate catalog {}", duplicate_id),
                Err(err) => warn!("Could not delete duplicate catalog {}: {}", duplicate_id, err),
            }
        }
    }
}
