use crate::error::{SetlistError, SetlistResult};
use crate::store::{ListEntry, SetlistStore, SongFields, StoreError, StoreResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Whether the local order has been written to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorderPhase {
    Committed,
    /// Local moves not yet persisted. `snapshot` is the order before the first of them.
    Pending { snapshot: Vec<ListEntry> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Written with the atomic reposition primitive.
    Saved,
    /// Written row by row because the store lacks the atomic primitive.
    SavedWithFallback,
}

/// Optimistic order of one list.
///
/// Moves are applied locally right away. [`ReorderEngine::persist`] later sends the whole
/// order to the store, and rolls the local order back if that fails.
pub struct ReorderEngine {
    store: Arc<dyn SetlistStore>,
    list_id: String,
    entries: Vec<ListEntry>,
    phase: ReorderPhase,
}

impl ReorderEngine {
    pub fn new(store: Arc<dyn SetlistStore>, list_id: &str, entries: Vec<ListEntry>) -> Self {
        Self {
            store,
            list_id: list_id.to_string(),
            entries,
            phase: ReorderPhase::Committed,
        }
    }

    pub fn load(store: Arc<dyn SetlistStore>, list_id: &str) -> SetlistResult<Self> {
        let entries = store.get_list_entries(list_id)?;
        Ok(Self::new(store, list_id, entries))
    }

    pub fn list_id(&self) -> &str {
        &self.list_id
    }

    pub fn entries(&self) -> &[ListEntry] {
        &self.entries
    }

    /// Applies a song edit to the current order and to the pending snapshot, so that a
    /// rollback does not bring old values back.
    pub fn update_song(&mut self, song_id: &str, fields: &SongFields) -> bool {
        let mut found = false;
        let snapshot = match &mut self.phase {
            ReorderPhase::Pending { snapshot } => Some(snapshot),
            ReorderPhase::Committed => None,
        };
        for entry in self
            .entries
            .iter_mut()
            .chain(snapshot.into_iter().flatten())
            .filter(|e| e.song.id == song_id)
        {
            fields.apply_to(&mut entry.song);
            found = true;
        }
        found
    }

    /// Drops a song that no longer exists from the current order and the snapshot.
    pub fn drop_song(&mut self, song_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.song.id != song_id);
        renumber(&mut self.entries);
        if let ReorderPhase::Pending { snapshot } = &mut self.phase {
            snapshot.retain(|e| e.song.id != song_id);
            renumber(snapshot);
        }
        self.entries.len() != before
    }

    pub fn phase(&self) -> &ReorderPhase {
        &self.phase
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.phase, ReorderPhase::Pending { .. })
    }

    pub fn song_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.song.id.clone()).collect()
    }

    /// Moves the entry at `old_index` to `new_index` locally.
    pub fn reorder_local(&mut self, old_index: usize, new_index: usize) -> SetlistResult<()> {
        let len = self.entries.len();
        if old_index >= len || new_index >= len {
            return Err(SetlistError::Validation(format!(
                "cannot move {} to {} in a list of {} songs",
                old_index, new_index, len
            )));
        }
        if old_index == new_index {
            return Ok(());
        }
        if let ReorderPhase::Committed = self.phase {
            self.phase = ReorderPhase::Pending {
                snapshot: self.entries.clone(),
            };
        }
        let entry = self.entries.remove(old_index);
        self.entries.insert(new_index, entry);
        renumber(&mut self.entries);
        debug!("reorder_local({}) {} -> {}", self.list_id, old_index, new_index);
        Ok(())
    }

    /// Writes the whole local order to the store.
    ///
    /// On failure the local order goes back to the snapshot taken before the first pending
    /// move; if there is no snapshot, the order is reloaded from the store instead.
    pub fn persist(&mut self) -> SetlistResult<PersistOutcome> {
        let ordered = self.song_ids();
        let result = match self.store.reposition_memberships(&self.list_id, &ordered) {
            Ok(()) => Ok(PersistOutcome::Saved),
            Err(StoreError::Unsupported(operation)) => {
                warn!(
                    "Store cannot {} for list {}, writing positions one by one",
                    operation, self.list_id
                );
                self.write_positions_one_by_one()
                    .map(|_| PersistOutcome::SavedWithFallback)
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(outcome) => {
                info!("Saved order of list {} ({} songs)", self.list_id, ordered.len());
                self.phase = ReorderPhase::Committed;
                Ok(outcome)
            }
            Err(err) => Err(self.recover(err)),
        }
    }

    /// Parks every row at a negative position first so no intermediate write can collide
    /// with an existing position.
    fn write_positions_one_by_one(&self) -> StoreResult<()> {
        for (index, entry) in self.entries.iter().enumerate() {
            self.store
                .update_membership_position(&entry.membership.id, -1 - index as i64)?;
        }
        for (index, entry) in self.entries.iter().enumerate() {
            self.store
                .update_membership_position(&entry.membership.id, index as i64)?;
        }
        Ok(())
    }

    fn recover(&mut self, err: StoreError) -> SetlistError {
        let phase = std::mem::replace(&mut self.phase, ReorderPhase::Committed);
        match phase {
            ReorderPhase::Pending { snapshot } => {
                warn!(
                    "Saving order of list {} failed, restoring previous order: {}",
                    self.list_id, err
                );
                self.entries = snapshot;
                SetlistError::Transient(format!("could not save the new order: {}", err))
            }
            ReorderPhase::Committed => {
                warn!(
                    "Saving order of list {} failed with nothing to restore, reloading: {}",
                    self.list_id, err
                );
                if let Err(reload_err) = self.reload() {
                    warn!("Reload of list {} failed: {}", self.list_id, reload_err);
                }
                err.into()
            }
        }
    }

    /// Replaces the local order with the stored one and drops any pending moves.
    pub fn reload(&mut self) -> SetlistResult<()> {
        self.entries = self.store.get_list_entries(&self.list_id)?;
        self.phase = ReorderPhase::Committed;
        Ok(())
    }

    /// Adopts entries fetched elsewhere as the committed baseline.
    pub fn replace_entries(&mut self, entries: Vec<ListEntry>) {
        self.entries = entries;
        self.phase = ReorderPhase::Committed;
    }
}

fn renumber(entries: &mut [ListEntry]) {
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.membership.position = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewSong, SqliteSetlistStore};

    fn store_with_list(count: usize) -> (Arc<dyn SetlistStore>, String) {
        let store: Arc<dyn SetlistStore> = Arc::new(SqliteSetlistStore::in_memory().unwrap());
        let list = store.create_setlist("b1", "Gig", false).unwrap();
        for i in 0..count {
            let title = format!("Song {}", i);
            let song = store
                .insert_song(&NewSong {
                    band_id: "b1".to_string(),
                    title: title.clone(),
                    artist: "Artist".to_string(),
                    title_key: title.to_lowercase(),
                    artist_key: "artist".to_string(),
                    bpm: None,
                    duration_seconds: None,
                    tuning: None,
                    album_artwork: None,
                })
                .unwrap();
            store.insert_membership(&list.id, &song.id).unwrap();
        }
        (store, list.id)
    }

    fn titles(entries: &[ListEntry]) -> Vec<String> {
        entries.iter().map(|e| e.song.title.clone()).collect()
    }

    #[test]
    fn local_moves_keep_positions_contiguous() {
        let (store, list_id) = store_with_list(4);
        let mut engine = ReorderEngine::load(store, &list_id).unwrap();
        engine.reorder_local(0, 3).unwrap();
        assert_eq!(
            titles(engine.entries()),
            vec!["Song 1", "Song 2", "Song 3", "Song 0"]
        );
        let positions: Vec<usize> = engine
            .entries()
            .iter()
            .map(|e| e.membership.position)
            .collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }

    #[test]
    fn only_the_first_move_takes_the_snapshot() {
        let (store, list_id) = store_with_list(3);
        let mut engine = ReorderEngine::load(store, &list_id).unwrap();
        let original = engine.entries().to_vec();
        engine.reorder_local(0, 2).unwrap();
        engine.reorder_local(1, 0).unwrap();
        match engine.phase() {
            ReorderPhase::Pending { snapshot } => assert_eq!(snapshot, &original),
            ReorderPhase::Committed => panic!("expected a pending reorder"),
        }
    }

    #[test]
    fn same_index_move_is_a_no_op() {
        let (store, list_id) = store_with_list(2);
        let mut engine = ReorderEngine::load(store, &list_id).unwrap();
        engine.reorder_local(1, 1).unwrap();
        assert!(!engine.is_pending());
        assert!(matches!(
            engine.reorder_local(0, 2),
            Err(SetlistError::Validation(_))
        ));
    }

    #[test]
    fn persisted_order_matches_the_store() {
        let (store, list_id) = store_with_list(4);
        let mut engine = ReorderEngine::load(store.clone(), &list_id).unwrap();
        engine.reorder_local(3, 0).unwrap();
        engine.reorder_local(2, 1).unwrap();
        assert_eq!(engine.persist().unwrap(), PersistOutcome::Saved);
        assert!(!engine.is_pending());

        let stored = store.get_list_entries(&list_id).unwrap();
        assert_eq!(titles(&stored), titles(engine.entries()));
    }

    #[test]
    fn failed_persist_restores_the_snapshot() {
        let (store, list_id) = store_with_list(3);
        let mut engine = ReorderEngine::load(store.clone(), &list_id).unwrap();
        let original = titles(engine.entries());

        // A song removed behind the engine's back makes the reposition set mismatch.
        let stale = engine.entries()[1].membership.id.clone();
        store.delete_membership(&stale).unwrap();

        engine.reorder_local(0, 2).unwrap();
        let err = engine.persist().unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(titles(engine.entries()), original);
        assert!(!engine.is_pending());
    }
}
