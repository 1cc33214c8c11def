use crate::broadcast::SongEvent;
use crate::error::{SetlistError, SetlistResult};
use crate::reorder::{PersistOutcome, ReorderEngine};
use crate::sort::{sort_by_tuning, sort_catalog, SortMode};
use crate::store::{ListEntry, Setlist};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// In-memory state of one open list: the manual order, the sort mode and what is shown.
pub struct ListView {
    setlist: Setlist,
    engine: ReorderEngine,
    mode: SortMode,
    displayed: Vec<ListEntry>,
    latest_event_ms: HashMap<String, i64>,
    last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListSnapshot {
    pub setlist: Setlist,
    pub mode: SortMode,
    pub entries: Vec<ListEntry>,
    pub song_count: usize,
    pub total_duration_seconds: i64,
    pub reorder_pending: bool,
    /// User-facing text of the last background failure, if any.
    pub error: Option<String>,
}

impl ListView {
    pub fn new(setlist: Setlist, engine: ReorderEngine) -> Self {
        let mut view = Self {
            setlist,
            engine,
            mode: SortMode::Manual,
            displayed: Vec::new(),
            latest_event_ms: HashMap::new(),
            last_error: None,
        };
        view.refresh_display();
        view
    }

    pub fn setlist(&self) -> &Setlist {
        &self.setlist
    }

    pub fn mode(&self) -> SortMode {
        self.mode
    }

    /// Entries in display order.
    pub fn entries(&self) -> &[ListEntry] {
        &self.displayed
    }

    pub fn total_duration_seconds(&self) -> i64 {
        self.displayed
            .iter()
            .map(|e| e.effective_duration().unwrap_or(0) as i64)
            .sum()
    }

    pub fn snapshot(&self) -> ListSnapshot {
        ListSnapshot {
            setlist: self.setlist.clone(),
            mode: self.mode,
            entries: self.displayed.clone(),
            song_count: self.displayed.len(),
            total_duration_seconds: self.total_duration_seconds(),
            reorder_pending: self.engine.is_pending(),
            error: self.last_error.clone(),
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_reorder_pending(&self) -> bool {
        self.engine.is_pending()
    }

    fn refresh_display(&mut self) {
        let mut entries = self.engine.entries().to_vec();
        if self.setlist.is_catalog {
            sort_catalog(&mut entries);
        } else if let SortMode::Tuning(rotation) = self.mode {
            sort_by_tuning(&mut entries, rotation);
        }
        self.displayed = entries;
    }

    /// Changes how entries are displayed. Never writes positions.
    ///
    /// Going back to `Manual` shows the in-memory order; restoring the stored order is up to
    /// [`ListSession::set_sort_mode`](super::ListSession::set_sort_mode), which reloads.
    pub(crate) fn set_mode(&mut self, mode: SortMode) -> SetlistResult<()> {
        if self.setlist.is_catalog && mode != SortMode::Manual {
            return Err(SetlistError::Validation(
                "the catalog is always sorted by artist and title".to_string(),
            ));
        }
        self.mode = mode;
        self.refresh_display();
        Ok(())
    }

    pub fn reorder_local(&mut self, old_index: usize, new_index: usize) -> SetlistResult<()> {
        if self.setlist.is_catalog {
            return Err(SetlistError::Validation(
                "the catalog order follows artist and title".to_string(),
            ));
        }
        if self.mode != SortMode::Manual {
            return Err(SetlistError::Validation(format!(
                "switch to manual order before moving songs (currently {})",
                self.mode.label()
            )));
        }
        self.engine.reorder_local(old_index, new_index)?;
        self.refresh_display();
        Ok(())
    }

    /// Persists a pending reorder, if any. Failures are also kept for [`ListSnapshot::error`].
    pub fn persist_order(&mut self) -> SetlistResult<Option<PersistOutcome>> {
        if !self.engine.is_pending() {
            return Ok(None);
        }
        let result = self.engine.persist();
        self.refresh_display();
        match result {
            Ok(outcome) => {
                self.last_error = None;
                Ok(Some(outcome))
            }
            Err(err) => {
                self.last_error = Some(err.user_message());
                Err(err)
            }
        }
    }

    /// Takes freshly loaded entries as the committed manual order.
    pub fn replace_entries(&mut self, entries: Vec<ListEntry>) {
        self.engine.replace_entries(entries);
        self.refresh_display();
    }

    /// Applies a broadcast edit. Events older than one already applied for the same song
    /// are ignored. Returns whether the view changed.
    pub fn apply_event(&mut self, event: &SongEvent) -> bool {
        let song_id = event.song_id();
        let timestamp = event.timestamp_ms();
        if self
            .latest_event_ms
            .get(song_id)
            .is_some_and(|latest| *latest > timestamp)
        {
            debug!("Ignoring stale event for song {} in list {}", song_id, self.setlist.id);
            return false;
        }
        self.latest_event_ms.insert(song_id.to_string(), timestamp);

        let changed = match event {
            SongEvent::FieldsChanged { values, .. } => self.engine.update_song(song_id, values),
            SongEvent::Deleted { .. } => self.engine.drop_song(song_id),
        };
        if changed {
            self.refresh_display();
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewSong, SetlistStore, SongFields, SqliteSetlistStore};
    use std::sync::Arc;

    fn view_with(titles: &[(&str, Option<&str>)]) -> (Arc<dyn SetlistStore>, ListView) {
        let store: Arc<dyn SetlistStore> = Arc::new(SqliteSetlistStore::in_memory().unwrap());
        let list = store.create_setlist("b1", "Gig", false).unwrap();
        for (title, tuning) in titles {
            let song = store
                .insert_song(&NewSong {
                    band_id: "b1".to_string(),
                    title: title.to_string(),
                    artist: "Artist".to_string(),
                    title_key: title.to_lowercase(),
                    artist_key: "artist".to_string(),
                    bpm: None,
                    duration_seconds: Some(100),
                    tuning: tuning.map(str::to_string),
                    album_artwork: None,
                })
                .unwrap();
            store.insert_membership(&list.id, &song.id).unwrap();
        }
        let engine = ReorderEngine::load(store.clone(), &list.id).unwrap();
        (store, ListView::new(list, engine))
    }

    fn titles(view: &ListView) -> Vec<&str> {
        view.entries().iter().map(|e| e.song.title.as_str()).collect()
    }

    #[test]
    fn tuning_mode_reorders_display_only() {
        let (store, mut view) = view_with(&[("A", Some("Drop D")), ("B", Some("Standard"))]);
        view.set_mode(SortMode::Tuning(crate::sort::TuningRotation::StandardFirst))
            .unwrap();
        assert_eq!(titles(&view), vec!["B", "A"]);
        assert!(!view.is_reorder_pending());

        let stored = store.get_list_entries(&view.setlist().id).unwrap();
        assert_eq!(stored[0].song.title, "A");

        assert!(matches!(
            view.reorder_local(0, 1),
            Err(SetlistError::Validation(_))
        ));
        view.set_mode(SortMode::Manual).unwrap();
        assert_eq!(titles(&view), vec!["A", "B"]);
    }

    #[test]
    fn latest_event_per_song_wins() {
        let (_, mut view) = view_with(&[("A", None)]);
        let song_id = view.entries()[0].song.id.clone();
        let newer = SongEvent::FieldsChanged {
            song_id: song_id.clone(),
            changed_fields: vec![crate::store::SongField::Bpm],
            values: SongFields {
                bpm: Some(120),
                ..Default::default()
            },
            timestamp_ms: 2_000,
        };
        let older = SongEvent::FieldsChanged {
            song_id: song_id.clone(),
            changed_fields: vec![crate::store::SongField::Bpm],
            values: SongFields {
                bpm: Some(90),
                ..Default::default()
            },
            timestamp_ms: 1_000,
        };
        assert!(view.apply_event(&newer));
        assert!(!view.apply_event(&older));
        assert_eq!(view.entries()[0].song.bpm, Some(120));
    }

    #[test]
    fn deleted_event_removes_entry_and_updates_aggregates() {
        let (_, mut view) = view_with(&[("A", None), ("B", None)]);
        assert_eq!(view.total_duration_seconds(), 200);
        let song_id = view.entries()[0].song.id.clone();
        assert!(view.apply_event(&SongEvent::deleted(&song_id)));
        let snapshot = view.snapshot();
        assert_eq!(snapshot.song_count, 1);
        assert_eq!(snapshot.total_duration_seconds, 100);
        assert_eq!(snapshot.entries[0].membership.position, 0);
    }
}
