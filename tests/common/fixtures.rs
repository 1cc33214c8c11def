use super::constants::*;
use super::flaky_store::FlakyStore;
use setlist_catalog::songs::SongDetails;
use setlist_catalog::store::{SetlistStore, SqliteSetlistStore};
use setlist_catalog::{EngineSettings, SetlistEngine};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// An engine over a fresh database in a temp dir, with fault injection available.
pub struct TestEngine {
    pub engine: SetlistEngine,
    pub store: Arc<FlakyStore>,
    _dir: TempDir,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    pub fn with_debounce(debounce: Duration) -> Self {
        Self::with_settings(EngineSettings {
            debounce,
            ..Default::default()
        })
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        let dir = TempDir::new().unwrap();
        let sqlite = SqliteSetlistStore::new(dir.path().join("setlists.db")).unwrap();
        let store = Arc::new(FlakyStore::new(Arc::new(sqlite)));
        let engine = SetlistEngine::with_store(store.clone(), settings, None);
        TestEngine {
            engine,
            store,
            _dir: dir,
        }
    }

    /// Creates a performance list holding [`SONGS`] in order. Returns the list id and the
    /// song ids.
    pub fn seed_gig(&self, band_id: &str) -> (String, Vec<String>) {
        let list = self
            .engine
            .setlists()
            .create_setlist(band_id, GIG_LIST_NAME)
            .unwrap();
        let mut song_ids = Vec::new();
        for (title, artist) in SONGS {
            let song_id = self.add_song(band_id, &list.id, title, artist);
            song_ids.push(song_id);
        }
        (list.id, song_ids)
    }

    pub fn add_song(&self, band_id: &str, list_id: &str, title: &str, artist: &str) -> String {
        let details = SongDetails {
            duration_seconds: Some(200),
            ..Default::default()
        };
        let song_id = self
            .engine
            .registry()
            .create_or_find_song(band_id, title, artist, &details)
            .unwrap();
        self.engine
            .membership()
            .add_song_ensure_catalog(band_id, list_id, &song_id, title, artist)
            .unwrap();
        song_id
    }

    pub fn catalog_id(&self, band_id: &str) -> String {
        self.engine.catalog().ensure_catalog(band_id).unwrap()
    }
}

pub fn stored_titles(store: &dyn SetlistStore, list_id: &str) -> Vec<String> {
    store
        .get_list_entries(list_id)
        .unwrap()
        .into_iter()
        .map(|e| e.song.title)
        .collect()
}

pub fn stored_positions(store: &dyn SetlistStore, list_id: &str) -> Vec<usize> {
    store
        .get_list_entries(list_id)
        .unwrap()
        .into_iter()
        .map(|e| e.membership.position)
        .collect()
}

pub fn list_titles(entries: &[setlist_catalog::store::ListEntry]) -> Vec<String> {
    entries.iter().map(|e| e.song.title.clone()).collect()
}
