//! Best-effort tempo lookup for songs created without a bpm.
//!
//! Lookups never block or fail the operation that triggered them. A result is written only
//! if the song still has no bpm when it arrives, and is then published like any other edit.

use crate::broadcast::{MetadataBroadcast, SongEvent};
use crate::store::{SetlistStore, Song, SongFields};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Tempos outside this range are treated as bad data from the remote source.
const PLAUSIBLE_BPM: std::ops::RangeInclusive<i32> = 20..=300;

#[async_trait]
pub trait TempoEnricher: Send + Sync {
    /// Returns Ok(None) when the source has no tempo for the song.
    async fn lookup_tempo(&self, title: &str, artist: &str) -> anyhow::Result<Option<i32>>;
}

#[derive(Clone)]
pub struct EnrichmentDispatcher {
    enricher: Option<Arc<dyn TempoEnricher>>,
    store: Arc<dyn SetlistStore>,
    broadcast: MetadataBroadcast,
}

impl EnrichmentDispatcher {
    pub fn new(
        enricher: Option<Arc<dyn TempoEnricher>>,
        store: Arc<dyn SetlistStore>,
        broadcast: MetadataBroadcast,
    ) -> Self {
        Self {
            enricher,
            store,
            broadcast,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !cfg!(feature = "no_enrichment") && self.enricher.is_some()
    }

    /// Schedules a tempo lookup for `song` if it has none. Returns the task handle so callers
    /// that care (tests, shutdown) can await it; everyone else just drops it.
    pub fn request_tempo(&self, song: &Song) -> Option<JoinHandle<()>> {
        if song.bpm.is_some() || !self.is_enabled() {
            return None;
        }
        let enricher = self.enricher.clone()?;
        let Ok(runtime) = Handle::try_current() else {
            debug!("No async runtime, skipping tempo lookup for {}", song.id);
            return None;
        };

        let store = self.store.clone();
        let broadcast = self.broadcast.clone();
        let song_id = song.id.clone();
        let title = song.title.clone();
        let artist = song.artist.clone();
        Some(runtime.spawn(async move {
            let bpm = match enricher.lookup_tempo(&title, &artist).await {
                Ok(Some(bpm)) if PLAUSIBLE_BPM.contains(&bpm) => bpm,
                Ok(Some(bpm)) => {
                    debug!("Ignoring implausible tempo {bpm} for '{title}' by {artist}");
                    return;
                }
                Ok(None) => {
                    debug!("No tempo found for '{title}' by {artist}");
                    return;
                }
                Err(err) => {
                    debug!("Tempo lookup for '{title}' by {artist} failed: {err:#}");
                    return;
                }
            };

            let fields = SongFields {
                bpm: Some(bpm),
                ..Default::default()
            };
            let id = song_id.clone();
            let written = tokio::task::spawn_blocking(move || {
                store.fill_missing_song_fields(&id, &fields)
            })
            .await;
            match written {
                Ok(Ok(written)) if !written.is_empty() => {
                    info!("Enriched song {song_id} with tempo {bpm}");
                    broadcast.publish(SongEvent::fields_changed(&song_id, written));
                }
                Ok(Ok(_)) => debug!("Song {song_id} got a tempo before the lookup finished"),
                Ok(Err(err)) => warn!("Could not store tempo for song {song_id}: {err}"),
                Err(err) => warn!("Tempo write task for song {song_id} panicked: {err}"),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Poll;
    use crate::store::{NewSong, SqliteSetlistStore};

    struct FixedTempo(Option<i32>);

    #[async_trait]
    impl TempoEnricher for FixedTempo {
        async fn lookup_tempo(&self, _title: &str, _artist: &str) -> anyhow::Result<Option<i32>> {
            Ok(self.0)
        }
    }

    struct Unreachable;

    #[async_trait]
    impl TempoEnricher for Unreachable {
        async fn lookup_tempo(&self, _title: &str, _artist: &str) -> anyhow::Result<Option<i32>> {
            anyhow::bail!("connection refused")
        }
    }

    fn setup(enricher: Arc<dyn TempoEnricher>) -> (EnrichmentDispatcher, Arc<dyn SetlistStore>, MetadataBroadcast, Song) {
        let store: Arc<dyn SetlistStore> = Arc::new(SqliteSetlistStore::in_memory().unwrap());
        let broadcast = MetadataBroadcast::new(8);
        let song = store
            .insert_song(&NewSong {
                band_id: "b1".to_string(),
                title: "Creep".to_string(),
                artist: "Radiohead".to_string(),
                title_key: "creep".to_string(),
                artist_key: "radiohead".to_string(),
                bpm: None,
                duration_seconds: None,
                tuning: None,
                album_artwork: None,
            })
            .unwrap();
        let dispatcher = EnrichmentDispatcher::new(Some(enricher), store.clone(), broadcast.clone());
        (dispatcher, store, broadcast, song)
    }

    #[tokio::test]
    async fn found_tempo_is_stored_and_published() {
        let (dispatcher, store, broadcast, song) = setup(Arc::new(FixedTempo(Some(92))));
        let mut subscription = broadcast.subscribe();

        dispatcher.request_tempo(&song).unwrap().await.unwrap();

        assert_eq!(store.get_song(&song.id).unwrap().unwrap().bpm, Some(92));
        match subscription.poll() {
            Poll::Event(SongEvent::FieldsChanged { values, .. }) => assert_eq!(values.bpm, Some(92)),
            other => panic!("expected a fields event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn failures_are_silent() {
        let (dispatcher, store, broadcast, song) = setup(Arc::new(Unreachable));
        let mut subscription = broadcast.subscribe();

        dispatcher.request_tempo(&song).unwrap().await.unwrap();

        assert_eq!(store.get_song(&song.id).unwrap().unwrap().bpm, None);
        assert_eq!(subscription.poll(), Poll::Empty);
    }

    #[tokio::test]
    async fn implausible_tempo_is_ignored() {
        let (dispatcher, store, _broadcast, song) = setup(Arc::new(FixedTempo(Some(1200))));
        dispatcher.request_tempo(&song).unwrap().await.unwrap();
        assert_eq!(store.get_song(&song.id).unwrap().unwrap().bpm, None);
    }

    #[tokio::test]
    async fn songs_with_tempo_are_not_looked_up() {
        let (dispatcher, _store, _broadcast, song) = setup(Arc::new(FixedTempo(Some(92))));
        let with_bpm = Song {
            bpm: Some(120),
            ..song
        };
        assert!(dispatcher.request_tempo(&with_bpm).is_none());
    }

    #[test]
    fn no_runtime_means_no_lookup() {
        let (dispatcher, _store, _broadcast, song) = setup(Arc::new(FixedTempo(Some(92))));
        assert!(dispatcher.request_tempo(&song).is_none());
    }
}
