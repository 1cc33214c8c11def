use super::enrichment::EnrichmentDispatcher;
use super::normalize::{collapse_whitespace, display_form, normalize_key};
use super::tuning::canonical_tuning;
use crate::broadcast::{MetadataBroadcast, SongEvent};
use crate::error::{require_band, SetlistError, SetlistResult};
use crate::ownership::owned_song;
use crate::store::{NewSong, SetlistStore, Song, SongFields, StoreError};
use std::sync::Arc;
use tracing::{debug, info};

/// Optional metadata supplied together with a title and artist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SongDetails {
    pub bpm: Option<i32>,
    pub tuning: Option<String>,
    pub duration_seconds: Option<i32>,
    pub album_artwork: Option<String>,
}

impl SongDetails {
    fn as_fields(&self) -> SongFields {
        SongFields {
            bpm: self.bpm,
            duration_seconds: self.duration_seconds,
            tuning: self.tuning.as_deref().map(normalize_tuning),
            album_artwork: self.album_artwork.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedSong {
    pub song: Song,
    pub created: bool,
}

/// Known tunings are stored under their canonical name, anything else as typed.
fn normalize_tuning(raw: &str) -> String {
    canonical_tuning(raw)
        .map(str::to_string)
        .unwrap_or_else(|| collapse_whitespace(raw))
}

fn validate_numbers(fields: &SongFields) -> SetlistResult<()> {
    if let Some(bpm) = fields.bpm {
        if bpm <= 0 {
            return Err(SetlistError::Validation(format!(
                "bpm must be positive, got {}",
                bpm
            )));
        }
    }
    if let Some(duration) = fields.duration_seconds {
        if duration < 0 {
            return Err(SetlistError::Validation(format!(
                "duration must be non-negative, got {}",
                duration
            )));
        }
    }
    Ok(())
}

/// Owns the band-wide song records: one per normalized (title, artist).
#[derive(Clone)]
pub struct SongRegistry {
    store: Arc<dyn SetlistStore>,
    broadcast: MetadataBroadcast,
    enrichment: EnrichmentDispatcher,
}

impl SongRegistry {
    pub fn new(
        store: Arc<dyn SetlistStore>,
        broadcast: MetadataBroadcast,
        enrichment: EnrichmentDispatcher,
    ) -> Self {
        Self {
            store,
            broadcast,
            enrichment,
        }
    }

    pub fn create_or_find_song(
        &self,
        band_id: &str,
        title: &str,
        artist: &str,
        details: &SongDetails,
    ) -> SetlistResult<String> {
        Ok(self.resolve_song(band_id, title, artist, details)?.song.id)
    }

    /// Same as [`Self::create_or_find_song`], also telling whether the record is new.
    pub fn resolve_song(
        &self,
        band_id: &str,
        title: &str,
        artist: &str,
        details: &SongDetails,
    ) -> SetlistResult<ResolvedSong> {
        require_band(band_id)?;
        let title_key = normalize_key(title);
        let artist_key = normalize_key(artist);
        if title_key.is_empty() {
            return Err(SetlistError::Validation("title is required".to_string()));
        }
        if artist_key.is_empty() {
            return Err(SetlistError::Validation("artist is required".to_string()));
        }
        let fields = details.as_fields();
        validate_numbers(&fields)?;

        if let Some(existing) = self.store.find_song(band_id, &title_key, &artist_key)? {
            debug!("resolve_song({band_id}) found existing song {}", existing.id);
            let song = self.merge_missing(existing, &fields)?;
            return Ok(ResolvedSong {
                song,
                created: false,
            });
        }

        let new_song = NewSong {
            band_id: band_id.to_string(),
            title: display_form(title),
            artist: display_form(artist),
            title_key: title_key.clone(),
            artist_key: artist_key.clone(),
            bpm: fields.bpm,
            duration_seconds: fields.duration_seconds,
            tuning: fields.tuning.clone(),
            album_artwork: fields.album_artwork.clone(),
        };
        match self.store.insert_song(&new_song) {
            Ok(song) => {
                info!(
                    "Created song {} '{}' by {} for band {}",
                    song.id, song.title, song.artist, band_id
                );
                self.enrichment.request_tempo(&song);
                Ok(ResolvedSong {
                    song,
                    created: true,
                })
            }
            Err(StoreError::Conflict(detail)) => {
                debug!("resolve_song({band_id}) lost insert race ({detail}), re-reading");
                let winner = self
                    .store
                    .find_song(band_id, &title_key, &artist_key)?
                    .ok_or_else(|| {
                        SetlistError::Transient(format!(
                            "song '{}' conflicted on insert but could not be read back",
                            new_song.title
                        ))
                    })?;
                let song = self.merge_missing(winner, &fields)?;
                Ok(ResolvedSong {
                    song,
                    created: false,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Writes the supplied fields that are still empty on `song`, announcing what changed.
    fn merge_missing(&self, mut song: Song, fields: &SongFields) -> SetlistResult<Song> {
        if !fields.missing_on(&song).is_empty() {
            let written = self.store.fill_missing_song_fields(&song.id, fields)?;
            if !written.is_empty() {
                debug!(
                    "Filled {:?} on song {}",
                    written.changed_fields(),
                    song.id
                );
                written.apply_to(&mut song);
                self.broadcast
                    .publish(SongEvent::fields_changed(&song.id, written));
            }
        }
        self.enrichment.request_tempo(&song);
        Ok(song)
    }

    pub fn get_song(&self, band_id: &str, song_id: &str) -> SetlistResult<Song> {
        owned_song(self.store.as_ref(), band_id, song_id)
    }

    /// Overwrites global fields of a song and tells every open view about it.
    pub fn update_song_metadata(
        &self,
        band_id: &str,
        song_id: &str,
        fields: SongFields,
    ) -> SetlistResult<Song> {
        let current = self.get_song(band_id, song_id)?;
        let mut fields = fields;
        validate_numbers(&fields)?;
        if fields.title.as_deref().is_some_and(|t| normalize_key(t).is_empty()) {
            return Err(SetlistError::Validation("title is required".to_string()));
        }
        if fields.artist.as_deref().is_some_and(|a| normalize_key(a).is_empty()) {
            return Err(SetlistError::Validation("artist is required".to_string()));
        }
        fields.title = fields.title.as_deref().map(display_form);
        fields.artist = fields.artist.as_deref().map(display_form);
        fields.tuning = fields.tuning.as_deref().map(normalize_tuning);
        if fields.is_empty() {
            return Ok(current);
        }

        let keys = (fields.title.is_some() || fields.artist.is_some()).then(|| {
            (
                normalize_key(fields.title.as_deref().unwrap_or(&current.title)),
                normalize_key(fields.artist.as_deref().unwrap_or(&current.artist)),
            )
        });
        let updated = self
            .store
            .update_song(
                song_id,
                &fields,
                keys.as_ref().map(|(t, a)| (t.as_str(), a.as_str())),
            )
            .map_err(|err| match err {
                StoreError::Conflict(_) => SetlistError::Validation(
                    "another song with this title and artist already exists".to_string(),
                ),
                other => other.into(),
            })?;

        info!(
            "Updated {:?} on song {} for band {}",
            fields.changed_fields(),
            song_id,
            band_id
        );
        self.broadcast
            .publish(SongEvent::fields_changed(song_id, fields));
        Ok(updated)
    }
}
