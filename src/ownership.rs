//! Lookups that also check a record belongs to the band named by the caller.
//!
//! A record that does not exist is `NotFound`; one that exists under another band is a
//! `Permission` error.

use crate::error::{require_band, SetlistError, SetlistResult};
use crate::store::{SetlistStore, Setlist, Song};

pub(crate) fn owned_setlist(
    store: &dyn SetlistStore,
    band_id: &str,
    setlist_id: &str,
) -> SetlistResult<Setlist> {
    require_band(band_id)?;
    match store.get_setlist(setlist_id)? {
        Some(setlist) if setlist.band_id == band_id => Ok(setlist),
        Some(_) => Err(SetlistError::Permission(format!(
            "list {} does not belong to band {}",
            setlist_id, band_id
        ))),
        None => Err(SetlistError::NotFound(format!("list {}", setlist_id))),
    }
}

pub(crate) fn owned_song(
    store: &dyn SetlistStore,
    band_id: &str,
    song_id: &str,
) -> SetlistResult<Song> {
    require_band(band_id)?;
    match store.get_song(song_id)? {
        Some(song) if song.band_id == band_id => Ok(song),
        Some(_) => Err(SetlistError::Permission(format!(
            "song {} does not belong to band {}",
            song_id, band_id
        ))),
        None => Err(SetlistError::NotFound(format!("song {}", song_id))),
    }
}
