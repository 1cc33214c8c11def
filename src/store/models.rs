use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setlist {
    pub id: String,
    pub band_id: String,
    pub name: String,
    pub is_catalog: bool,
    /// Seconds since epoch, as stamped by the store.
    pub created: i64,
}

/// A setlist together with the aggregates the store computes over its memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetlistSummary {
    #[serde(flatten)]
    pub setlist: Setlist,
    pub song_count: usize,
    /// Sum of effective durations; songs without a known duration count as zero.
    pub total_duration_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub band_id: String,
    pub title: String,
    pub artist: String,
    pub bpm: Option<i32>,
    pub duration_seconds: Option<i32>,
    pub tuning: Option<String>,
    pub notes: Option<String>,
    pub album_artwork: Option<String>,
}

/// Values for a song that is about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSong {
    pub band_id: String,
    pub title: String,
    pub artist: String,
    pub title_key: String,
    pub artist_key: String,
    pub bpm: Option<i32>,
    pub duration_seconds: Option<i32>,
    pub tuning: Option<String>,
    pub album_artwork: Option<String>,
}

/// A partial set of song fields. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongFields {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub bpm: Option<i32>,
    pub duration_seconds: Option<i32>,
    pub tuning: Option<String>,
    pub notes: Option<String>,
    pub album_artwork: Option<String>,
}

impl SongFields {
    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    pub fn changed_fields(&self) -> Vec<SongField> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push(SongField::Title);
        }
        if self.artist.is_some() {
            fields.push(SongField::Artist);
        }
        if self.bpm.is_some() {
            fields.push(SongField::Bpm);
        }
        if self.duration_seconds.is_some() {
            fields.push(SongField::DurationSeconds);
        }
        if self.tuning.is_some() {
            fields.push(SongField::Tuning);
        }
        if self.notes.is_some() {
            fields.push(SongField::Notes);
        }
        if self.album_artwork.is_some() {
            fields.push(SongField::AlbumArtwork);
        }
        fields
    }

    /// Keeps only the fields that are currently unset on `song`.
    pub fn missing_on(&self, song: &Song) -> SongFields {
        SongFields {
            title: None,
            artist: None,
            bpm: self.bpm.filter(|_| song.bpm.is_none()),
            duration_seconds: self
                .duration_seconds
                .filter(|_| song.duration_seconds.is_none()),
            tuning: self.tuning.clone().filter(|_| song.tuning.is_none()),
            notes: self.notes.clone().filter(|_| song.notes.is_none()),
            album_artwork: self
                .album_artwork
                .clone()
                .filter(|_| song.album_artwork.is_none()),
        }
    }

    /// Applies these fields to an in-memory song.
    pub fn apply_to(&self, song: &mut Song) {
        if let Some(title) = &self.title {
            song.title = title.clone();
        }
        if let Some(artist) = &self.artist {
            song.artist = artist.clone();
        }
        if self.bpm.is_some() {
            song.bpm = self.bpm;
        }
        if self.duration_seconds.is_some() {
            song.duration_seconds = self.duration_seconds;
        }
        if self.tuning.is_some() {
            song.tuning = self.tuning.clone();
        }
        if self.notes.is_some() {
            song.notes = self.notes.clone();
        }
        if self.album_artwork.is_some() {
            song.album_artwork = self.album_artwork.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SongField {
    Title,
    Artist,
    Bpm,
    DurationSeconds,
    Tuning,
    Notes,
    AlbumArtwork,
}

/// Per-list values shadowing a song's global fields. `None` inherits the song value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipOverrides {
    pub bpm: Option<i32>,
    pub tuning: Option<String>,
    pub duration_seconds: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: String,
    pub setlist_id: String,
    pub song_id: String,
    pub position: usize,
    pub overrides: MembershipOverrides,
}

/// One row of a list as displayed: the membership joined with its song.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub membership: Membership,
    pub song: Song,
}

impl ListEntry {
    pub fn song_id(&self) -> &str {
        &self.song.id
    }

    pub fn effective_bpm(&self) -> Option<i32> {
        self.membership.overrides.bpm.or(self.song.bpm)
    }

    pub fn effective_tuning(&self) -> Option<&str> {
        self.membership
            .overrides
            .tuning
            .as_deref()
            .or(self.song.tuning.as_deref())
    }

    pub fn effective_duration(&self) -> Option<i32> {
        self.membership
            .overrides
            .duration_seconds
            .or(self.song.duration_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song() -> Song {
        Song {
            id: "s1".to_string(),
            band_id: "b1".to_string(),
            title: "Come Together".to_string(),
            artist: "The Beatles".to_string(),
            bpm: Some(82),
            duration_seconds: None,
            tuning: None,
            notes: Some("watch the bridge".to_string()),
            album_artwork: None,
        }
    }

    #[test]
    fn missing_on_never_overwrites_existing_values() {
        let incoming = SongFields {
            bpm: Some(90),
            duration_seconds: Some(259),
            notes: Some("new notes".to_string()),
            tuning: Some("Standard".to_string()),
            ..Default::default()
        };
        let patch = incoming.missing_on(&song());
        assert_eq!(patch.bpm, None);
        assert_eq!(patch.notes, None);
        assert_eq!(patch.duration_seconds, Some(259));
        assert_eq!(patch.tuning.as_deref(), Some("Standard"));
        assert_eq!(
            patch.changed_fields(),
            vec![SongField::DurationSeconds, SongField::Tuning]
        );
    }

    #[test]
    fn overrides_shadow_song_values() {
        let entry = ListEntry {
            membership: Membership {
                id: "m1".to_string(),
                setlist_id: "l1".to_string(),
                song_id: "s1".to_string(),
                position: 0,
                overrides: MembershipOverrides {
                    bpm: Some(88),
                    tuning: Some("Drop D".to_string()),
                    duration_seconds: None,
                },
            },
            song: Song {
                duration_seconds: Some(200),
                ..song()
            },
        };
        assert_eq!(entry.effective_bpm(), Some(88));
        assert_eq!(entry.effective_tuning(), Some("Drop D"));
        assert_eq!(entry.effective_duration(), Some(200));
    }
}
