use crate::store::{SongField, SongFields};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SongEvent {
    /// Global fields of a song were written. `values` carries the new values of exactly
    /// the fields listed in `changed_fields`.
    FieldsChanged {
        song_id: String,
        changed_fields: Vec<SongField>,
        values: SongFields,
        timestamp_ms: i64,
    },
    /// The song was removed from the catalog and no longer exists.
    Deleted { song_id: String, timestamp_ms: i64 },
}

impl SongEvent {
    pub fn fields_changed(song_id: &str, values: SongFields) -> Self {
        SongEvent::FieldsChanged {
            song_id: song_id.to_string(),
            changed_fields: values.changed_fields(),
            values,
            timestamp_ms: now_ms(),
        }
    }

    pub fn deleted(song_id: &str) -> Self {
        SongEvent::Deleted {
            song_id: song_id.to_string(),
            timestamp_ms: now_ms(),
        }
    }

    pub fn song_id(&self) -> &str {
        match self {
            SongEvent::FieldsChanged { song_id, .. } | SongEvent::Deleted { song_id, .. } => {
                song_id
            }
        }
    }

    pub fn timestamp_ms(&self) -> i64 {
        match self {
            SongEvent::FieldsChanged { timestamp_ms, .. }
            | SongEvent::Deleted { timestamp_ms, .. } => *timestamp_ms,
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
