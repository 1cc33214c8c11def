use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};
use rusqlite::Connection;

pub const SETLIST_TABLE_V_0: Table = Table {
    name: "setlist",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true, non_null = true),
        sqlite_column!("band_id", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "is_catalog",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_setlist_band_id", "band_id")],
    unique_constraints: &[],
};

pub const SONG_TABLE_V_0: Table = Table {
    name: "song",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true, non_null = true),
        sqlite_column!("band_id", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("artist", &SqlType::Text, non_null = true),
        sqlite_column!("title_key", &SqlType::Text, non_null = true),
        sqlite_column!("artist_key", &SqlType::Text, non_null = true),
        sqlite_column!("bpm", &SqlType::Integer),
        sqlite_column!("duration_seconds", &SqlType::Integer),
        sqlite_column!("tuning", &SqlType::Text),
        sqlite_column!("notes", &SqlType::Text),
        sqlite_column!("album_artwork", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_song_band_id", "band_id")],
    unique_constraints: &[&["band_id", "title_key", "artist_key"]],
};

const SETLIST_SONG_COLUMNS_V_0: [Column<'static>; 5] = [
    sqlite_column!("id", &SqlType::Text, is_primary_key = true, non_null = true),
    sqlite_column!(
        "setlist_id",
        &SqlType::Text,
        non_null = true,
        foreign_key = Some(&ForeignKey {
            foreign_table: "setlist",
            foreign_column: "id",
            on_delete: ForeignKeyOnChange::Cascade,
        })
    ),
    sqlite_column!(
        "song_id",
        &SqlType::Text,
        non_null = true,
        foreign_key = Some(&ForeignKey {
            foreign_table: "song",
            foreign_column: "id",
            on_delete: ForeignKeyOnChange::Restrict,
        })
    ),
    sqlite_column!("position", &SqlType::Integer, non_null = true),
    sqlite_column!(
        "created",
        &SqlType::Integer,
        default_value = Some(DEFAULT_TIMESTAMP)
    ),
];

pub const SETLIST_SONG_TABLE_V_0: Table = Table {
    name: "setlist_song",
    columns: &SETLIST_SONG_COLUMNS_V_0,
    indices: &[("idx_setlist_song_song_id", "song_id")],
    unique_constraints: &[&["setlist_id", "song_id"], &["setlist_id", "position"]],
};

/// V 1 adds the per-list override columns.
pub const SETLIST_SONG_TABLE_V_1: Table = Table {
    name: "setlist_song",
    columns: &[
        SETLIST_SONG_COLUMNS_V_0[0],
        SETLIST_SONG_COLUMNS_V_0[1],
        SETLIST_SONG_COLUMNS_V_0[2],
        SETLIST_SONG_COLUMNS_V_0[3],
        SETLIST_SONG_COLUMNS_V_0[4],
        sqlite_column!("bpm_override", &SqlType::Integer),
        sqlite_column!("tuning_override", &SqlType::Text),
        sqlite_column!("duration_override", &SqlType::Integer),
    ],
    indices: &[("idx_setlist_song_song_id", "song_id")],
    unique_constraints: &[&["setlist_id", "song_id"], &["setlist_id", "position"]],
};

pub const VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[SETLIST_TABLE_V_0, SONG_TABLE_V_0, SETLIST_SONG_TABLE_V_0],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[SETLIST_TABLE_V_0, SONG_TABLE_V_0, SETLIST_SONG_TABLE_V_1],
        migration: Some(|conn: &Connection| {
            for column in ["bpm_override", "tuning_override", "duration_override"] {
                SETLIST_SONG_TABLE_V_1.add_column(conn, column)?;
            }
            Ok(())
        }),
    },
];
