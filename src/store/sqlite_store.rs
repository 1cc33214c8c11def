use super::models::{
    ListEntry, Membership, MembershipOverrides, NewSong, Setlist, SetlistSummary, Song, SongFields,
};
use super::schema::{SETLIST_SONG_TABLE_V_1, SETLIST_TABLE_V_0, SONG_TABLE_V_0, VERSIONED_SCHEMAS};
use super::trait_def::{SetlistStore, StoreError, StoreResult};
use crate::sqlite_persistence::open_versioned;
use anyhow::Context;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

const SONG_COLUMNS: &str =
    "s.id, s.band_id, s.title, s.artist, s.bpm, s.duration_seconds, s.tuning, s.notes, s.album_artwork";
const MEMBERSHIP_COLUMNS: &str =
    "m.id, m.setlist_id, m.song_id, m.position, m.bpm_override, m.tuning_override, m.duration_override";
const SETLIST_COLUMNS: &str = "l.id, l.band_id, l.name, l.is_catalog, l.created";

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, message) = &err {
            let is_uniqueness = failure.code == ErrorCode::ConstraintViolation
                && matches!(
                    failure.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                );
            if is_uniqueness {
                return StoreError::Conflict(
                    message.clone().unwrap_or_else(|| failure.to_string()),
                );
            }
        }
        StoreError::Backend(err.into())
    }
}

fn setlist_from_row(row: &Row, offset: usize) -> rusqlite::Result<Setlist> {
    Ok(Setlist {
        id: row.get(offset)?,
        band_id: row.get(offset + 1)?,
        name: row.get(offset + 2)?,
        is_catalog: row.get::<_, i64>(offset + 3)? != 0,
        created: row.get::<_, Option<i64>>(offset + 4)?.unwrap_or(0),
    })
}

fn song_from_row(row: &Row, offset: usize) -> rusqlite::Result<Song> {
    Ok(Song {
        id: row.get(offset)?,
        band_id: row.get(offset + 1)?,
        title: row.get(offset + 2)?,
        artist: row.get(offset + 3)?,
        bpm: row.get(offset + 4)?,
        duration_seconds: row.get(offset + 5)?,
        tuning: row.get(offset + 6)?,
        notes: row.get(offset + 7)?,
        album_artwork: row.get(offset + 8)?,
    })
}

fn membership_from_row(row: &Row, offset: usize) -> rusqlite::Result<Membership> {
    Ok(Membership {
        id: row.get(offset)?,
        setlist_id: row.get(offset + 1)?,
        song_id: row.get(offset + 2)?,
        position: row.get::<_, i64>(offset + 3)?.max(0) as usize,
        overrides: MembershipOverrides {
            bpm: row.get(offset + 4)?,
            tuning: row.get(offset + 5)?,
            duration_seconds: row.get(offset + 6)?,
        },
    })
}

fn optional_int(value: Option<i32>) -> Value {
    value.map(|v| Value::Integer(v as i64)).unwrap_or(Value::Null)
}

fn optional_text(value: &Option<String>) -> Value {
    value.clone().map(Value::Text).unwrap_or(Value::Null)
}

/// Column/value pairs for every field that is set.
fn song_assignments(fields: &SongFields) -> Vec<(&'static str, Value)> {
    let mut assignments = Vec::new();
    if let Some(title) = &fields.title {
        assignments.push(("title", Value::Text(title.clone())));
    }
    if let Some(artist) = &fields.artist {
        assignments.push(("artist", Value::Text(artist.clone())));
    }
    if fields.bpm.is_some() {
        assignments.push(("bpm", optional_int(fields.bpm)));
    }
    if fields.duration_seconds.is_some() {
        assignments.push(("duration_seconds", optional_int(fields.duration_seconds)));
    }
    if fields.tuning.is_some() {
        assignments.push(("tuning", optional_text(&fields.tuning)));
    }
    if fields.notes.is_some() {
        assignments.push(("notes", optional_text(&fields.notes)));
    }
    if fields.album_artwork.is_some() {
        assignments.push(("album_artwork", optional_text(&fields.album_artwork)));
    }
    assignments
}

fn load_song(conn: &Connection, song_id: &str) -> rusqlite::Result<Option<Song>> {
    conn.query_row(
        &format!(
            "SELECT {SONG_COLUMNS} FROM {} s WHERE s.id = ?1",
            SONG_TABLE_V_0.name
        ),
        params![song_id],
        |row| song_from_row(row, 0),
    )
    .optional()
}

fn membership_ids_in_order(conn: &Connection, setlist_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM {} WHERE setlist_id = ?1 ORDER BY position",
        SETLIST_SONG_TABLE_V_1.name
    ))?;
    let ids = stmt
        .query_map(params![setlist_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// Gives `membership_ids[i]` position `i`.
///
/// Every row of the list is first parked on a negative position, so no intermediate
/// state can collide with the (setlist_id, position) uniqueness rule.
fn write_positions(
    conn: &Connection,
    setlist_id: &str,
    membership_ids: &[String],
) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "UPDATE {} SET position = -1 - position WHERE setlist_id = ?1",
            SETLIST_SONG_TABLE_V_1.name
        ),
        params![setlist_id],
    )?;
    let mut stmt = conn.prepare(&format!(
        "UPDATE {} SET position = ?1 WHERE id = ?2",
        SETLIST_SONG_TABLE_V_1.name
    ))?;
    for (position, membership_id) in membership_ids.iter().enumerate() {
        stmt.execute(params![position as i64, membership_id])?;
    }
    Ok(())
}

fn compact_positions(conn: &Connection, setlist_id: &str) -> rusqlite::Result<()> {
    let ids = membership_ids_in_order(conn, setlist_id)?;
    write_positions(conn, setlist_id, &ids)
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Clone)]
pub struct SqliteSetlistStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSetlistStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> anyhow::Result<Self> {
        let conn = open_versioned(db_path, VERSIONED_SCHEMAS)
            .context("Failed to open setlist database")?;
        Ok(SqliteSetlistStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        VERSIONED_SCHEMAS
            .last()
            .context("No schema versions declared")?
            .create(&conn)?;
        Ok(SqliteSetlistStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl SetlistStore for SqliteSetlistStore {
    fn list_setlists(&self, band_id: &str) -> StoreResult<Vec<SetlistSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SETLIST_COLUMNS}, COUNT(m.id),
                COALESCE(SUM(COALESCE(m.duration_override, s.duration_seconds, 0)), 0)
             FROM {} l
             LEFT JOIN {} m ON m.setlist_id = l.id
             LEFT JOIN {} s ON s.id = m.song_id
             WHERE l.band_id = ?1
             GROUP BY l.id
             ORDER BY l.created, l.rowid",
            SETLIST_TABLE_V_0.name, SETLIST_SONG_TABLE_V_1.name, SONG_TABLE_V_0.name
        ))?;
        let summaries = stmt
            .query_map(params![band_id], |row| {
                Ok(SetlistSummary {
                    setlist: setlist_from_row(row, 0)?,
                    song_count: row.get::<_, i64>(5)? as usize,
                    total_duration_seconds: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        debug!("list_setlists({band_id}) found {} lists", summaries.len());
        Ok(summaries)
    }

    fn get_setlist(&self, setlist_id: &str) -> StoreResult<Option<Setlist>> {
        let conn = self.conn.lock().unwrap();
        let setlist = conn
            .query_row(
                &format!(
                    "SELECT {SETLIST_COLUMNS} FROM {} l WHERE l.id = ?1",
                    SETLIST_TABLE_V_0.name
                ),
                params![setlist_id],
                |row| setlist_from_row(row, 0),
            )
            .optional()?;
        Ok(setlist)
    }

    fn create_setlist(&self, band_id: &str, name: &str, is_catalog: bool) -> StoreResult<Setlist> {
        let conn = self.conn.lock().unwrap();
        let id = new_id();
        conn.execute(
            &format!(
                "INSERT INTO {} (id, band_id, name, is_catalog) VALUES (?1, ?2, ?3, ?4)",
                SETLIST_TABLE_V_0.name
            ),
            params![id, band_id, name, is_catalog as i64],
        )?;
        let setlist = conn.query_row(
            &format!(
                "SELECT {SETLIST_COLUMNS} FROM {} l WHERE l.id = ?1",
                SETLIST_TABLE_V_0.name
            ),
            params![id],
            |row| setlist_from_row(row, 0),
        )?;
        debug!("create_setlist({band_id}) created {} '{name}'", setlist.id);
        Ok(setlist)
    }

    fn update_setlist(
        &self,
        setlist_id: &str,
        name: Option<&str>,
        is_catalog: Option<bool>,
    ) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let exists = tx
            .query_row(
                &format!("SELECT 1 FROM {} WHERE id = ?1", SETLIST_TABLE_V_0.name),
                params![setlist_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(StoreError::NotFound(format!("setlist {}", setlist_id)));
        }
        if let Some(name) = name {
            tx.execute(
                &format!("UPDATE {} SET name = ?1 WHERE id = ?2", SETLIST_TABLE_V_0.name),
                params![name, setlist_id],
            )?;
        }
        if let Some(is_catalog) = is_catalog {
            tx.execute(
                &format!(
                    "UPDATE {} SET is_catalog = ?1 WHERE id = ?2",
                    SETLIST_TABLE_V_0.name
                ),
                params![is_catalog as i64, setlist_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_setlist(&self, setlist_id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", SETLIST_TABLE_V_0.name),
            params![setlist_id],
        )?;
        Ok(deleted > 0)
    }

    fn get_list_entries(&self, setlist_id: &str) -> StoreResult<Vec<ListEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMBERSHIP_COLUMNS}, {SONG_COLUMNS}
             FROM {} m JOIN {} s ON s.id = m.song_id
             WHERE m.setlist_id = ?1
             ORDER BY m.position",
            SETLIST_SONG_TABLE_V_1.name, SONG_TABLE_V_0.name
        ))?;
        let entries = stmt
            .query_map(params![setlist_id], |row| {
                Ok(ListEntry {
                    membership: membership_from_row(row, 0)?,
                    song: song_from_row(row, 7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn get_membership(&self, setlist_id: &str, song_id: &str) -> StoreResult<Option<Membership>> {
        let conn = self.conn.lock().unwrap();
        let membership = conn
            .query_row(
                &format!(
                    "SELECT {MEMBERSHIP_COLUMNS} FROM {} m WHERE m.setlist_id = ?1 AND m.song_id = ?2",
                    SETLIST_SONG_TABLE_V_1.name
                ),
                params![setlist_id, song_id],
                |row| membership_from_row(row, 0),
            )
            .optional()?;
        Ok(membership)
    }

    fn get_memberships_by_ids(&self, membership_ids: &[String]) -> StoreResult<Vec<Membership>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM {} m WHERE m.id = ?1",
            SETLIST_SONG_TABLE_V_1.name
        ))?;
        let mut memberships = Vec::with_capacity(membership_ids.len());
        for membership_id in membership_ids {
            if let Some(membership) = stmt
                .query_row(params![membership_id], |row| membership_from_row(row, 0))
                .optional()?
            {
                memberships.push(membership);
            }
        }
        Ok(memberships)
    }

    fn get_song_memberships(&self, song_id: &str) -> StoreResult<Vec<Membership>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM {} m WHERE m.song_id = ?1",
            SETLIST_SONG_TABLE_V_1.name
        ))?;
        let memberships = stmt
            .query_map(params![song_id], |row| membership_from_row(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(memberships)
    }

    fn insert_membership(&self, setlist_id: &str, song_id: &str) -> StoreResult<Membership> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let next_position: i64 = tx.query_row(
            &format!(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM {} WHERE setlist_id = ?1",
                SETLIST_SONG_TABLE_V_1.name
            ),
            params![setlist_id],
            |row| row.get(0),
        )?;
        let id = new_id();
        tx.execute(
            &format!(
                "INSERT INTO {} (id, setlist_id, song_id, position) VALUES (?1, ?2, ?3, ?4)",
                SETLIST_SONG_TABLE_V_1.name
            ),
            params![id, setlist_id, song_id, next_position],
        )?;
        tx.commit()?;
        debug!("insert_membership({setlist_id}) song {song_id} at {next_position}");
        Ok(Membership {
            id,
            setlist_id: setlist_id.to_string(),
            song_id: song_id.to_string(),
            position: next_position as usize,
            overrides: MembershipOverrides::default(),
        })
    }

    fn update_membership_overrides(
        &self,
        membership_id: &str,
        overrides: &MembershipOverrides,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            &format!(
                "UPDATE {} SET bpm_override = ?1, tuning_override = ?2, duration_override = ?3 WHERE id = ?4",
                SETLIST_SONG_TABLE_V_1.name
            ),
            params![
                overrides.bpm,
                overrides.tuning,
                overrides.duration_seconds,
                membership_id
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("membership {}", membership_id)));
        }
        Ok(())
    }

    fn delete_membership(&self, membership_id: &str) -> StoreResult<bool> {
        Ok(self.delete_memberships(&[membership_id.to_string()])? > 0)
    }

    fn delete_memberships(&self, membership_ids: &[String]) -> StoreResult<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut touched_lists = BTreeSet::new();
        let mut removed = 0;
        for membership_id in membership_ids {
            let setlist_id: Option<String> = tx
                .query_row(
                    &format!(
                        "SELECT setlist_id FROM {} WHERE id = ?1",
                        SETLIST_SONG_TABLE_V_1.name
                    ),
                    params![membership_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(setlist_id) = setlist_id else {
                continue;
            };
            removed += tx.execute(
                &format!("DELETE FROM {} WHERE id = ?1", SETLIST_SONG_TABLE_V_1.name),
                params![membership_id],
            )?;
            touched_lists.insert(setlist_id);
        }
        for setlist_id in &touched_lists {
            compact_positions(&tx, setlist_id)?;
        }
        tx.commit()?;
        debug!(
            "delete_memberships removed {removed} rows across {} lists",
            touched_lists.len()
        );
        Ok(removed)
    }

    fn reposition_memberships(
        &self,
        setlist_id: &str,
        ordered_song_ids: &[String],
    ) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let by_song: HashMap<String, String> = {
            let mut stmt = tx.prepare(&format!(
                "SELECT song_id, id FROM {} WHERE setlist_id = ?1",
                SETLIST_SONG_TABLE_V_1.name
            ))?;
            let pairs = stmt
                .query_map(params![setlist_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<HashMap<String, String>, _>>()?;
            pairs
        };
        if by_song.len() != ordered_song_ids.len() {
            return Err(StoreError::Conflict(format!(
                "list {} has {} members, reorder names {}",
                setlist_id,
                by_song.len(),
                ordered_song_ids.len()
            )));
        }
        let mut membership_ids = Vec::with_capacity(ordered_song_ids.len());
        for song_id in ordered_song_ids {
            match by_song.get(song_id) {
                Some(membership_id) => membership_ids.push(membership_id.clone()),
                None => {
                    return Err(StoreError::Conflict(format!(
                        "song {} is not a member of list {}",
                        song_id, setlist_id
                    )))
                }
            }
        }
        write_positions(&tx, setlist_id, &membership_ids)?;
        tx.commit()?;
        Ok(())
    }

    fn update_membership_position(&self, membership_id: &str, position: i64) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            &format!(
                "UPDATE {} SET position = ?1 WHERE id = ?2",
                SETLIST_SONG_TABLE_V_1.name
            ),
            params![position, membership_id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("membership {}", membership_id)));
        }
        Ok(())
    }

    fn find_song(
        &self,
        band_id: &str,
        title_key: &str,
        artist_key: &str,
    ) -> StoreResult<Option<Song>> {
        let conn = self.conn.lock().unwrap();
        let song = conn
            .query_row(
                &format!(
                    "SELECT {SONG_COLUMNS} FROM {} s
                     WHERE s.band_id = ?1 AND s.title_key = ?2 AND s.artist_key = ?3",
                    SONG_TABLE_V_0.name
                ),
                params![band_id, title_key, artist_key],
                |row| song_from_row(row, 0),
            )
            .optional()?;
        Ok(song)
    }

    fn get_song(&self, song_id: &str) -> StoreResult<Option<Song>> {
        let conn = self.conn.lock().unwrap();
        Ok(load_song(&conn, song_id)?)
    }

    fn insert_song(&self, song: &NewSong) -> StoreResult<Song> {
        let conn = self.conn.lock().unwrap();
        let id = new_id();
        conn.execute(
            &format!(
                "INSERT INTO {} (id, band_id, title, artist, title_key, artist_key, bpm, duration_seconds, tuning, album_artwork)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                SONG_TABLE_V_0.name
            ),
            params![
                id,
                song.band_id,
                song.title,
                song.artist,
                song.title_key,
                song.artist_key,
                song.bpm,
                song.duration_seconds,
                song.tuning,
                song.album_artwork
            ],
        )?;
        Ok(Song {
            id,
            band_id: song.band_id.clone(),
            title: song.title.clone(),
            artist: song.artist.clone(),
            bpm: song.bpm,
            duration_seconds: song.duration_seconds,
            tuning: song.tuning.clone(),
            notes: None,
            album_artwork: song.album_artwork.clone(),
        })
    }

    fn update_song(
        &self,
        song_id: &str,
        fields: &SongFields,
        keys: Option<(&str, &str)>,
    ) -> StoreResult<Song> {
        let conn = self.conn.lock().unwrap();
        let mut assignments = song_assignments(fields);
        if let Some((title_key, artist_key)) = keys {
            assignments.push(("title_key", Value::Text(title_key.to_string())));
            assignments.push(("artist_key", Value::Text(artist_key.to_string())));
        }
        if !assignments.is_empty() {
            let set_clause = assignments
                .iter()
                .enumerate()
                .map(|(i, (column, _))| format!("{} = ?{}", column, i + 1))
                .collect::<Vec<_>>()
                .join(", ");
            let mut values: Vec<Value> = assignments.into_iter().map(|(_, v)| v).collect();
            values.push(Value::Text(song_id.to_string()));
            let id_param = values.len();
            conn.execute(
                &format!(
                    "UPDATE {} SET {} WHERE id = ?{}",
                    SONG_TABLE_V_0.name, set_clause, id_param
                ),
                params_from_iter(values),
            )?;
        }
        load_song(&conn, song_id)?
            .ok_or_else(|| StoreError::NotFound(format!("song {}", song_id)))
    }

    fn fill_missing_song_fields(
        &self,
        song_id: &str,
        fields: &SongFields,
    ) -> StoreResult<SongFields> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let Some(current) = load_song(&tx, song_id)? else {
            return Err(StoreError::NotFound(format!("song {}", song_id)));
        };
        let patch = fields.missing_on(&current);
        let assignments = song_assignments(&patch);
        for (column, value) in assignments {
            tx.execute(
                &format!(
                    "UPDATE {} SET {column} = COALESCE({column}, ?1) WHERE id = ?2",
                    SONG_TABLE_V_0.name
                ),
                params![value, song_id],
            )?;
        }
        tx.commit()?;
        Ok(patch)
    }

    fn delete_song(&self, song_id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", SONG_TABLE_V_0.name),
            params![song_id],
        )?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_tmp_store() -> (SqliteSetlistStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteSetlistStore::new(temp_dir.path().join("setlists.db")).unwrap();
        (store, temp_dir)
    }

    fn new_song(band_id: &str, title: &str, artist: &str) -> NewSong {
        NewSong {
            band_id: band_id.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            title_key: title.to_lowercase(),
            artist_key: artist.to_lowercase(),
            bpm: None,
            duration_seconds: Some(180),
            tuning: None,
            album_artwork: None,
        }
    }

    fn positions(store: &SqliteSetlistStore, setlist_id: &str) -> Vec<usize> {
        store
            .get_list_entries(setlist_id)
            .unwrap()
            .iter()
            .map(|e| e.membership.position)
            .collect()
    }

    #[test]
    fn duplicate_song_key_is_a_conflict() {
        let (store, _temp_dir) = create_tmp_store();
        store.insert_song(&new_song("b1", "Creep", "Radiohead")).unwrap();
        let err = store
            .insert_song(&new_song("b1", "Creep", "Radiohead"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Same title in another band is a different song.
        store.insert_song(&new_song("b2", "Creep", "Radiohead")).unwrap();
    }

    #[test]
    fn duplicate_membership_is_a_conflict() {
        let (store, _temp_dir) = create_tmp_store();
        let list = store.create_setlist("b1", "Friday", false).unwrap();
        let song = store.insert_song(&new_song("b1", "Creep", "Radiohead")).unwrap();
        store.insert_membership(&list.id, &song.id).unwrap();
        let err = store.insert_membership(&list.id, &song.id).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn deleting_memberships_keeps_positions_contiguous() {
        let (store, _temp_dir) = create_tmp_store();
        let list = store.create_setlist("b1", "Friday", false).unwrap();
        let mut memberships = vec![];
        for title in ["A", "B", "C", "D"] {
            let song = store.insert_song(&new_song("b1", title, "X")).unwrap();
            memberships.push(store.insert_membership(&list.id, &song.id).unwrap());
        }
        assert_eq!(positions(&store, &list.id), vec![0, 1, 2, 3]);

        assert!(store.delete_membership(&memberships[1].id).unwrap());
        assert_eq!(positions(&store, &list.id), vec![0, 1, 2]);

        let removed = store
            .delete_memberships(&[memberships[0].id.clone(), "missing".to_string()])
            .unwrap();
        assert_eq!(removed, 1);
        let titles: Vec<String> = store
            .get_list_entries(&list.id)
            .unwrap()
            .into_iter()
            .map(|e| e.song.title)
            .collect();
        assert_eq!(titles, vec!["C", "D"]);
        assert_eq!(positions(&store, &list.id), vec![0, 1]);
    }

    #[test]
    fn reposition_rewrites_every_position() {
        let (store, _temp_dir) = create_tmp_store();
        let list = store.create_setlist("b1", "Friday", false).unwrap();
        let mut song_ids = vec![];
        for title in ["A", "B", "C"] {
            let song = store.insert_song(&new_song("b1", title, "X")).unwrap();
            store.insert_membership(&list.id, &song.id).unwrap();
            song_ids.push(song.id);
        }
        let reversed: Vec<String> = song_ids.iter().rev().cloned().collect();
        store.reposition_memberships(&list.id, &reversed).unwrap();

        let entries = store.get_list_entries(&list.id).unwrap();
        let order: Vec<String> = entries.iter().map(|e| e.song.id.clone()).collect();
        assert_eq!(order, reversed);
        assert_eq!(positions(&store, &list.id), vec![0, 1, 2]);

        let err = store
            .reposition_memberships(&list.id, &reversed[..2])
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn list_setlists_reports_aggregates() {
        let (store, _temp_dir) = create_tmp_store();
        let catalog = store.create_setlist("b1", "Catalog", true).unwrap();
        let gig = store.create_setlist("b1", "Gig", false).unwrap();
        store.create_setlist("b2", "Other band", false).unwrap();
        for title in ["A", "B"] {
            let song = store.insert_song(&new_song("b1", title, "X")).unwrap();
            store.insert_membership(&catalog.id, &song.id).unwrap();
        }

        let summaries = store.list_setlists("b1").unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].setlist.id, catalog.id);
        assert!(summaries[0].setlist.is_catalog);
        assert_eq!(summaries[0].song_count, 2);
        assert_eq!(summaries[0].total_duration_seconds, 360);
        assert_eq!(summaries[1].setlist.id, gig.id);
        assert_eq!(summaries[1].song_count, 0);
        assert_eq!(summaries[1].total_duration_seconds, 0);
    }

    #[test]
    fn fill_missing_only_writes_null_fields() {
        let (store, _temp_dir) = create_tmp_store();
        let song = store.insert_song(&new_song("b1", "Creep", "Radiohead")).unwrap();
        let written = store
            .fill_missing_song_fields(
                &song.id,
                &SongFields {
                    bpm: Some(92),
                    duration_seconds: Some(999),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(written.bpm, Some(92));
        assert_eq!(written.duration_seconds, None);

        let stored = store.get_song(&song.id).unwrap().unwrap();
        assert_eq!(stored.bpm, Some(92));
        assert_eq!(stored.duration_seconds, Some(180));
    }

    #[test]
    fn song_with_memberships_cannot_be_deleted() {
        let (store, _temp_dir) = create_tmp_store();
        let list = store.create_setlist("b1", "Catalog", true).unwrap();
        let song = store.insert_song(&new_song("b1", "Creep", "Radiohead")).unwrap();
        let membership = store.insert_membership(&list.id, &song.id).unwrap();
        assert!(store.delete_song(&song.id).is_err());

        store.delete_membership(&membership.id).unwrap();
        assert!(store.delete_song(&song.id).unwrap());
        assert!(store.get_song(&song.id).unwrap().is_none());
    }

    #[test]
    fn migrates_v0_database_and_keeps_rows() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("old.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            VERSIONED_SCHEMAS[0].create(&conn).unwrap();
            conn.execute(
                "INSERT INTO setlist (id, band_id, name, is_catalog) VALUES ('l1', 'b1', 'Master List', 1)",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO song (id, band_id, title, artist, title_key, artist_key) VALUES ('s1', 'b1', 'Creep', 'Radiohead', 'creep', 'radiohead')",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO setlist_song (id, setlist_id, song_id, position) VALUES ('m1', 'l1', 's1', 0)",
                [],
            )
            .unwrap();
        }

        let store = SqliteSetlistStore::new(&db_path).unwrap();
        let entries = store.get_list_entries("l1").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].membership.overrides, MembershipOverrides::default());

        store
            .update_membership_overrides(
                "m1",
                &MembershipOverrides {
                    bpm: Some(100),
                    ..Default::default()
                },
            )
            .unwrap();
        let entries = store.get_list_entries("l1").unwrap();
        assert_eq!(entries[0].effective_bpm(), Some(100));
    }
}
