use super::models::{
    ListEntry, Membership, MembershipOverrides, NewSong, Setlist, SetlistSummary, Song, SongFields,
};
use thiserror::Error;

/// Failures reported by a [`SetlistStore`], classified so callers can react to them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness rule rejected the write, usually because a concurrent writer won.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The backing store cannot perform this operation at all.
    #[error("Operation not supported by the store: {0}")]
    Unsupported(&'static str),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent storage for setlists, songs and memberships.
///
/// Every method is a single atomic primitive; multi-step consistency rules are enforced
/// by the services built on top of it.
pub trait SetlistStore: Send + Sync {
    /// Returns all setlists of a band with their aggregates, oldest first.
    fn list_setlists(&self, band_id: &str) -> StoreResult<Vec<SetlistSummary>>;

    /// Returns Ok(None) if the setlist does not exist.
    fn get_setlist(&self, setlist_id: &str) -> StoreResult<Option<Setlist>>;

    fn create_setlist(&self, band_id: &str, name: &str, is_catalog: bool) -> StoreResult<Setlist>;

    /// Updates the given fields. Returns NotFound if the setlist does not exist.
    fn update_setlist(
        &self,
        setlist_id: &str,
        name: Option<&str>,
        is_catalog: Option<bool>,
    ) -> StoreResult<()>;

    /// Deletes the setlist and, through cascade, its memberships.
    /// Returns false if nothing was deleted.
    fn delete_setlist(&self, setlist_id: &str) -> StoreResult<bool>;

    /// Memberships of a list joined with their songs, ordered by position.
    fn get_list_entries(&self, setlist_id: &str) -> StoreResult<Vec<ListEntry>>;

    fn get_membership(&self, setlist_id: &str, song_id: &str) -> StoreResult<Option<Membership>>;

    fn get_memberships_by_ids(&self, membership_ids: &[String]) -> StoreResult<Vec<Membership>>;

    /// Every membership of a song across the lists of its band.
    fn get_song_memberships(&self, song_id: &str) -> StoreResult<Vec<Membership>>;

    /// Appends the song at the next free position of the list.
    /// Returns Conflict if the song is already a member.
    fn insert_membership(&self, setlist_id: &str, song_id: &str) -> StoreResult<Membership>;

    fn update_membership_overrides(
        &self,
        membership_id: &str,
        overrides: &MembershipOverrides,
    ) -> StoreResult<()>;

    /// Deletes one membership and closes the gap it leaves in its list.
    fn delete_membership(&self, membership_id: &str) -> StoreResult<bool>;

    /// Deletes several memberships at once, compacting every affected list.
    /// Returns the number of rows actually removed.
    fn delete_memberships(&self, membership_ids: &[String]) -> StoreResult<usize>;

    /// Rewrites all positions of a list in one step so that `ordered_song_ids[i]` gets
    /// position `i`. The ids must be exactly the current members of the list.
    fn reposition_memberships(&self, setlist_id: &str, ordered_song_ids: &[String])
        -> StoreResult<()>;

    /// Single-row position write, used when the atomic reposition is unavailable.
    fn update_membership_position(&self, membership_id: &str, position: i64) -> StoreResult<()>;

    fn find_song(&self, band_id: &str, title_key: &str, artist_key: &str)
        -> StoreResult<Option<Song>>;

    fn get_song(&self, song_id: &str) -> StoreResult<Option<Song>>;

    /// Returns Conflict if a song with the same keys already exists in the band.
    fn insert_song(&self, song: &NewSong) -> StoreResult<Song>;

    /// Overwrites the given fields. Title and artist changes also refresh the dedup keys.
    fn update_song(&self, song_id: &str, fields: &SongFields, keys: Option<(&str, &str)>)
        -> StoreResult<Song>;

    /// Writes only the fields that are still null on the stored record.
    /// Returns the fields that were actually written.
    fn fill_missing_song_fields(&self, song_id: &str, fields: &SongFields)
        -> StoreResult<SongFields>;

    /// Fails while the song still has memberships.
    fn delete_song(&self, song_id: &str) -> StoreResult<bool>;
}
