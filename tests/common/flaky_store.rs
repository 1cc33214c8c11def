//! A store wrapper that fails on demand, for exercising recovery paths.

use anyhow::anyhow;
use setlist_catalog::store::{
    ListEntry, Membership, MembershipOverrides, NewSong, Setlist, SetlistStore, SetlistSummary,
    Song, SongFields, StoreError, StoreResult,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct FlakyStore {
    inner: Arc<dyn SetlistStore>,
    fail_reposition: AtomicBool,
    reposition_unsupported: AtomicBool,
    fail_membership_deletes: AtomicBool,
    reposition_delay_ms: AtomicU64,
    /// `find_song` misses this many more times, as if a concurrent insert had not landed yet.
    hidden_song_lookups: AtomicUsize,
    reposition_calls: AtomicUsize,
    list_setlists_calls: AtomicUsize,
    setlist_writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn SetlistStore>) -> Self {
        Self {
            inner,
            fail_reposition: AtomicBool::new(false),
            reposition_unsupported: AtomicBool::new(false),
            fail_membership_deletes: AtomicBool::new(false),
            reposition_delay_ms: AtomicU64::new(0),
            hidden_song_lookups: AtomicUsize::new(0),
            reposition_calls: AtomicUsize::new(0),
            list_setlists_calls: AtomicUsize::new(0),
            setlist_writes: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &dyn SetlistStore {
        self.inner.as_ref()
    }

    pub fn fail_reposition(&self, fail: bool) {
        self.fail_reposition.store(fail, Ordering::SeqCst);
    }

    pub fn make_reposition_unsupported(&self, unsupported: bool) {
        self.reposition_unsupported.store(unsupported, Ordering::SeqCst);
    }

    pub fn fail_membership_deletes(&self, fail: bool) {
        self.fail_membership_deletes.store(fail, Ordering::SeqCst);
    }

    /// Keeps every reposition in flight for `delay` before it reaches the database.
    pub fn slow_down_repositions(&self, delay: Duration) {
        self.reposition_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn hide_song_lookups(&self, times: usize) {
        self.hidden_song_lookups.store(times, Ordering::SeqCst);
    }

    pub fn reposition_calls(&self) -> usize {
        self.reposition_calls.load(Ordering::SeqCst)
    }

    pub fn list_setlists_calls(&self) -> usize {
        self.list_setlists_calls.load(Ordering::SeqCst)
    }

    /// Creates, renames and deletes of setlists seen so far.
    pub fn setlist_writes(&self) -> usize {
        self.setlist_writes.load(Ordering::SeqCst)
    }

    fn check_deletes(&self) -> StoreResult<()> {
        if self.fail_membership_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow!("injected delete failure")));
        }
        Ok(())
    }
}

impl SetlistStore for FlakyStore {
    fn list_setlists(&self, band_id: &str) -> StoreResult<Vec<SetlistSummary>> {
        self.list_setlists_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_setlists(band_id)
    }

    fn get_setlist(&self, setlist_id: &str) -> StoreResult<Option<Setlist>> {
        self.inner.get_setlist(setlist_id)
    }

    fn create_setlist(&self, band_id: &str, name: &str, is_catalog: bool) -> StoreResult<Setlist> {
        self.setlist_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.create_setlist(band_id, name, is_catalog)
    }

    fn update_setlist(
        &self,
        setlist_id: &str,
        name: Option<&str>,
        is_catalog: Option<bool>,
    ) -> StoreResult<()> {
        self.setlist_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update_setlist(setlist_id, name, is_catalog)
    }

    fn delete_setlist(&self, setlist_id: &str) -> StoreResult<bool> {
        self.setlist_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_setlist(setlist_id)
    }

    fn get_list_entries(&self, setlist_id: &str) -> StoreResult<Vec<ListEntry>> {
        self.inner.get_list_entries(setlist_id)
    }

    fn get_membership(&self, setlist_id: &str, song_id: &str) -> StoreResult<Option<Membership>> {
        self.inner.get_membership(setlist_id, song_id)
    }

    fn get_memberships_by_ids(&self, membership_ids: &[String]) -> StoreResult<Vec<Membership>> {
        self.inner.get_memberships_by_ids(membership_ids)
    }

    fn get_song_memberships(&self, song_id: &str) -> StoreResult<Vec<Membership>> {
        self.inner.get_song_memberships(song_id)
    }

    fn insert_membership(&self, setlist_id: &str, song_id: &str) -> StoreResult<Membership> {
        self.inner.insert_membership(setlist_id, song_id)
    }

    fn update_membership_overrides(
        &self,
        membership_id: &str,
        overrides: &MembershipOverrides,
    ) -> StoreResult<()> {
        self.inner
            .update_membership_overrides(membership_id, overrides)
    }

    fn delete_membership(&self, membership_id: &str) -> StoreResult<bool> {
        self.check_deletes()?;
        self.inner.delete_membership(membership_id)
    }

    fn delete_memberships(&self, membership_ids: &[String]) -> StoreResult<usize> {
        self.check_deletes()?;
        self.inner.delete_memberships(membership_ids)
    }

    fn reposition_memberships(
        &self,
        setlist_id: &str,
        ordered_song_ids: &[String],
    ) -> StoreResult<()> {
        self.reposition_calls.fetch_add(1, Ordering::SeqCst);
        let delay_ms = self.reposition_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(delay_ms));
        }
        if self.reposition_unsupported.load(Ordering::SeqCst) {
            return Err(StoreError::Unsupported("reposition memberships"));
        }
        if self.fail_reposition.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow!("injected reposition failure")));
        }
        self.inner.reposition_memberships(setlist_id, ordered_song_ids)
    }

    fn update_membership_position(&self, membership_id: &str, position: i64) -> StoreResult<()> {
        self.inner.update_membership_position(membership_id, position)
    }

    fn find_song(
        &self,
        band_id: &str,
        title_key: &str,
        artist_key: &str,
    ) -> StoreResult<Option<Song>> {
        let hidden = self
            .hidden_song_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hidden {
            return Ok(None);
        }
        self.inner.find_song(band_id, title_key, artist_key)
    }

    fn get_song(&self, song_id: &str) -> StoreResult<Option<Song>> {
        self.inner.get_song(song_id)
    }

    fn insert_song(&self, song: &NewSong) -> StoreResult<Song> {
        self.inner.insert_song(song)
    }

    fn update_song(
        &self,
        song_id: &str,
        fields: &SongFields,
        keys: Option<(&str, &str)>,
    ) -> StoreResult<Song> {
        self.inner.update_song(song_id, fields, keys)
    }

    fn fill_missing_song_fields(
        &self,
        song_id: &str,
        fields: &SongFields,
    ) -> StoreResult<SongFields> {
        self.inner.fill_missing_song_fields(song_id, fields)
    }

    fn delete_song(&self, song_id: &str) -> StoreResult<bool> {
        self.inner.delete_song(song_id)
    }
}
