//! Async handle on one open list.
//!
//! Store calls run on the blocking pool. Local state changes optimistically, mutating calls
//! on the same list are refused while another one is in flight, and results that arrive
//! after the user moved to another list are dropped.

use super::list_view::{ListSnapshot, ListView};
use crate::broadcast::{MetadataBroadcast, MetadataSubscription, Poll};
use crate::catalog::CatalogInvariantManager;
use crate::error::{SetlistError, SetlistResult};
use crate::import::{
    parse_import, BulkAddResult, BulkImportEngine, ImportLimits, ImportUndoToken, ParsedImport,
};
use crate::membership::{AddSongOutcome, CascadeReport, ListMembershipService};
use crate::ownership::owned_setlist;
use crate::reorder::{Debouncer, PersistOutcome, ReorderEngine};
use crate::songs::{SongDetails, SongRegistry};
use crate::sort::SortMode;
use crate::store::{ListEntry, Membership, MembershipOverrides, SetlistStore, Song, SongFields};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Which list is in front. Opening a list takes the focus from the previous one.
#[derive(Debug, Clone, Default)]
pub struct ListFocus {
    current: Arc<AtomicU64>,
}

impl ListFocus {
    fn claim(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.current.load(Ordering::SeqCst) == generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyKind {
    Reordering,
    Deleting,
    Adding,
    Importing,
}

impl BusyKind {
    const ALL: [BusyKind; 4] = [
        BusyKind::Reordering,
        BusyKind::Deleting,
        BusyKind::Adding,
        BusyKind::Importing,
    ];

    fn bit(self) -> u8 {
        match self {
            BusyKind::Reordering => 1,
            BusyKind::Deleting => 1 << 1,
            BusyKind::Adding => 1 << 2,
            BusyKind::Importing => 1 << 3,
        }
    }

    fn label(self) -> &'static str {
        match self {
            BusyKind::Reordering => "saving the order",
            BusyKind::Deleting => "removing songs",
            BusyKind::Adding => "adding songs",
            BusyKind::Importing => "importing",
        }
    }
}

#[derive(Debug, Default)]
struct BusyFlags(AtomicU8);

impl BusyFlags {
    fn active(&self) -> Vec<BusyKind> {
        let bits = self.0.load(Ordering::SeqCst);
        BusyKind::ALL
            .into_iter()
            .filter(|kind| bits & kind.bit() != 0)
            .collect()
    }

    fn busy_error(&self) -> SetlistError {
        let doing: Vec<&str> = self.active().into_iter().map(BusyKind::label).collect();
        SetlistError::Transient(format!("the list is busy {}", doing.join(", ")))
    }

    /// Only one mutating operation per list at a time.
    fn acquire(self: &Arc<Self>, kind: BusyKind) -> SetlistResult<BusyGuard> {
        self.0
            .compare_exchange(0, kind.bit(), Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| self.busy_error())?;
        Ok(BusyGuard {
            flags: self.clone(),
            kind,
        })
    }

    /// Local moves may continue while an earlier order is being saved.
    fn blocks_reorder(&self) -> bool {
        self.0.load(Ordering::SeqCst) & !BusyKind::Reordering.bit() != 0
    }
}

#[derive(Debug)]
struct BusyGuard {
    flags: Arc<BusyFlags>,
    kind: BusyKind,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flags.0.fetch_and(!self.kind.bit(), Ordering::SeqCst);
    }
}

/// The services an open list talks to, shared by every session.
#[derive(Clone)]
pub struct SessionServices {
    pub store: Arc<dyn SetlistStore>,
    pub broadcast: MetadataBroadcast,
    pub catalog: Arc<CatalogInvariantManager>,
    pub registry: SongRegistry,
    pub membership: ListMembershipService,
    pub bulk: BulkImportEngine,
    pub import_limits: ImportLimits,
    pub debounce: Duration,
    pub focus: ListFocus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub parsed: ParsedImport,
    pub result: BulkAddResult,
}

async fn run_blocking<T, F>(f: F) -> SetlistResult<T>
where
    F: FnOnce() -> SetlistResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| SetlistError::Transient(format!("store task failed: {}", err)))?
}

async fn persist_view(view: Arc<Mutex<ListView>>) -> SetlistResult<Option<PersistOutcome>> {
    run_blocking(move || view.blocking_lock().persist_order()).await
}

pub struct ListSession {
    services: SessionServices,
    band_id: String,
    list_id: String,
    generation: u64,
    view: Arc<Mutex<ListView>>,
    busy: Arc<BusyFlags>,
    debouncer: Debouncer,
    events: Mutex<MetadataSubscription>,
    /// Set when missed events could not be made up for by a reload yet.
    reload_needed: AtomicBool,
    last_import: Mutex<Option<ImportUndoToken>>,
}

impl ListSession {
    /// Loads a list and makes it the focused one.
    pub async fn open(
        services: SessionServices,
        band_id: &str,
        list_id: &str,
    ) -> SetlistResult<Self> {
        let generation = services.focus.claim();
        // Subscribe before loading so no edit made during the load is missed.
        let events = services.broadcast.subscribe();

        let store = services.store.clone();
        let catalog = services.catalog.clone();
        let band = band_id.to_string();
        let list = list_id.to_string();
        let (setlist, entries) = run_blocking(move || {
            catalog.ensure_catalog(&band)?;
            let setlist = owned_setlist(store.as_ref(), &band, &list)?;
            let entries = store.get_list_entries(&list)?;
            Ok((setlist, entries))
        })
        .await?;
        debug!("open({list_id}) loaded {} entries", entries.len());

        let engine = ReorderEngine::new(services.store.clone(), list_id, entries);
        Ok(Self {
            debouncer: Debouncer::new(services.debounce),
            band_id: band_id.to_string(),
            list_id: list_id.to_string(),
            generation,
            view: Arc::new(Mutex::new(ListView::new(setlist, engine))),
            busy: Arc::new(BusyFlags::default()),
            events: Mutex::new(events),
            reload_needed: AtomicBool::new(false),
            last_import: Mutex::new(None),
            services,
        })
    }

    pub fn band_id(&self) -> &str {
        &self.band_id
    }

    pub fn list_id(&self) -> &str {
        &self.list_id
    }

    pub fn is_focused(&self) -> bool {
        self.services.focus.is_current(self.generation)
    }

    pub fn busy(&self) -> Vec<BusyKind> {
        self.busy.active()
    }

    pub async fn snapshot(&self) -> ListSnapshot {
        self.view.lock().await.snapshot()
    }

    async fn load_entries(&self) -> SetlistResult<Vec<ListEntry>> {
        let store = self.services.store.clone();
        let list = self.list_id.clone();
        run_blocking(move || Ok(store.get_list_entries(&list)?)).await
    }

    /// Replaces local state with the stored list, unless another list took the focus.
    pub async fn reload(&self) -> SetlistResult<()> {
        // Cleared before loading so a lag noticed meanwhile keeps the flag set.
        let was_needed = self.reload_needed.swap(false, Ordering::SeqCst);
        let entries = match self.load_entries().await {
            Ok(entries) => entries,
            Err(err) => {
                if was_needed {
                    self.reload_needed.store(true, Ordering::SeqCst);
                }
                return Err(err);
            }
        };
        if !self.is_focused() {
            debug!("Discarding reload of list {}, no longer focused", self.list_id);
            if was_needed {
                self.reload_needed.store(true, Ordering::SeqCst);
            }
            return Ok(());
        }
        self.view.lock().await.replace_entries(entries);
        Ok(())
    }

    /// Moves a song locally and schedules a debounced save of the whole order.
    pub async fn reorder(&self, old_index: usize, new_index: usize) -> SetlistResult<()> {
        if self.busy.blocks_reorder() {
            return Err(self.busy.busy_error());
        }
        self.view.lock().await.reorder_local(old_index, new_index)?;
        self.schedule_persist();
        Ok(())
    }

    fn schedule_persist(&self) {
        let ticket = self.debouncer.trigger();
        let view = self.view.clone();
        let busy = self.busy.clone();
        let list_id = self.list_id.clone();
        tokio::spawn(async move {
            if !ticket.wait().await {
                return;
            }
            // Whoever holds the list flushes pending moves before doing its own work.
            let Ok(_guard) = busy.acquire(BusyKind::Reordering) else {
                debug!("Debounced save of list {} skipped, list busy", list_id);
                return;
            };
            match persist_view(view).await {
                Ok(Some(outcome)) => debug!("Debounced save of list {}: {:?}", list_id, outcome),
                Ok(None) => {}
                Err(err) => warn!("Debounced save of list {} failed: {}", list_id, err),
            }
        });
    }

    /// Saves pending moves now instead of waiting for the quiet window.
    pub async fn flush_reorder(&self) -> SetlistResult<Option<PersistOutcome>> {
        let _guard = self.busy.acquire(BusyKind::Reordering)?;
        self.flush_held().await
    }

    /// Callers must hold a busy guard.
    async fn flush_held(&self) -> SetlistResult<Option<PersistOutcome>> {
        self.debouncer.cancel();
        persist_view(self.view.clone()).await
    }

    pub async fn set_sort_mode(&self, mode: SortMode) -> SetlistResult<()> {
        {
            let view = self.view.lock().await;
            if view.mode() == mode {
                return Ok(());
            }
            if view.setlist().is_catalog {
                return Err(SetlistError::Validation(
                    "the catalog is always sorted by artist and title".to_string(),
                ));
            }
        }
        let _guard = self.busy.acquire(BusyKind::Reordering)?;
        self.flush_held().await?;

        if mode == SortMode::Manual {
            // Manual order is whatever the store holds, not what was on screen.
            let entries = self.load_entries().await?;
            let mut view = self.view.lock().await;
            if self.is_focused() {
                view.replace_entries(entries);
            }
            return view.set_mode(mode);
        }
        self.view.lock().await.set_mode(mode)
    }

    pub async fn cycle_sort_mode(&self) -> SetlistResult<SortMode> {
        let next = self.view.lock().await.mode().next();
        self.set_sort_mode(next).await?;
        Ok(next)
    }

    pub async fn add_song(
        &self,
        title: &str,
        artist: &str,
        details: SongDetails,
    ) -> SetlistResult<AddSongOutcome> {
        let _guard = self.busy.acquire(BusyKind::Adding)?;
        self.flush_held().await?;

        let registry = self.services.registry.clone();
        let membership = self.services.membership.clone();
        let band = self.band_id.clone();
        let list = self.list_id.clone();
        let title = title.to_string();
        let artist = artist.to_string();
        let outcome = run_blocking(move || {
            let song = registry.resolve_song(&band, &title, &artist, &details)?.song;
            membership.add_song_ensure_catalog(&band, &list, &song.id, &song.title, &song.artist)
        })
        .await?;
        self.reload().await?;
        Ok(outcome)
    }

    /// Adds a song that already exists in the band, usually picked from the catalog.
    pub async fn add_existing_song(&self, song_id: &str) -> SetlistResult<AddSongOutcome> {
        let _guard = self.busy.acquire(BusyKind::Adding)?;
        self.flush_held().await?;

        let registry = self.services.registry.clone();
        let membership = self.services.membership.clone();
        let band = self.band_id.clone();
        let list = self.list_id.clone();
        let song_id = song_id.to_string();
        let outcome = run_blocking(move || {
            let song = registry.get_song(&band, &song_id)?;
            membership.add_song_ensure_catalog(&band, &list, &song.id, &song.title, &song.artist)
        })
        .await?;
        self.reload().await?;
        Ok(outcome)
    }

    pub async fn remove_song(&self, song_id: &str) -> SetlistResult<()> {
        let _guard = self.busy.acquire(BusyKind::Deleting)?;
        self.flush_held().await?;

        let membership = self.services.membership.clone();
        let band = self.band_id.clone();
        let list = self.list_id.clone();
        let song_id = song_id.to_string();
        run_blocking(move || membership.remove_from_list(&band, &list, &song_id)).await?;
        self.reload().await
    }

    /// Deletes the song from the band: catalog, every list, and the record itself.
    pub async fn purge_song(&self, song_id: &str) -> SetlistResult<CascadeReport> {
        let _guard = self.busy.acquire(BusyKind::Deleting)?;
        self.flush_held().await?;

        let membership = self.services.membership.clone();
        let band = self.band_id.clone();
        let song_id = song_id.to_string();
        let report =
            run_blocking(move || membership.remove_from_catalog(&band, &song_id)).await?;
        self.reload().await?;
        Ok(report)
    }

    pub async fn set_overrides(
        &self,
        song_id: &str,
        overrides: MembershipOverrides,
    ) -> SetlistResult<Membership> {
        // The reload below would drop unsaved moves.
        let _guard = self.busy.acquire(BusyKind::Reordering)?;
        self.flush_held().await?;

        let membership = self.services.membership.clone();
        let band = self.band_id.clone();
        let list = self.list_id.clone();
        let song_id = song_id.to_string();
        let updated = run_blocking(move || {
            membership.set_overrides(&band, &list, &song_id, overrides)
        })
        .await?;
        self.reload().await?;
        Ok(updated)
    }

    /// Global edit of a song; every open view holding it picks the change up.
    pub async fn edit_song(&self, song_id: &str, fields: SongFields) -> SetlistResult<Song> {
        let registry = self.services.registry.clone();
        let band = self.band_id.clone();
        let song_id = song_id.to_string();
        let song =
            run_blocking(move || registry.update_song_metadata(&band, &song_id, fields)).await?;
        self.sync_metadata().await?;
        Ok(song)
    }

    pub async fn import(&self, raw_text: &str) -> SetlistResult<ImportReport> {
        let _guard = self.busy.acquire(BusyKind::Importing)?;
        self.flush_held().await?;

        let bulk = self.services.bulk.clone();
        let limits = self.services.import_limits;
        let band = self.band_id.clone();
        let list = self.list_id.clone();
        let raw_text = raw_text.to_string();
        let report = run_blocking(move || {
            let parsed = parse_import(&raw_text, &limits);
            let result = bulk.bulk_add(&band, &list, &parsed.valid_rows)?;
            Ok(ImportReport { parsed, result })
        })
        .await?;

        if !report.result.target_list_membership_ids.is_empty() {
            *self.last_import.lock().await =
                Some(report.result.undo_token(&self.band_id, &self.list_id));
        }
        self.reload().await?;
        Ok(report)
    }

    /// Reverts the last import into this list. Songs stay in the catalog.
    pub async fn undo_import(&self) -> SetlistResult<usize> {
        let _guard = self.busy.acquire(BusyKind::Importing)?;
        let Some(token) = self.last_import.lock().await.take() else {
            return Err(SetlistError::Validation("there is no import to undo".to_string()));
        };
        self.flush_held().await?;

        let bulk = self.services.bulk.clone();
        let removed = run_blocking(move || bulk.undo_import(&token)).await?;
        info!("Undid import into list {}: {} songs removed", self.list_id, removed);
        self.reload().await?;
        Ok(removed)
    }

    /// Applies every queued metadata event. If events were lost, reloads the list instead.
    /// Returns how many events changed the view.
    ///
    /// When the list is busy the reload is refused with a retryable error and stays owed
    /// until a later call, or another operation's reload, gets to run it.
    pub async fn sync_metadata(&self) -> SetlistResult<usize> {
        let mut events = self.events.lock().await;
        let mut applied = 0;
        let mut lagged = false;
        loop {
            match events.poll() {
                Poll::Event(event) if !lagged => {
                    if self.view.lock().await.apply_event(&event) {
                        applied += 1;
                    }
                }
                // A reload follows, so whatever is still queued is already covered.
                Poll::Event(_) => {}
                Poll::Lagged(missed) => {
                    warn!(
                        "List {} missed {} song updates, reloading",
                        self.list_id, missed
                    );
                    lagged = true;
                    self.reload_needed.store(true, Ordering::SeqCst);
                }
                Poll::Empty | Poll::Closed => break,
            }
        }
        drop(events);

        if self.reload_needed.load(Ordering::SeqCst) {
            let _guard = self.busy.acquire(BusyKind::Reordering)?;
            self.flush_held().await?;
            self.reload().await?;
        }
        Ok(applied)
    }

    /// Saves anything pending before the list is put away.
    pub async fn close(self) -> SetlistResult<()> {
        let is_pending = self.view.lock().await.is_reorder_pending();
        if is_pending {
            self.flush_reorder().await?;
        }
        Ok(())
    }
}
