//! Request scheduling: diffing needed tiles against what is cached and in
//! flight, bounding concurrency and cancelling requests a viewport change
//! made obsolete.
//!
//! The scheduler is driven from one thread. Fetches run on whatever
//! executor the [`AsyncSpawner`] wraps and report back over a channel;
//! their outcomes are applied only inside [`RequestScheduler::process_completions`]
//! (which [`RequestScheduler::on_viewport_change`] also calls first), so
//! every state transition happens on the owner's thread.

use super::cache::TileCache;
use super::events::{ChannelHandler, TileEvent, TileEventHandler};
use super::fetch::{TileDecoder, TileFetcher, TilePayload};
use super::indexer::TileSet;
use super::loading::{LoadingState, LoadingStateTracker, SubscriptionId};
use super::request::{RequestStatus, TileRequest};
use super::source::TileSource;
use super::TileError;
use crate::core::config::TileLayerConfig;
use crate::core::geo::TileCoord;
use crate::prelude::{Arc, Duration, HashMap, HashSet};
use crate::runtime::{AsyncHandle, AsyncSpawner};
use crate::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use lru::LruCache;
use serde::Serialize;
use std::cmp::Ordering;
use std::num::NonZeroUsize;

/// Outcomes kept for [`RequestScheduler::status`] after a request settles
const STATUS_HISTORY: usize = 512;

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Fetches handed to the spawner
    pub issued: u64,
    pub loaded: u64,
    pub failed: u64,
    /// Queued or in-flight requests dropped because their tile left the view
    pub cancelled: u64,
    /// Completions that arrived for a request already cancelled
    pub stale_completions: u64,
    /// Needed tiles that were already cached
    pub cache_hits: u64,
    pub evictions: u64,
}

/// What a fetch task sends back
struct FetchCompletion {
    id: u64,
    coord: TileCoord,
    result: std::result::Result<TilePayload, TileError>,
}

struct InFlight {
    request: TileRequest,
    handle: Box<dyn AsyncHandle>,
}

/// Turns successive needed-tile sets into fetches.
///
/// At most `max_requests` fetches are in flight at once; the rest wait in a
/// queue ordered by distance from the viewport center. Each needed tile has
/// at most one live request. A tile that failed is not requested again
/// while it stays needed; once it drops out of a needed set and later
/// returns it gets a fresh attempt. The same holds for a tile that loaded
/// but could not stay cached, so a needed set larger than the cache does
/// not refetch on every viewport change.
pub struct RequestScheduler {
    max_requests: usize,
    source: Arc<dyn TileSource>,
    fetcher: Arc<dyn TileFetcher>,
    decoder: Arc<dyn TileDecoder>,
    spawner: Arc<dyn AsyncSpawner>,
    cache: TileCache,
    tracker: LoadingStateTracker,
    in_flight: HashMap<TileCoord, InFlight>,
    /// Waiting requests, best priority first
    queue: Vec<TileRequest>,
    /// Failed while needed; skipped until they leave the needed set
    failed: HashSet<TileCoord>,
    /// Loaded while needed; not refetched after eviction until they leave
    /// the needed set
    loaded: HashSet<TileCoord>,
    needed: HashSet<TileCoord>,
    history: LruCache<TileCoord, RequestStatus>,
    completion_tx: Sender<FetchCompletion>,
    completion_rx: Receiver<FetchCompletion>,
    handlers: Vec<Box<dyn TileEventHandler>>,
    next_id: u64,
    stats: SchedulerStats,
}

impl RequestScheduler {
    pub fn new(
        config: &TileLayerConfig,
        source: Arc<dyn TileSource>,
        fetcher: Arc<dyn TileFetcher>,
        decoder: Arc<dyn TileDecoder>,
        spawner: Arc<dyn AsyncSpawner>,
    ) -> Result<Self> {
        config.validate()?;
        let cache = TileCache::new(config.cache_capacity).with_max_bytes(config.max_cache_bytes);
        let (completion_tx, completion_rx) = unbounded();
        Ok(Self {
            max_requests: config.max_requests,
            source,
            fetcher,
            decoder,
            spawner,
            cache,
            tracker: LoadingStateTracker::new(),
            in_flight: HashMap::default(),
            queue: Vec::new(),
            failed: HashSet::default(),
            loaded: HashSet::default(),
            needed: HashSet::default(),
            history: LruCache::new(NonZeroUsize::new(STATUS_HISTORY).unwrap_or(NonZeroUsize::MIN)),
            completion_tx,
            completion_rx,
            handlers: Vec::new(),
            next_id: 0,
            stats: SchedulerStats::default(),
        })
    }

    /// Reconciles outstanding work with a new needed set.
    ///
    /// Completions already delivered are applied first, so a tile that
    /// finished just before the viewport moved lands in the cache instead of
    /// being cancelled. Calling this twice with the same set does nothing
    /// the second time.
    pub fn on_viewport_change(&mut self, needed: &TileSet) {
        let before = self.tracker.current_state();
        let (_, mut settled) = self.drain_completions();

        let needed_now: HashSet<TileCoord> = needed.coords().collect();
        self.failed.retain(|coord| needed_now.contains(coord));
        self.loaded.retain(|coord| needed_now.contains(coord));

        // In-flight requests that are no longer wanted
        let obsolete: Vec<TileCoord> = self
            .in_flight
            .keys()
            .filter(|coord| !needed_now.contains(coord))
            .copied()
            .collect();
        for coord in obsolete {
            if let Some(mut entry) = self.in_flight.remove(&coord) {
                entry.handle.cancel();
                entry.request.transition(RequestStatus::Cancelled);
                self.history.put(coord, RequestStatus::Cancelled);
                self.stats.cancelled += 1;
                settled += 1;
                log::debug!("cancelled in-flight tile {}", coord);
            }
        }

        // Queued requests that are no longer wanted never started, so there
        // is nothing to settle
        let mut cancelled_queued = 0;
        let history = &mut self.history;
        self.queue.retain_mut(|request| {
            if needed_now.contains(&request.coord) {
                return true;
            }
            request.transition(RequestStatus::Cancelled);
            history.put(request.coord, RequestStatus::Cancelled);
            cancelled_queued += 1;
            false
        });
        self.stats.cancelled += cancelled_queued;

        for &(coord, priority) in needed.iter() {
            if self.cache.get(&coord).is_some() {
                self.stats.cache_hits += 1;
                continue;
            }
            if let Some(entry) = self.in_flight.get_mut(&coord) {
                entry.request.priority = priority;
                continue;
            }
            if let Some(request) = self.queue.iter_mut().find(|r| r.coord == coord) {
                request.priority = priority;
                continue;
            }
            if self.failed.contains(&coord) || self.loaded.contains(&coord) {
                continue;
            }

            let url = self.source.url(coord);
            let request = TileRequest::new(self.next_id, coord, url, priority);
            self.next_id += 1;
            self.history.put(coord, RequestStatus::Queued);
            self.queue.push(request);
        }
        self.queue.sort_by(by_priority);
        self.needed = needed_now;

        self.dispatch();
        self.settle(settled);
        self.notify_state(before);

        log::debug!(
            "viewport change: {} needed, {} in flight, {} queued",
            self.needed.len(),
            self.in_flight.len(),
            self.queue.len()
        );
    }

    /// Applies every completion delivered so far and fills freed slots.
    /// Returns how many completions were consumed, stale ones included.
    pub fn process_completions(&mut self) -> usize {
        let before = self.tracker.current_state();
        let (consumed, settled) = self.drain_completions();
        self.dispatch();
        self.settle(settled);
        self.notify_state(before);
        consumed
    }

    /// Blocks up to `timeout` for one completion, then applies it along
    /// with any others already waiting. Returns the number consumed.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> usize {
        match self.completion_rx.recv_timeout(timeout) {
            Ok(completion) => {
                let before = self.tracker.current_state();
                let applied = usize::from(self.apply(completion));
                let (drained, settled) = self.drain_completions();
                self.dispatch();
                self.settle(applied + settled);
                self.notify_state(before);
                1 + drained
            }
            Err(_) => 0,
        }
    }

    /// Cancels everything queued or in flight, as if the needed set became empty
    pub fn cancel_all(&mut self) {
        self.on_viewport_change(&TileSet::default());
    }

    /// Applies queued completions without dispatching or settling; returns
    /// how many were consumed and how many of those settled a live request
    fn drain_completions(&mut self) -> (usize, usize) {
        let (mut consumed, mut settled) = (0, 0);
        while let Ok(completion) = self.completion_rx.try_recv() {
            consumed += 1;
            if self.apply(completion) {
                settled += 1;
            }
        }
        (consumed, settled)
    }

    /// Returns `true` if the completion belonged to a live request
    fn apply(&mut self, completion: FetchCompletion) -> bool {
        let FetchCompletion { id, coord, result } = completion;
        let is_current = self
            .in_flight
            .get(&coord)
            .map(|entry| entry.request.id == id)
            .unwrap_or(false);
        if !is_current {
            log::debug!("dropping late completion for cancelled tile {}", coord);
            self.stats.stale_completions += 1;
            return false;
        }
        let Some(mut entry) = self.in_flight.remove(&coord) else {
            return false;
        };

        match result {
            Ok(payload) => {
                entry.request.transition(RequestStatus::Loaded);
                self.history.put(coord, RequestStatus::Loaded);
                self.stats.loaded += 1;
                self.loaded.insert(coord);
                let evicted = self.cache.put(coord, payload.clone());
                log::debug!("tile {} loaded ({} bytes)", coord, payload.byte_len());
                for handler in &mut self.handlers {
                    handler.on_tile_ready(coord, &payload);
                }
                self.stats.evictions += evicted.len() as u64;
                for old in evicted {
                    for handler in &mut self.handlers {
                        handler.on_tile_evicted(old);
                    }
                }
            }
            Err(error) if error.is_cancelled() => {
                entry.request.transition(RequestStatus::Cancelled);
                self.history.put(coord, RequestStatus::Cancelled);
                self.stats.cancelled += 1;
            }
            Err(error) => {
                entry.request.transition(RequestStatus::Failed);
                self.history.put(coord, RequestStatus::Failed);
                self.stats.failed += 1;
                self.failed.insert(coord);
                log::warn!("{}", error);
                for handler in &mut self.handlers {
                    handler.on_tile_error(coord, &error);
                }
            }
        }
        true
    }

    /// Starts queued requests while slots are free
    fn dispatch(&mut self) {
        while self.in_flight.len() < self.max_requests && !self.queue.is_empty() {
            let request = self.queue.remove(0);
            self.start(request);
        }
    }

    fn start(&mut self, mut request: TileRequest) {
        request.transition(RequestStatus::Pending);
        let id = request.id;
        let coord = request.coord;
        let url = request.url.clone();
        let fetcher = self.fetcher.clone();
        let decoder = self.decoder.clone();
        let tx = self.completion_tx.clone();

        let handle = self.spawner.spawn_boxed(Box::pin(async move {
            let result = match fetcher.fetch(coord, &url).await {
                Ok(bytes) => decoder.decode(coord, bytes),
                Err(e) => Err(e),
            };
            // The scheduler may have been dropped meanwhile
            let _ = tx.send(FetchCompletion { id, coord, result });
        }));

        log::debug!("fetching tile {} from {}", coord, request.url);
        self.history.put(coord, RequestStatus::Pending);
        self.stats.issued += 1;
        self.tracker.on_request_started();
        self.in_flight.insert(coord, InFlight { request, handle });
    }

    /// Settles after successors were started, so a completion that
    /// immediately frees a slot for the next tile does not flicker to Idle
    fn settle(&mut self, count: usize) {
        for _ in 0..count {
            self.tracker.on_request_settled();
        }
    }

    fn notify_state(&mut self, before: LoadingState) {
        let now = self.tracker.current_state();
        if now != before {
            for handler in &mut self.handlers {
                handler.on_loading_state_changed(now);
            }
        }
    }

    pub fn add_handler(&mut self, handler: Box<dyn TileEventHandler>) {
        self.handlers.push(handler);
    }

    /// A channel receiving every [`TileEvent`] from now on
    pub fn event_channel(&mut self) -> Receiver<TileEvent> {
        let (tx, rx) = unbounded();
        self.add_handler(Box::new(ChannelHandler::new(tx)));
        rx
    }

    pub fn subscribe_loading(&mut self, listener: impl FnMut(LoadingState) + Send + 'static) -> SubscriptionId {
        self.tracker.subscribe(listener)
    }

    pub fn unsubscribe_loading(&mut self, id: SubscriptionId) -> bool {
        self.tracker.unsubscribe(id)
    }

    pub fn loading_state(&self) -> LoadingState {
        self.tracker.current_state()
    }

    pub fn is_idle(&self) -> bool {
        self.loading_state() == LoadingState::Idle
    }

    /// Latest known status of the request for `coord`, if one was made recently
    pub fn status(&self, coord: &TileCoord) -> Option<RequestStatus> {
        if let Some(entry) = self.in_flight.get(coord) {
            return Some(entry.request.status());
        }
        if let Some(request) = self.queue.iter().find(|r| &r.coord == coord) {
            return Some(request.status());
        }
        self.history.peek(coord).copied()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn in_flight(&self) -> impl Iterator<Item = &TileRequest> {
        self.in_flight.values().map(|entry| &entry.request)
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// Waiting requests in dispatch order
    pub fn queued(&self) -> impl Iterator<Item = &TileRequest> {
        self.queue.iter()
    }

    pub fn is_needed(&self, coord: &TileCoord) -> bool {
        self.needed.contains(coord)
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    /// Cached payload for `coord`, refreshing its recency
    pub fn cached(&mut self, coord: &TileCoord) -> Option<TilePayload> {
        self.cache.get(coord)
    }

    /// Empties the cache, telling handlers about every dropped tile. The
    /// next viewport change fetches needed tiles again.
    pub fn clear_cache(&mut self) {
        let coords: Vec<TileCoord> = self.cache.coords().copied().collect();
        self.cache.clear();
        self.loaded.clear();
        for coord in coords {
            for handler in &mut self.handlers {
                handler.on_tile_evicted(coord);
            }
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }
}

impl std::fmt::Debug for RequestScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScheduler")
            .field("max_requests", &self.max_requests)
            .field("in_flight", &self.in_flight.len())
            .field("queued", &self.queue.len())
            .field("cached", &self.cache.len())
            .field("state", &self.tracker.current_state())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Closest to the center first; coordinates break ties
fn by_priority(a: &TileRequest, b: &TileRequest) -> Ordering {
    a.priority
        .total_cmp(&b.priority)
        .then_with(|| a.coord.cmp(&b.coord))
}
