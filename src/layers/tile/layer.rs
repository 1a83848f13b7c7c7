//! Core TileLayer implementation

use crate::core::config::TileLayerConfig;
use crate::core::geo::TileCoord;
use crate::core::viewport::Viewport;
use crate::prelude::{Arc, Duration};
use crate::runtime::AsyncSpawner;
use crate::tiles::{
    events::{TileEvent, TileEventHandler},
    fetch::{TileDecoder, TileFetcher, TilePayload},
    indexer::{TileIndexer, TileSet},
    loading::{LoadingState, SubscriptionId},
    scheduler::RequestScheduler,
    source::TileSource,
};
use crate::Result;
use crossbeam_channel::Receiver;

/// How often [`TileLayer::wait_until_idle`] re-checks for completions
#[cfg(feature = "tokio-runtime")]
const IDLE_POLL: Duration = Duration::from_millis(10);

/// One raster tile layer: give it viewports, get tiles back.
///
/// ```no_run
/// # async fn run() -> tilefetch::Result<()> {
/// use tilefetch::prelude::*;
///
/// let mut layer = TileLayer::openstreetmap("osm", TileLayerConfig::for_pixel_ratio(1.0))?;
/// let events = layer.events();
/// layer.set_viewport(&Viewport::new(LatLng::new(51.47, -0.45), 10.0, Point::new(1024.0, 768.0)));
/// layer.wait_until_idle(Duration::from_secs(10)).await;
/// for event in events.try_iter() {
///     println!("{:?}", event);
/// }
/// # Ok(())
/// # }
/// ```
pub struct TileLayer {
    id: String,
    config: TileLayerConfig,
    indexer: TileIndexer,
    scheduler: RequestScheduler,
    viewport: Option<Viewport>,
    needed: TileSet,
}

impl TileLayer {
    pub fn new(
        id: impl Into<String>,
        config: TileLayerConfig,
        source: Arc<dyn TileSource>,
        fetcher: Arc<dyn TileFetcher>,
        decoder: Arc<dyn TileDecoder>,
        spawner: Arc<dyn AsyncSpawner>,
    ) -> Result<Self> {
        let scheduler = RequestScheduler::new(&config, source, fetcher, decoder, spawner)?;
        let indexer = TileIndexer::from_config(&config);
        let id = id.into();
        log::info!(
            "tile layer '{}' ready: zoom {}..={}, {} concurrent requests",
            id,
            config.min_zoom,
            config.max_zoom,
            config.max_requests
        );
        Ok(Self {
            id,
            config,
            indexer,
            scheduler,
            viewport: None,
            needed: TileSet::default(),
        })
    }

    /// OpenStreetMap's three mirrors over HTTP on the current tokio runtime
    #[cfg(feature = "tokio-runtime")]
    pub fn openstreetmap(id: impl Into<String>, config: TileLayerConfig) -> Result<Self> {
        use crate::runtime::TokioSpawner;
        use crate::tiles::{fetch::HttpFetcher, source::UrlTemplateSource};

        let source = UrlTemplateSource::openstreetmap(config.mirror_selection);
        let fetcher = HttpFetcher::with_config(&config)?;
        let spawner = TokioSpawner::current()?;
        Self::new(
            id,
            config,
            Arc::new(source),
            Arc::new(fetcher),
            default_decoder(),
            Arc::new(spawner),
        )
    }

    /// Recomputes the needed tiles and reconciles outstanding requests.
    ///
    /// Invalid viewports (zero size, non-finite values) are ignored and the
    /// previous needed set stays in force.
    pub fn set_viewport(&mut self, viewport: &Viewport) -> &TileSet {
        if !viewport.is_valid() {
            log::warn!("layer '{}': ignoring invalid viewport {:?}", self.id, viewport);
            return &self.needed;
        }
        self.needed = self.indexer.needed(viewport);
        self.viewport = Some(viewport.clone());
        self.scheduler.on_viewport_change(&self.needed);
        &self.needed
    }

    /// Applies finished fetches; call once per frame or tick
    pub fn pump(&mut self) -> usize {
        self.scheduler.process_completions()
    }

    /// Blocks the calling thread up to `timeout` for the next completion
    pub fn pump_blocking(&mut self, timeout: Duration) -> usize {
        self.scheduler.wait_for_completion(timeout)
    }

    /// Pumps until the layer is idle. Returns `false` on timeout.
    #[cfg(feature = "tokio-runtime")]
    pub async fn wait_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = instant::Instant::now() + timeout;
        loop {
            self.pump();
            if self.scheduler.is_idle() {
                return true;
            }
            if instant::Instant::now() >= deadline {
                log::debug!(
                    "layer '{}' still loading after {:?}: {} in flight",
                    self.id,
                    timeout,
                    self.scheduler.in_flight_count()
                );
                return false;
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    /// Cached payload for one tile
    pub fn tile(&mut self, coord: &TileCoord) -> Option<TilePayload> {
        self.scheduler.cached(coord)
    }

    /// Cached tiles of the current needed set, center first
    pub fn ready_tiles(&mut self) -> Vec<(TileCoord, TilePayload)> {
        let coords: Vec<TileCoord> = self.needed.coords().collect();
        coords
            .into_iter()
            .filter_map(|coord| self.scheduler.cached(&coord).map(|payload| (coord, payload)))
            .collect()
    }

    pub fn needed(&self) -> &TileSet {
        &self.needed
    }

    pub fn viewport(&self) -> Option<&Viewport> {
        self.viewport.as_ref()
    }

    pub fn loading_state(&self) -> LoadingState {
        self.scheduler.loading_state()
    }

    pub fn is_loading(&self) -> bool {
        self.loading_state() == LoadingState::Loading
    }

    /// Every tile and loading event from now on
    pub fn events(&mut self) -> Receiver<TileEvent> {
        self.scheduler.event_channel()
    }

    pub fn add_handler(&mut self, handler: Box<dyn TileEventHandler>) {
        self.scheduler.add_handler(handler);
    }

    pub fn on_loading_change(&mut self, listener: impl FnMut(LoadingState) + Send + 'static) -> SubscriptionId {
        self.scheduler.subscribe_loading(listener)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &TileLayerConfig {
        &self.config
    }

    pub fn indexer(&self) -> &TileIndexer {
        &self.indexer
    }

    pub fn scheduler(&self) -> &RequestScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut RequestScheduler {
        &mut self.scheduler
    }
}

impl std::fmt::Debug for TileLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileLayer")
            .field("id", &self.id)
            .field("needed", &self.needed.len())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

/// Decodes images when the `decode` feature is on, passes bytes through otherwise
pub fn default_decoder() -> Arc<dyn TileDecoder> {
    #[cfg(feature = "decode")]
    {
        Arc::new(crate::tiles::fetch::ImageDecoder)
    }
    #[cfg(not(feature = "decode"))]
    {
        Arc::new(crate::tiles::fetch::RawDecoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::{LatLng, Point};
    use crate::runtime::ManualSpawner;
    use crate::tiles::{fetch::RawDecoder, TileError};
    use async_trait::async_trait;

    struct Blank;

    #[async_trait]
    impl TileFetcher for Blank {
        async fn fetch(&self, _coord: TileCoord, _url: &str) -> std::result::Result<Vec<u8>, TileError> {
            Ok(vec![0u8; 16])
        }
    }

    struct Fixed;

    impl TileSource for Fixed {
        fn url(&self, coord: TileCoord) -> String {
            format!("test://{}", coord)
        }
    }

    fn layer(spawner: &ManualSpawner) -> TileLayer {
        TileLayer::new(
            "test",
            TileLayerConfig::default(),
            Arc::new(Fixed),
            Arc::new(Blank),
            Arc::new(RawDecoder),
            Arc::new(spawner.clone()),
        )
        .unwrap()
    }

    #[test]
    fn test_set_viewport_loads_visible_tiles() {
        let spawner = ManualSpawner::new();
        let mut layer = layer(&spawner);
        let viewport = Viewport::new(LatLng::new(0.0, 0.0), 1.0, Point::new(512.0, 512.0));

        let needed = layer.set_viewport(&viewport).len();
        assert_eq!(needed, 4);
        assert!(layer.is_loading());

        spawner.run_all();
        layer.pump();
        assert!(!layer.is_loading());
        assert_eq!(layer.ready_tiles().len(), 4);
    }

    #[test]
    fn test_invalid_viewport_is_ignored() {
        let spawner = ManualSpawner::new();
        let mut layer = layer(&spawner);
        let good = Viewport::new(LatLng::new(0.0, 0.0), 1.0, Point::new(512.0, 512.0));
        layer.set_viewport(&good);

        let bad = Viewport::new(LatLng::new(0.0, 0.0), 1.0, Point::new(0.0, 0.0));
        assert_eq!(layer.set_viewport(&bad).len(), 4);
        assert_eq!(layer.viewport(), Some(&good));
    }
}
