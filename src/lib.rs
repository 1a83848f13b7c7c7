//! # tilefetch
//!
//! A viewport-driven raster tile engine inspired by Leaflet and deck.gl tile
//! layers.
//!
//! Given a continuously changing map viewport, the engine works out which
//! X/Y/Z tiles are needed, fetches them under a concurrency budget, keeps
//! them in a bounded LRU cache and reports an aggregate loading/idle signal.
//! It stops at handing decoded payloads to the consumer; drawing them is the
//! caller's business.

pub mod core;
pub mod layers;
pub mod prelude;
pub mod runtime;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    config::{MirrorSelection, TileLayerConfig, TileLoadingProfile},
    geo::{LatLng, LatLngBounds, Point, TileCoord},
    viewport::Viewport,
};

pub use layers::tile::TileLayer;

pub use tiles::{
    cache::TileCache,
    events::{TileEvent, TileEventHandler},
    fetch::{HttpFetcher, RawDecoder, TileDecoder, TileFetcher, TilePayload},
    indexer::{TileIndexer, TileSet},
    loading::{LoadingState, LoadingStateTracker},
    request::{RequestStatus, TileRequest},
    scheduler::{RequestScheduler, SchedulerStats},
    source::{TileSource, UrlTemplateSource},
    TileError,
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid tile URL template: {0}")]
    InvalidTemplate(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Initialise `env_logger` from `RUST_LOG`. Safe to call more than once.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
