//! Prelude module for common tilefetch types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use tilefetch::prelude::*;`

pub use crate::core::{
    config::{MirrorSelection, TileLayerConfig, TileLoadingProfile},
    geo::{LatLng, LatLngBounds, Point, TileCoord},
    viewport::Viewport,
};

pub use crate::layers::tile::TileLayer;

pub use crate::runtime::{AsyncHandle, AsyncSpawner};

#[cfg(feature = "tokio-runtime")]
pub use crate::runtime::TokioSpawner;

pub use crate::tiles::{
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

#[cfg(feature = "decode")]
pub use crate::tiles::fetch::ImageDecoder;

pub use crate::{Error, Result};

pub use std::{sync::Arc, time::Duration};

pub use instant::Instant;

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};

pub use futures::Future;
pub use std::pin::Pin;
