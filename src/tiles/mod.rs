pub mod cache;
pub mod events;
pub mod fetch;
pub mod indexer;
pub mod loading;
pub mod request;
pub mod scheduler;
pub mod source;

use crate::core::geo::TileCoord;

// Re-exports for convenience
pub use cache::TileCache;
pub use events::{ChannelHandler, TileEvent, TileEventHandler};
pub use fetch::{HttpFetcher, RawDecoder, TileDecoder, TileFetcher, TilePayload};
pub use indexer::{TileIndexer, TileSet};
pub use loading::{LoadingState, LoadingStateTracker};
pub use request::{RequestStatus, TileRequest};
pub use scheduler::{RequestScheduler, SchedulerStats};
pub use source::{TileSource, UrlTemplateSource};

/// Why a single tile could not be delivered.
///
/// Cloneable so one failure can fan out to every handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileError {
    #[error("fetching tile {coord} failed: {reason}")]
    FetchFailed { coord: TileCoord, reason: String },

    #[error("tile {coord} returned HTTP {status}")]
    HttpStatus { coord: TileCoord, status: u16 },

    #[error("decoding tile {coord} failed: {reason}")]
    DecodeFailed { coord: TileCoord, reason: String },

    #[error("request for tile {coord} was cancelled")]
    Cancelled { coord: TileCoord },
}

impl TileError {
    pub fn coord(&self) -> TileCoord {
        match self {
            Self::FetchFailed { coord, .. }
            | Self::HttpStatus { coord, .. }
            | Self::DecodeFailed { coord, .. }
            | Self::Cancelled { coord } => *coord,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
