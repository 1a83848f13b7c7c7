//! Consumer-facing notifications

use super::fetch::TilePayload;
use super::loading::LoadingState;
use super::TileError;
use crate::core::geo::TileCoord;
use crossbeam_channel::Sender;

/// Everything a consumer can be told about a layer
#[derive(Debug, Clone, PartialEq)]
pub enum TileEvent {
    Ready { coord: TileCoord, payload: TilePayload },
    Error { coord: TileCoord, error: TileError },
    /// A tile left the cache; drop any GPU/canvas resources made from it
    Evicted { coord: TileCoord },
    LoadingStateChanged(LoadingState),
}

/// Callback interface for tile outcomes. All methods default to no-ops.
///
/// Loading-state edges arrive after the tile notifications that caused
/// them, so an `Idle` always follows the last `on_tile_ready` of a burst.
pub trait TileEventHandler: Send {
    fn on_tile_ready(&mut self, _coord: TileCoord, _payload: &TilePayload) {}

    fn on_tile_error(&mut self, _coord: TileCoord, _error: &TileError) {}

    fn on_tile_evicted(&mut self, _coord: TileCoord) {}

    fn on_loading_state_changed(&mut self, _state: LoadingState) {}
}

/// Forwards every notification into a channel as a [`TileEvent`]
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: Sender<TileEvent>,
}

impl ChannelHandler {
    pub fn new(tx: Sender<TileEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: TileEvent) {
        // A dropped receiver just means nobody listens any more
        let _ = self.tx.send(event);
    }
}

impl TileEventHandler for ChannelHandler {
    fn on_tile_ready(&mut self, coord: TileCoord, payload: &TilePayload) {
        self.send(TileEvent::Ready {
            coord,
            payload: payload.clone(),
        });
    }

    fn on_tile_error(&mut self, coord: TileCoord, error: &TileError) {
        self.send(TileEvent::Error {
            coord,
            error: error.clone(),
        });
    }

    fn on_tile_evicted(&mut self, coord: TileCoord) {
        self.send(TileEvent::Evicted { coord });
    }

    fn on_loading_state_changed(&mut self, state: LoadingState) {
        self.send(TileEvent::LoadingStateChanged(state));
    }
}
