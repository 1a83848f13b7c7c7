use crate::core::geo::TileCoord;
use std::fmt;

/// Lifecycle of a [`TileRequest`].
///
/// `Queued -> Pending -> {Loaded | Failed}`, with `Cancelled` reachable from
/// either non-terminal state. Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    /// Waiting for a concurrency slot; nothing has been sent yet
    Queued,
    /// Fetch issued and in flight
    Pending,
    Loaded,
    Failed,
    Cancelled,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Loaded | Self::Failed | Self::Cancelled)
    }

    fn can_become(self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Queued, Pending) | (Queued, Cancelled) | (Pending, Loaded) | (Pending, Failed) | (Pending, Cancelled)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Pending => "pending",
            Self::Loaded => "loaded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// One attempt to obtain one tile. Owned by the scheduler for its lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequest {
    /// Unique per scheduler; lets late completions of a replaced request be
    /// told apart from the current one
    pub id: u64,
    pub coord: TileCoord,
    pub url: String,
    /// Squared distance from the viewport center in tiles; lower goes first
    pub priority: f64,
    status: RequestStatus,
}

impl TileRequest {
    pub fn new(id: u64, coord: TileCoord, url: String, priority: f64) -> Self {
        Self {
            id,
            coord,
            url,
            priority,
            status: RequestStatus::Queued,
        }
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    /// Moves to `next`, returning `false` (and leaving the request untouched)
    /// for transitions the lifecycle forbids
    pub fn transition(&mut self, next: RequestStatus) -> bool {
        if self.status.can_become(next) {
            self.status = next;
            true
        } else {
            log::warn!(
                "ignored {} -> {} transition for tile {}",
                self.status,
                next,
                self.coord
            );
            false
        }
    }
}
