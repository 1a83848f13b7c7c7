//! Core constants derived from Leaflet/deck.gl defaults and common web-map conventions.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Reference square tile size in pixels; zoom levels are defined against it.
pub const TILE_SIZE: u32 = 256;

/// Deepest zoom level the pyramid addressing supports.
pub const MAX_SUPPORTED_ZOOM: u8 = 24;

/// Steepest camera tilt considered when computing visible bounds, in degrees.
pub const MAX_PITCH: f64 = 60.0;

/// Default number of simultaneous tile fetches.
pub const DEFAULT_MAX_REQUESTS: usize = 6;

/// Default number of tiles kept by the LRU cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Default per-tile fetch timeout in milliseconds.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

/// Default user agent; public tile servers reject anonymous clients.
pub const DEFAULT_USER_AGENT: &str = "tilefetch/0.1.0";

/// OpenStreetMap mirrors used by [`crate::UrlTemplateSource::openstreetmap`].
pub const OSM_MIRRORS: [&str; 3] = [
    "https://a.tile.openstreetmap.org/{z}/{x}/{y}.png",
    "https://b.tile.openstreetmap.org/{z}/{x}/{y}.png",
    "https://c.tile.openstreetmap.org/{z}/{x}/{y}.png",
];
