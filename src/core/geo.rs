use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Latitude limit of the square Web Mercator world (EPSG:3857).
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Wraps longitude to [-180, 180) range
    pub fn wrap_lng(lng: f64) -> f64 {
        (lng + 180.0).rem_euclid(360.0) - 180.0
    }

    /// Clamps latitude to the Mercator-representable range
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }

    /// Projects onto the unit Web Mercator square: x grows east, y grows south,
    /// both in `[0, 1]` for in-range coordinates. Longitude is not wrapped.
    pub fn to_normalized(&self) -> Point {
        let lat_rad = Self::clamp_lat(self.lat).to_radians();
        let x = (self.lng + 180.0) / 360.0;
        let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0;
        Point::new(x, y)
    }

    /// Inverse of [`LatLng::to_normalized`].
    pub fn from_normalized(point: Point) -> Self {
        let lng = point.x * 360.0 - 180.0;
        let lat = (PI * (1.0 - 2.0 * point.y)).sinh().atan().to_degrees();
        Self::new(lat, lng)
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// A point in screen, world-pixel or normalized coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn multiply(&self, scalar: f64) -> Point {
        Point::new(self.x * scalar, self.y * scalar)
    }

    /// Rotates around the origin by `degrees`, clockwise on screen (y down).
    pub fn rotate(&self, degrees: f64) -> Point {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Point::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a bounding box of geographical coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Creates bounds from individual coordinates
    pub fn from_coords(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self::new(LatLng::new(south, west), LatLng::new(north, east))
    }

    pub fn south(&self) -> f64 {
        self.south_west.lat
    }

    pub fn west(&self) -> f64 {
        self.south_west.lng
    }

    pub fn north(&self) -> f64 {
        self.north_east.lat
    }

    pub fn east(&self) -> f64 {
        self.north_east.lng
    }

    /// Checks if the bounds contain a point
    pub fn contains(&self, point: &LatLng) -> bool {
        point.lat >= self.south_west.lat
            && point.lat <= self.north_east.lat
            && point.lng >= self.south_west.lng
            && point.lng <= self.north_east.lng
    }

    /// Checks if the bounds intersect with another bounds
    pub fn intersects(&self, other: &LatLngBounds) -> bool {
        !(other.north_east.lat < self.south_west.lat
            || other.south_west.lat > self.north_east.lat
            || other.north_east.lng < self.south_west.lng
            || other.south_west.lng > self.north_east.lng)
    }

    /// Returns the union of this bounds with another bounds
    pub fn union(&self, other: &LatLngBounds) -> LatLngBounds {
        LatLngBounds::from_coords(
            self.south().min(other.south()),
            self.west().min(other.west()),
            self.north().max(other.north()),
            self.east().max(other.east()),
        )
    }
}

/// Address of one tile in the slippy-map pyramid: column, row, zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Number of columns (and rows) at zoom `z`
    pub fn tiles_per_side(z: u8) -> u32 {
        1u32 << z
    }

    /// The tile containing `lat_lng` at `zoom`
    pub fn from_lat_lng(lat_lng: &LatLng, zoom: u8) -> Self {
        let n = Self::tiles_per_side(zoom);
        let p = LatLng::new(lat_lng.lat, LatLng::wrap_lng(lat_lng.lng)).to_normalized();
        let x = ((p.x * n as f64).floor() as i64).clamp(0, n as i64 - 1) as u32;
        let y = ((p.y * n as f64).floor() as i64).clamp(0, n as i64 - 1) as u32;
        Self::new(x, y, zoom)
    }

    /// North-west corner of the tile
    pub fn to_lat_lng(&self) -> LatLng {
        let n = Self::tiles_per_side(self.z) as f64;
        LatLng::from_normalized(Point::new(self.x as f64 / n, self.y as f64 / n))
    }

    /// Geographic bounds of the tile
    pub fn bounds(&self) -> LatLngBounds {
        let nw = self.to_lat_lng();
        let n = Self::tiles_per_side(self.z) as f64;
        let se = LatLng::from_normalized(Point::new(
            (self.x as f64 + 1.0) / n,
            (self.y as f64 + 1.0) / n,
        ));
        LatLngBounds::from_coords(se.lat, nw.lng, nw.lat, se.lng)
    }

    /// Row index counted from the south edge (TMS convention)
    pub fn tms_y(&self) -> u32 {
        Self::tiles_per_side(self.z) - 1 - self.y
    }

    /// Checks if the column and row exist at this zoom level
    pub fn is_valid(&self) -> bool {
        self.z < 32 && self.x < Self::tiles_per_side(self.z) && self.y < Self::tiles_per_side(self.z)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}
