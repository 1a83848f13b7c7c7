use crate::core::constants::{MAX_PITCH, TILE_SIZE};
use crate::core::geo::{LatLng, LatLngBounds, Point};
use serde::{Deserialize, Serialize};

/// Immutable snapshot of the camera: what is visible, and at which scale.
///
/// Produced by the caller on every camera change. Zoom follows the Leaflet
/// convention where the whole world is `256 * 2^zoom` pixels wide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// The center of the map view in geographical coordinates
    pub center: LatLng,
    /// The current (fractional) zoom level
    pub zoom: f64,
    /// Map rotation in degrees, clockwise from north
    #[serde(default)]
    pub bearing: f64,
    /// Camera tilt in degrees, 0 looks straight down
    #[serde(default)]
    pub pitch: f64,
    /// The size of the viewport in pixels
    pub size: Point,
}

impl Viewport {
    pub fn new(center: LatLng, zoom: f64, size: Point) -> Self {
        Self {
            center,
            zoom,
            bearing: 0.0,
            pitch: 0.0,
            size,
        }
    }

    pub fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = bearing;
        self
    }

    pub fn with_pitch(mut self, pitch: f64) -> Self {
        self.pitch = pitch;
        self
    }

    /// A viewport with finite numbers, a drawable size and a valid center
    pub fn is_valid(&self) -> bool {
        self.center.is_valid()
            && self.zoom.is_finite()
            && self.bearing.is_finite()
            && self.pitch.is_finite()
            && self.size.x.is_finite()
            && self.size.y.is_finite()
            && self.size.x > 0.0
            && self.size.y > 0.0
    }

    /// World size in pixels at the given zoom level
    pub fn world_size(zoom: f64) -> f64 {
        TILE_SIZE as f64 * 2_f64.powf(zoom)
    }

    /// Projects a LatLng to world pixel coordinates at the given zoom level
    pub fn project(&self, lat_lng: &LatLng, zoom: Option<f64>) -> Point {
        let z = zoom.unwrap_or(self.zoom);
        lat_lng.to_normalized().multiply(Self::world_size(z))
    }

    /// Unprojects world pixel coordinates back to LatLng at the given zoom level
    pub fn unproject(&self, pixel: &Point, zoom: Option<f64>) -> LatLng {
        let z = zoom.unwrap_or(self.zoom);
        LatLng::from_normalized(pixel.multiply(1.0 / Self::world_size(z)))
    }

    /// Screen-space offsets of the visible quad's corners from the center.
    ///
    /// Pitch stretches the far (top) edge by `1 / cos(pitch)`, a conservative
    /// stand-in for the perspective frustum.
    fn corner_offsets(&self) -> [Point; 4] {
        let half_w = self.size.x / 2.0;
        let half_h = self.size.y / 2.0;
        let pitch = self.pitch.clamp(0.0, MAX_PITCH);
        let far = half_h / pitch.to_radians().cos();
        [
            Point::new(-half_w, -far),
            Point::new(half_w, -far),
            Point::new(half_w, half_h),
            Point::new(-half_w, half_h),
        ]
    }

    /// Axis-aligned bounds of the visible area in world pixels at `zoom`.
    ///
    /// Returned as `(min, max)`. `x` is not wrapped, so a view spanning the
    /// antimeridian yields values outside `[0, world_size)`. `y` is clamped to
    /// the world.
    pub fn pixel_bounds(&self, zoom: f64) -> (Point, Point) {
        let center = self.project(&self.center, Some(self.zoom));
        let rescale = 2_f64.powf(zoom - self.zoom);

        let mut min = Point::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for offset in self.corner_offsets() {
            let corner = center.add(&offset.rotate(self.bearing)).multiply(rescale);
            min = Point::new(min.x.min(corner.x), min.y.min(corner.y));
            max = Point::new(max.x.max(corner.x), max.y.max(corner.y));
        }

        let world = Self::world_size(zoom);
        min.y = min.y.clamp(0.0, world);
        max.y = max.y.clamp(0.0, world);
        (min, max)
    }

    /// Geographic bounding box of the visible area.
    ///
    /// Longitudes are not wrapped: a view across the antimeridian gives
    /// `west < -180` or `east > 180`.
    pub fn bounds(&self) -> LatLngBounds {
        let (min, max) = self.pixel_bounds(self.zoom);
        let nw = self.unproject(&min, None);
        let se = self.unproject(&max, None);
        LatLngBounds::from_coords(se.lat, nw.lng, nw.lat, se.lng)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(LatLng::default(), 0.0, Point::new(800.0, 600.0))
    }
}
