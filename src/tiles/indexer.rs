//! Viewport to tile-set computation
//!
//! Pure functions only: the same viewport and settings always produce the
//! same [`TileSet`], in the same order.

use crate::core::config::TileLayerConfig;
use crate::core::constants::{MAX_SUPPORTED_ZOOM, TILE_SIZE};
use crate::core::geo::{LatLngBounds, Point, TileCoord};
use crate::core::viewport::Viewport;
use crate::prelude::HashMap;
use std::cmp::Ordering;

/// The tiles one viewport needs, ordered center-first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TileSet {
    pub zoom: u8,
    /// Viewport center in tile units at `zoom`, when computed from a viewport
    pub center: Option<Point>,
    /// `(coord, priority)`, priority being the squared distance in tiles
    /// from the viewport center to the tile center
    entries: Vec<(TileCoord, f64)>,
}

impl TileSet {
    /// A set whose priority is the iteration order of `coords`
    pub fn from_coords(coords: impl IntoIterator<Item = TileCoord>) -> Self {
        let mut entries: Vec<(TileCoord, f64)> = Vec::new();
        for coord in coords {
            if !entries.iter().any(|(c, _)| *c == coord) {
                let rank = entries.len() as f64;
                entries.push((coord, rank));
            }
        }
        let zoom = entries.first().map(|(c, _)| c.z).unwrap_or(0);
        Self {
            zoom,
            center: None,
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.entries.iter().any(|(c, _)| c == coord)
    }

    /// Coordinates, closest to the center first
    pub fn coords(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.entries.iter().map(|(c, _)| *c)
    }

    /// `(coord, priority)` pairs, closest to the center first
    pub fn iter(&self) -> impl Iterator<Item = &(TileCoord, f64)> {
        self.entries.iter()
    }
}

/// Computes which tiles a viewport needs at the nearest available zoom.
#[derive(Debug, Clone, PartialEq)]
pub struct TileIndexer {
    pub tile_size: u32,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub zoom_offset: i32,
    /// Extra tiles around the visible area on every side
    pub prefetch_margin: f64,
    pub extent: Option<LatLngBounds>,
    pub wrap_longitude: bool,
}

impl TileIndexer {
    pub fn new(tile_size: u32, min_zoom: u8, max_zoom: u8, zoom_offset: i32) -> Self {
        Self {
            tile_size,
            min_zoom,
            max_zoom,
            zoom_offset,
            prefetch_margin: 0.0,
            extent: None,
            wrap_longitude: true,
        }
    }

    pub fn from_config(config: &TileLayerConfig) -> Self {
        Self {
            tile_size: config.tile_size,
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
            zoom_offset: config.zoom_offset,
            prefetch_margin: config.prefetch_margin,
            extent: config.extent.clone(),
            wrap_longitude: config.wrap_longitude,
        }
    }

    pub fn with_prefetch_margin(mut self, margin: f64) -> Self {
        self.prefetch_margin = margin;
        self
    }

    /// `clamp(round(zoom + log2(256 / tile_size) + zoom_offset), min, max)`
    pub fn effective_zoom(&self, viewport_zoom: f64) -> u8 {
        let size_adjust = (TILE_SIZE as f64 / self.tile_size.max(1) as f64).log2();
        let z = (viewport_zoom + size_adjust + self.zoom_offset as f64).round();
        let max = self.max_zoom.min(MAX_SUPPORTED_ZOOM);
        let min = self.min_zoom.min(max);
        if z.is_nan() {
            return min;
        }
        z.clamp(min as f64, max as f64) as u8
    }

    /// Every tile intersecting the viewport (plus margin) at the effective
    /// zoom, sorted by distance from the viewport center.
    pub fn needed(&self, viewport: &Viewport) -> TileSet {
        let zoom = self.effective_zoom(viewport.zoom);
        if !viewport.is_valid() {
            log::warn!("ignoring invalid viewport {:?}", viewport);
            return TileSet {
                zoom,
                center: None,
                entries: Vec::new(),
            };
        }

        let n = TileCoord::tiles_per_side(zoom) as i64;
        // Tile units: one unit per tile at `zoom`
        let to_tiles = n as f64 / Viewport::world_size(zoom as f64);
        let (min, max) = viewport.pixel_bounds(zoom as f64);
        let min = min.multiply(to_tiles);
        let max = max.multiply(to_tiles);
        let center = viewport
            .project(&viewport.center, Some(zoom as f64))
            .multiply(to_tiles);

        let margin = self.prefetch_margin.max(0.0);
        let (col_min, col_max) = tile_span(min.x, max.x, margin);
        let (row_min, row_max) = tile_span(min.y, max.y, margin);
        let row_min = row_min.max(0);
        let row_max = row_max.min(n - 1);

        let (col_min, col_max) = if self.wrap_longitude {
            if col_max - col_min + 1 >= n {
                // Wider than the world: every column once, nearest copy wins below
                (col_min, col_min + n - 1)
            } else {
                (col_min, col_max)
            }
        } else {
            (col_min.max(0), col_max.min(n - 1))
        };

        let mut best: HashMap<TileCoord, f64> = HashMap::default();
        for row in row_min..=row_max {
            for col in col_min..=col_max {
                let x = col.rem_euclid(n) as u32;
                let coord = TileCoord::new(x, row as u32, zoom);
                if let Some(extent) = &self.extent {
                    if !extent.intersects(&coord.bounds()) {
                        continue;
                    }
                }
                let priority = distance_sq(center, col, row);
                best.entry(coord)
                    .and_modify(|p| *p = p.min(priority))
                    .or_insert(priority);
            }
        }

        let mut entries: Vec<(TileCoord, f64)> = best.into_iter().collect();
        entries.sort_by(|a, b| match a.1.total_cmp(&b.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });

        TileSet {
            zoom,
            center: Some(center),
            entries,
        }
    }
}

/// Inclusive integer tile range covering `[lo, hi]` grown by `margin`
fn tile_span(lo: f64, hi: f64, margin: f64) -> (i64, i64) {
    let start = (lo - margin).floor() as i64;
    let end = ((hi + margin).ceil() as i64 - 1).max(start);
    (start, end)
}

fn distance_sq(center: Point, col: i64, row: i64) -> f64 {
    let dx = col as f64 + 0.5 - center.x;
    let dy = row as f64 + 0.5 - center.y;
    dx * dx + dy * dy
}

/// The bare contract: tiles for `viewport` with no margin, extent or wrap
/// customisation beyond the defaults.
pub fn needed(viewport: &Viewport, tile_size: u32, min_zoom: u8, max_zoom: u8, zoom_offset: i32) -> TileSet {
    TileIndexer::new(tile_size, min_zoom, max_zoom, zoom_offset).needed(viewport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::LatLng;

    const EPS: f64 = 1e-9;

    fn union_bounds(set: &TileSet) -> LatLngBounds {
        let mut coords = set.coords();
        let first = coords.next().expect("non-empty tile set").bounds();
        coords.fold(first, |acc, c| acc.union(&c.bounds()))
    }

    fn covers(outer: &LatLngBounds, inner: &LatLngBounds) -> bool {
        outer.south() <= inner.south() + EPS
            && outer.west() <= inner.west() + EPS
            && outer.north() >= inner.north() - EPS
            && outer.east() >= inner.east() - EPS
    }

    #[test]
    fn test_effective_zoom() {
        let indexer = TileIndexer::new(256, 0, 19, 0);
        assert_eq!(indexer.effective_zoom(10.4), 10);
        assert_eq!(indexer.effective_zoom(10.5), 11);
        assert_eq!(indexer.effective_zoom(25.0), 19);
        assert_eq!(indexer.effective_zoom(-3.0), 0);

        let offset = TileIndexer::new(256, 0, 19, -1);
        assert_eq!(offset.effective_zoom(10.0), 9);

        let big_tiles = TileIndexer::new(512, 0, 19, 0);
        assert_eq!(big_tiles.effective_zoom(10.0), 9);

        let limited = TileIndexer::new(256, 5, 8, 0);
        assert_eq!(limited.effective_zoom(2.0), 5);
        assert_eq!(limited.effective_zoom(12.0), 8);
    }

    #[test]
    fn test_coverage_property() {
        let indexer = TileIndexer::new(256, 0, 19, 0);
        let cases = [
            (LatLng::new(51.47, 0.45), 10.0, Point::new(800.0, 600.0)),
            (LatLng::new(-33.86, 151.2), 12.3, Point::new(1024.0, 768.0)),
            (LatLng::new(40.7, -74.0), 3.6, Point::new(300.0, 900.0)),
            (LatLng::new(80.0, 10.0), 5.0, Point::new(640.0, 480.0)),
            (LatLng::new(0.0, 0.0), 0.0, Point::new(256.0, 256.0)),
        ];
        for (center, zoom, size) in cases {
            let viewport = Viewport::new(center, zoom, size);
            let set = indexer.needed(&viewport);
            assert_eq!(set.zoom, indexer.effective_zoom(zoom));
            assert!(set.coords().all(|c| c.is_valid() && c.z == set.zoom));
            assert!(
                covers(&union_bounds(&set), &viewport.bounds()),
                "tiles do not cover viewport at {:?} z{}",
                center,
                zoom
            );
        }
    }

    #[test]
    fn test_coverage_property_rotated_and_pitched() {
        let indexer = TileIndexer::new(256, 0, 19, 0);
        let cases = [
            (LatLng::new(51.47, 0.45), 10.0, Point::new(800.0, 600.0), 30.0, 0.0),
            (LatLng::new(48.85, 2.35), 12.0, Point::new(1024.0, 768.0), 0.0, 45.0),
            (LatLng::new(-33.86, 151.2), 11.2, Point::new(640.0, 480.0), 135.0, 60.0),
            (LatLng::new(40.7, -74.0), 6.0, Point::new(300.0, 900.0), -70.0, 20.0),
        ];
        for (center, zoom, size, bearing, pitch) in cases {
            let viewport = Viewport::new(center, zoom, size)
                .with_bearing(bearing)
                .with_pitch(pitch);
            let set = indexer.needed(&viewport);
            let union = union_bounds(&set);
            let padded = LatLngBounds::from_coords(
                union.south() - EPS,
                union.west() - EPS,
                union.north() + EPS,
                union.east() + EPS,
            );

            // Corners of the rotated quad, far edge stretched by the pitch
            let origin = viewport.project(&center, None);
            let far = size.y / 2.0 / pitch.to_radians().cos();
            let offsets = [
                Point::new(-size.x / 2.0, -far),
                Point::new(size.x / 2.0, -far),
                Point::new(size.x / 2.0, size.y / 2.0),
                Point::new(-size.x / 2.0, size.y / 2.0),
            ];
            for offset in offsets {
                let corner = viewport.unproject(&origin.add(&offset.rotate(bearing)), None);
                assert!(
                    padded.contains(&corner),
                    "corner {:?} uncovered at bearing {} pitch {}",
                    corner,
                    bearing,
                    pitch
                );
            }

            let flat = indexer.needed(&Viewport::new(center, zoom, size).with_bearing(bearing));
            assert!(set.len() >= flat.len());
        }
    }

    #[test]
    fn test_deterministic() {
        let indexer = TileIndexer::new(256, 0, 19, 0).with_prefetch_margin(1.0);
        let viewport = Viewport::new(LatLng::new(51.47, 0.45), 10.0, Point::new(800.0, 600.0));
        assert_eq!(indexer.needed(&viewport), indexer.needed(&viewport));
    }

    #[test]
    fn test_center_tile_comes_first() {
        let indexer = TileIndexer::new(256, 0, 19, 0);
        let center = LatLng::new(51.47, 0.45);
        let viewport = Viewport::new(center, 10.0, Point::new(1024.0, 1024.0));
        let set = indexer.needed(&viewport);
        assert_eq!(set.coords().next(), Some(TileCoord::from_lat_lng(&center, 10)));

        let priorities: Vec<f64> = set.iter().map(|(_, p)| *p).collect();
        assert!(priorities.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_prefetch_margin_adds_ring() {
        let viewport = Viewport::new(LatLng::new(10.0, 10.0), 8.0, Point::new(512.0, 512.0));
        let plain = TileIndexer::new(256, 0, 19, 0).needed(&viewport);
        let padded = TileIndexer::new(256, 0, 19, 0)
            .with_prefetch_margin(1.0)
            .needed(&viewport);
        assert!(padded.len() > plain.len());
        assert!(plain.coords().all(|c| padded.contains(&c)));
    }

    #[test]
    fn test_wraps_antimeridian() {
        let viewport = Viewport::new(LatLng::new(0.0, 179.0), 4.0, Point::new(1024.0, 256.0));
        let wrapped = TileIndexer::new(256, 0, 19, 0).needed(&viewport);
        assert!(wrapped.coords().any(|c| c.x == 0));
        assert!(wrapped.coords().any(|c| c.x == 15));

        let mut clipped = TileIndexer::new(256, 0, 19, 0);
        clipped.wrap_longitude = false;
        let clipped = clipped.needed(&viewport);
        assert!(clipped.coords().all(|c| c.x >= 12));
    }

    #[test]
    fn test_world_wider_than_view_has_no_duplicates() {
        let viewport = Viewport::new(LatLng::new(0.0, 0.0), 1.0, Point::new(4096.0, 512.0));
        let set = TileIndexer::new(256, 0, 19, 0).needed(&viewport);
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_extent_filters_tiles() {
        let viewport = Viewport::new(LatLng::new(0.0, 0.0), 2.0, Point::new(1024.0, 1024.0));
        let mut indexer = TileIndexer::new(256, 0, 19, 0);
        let all = indexer.needed(&viewport);
        indexer.extent = Some(LatLngBounds::from_coords(1.0, 1.0, 10.0, 10.0));
        let limited = indexer.needed(&viewport);
        assert_eq!(limited.coords().collect::<Vec<_>>(), vec![TileCoord::new(2, 1, 2)]);
        assert!(all.len() > limited.len());
    }

    #[test]
    fn test_invalid_viewport_yields_nothing() {
        let mut viewport = Viewport::default();
        viewport.size = Point::new(0.0, 0.0);
        assert!(needed(&viewport, 256, 0, 19, 0).is_empty());
    }

    #[test]
    fn test_from_coords_keeps_order() {
        let set = TileSet::from_coords([
            TileCoord::new(1, 1, 3),
            TileCoord::new(1, 2, 3),
            TileCoord::new(1, 1, 3),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.zoom, 3);
        assert_eq!(
            set.coords().collect::<Vec<_>>(),
            vec![TileCoord::new(1, 1, 3), TileCoord::new(1, 2, 3)]
        );
    }
}
