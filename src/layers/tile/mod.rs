//! Raster tile layer
//!
//! Wires a [`crate::tiles::TileIndexer`] to a
//! [`crate::tiles::RequestScheduler`] so that callers only deal in viewports.

pub mod layer;

pub use layer::TileLayer;
