//! Layers that sit between a map viewport and the tile machinery

pub mod tile;
