//! Tile pyramids: matrix metadata plus a table of (zoom, column, row) blobs.

mod manager;
mod reader;

pub use manager::TilePyramidManager;
pub use reader::{TileRange, TileReader};
