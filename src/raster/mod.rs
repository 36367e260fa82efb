//! Single-blob raster datasets.

mod format;
mod manager;

pub use format::{GridCoverage, RasterFormat, RasterSource, RawGridFormat};
pub use manager::RasterContentManager;
