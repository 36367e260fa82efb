//! Vector feature datasets: schema model, cursors and the content manager.
//!
//! Features are copied into storage by attribute name. Geometry attributes
//! travel as WKB and are wrapped in the GeoPackage binary header, carrying
//! the dataset SRID, at the storage boundary.

mod collection;
mod cursor;
#[allow(clippy::module_inception)]
mod feature;
mod filter;
mod manager;
mod reader;
mod schema;
mod writer;

pub use collection::{FeatureCollection, FeatureIter, MemoryFeatureCollection};
pub use feature::Feature;
pub use filter::Filter;
pub use manager::FeatureContentManager;
pub use reader::FeatureReader;
pub use schema::{FeatureSchema, FeatureSchemaBuilder};
pub use writer::FeatureWriter;
