//! GeoPackage catalog and content engine built on top of rusqlite.
//!
//! ## Overview
//!
//! - `Gpkg` is the container file. It owns a lazily created connection pool.
//! - `CatalogStore` bootstraps and lists the shared catalog (`gpkg.catalog()`).
//! - `CrsRegistry` registers spatial reference systems (`gpkg.crs()`).
//! - `FeatureContentManager` creates vector datasets and opens cursors over
//!   them (`gpkg.features()`).
//! - `RasterContentManager` stores single-blob rasters through a pluggable
//!   `RasterFormat` (`gpkg.rasters()`).
//! - `TilePyramidManager` creates tile pyramids and reads tiles by range
//!   (`gpkg.tiles()`).
//!
//! `Gpkg` supports several open modes:
//!
//! - `Gpkg::open_read_only(path)`: open an existing file without write access.
//! - `Gpkg::open(path)`: open an existing file for read/write.
//! - `Gpkg::create(path)`: create a new file and bootstrap the catalog.
//! - `Gpkg::temporary()`: a bootstrapped file removed when dropped.
//!
//! Cursors (`FeatureReader`, `FeatureWriter`, `TileReader`) hold a pooled
//! connection until they are closed. Close them when stopping early.
//!
//! ## Writing features
//!
//! ```no_run
//! use geo_types::Point;
//! use geopkg_store::{
//!     ColumnType, Envelope, FeatureEntry, FeatureSchema, Gpkg, GeometryType,
//! };
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gpkg = Gpkg::create("stations.gpkg")?;
//!
//!     let schema = Arc::new(
//!         FeatureSchema::builder("stations")
//!             .geometry("geom", GeometryType::Point)
//!             .column("name", ColumnType::Varchar)
//!             .build()?,
//!     );
//!     let mut entry = FeatureEntry::default()
//!         .with_srid(4326)
//!         .with_bounds(Envelope::new(0.0, 0.0, 10.0, 10.0));
//!     gpkg.features().create(&mut entry, &schema)?;
//!
//!     let mut writer = gpkg.features().writer(&entry, true, None, None)?;
//!     if let Some(mut feature) = writer.next()? {
//!         feature.set("name", "A")?;
//!         feature.set_geometry(&Point::new(1.0, 1.0))?;
//!         writer.write(&feature)?;
//!     }
//!     writer.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Reading features
//!
//! ```no_run
//! use geopkg_store::{Filter, Gpkg};
//! use wkt::to_wkt::write_geometry;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gpkg = Gpkg::open_read_only("stations.gpkg")?;
//!     for entry in gpkg.catalog().features()? {
//!         let filter = Filter::equals("name", "A");
//!         for feature in gpkg.features().reader(&entry, Some(&filter), None)? {
//!             let feature = feature?;
//!             if let Some(geom) = feature.geometry()? {
//!                 let mut wkt = String::new();
//!                 write_geometry(&mut wkt, &geom)?;
//!                 println!("{}: {wkt}", entry.name());
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! `Value` is the owned dynamic value of a feature attribute. Convert with
//! `Feature::property`, which fails on `NULL`; use `Feature::get` to inspect
//! the raw value first.

mod catalog;
mod config;
mod conversions;
mod crs;
mod entry;
mod error;
mod feature;
mod geometry;
mod gpkg;
mod ogc_sql;
mod raster;
mod resource;
mod tile;
mod types;
mod value;

pub use catalog::CatalogStore;
pub use config::{GpkgConfig, JournalMode};
pub use crs::{Crs, CrsAuthority, CrsRegistry, EpsgAuthority};
pub use entry::{
    AnyEntry, Content, Entry, FeatureContent, FeatureEntry, RasterContent, RasterEntry, Tile,
    TileContent, TileEntry, TileMatrix,
};
pub use error::{ErrorKind, GpkgError, Result};
pub use feature::{
    Feature, FeatureCollection, FeatureContentManager, FeatureIter, FeatureReader,
    FeatureSchema, FeatureSchemaBuilder, FeatureWriter, Filter, MemoryFeatureCollection,
};
pub use geometry::geometry_envelope;
pub use gpkg::Gpkg;
pub use raster::{GridCoverage, RasterContentManager, RasterFormat, RasterSource, RawGridFormat};
pub use resource::{CursorState, ScopedConnection, Transaction};
pub use tile::{TilePyramidManager, TileRange, TileReader};
pub use types::{ColumnSpec, ColumnType, DataType, Envelope, GeometryType};
pub use value::Value;
