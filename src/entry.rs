//! Catalog entries: one `gpkg_contents` row plus its kind-specific metadata.

use crate::types::{DataType, Envelope, GeometryType};
use chrono::{DateTime, Utc};

/// Kind-specific payload of an [`Entry`].
pub trait Content: Clone + Default {
    const DATA_TYPE: DataType;
}

/// Fields shared by every dataset in `gpkg_contents`.
///
/// Missing fields are derived by the content manager that creates the
/// dataset; the derived values are written back into the caller's entry
/// only when creation succeeds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Entry<C> {
    pub table_name: Option<String>,
    pub identifier: Option<String>,
    pub description: Option<String>,
    pub last_change: Option<DateTime<Utc>>,
    pub srid: Option<i32>,
    pub bounds: Option<Envelope>,
    pub content: C,
}

impl<C: Content> Entry<C> {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: Some(table_name.into()),
            ..Self::default()
        }
    }

    pub fn with_srid(mut self, srid: i32) -> Self {
        self.srid = Some(srid);
        self
    }

    pub fn with_bounds(mut self, bounds: Envelope) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn data_type(&self) -> DataType {
        C::DATA_TYPE
    }

    /// Table name, or an empty string for an entry that was never created.
    pub fn name(&self) -> &str {
        self.table_name.as_deref().unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureContent {
    pub geometry_column: Option<String>,
    pub geometry_type: Option<GeometryType>,
    pub z: bool,
    pub m: bool,
}

impl Content for FeatureContent {
    const DATA_TYPE: DataType = DataType::Features;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RasterContent {
    pub raster_column: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub mime_type: Option<String>,
    pub constraint_name: Option<String>,
}

impl Content for RasterContent {
    const DATA_TYPE: DataType = DataType::Rasters;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TileContent {
    /// Ascending by zoom level when loaded from the catalog.
    pub tile_matrices: Vec<TileMatrix>,
}

impl Content for TileContent {
    const DATA_TYPE: DataType = DataType::Tiles;
}

pub type FeatureEntry = Entry<FeatureContent>;
pub type RasterEntry = Entry<RasterContent>;
pub type TileEntry = Entry<TileContent>;

/// A catalog entry of any kind, as returned by kind-agnostic lookups.
#[derive(Clone, Debug, PartialEq)]
pub enum AnyEntry {
    Features(FeatureEntry),
    Rasters(RasterEntry),
    Tiles(TileEntry),
}

impl AnyEntry {
    pub fn data_type(&self) -> DataType {
        match self {
            AnyEntry::Features(_) => DataType::Features,
            AnyEntry::Rasters(_) => DataType::Rasters,
            AnyEntry::Tiles(_) => DataType::Tiles,
        }
    }

    pub fn table_name(&self) -> &str {
        match self {
            AnyEntry::Features(e) => e.name(),
            AnyEntry::Rasters(e) => e.name(),
            AnyEntry::Tiles(e) => e.name(),
        }
    }
}

/// Grid geometry of one zoom level of a tile pyramid.
#[derive(Clone, Debug, PartialEq)]
pub struct TileMatrix {
    pub zoom_level: i32,
    pub matrix_width: i32,
    pub matrix_height: i32,
    pub tile_width: i32,
    pub tile_height: i32,
    pub x_pixel_size: f64,
    pub y_pixel_size: f64,
}

impl TileMatrix {
    pub fn new(
        zoom_level: i32,
        matrix_width: i32,
        matrix_height: i32,
        tile_width: i32,
        tile_height: i32,
        x_pixel_size: f64,
        y_pixel_size: f64,
    ) -> Self {
        Self {
            zoom_level,
            matrix_width,
            matrix_height,
            tile_width,
            tile_height,
            x_pixel_size,
            y_pixel_size,
        }
    }
}

/// One stored tile. `data` is opaque image bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tile {
    pub zoom: i32,
    pub column: i32,
    pub row: i32,
    pub data: Vec<u8>,
}

impl Tile {
    pub fn new(zoom: i32, column: i32, row: i32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            zoom,
            column,
            row,
            data: data.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AnyEntry, FeatureEntry, TileEntry};
    use crate::types::{DataType, Envelope};

    #[test]
    fn entries_report_their_kind() {
        let entry = FeatureEntry::new("stations")
            .with_srid(4326)
            .with_bounds(Envelope::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(entry.data_type(), DataType::Features);
        assert_eq!(entry.name(), "stations");

        let any = AnyEntry::Tiles(TileEntry::default());
        assert_eq!(any.data_type(), DataType::Tiles);
        assert_eq!(any.table_name(), "");
    }
}
