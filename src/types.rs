use crate::crs::Crs;

/// Geometry type tags stored in `gpkg_geometry_columns.geometry_type_name`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeometryType {
    Geometry,
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColumnType {
    Boolean,
    Varchar,
    Double,
    Integer,
    Blob,
    Geometry(GeometryType),
}

impl ColumnType {
    pub fn is_geometry(&self) -> bool {
        matches!(self, ColumnType::Geometry(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Content kinds recorded in `gpkg_contents.data_type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Features,
    Rasters,
    Tiles,
}

impl DataType {
    pub fn value(self) -> &'static str {
        match self {
            DataType::Features => "features",
            DataType::Rasters => "rasters",
            DataType::Tiles => "tiles",
        }
    }

    pub fn from_value(value: &str) -> Option<Self> {
        match value {
            "features" => Some(DataType::Features),
            "rasters" => Some(DataType::Rasters),
            "tiles" => Some(DataType::Tiles),
            _ => None,
        }
    }
}

/// A 2D bounding box, optionally tagged with the CRS its coordinates are in.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub crs: Option<Crs>,
}

impl Envelope {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
            crs: None,
        }
    }

    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    /// `min <= max` on both axes, no NaN.
    pub fn is_valid(&self) -> bool {
        self.min_x <= self.max_x && self.min_y <= self.max_y
    }

    pub fn expand_to_include(&mut self, other: &Envelope) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }
}
