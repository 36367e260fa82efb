use crate::crs::Crs;
use crate::error::{GpkgError, Result};
use crate::ogc_sql::validate_identifier;
use crate::types::{ColumnSpec, ColumnType, GeometryType};
use std::collections::HashMap;

/// Ordered, typed attribute layout of a feature type.
#[derive(Clone, Debug)]
pub struct FeatureSchema {
    name: String,
    crs: Option<Crs>,
    columns: Vec<ColumnSpec>,
    default_geometry: Option<String>,
    index_by_name: HashMap<String, usize>,
}

impl PartialEq for FeatureSchema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.crs == other.crs
            && self.columns == other.columns
            && self.default_geometry == other.default_geometry
    }
}

impl FeatureSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>) -> Result<Self> {
        Self::assemble(name.into(), None, columns, None)
    }

    pub fn builder(name: impl Into<String>) -> FeatureSchemaBuilder {
        FeatureSchemaBuilder {
            name: name.into(),
            crs: None,
            columns: Vec::new(),
            default_geometry: None,
        }
    }

    fn assemble(
        name: String,
        crs: Option<Crs>,
        columns: Vec<ColumnSpec>,
        default_geometry: Option<String>,
    ) -> Result<Self> {
        validate_identifier(&name)?;

        let mut index_by_name = HashMap::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            validate_identifier(&column.name)?;
            // SQLite column names are case-insensitive.
            let duplicate = columns[..idx]
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&column.name));
            if duplicate {
                return Err(GpkgError::invalid(format!(
                    "duplicate attribute '{}' in schema '{name}'",
                    column.name
                )));
            }
            index_by_name.insert(column.name.clone(), idx);
        }

        if let Some(geometry) = &default_geometry {
            match index_by_name.get(geometry).map(|&idx| &columns[idx]) {
                Some(column) if column.column_type.is_geometry() => {}
                _ => {
                    return Err(GpkgError::invalid(format!(
                        "default geometry '{geometry}' is not a geometry attribute of '{name}'"
                    )));
                }
            }
        }

        Ok(Self {
            name,
            crs,
            columns,
            default_geometry,
            index_by_name,
        })
    }

    /// Type name; doubles as the table name of datasets created from it.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.index_of(name).map(|idx| &self.columns[idx])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index_by_name.get(name).copied()
    }

    /// The default geometry attribute, or else the first geometry-typed one.
    pub fn geometry_column(&self) -> Option<&ColumnSpec> {
        match &self.default_geometry {
            Some(name) => self.column(name),
            None => self.columns.iter().find(|c| c.column_type.is_geometry()),
        }
    }
}

/// Incremental construction of a [`FeatureSchema`].
///
/// ```
/// use geopkg_store::{ColumnType, Crs, FeatureSchema, GeometryType};
///
/// let schema = FeatureSchema::builder("stations")
///     .crs(Crs::epsg(4326).expect("known code"))
///     .geometry("geom", GeometryType::Point)
///     .column("name", ColumnType::Varchar)
///     .build()?;
/// assert_eq!(schema.geometry_column().map(|c| c.name.as_str()), Some("geom"));
/// # Ok::<(), geopkg_store::GpkgError>(())
/// ```
#[derive(Clone, Debug)]
pub struct FeatureSchemaBuilder {
    name: String,
    crs: Option<Crs>,
    columns: Vec<ColumnSpec>,
    default_geometry: Option<String>,
}

impl FeatureSchemaBuilder {
    pub fn crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnSpec::new(name, column_type));
        self
    }

    pub fn geometry(self, name: impl Into<String>, geometry_type: GeometryType) -> Self {
        self.column(name, ColumnType::Geometry(geometry_type))
    }

    pub fn default_geometry(mut self, name: impl Into<String>) -> Self {
        self.default_geometry = Some(name.into());
        self
    }

    pub fn build(self) -> Result<FeatureSchema> {
        FeatureSchema::assemble(self.name, self.crs, self.columns, self.default_geometry)
    }
}
