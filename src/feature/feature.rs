use super::schema::FeatureSchema;
use crate::error::{GpkgError, Result};
use crate::geometry::wkb_from_geometry;
use crate::value::Value;
use geo_traits::GeometryTrait;
use std::sync::Arc;
use wkb::reader::Wkb;

/// A single feature: optional primary key plus one value per schema attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    id: Option<i64>,
    values: Vec<Value>,
    schema: Arc<FeatureSchema>,
}

impl Feature {
    /// A blank feature with every attribute set to `NULL`.
    pub fn new(schema: Arc<FeatureSchema>) -> Self {
        let values = vec![Value::Null; schema.columns().len()];
        Self {
            id: None,
            values,
            schema,
        }
    }

    pub(crate) fn with_values(id: Option<i64>, schema: Arc<FeatureSchema>, values: Vec<Value>) -> Self {
        debug_assert_eq!(values.len(), schema.columns().len());
        Self { id, values, schema }
    }

    /// Primary key of a stored feature; `None` until written.
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).map(|idx| &self.values[idx])
    }

    /// Read an attribute and convert it, e.g. `let name: String = f.property("name")?`.
    pub fn property<T>(&self, name: &str) -> Result<T>
    where
        T: TryFrom<Value, Error = GpkgError>,
    {
        let value = self
            .get(name)
            .ok_or_else(|| GpkgError::invalid(format!("no attribute named '{name}'")))?;
        T::try_from(value.clone())
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let idx = self.schema.index_of(name).ok_or_else(|| {
            GpkgError::invalid(format!(
                "no attribute named '{name}' in '{}'",
                self.schema.name()
            ))
        })?;
        self.values[idx] = value.into();
        Ok(())
    }

    /// Set the default geometry attribute from anything implementing
    /// `geo_traits::GeometryTrait` (e.g. `geo_types::Point` or `wkt::Wkt`).
    pub fn set_geometry<G>(&mut self, geometry: &G) -> Result<()>
    where
        G: GeometryTrait<T = f64>,
    {
        let name = self.geometry_name()?.to_string();
        self.set(&name, Value::Geometry(wkb_from_geometry(geometry)?))
    }

    /// Decode the default geometry attribute. `None` for `NULL`.
    pub fn geometry(&self) -> Result<Option<Wkb<'_>>> {
        let name = self.geometry_name()?;
        match self.get(name) {
            Some(Value::Geometry(bytes)) | Some(Value::Blob(bytes)) => {
                Ok(Some(Wkb::try_new(bytes)?))
            }
            Some(Value::Null) | None => Ok(None),
            Some(other) => Err(GpkgError::ValueTypeMismatch {
                expected: "geometry",
                actual: other.type_name(),
            }),
        }
    }

    fn geometry_name(&self) -> Result<&str> {
        self.schema
            .geometry_column()
            .map(|column| column.name.as_str())
            .ok_or_else(|| {
                GpkgError::invalid(format!(
                    "'{}' has no geometry attribute",
                    self.schema.name()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::Feature;
    use crate::Result;
    use crate::feature::FeatureSchema;
    use crate::types::{ColumnType, GeometryType};
    use crate::value::Value;
    use geo_traits::{CoordTrait, GeometryTrait, GeometryType as GeoType, PointTrait};
    use geo_types::Point;
    use std::sync::Arc;

    fn schema() -> Result<Arc<FeatureSchema>> {
        Ok(Arc::new(
            FeatureSchema::builder("stations")
                .geometry("geom", GeometryType::Point)
                .column("name", ColumnType::Varchar)
                .build()?,
        ))
    }

    #[test]
    fn attributes_are_addressed_by_name() -> Result<()> {
        let mut feature = Feature::new(schema()?);
        assert_eq!(feature.get("name"), Some(&Value::Null));
        feature.set("name", "A")?;
        let name: String = feature.property("name")?;
        assert_eq!(name, "A");
        assert!(feature.set("elevation", 3.0).is_err());
        assert!(feature.get("elevation").is_none());
        Ok(())
    }

    #[test]
    fn geometry_roundtrips_through_wkb() -> Result<()> {
        let mut feature = Feature::new(schema()?);
        assert!(feature.geometry()?.is_none());

        feature.set_geometry(&Point::new(1.0, 1.0))?;
        let geometry = feature.geometry()?.expect("geometry was set");
        match geometry.as_type() {
            GeoType::Point(point) => {
                let coord = point.coord().expect("non-empty point");
                assert_eq!(coord.x_y(), (1.0, 1.0));
            }
            _ => panic!("expected a point"),
        }
        Ok(())
    }
}
