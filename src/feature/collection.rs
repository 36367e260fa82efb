use super::feature::Feature;
use super::filter::Filter;
use super::schema::FeatureSchema;
use crate::error::{GpkgError, Result};
use crate::geometry::geometry_envelope;
use crate::types::Envelope;
use crate::value::Value;
use std::sync::Arc;

/// Fallible stream of features produced by a collection.
pub type FeatureIter<'a> = Box<dyn Iterator<Item = Result<Feature>> + 'a>;

/// A source of features sharing one schema.
pub trait FeatureCollection {
    fn schema(&self) -> &Arc<FeatureSchema>;

    /// A fresh iterator over the features. May be called more than once.
    fn features(&self) -> Result<FeatureIter<'_>>;

    /// Bounds of all default geometries; `None` when there is no geometry.
    fn bounds(&self) -> Result<Option<Envelope>> {
        matching_bounds(self, &Filter::Include)
    }
}

/// Bounds of the default geometries of the features matching `filter`,
/// tagged with the schema CRS.
pub(crate) fn matching_bounds<C>(collection: &C, filter: &Filter) -> Result<Option<Envelope>>
where
    C: FeatureCollection + ?Sized,
{
    let Some(name) = collection
        .schema()
        .geometry_column()
        .map(|c| c.name.clone())
    else {
        return Ok(None);
    };
    let mut bounds: Option<Envelope> = None;
    for feature in collection.features()? {
        let feature = feature?;
        if !filter.matches(&feature) {
            continue;
        }
        let envelope = match feature.get(&name) {
            Some(Value::Geometry(wkb)) | Some(Value::Blob(wkb)) => geometry_envelope(wkb)?,
            _ => None,
        };
        if let Some(envelope) = envelope {
            match &mut bounds {
                Some(existing) => existing.expand_to_include(&envelope),
                None => bounds = Some(envelope),
            }
        }
    }
    Ok(bounds.map(|b| match collection.schema().crs() {
        Some(crs) => b.with_crs(crs.clone()),
        None => b,
    }))
}

/// Features held in memory.
#[derive(Clone, Debug)]
pub struct MemoryFeatureCollection {
    schema: Arc<FeatureSchema>,
    features: Vec<Feature>,
}

impl MemoryFeatureCollection {
    pub fn new(schema: Arc<FeatureSchema>) -> Self {
        Self {
            schema,
            features: Vec::new(),
        }
    }

    /// Add a feature; it must have been built from this collection's schema.
    pub fn push(&mut self, feature: Feature) -> Result<()> {
        if feature.schema() != &self.schema {
            return Err(GpkgError::invalid(format!(
                "feature of '{}' does not belong to collection of '{}'",
                feature.schema().name(),
                self.schema.name()
            )));
        }
        self.features.push(feature);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl FeatureCollection for MemoryFeatureCollection {
    fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    fn features(&self) -> Result<FeatureIter<'_>> {
        Ok(Box::new(self.features.iter().cloned().map(Ok)))
    }
}

#[cfg(test)]
mod tests {
    use super::{FeatureCollection, MemoryFeatureCollection};
    use crate::Result;
    use crate::crs::Crs;
    use crate::feature::{Feature, FeatureSchema};
    use crate::types::{ColumnType, Envelope, GeometryType};
    use geo_types::Point;
    use std::sync::Arc;

    #[test]
    fn bounds_cover_every_geometry() -> Result<()> {
        let schema = Arc::new(
            FeatureSchema::builder("stations")
                .crs(Crs::epsg(4326).expect("known code"))
                .geometry("geom", GeometryType::Point)
                .build()?,
        );
        let mut collection = MemoryFeatureCollection::new(schema.clone());
        assert_eq!(collection.bounds()?, None);

        for (x, y) in [(1.0, 4.0), (-3.0, 2.0)] {
            let mut feature = Feature::new(schema.clone());
            feature.set_geometry(&Point::new(x, y))?;
            collection.push(feature)?;
        }
        collection.push(Feature::new(schema.clone()))?;

        let bounds = collection.bounds()?.expect("bounds");
        assert_eq!(bounds.crs.as_ref().map(|c| c.organization_coordsys_id), Some(4326));
        assert_eq!(
            Envelope { crs: None, ..bounds },
            Envelope::new(-3.0, 2.0, 1.0, 4.0)
        );
        Ok(())
    }

    #[test]
    fn rejects_features_of_other_schemas() -> Result<()> {
        let schema = Arc::new(
            FeatureSchema::builder("a")
                .column("v", ColumnType::Integer)
                .build()?,
        );
        let other = Arc::new(
            FeatureSchema::builder("b")
                .column("v", ColumnType::Integer)
                .build()?,
        );
        let mut collection = MemoryFeatureCollection::new(schema);
        assert!(collection.push(Feature::new(other)).is_err());
        assert!(collection.is_empty());
        Ok(())
    }
}
