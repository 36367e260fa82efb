use super::collection::{FeatureCollection, matching_bounds};
use super::cursor::{FeatureLayout, KeysetCursor};
use super::feature::Feature;
use super::filter::Filter;
use super::reader::FeatureReader;
use super::schema::FeatureSchema;
use super::writer::FeatureWriter;
use crate::Gpkg;
use crate::catalog::{ensure_table_available, insert_contents, insert_geometry_columns};
use crate::conversions::column_type_to_str;
use crate::entry::FeatureEntry;
use crate::error::{GpkgError, Result};
use crate::ogc_sql::{quote_identifier, sql_create_table, validate_table_name};
use crate::resource::{ConnectionHandle, Transaction};
use crate::types::ColumnType;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

const PRIMARY_KEY_COLUMN: &str = "fid";

/// Creates, populates and opens cursors over vector feature datasets.
pub struct FeatureContentManager<'a> {
    pub(crate) gpkg: &'a Gpkg,
}

impl<'a> FeatureContentManager<'a> {
    /// Create an empty feature dataset for `schema`.
    ///
    /// Missing entry fields are derived: the table name is the schema name,
    /// the geometry column and type come from the schema's (default)
    /// geometry attribute, identifier and description default to the table
    /// name, and the SRID is resolved from the schema CRS. Bounds are
    /// required. `entry` is updated with the derived values on success.
    pub fn create(&self, entry: &mut FeatureEntry, schema: &FeatureSchema) -> Result<()> {
        self.gpkg.ensure_writable()?;
        let derived = self.derive(entry, schema)?;
        let table_name = derived.name().to_string();
        let srid = derived
            .srid
            .ok_or_else(|| GpkgError::invalid("Entry must have srid"))?;

        let resources = self.gpkg.resources();
        resources.with_connection(|conn| ensure_table_available(conn, &table_name))?;
        self.gpkg.crs().register(srid)?;

        let create_sql = sql_create_table(&table_name, &column_definitions(schema));
        resources.with_transaction(|conn| {
            ensure_table_available(conn, &table_name)?;
            debug!(sql = %create_sql, "creating feature table");
            conn.execute_batch(&create_sql)?;
            insert_contents(conn, &derived)?;
            insert_geometry_columns(conn, &derived)?;
            Ok(())
        })?;

        info!(table = %table_name, srid, "created feature dataset");
        *entry = derived;
        Ok(())
    }

    /// Create the dataset and copy every feature of `collection` into it in
    /// one transaction. Any failure rolls back all rows.
    pub fn add<C>(&self, entry: &mut FeatureEntry, collection: &C) -> Result<()>
    where
        C: FeatureCollection + ?Sized,
    {
        self.add_filtered(entry, collection, &Filter::Include)
    }

    /// Like [`add`](Self::add), copying only the features matching `filter`.
    pub fn add_filtered<C>(
        &self,
        entry: &mut FeatureEntry,
        collection: &C,
        filter: &Filter,
    ) -> Result<()>
    where
        C: FeatureCollection + ?Sized,
    {
        self.gpkg.ensure_writable()?;
        let mut derived = entry.clone();
        if derived.bounds.is_none() {
            derived.bounds = match filter {
                Filter::Include => collection.bounds()?,
                _ => matching_bounds(collection, filter)?,
            };
        }
        self.create(&mut derived, collection.schema())?;

        let tx = self.gpkg.begin()?;
        match self.copy_features(&derived, collection, filter, &tx) {
            Ok(copied) => {
                tx.commit()?;
                info!(table = derived.name(), copied, "populated feature dataset");
            }
            Err(err) => {
                tx.rollback_logged();
                return Err(err);
            }
        }

        *entry = derived;
        Ok(())
    }

    fn copy_features<C>(
        &self,
        entry: &FeatureEntry,
        collection: &C,
        filter: &Filter,
        tx: &Transaction,
    ) -> Result<u64>
    where
        C: FeatureCollection + ?Sized,
    {
        let mut writer = self.writer(entry, true, None, Some(tx))?;
        for source in collection.features()? {
            let source = source?;
            if !filter.matches(&source) {
                continue;
            }
            let mut target = writer
                .next()?
                .ok_or_else(|| GpkgError::invalid("append writer yielded no feature"))?;
            copy_attributes(&source, &mut target)?;
            writer.write(&target)?;
        }
        let copied = writer.written();
        writer.close();
        Ok(copied)
    }

    /// Open a writer. `append` yields an insert-only cursor; otherwise the
    /// cursor walks the stored features matching `filter` (all when `None`).
    /// Without `transaction` each write commits on its own.
    pub fn writer<'t>(
        &self,
        entry: &FeatureEntry,
        append: bool,
        filter: Option<&Filter>,
        transaction: Option<&'t Transaction>,
    ) -> Result<FeatureWriter<'t>> {
        self.gpkg.ensure_writable()?;
        let conn = ConnectionHandle::acquire(self.gpkg.resources(), transaction)?;
        let layout = Arc::new(FeatureLayout::resolve(&conn, entry)?);
        if append {
            return Ok(FeatureWriter::append(conn, layout));
        }
        let filter = filter.cloned().unwrap_or_default();
        let cursor = KeysetCursor::new(layout.clone(), &filter, self.gpkg.config().batch_size)?;
        Ok(FeatureWriter::modify(conn, layout, cursor))
    }

    /// Open a lazy reader over the stored features matching `filter`.
    pub fn reader<'t>(
        &self,
        entry: &FeatureEntry,
        filter: Option<&Filter>,
        transaction: Option<&'t Transaction>,
    ) -> Result<FeatureReader<'t>> {
        let conn = ConnectionHandle::acquire(self.gpkg.resources(), transaction)?;
        let layout = Arc::new(FeatureLayout::resolve(&conn, entry)?);
        let filter = filter.cloned().unwrap_or_default();
        let cursor = KeysetCursor::new(layout.clone(), &filter, self.gpkg.config().batch_size)?;
        Ok(FeatureReader::new(conn, cursor, layout.schema.clone()))
    }

    /// Validate `entry` against `schema` and fill in every derivable field.
    /// Performs no writes.
    fn derive(&self, entry: &FeatureEntry, schema: &FeatureSchema) -> Result<FeatureEntry> {
        let mut derived = entry.clone();

        let table_name = schema.name().to_string();
        validate_table_name(&table_name)?;
        if let Some(column) = schema
            .columns()
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(PRIMARY_KEY_COLUMN))
        {
            return Err(GpkgError::invalid(format!(
                "attribute name '{}' is reserved for the primary key",
                column.name
            )));
        }

        let geometry = match &entry.content.geometry_column {
            Some(name) => schema
                .column(name)
                .filter(|c| c.column_type.is_geometry())
                .ok_or_else(|| {
                    GpkgError::invalid(format!("Geometry column {name} does not exist in schema"))
                })?,
            None => schema.geometry_column().ok_or_else(|| {
                GpkgError::invalid(format!("schema '{}' has no geometry attribute", schema.name()))
            })?,
        };
        let ColumnType::Geometry(geometry_type) = geometry.column_type else {
            return Err(GpkgError::invalid("geometry attribute is not geometry typed"));
        };

        let bounds = entry
            .bounds
            .clone()
            .ok_or_else(|| GpkgError::invalid("Entry must have bounds"))?;
        if !bounds.is_valid() {
            return Err(GpkgError::invalid(format!(
                "bounds min must not exceed max: {bounds:?}"
            )));
        }

        let srid = match entry.srid {
            Some(srid) => srid,
            None => schema
                .crs()
                .and_then(|crs| self.gpkg.crs().resolve_srid(crs))
                .ok_or_else(|| GpkgError::invalid("Entry must have srid"))?,
        };

        let identifier = entry
            .identifier
            .clone()
            .unwrap_or_else(|| table_name.clone());
        derived.description = entry
            .description
            .clone()
            .or_else(|| Some(identifier.clone()));
        derived.identifier = Some(identifier);
        derived.table_name = Some(table_name);
        derived.content.geometry_column = Some(geometry.name.clone());
        derived.content.geometry_type = Some(entry.content.geometry_type.unwrap_or(geometry_type));
        derived.srid = Some(srid);
        derived.bounds = Some(bounds);
        derived.last_change = Some(Utc::now());
        Ok(derived)
    }
}

fn column_definitions(schema: &FeatureSchema) -> String {
    let mut defs = Vec::with_capacity(schema.columns().len() + 1);
    defs.push(format!(
        "{} INTEGER PRIMARY KEY AUTOINCREMENT",
        quote_identifier(PRIMARY_KEY_COLUMN)
    ));
    for column in schema.columns() {
        defs.push(format!(
            "{} {}",
            quote_identifier(&column.name),
            column_type_to_str(column.column_type)
        ));
    }
    defs.join(", ")
}

/// Copy every attribute of `source` that `target` also has, by name.
fn copy_attributes(source: &Feature, target: &mut Feature) -> Result<()> {
    let target_schema = target.schema().clone();
    for column in target_schema.columns() {
        if let Some(value) = source.get(&column.name) {
            target.set(&column.name, value.clone())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::feature::tests::{point_entry, stations};
    use crate::feature::{
        Feature, FeatureCollection, FeatureIter, FeatureSchema, Filter, MemoryFeatureCollection,
    };
    use crate::types::{ColumnType, Envelope, GeometryType};
    use crate::{FeatureEntry, Gpkg, GpkgConfig, GpkgError, JournalMode, Result};
    use geo_traits::{CoordTrait, GeometryTrait, GeometryType as GeoType, PointTrait};
    use geo_types::Point;
    use std::sync::Arc;

    fn count_rows(gpkg: &Gpkg, sql: &str) -> Result<i64> {
        gpkg.resources()
            .with_connection(|conn| Ok(conn.query_row(sql, [], |row| row.get(0))?))
    }

    fn table_exists(gpkg: &Gpkg, name: &str) -> Result<bool> {
        gpkg.catalog().has_table(name)
    }

    #[test]
    fn stations_scenario() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let schema = stations()?;
        let mut collection = MemoryFeatureCollection::new(schema.clone());
        let mut feature = Feature::new(schema.clone());
        feature.set("name", "A")?;
        feature.set_geometry(&Point::new(1.0, 1.0))?;
        collection.push(feature)?;

        let mut entry = point_entry();
        gpkg.features().add(&mut entry, &collection)?;

        let features = gpkg
            .features()
            .reader(&entry, None, None)?
            .collect::<Result<Vec<Feature>>>()?;
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].property::<String>("name")?, "A");
        let geometry = features[0].geometry()?.expect("geometry");
        match geometry.as_type() {
            GeoType::Point(point) => {
                assert_eq!(point.coord().map(|c| c.x_y()), Some((1.0, 1.0)));
            }
            _ => panic!("expected a point"),
        }

        assert_eq!(
            count_rows(&gpkg, "SELECT COUNT(*) FROM gpkg_contents WHERE table_name = 'stations'")?,
            1
        );
        assert_eq!(
            count_rows(
                &gpkg,
                "SELECT COUNT(*) FROM gpkg_geometry_columns WHERE table_name = 'stations'"
            )?,
            1
        );
        Ok(())
    }

    #[test]
    fn create_derives_missing_fields() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let schema = FeatureSchema::builder("parcels")
            .crs(crate::Crs::epsg(3857).expect("known code"))
            .column("owner", ColumnType::Varchar)
            .geometry("outline", GeometryType::Polygon)
            .build()?;
        let mut entry = FeatureEntry::default().with_bounds(Envelope::new(0.0, 0.0, 5.0, 5.0));
        gpkg.features().create(&mut entry, &schema)?;

        assert_eq!(entry.table_name.as_deref(), Some("parcels"));
        assert_eq!(entry.identifier.as_deref(), Some("parcels"));
        assert_eq!(entry.description.as_deref(), Some("parcels"));
        assert_eq!(entry.srid, Some(3857));
        assert_eq!(entry.content.geometry_column.as_deref(), Some("outline"));
        assert_eq!(entry.content.geometry_type, Some(GeometryType::Polygon));
        assert!(gpkg.crs().contains(3857)?);

        let stored = gpkg.catalog().feature("parcels")?.expect("stored entry");
        assert_eq!(stored.content, entry.content);
        assert_eq!(stored.identifier, entry.identifier);
        Ok(())
    }

    #[test]
    fn create_without_bounds_fails_before_writing() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let mut entry = FeatureEntry::default().with_srid(4326);
        let err = gpkg
            .features()
            .create(&mut entry, &*stations()?)
            .expect_err("bounds are required");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(!table_exists(&gpkg, "stations")?);
        assert_eq!(entry, FeatureEntry::default().with_srid(4326));
        Ok(())
    }

    #[test]
    fn create_rejects_unresolvable_srid_and_bad_geometry_column() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let mut entry = FeatureEntry::default().with_bounds(Envelope::new(0.0, 0.0, 1.0, 1.0));
        let err = gpkg
            .features()
            .create(&mut entry, &*stations()?)
            .expect_err("no srid and no schema crs");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let mut entry = point_entry();
        entry.content.geometry_column = Some("name".to_string());
        let err = gpkg
            .features()
            .create(&mut entry, &*stations()?)
            .expect_err("name is not a geometry");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(!table_exists(&gpkg, "stations")?);
        Ok(())
    }

    #[test]
    fn duplicate_table_names_are_rejected() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        gpkg.features().create(&mut point_entry(), &*stations()?)?;
        let err = gpkg
            .features()
            .create(&mut point_entry(), &*stations()?)
            .expect_err("already exists");
        assert!(matches!(err, GpkgError::TableExists(name) if name == "stations"));
        Ok(())
    }

    #[test]
    fn hostile_names_stay_quoted() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let schema = FeatureSchema::builder(r#"odd"; DROP TABLE gpkg_contents; --"#)
            .geometry("geom", GeometryType::Point)
            .column(r#"na"me"#, ColumnType::Varchar)
            .build()?;
        let mut entry = point_entry();
        gpkg.features().create(&mut entry, &schema)?;
        assert_eq!(gpkg.catalog().table_names()?, vec![schema.name().to_string()]);

        let mut writer = gpkg.features().writer(&entry, true, None, None)?;
        let mut feature = writer.next()?.expect("blank");
        feature.set(r#"na"me"#, "ok")?;
        writer.write(&feature)?;
        writer.close();
        assert_eq!(gpkg.features().reader(&entry, None, None)?.count(), 1);
        Ok(())
    }

    /// Yields `ok` features, then an error.
    struct FailingCollection {
        schema: Arc<FeatureSchema>,
        ok: usize,
    }

    impl FeatureCollection for FailingCollection {
        fn schema(&self) -> &Arc<FeatureSchema> {
            &self.schema
        }

        fn features(&self) -> Result<FeatureIter<'_>> {
            let schema = self.schema.clone();
            let ok = self.ok;
            Ok(Box::new((0..=ok).map(move |i| {
                if i == ok {
                    return Err(GpkgError::invalid("source failed"));
                }
                let mut feature = Feature::new(schema.clone());
                feature.set("name", format!("f{i}"))?;
                feature.set_geometry(&Point::new(i as f64, 0.0))?;
                Ok(feature)
            })))
        }
    }

    #[test]
    fn failing_source_rolls_back_every_row() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let collection = FailingCollection {
            schema: stations()?,
            ok: 3,
        };
        let mut entry = point_entry();
        let err = gpkg
            .features()
            .add(&mut entry, &collection)
            .expect_err("source fails mid-iteration");
        assert!(matches!(err, GpkgError::InvalidArgument(msg) if msg == "source failed"));

        assert!(table_exists(&gpkg, "stations")?);
        assert_eq!(count_rows(&gpkg, r#"SELECT COUNT(*) FROM "stations""#)?, 0);
        assert_eq!(entry, point_entry());
        let state = gpkg.pool_state()?;
        assert_eq!(state.connections, state.idle_connections);
        Ok(())
    }

    #[test]
    fn add_derives_bounds_and_applies_filter() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let schema = stations()?;
        let mut collection = MemoryFeatureCollection::new(schema.clone());
        for (name, x) in [("keep", 2.0), ("drop", 100.0), ("keep", 4.0)] {
            let mut feature = Feature::new(schema.clone());
            feature.set("name", name)?;
            feature.set_geometry(&Point::new(x, x))?;
            collection.push(feature)?;
        }

        let mut entry = FeatureEntry::default().with_srid(4326);
        gpkg.features()
            .add_filtered(&mut entry, &collection, &Filter::equals("name", "keep"))?;

        let bounds = entry.bounds.clone().expect("derived bounds");
        assert_eq!((bounds.min_x, bounds.max_x), (2.0, 4.0));
        assert_eq!((bounds.min_y, bounds.max_y), (2.0, 4.0));
        assert_eq!(gpkg.features().reader(&entry, None, None)?.count(), 2);
        Ok(())
    }

    #[test]
    fn add_of_empty_collection_needs_bounds() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let collection = MemoryFeatureCollection::new(stations()?);
        let mut entry = FeatureEntry::default().with_srid(4326);
        let err = gpkg
            .features()
            .add(&mut entry, &collection)
            .expect_err("no geometry to derive bounds from");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(!table_exists(&gpkg, "stations")?);
        Ok(())
    }

    #[test]
    fn read_only_container_refuses_writes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("features.gpkg");
        {
            let config = GpkgConfig {
                journal_mode: JournalMode::Delete,
                ..GpkgConfig::default()
            };
            let gpkg = Gpkg::create_with_config(&path, config)?;
            gpkg.features().create(&mut point_entry(), &*stations()?)?;
        }
        let gpkg = Gpkg::open_read_only(&path)?;
        let entry = gpkg.catalog().feature("stations")?.expect("stored");
        assert!(matches!(
            gpkg.features().writer(&entry, true, None, None),
            Err(GpkgError::ReadOnly)
        ));
        assert_eq!(gpkg.features().reader(&entry, None, None)?.count(), 0);
        Ok(())
    }
}
