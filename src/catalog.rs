//! Catalog bootstrap and kind-aware listing of `gpkg_contents`.

use crate::Gpkg;
use crate::conversions::{
    column_type_from_str, format_timestamp, geometry_type_from_str, geometry_type_to_str,
    parse_timestamp,
};
use crate::crs::{Crs, register_default_srs};
use crate::entry::{
    AnyEntry, Content, Entry, FeatureContent, FeatureEntry, RasterContent, RasterEntry,
    TileContent, TileEntry, TileMatrix,
};
use crate::error::{GpkgError, Result};
use crate::ogc_sql::{
    BOOTSTRAP_SCRIPTS, ENTRY_COLUMN_COUNT, GPKG_APPLICATION_ID, GPKG_USER_VERSION,
    SQL_INSERT_GPKG_CONTENTS, SQL_INSERT_GPKG_DATA_COLUMNS, SQL_INSERT_GPKG_GEOMETRY_COLUMNS,
    SQL_LIST_TABLES, SQL_SELECT_TILE_MATRICES, SQL_TABLE_IS_TAKEN, sql_select_feature_entries,
    sql_select_raster_entries, sql_select_tile_entries, sql_table_columns,
};
use crate::types::{ColumnSpec, DataType, Envelope};
use chrono::Utc;
use rusqlite::{Connection, Row, params};
use tracing::{debug, info};

/// Read and bootstrap access to the shared catalog tables.
pub struct CatalogStore<'a> {
    pub(crate) gpkg: &'a Gpkg,
}

impl<'a> CatalogStore<'a> {
    /// Create the catalog tables and default spatial reference systems.
    ///
    /// Safe to run any number of times against the same file.
    pub fn bootstrap(&self) -> Result<()> {
        self.gpkg.ensure_writable()?;
        self.gpkg.resources().with_transaction(|conn| {
            for script in BOOTSTRAP_SCRIPTS {
                conn.execute_batch(script)?;
            }
            register_default_srs(conn)?;
            conn.pragma_update(None, "application_id", GPKG_APPLICATION_ID)?;
            conn.pragma_update(None, "user_version", GPKG_USER_VERSION)?;
            Ok(())
        })?;
        info!(path = %self.gpkg.path().display(), "geopackage catalog initialized");
        Ok(())
    }

    /// Names of every registered dataset, regardless of kind.
    pub fn table_names(&self) -> Result<Vec<String>> {
        self.gpkg.resources().with_connection(|conn| {
            let mut stmt = conn.prepare(SQL_LIST_TABLES)?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(names)
        })
    }

    /// Every registered dataset as a kind-tagged entry, ordered by table name.
    pub fn contents(&self) -> Result<Vec<AnyEntry>> {
        let mut entries = self.gpkg.resources().with_connection(|conn| {
            let mut entries: Vec<AnyEntry> = select_feature_entries(conn, None)?
                .into_iter()
                .map(AnyEntry::Features)
                .collect();
            entries.extend(
                select_raster_entries(conn, None)?
                    .into_iter()
                    .map(AnyEntry::Rasters),
            );
            entries.extend(select_tile_entries(conn, None)?.into_iter().map(AnyEntry::Tiles));
            Ok(entries)
        })?;
        entries.sort_by(|a, b| a.table_name().cmp(b.table_name()));
        Ok(entries)
    }

    pub fn list_entries(&self, data_type: DataType) -> Result<Vec<AnyEntry>> {
        self.gpkg.resources().with_connection(|conn| {
            Ok(match data_type {
                DataType::Features => select_feature_entries(conn, None)?
                    .into_iter()
                    .map(AnyEntry::Features)
                    .collect(),
                DataType::Rasters => select_raster_entries(conn, None)?
                    .into_iter()
                    .map(AnyEntry::Rasters)
                    .collect(),
                DataType::Tiles => select_tile_entries(conn, None)?
                    .into_iter()
                    .map(AnyEntry::Tiles)
                    .collect(),
            })
        })
    }

    /// Look up one dataset of the given kind. A miss is `Ok(None)`.
    pub fn find_entry(&self, table_name: &str, data_type: DataType) -> Result<Option<AnyEntry>> {
        Ok(match data_type {
            DataType::Features => self.feature(table_name)?.map(AnyEntry::Features),
            DataType::Rasters => self.raster(table_name)?.map(AnyEntry::Rasters),
            DataType::Tiles => self.tile(table_name)?.map(AnyEntry::Tiles),
        })
    }

    pub fn features(&self) -> Result<Vec<FeatureEntry>> {
        self.gpkg
            .resources()
            .with_connection(|conn| select_feature_entries(conn, None))
    }

    pub fn feature(&self, table_name: &str) -> Result<Option<FeatureEntry>> {
        self.gpkg.resources().with_connection(|conn| {
            Ok(select_feature_entries(conn, Some(table_name))?
                .into_iter()
                .next())
        })
    }

    pub fn rasters(&self) -> Result<Vec<RasterEntry>> {
        self.gpkg
            .resources()
            .with_connection(|conn| select_raster_entries(conn, None))
    }

    pub fn raster(&self, table_name: &str) -> Result<Option<RasterEntry>> {
        self.gpkg.resources().with_connection(|conn| {
            Ok(select_raster_entries(conn, Some(table_name))?
                .into_iter()
                .next())
        })
    }

    pub fn tiles(&self) -> Result<Vec<TileEntry>> {
        self.gpkg
            .resources()
            .with_connection(|conn| select_tile_entries(conn, None))
    }

    pub fn tile(&self, table_name: &str) -> Result<Option<TileEntry>> {
        self.gpkg.resources().with_connection(|conn| {
            Ok(select_tile_entries(conn, Some(table_name))?
                .into_iter()
                .next())
        })
    }

    /// Whether `table_name` is registered in the catalog or exists physically.
    pub fn has_table(&self, table_name: &str) -> Result<bool> {
        self.gpkg
            .resources()
            .with_connection(|conn| table_is_taken(conn, table_name))
    }
}

fn table_is_taken(conn: &Connection, table_name: &str) -> Result<bool> {
    Ok(conn.query_row(SQL_TABLE_IS_TAKEN, [table_name], |row| row.get(0))?)
}

/// Fail with `TableExists` when `table_name` is already used by any dataset
/// or physical table.
pub(crate) fn ensure_table_available(conn: &Connection, table_name: &str) -> Result<()> {
    if table_is_taken(conn, table_name)? {
        return Err(GpkgError::TableExists(table_name.to_string()));
    }
    Ok(())
}

/// Insert the `gpkg_contents` row of a fully derived entry.
pub(crate) fn insert_contents<C: Content>(conn: &Connection, entry: &Entry<C>) -> Result<()> {
    let last_change = entry.last_change.unwrap_or_else(Utc::now);
    let bounds = entry.bounds.as_ref();
    debug!(table = entry.name(), data_type = C::DATA_TYPE.value(), "inserting contents row");
    conn.execute(
        SQL_INSERT_GPKG_CONTENTS,
        params![
            entry.name(),
            C::DATA_TYPE.value(),
            entry.identifier,
            entry.description,
            format_timestamp(&last_change),
            bounds.map(|b| b.min_x),
            bounds.map(|b| b.min_y),
            bounds.map(|b| b.max_x),
            bounds.map(|b| b.max_y),
            entry.srid,
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_geometry_columns(conn: &Connection, entry: &FeatureEntry) -> Result<()> {
    let content = &entry.content;
    let geometry_type = content
        .geometry_type
        .ok_or_else(|| GpkgError::invalid("geometry type is not derived"))?;
    conn.execute(
        SQL_INSERT_GPKG_GEOMETRY_COLUMNS,
        params![
            entry.name(),
            content.geometry_column,
            geometry_type_to_str(geometry_type),
            entry.srid,
            content.z as i32,
            content.m as i32,
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_raster_columns(conn: &Connection, entry: &RasterEntry) -> Result<()> {
    let content = &entry.content;
    conn.execute(
        SQL_INSERT_GPKG_DATA_COLUMNS,
        params![
            entry.name(),
            content.raster_column,
            content.name,
            content.title,
            entry.description,
            content.mime_type,
            content.constraint_name,
        ],
    )?;
    Ok(())
}

/// Primary key and typed columns of a physical table.
pub(crate) struct TableColumns {
    pub(crate) primary_key: String,
    pub(crate) columns: Vec<ColumnSpec>,
}

/// Resolve the table columns and map SQLite types.
pub(crate) fn table_columns(conn: &Connection, table_name: &str) -> Result<TableColumns> {
    let mut stmt = conn.prepare(&sql_table_columns(table_name))?;
    let mut rows = stmt.query([])?;

    let mut primary_key: Option<String> = None;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get(0)?;
        let declared_type: String = row.get(1)?;
        let is_primary_key = row.get::<_, i32>(2)? != 0;

        if is_primary_key {
            if primary_key.is_some() {
                return Err(GpkgError::invalid(format!(
                    "composite primary keys are not supported: {table_name}"
                )));
            }
            primary_key = Some(name);
            continue;
        }

        // cf. https://www.geopackage.org/spec140/index.html#_sqlite_container
        let column_type = column_type_from_str(&declared_type).ok_or_else(|| {
            GpkgError::UnsupportedColumnType {
                column: name.clone(),
                declared_type: declared_type.clone(),
            }
        })?;
        columns.push(ColumnSpec { name, column_type });
    }

    let primary_key = primary_key
        .ok_or_else(|| GpkgError::invalid(format!("no primary key column: {table_name}")))?;
    Ok(TableColumns {
        primary_key,
        columns,
    })
}

fn read_entry<C: Content>(row: &Row<'_>, content: C) -> Result<Entry<C>> {
    let crs = Crs {
        name: row.get(9)?,
        organization: row.get(10)?,
        organization_coordsys_id: row.get(11)?,
        definition: row.get(12)?,
    };
    let bounds = match (
        row.get::<_, Option<f64>>(4)?,
        row.get::<_, Option<f64>>(5)?,
        row.get::<_, Option<f64>>(6)?,
        row.get::<_, Option<f64>>(7)?,
    ) {
        (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) => {
            Some(Envelope::new(min_x, min_y, max_x, max_y).with_crs(crs))
        }
        _ => None,
    };
    let last_change = row
        .get::<_, Option<String>>(3)?
        .map(|text| parse_timestamp(&text))
        .transpose()?;

    Ok(Entry {
        table_name: Some(row.get(0)?),
        identifier: row.get(1)?,
        description: row.get(2)?,
        last_change,
        srid: row.get(8)?,
        bounds,
        content,
    })
}

pub(crate) fn select_feature_entries(
    conn: &Connection,
    table_name: Option<&str>,
) -> Result<Vec<FeatureEntry>> {
    let sql = sql_select_feature_entries(table_name.is_some());
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = match table_name {
        Some(name) => stmt.query(params![DataType::Features.value(), name])?,
        None => stmt.query([DataType::Features.value()])?,
    };

    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        let base = ENTRY_COLUMN_COUNT;
        let geometry_type: String = row.get(base + 1)?;
        let content = FeatureContent {
            geometry_column: Some(row.get(base)?),
            geometry_type: Some(geometry_type_from_str(&geometry_type)?),
            z: row.get::<_, i32>(base + 2)? != 0,
            m: row.get::<_, i32>(base + 3)? != 0,
        };
        entries.push(read_entry(row, content)?);
    }
    Ok(entries)
}

pub(crate) fn select_raster_entries(
    conn: &Connection,
    table_name: Option<&str>,
) -> Result<Vec<RasterEntry>> {
    let sql = sql_select_raster_entries(table_name.is_some());
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = match table_name {
        Some(name) => stmt.query(params![DataType::Rasters.value(), name])?,
        None => stmt.query([DataType::Rasters.value()])?,
    };

    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        let base = ENTRY_COLUMN_COUNT;
        let content = RasterContent {
            raster_column: Some(row.get(base)?),
            name: row.get(base + 1)?,
            title: row.get(base + 2)?,
            mime_type: row.get(base + 3)?,
            constraint_name: row.get(base + 4)?,
        };
        entries.push(read_entry(row, content)?);
    }
    Ok(entries)
}

pub(crate) fn select_tile_entries(
    conn: &Connection,
    table_name: Option<&str>,
) -> Result<Vec<TileEntry>> {
    let sql = sql_select_tile_entries(table_name.is_some());
    let mut entries = {
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = match table_name {
            Some(name) => stmt.query(params![DataType::Tiles.value(), name])?,
            None => stmt.query([DataType::Tiles.value()])?,
        };
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(read_entry(row, TileContent::default())?);
        }
        entries
    };

    let mut stmt = conn.prepare(SQL_SELECT_TILE_MATRICES)?;
    for entry in &mut entries {
        entry.content.tile_matrices = stmt
            .query_map([entry.name()], |row| {
                Ok(TileMatrix {
                    zoom_level: row.get(0)?,
                    matrix_width: row.get(1)?,
                    matrix_height: row.get(2)?,
                    tile_width: row.get(3)?,
                    tile_height: row.get(4)?,
                    x_pixel_size: row.get(5)?,
                    y_pixel_size: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use crate::entry::{AnyEntry, FeatureEntry, TileEntry, TileMatrix};
    use crate::ogc_sql::CATALOG_TABLES;
    use crate::types::DataType;
    use crate::{Gpkg, Result};

    fn catalog_table_count(gpkg: &Gpkg) -> Result<i64> {
        gpkg.resources().with_connection(|conn| {
            let mut count = 0;
            for table in CATALOG_TABLES {
                count += conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get::<_, i64>(0),
                )?;
            }
            Ok(count)
        })
    }

    #[test]
    fn bootstrap_twice_yields_one_set_of_tables() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        gpkg.catalog().bootstrap()?;
        gpkg.init()?;

        assert_eq!(catalog_table_count(&gpkg)?, CATALOG_TABLES.len() as i64);
        let (srs_rows, app_id, version): (i64, i32, i32) =
            gpkg.resources().with_connection(|conn| {
                let srs_rows =
                    conn.query_row("SELECT COUNT(*) FROM gpkg_spatial_ref_sys", [], |r| r.get(0))?;
                let app_id = conn.query_row("PRAGMA application_id", [], |r| r.get(0))?;
                let version = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
                Ok((srs_rows, app_id, version))
            })?;
        assert_eq!(srs_rows, 3);
        assert_eq!(app_id, 0x4750_4B47);
        assert_eq!(version, 10200);
        Ok(())
    }

    #[test]
    fn lookups_on_empty_catalog_return_nothing() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let catalog = gpkg.catalog();
        assert!(catalog.table_names()?.is_empty());
        for kind in [DataType::Features, DataType::Rasters, DataType::Tiles] {
            assert!(catalog.list_entries(kind)?.is_empty());
            assert!(catalog.find_entry("missing", kind)?.is_none());
        }
        Ok(())
    }

    #[test]
    fn find_entry_is_scoped_by_kind() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let mut entry = FeatureEntry::new("roads")
            .with_srid(4326)
            .with_bounds(crate::types::Envelope::new(0.0, 0.0, 1.0, 1.0));
        let schema = crate::FeatureSchema::builder("roads")
            .geometry("geom", crate::GeometryType::LineString)
            .build()?;
        gpkg.features().create(&mut entry, &schema)?;

        let catalog = gpkg.catalog();
        assert!(catalog.find_entry("roads", DataType::Tiles)?.is_none());
        match catalog.find_entry("roads", DataType::Features)? {
            Some(AnyEntry::Features(found)) => {
                assert_eq!(found.content.geometry_column.as_deref(), Some("geom"));
                assert_eq!(found.srid, Some(4326));
                let bounds = found.bounds.expect("bounds");
                assert_eq!(bounds.crs.map(|crs| crs.organization_coordsys_id), Some(4326));
                assert!(found.last_change.is_some());
            }
            other => panic!("unexpected entry: {other:?}"),
        }
        assert!(catalog.has_table("ROADS")?);
        Ok(())
    }

    #[test]
    fn contents_lists_every_kind() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let schema = crate::FeatureSchema::builder("roads")
            .geometry("geom", crate::GeometryType::LineString)
            .build()?;
        let mut roads = FeatureEntry::default()
            .with_srid(4326)
            .with_bounds(crate::types::Envelope::new(0.0, 0.0, 1.0, 1.0));
        gpkg.features().create(&mut roads, &schema)?;

        let mut aerial = TileEntry::new("aerial")
            .with_srid(4326)
            .with_bounds(crate::types::Envelope::new(0.0, 0.0, 1.0, 1.0));
        aerial
            .content
            .tile_matrices
            .push(TileMatrix::new(0, 1, 1, 256, 256, 1.0, 1.0));
        gpkg.tiles().create(&mut aerial)?;

        let contents = gpkg.catalog().contents()?;
        let listed: Vec<(&str, DataType)> = contents
            .iter()
            .map(|entry| (entry.table_name(), entry.data_type()))
            .collect();
        assert_eq!(
            listed,
            vec![("aerial", DataType::Tiles), ("roads", DataType::Features)]
        );
        assert_eq!(gpkg.catalog().table_names()?.len(), contents.len());
        Ok(())
    }

    #[test]
    fn read_only_container_rejects_bootstrap() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("ro.gpkg");
        let config = crate::GpkgConfig {
            journal_mode: crate::JournalMode::Delete,
            ..crate::GpkgConfig::default()
        };
        Gpkg::create_with_config(&path, config)?;

        let gpkg = Gpkg::open_read_only(&path)?;
        let err = gpkg.catalog().bootstrap().expect_err("read-only");
        assert!(matches!(err, crate::GpkgError::ReadOnly));
        assert!(gpkg.catalog().table_names()?.is_empty());
        Ok(())
    }
}
