use super::format::{RasterFormat, RasterSource};
use crate::Gpkg;
use crate::catalog::{
    ensure_table_available, insert_contents, insert_raster_columns, select_raster_entries,
};
use crate::entry::RasterEntry;
use crate::error::{GpkgError, Result};
use crate::ogc_sql::{
    sql_create_raster_table, sql_insert_raster, sql_select_raster, validate_identifier,
    validate_table_name,
};
use chrono::Utc;
use rusqlite::OptionalExtension;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use tracing::{debug, info};

const DEFAULT_RASTER_COLUMN: &str = "raster";

/// Stores single-blob raster datasets through a pluggable [`RasterFormat`].
pub struct RasterContentManager<'a> {
    pub(crate) gpkg: &'a Gpkg,
}

impl<'a> RasterContentManager<'a> {
    /// Encode `raster` with `format` and store it as a new dataset.
    ///
    /// The table name falls back to the raster's name, the SRID to the
    /// raster's CRS and the bounds to its envelope. `entry` receives the
    /// derived values on success.
    pub fn add<F: RasterFormat>(
        &self,
        entry: &mut RasterEntry,
        raster: &F::Raster,
        format: &F,
    ) -> Result<()> {
        self.gpkg.ensure_writable()?;
        let derived = self.derive(entry, raster, format)?;
        let table_name = derived.name().to_string();
        let raster_column = derived
            .content
            .raster_column
            .clone()
            .unwrap_or_else(|| DEFAULT_RASTER_COLUMN.to_string());
        let srid = derived
            .srid
            .ok_or_else(|| GpkgError::invalid("Entry must have srid"))?;

        let bytes = self.encode(raster, format)?;
        debug!(table = %table_name, len = bytes.len(), "encoded raster");

        self.gpkg.crs().register(srid)?;
        self.gpkg.resources().with_transaction(|conn| {
            ensure_table_available(conn, &table_name)?;
            let create_sql = sql_create_raster_table(&table_name, &raster_column);
            debug!(sql = %create_sql, "creating raster table");
            conn.execute_batch(&create_sql)?;
            conn.execute(&sql_insert_raster(&table_name, &raster_column), [&bytes])?;
            insert_contents(conn, &derived)?;
            insert_raster_columns(conn, &derived)?;
            Ok(())
        })?;

        info!(table = %table_name, srid, "created raster dataset");
        *entry = derived;
        Ok(())
    }

    /// Decode the stored raster of `entry`. `Ok(None)` when the table holds
    /// no row.
    pub fn reader<F: RasterFormat>(
        &self,
        entry: &RasterEntry,
        format: &F,
    ) -> Result<Option<F::Raster>> {
        let table_name = entry
            .table_name
            .as_deref()
            .ok_or_else(|| GpkgError::invalid("Entry must have a table name"))?;
        validate_identifier(table_name)?;

        let blob = self.gpkg.resources().with_connection(|conn| {
            let raster_column = match &entry.content.raster_column {
                Some(column) => column.clone(),
                None => select_raster_entries(conn, Some(table_name))?
                    .into_iter()
                    .next()
                    .and_then(|stored| stored.content.raster_column)
                    .unwrap_or_else(|| DEFAULT_RASTER_COLUMN.to_string()),
            };
            let sql = sql_select_raster(table_name, &raster_column);
            debug!(sql = %sql, "reading raster");
            Ok(conn
                .query_row(&sql, [], |row| row.get::<_, Vec<u8>>(0))
                .optional()?)
        })?;

        blob.map(|bytes| format.read(bytes)).transpose()
    }

    /// Encode through a temporary file that is removed when it goes out of
    /// scope, on success and on every error path.
    fn encode<F: RasterFormat>(&self, raster: &F::Raster, format: &F) -> Result<Vec<u8>> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("geopkg-raster").suffix(".tmp");
        let mut file = match &self.gpkg.config().temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        debug!(path = %file.path().display(), "encoding raster to temporary file");

        {
            let mut out = BufWriter::new(file.as_file_mut());
            format.write(raster, &mut out)?;
            out.flush()?;
        }

        let mut bytes = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Validate `entry` and fill in every derivable field. Performs no writes.
    fn derive<F: RasterFormat>(
        &self,
        entry: &RasterEntry,
        raster: &F::Raster,
        format: &F,
    ) -> Result<RasterEntry> {
        let mut derived = entry.clone();

        let table_name = match (&entry.table_name, raster.name()) {
            (Some(name), _) => name.clone(),
            (None, Some(name)) => name.to_string(),
            (None, None) => {
                return Err(GpkgError::invalid(
                    "Entry must have a table name or the raster must be named",
                ));
            }
        };
        validate_table_name(&table_name)?;

        let raster_column = entry
            .content
            .raster_column
            .clone()
            .unwrap_or_else(|| DEFAULT_RASTER_COLUMN.to_string());
        validate_identifier(&raster_column)?;

        let srid = match entry.srid {
            Some(srid) => srid,
            None => raster
                .crs()
                .and_then(|crs| self.gpkg.crs().resolve_srid(crs))
                .ok_or_else(|| GpkgError::invalid("Entry must have srid"))?,
        };

        let bounds = entry
            .bounds
            .clone()
            .or_else(|| raster.envelope())
            .ok_or_else(|| GpkgError::invalid("Entry must have bounds"))?;
        if !bounds.is_valid() {
            return Err(GpkgError::invalid(format!(
                "bounds min must not exceed max: {bounds:?}"
            )));
        }

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
        derived.content.raster_column = Some(raster_column);
        if derived.content.mime_type.is_none() {
            derived.content.mime_type = format.mime_type().map(str::to_string);
        }
        derived.srid = Some(srid);
        derived.bounds = Some(bounds);
        derived.last_change = Some(Utc::now());
        Ok(derived)
    }
}

#[cfg(test)]
mod tests {
    use crate::crs::Crs;
    use crate::entry::RasterEntry;
    use crate::error::{ErrorKind, GpkgError};
    use crate::raster::{GridCoverage, RasterFormat, RawGridFormat};
    use crate::types::Envelope;
    use crate::{Gpkg, GpkgConfig, Result};
    use std::io::Write;

    fn coverage() -> GridCoverage {
        GridCoverage::new(Envelope::new(10.0, 20.0, 30.0, 40.0), 4, 2, 3, (0..24).collect())
            .with_name("elevation")
            .with_crs(Crs::epsg(3857).expect("built in"))
    }

    fn temp_dir_is_empty(dir: &std::path::Path) -> Result<bool> {
        Ok(std::fs::read_dir(dir)?.next().is_none())
    }

    #[test]
    fn stores_and_decodes_a_raster() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = GpkgConfig {
            temp_dir: Some(dir.path().to_path_buf()),
            ..GpkgConfig::default()
        };
        let gpkg = Gpkg::temporary_with_config(config)?;

        let mut entry = RasterEntry::default();
        gpkg.rasters().add(&mut entry, &coverage(), &RawGridFormat)?;
        assert!(temp_dir_is_empty(dir.path())?);

        assert_eq!(entry.table_name.as_deref(), Some("elevation"));
        assert_eq!(entry.identifier.as_deref(), Some("elevation"));
        assert_eq!(entry.description.as_deref(), Some("elevation"));
        assert_eq!(entry.srid, Some(3857));
        assert_eq!(entry.content.raster_column.as_deref(), Some("raster"));
        assert_eq!(
            entry.content.mime_type.as_deref(),
            Some("application/octet-stream")
        );
        assert!(gpkg.crs().contains(3857)?);

        let stored = gpkg.catalog().raster("elevation")?.expect("cataloged");
        assert_eq!(stored.srid, Some(3857));
        let bounds = stored.bounds.as_ref().expect("bounds");
        assert_eq!((bounds.min_x, bounds.max_y), (10.0, 40.0));

        let decoded = gpkg
            .rasters()
            .reader(&RasterEntry::new("elevation"), &RawGridFormat)?
            .expect("one row");
        assert_eq!(decoded.pixels, coverage().pixels);
        assert_eq!((decoded.width, decoded.height, decoded.bands), (4, 2, 3));
        Ok(())
    }

    #[test]
    fn derivation_failures_write_nothing() -> Result<()> {
        let gpkg = Gpkg::temporary()?;

        let unnamed = GridCoverage::new(Envelope::new(0.0, 0.0, 1.0, 1.0), 1, 1, 1, vec![7]);
        let err = gpkg
            .rasters()
            .add(&mut RasterEntry::default(), &unnamed, &RawGridFormat)
            .expect_err("no table name");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let no_crs = unnamed.clone().with_name("nocrs");
        let err = gpkg
            .rasters()
            .add(&mut RasterEntry::default(), &no_crs, &RawGridFormat)
            .expect_err("no srid");
        assert!(err.to_string().contains("srid"));

        assert!(gpkg.catalog().rasters()?.is_empty());
        assert!(!gpkg.catalog().has_table("nocrs")?);
        Ok(())
    }

    struct FailingFormat;

    impl RasterFormat for FailingFormat {
        type Raster = GridCoverage;

        fn write(&self, _: &GridCoverage, out: &mut dyn Write) -> Result<()> {
            out.write_all(b"partial")?;
            Err(GpkgError::Codec("encoder gave up".to_string()))
        }

        fn read(&self, _: Vec<u8>) -> Result<GridCoverage> {
            Err(GpkgError::Codec("unreadable".to_string()))
        }
    }

    #[test]
    fn codec_failure_removes_temporary_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = GpkgConfig {
            temp_dir: Some(dir.path().to_path_buf()),
            ..GpkgConfig::default()
        };
        let gpkg = Gpkg::temporary_with_config(config)?;

        let err = gpkg
            .rasters()
            .add(&mut RasterEntry::default(), &coverage(), &FailingFormat)
            .expect_err("codec fails");
        assert_eq!(err.kind(), ErrorKind::Codec);
        assert!(temp_dir_is_empty(dir.path())?);
        assert!(!gpkg.catalog().has_table("elevation")?);
        Ok(())
    }

    #[test]
    fn empty_table_reads_as_none() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let mut entry = RasterEntry::default();
        gpkg.rasters().add(&mut entry, &coverage(), &RawGridFormat)?;
        gpkg.resources()
            .with_connection(|conn| Ok(conn.execute("DELETE FROM elevation", [])?))?;

        assert!(gpkg.rasters().reader(&entry, &RawGridFormat)?.is_none());
        Ok(())
    }

    #[test]
    fn duplicate_table_is_rejected() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        gpkg.rasters()
            .add(&mut RasterEntry::default(), &coverage(), &RawGridFormat)?;
        let err = gpkg
            .rasters()
            .add(&mut RasterEntry::default(), &coverage(), &RawGridFormat)
            .expect_err("table taken");
        assert!(matches!(err, GpkgError::TableExists(_)));
        assert_eq!(gpkg.catalog().rasters()?.len(), 1);
        Ok(())
    }
}
