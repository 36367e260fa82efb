use super::reader::{TileRange, TileReader};
use crate::Gpkg;
use crate::catalog::{ensure_table_available, insert_contents};
use crate::entry::{Tile, TileEntry};
use crate::error::{GpkgError, Result};
use crate::ogc_sql::{
    SQL_INSERT_TILE_MATRIX, SQL_INSERT_TILE_MATRIX_SET, sql_create_tile_table, sql_insert_tile,
    sql_tile_bound, validate_identifier, validate_table_name,
};
use chrono::Utc;
use rusqlite::params;
use std::collections::HashSet;
use tracing::{debug, info};

const DEFAULT_TILE_TABLE: &str = "tiles";

/// Creates tile pyramids and reads and writes their tiles.
pub struct TilePyramidManager<'a> {
    pub(crate) gpkg: &'a Gpkg,
}

impl<'a> TilePyramidManager<'a> {
    /// Create a tile pyramid for `entry`.
    ///
    /// Bounds are required; the SRID falls back to the CRS of the bounds and
    /// the table name to `tiles`. Matrices are written in the order given.
    ///
    /// The write steps (matrix set row, matrix rows, tile table, contents
    /// row) each commit on their own. A failure partway leaves the earlier
    /// steps in place and `entry` untouched.
    pub fn create(&self, entry: &mut TileEntry) -> Result<()> {
        self.gpkg.ensure_writable()?;
        let derived = self.derive(entry)?;
        let table_name = derived.name().to_string();
        let (srid, bounds) = match (derived.srid, &derived.bounds) {
            (Some(srid), Some(bounds)) => (srid, bounds.clone()),
            _ => return Err(GpkgError::invalid("Entry must have bounds and srid")),
        };

        let resources = self.gpkg.resources();
        resources.with_connection(|conn| ensure_table_available(conn, &table_name))?;

        resources.with_connection(|conn| {
            conn.execute(
                SQL_INSERT_TILE_MATRIX_SET,
                params![
                    table_name,
                    srid,
                    bounds.min_x,
                    bounds.min_y,
                    bounds.max_x,
                    bounds.max_y
                ],
            )?;
            Ok(())
        })?;

        resources.with_connection(|conn| {
            let mut stmt = conn.prepare(SQL_INSERT_TILE_MATRIX)?;
            for matrix in &derived.content.tile_matrices {
                debug!(table = %table_name, zoom = matrix.zoom_level, "inserting tile matrix");
                stmt.execute(params![
                    table_name,
                    matrix.zoom_level,
                    matrix.matrix_width,
                    matrix.matrix_height,
                    matrix.tile_width,
                    matrix.tile_height,
                    matrix.x_pixel_size,
                    matrix.y_pixel_size
                ])?;
            }
            Ok(())
        })?;

        let create_sql = sql_create_tile_table(&table_name);
        resources.with_connection(|conn| {
            debug!(sql = %create_sql, "creating tile table");
            conn.execute_batch(&create_sql)?;
            Ok(())
        })?;

        self.gpkg.crs().register(srid)?;
        resources.with_connection(|conn| insert_contents(conn, &derived))?;

        info!(
            table = %table_name,
            srid,
            zoom_levels = derived.content.tile_matrices.len(),
            "created tile pyramid"
        );
        *entry = derived;
        Ok(())
    }

    /// Insert one tile. Duplicate (zoom, column, row) keys are not rejected.
    pub fn add(&self, entry: &TileEntry, tile: &Tile) -> Result<()> {
        self.gpkg.ensure_writable()?;
        let table_name = table_name(entry)?;
        self.gpkg.resources().with_connection(|conn| {
            conn.execute(
                &sql_insert_tile(table_name),
                params![tile.zoom, tile.column, tile.row, tile.data],
            )?;
            Ok(())
        })
    }

    /// Open a cursor over the tiles inside `range`.
    ///
    /// The reader holds a pooled connection until it is closed.
    pub fn reader(&self, entry: &TileEntry, range: TileRange) -> Result<TileReader> {
        let table_name = table_name(entry)?;
        let conn = self.gpkg.resources().connection()?;
        Ok(TileReader::new(
            conn,
            table_name,
            range,
            self.gpkg.config().batch_size,
        ))
    }

    /// Smallest or largest tile row (`is_row`) or column at `zoom`.
    /// `None` when the zoom level holds no tiles.
    pub fn tile_bound(
        &self,
        entry: &TileEntry,
        zoom: i32,
        is_max: bool,
        is_row: bool,
    ) -> Result<Option<i64>> {
        let table_name = table_name(entry)?;
        let sql = sql_tile_bound(table_name, is_max, is_row);
        self.gpkg.resources().with_connection(|conn| {
            debug!(sql = %sql, zoom, "querying tile bound");
            Ok(conn.query_row(&sql, [zoom], |row| row.get::<_, Option<i64>>(0))?)
        })
    }

    /// Validate `entry` and fill in every derivable field. Performs no writes.
    fn derive(&self, entry: &TileEntry) -> Result<TileEntry> {
        let mut derived = entry.clone();

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
            None => bounds
                .crs
                .as_ref()
                .and_then(|crs| self.gpkg.crs().resolve_srid(crs))
                .ok_or_else(|| GpkgError::invalid("Entry must have srid"))?,
        };
        if !self.gpkg.crs().contains(srid)? {
            // Surface unknown SRIDs before the first write.
            self.gpkg.authority().decode(srid)?;
        }

        let mut zooms = HashSet::new();
        for matrix in &entry.content.tile_matrices {
            if matrix.zoom_level < 0 {
                return Err(GpkgError::invalid(format!(
                    "zoom level must not be negative: {}",
                    matrix.zoom_level
                )));
            }
            if !zooms.insert(matrix.zoom_level) {
                return Err(GpkgError::invalid(format!(
                    "duplicate tile matrix for zoom level {}",
                    matrix.zoom_level
                )));
            }
        }

        let table_name = entry
            .table_name
            .clone()
            .unwrap_or_else(|| DEFAULT_TILE_TABLE.to_string());
        validate_table_name(&table_name)?;

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
        derived.srid = Some(srid);
        derived.bounds = Some(bounds);
        derived.last_change = Some(Utc::now());
        Ok(derived)
    }
}

fn table_name(entry: &TileEntry) -> Result<&str> {
    let name = entry
        .table_name
        .as_deref()
        .ok_or_else(|| GpkgError::invalid("Entry must have a table name"))?;
    validate_identifier(name)?;
    Ok(name)
}
