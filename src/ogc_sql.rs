// cf. https://www.geopackage.org/spec140/index.html#table_definition_sql
//
// Every statement here is written with IF NOT EXISTS / OR IGNORE so that the
// bootstrap scripts can run against an already initialized file.

use crate::error::{GpkgError, Result};

pub(crate) const GEOPACKAGE_CONTENTS: &str = "gpkg_contents";
pub(crate) const GEOMETRY_COLUMNS: &str = "gpkg_geometry_columns";
pub(crate) const SPATIAL_REF_SYS: &str = "gpkg_spatial_ref_sys";
pub(crate) const RASTER_COLUMNS: &str = "gpkg_data_columns";
pub(crate) const TILE_MATRIX_SET: &str = "gpkg_tile_matrix_set";
pub(crate) const TILE_MATRIX: &str = "gpkg_tile_matrix";
pub(crate) const METADATA: &str = "gpkg_metadata";
pub(crate) const METADATA_REFERENCE: &str = "gpkg_metadata_reference";
pub(crate) const DATA_COLUMN_CONSTRAINTS: &str = "gpkg_data_column_constraints";
pub(crate) const EXTENSIONS: &str = "gpkg_extensions";

/// All catalog tables, in bootstrap order.
pub(crate) const CATALOG_TABLES: [&str; 10] = [
    SPATIAL_REF_SYS,
    GEOPACKAGE_CONTENTS,
    GEOMETRY_COLUMNS,
    TILE_MATRIX_SET,
    TILE_MATRIX,
    RASTER_COLUMNS,
    METADATA,
    METADATA_REFERENCE,
    DATA_COLUMN_CONSTRAINTS,
    EXTENSIONS,
];

/// `PRAGMA application_id` value: ASCII "GPKG".
pub(crate) const GPKG_APPLICATION_ID: i32 = 0x4750_4B47;
/// `PRAGMA user_version` value for GeoPackage 1.2.
pub(crate) const GPKG_USER_VERSION: i32 = 10200;

// gpkg_spatial_ref_sys: the SRS catalog referenced by gpkg_contents and
// gpkg_geometry_columns to describe spatial reference systems.
pub(crate) const SQL_GPKG_SPATIAL_REF_SYS: &str = "
CREATE TABLE IF NOT EXISTS gpkg_spatial_ref_sys (
  srs_name TEXT NOT NULL,
  srs_id INTEGER NOT NULL PRIMARY KEY,
  organization TEXT NOT NULL,
  organization_coordsys_id INTEGER NOT NULL,
  definition TEXT NOT NULL,
  description TEXT
);
";

// gpkg_contents: lists all geospatial contents in the package with identifying
// and descriptive metadata for user display and access.
pub(crate) const SQL_GPKG_CONTENTS: &str = "
CREATE TABLE IF NOT EXISTS gpkg_contents (
  table_name TEXT NOT NULL PRIMARY KEY,
  data_type TEXT NOT NULL,
  identifier TEXT UNIQUE,
  description TEXT DEFAULT '',
  last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
  min_x DOUBLE,
  min_y DOUBLE,
  max_x DOUBLE,
  max_y DOUBLE,
  srs_id INTEGER,
  CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
";

// gpkg_geometry_columns: identifies geometry columns and geometry types for
// vector feature user data tables.
pub(crate) const SQL_GPKG_GEOMETRY_COLUMNS: &str = "
CREATE TABLE IF NOT EXISTS gpkg_geometry_columns (
  table_name TEXT NOT NULL,
  column_name TEXT NOT NULL,
  geometry_type_name TEXT NOT NULL,
  srs_id INTEGER NOT NULL,
  z TINYINT NOT NULL,
  m TINYINT NOT NULL,
  CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
  CONSTRAINT uk_gc_table_name UNIQUE (table_name),
  CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
  CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
);
";

// gpkg_tile_matrix_set: defines SRS and overall bounds for all tiles in a tile
// pyramid user data table.
pub(crate) const SQL_GPKG_TILE_MATRIX_SET: &str = "
CREATE TABLE IF NOT EXISTS gpkg_tile_matrix_set (
  table_name TEXT NOT NULL PRIMARY KEY,
  srs_id INTEGER NOT NULL,
  min_x DOUBLE NOT NULL,
  min_y DOUBLE NOT NULL,
  max_x DOUBLE NOT NULL,
  max_y DOUBLE NOT NULL,
  CONSTRAINT fk_gtms_table_name FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
  CONSTRAINT fk_gtms_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
);
";

// gpkg_tile_matrix: documents tile pyramid structure per zoom level (tile size,
// matrix size, and pixel sizes) to support non-square tiles and varied intervals.
pub(crate) const SQL_GPKG_TILE_MATRIX: &str = "
CREATE TABLE IF NOT EXISTS gpkg_tile_matrix (
  table_name TEXT NOT NULL,
  zoom_level INTEGER NOT NULL,
  matrix_width INTEGER NOT NULL,
  matrix_height INTEGER NOT NULL,
  tile_width INTEGER NOT NULL,
  tile_height INTEGER NOT NULL,
  pixel_x_size DOUBLE NOT NULL,
  pixel_y_size DOUBLE NOT NULL,
  CONSTRAINT pk_ttm PRIMARY KEY (table_name, zoom_level),
  CONSTRAINT fk_tmm_table_name FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name)
);
CREATE TRIGGER IF NOT EXISTS gpkg_tile_matrix_zoom_level_insert BEFORE INSERT ON gpkg_tile_matrix FOR EACH ROW BEGIN SELECT RAISE(ABORT, 'insert on table ''gpkg_tile_matrix'' violates constraint: zoom_level cannot be less than 0') WHERE (NEW.zoom_level < 0); END;
CREATE TRIGGER IF NOT EXISTS gpkg_tile_matrix_matrix_width_insert BEFORE INSERT ON gpkg_tile_matrix FOR EACH ROW BEGIN SELECT RAISE(ABORT, 'insert on table ''gpkg_tile_matrix'' violates constraint: matrix_width cannot be less than 1') WHERE (NEW.matrix_width < 1); END;
CREATE TRIGGER IF NOT EXISTS gpkg_tile_matrix_matrix_height_insert BEFORE INSERT ON gpkg_tile_matrix FOR EACH ROW BEGIN SELECT RAISE(ABORT, 'insert on table ''gpkg_tile_matrix'' violates constraint: matrix_height cannot be less than 1') WHERE (NEW.matrix_height < 1); END;
CREATE TRIGGER IF NOT EXISTS gpkg_tile_matrix_pixel_x_size_insert BEFORE INSERT ON gpkg_tile_matrix FOR EACH ROW BEGIN SELECT RAISE(ABORT, 'insert on table ''gpkg_tile_matrix'' violates constraint: pixel_x_size must be greater than 0') WHERE NOT (NEW.pixel_x_size > 0); END;
CREATE TRIGGER IF NOT EXISTS gpkg_tile_matrix_pixel_y_size_insert BEFORE INSERT ON gpkg_tile_matrix FOR EACH ROW BEGIN SELECT RAISE(ABORT, 'insert on table ''gpkg_tile_matrix'' violates constraint: pixel_y_size must be greater than 0') WHERE NOT (NEW.pixel_y_size > 0); END;
";

// gpkg_data_columns: descriptive information about columns in user data
// tables. Raster datasets record their blob column here.
pub(crate) const SQL_GPKG_DATA_COLUMNS: &str = "
CREATE TABLE IF NOT EXISTS gpkg_data_columns (
  table_name TEXT NOT NULL,
  column_name TEXT NOT NULL,
  name TEXT,
  title TEXT,
  description TEXT,
  mime_type TEXT,
  constraint_name TEXT,
  CONSTRAINT pk_gdc PRIMARY KEY (table_name, column_name),
  CONSTRAINT fk_gdc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name)
);
";

pub(crate) const SQL_GPKG_METADATA: &str = "
CREATE TABLE IF NOT EXISTS gpkg_metadata (
  id INTEGER CONSTRAINT m_pk PRIMARY KEY ASC NOT NULL,
  md_scope TEXT NOT NULL DEFAULT 'dataset',
  md_standard_uri TEXT NOT NULL,
  mime_type TEXT NOT NULL DEFAULT 'text/xml',
  metadata TEXT NOT NULL DEFAULT ''
);
";

pub(crate) const SQL_GPKG_METADATA_REFERENCE: &str = "
CREATE TABLE IF NOT EXISTS gpkg_metadata_reference (
  reference_scope TEXT NOT NULL,
  table_name TEXT,
  column_name TEXT,
  row_id_value INTEGER,
  timestamp DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
  md_file_id INTEGER NOT NULL,
  md_parent_id INTEGER,
  CONSTRAINT crmr_mfi_fk FOREIGN KEY (md_file_id) REFERENCES gpkg_metadata(id),
  CONSTRAINT crmr_mpi_fk FOREIGN KEY (md_parent_id) REFERENCES gpkg_metadata(id)
);
";

pub(crate) const SQL_GPKG_DATA_COLUMN_CONSTRAINTS: &str = "
CREATE TABLE IF NOT EXISTS gpkg_data_column_constraints (
  constraint_name TEXT NOT NULL,
  constraint_type TEXT NOT NULL,
  value TEXT,
  min NUMERIC,
  min_is_inclusive BOOLEAN,
  max NUMERIC,
  max_is_inclusive BOOLEAN,
  description TEXT,
  CONSTRAINT gdcc_ntv UNIQUE (constraint_name, constraint_type, value)
);
";

// gpkg_extensions: declares which extensions apply to the GeoPackage, a table,
// or a column so clients can detect requirements without scanning user tables.
pub(crate) const SQL_GPKG_EXTENSIONS: &str = "
CREATE TABLE IF NOT EXISTS gpkg_extensions (
  table_name TEXT,
  column_name TEXT,
  extension_name TEXT NOT NULL,
  definition TEXT NOT NULL,
  scope TEXT NOT NULL,
  CONSTRAINT ge_tce UNIQUE (table_name, column_name, extension_name)
);
";

/// Bootstrap scripts, in creation order.
pub(crate) const BOOTSTRAP_SCRIPTS: [&str; 10] = [
    SQL_GPKG_SPATIAL_REF_SYS,
    SQL_GPKG_CONTENTS,
    SQL_GPKG_GEOMETRY_COLUMNS,
    SQL_GPKG_TILE_MATRIX_SET,
    SQL_GPKG_TILE_MATRIX,
    SQL_GPKG_DATA_COLUMNS,
    SQL_GPKG_METADATA,
    SQL_GPKG_METADATA_REFERENCE,
    SQL_GPKG_DATA_COLUMN_CONSTRAINTS,
    SQL_GPKG_EXTENSIONS,
];

pub(crate) const SQL_SELECT_SRS_ID: &str = "SELECT srs_id FROM gpkg_spatial_ref_sys WHERE srs_id = ?1";

pub(crate) const SQL_SELECT_SRS: &str = "
SELECT srs_name, organization, organization_coordsys_id, definition
FROM gpkg_spatial_ref_sys
WHERE srs_id = ?1
";

pub(crate) const SQL_INSERT_SRS: &str = "
INSERT INTO gpkg_spatial_ref_sys
  (srs_id, srs_name, organization, organization_coordsys_id, definition, description)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6)
";

pub(crate) const SQL_INSERT_DEFAULT_SRS: &str = "
INSERT OR IGNORE INTO gpkg_spatial_ref_sys
  (srs_id, srs_name, organization, organization_coordsys_id, definition, description)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6)
";

pub(crate) const SQL_LIST_TABLES: &str = "SELECT table_name FROM gpkg_contents ORDER BY table_name";

pub(crate) const SQL_TABLE_IS_TAKEN: &str = "
SELECT EXISTS(SELECT 1 FROM gpkg_contents WHERE table_name = ?1 COLLATE NOCASE)
    OR EXISTS(SELECT 1 FROM sqlite_master WHERE name = ?1 COLLATE NOCASE)
";

pub(crate) const SQL_INSERT_GPKG_CONTENTS: &str = "
INSERT INTO gpkg_contents
  (table_name, data_type, identifier, description, last_change, min_x, min_y, max_x, max_y, srs_id)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
";

pub(crate) const SQL_INSERT_GPKG_GEOMETRY_COLUMNS: &str = "
INSERT INTO gpkg_geometry_columns
  (table_name, column_name, geometry_type_name, srs_id, z, m)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6)
";

pub(crate) const SQL_INSERT_GPKG_DATA_COLUMNS: &str = "
INSERT INTO gpkg_data_columns
  (table_name, column_name, name, title, description, mime_type, constraint_name)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6, ?7)
";

pub(crate) const SQL_INSERT_TILE_MATRIX_SET: &str = "
INSERT INTO gpkg_tile_matrix_set
  (table_name, srs_id, min_x, min_y, max_x, max_y)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6)
";

pub(crate) const SQL_INSERT_TILE_MATRIX: &str = "
INSERT INTO gpkg_tile_matrix
  (table_name, zoom_level, matrix_width, matrix_height, tile_width, tile_height, pixel_x_size, pixel_y_size)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
";

pub(crate) const SQL_SELECT_TILE_MATRICES: &str = "
SELECT zoom_level, matrix_width, matrix_height, tile_width, tile_height, pixel_x_size, pixel_y_size
FROM gpkg_tile_matrix
WHERE table_name = ?1
ORDER BY zoom_level ASC
";

// Columns shared by every catalog listing. Row mapping relies on this order.
const ENTRY_COLUMNS: &str = "a.table_name, a.identifier, a.description, a.last_change, \
a.min_x, a.min_y, a.max_x, a.max_y, a.srs_id, \
c.srs_name, c.organization, c.organization_coordsys_id, c.definition";

/// Number of leading columns produced by [`ENTRY_COLUMNS`].
pub(crate) const ENTRY_COLUMN_COUNT: usize = 13;

pub(crate) fn sql_select_feature_entries(by_name: bool) -> String {
    format!(
        "SELECT {ENTRY_COLUMNS}, b.column_name, b.geometry_type_name, b.z, b.m \
FROM {GEOPACKAGE_CONTENTS} a \
JOIN {GEOMETRY_COLUMNS} b ON a.table_name = b.table_name \
JOIN {SPATIAL_REF_SYS} c ON a.srs_id = c.srs_id \
WHERE a.data_type = ?1{} ORDER BY a.table_name",
        name_clause(by_name)
    )
}

pub(crate) fn sql_select_raster_entries(by_name: bool) -> String {
    format!(
        "SELECT {ENTRY_COLUMNS}, b.column_name, b.name, b.title, b.mime_type, b.constraint_name \
FROM {GEOPACKAGE_CONTENTS} a \
JOIN {RASTER_COLUMNS} b ON a.table_name = b.table_name \
JOIN {SPATIAL_REF_SYS} c ON a.srs_id = c.srs_id \
WHERE a.data_type = ?1{} ORDER BY a.table_name",
        name_clause(by_name)
    )
}

pub(crate) fn sql_select_tile_entries(by_name: bool) -> String {
    format!(
        "SELECT {ENTRY_COLUMNS} \
FROM {GEOPACKAGE_CONTENTS} a \
JOIN {TILE_MATRIX_SET} b ON a.table_name = b.table_name \
JOIN {SPATIAL_REF_SYS} c ON a.srs_id = c.srs_id \
WHERE a.data_type = ?1{} ORDER BY a.table_name",
        name_clause(by_name)
    )
}

fn name_clause(by_name: bool) -> &'static str {
    if by_name { " AND a.table_name = ?2" } else { "" }
}

/// Reject names that cannot safely be used as a quoted SQL identifier.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains('\0') {
        return Err(GpkgError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Like [`validate_identifier`], and additionally keeps user tables out of the
/// namespaces SQLite and GeoPackage reserve for themselves.
pub(crate) fn validate_table_name(name: &str) -> Result<()> {
    validate_identifier(name)?;
    let lower = name.to_ascii_lowercase();
    if ["gpkg_", "sqlite_", "rtree_"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
    {
        return Err(GpkgError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Quote an identifier, doubling any embedded quote.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!(r#""{}""#, name.replace('"', r#""""#))
}

pub(crate) fn sql_create_table(table_name: &str, column_defs: &str) -> String {
    format!(
        "CREATE TABLE {} ({})",
        quote_identifier(table_name),
        column_defs
    )
}

pub(crate) fn sql_create_raster_table(table_name: &str, raster_column: &str) -> String {
    sql_create_table(
        table_name,
        &format!(
            "id INTEGER PRIMARY KEY AUTOINCREMENT, {} BLOB NOT NULL",
            quote_identifier(raster_column)
        ),
    )
}

pub(crate) fn sql_insert_raster(table_name: &str, raster_column: &str) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES (?1)",
        quote_identifier(table_name),
        quote_identifier(raster_column)
    )
}

pub(crate) fn sql_select_raster(table_name: &str, raster_column: &str) -> String {
    format!(
        "SELECT {} FROM {} ORDER BY id LIMIT 1",
        quote_identifier(raster_column),
        quote_identifier(table_name)
    )
}

pub(crate) fn sql_create_tile_table(table_name: &str) -> String {
    sql_create_table(
        table_name,
        "id INTEGER PRIMARY KEY AUTOINCREMENT, \
zoom_level INTEGER NOT NULL DEFAULT 0, \
tile_column INTEGER NOT NULL DEFAULT 0, \
tile_row INTEGER NOT NULL DEFAULT 0, \
tile_data BLOB NOT NULL DEFAULT (zeroblob(4))",
    )
}

pub(crate) fn sql_insert_tile(table_name: &str) -> String {
    format!(
        "INSERT INTO {} (zoom_level, tile_column, tile_row, tile_data) VALUES (?1, ?2, ?3, ?4)",
        quote_identifier(table_name)
    )
}

/// Keyset page over a tile table. `?1` is the resume id, `?2` the page size.
pub(crate) fn sql_select_tiles(table_name: &str, predicate: &str) -> String {
    format!(
        "SELECT id, zoom_level, tile_column, tile_row, tile_data FROM {} \
WHERE id > ?1 AND ({predicate}) ORDER BY id LIMIT ?2",
        quote_identifier(table_name)
    )
}

pub(crate) fn sql_tile_bound(table_name: &str, is_max: bool, is_row: bool) -> String {
    format!(
        "SELECT {}({}) FROM {} WHERE zoom_level = ?1",
        if is_max { "MAX" } else { "MIN" },
        if is_row { "tile_row" } else { "tile_column" },
        quote_identifier(table_name)
    )
}

pub(crate) fn sql_table_columns(table_name: &str) -> String {
    format!(
        "SELECT name, type, pk FROM pragma_table_info({})",
        quote_literal(table_name)
    )
}

pub(crate) fn sql_select_features<'a, I>(
    table_name: &str,
    primary_key_column: &str,
    columns: I,
    predicate: &str,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut selected = vec![quote_identifier(primary_key_column)];
    selected.extend(columns.into_iter().map(quote_identifier));
    let pk = quote_identifier(primary_key_column);

    format!(
        "SELECT {} FROM {} WHERE {pk} > ?1 AND ({predicate}) ORDER BY {pk} LIMIT ?2",
        selected.join(", "),
        quote_identifier(table_name),
    )
}

pub(crate) fn sql_insert_feature<'a, I>(table_name: &str, columns: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let columns: Vec<String> = columns.into_iter().map(quote_identifier).collect();
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<String>>()
        .join(", ");

    if columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(table_name))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(table_name),
            columns.join(", "),
            placeholders
        )
    }
}

pub(crate) fn sql_update_feature<'a, I>(
    table_name: &str,
    primary_key_column: &str,
    columns: I,
) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let assignments: Vec<String> = columns
        .into_iter()
        .enumerate()
        .map(|(idx, name)| format!("{}=?{}", quote_identifier(name), idx + 1))
        .collect();
    if assignments.is_empty() {
        return None;
    }
    let id_idx = assignments.len() + 1;

    Some(format!(
        "UPDATE {} SET {} WHERE {}=?{}",
        quote_identifier(table_name),
        assignments.join(", "),
        quote_identifier(primary_key_column),
        id_idx
    ))
}

pub(crate) fn sql_delete_feature(table_name: &str, primary_key_column: &str) -> String {
    format!(
        "DELETE FROM {} WHERE {}=?1",
        quote_identifier(table_name),
        quote_identifier(primary_key_column)
    )
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
