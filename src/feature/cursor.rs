use super::feature::Feature;
use super::filter::Filter;
use super::schema::FeatureSchema;
use crate::catalog::{select_feature_entries, table_columns};
use crate::entry::FeatureEntry;
use crate::error::{GpkgError, Result};
use crate::geometry::{gpkg_geometry_to_wkb, wkb_to_gpkg_geometry};
use crate::ogc_sql::{
    sql_delete_feature, sql_insert_feature, sql_select_features, sql_update_feature,
};
use crate::resource::finalize_statement;
use crate::types::{ColumnType, GeometryType};
use crate::value::Value;
use rusqlite::{Connection, Row, ToSql, params_from_iter};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Physical layout of a stored feature table, resolved from the catalog.
#[derive(Debug)]
pub(crate) struct FeatureLayout {
    pub(crate) table: String,
    pub(crate) primary_key: String,
    pub(crate) srid: i32,
    pub(crate) schema: Arc<FeatureSchema>,
    insert_sql: String,
    update_sql: Option<String>,
    delete_sql: String,
}

impl FeatureLayout {
    /// Resolve the layout of `entry` on `conn`. The stored catalog row is
    /// authoritative for geometry column and SRID.
    pub(crate) fn resolve(conn: &Connection, entry: &FeatureEntry) -> Result<Self> {
        let table = entry
            .table_name
            .as_deref()
            .ok_or_else(|| GpkgError::invalid("entry has no table name"))?;
        let stored = select_feature_entries(conn, Some(table))?
            .into_iter()
            .next()
            .ok_or_else(|| GpkgError::invalid(format!("'{table}' is not a feature dataset")))?;
        let geometry_column = stored
            .content
            .geometry_column
            .ok_or_else(|| GpkgError::invalid(format!("'{table}' has no geometry column")))?;
        let srid = stored.srid.unwrap_or(0);

        let table_columns = table_columns(conn, table)?;
        let mut builder = FeatureSchema::builder(table);
        if let Some(crs) = stored.bounds.and_then(|b| b.crs) {
            builder = builder.crs(crs);
        }
        for column in table_columns.columns {
            let column_type = if column.name == geometry_column {
                let geometry_type = stored.content.geometry_type;
                ColumnType::Geometry(geometry_type.unwrap_or(GeometryType::Geometry))
            } else {
                column.column_type
            };
            builder = builder.column(column.name, column_type);
        }
        let schema = builder.default_geometry(geometry_column).build()?;

        Ok(Self::new(table, &table_columns.primary_key, srid, Arc::new(schema)))
    }

    fn new(table: &str, primary_key: &str, srid: i32, schema: Arc<FeatureSchema>) -> Self {
        let names = || schema.columns().iter().map(|c| c.name.as_str());
        Self {
            insert_sql: sql_insert_feature(table, names()),
            update_sql: sql_update_feature(table, primary_key, names()),
            delete_sql: sql_delete_feature(table, primary_key),
            table: table.to_string(),
            primary_key: primary_key.to_string(),
            srid,
            schema,
        }
    }

    fn read_row(&self, row: &Row<'_>) -> Result<Feature> {
        let id: i64 = row.get(0)?;
        let mut values = Vec::with_capacity(self.schema.columns().len());
        for (idx, column) in self.schema.columns().iter().enumerate() {
            let value = Value::from(row.get_ref(idx + 1)?);
            let value = match (column.column_type, value) {
                (ColumnType::Geometry(_), Value::Blob(blob)) => {
                    Value::Geometry(gpkg_geometry_to_wkb(&blob)?.to_vec())
                }
                (_, value) => value,
            };
            values.push(value);
        }
        Ok(Feature::with_values(Some(id), self.schema.clone(), values))
    }

    /// Values of `feature` in storage column order, matched by attribute
    /// name. Attributes the feature lacks are written as `NULL`.
    fn storage_values(&self, feature: &Feature) -> Result<Vec<Value>> {
        self.schema
            .columns()
            .iter()
            .map(|column| {
                let value = feature.get(&column.name).cloned().unwrap_or(Value::Null);
                match (column.column_type, value) {
                    (ColumnType::Geometry(_), Value::Geometry(wkb) | Value::Blob(wkb)) => {
                        Ok(Value::Blob(wkb_to_gpkg_geometry(&wkb, self.srid)?))
                    }
                    (ColumnType::Geometry(_), Value::Null) => Ok(Value::Null),
                    (ColumnType::Geometry(_), other) => Err(GpkgError::ValueTypeMismatch {
                        expected: "geometry",
                        actual: other.type_name(),
                    }),
                    (_, Value::Geometry(_)) => Err(GpkgError::ValueTypeMismatch {
                        expected: "attribute",
                        actual: "geometry",
                    }),
                    (_, value) => Ok(value),
                }
            })
            .collect()
    }

    pub(crate) fn insert(&self, conn: &Connection, feature: &Feature) -> Result<i64> {
        let values = self.storage_values(feature)?;
        debug!(sql = %self.insert_sql, "inserting feature");
        conn.execute(&self.insert_sql, params_from_iter(values.iter()))?;
        Ok(conn.last_insert_rowid())
    }

    pub(crate) fn update(&self, conn: &Connection, id: i64, feature: &Feature) -> Result<()> {
        let Some(sql) = &self.update_sql else {
            return Ok(());
        };
        let mut values = self.storage_values(feature)?;
        values.push(Value::Integer(id));
        debug!(sql = %sql, id, "updating feature");
        conn.execute(sql, params_from_iter(values.iter()))?;
        Ok(())
    }

    pub(crate) fn delete(&self, conn: &Connection, id: i64) -> Result<()> {
        debug!(sql = %self.delete_sql, id, "deleting feature");
        conn.execute(&self.delete_sql, [id])?;
        Ok(())
    }
}

/// Forward-only scan over the rows of a feature table matching a filter.
///
/// Rows are fetched `batch_size` at a time, each batch resuming after the
/// last primary key seen, so no statement stays open between batches.
pub(crate) struct KeysetCursor {
    layout: Arc<FeatureLayout>,
    sql: String,
    params: Vec<Value>,
    batch_size: u32,
    last_id: i64,
    buffer: VecDeque<Feature>,
    exhausted: bool,
}

impl KeysetCursor {
    pub(crate) fn new(layout: Arc<FeatureLayout>, filter: &Filter, batch_size: u32) -> Result<Self> {
        // ?1 and ?2 are the resume key and the batch size.
        let (predicate, params) = filter.to_sql(&layout.schema, &layout.primary_key, 3)?;
        let sql = sql_select_features(
            &layout.table,
            &layout.primary_key,
            layout.schema.columns().iter().map(|c| c.name.as_str()),
            &predicate,
        );
        Ok(Self {
            layout,
            sql,
            params,
            batch_size: batch_size.max(1),
            last_id: i64::MIN,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }

    pub(crate) fn next(&mut self, conn: &Connection) -> Result<Option<Feature>> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fetch(conn) {
                self.exhausted = true;
                return Err(err);
            }
        }
        Ok(self.buffer.pop_front())
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.exhausted && self.buffer.is_empty()
    }

    fn fetch(&mut self, conn: &Connection) -> Result<()> {
        debug!(sql = %self.sql, after = self.last_id, "fetching feature batch");
        let mut stmt = conn.prepare(&self.sql)?;
        let features = {
            let mut bound: Vec<&dyn ToSql> = vec![&self.last_id, &self.batch_size];
            bound.extend(self.params.iter().map(|v| v as &dyn ToSql));
            let mut rows = stmt.query(bound.as_slice())?;
            let mut features = Vec::with_capacity(self.batch_size as usize);
            while let Some(row) = rows.next()? {
                features.push(self.layout.read_row(row)?);
            }
            features
        };
        finalize_statement(stmt);

        if features.len() < self.batch_size as usize {
            self.exhausted = true;
        }
        if let Some(id) = features.last().and_then(Feature::id) {
            self.last_id = id;
        }
        self.buffer.extend(features);
        Ok(())
    }
}
