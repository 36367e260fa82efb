use crate::entry::Tile;
use crate::error::{GpkgError, Result};
use crate::ogc_sql::sql_select_tiles;
use crate::resource::{CursorState, ScopedConnection, finalize_statement};
use rusqlite::{ToSql, params_from_iter};
use std::collections::VecDeque;
use tracing::debug;

/// Inclusive range over zoom level, tile column and tile row. Absent bounds
/// are unconstrained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TileRange {
    pub low_zoom: Option<i32>,
    pub high_zoom: Option<i32>,
    pub low_column: Option<i32>,
    pub high_column: Option<i32>,
    pub low_row: Option<i32>,
    pub high_row: Option<i32>,
}

impl TileRange {
    /// Every tile of one zoom level.
    pub fn zoom(zoom: i32) -> Self {
        Self {
            low_zoom: Some(zoom),
            high_zoom: Some(zoom),
            ..Self::default()
        }
    }

    /// Render the predicate, numbering parameters from `first_param`.
    fn to_sql(self, first_param: usize) -> (String, Vec<i32>) {
        let bounds = [
            ("zoom_level", ">=", self.low_zoom),
            ("zoom_level", "<=", self.high_zoom),
            ("tile_column", ">=", self.low_column),
            ("tile_column", "<=", self.high_column),
            ("tile_row", ">=", self.low_row),
            ("tile_row", "<=", self.high_row),
        ];
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        for (column, op, value) in bounds {
            if let Some(value) = value {
                clauses.push(format!("{column} {op} ?{}", first_param + params.len()));
                params.push(value);
            }
        }
        if clauses.is_empty() {
            return ("1".to_string(), params);
        }
        (clauses.join(" AND "), params)
    }
}

/// Cursor over the tiles of one pyramid.
///
/// The reader owns a pooled connection until [`close`](Self::close) is
/// called or the reader is dropped; running out of tiles does not release
/// it.
pub struct TileReader {
    conn: Option<ScopedConnection>,
    table: String,
    sql: String,
    params: Vec<i32>,
    batch_size: u32,
    last_id: i64,
    buffer: VecDeque<Tile>,
    exhausted: bool,
    state: CursorState,
}

impl TileReader {
    pub(crate) fn new(
        conn: ScopedConnection,
        table: &str,
        range: TileRange,
        batch_size: u32,
    ) -> Self {
        // ?1 and ?2 are the resume key and the batch size.
        let (predicate, params) = range.to_sql(3);
        Self {
            conn: Some(conn),
            table: table.to_string(),
            sql: sql_select_tiles(table, &predicate),
            params,
            batch_size: batch_size.max(1),
            last_id: i64::MIN,
            buffer: VecDeque::new(),
            exhausted: false,
            state: CursorState::Open,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn next_tile(&mut self) -> Result<Option<Tile>> {
        if self.state == CursorState::Closed {
            return Err(GpkgError::CursorClosed);
        }
        self.state = CursorState::Iterating;
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fetch() {
                self.exhausted = true;
                return Err(err);
            }
        }
        Ok(self.buffer.pop_front())
    }

    /// Release the connection. Idempotent.
    pub fn close(&mut self) {
        if self.conn.take().is_some() {
            debug!(table = %self.table, "tile reader closed");
        }
        self.state = CursorState::Closed;
    }

    fn fetch(&mut self) -> Result<()> {
        let conn = self.conn.as_ref().ok_or(GpkgError::CursorClosed)?;
        debug!(sql = %self.sql, after = self.last_id, "fetching tile batch");
        let mut stmt = conn.prepare(&self.sql)?;
        let mut last_id = self.last_id;
        let tiles = {
            let mut bound: Vec<&dyn ToSql> = vec![&self.last_id, &self.batch_size];
            bound.extend(self.params.iter().map(|v| v as &dyn ToSql));
            let mut rows = stmt.query(params_from_iter(bound))?;
            let mut tiles = Vec::with_capacity(self.batch_size as usize);
            while let Some(row) = rows.next()? {
                last_id = row.get(0)?;
                tiles.push(Tile {
                    zoom: row.get(1)?,
                    column: row.get(2)?,
                    row: row.get(3)?,
                    data: row.get(4)?,
                });
            }
            tiles
        };
        finalize_statement(stmt);

        if tiles.len() < self.batch_size as usize {
            self.exhausted = true;
        }
        self.last_id = last_id;
        self.buffer.extend(tiles);
        Ok(())
    }
}

impl Iterator for TileReader {
    type Item = Result<Tile>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == CursorState::Closed {
            return None;
        }
        self.next_tile().transpose()
    }
}
