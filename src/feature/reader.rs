use super::cursor::KeysetCursor;
use super::feature::Feature;
use super::schema::FeatureSchema;
use crate::error::{GpkgError, Result};
use crate::resource::{ConnectionHandle, CursorState};
use std::sync::Arc;
use tracing::debug;

/// Lazy, forward-only stream of stored features matching a filter.
///
/// The reader holds a connection (or borrows the caller's transaction)
/// until it is closed or exhausted. Close it explicitly when stopping early.
pub struct FeatureReader<'t> {
    conn: Option<ConnectionHandle<'t>>,
    cursor: KeysetCursor,
    schema: Arc<FeatureSchema>,
    state: CursorState,
}

impl<'t> FeatureReader<'t> {
    pub(crate) fn new(
        conn: ConnectionHandle<'t>,
        cursor: KeysetCursor,
        schema: Arc<FeatureSchema>,
    ) -> Self {
        Self {
            conn: Some(conn),
            cursor,
            schema,
            state: CursorState::Open,
        }
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Advance the cursor. Returns `Ok(None)` once exhausted and
    /// `CursorClosed` after an explicit [`close`](Self::close).
    pub fn next_feature(&mut self) -> Result<Option<Feature>> {
        let Some(conn) = self.conn.as_ref() else {
            return if self.cursor.is_exhausted() {
                Ok(None)
            } else {
                Err(GpkgError::CursorClosed)
            };
        };
        self.state = CursorState::Iterating;
        let next = self.cursor.next(conn);
        if next.as_ref().map_or(true, Option::is_none) {
            // Exhausted or failed: release the connection early.
            self.release();
        }
        next
    }

    /// Release the connection. Idempotent.
    pub fn close(&mut self) {
        if self.state != CursorState::Closed {
            self.release();
        }
    }

    fn release(&mut self) {
        if self.conn.take().is_some() {
            debug!(table = self.schema.name(), "feature reader closed");
        }
        self.state = CursorState::Closed;
    }
}

impl Iterator for FeatureReader<'_> {
    type Item = Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.conn.is_none() {
            return None;
        }
        self.next_feature().transpose()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{ErrorKind, GpkgError};
    use crate::feature::tests::{point_entry, stations};
    use crate::feature::{Feature, Filter};
    use crate::resource::CursorState;
    use crate::{Gpkg, GpkgConfig, Result};
    use geo_types::Point;

    fn checked_out(gpkg: &Gpkg) -> Result<u32> {
        let state = gpkg.pool_state()?;
        Ok(state.connections - state.idle_connections)
    }

    fn populate(gpkg: &Gpkg, total: usize) -> Result<crate::FeatureEntry> {
        let schema = stations()?;
        let mut entry = point_entry();
        gpkg.features().create(&mut entry, &schema)?;
        let mut writer = gpkg.features().writer(&entry, true, None, None)?;
        for i in 0..total {
            let mut feature = writer.next()?.expect("append yields a blank feature");
            feature.set("name", format!("s{i}"))?;
            feature.set_geometry(&Point::new(i as f64, 1.0))?;
            writer.write(&feature)?;
        }
        writer.close();
        Ok(entry)
    }

    fn assert_batched_read(total: usize, batch_size: u32) -> Result<()> {
        let config = GpkgConfig {
            batch_size,
            ..GpkgConfig::default()
        };
        let gpkg = Gpkg::temporary_with_config(config)?;
        let entry = populate(&gpkg, total)?;

        let reader = gpkg.features().reader(&entry, None, None)?;
        let names = reader
            .map(|feature| feature?.property::<String>("name"))
            .collect::<Result<Vec<_>>>()?;
        let expected: Vec<String> = (0..total).map(|i| format!("s{i}")).collect();
        assert_eq!(names, expected);
        assert_eq!(checked_out(&gpkg)?, 0);
        Ok(())
    }

    #[test]
    fn reads_across_batch_boundaries() -> Result<()> {
        assert_batched_read(0, 3)?;
        assert_batched_read(2, 5)?;
        assert_batched_read(6, 3)?;
        assert_batched_read(7, 3)?;
        assert_batched_read(4, 1)?;
        Ok(())
    }

    #[test]
    fn filter_restricts_rows() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let entry = populate(&gpkg, 5)?;

        let filter = Filter::equals("name", "s3");
        let features: Vec<Feature> = gpkg
            .features()
            .reader(&entry, Some(&filter), None)?
            .collect::<Result<_>>()?;
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].property::<String>("name")?, "s3");

        let ids = Filter::ids([1, 2, 99]);
        let count = gpkg.features().reader(&entry, Some(&ids), None)?.count();
        assert_eq!(count, 2);
        Ok(())
    }

    #[test]
    fn explicit_close_releases_connection() -> Result<()> {
        let config = GpkgConfig {
            batch_size: 2,
            ..GpkgConfig::default()
        };
        let gpkg = Gpkg::temporary_with_config(config)?;
        let entry = populate(&gpkg, 5)?;

        let mut reader = gpkg.features().reader(&entry, None, None)?;
        assert_eq!(reader.state(), CursorState::Open);
        assert_eq!(checked_out(&gpkg)?, 1);

        assert!(reader.next_feature()?.is_some());
        assert_eq!(reader.state(), CursorState::Iterating);

        reader.close();
        reader.close();
        assert_eq!(reader.state(), CursorState::Closed);
        assert_eq!(checked_out(&gpkg)?, 0);

        let err = reader.next_feature().expect_err("closed cursor");
        assert!(matches!(err, GpkgError::CursorClosed));
        assert_eq!(err.kind(), ErrorKind::Closed);
        assert!(reader.next().is_none());
        Ok(())
    }

    #[test]
    fn exhaustion_closes_automatically() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let entry = populate(&gpkg, 1)?;

        let mut reader = gpkg.features().reader(&entry, None, None)?;
        assert!(reader.next_feature()?.is_some());
        assert!(reader.next_feature()?.is_none());
        assert_eq!(reader.state(), CursorState::Closed);
        assert!(reader.next_feature()?.is_none());
        assert_eq!(checked_out(&gpkg)?, 0);
        Ok(())
    }
}
