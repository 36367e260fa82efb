use super::cursor::{FeatureLayout, KeysetCursor};
use super::feature::Feature;
use crate::error::{GpkgError, Result};
use crate::resource::{ConnectionHandle, CursorState};
use std::sync::Arc;
use tracing::debug;

enum WriterMode {
    Append,
    Modify(KeysetCursor),
}

/// Insert-only (append) or update/delete-capable (modify) cursor over a
/// feature table.
///
/// Without a caller transaction every write commits on its own.
pub struct FeatureWriter<'t> {
    conn: Option<ConnectionHandle<'t>>,
    layout: Arc<FeatureLayout>,
    mode: WriterMode,
    state: CursorState,
    written: u64,
}

impl<'t> FeatureWriter<'t> {
    pub(crate) fn append(conn: ConnectionHandle<'t>, layout: Arc<FeatureLayout>) -> Self {
        Self::with_mode(conn, layout, WriterMode::Append)
    }

    pub(crate) fn modify(
        conn: ConnectionHandle<'t>,
        layout: Arc<FeatureLayout>,
        cursor: KeysetCursor,
    ) -> Self {
        Self::with_mode(conn, layout, WriterMode::Modify(cursor))
    }

    fn with_mode(conn: ConnectionHandle<'t>, layout: Arc<FeatureLayout>, mode: WriterMode) -> Self {
        Self {
            conn: Some(conn),
            layout,
            mode,
            state: CursorState::Open,
            written: 0,
        }
    }

    pub fn is_append(&self) -> bool {
        matches!(self.mode, WriterMode::Append)
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Number of successful `write` calls so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Append mode: a blank feature to fill in and [`write`](Self::write).
    /// Modify mode: the next stored feature matching the filter, or `None`.
    pub fn next(&mut self) -> Result<Option<Feature>> {
        let conn = self.conn.as_ref().ok_or(GpkgError::CursorClosed)?;
        self.state = CursorState::Iterating;
        match &mut self.mode {
            WriterMode::Append => Ok(Some(Feature::new(self.layout.schema.clone()))),
            WriterMode::Modify(cursor) => cursor.next(conn),
        }
    }

    /// Store `feature`. Appends insert a new row and return its key; in
    /// modify mode a feature with an id updates that row. Attributes are
    /// matched by name.
    pub fn write(&mut self, feature: &Feature) -> Result<i64> {
        let conn = self.conn.as_ref().ok_or(GpkgError::CursorClosed)?;
        let id = match (&self.mode, feature.id()) {
            (WriterMode::Modify(_), Some(id)) => {
                self.layout.update(conn, id, feature)?;
                id
            }
            _ => self.layout.insert(conn, feature)?,
        };
        self.written += 1;
        Ok(id)
    }

    /// Delete the stored row of `feature`. Modify mode only.
    pub fn remove(&mut self, feature: &Feature) -> Result<()> {
        let conn = self.conn.as_ref().ok_or(GpkgError::CursorClosed)?;
        if self.is_append() {
            return Err(GpkgError::invalid("cannot remove features through an append writer"));
        }
        let id = feature
            .id()
            .ok_or_else(|| GpkgError::invalid("cannot remove a feature that was never stored"))?;
        self.layout.delete(conn, id)
    }

    /// Release the connection. Idempotent.
    pub fn close(&mut self) {
        if self.conn.take().is_some() {
            debug!(
                table = %self.layout.table,
                written = self.written,
                "feature writer closed"
            );
        }
        self.state = CursorState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use crate::feature::Filter;
    use crate::feature::tests::{point_entry, stations};
    use crate::resource::CursorState;
    use crate::{Gpkg, GpkgError, Result};
    use geo_types::Point;

    fn names(gpkg: &Gpkg, entry: &crate::FeatureEntry) -> Result<Vec<String>> {
        gpkg.features()
            .reader(entry, None, None)?
            .map(|f| f?.property::<String>("name"))
            .collect()
    }

    #[test]
    fn modify_writer_updates_and_removes_matches() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let schema = stations()?;
        let mut entry = point_entry();
        gpkg.features().create(&mut entry, &schema)?;

        let mut writer = gpkg.features().writer(&entry, true, None, None)?;
        assert!(writer.is_append());
        for name in ["a", "b", "c"] {
            let mut feature = writer.next()?.expect("blank");
            feature.set("name", name)?;
            feature.set_geometry(&Point::new(2.0, 3.0))?;
            writer.write(&feature)?;
        }
        assert_eq!(writer.written(), 3);
        writer.close();

        let filter = Filter::equals("name", "b");
        let mut writer = gpkg.features().writer(&entry, false, Some(&filter), None)?;
        let mut feature = writer.next()?.expect("one match");
        feature.set("name", "B")?;
        writer.write(&feature)?;
        assert!(writer.next()?.is_none());
        writer.close();

        let mut writer = gpkg.features().writer(&entry, false, None, None)?;
        while let Some(feature) = writer.next()? {
            if feature.property::<String>("name")? == "a" {
                writer.remove(&feature)?;
            }
        }
        writer.close();
        assert_eq!(writer.state(), CursorState::Closed);
        assert!(matches!(writer.next(), Err(GpkgError::CursorClosed)));

        assert_eq!(names(&gpkg, &entry)?, vec!["B".to_string(), "c".to_string()]);
        Ok(())
    }

    #[test]
    fn writes_join_caller_transaction() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let schema = stations()?;
        let mut entry = point_entry();
        gpkg.features().create(&mut entry, &schema)?;

        let tx = gpkg.begin()?;
        {
            let mut writer = gpkg.features().writer(&entry, true, None, Some(&tx))?;
            let mut feature = writer.next()?.expect("blank");
            feature.set("name", "pending")?;
            writer.write(&feature)?;
            writer.close();
        }
        tx.rollback()?;
        assert!(names(&gpkg, &entry)?.is_empty());

        let tx = gpkg.begin()?;
        {
            let mut writer = gpkg.features().writer(&entry, true, None, Some(&tx))?;
            let mut feature = writer.next()?.expect("blank");
            feature.set("name", "kept")?;
            writer.write(&feature)?;
        }
        tx.commit()?;
        assert_eq!(names(&gpkg, &entry)?, vec!["kept".to_string()]);
        Ok(())
    }

    #[test]
    fn append_writer_cannot_remove() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let mut entry = point_entry();
        gpkg.features().create(&mut entry, &*stations()?)?;

        let mut writer = gpkg.features().writer(&entry, true, None, None)?;
        let mut feature = writer.next()?.expect("blank");
        feature.set("name", "x")?;
        let id = writer.write(&feature)?;
        feature.set_id(Some(id));
        assert!(writer.remove(&feature).is_err());
        Ok(())
    }
}
