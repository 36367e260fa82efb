//! Spatial reference systems and their registration in `gpkg_spatial_ref_sys`.

use crate::Gpkg;
use crate::error::{GpkgError, Result};
use crate::ogc_sql::{SQL_INSERT_DEFAULT_SRS, SQL_INSERT_SRS, SQL_SELECT_SRS, SQL_SELECT_SRS_ID};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

const EPSG4326_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AXIS["Latitude",NORTH],AXIS["Longitude",EAST],AUTHORITY["EPSG","4326"]]"#;
const EPSG3857_WKT: &str = r#"PROJCS["WGS 84 / Pseudo-Mercator",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]],PROJECTION["Mercator_1SP"],PARAMETER["central_meridian",0],PARAMETER["scale_factor",1],PARAMETER["false_easting",0],PARAMETER["false_northing",0],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AXIS["Easting",EAST],AXIS["Northing",NORTH],EXTENSION["PROJ4","+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +nadgrids=@null +wktext +no_defs"],AUTHORITY["EPSG","3857"]]"#;

/// A coordinate reference system as recorded in `gpkg_spatial_ref_sys`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Crs {
    pub name: String,
    pub organization: String,
    pub organization_coordsys_id: i32,
    /// WKT definition.
    pub definition: String,
}

impl Crs {
    pub fn new(
        name: impl Into<String>,
        organization: impl Into<String>,
        organization_coordsys_id: i32,
        definition: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            organization: organization.into(),
            organization_coordsys_id,
            definition: definition.into(),
        }
    }

    /// Look up an EPSG code in the built-in [`EpsgAuthority`].
    pub fn epsg(code: i32) -> Option<Self> {
        EpsgAuthority.decode(code).ok()
    }
}

/// External CRS resolution service: SRID to definition and back.
pub trait CrsAuthority: Send + Sync {
    /// Resolve an SRID to a full definition.
    fn decode(&self, srid: i32) -> Result<Crs>;

    /// Find the SRID identifying `crs`, if any.
    fn lookup_srid(&self, crs: &Crs) -> Option<i32>;

    /// Authority name written to `gpkg_spatial_ref_sys.organization`.
    fn name(&self) -> &str {
        "EPSG"
    }
}

/// Minimal EPSG authority that knows WGS 84 and Web Mercator.
#[derive(Clone, Copy, Debug, Default)]
pub struct EpsgAuthority;

impl EpsgAuthority {
    const KNOWN: [(i32, &'static str, &'static str); 2] = [
        (4326, "WGS 84", EPSG4326_WKT),
        (3857, "WGS 84 / Pseudo-Mercator", EPSG3857_WKT),
    ];
}

impl CrsAuthority for EpsgAuthority {
    fn decode(&self, srid: i32) -> Result<Crs> {
        Self::KNOWN
            .iter()
            .find(|(code, _, _)| *code == srid)
            .map(|(code, name, wkt)| Crs::new(*name, "EPSG", *code, *wkt))
            .ok_or(GpkgError::UnknownSrid(srid))
    }

    fn lookup_srid(&self, crs: &Crs) -> Option<i32> {
        if crs.organization.eq_ignore_ascii_case("EPSG") {
            return Some(crs.organization_coordsys_id);
        }
        Self::KNOWN
            .iter()
            .find(|(_, _, wkt)| *wkt == crs.definition)
            .map(|(code, _, _)| *code)
    }
}

/// Lookup-or-register access to `gpkg_spatial_ref_sys`.
///
/// Registration checks for the SRID and inserts it when absent. The two
/// steps are not atomic: concurrent callers registering the same new SRID
/// may see a uniqueness violation from the loser.
pub struct CrsRegistry<'a> {
    pub(crate) gpkg: &'a Gpkg,
}

impl<'a> CrsRegistry<'a> {
    /// Register `srid`, resolving its definition through the container's
    /// [`CrsAuthority`] when it is not registered yet.
    pub fn register(&self, srid: i32) -> Result<()> {
        self.gpkg.ensure_writable()?;
        if self.contains(srid)? {
            return Ok(());
        }
        let crs = self.gpkg.authority().decode(srid)?;
        let authority = self.gpkg.authority().name().to_string();
        self.register_crs(&crs, &authority, srid)
    }

    /// Register an explicit definition under `srid`; a no-op when `srid` is
    /// already present.
    pub fn register_crs(&self, crs: &Crs, authority: &str, srid: i32) -> Result<()> {
        self.gpkg.ensure_writable()?;
        self.gpkg
            .resources()
            .with_connection(|conn| register_on(conn, crs, authority, srid))
    }

    pub fn contains(&self, srid: i32) -> Result<bool> {
        self.gpkg.resources().with_connection(|conn| {
            Ok(conn
                .query_row(SQL_SELECT_SRS_ID, [srid], |row| row.get::<_, i32>(0))
                .optional()?
                .is_some())
        })
    }

    pub fn find(&self, srid: i32) -> Result<Option<Crs>> {
        self.gpkg.resources().with_connection(|conn| {
            Ok(conn
                .query_row(SQL_SELECT_SRS, [srid], |row| {
                    Ok(Crs {
                        name: row.get(0)?,
                        organization: row.get(1)?,
                        organization_coordsys_id: row.get(2)?,
                        definition: row.get(3)?,
                    })
                })
                .optional()?)
        })
    }

    /// Resolve the SRID of `crs` through the container's authority.
    pub fn resolve_srid(&self, crs: &Crs) -> Option<i32> {
        self.gpkg.authority().lookup_srid(crs)
    }
}

fn register_on(conn: &Connection, crs: &Crs, authority: &str, srid: i32) -> Result<()> {
    let exists = conn
        .query_row(SQL_SELECT_SRS_ID, [srid], |row| row.get::<_, i32>(0))
        .optional()?
        .is_some();
    if exists {
        return Ok(());
    }

    debug!(srid, name = %crs.name, "registering spatial reference system");
    conn.execute(
        SQL_INSERT_SRS,
        params![
            srid,
            crs.name,
            authority,
            srid,
            crs.definition,
            Option::<&str>::None
        ],
    )?;
    Ok(())
}

/// Rows every GeoPackage carries: undefined cartesian, undefined geographic
/// and WGS 84.
pub(crate) fn register_default_srs(conn: &Connection) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(SQL_INSERT_DEFAULT_SRS)?;
    stmt.execute(params![
        -1,
        "Undefined Cartesian SRS",
        "NONE",
        -1,
        "undefined",
        "undefined Cartesian coordinate reference system"
    ])?;
    stmt.execute(params![
        0,
        "Undefined geographic SRS",
        "NONE",
        0,
        "undefined",
        "undefined geographic coordinate reference system"
    ])?;
    stmt.execute(params![
        4326,
        "WGS 84",
        "EPSG",
        4326,
        EPSG4326_WKT,
        "longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid"
    ])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Crs, CrsAuthority, EpsgAuthority};
    use crate::error::GpkgError;
    use crate::{Gpkg, Result};

    fn count_srs(gpkg: &Gpkg, srid: i32) -> Result<i64> {
        gpkg.resources().with_connection(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
                [srid],
                |row| row.get(0),
            )?)
        })
    }

    #[test]
    fn registering_twice_keeps_one_row() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        gpkg.crs().register(3857)?;
        gpkg.crs().register(3857)?;
        assert_eq!(count_srs(&gpkg, 3857)?, 1);

        let crs = gpkg.crs().find(3857)?.expect("registered");
        assert_eq!(crs.name, "WGS 84 / Pseudo-Mercator");
        assert_eq!(crs.organization, "EPSG");
        Ok(())
    }

    #[test]
    fn explicit_registration_bypasses_authority() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let crs = Crs::new("Local grid", "acme", 77, "LOCAL_CS[\"grid\"]");
        gpkg.crs().register_crs(&crs, "acme", 900_001)?;
        gpkg.crs().register_crs(&crs, "acme", 900_001)?;
        assert_eq!(count_srs(&gpkg, 900_001)?, 1);
        assert_eq!(
            gpkg.crs().find(900_001)?.map(|c| c.organization),
            Some("acme".to_string())
        );
        Ok(())
    }

    #[test]
    fn unknown_srid_fails_without_insert() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let err = gpkg.crs().register(2193).expect_err("unknown to authority");
        assert!(matches!(err, GpkgError::UnknownSrid(2193)));
        assert_eq!(count_srs(&gpkg, 2193)?, 0);
        Ok(())
    }

    #[test]
    fn concurrent_registration_of_same_srid() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    // A losing racer may hit the primary key; that is a
                    // documented outcome, the row count below is not.
                    let _ = gpkg.crs().register(3857);
                });
            }
        });
        assert_eq!(count_srs(&gpkg, 3857)?, 1);
        Ok(())
    }

    #[test]
    fn epsg_authority_resolves_codes() {
        let crs = Crs::epsg(4326).expect("known code");
        assert_eq!(EpsgAuthority.lookup_srid(&crs), Some(4326));

        let anonymous = Crs::new("whatever", "NONE", 0, crs.definition.clone());
        assert_eq!(EpsgAuthority.lookup_srid(&anonymous), Some(4326));
        assert!(Crs::epsg(1).is_none());
    }
}
