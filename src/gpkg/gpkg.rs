use crate::catalog::CatalogStore;
use crate::config::GpkgConfig;
use crate::crs::{CrsAuthority, CrsRegistry, EpsgAuthority};
use crate::error::{GpkgError, Result};
use crate::feature::FeatureContentManager;
use crate::raster::RasterContentManager;
use crate::resource::{ResourceManager, Transaction};
use crate::tile::TilePyramidManager;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;

/// A GeoPackage container file.
///
/// Storage is reached through a connection pool that is created on first
/// use. Component views (`catalog()`, `crs()`, `features()`, `rasters()`,
/// `tiles()`) borrow the container and are cheap to create.
pub struct Gpkg {
    resources: ResourceManager,
    authority: Arc<dyn CrsAuthority>,
    // Declared last so the pool is dropped before the file is removed.
    _temp: Option<TempPath>,
}

impl std::fmt::Debug for Gpkg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gpkg")
            .field("path", &self.resources.path())
            .field("config", self.resources.config())
            .finish_non_exhaustive()
    }
}

impl Gpkg {
    /// Open an existing GeoPackage in read-write mode.
    ///
    /// The catalog is not bootstrapped; call [`Gpkg::init`] for files that
    /// may lack it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, GpkgConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: GpkgConfig) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GpkgError::invalid(format!(
                "GeoPackage file does not exist: {}",
                path.display()
            )));
        }
        Ok(Self::from_parts(path.to_path_buf(), config, None))
    }

    /// Open an existing GeoPackage in read-only mode.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = GpkgConfig {
            read_only: true,
            ..GpkgConfig::default()
        };
        Self::open_with_config(path, config)
    }

    /// Create a new GeoPackage and bootstrap its catalog.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_config(path, GpkgConfig::default())
    }

    pub fn create_with_config<P: AsRef<Path>>(path: P, config: GpkgConfig) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(GpkgError::invalid(format!(
                "GeoPackage file already exists: {}",
                path.display()
            )));
        }
        if config.read_only {
            return Err(GpkgError::ReadOnly);
        }
        let gpkg = Self::from_parts(path.to_path_buf(), config, None);
        gpkg.init()?;
        Ok(gpkg)
    }

    /// Create a bootstrapped GeoPackage in a temporary file that is removed
    /// when the container is dropped.
    pub fn temporary() -> Result<Self> {
        Self::temporary_with_config(GpkgConfig::default())
    }

    pub fn temporary_with_config(config: GpkgConfig) -> Result<Self> {
        if config.read_only {
            return Err(GpkgError::ReadOnly);
        }
        let temp = tempfile::Builder::new()
            .prefix("geopkg")
            .suffix(".gpkg")
            .tempfile()?
            .into_temp_path();
        let gpkg = Self::from_parts(temp.to_path_buf(), config, Some(temp));
        gpkg.init()?;
        Ok(gpkg)
    }

    fn from_parts(path: PathBuf, config: GpkgConfig, temp: Option<TempPath>) -> Self {
        Self {
            resources: ResourceManager::new(path, config),
            authority: Arc::new(EpsgAuthority),
            _temp: temp,
        }
    }

    /// Replace the CRS authority used to resolve SRIDs.
    pub fn with_crs_authority(mut self, authority: Arc<dyn CrsAuthority>) -> Self {
        self.authority = authority;
        self
    }

    /// Bootstrap the catalog tables. Idempotent.
    pub fn init(&self) -> Result<()> {
        self.catalog().bootstrap()
    }

    pub fn path(&self) -> &Path {
        self.resources.path()
    }

    pub fn config(&self) -> &GpkgConfig {
        self.resources.config()
    }

    pub fn catalog(&self) -> CatalogStore<'_> {
        CatalogStore { gpkg: self }
    }

    pub fn crs(&self) -> CrsRegistry<'_> {
        CrsRegistry { gpkg: self }
    }

    pub fn features(&self) -> FeatureContentManager<'_> {
        FeatureContentManager { gpkg: self }
    }

    pub fn rasters(&self) -> RasterContentManager<'_> {
        RasterContentManager { gpkg: self }
    }

    pub fn tiles(&self) -> TilePyramidManager<'_> {
        TilePyramidManager { gpkg: self }
    }

    /// Start a transaction that readers and writers can join.
    pub fn begin(&self) -> Result<Transaction> {
        self.ensure_writable()?;
        self.resources.begin()
    }

    /// Connection counts of the pool, for observing cursor lifetimes.
    pub fn pool_state(&self) -> Result<r2d2::State> {
        self.resources.state()
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.resources.config().read_only {
            return Err(GpkgError::ReadOnly);
        }
        Ok(())
    }

    pub(crate) fn authority(&self) -> &dyn CrsAuthority {
        self.authority.as_ref()
    }

    pub(crate) fn resources(&self) -> &ResourceManager {
        &self.resources
    }
}

#[cfg(test)]
mod tests {
    use super::Gpkg;
    use crate::crs::{Crs, CrsAuthority};
    use crate::error::{GpkgError, Result};
    use std::sync::Arc;

    #[test]
    fn create_fails_if_file_exists() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        let err = Gpkg::create(file.path()).expect_err("existing file should fail");
        match err {
            GpkgError::InvalidArgument(message) => assert!(message.contains("already exists")),
            other => panic!("unexpected error: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn open_fails_if_missing_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let err = Gpkg::open(dir.path().join("missing.gpkg")).expect_err("missing file");
        match err {
            GpkgError::InvalidArgument(message) => assert!(message.contains("does not exist")),
            other => panic!("unexpected error: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn temporary_file_is_removed_on_drop() -> Result<()> {
        let gpkg = Gpkg::temporary()?;
        let path = gpkg.path().to_path_buf();
        assert!(path.exists());
        drop(gpkg);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn reopened_file_keeps_catalog() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("reopen.gpkg");
        {
            let gpkg = Gpkg::create(&path)?;
            gpkg.crs().register(3857)?;
        }
        let gpkg = Gpkg::open(&path)?;
        assert!(gpkg.crs().contains(3857)?);
        gpkg.init()?;
        assert!(gpkg.crs().contains(4326)?);
        Ok(())
    }

    struct LocalAuthority;

    impl CrsAuthority for LocalAuthority {
        fn decode(&self, srid: i32) -> Result<Crs> {
            match srid {
                32_767 => Ok(Crs::new("Site grid", "LOCAL", srid, "LOCAL_CS[\"site\"]")),
                other => Err(GpkgError::UnknownSrid(other)),
            }
        }

        fn lookup_srid(&self, crs: &Crs) -> Option<i32> {
            (crs.organization == "LOCAL").then_some(crs.organization_coordsys_id)
        }

        fn name(&self) -> &str {
            "LOCAL"
        }
    }

    #[test]
    fn custom_authority_resolves_registrations() -> Result<()> {
        let gpkg = Gpkg::temporary()?.with_crs_authority(Arc::new(LocalAuthority));
        gpkg.crs().register(32_767)?;
        let crs = gpkg.crs().find(32_767)?.expect("registered");
        assert_eq!(crs.organization, "LOCAL");
        assert!(gpkg.crs().register(3857).is_err());
        Ok(())
    }
}
