use std::path::PathBuf;
use std::time::Duration;

/// SQLite journal mode applied to every pooled connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JournalMode {
    Delete,
    Wal,
}

impl JournalMode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Wal => "WAL",
        }
    }
}

/// Tuning knobs for a container and its connection pool.
///
/// ```
/// use std::path::PathBuf;
/// use std::time::Duration;
/// use geopkg_store::GpkgConfig;
///
/// let config = GpkgConfig {
///     max_connections: 2,
///     connection_timeout: Duration::from_secs(1),
///     ..GpkgConfig::default()
/// };
/// assert_eq!(config.batch_size, 256);
/// ```
#[derive(Clone, Debug)]
pub struct GpkgConfig {
    /// Upper bound of simultaneously checked out connections. Open cursors
    /// count against it until they are closed.
    pub max_connections: u32,
    /// How long an operation waits for a free connection before failing.
    pub connection_timeout: Duration,
    /// SQLite busy handler timeout per connection.
    pub busy_timeout: Duration,
    /// Enforce `FOREIGN KEY` constraints between catalog tables.
    ///
    /// Off by default: tile pyramids register their tile matrix set before
    /// the contents row.
    pub foreign_keys: bool,
    pub journal_mode: JournalMode,
    pub read_only: bool,
    /// Rows fetched per round trip by streaming cursors.
    pub batch_size: u32,
    /// Directory for transient raster encoding files. `None` uses the
    /// system temporary directory.
    pub temp_dir: Option<PathBuf>,
}

impl Default for GpkgConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            connection_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            foreign_keys: false,
            journal_mode: JournalMode::Wal,
            read_only: false,
            batch_size: 256,
            temp_dir: None,
        }
    }
}
