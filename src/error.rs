use thiserror::Error;

/// Coarse classification of [`GpkgError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or inconsistent caller input. Raised before any write.
    InvalidArgument,
    /// Failure reported by SQLite or by the connection pool.
    Storage,
    /// Local file system failure (temporary raster files, container files).
    Io,
    /// A raster could not be encoded or decoded.
    Codec,
    /// A geometry blob or WKB payload could not be handled.
    Geometry,
    /// The cursor was already closed.
    Closed,
}

/// Crate error type for GeoPackage operations.
#[derive(Debug, Error)]
pub enum GpkgError {
    /// Missing bounds, SRID, geometry column and similar validation failures.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Wraps errors returned by `rusqlite`.
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
    /// Wraps errors returned by the connection pool.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Wraps errors returned by the `wkb` crate.
    #[error(transparent)]
    Wkb(#[from] wkb::error::WkbError),
    /// A raster format failed to encode or decode a raster.
    #[error("raster codec error: {0}")]
    Codec(String),
    /// The SRID is not known to the CRS authority.
    #[error("unknown srid: {0}")]
    UnknownSrid(i32),
    /// A geometry type name in metadata could not be mapped.
    #[error("unsupported geometry type: {0}")]
    UnsupportedGeometryType(String),
    /// A column type declared in SQLite metadata is not supported by this crate.
    #[error("unsupported column type for column '{column}': {declared_type}")]
    UnsupportedColumnType {
        column: String,
        declared_type: String,
    },
    /// A table with the same name is already registered or physically present.
    #[error("table already exists: {0}")]
    TableExists(String),
    /// A caller supplied name cannot be used as an SQL identifier.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),
    /// Invalid GeoPackage geometry flags byte.
    #[error("invalid gpkg geometry flags: {0:#04x}")]
    InvalidGpkgGeometryFlags(u8),
    /// GeoPackage geometry blob is shorter than its header claims.
    #[error("invalid gpkg geometry length: got {len} bytes, expected at least {minimum}")]
    InvalidGpkgGeometryLength { len: usize, minimum: usize },
    /// `last_change` could not be parsed.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    /// Dynamic `Value` type did not match the expected conversion target.
    #[error("expected {expected}, got {actual}")]
    ValueTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    /// The cursor was closed before this call.
    #[error("cursor is closed")]
    CursorClosed,
    #[error("operation not allowed on read-only container")]
    ReadOnly,
}

impl GpkgError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_)
            | Self::TableExists(_)
            | Self::InvalidIdentifier(_)
            | Self::UnknownSrid(_)
            | Self::ValueTypeMismatch { .. }
            | Self::ReadOnly => ErrorKind::InvalidArgument,
            Self::Sql(_)
            | Self::Pool(_)
            | Self::UnsupportedColumnType { .. }
            | Self::InvalidTimestamp(_) => ErrorKind::Storage,
            Self::Io(_) => ErrorKind::Io,
            Self::Codec(_) => ErrorKind::Codec,
            Self::Wkb(_)
            | Self::UnsupportedGeometryType(_)
            | Self::InvalidGpkgGeometryFlags(_)
            | Self::InvalidGpkgGeometryLength { .. } => ErrorKind::Geometry,
            Self::CursorClosed => ErrorKind::Closed,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

pub type Result<T> = std::result::Result<T, GpkgError>;
