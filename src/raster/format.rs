use crate::crs::Crs;
use crate::error::{GpkgError, Result};
use crate::types::Envelope;
use std::io::Write;

/// What the raster manager needs to know about a raster to catalog it.
pub trait RasterSource {
    /// Default table name for the dataset.
    fn name(&self) -> Option<&str>;
    fn crs(&self) -> Option<&Crs>;
    fn envelope(&self) -> Option<Envelope>;
}

/// Pluggable codec turning rasters into the single stored blob and back.
pub trait RasterFormat {
    type Raster: RasterSource;

    fn write(&self, raster: &Self::Raster, out: &mut dyn Write) -> Result<()>;

    fn read(&self, bytes: Vec<u8>) -> Result<Self::Raster>;

    /// Recorded in the raster column metadata when the entry has none.
    fn mime_type(&self) -> Option<&str> {
        None
    }
}

/// An in-memory grid of interleaved 8-bit band samples.
#[derive(Clone, Debug, PartialEq)]
pub struct GridCoverage {
    pub name: Option<String>,
    pub crs: Option<Crs>,
    pub envelope: Envelope,
    pub width: u32,
    pub height: u32,
    pub bands: u8,
    pub pixels: Vec<u8>,
}

impl GridCoverage {
    pub fn new(envelope: Envelope, width: u32, height: u32, bands: u8, pixels: Vec<u8>) -> Self {
        Self {
            name: None,
            crs: None,
            envelope,
            width,
            height,
            bands,
            pixels,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    /// Number of samples the dimensions call for; `Codec` when it does not
    /// fit in memory.
    fn expected_len(&self) -> Result<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|n| n.checked_mul(self.bands as usize))
            .ok_or_else(|| {
                GpkgError::Codec(format!(
                    "grid of {}x{}x{} is too large",
                    self.width, self.height, self.bands
                ))
            })
    }
}

impl RasterSource for GridCoverage {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    fn envelope(&self) -> Option<Envelope> {
        let mut envelope = self.envelope.clone();
        if envelope.crs.is_none() {
            envelope.crs = self.crs.clone();
        }
        Some(envelope)
    }
}

const GRID_MAGIC: &[u8; 4] = b"GRD1";
// magic, width, height, bands, 4 envelope doubles
const GRID_HEADER_LEN: usize = 4 + 4 + 4 + 1 + 32;

/// Uncompressed little-endian encoding of a [`GridCoverage`].
///
/// The envelope travels with the pixels; name and CRS do not.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawGridFormat;

impl RasterFormat for RawGridFormat {
    type Raster = GridCoverage;

    fn write(&self, raster: &GridCoverage, out: &mut dyn Write) -> Result<()> {
        let expected = raster.expected_len()?;
        if raster.pixels.len() != expected {
            return Err(GpkgError::Codec(format!(
                "grid of {}x{}x{} needs {expected} samples, got {}",
                raster.width,
                raster.height,
                raster.bands,
                raster.pixels.len()
            )));
        }
        out.write_all(GRID_MAGIC)?;
        out.write_all(&raster.width.to_le_bytes())?;
        out.write_all(&raster.height.to_le_bytes())?;
        out.write_all(&[raster.bands])?;
        let env = &raster.envelope;
        for v in [env.min_x, env.min_y, env.max_x, env.max_y] {
            out.write_all(&v.to_le_bytes())?;
        }
        out.write_all(&raster.pixels)?;
        Ok(())
    }

    fn read(&self, mut bytes: Vec<u8>) -> Result<GridCoverage> {
        if bytes.len() < GRID_HEADER_LEN || &bytes[..4] != GRID_MAGIC {
            return Err(GpkgError::Codec("not a raw grid blob".to_string()));
        }
        let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let f64_at = |at: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[at..at + 8]);
            f64::from_le_bytes(buf)
        };
        let width = u32_at(4);
        let height = u32_at(8);
        let bands = bytes[12];
        let envelope = Envelope::new(f64_at(13), f64_at(21), f64_at(29), f64_at(37));

        let pixels = bytes.split_off(GRID_HEADER_LEN);
        let grid = GridCoverage::new(envelope, width, height, bands, pixels);
        let expected = grid.expected_len()?;
        if grid.pixels.len() != expected {
            return Err(GpkgError::Codec(format!(
                "truncated grid: expected {expected} samples, got {}",
                grid.pixels.len()
            )));
        }
        Ok(grid)
    }

    fn mime_type(&self) -> Option<&str> {
        Some("application/octet-stream")
    }
}
