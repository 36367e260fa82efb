//! GeoPackage binary geometry blobs and envelope computation.
//!
//! Features carry plain WKB. On the way into storage the WKB is wrapped in
//! the GeoPackage header (magic, version, flags, SRID, XY envelope); on the
//! way out the header is stripped again.

use crate::error::{GpkgError, Result};
use crate::types::Envelope;
use geo_traits::{
    CoordTrait, GeometryCollectionTrait, GeometryTrait, LineStringTrait, MultiLineStringTrait,
    MultiPointTrait, MultiPolygonTrait, PointTrait, PolygonTrait,
};
use wkb::reader::Wkb;

const HEADER_LEN: usize = 8;
const FLAG_LITTLE_ENDIAN: u8 = 0b0000_0001;
const FLAG_ENVELOPE_XY: u8 = 0b0000_0010;
const FLAG_EMPTY: u8 = 0b0001_0000;

/// Encode any geometry into WKB.
pub(crate) fn wkb_from_geometry<G>(geometry: &G) -> Result<Vec<u8>>
where
    G: GeometryTrait<T = f64>,
{
    let mut buf = Vec::new();
    wkb::writer::write_geometry(&mut buf, geometry, &Default::default())?;
    Ok(buf)
}

/// Bounding box of a WKB geometry, `None` for empty geometries.
pub fn geometry_envelope(wkb: &[u8]) -> Result<Option<Envelope>> {
    let geometry = Wkb::try_new(wkb)?;
    Ok(bounds_from_geometry(&geometry))
}

// cf. https://www.geopackage.org/spec140/index.html#gpb_format
pub(crate) fn wkb_to_gpkg_geometry(wkb: &[u8], srs_id: i32) -> Result<Vec<u8>> {
    let envelope = geometry_envelope(wkb)?;

    let mut flags = FLAG_LITTLE_ENDIAN;
    flags |= match envelope {
        Some(_) => FLAG_ENVELOPE_XY,
        None => FLAG_EMPTY,
    };

    let mut geom = Vec::with_capacity(wkb.len() + HEADER_LEN + 32);
    geom.extend_from_slice(&[
        0x47u8, // magic
        0x50u8, // magic
        0x00u8, // version
        flags,
    ]);
    geom.extend_from_slice(&srs_id.to_le_bytes());
    if let Some(env) = envelope {
        for v in [env.min_x, env.max_x, env.min_y, env.max_y] {
            geom.extend_from_slice(&v.to_le_bytes());
        }
    }
    geom.extend_from_slice(wkb);

    Ok(geom)
}

/// Strip GeoPackage header and envelope bytes to access raw WKB.
pub(crate) fn gpkg_geometry_to_wkb(b: &[u8]) -> Result<&[u8]> {
    if b.len() < HEADER_LEN {
        return Err(GpkgError::InvalidGpkgGeometryLength {
            len: b.len(),
            minimum: HEADER_LEN,
        });
    }

    let flags = b[3];
    let envelope_size: usize = match flags & 0b00001110 {
        0b00000000 => 0,  // no envelope
        0b00000010 => 32, // envelope is [minx, maxx, miny, maxy], 32 bytes
        0b00000100 => 48, // envelope is [minx, maxx, miny, maxy, minz, maxz], 48 bytes
        0b00000110 => 48, // envelope is [minx, maxx, miny, maxy, minm, maxm], 48 bytes
        0b00001000 => 64, // envelope is [minx, maxx, miny, maxy, minz, maxz, minm, maxm], 64 bytes
        _ => return Err(GpkgError::InvalidGpkgGeometryFlags(flags)),
    };
    let offset = HEADER_LEN + envelope_size;
    if b.len() < offset {
        return Err(GpkgError::InvalidGpkgGeometryLength {
            len: b.len(),
            minimum: offset,
        });
    }

    Ok(&b[offset..])
}

fn bounds_from_geometry<G: GeometryTrait<T = f64>>(geom: &G) -> Option<Envelope> {
    use geo_traits::GeometryType as GeoType;

    let mut bounds: Option<Envelope> = None;
    match geom.as_type() {
        GeoType::Point(point) => {
            if let Some(coord) = point.coord() {
                add_coord(&mut bounds, &coord);
            }
        }
        GeoType::LineString(line) => add_line_string(&mut bounds, line),
        GeoType::Polygon(poly) => add_polygon(&mut bounds, poly),
        GeoType::MultiPoint(multi) => {
            for point in multi.points() {
                if let Some(coord) = point.coord() {
                    add_coord(&mut bounds, &coord);
                }
            }
        }
        GeoType::MultiLineString(multi) => {
            for line in multi.line_strings() {
                add_line_string(&mut bounds, &line);
            }
        }
        GeoType::MultiPolygon(multi) => {
            for poly in multi.polygons() {
                add_polygon(&mut bounds, &poly);
            }
        }
        GeoType::GeometryCollection(collection) => {
            for child in collection.geometries() {
                if let Some(child_bounds) = bounds_from_geometry(&child) {
                    merge_bounds(&mut bounds, child_bounds);
                }
            }
        }
        // Not produced by WKB.
        GeoType::Rect(_) | GeoType::Triangle(_) | GeoType::Line(_) => {}
    }

    bounds
}

fn add_polygon<P: PolygonTrait<T = f64>>(bounds: &mut Option<Envelope>, poly: &P) {
    if let Some(ring) = poly.exterior() {
        add_line_string(bounds, &ring);
    }
    for ring in poly.interiors() {
        add_line_string(bounds, &ring);
    }
}

fn add_line_string<L: LineStringTrait<T = f64>>(bounds: &mut Option<Envelope>, line: &L) {
    for coord in line.coords() {
        add_coord(bounds, &coord);
    }
}

fn add_coord<C: CoordTrait<T = f64>>(bounds: &mut Option<Envelope>, coord: &C) {
    let (x, y) = coord.x_y();
    merge_bounds(bounds, Envelope::new(x, y, x, y));
}

fn merge_bounds(bounds: &mut Option<Envelope>, other: Envelope) {
    match bounds {
        Some(existing) => existing.expand_to_include(&other),
        None => *bounds = Some(other),
    }
}
