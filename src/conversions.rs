use crate::error::{GpkgError, Result};
use crate::types::{ColumnType, GeometryType};
use chrono::{DateTime, NaiveDateTime, Utc};

// cf. https://www.geopackage.org/spec140/index.html#_contents
const LAST_CHANGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";
const LAST_CHANGE_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

#[inline]
pub(crate) fn geometry_type_to_str(geometry_type: GeometryType) -> &'static str {
    match geometry_type {
        GeometryType::Geometry => "GEOMETRY",
        GeometryType::Point => "POINT",
        GeometryType::LineString => "LINESTRING",
        GeometryType::Polygon => "POLYGON",
        GeometryType::MultiPoint => "MULTIPOINT",
        GeometryType::MultiLineString => "MULTILINESTRING",
        GeometryType::MultiPolygon => "MULTIPOLYGON",
        GeometryType::GeometryCollection => "GEOMETRYCOLLECTION",
    }
}

#[inline]
pub(crate) fn geometry_type_from_str(geometry_type_str: &str) -> Result<GeometryType> {
    let s = geometry_type_str;
    if s.eq_ignore_ascii_case("GEOMETRY") {
        Ok(GeometryType::Geometry)
    } else if s.eq_ignore_ascii_case("POINT") {
        Ok(GeometryType::Point)
    } else if s.eq_ignore_ascii_case("LINESTRING") {
        Ok(GeometryType::LineString)
    } else if s.eq_ignore_ascii_case("POLYGON") {
        Ok(GeometryType::Polygon)
    } else if s.eq_ignore_ascii_case("MULTIPOINT") {
        Ok(GeometryType::MultiPoint)
    } else if s.eq_ignore_ascii_case("MULTILINESTRING") {
        Ok(GeometryType::MultiLineString)
    } else if s.eq_ignore_ascii_case("MULTIPOLYGON") {
        Ok(GeometryType::MultiPolygon)
    } else if s.eq_ignore_ascii_case("GEOMETRYCOLLECTION") {
        Ok(GeometryType::GeometryCollection)
    } else {
        Err(GpkgError::UnsupportedGeometryType(
            geometry_type_str.to_string(),
        ))
    }
}

#[inline]
pub(crate) fn column_type_to_str(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Integer => "INTEGER",
        ColumnType::Double => "DOUBLE",
        ColumnType::Varchar => "TEXT",
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::Blob => "BLOB",
        ColumnType::Geometry(geometry_type) => geometry_type_to_str(geometry_type),
    }
}

#[inline]
pub(crate) fn column_type_from_str(column_type_str: &str) -> Option<ColumnType> {
    let s = column_type_str;
    if s.eq_ignore_ascii_case("TINYINT")
        || s.eq_ignore_ascii_case("SMALLINT")
        || s.eq_ignore_ascii_case("MEDIUMINT")
        || s.eq_ignore_ascii_case("INT")
        || s.eq_ignore_ascii_case("INTEGER")
    {
        Some(ColumnType::Integer)
    } else if s.eq_ignore_ascii_case("DOUBLE")
        || s.eq_ignore_ascii_case("FLOAT")
        || s.eq_ignore_ascii_case("REAL")
    {
        Some(ColumnType::Double)
    } else if s.eq_ignore_ascii_case("TEXT") || s.eq_ignore_ascii_case("DATETIME") {
        Some(ColumnType::Varchar)
    } else if s.eq_ignore_ascii_case("BOOLEAN") {
        Some(ColumnType::Boolean)
    } else if s.eq_ignore_ascii_case("BLOB") {
        Some(ColumnType::Blob)
    } else {
        // cf. https://www.geopackage.org/spec140/index.html#geometry_types
        geometry_type_from_str(s).ok().map(ColumnType::Geometry)
    }
}

pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(LAST_CHANGE_FORMAT).to_string()
}

pub(crate) fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, LAST_CHANGE_PARSE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| GpkgError::InvalidTimestamp(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn geometry_type_names_roundtrip() -> Result<()> {
        for geometry_type in [
            GeometryType::Geometry,
            GeometryType::Point,
            GeometryType::LineString,
            GeometryType::Polygon,
            GeometryType::MultiPoint,
            GeometryType::MultiLineString,
            GeometryType::MultiPolygon,
            GeometryType::GeometryCollection,
        ] {
            let name = geometry_type_to_str(geometry_type);
            assert_eq!(geometry_type_from_str(name)?, geometry_type);
        }
        assert!(geometry_type_from_str("CIRCULARSTRING").is_err());
        Ok(())
    }

    #[test]
    fn declared_types_map_to_column_types() {
        assert_eq!(column_type_from_str("int"), Some(ColumnType::Integer));
        assert_eq!(column_type_from_str("REAL"), Some(ColumnType::Double));
        assert_eq!(
            column_type_from_str("point"),
            Some(ColumnType::Geometry(GeometryType::Point))
        );
        assert_eq!(column_type_from_str("VARCHAR(12)"), None);
    }

    #[test]
    fn timestamps_use_utc_millisecond_format() -> Result<()> {
        let ts = Utc
            .with_ymd_and_hms(2024, 3, 9, 17, 5, 1)
            .single()
            .expect("valid date");
        let text = format_timestamp(&ts);
        assert_eq!(text, "2024-03-09T17:05:01.000Z");
        assert_eq!(parse_timestamp(&text)?, ts);
        assert_eq!(parse_timestamp("2024-03-09T17:05:01Z")?, ts);
        assert!(parse_timestamp("yesterday").is_err());
        Ok(())
    }
}
