use geopkg_store::{
    ColumnType, Crs, Envelope, Feature, FeatureEntry, FeatureSchema, GeometryType, Gpkg,
    GridCoverage, MemoryFeatureCollection, RasterEntry, RawGridFormat, Tile, TileEntry,
    TileMatrix,
};
use std::f64::consts::PI;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wkt::Wkt;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("write_gpkg failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .ok_or("Usage: write_gpkg <output.gpkg>")?;
    let gpkg = Gpkg::create(path)?;
    let wgs84 = Crs::epsg(4326).ok_or("EPSG:4326 is built in")?;

    let schema = Arc::new(
        FeatureSchema::builder("stars")
            .crs(wgs84.clone())
            .geometry("geom", GeometryType::Polygon)
            .column("name", ColumnType::Varchar)
            .column("region", ColumnType::Varchar)
            .column("center_lat", ColumnType::Double)
            .column("center_lon", ColumnType::Double)
            .column("points", ColumnType::Integer)
            .build()?,
    );

    let mut stars = MemoryFeatureCollection::new(schema.clone());
    for (name, region, (lon, lat), outer, inner) in [
        ("Tokyo Star", "Tokyo", (139.767, 35.681), 1.4, 0.6),
        ("Hokkaido Star", "Hokkaido", (141.3468, 43.0642), 2.2, 0.9),
    ] {
        let mut feature = Feature::new(schema.clone());
        feature.set_geometry(&star_polygon_wkt(lon, lat, outer, inner, 5)?)?;
        feature.set("name", name)?;
        feature.set("region", region)?;
        feature.set("center_lat", lat)?;
        feature.set("center_lon", lon)?;
        feature.set("points", 5_i64)?;
        stars.push(feature)?;
    }
    // Bounds and SRID are derived from the collection.
    let mut entry = FeatureEntry::default();
    gpkg.features().add(&mut entry, &stars)?;

    let mut pyramid = TileEntry::new("world_tiles")
        .with_bounds(Envelope::new(-180.0, -90.0, 180.0, 90.0).with_crs(wgs84.clone()));
    for zoom in 0..3 {
        let size = 1 << zoom;
        let pixel = 360.0 / (256.0 * size as f64);
        pyramid
            .content
            .tile_matrices
            .push(TileMatrix::new(zoom, size, size, 256, 256, pixel, pixel));
    }
    gpkg.tiles().create(&mut pyramid)?;
    for zoom in 0..3 {
        let size = 1 << zoom;
        for column in 0..size {
            for row in 0..size {
                let tile = Tile::new(zoom, column, row, vec![zoom as u8, column as u8, row as u8]);
                gpkg.tiles().add(&pyramid, &tile)?;
            }
        }
    }

    let gradient = (0..64 * 32).map(|i| (i % 256) as u8).collect();
    let grid = GridCoverage::new(Envelope::new(139.0, 35.0, 141.0, 36.0), 64, 32, 1, gradient)
        .with_name("kanto_gradient")
        .with_crs(wgs84);
    gpkg.rasters()
        .add(&mut RasterEntry::default(), &grid, &RawGridFormat)?;

    Ok(())
}

fn star_polygon_wkt(
    center_lon: f64,
    center_lat: f64,
    outer_radius: f64,
    inner_radius: f64,
    points: usize,
) -> Result<Wkt<f64>, Box<dyn std::error::Error>> {
    let total_vertices = points * 2;
    let start_angle = -PI / 2.0;

    let mut coords = Vec::with_capacity(total_vertices + 1);
    for i in 0..total_vertices {
        let radius = if i % 2 == 0 {
            outer_radius
        } else {
            inner_radius
        };
        let angle = start_angle + (i as f64) * (2.0 * PI / total_vertices as f64);
        coords.push((center_lon + radius * angle.cos(), center_lat + radius * angle.sin()));
    }
    if let Some(first) = coords.first().copied() {
        coords.push(first);
    }

    let ring = coords
        .iter()
        .map(|(lon, lat)| format!("{lon} {lat}"))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(Wkt::from_str(&format!("POLYGON (({ring}))"))?)
}
