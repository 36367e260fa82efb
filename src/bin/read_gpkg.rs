use geopkg_store::{Gpkg, RasterFormat, RawGridFormat, TileRange, Value};
use tracing_subscriber::EnvFilter;
use wkt::to_wkt::write_geometry;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("read_gpkg failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .ok_or("Usage: read_gpkg <path-to-gpkg>")?;
    let gpkg = Gpkg::open_read_only(path)?;
    let catalog = gpkg.catalog();

    for entry in catalog.contents()? {
        println!("{:?}: {}", entry.data_type(), entry.table_name());
    }

    for entry in catalog.features()? {
        println!("features: {} (srid {:?})", entry.name(), entry.srid);
        let reader = gpkg.features().reader(&entry, None, None)?;
        let schema = reader.schema().clone();
        let geometry_column = schema.geometry_column().map(|c| c.name.clone());

        for (row_idx, feature) in reader.enumerate() {
            let feature = feature?;
            let mut values = Vec::with_capacity(schema.columns().len());
            for column in schema.columns() {
                if Some(&column.name) == geometry_column.as_ref() {
                    let mut wkt = String::new();
                    match feature.geometry()? {
                        Some(geom) => write_geometry(&mut wkt, &geom)?,
                        None => wkt.push_str("NULL"),
                    }
                    values.push(format!("{}={wkt}", column.name));
                    continue;
                }
                let value = feature.get(&column.name).cloned().unwrap_or(Value::Null);
                values.push(format!("{}={}", column.name, format_value(&value)));
            }
            println!("  row {row_idx} (fid {:?}): {}", feature.id(), values.join(", "));
        }
    }

    for entry in catalog.rasters()? {
        let mime_type = entry.content.mime_type.as_deref().unwrap_or("unknown");
        println!("rasters: {} ({mime_type})", entry.name());
        if mime_type == RawGridFormat.mime_type().unwrap_or_default() {
            match gpkg.rasters().reader(&entry, &RawGridFormat) {
                Ok(Some(grid)) => println!(
                    "  {}x{} pixels, {} band(s)",
                    grid.width, grid.height, grid.bands
                ),
                Ok(None) => println!("  empty"),
                Err(err) => println!("  undecodable: {err}"),
            }
        }
    }

    for entry in catalog.tiles()? {
        println!("tiles: {}", entry.name());
        for matrix in &entry.content.tile_matrices {
            let mut reader = gpkg.tiles().reader(&entry, TileRange::zoom(matrix.zoom_level))?;
            let count = reader.by_ref().filter(Result::is_ok).count();
            reader.close();
            println!(
                "  zoom {}: {}x{} tiles of {}x{} px, {count} stored",
                matrix.zoom_level,
                matrix.matrix_width,
                matrix.matrix_height,
                matrix.tile_width,
                matrix.tile_height
            );
        }
    }

    Ok(())
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(value) => value.to_string(),
        Value::Real(value) => value.to_string(),
        Value::Text(value) => value.clone(),
        Value::Blob(value) | Value::Geometry(value) => format!("<{} bytes>", value.len()),
    }
}
