//! GeoJSON encoder.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use geoconv_types::geometry::close_ring;
use geoconv_types::{Coord, Feature, FeatureCollection, Geometry};
use geojson::{JsonObject, LineStringType, PolygonType, Position, Value};

use crate::error::GeoconvError;

fn convert_position(c: &Coord) -> Position {
    c.to_vec()
}

fn convert_line(line: &[Coord]) -> LineStringType {
    line.iter().map(convert_position).collect()
}

fn convert_polygon(rings: &[Vec<Coord>]) -> PolygonType {
    rings
        .iter()
        .map(|ring| {
            let mut ring = ring.clone();
            close_ring(&mut ring);
            convert_line(&ring)
        })
        .collect()
}

/// Converts a geometry into a GeoJSON geometry. Polygon rings are closed.
pub fn convert_geometry(geometry: &Geometry) -> geojson::Geometry {
    let value = match geometry {
        Geometry::Point(c) => Value::Point(convert_position(c)),
        Geometry::LineString(line) => Value::LineString(convert_line(line)),
        Geometry::Polygon(rings) => Value::Polygon(convert_polygon(rings)),
        Geometry::MultiPoint(points) => Value::MultiPoint(convert_line(points)),
        Geometry::MultiLineString(lines) => {
            Value::MultiLineString(lines.iter().map(|line| convert_line(line)).collect())
        }
        Geometry::MultiPolygon(polygons) => Value::MultiPolygon(
            polygons
                .iter()
                .map(|rings| convert_polygon(rings))
                .collect(),
        ),
    };

    geojson::Geometry::new(value)
}

fn convert_feature(feature: &Feature) -> Result<geojson::Feature, GeoconvError> {
    let properties = match serde_json::to_value(&feature.attributes)? {
        serde_json::Value::Object(map) => map,
        _ => JsonObject::new(),
    };

    Ok(geojson::Feature {
        bbox: None,
        geometry: Some(convert_geometry(&feature.geometry)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    })
}

/// Converts the collection into a GeoJSON feature collection. Every attribute becomes a property.
pub fn to_geojson(collection: &FeatureCollection) -> Result<geojson::FeatureCollection, GeoconvError> {
    Ok(geojson::FeatureCollection {
        bbox: None,
        features: collection
            .iter()
            .map(convert_feature)
            .collect::<Result<_, _>>()?,
        foreign_members: None,
    })
}

/// Writes the collection into a GeoJSON file.
pub fn write_geojson(
    collection: &FeatureCollection,
    path: impl AsRef<Path>,
) -> Result<(), GeoconvError> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &to_geojson(collection)?)?;
    writer.flush()?;

    log::info!("wrote {} features to {}", collection.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoconv_types::FeatureKind;
    use serde_json::json;

    #[test]
    fn properties_and_closed_rings() {
        let collection: FeatureCollection = vec![
            Feature::new(Coord::xyz(-78.5, -0.2, 2800.0), FeatureKind::Point)
                .with_layer("SURVEY")
                .with_name("BM-1")
                .with_attr("cota", 2800.0),
            Feature::new(
                Geometry::Polygon(vec![vec![
                    Coord::xy(0.0, 0.0),
                    Coord::xy(1.0, 0.0),
                    Coord::xy(1.0, 1.0),
                ]]),
                FeatureKind::Polygon,
            ),
        ]
        .into();

        let geojson = to_geojson(&collection).expect("encoded");
        let value = serde_json::to_value(&geojson).expect("serialized");

        assert_eq!(value["type"], json!("FeatureCollection"));
        let point = &value["features"][0];
        assert_eq!(point["geometry"]["coordinates"], json!([-78.5, -0.2, 2800.0]));
        assert_eq!(point["properties"]["type"], json!("point"));
        assert_eq!(point["properties"]["layer"], json!("SURVEY"));
        assert_eq!(point["properties"]["name"], json!("BM-1"));
        assert_eq!(point["properties"]["cota"], json!(2800.0));

        let ring = &value["features"][1]["geometry"]["coordinates"][0];
        assert_eq!(ring.as_array().map(Vec::len), Some(4));
        assert_eq!(ring[0], ring[3]);
    }
}
