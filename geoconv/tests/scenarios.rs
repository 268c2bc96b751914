use std::io::Write;

use geoconv::config::{ConversionConfig, TabularMode};
use geoconv::decode::dxf::DxfDecodeOptions;
use geoconv::decode::{self, InputFormat};
use geoconv::encode::{self, Artifact};
use geoconv::heatmap;
use geoconv::{GeoconvError, Pipeline};
use geoconv_types::geo::{Crs, Reprojector, SpatialReference};
use geoconv_types::geometry::is_ring_closed;
use geoconv_types::{Coord, Feature, FeatureCollection, FeatureKind, Geometry, Grouping};
use proptest::prelude::*;
use zip::write::SimpleFileOptions;

#[test]
fn circle_is_closed_polyline_of_65_coordinates() {
    let drawing = "0\nSECTION\n2\nENTITIES\n0\nCIRCLE\n8\n0\n10\n0\n20\n0\n40\n5\n0\nENDSEC\n0\nEOF\n";
    let decoded =
        decode::dxf::decode(drawing.as_bytes(), &DxfDecodeOptions::default()).expect("decoded");

    let circle = &decoded.collection.features()[0];
    assert_eq!(circle.kind(), FeatureKind::Circle);
    let Geometry::LineString(coords) = &circle.geometry else {
        panic!("expected line string, got {:?}", circle.geometry);
    };
    assert_eq!(coords.len(), 65);
    assert_eq!(coords[0], coords[64]);
    for c in coords {
        assert!((c.x.hypot(c.y) - 5.0).abs() < 1e-9);
    }
}

#[test]
fn kmz_with_points_and_line() {
    let kml = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2"><Document>
  <Placemark><name>A</name><Point><coordinates>-78.5,-0.2</coordinates></Point></Placemark>
  <Placemark><name>B</name><Point><coordinates>-78.6,-0.3</coordinates></Point></Placemark>
  <Placemark><name>road</name><LineString><coordinates>
    -78.5,-0.2 -78.55,-0.25 -78.6,-0.3
  </coordinates></LineString></Placemark>
</Document></kml>"#;

    let mut buffer = std::io::Cursor::new(vec![]);
    {
        let mut zip = zip::ZipWriter::new(&mut buffer);
        zip.start_file("doc.kml", SimpleFileOptions::default())
            .expect("zip entry");
        zip.write_all(kml.as_bytes()).expect("zip content");
        zip.finish().expect("zip finished");
    }

    let decoded = decode::decode(
        buffer.get_ref(),
        InputFormat::Kmz,
        &ConversionConfig::default(),
    )
    .expect("decoded");
    let features = decoded.collection.features();

    assert_eq!(features.len(), 3);
    assert_eq!(
        features
            .iter()
            .filter(|f| f.kind() == FeatureKind::Point)
            .count(),
        2
    );
    assert_eq!(features[2].kind(), FeatureKind::Line);
    assert_eq!(features[2].geometry.coord_count(), 3);
}

#[test]
fn tabular_group_becomes_closed_polygon() {
    let config = ConversionConfig {
        tabular_mode: TabularMode::PointsAndPolylines,
        ..ConversionConfig::default()
    };
    let input = "1,0,0,10,A\n2,10,0,12,B\n3,10,10,11,C\n1,0,0,10,A\n";
    let decoded = decode::decode(input.as_bytes(), InputFormat::Tabular, &config).expect("decoded");

    let polygons: Vec<&Feature> = decoded
        .collection
        .iter()
        .filter(|f| f.kind() == FeatureKind::Polygon)
        .collect();
    assert_eq!(polygons.len(), 1);
    let Geometry::Polygon(rings) = &polygons[0].geometry else {
        panic!("expected polygon");
    };
    assert_eq!(rings[0].len(), 4);
    assert!(is_ring_closed(&rings[0]));

    assert_eq!(
        decoded
            .collection
            .iter()
            .filter(|f| f.kind() == FeatureKind::Point)
            .count(),
        3
    );
}

#[test]
fn heatmap_needs_three_points() {
    let points = [Coord::xyz(0.0, 0.0, 1.0), Coord::xyz(1.0, 1.0, 2.0)];
    let result = heatmap::generate(
        &points,
        Crs::EPSG4326,
        &ConversionConfig::default().heatmap,
    );
    assert!(matches!(
        result,
        Err(GeoconvError::InsufficientPoints { found: 2 })
    ));

    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = ConversionConfig::default();
    config.heatmap.enabled = true;
    let report = Pipeline::new(config)
        .expect("valid config")
        .with_artifacts(&[Artifact::GeoTiff])
        .convert(
            b"1 0 0 1 A\n2 1 1 2 B\n",
            InputFormat::Tabular,
            dir.path(),
            "two",
        )
        .expect("converted");

    let geotiff = report.artifact(Artifact::GeoTiff).expect("requested");
    assert!(matches!(
        geotiff.result,
        Err(GeoconvError::InsufficientPoints { found: 2 })
    ));
    assert!(!geotiff.path.exists());
}

#[test]
fn shapefile_writers_grouped_by_type() {
    let mut features: Vec<Feature> = (0..5)
        .map(|i| Feature::new(Coord::xy(f64::from(i), 0.0), FeatureKind::Point))
        .collect();
    for i in 0..2 {
        features.push(Feature::new(
            Geometry::LineString(vec![
                Coord::xy(0.0, f64::from(i)),
                Coord::xy(10.0, f64::from(i)),
            ]),
            FeatureKind::Line,
        ));
    }
    let collection = FeatureCollection::from(features);

    let dir = tempfile::tempdir().expect("temp dir");
    let summaries = encode::shapefile::write_shapefiles(
        &collection,
        dir.path(),
        Grouping::Type,
        &Crs::EPSG4326,
    )
    .expect("written");

    let counts: Vec<(&str, usize, usize)> = summaries
        .iter()
        .map(|s| (s.stem.as_str(), s.shapes, s.records))
        .collect();
    assert_eq!(counts, vec![("points", 5, 5), ("lines", 2, 2)]);

    let mut reader = shapefile::Reader::from_path(dir.path().join("points.shp")).expect("reader");
    let records = reader.read().expect("records");
    assert_eq!(records.len(), 5);
}

fn open_polygon() -> FeatureCollection {
    vec![Feature::new(
        Geometry::Polygon(vec![
            vec![
                Coord::xy(-78.0, -1.0),
                Coord::xy(-77.0, -1.0),
                Coord::xy(-77.0, 0.0),
                Coord::xy(-78.0, 0.0),
            ],
            vec![
                Coord::xy(-77.8, -0.8),
                Coord::xy(-77.2, -0.8),
                Coord::xy(-77.2, -0.2),
            ],
        ]),
        FeatureKind::Polygon,
    )]
    .into()
}

#[test]
fn encoders_close_polygon_rings() {
    let collection = open_polygon();

    let geojson = serde_json::to_value(encode::geojson::to_geojson(&collection).expect("geojson"))
        .expect("json");
    for ring in geojson["features"][0]["geometry"]["coordinates"]
        .as_array()
        .expect("rings")
    {
        let ring = ring.as_array().expect("ring");
        assert_eq!(ring.first(), ring.last());
    }

    let kml = encode::kml::to_kml(&collection, "rings", None).expect("kml");
    let decoded = decode::kml::decode_kml(&kml).expect("decoded");
    let Geometry::Polygon(rings) = &decoded.collection.features()[0].geometry else {
        panic!("expected polygon");
    };
    assert_eq!(rings.len(), 2);
    assert!(rings.iter().all(|ring| is_ring_closed(ring)));

    let dir = tempfile::tempdir().expect("temp dir");
    encode::shapefile::write_shapefiles(&collection, dir.path(), Grouping::Layer, &Crs::EPSG4326)
        .expect("written");
    let shapes = shapefile::ShapeReader::from_path(dir.path().join("default.shp"))
        .expect("reader")
        .read()
        .expect("shapes");
    let shapefile::Shape::Polygon(polygon) = &shapes[0] else {
        panic!("expected polygon shape");
    };
    for ring in polygon.rings() {
        let points = ring.points();
        assert_eq!(points.first(), points.last());
    }
}

#[test]
fn raster_origin_is_north_west_corner() {
    let points = [
        Coord::xyz(500000.0, 9800000.0, 10.0),
        Coord::xyz(500200.0, 9800000.0, 12.0),
        Coord::xyz(500100.0, 9800300.0, 15.0),
    ];
    let mut config = ConversionConfig::default().heatmap;
    config.margin_percent = 10.0;
    config.resolution = 50;

    let crs = Crs::from_epsg(32717).expect("supported");
    let grid = heatmap::generate(&points, crs, &config).expect("grid");

    let corner = grid.pixel_to_world(0.0, 0.0);
    let bounds = grid.bounds();
    assert!((corner.x - 499980.0).abs() < 1e-6);
    assert!((corner.y - 9800330.0).abs() < 1e-6);
    assert_eq!((corner.x, corner.y), (bounds.x_min, bounds.y_max));
    assert!(grid.pixel_size.1 < 0.0);

    // the northernmost input point lands in the top rows
    let has_data = |row: usize| (0..50).any(|col| grid.value(row, col).is_some_and(|v| !v.is_nan()));
    assert!((0..10).any(has_data));
    assert!(grid.value(0, 0).is_some_and(f32::is_nan));
}

proptest! {
    #[test]
    fn reprojection_keeps_lonlat_order(lon in -80.9..-75.1f64, lat in -9.9..-0.1f64) {
        let to_utm = Reprojector::new(&SpatialReference::parse("EPSG:4326", "EPSG:32717").expect("codes"))
            .expect("reprojector");
        let back = Reprojector::new(&SpatialReference::parse("EPSG:32717", "EPSG:4326").expect("codes"))
            .expect("reprojector");

        let projected = to_utm.transform(&Coord::lonlat(lon, lat)).expect("projected");
        let c = back.transform(&projected).expect("unprojected");

        prop_assert!((c.x - lon).abs() < 1e-6, "{} != {}", c.x, lon);
        prop_assert!((c.y - lat).abs() < 1e-6, "{} != {}", c.y, lat);
    }
}
