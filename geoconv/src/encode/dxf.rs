//! DXF encoder.
//!
//! Output drawings have three layers: points, lines (polylines and polygon rings) and texts. Their names, colours
//! and line style come from [`DxfStyle`].

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use dxf::entities::{Entity, EntityType, LwPolyline, ModelPoint, Text};
use dxf::enums::AcadVersion;
use dxf::tables::{Layer, LineType};
use dxf::{Color, Drawing, LineWeight, LwPolylineVertex, Point};
use geoconv_types::collection::is_valid_lonlat;
use geoconv_types::geo::{Crs, Reprojector, SpatialReference};
use geoconv_types::geometry::close_ring;
use geoconv_types::{Coord, Feature, FeatureCollection, FeatureKind, Geometry};

use crate::config::DxfStyle;
use crate::encode::Artifact;
use crate::error::GeoconvError;

const CONTINUOUS: &str = "CONTINUOUS";

/// Writes the collection into a DXF drawing.
///
/// CAD drawings are expected in projected units. If every coordinate of the collection looks like a longitude and
/// latitude pair, the collection is reprojected from WGS 84 into `projected_crs` first. Fails if that is needed but
/// no projected CRS is given.
///
/// Returns the number of written entities.
pub fn write_dxf(
    collection: &FeatureCollection,
    path: impl AsRef<Path>,
    style: &DxfStyle,
    projected_crs: Option<Crs>,
) -> Result<usize, GeoconvError> {
    let path = path.as_ref();
    let reprojected;
    let collection = if looks_geographic(collection) {
        let target = projected_crs.filter(|crs| !crs.is_geographic()).ok_or_else(|| {
            GeoconvError::encode(
                Artifact::Dxf,
                "coordinates are geographic and no projected CRS is configured",
            )
        })?;
        log::warn!("DXF output has geographic coordinates, reprojecting them into {target}");

        let reprojector = Reprojector::new(&SpatialReference::new(Crs::EPSG4326, target))
            .map_err(|err| GeoconvError::encode(Artifact::Dxf, err.to_string()))?;
        reprojected = reprojector
            .reproject(collection.clone())
            .map_err(|err| GeoconvError::encode(Artifact::Dxf, err.to_string()))?;
        &reprojected
    } else {
        collection
    };

    let drawing = build_drawing(collection, style);
    let count = drawing.entities().count();

    let mut writer = BufWriter::new(File::create(path)?);
    drawing.save(&mut writer)?;
    writer.flush()?;

    log::info!("wrote {count} DXF entities to {}", path.display());
    Ok(count)
}

fn looks_geographic(collection: &FeatureCollection) -> bool {
    let mut coords = collection.coords().peekable();
    coords.peek().is_some() && coords.all(is_valid_lonlat)
}

fn layer(name: &str, color: u8, style: &DxfStyle) -> Layer {
    let mut layer = Layer::default();
    layer.name = name.to_string();
    layer.color = Color::from_index(color);
    layer.line_type_name = style.line_type.clone();
    layer.line_weight = LineWeight::from_raw_value(style.line_width);
    layer
}

/// Builds the drawing without touching the file system.
pub fn build_drawing(collection: &FeatureCollection, style: &DxfStyle) -> Drawing {
    let mut drawing = Drawing::new();
    drawing.header.version = AcadVersion::R2000;

    if !style.line_type.eq_ignore_ascii_case(CONTINUOUS)
        && !drawing.line_types().any(|lt| lt.name == style.line_type)
    {
        let mut line_type = LineType::default();
        line_type.name = style.line_type.clone();
        drawing.add_line_type(line_type);
    }

    let names = &style.layer_names;
    drawing.add_layer(layer(&names.points, style.point_color, style));
    drawing.add_layer(layer(&names.lines, style.line_color, style));
    drawing.add_layer(layer(&names.texts, style.text_color, style));

    for feature in collection {
        for entity_type in entities(feature, style) {
            let layer = match &entity_type {
                EntityType::ModelPoint(_) => &names.points,
                EntityType::Text(_) => &names.texts,
                _ => &names.lines,
            };
            let mut entity = Entity::new(entity_type);
            entity.common.layer = layer.clone();
            drawing.add_entity(entity);
        }
    }

    drawing
}

fn point(c: &Coord) -> Point {
    Point::new(c.x, c.y, c.z.unwrap_or_default())
}

fn polyline(coords: &[Coord], closed: bool) -> EntityType {
    let mut polyline = LwPolyline::default();
    polyline.elevation = coords.first().and_then(|c| c.z).unwrap_or_default();
    polyline.vertices = coords
        .iter()
        .map(|c| LwPolylineVertex {
            x: c.x,
            y: c.y,
            ..Default::default()
        })
        .collect();
    if closed {
        polyline.flags |= 1;
    }

    EntityType::LwPolyline(polyline)
}

/// Closed polyline without the duplicated closing vertex, which is implied by the closed flag.
fn ring(ring: &[Coord]) -> EntityType {
    let mut ring = ring.to_vec();
    close_ring(&mut ring);
    ring.pop();
    polyline(&ring, true)
}

fn entities(feature: &Feature, style: &DxfStyle) -> Vec<EntityType> {
    let mut result = vec![];

    if feature.kind() != FeatureKind::Text {
        match &feature.geometry {
            Geometry::Point(c) => result.push(EntityType::ModelPoint(ModelPoint::new(point(c)))),
            Geometry::MultiPoint(points) => result.extend(
                points
                    .iter()
                    .map(|c| EntityType::ModelPoint(ModelPoint::new(point(c)))),
            ),
            Geometry::LineString(line) => result.push(polyline(line, false)),
            Geometry::MultiLineString(lines) => {
                result.extend(lines.iter().map(|line| polyline(line, false)))
            }
            Geometry::Polygon(rings) => result.extend(rings.iter().map(|r| ring(r))),
            Geometry::MultiPolygon(polygons) => {
                result.extend(polygons.iter().flatten().map(|r| ring(r)))
            }
        }
    }

    if let (Some(value), Some(anchor)) = (&feature.attributes.text, feature.geometry.coords().next()) {
        let offset = style.text_offset;
        let mut text = Text::default();
        text.location = Point::new(
            anchor.x + offset.dx,
            anchor.y + offset.dy,
            anchor.z.unwrap_or_default(),
        );
        text.text_height = style.text_height;
        text.value = value.clone();
        text.rotation = feature.attributes.rotation.unwrap_or_default();
        result.push(EntityType::Text(text));
    }

    result
}
