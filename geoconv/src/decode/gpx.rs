//! GPX decoder.

use geoconv_types::{Coord, Feature, FeatureCollection, FeatureKind, Geometry};
use gpx::Waypoint;

use crate::decode::{Decoded, InputFormat};
use crate::diagnostics::Diagnostics;
use crate::error::GeoconvError;

fn coord(waypoint: &Waypoint) -> Coord {
    let point = waypoint.point();
    match waypoint.elevation {
        Some(elevation) => Coord::xyz(point.x(), point.y(), elevation),
        None => Coord::xy(point.x(), point.y()),
    }
}

fn line(
    points: &[Waypoint],
    kind: FeatureKind,
    layer: &str,
    name: Option<&String>,
) -> Option<Feature> {
    if points.len() < 2 {
        return None;
    }

    let mut feature =
        Feature::new(Geometry::LineString(points.iter().map(coord).collect()), kind).with_layer(layer);
    if let Some(name) = name {
        feature = feature.with_name(name.clone());
    }

    Some(feature)
}

/// Decodes a GPX document.
///
/// Waypoints become points on the `waypoints` layer, every track segment becomes a line on the `tracks` layer and
/// every route a line on the `routes` layer. Segments and routes with fewer than 2 points are dropped.
pub fn decode_gpx(bytes: &[u8]) -> Result<Decoded, GeoconvError> {
    let gpx = gpx::read(bytes).map_err(|err| GeoconvError::decode(InputFormat::Gpx, err.to_string()))?;

    let mut collection = FeatureCollection::new();
    let mut diagnostics = Diagnostics::new();

    for waypoint in &gpx.waypoints {
        let mut feature = Feature::new(coord(waypoint), FeatureKind::Point).with_layer("waypoints");
        if let Some(name) = &waypoint.name {
            feature = feature.with_name(name.clone());
        }
        if let Some(description) = &waypoint.description {
            feature = feature.with_attr("description", description.clone());
        }
        collection.push(feature);
    }

    for track in &gpx.tracks {
        for (index, segment) in track.segments.iter().enumerate() {
            match line(&segment.points, FeatureKind::Track, "tracks", track.name.as_ref()) {
                Some(feature) => collection.push(feature.with_attr("segment", index as i64)),
                None => diagnostics.skip(
                    "track",
                    format!(
                        "segment {index} of {} has {} points",
                        track.name.as_deref().unwrap_or("unnamed track"),
                        segment.points.len()
                    ),
                ),
            }
        }
    }

    for route in &gpx.routes {
        match line(&route.points, FeatureKind::Route, "routes", route.name.as_ref()) {
            Some(feature) => collection.push(feature),
            None => diagnostics.skip(
                "route",
                format!(
                    "{} has {} points",
                    route.name.as_deref().unwrap_or("unnamed route"),
                    route.points.len()
                ),
            ),
        }
    }

    log::info!(
        "decoded {} waypoints, {} tracks and {} routes",
        gpx.waypoints.len(),
        gpx.tracks.len(),
        gpx.routes.len()
    );

    Ok(Decoded {
        collection,
        diagnostics,
    })
}
