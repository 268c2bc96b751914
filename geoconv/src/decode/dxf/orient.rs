//! Rotation of texts along the nearest polyline.

use std::collections::HashMap;

use geoconv_types::{Coord, FeatureCollection, FeatureKind, Geometry, Segment};

fn line_parts(geometry: &Geometry) -> Vec<&[Coord]> {
    match geometry {
        Geometry::LineString(line) => vec![line.as_slice()],
        Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
            rings.iter().map(Vec::as_slice).collect()
        }
        Geometry::MultiPolygon(polygons) => polygons.iter().flatten().map(Vec::as_slice).collect(),
        Geometry::Point(_) | Geometry::MultiPoint(_) => vec![],
    }
}

/// Gives texts without rotation the direction of the nearest segment on the same layer.
///
/// Only segments closer than `max_distance` are considered. The angle is normalized so the text is never upside
/// down. Returns the number of rotated texts.
pub fn orient_texts(collection: &mut FeatureCollection, max_distance: f64) -> usize {
    let mut lines_by_layer: HashMap<String, Vec<Vec<Coord>>> = HashMap::new();
    for feature in collection.iter() {
        if feature.kind() == FeatureKind::Text {
            continue;
        }
        let parts = line_parts(&feature.geometry);
        if !parts.is_empty() {
            lines_by_layer
                .entry(feature.layer().to_string())
                .or_default()
                .extend(parts.into_iter().map(<[Coord]>::to_vec));
        }
    }

    let max_distance_sq = max_distance * max_distance;
    let mut rotated = 0;

    for feature in collection.features_mut() {
        if feature.kind() != FeatureKind::Text
            || feature.attributes.rotation.is_some_and(|r| r != 0.0)
        {
            continue;
        }
        let Geometry::Point(anchor) = &feature.geometry else {
            continue;
        };
        let Some(lines) = lines_by_layer.get(feature.layer()) else {
            continue;
        };

        let nearest = lines
            .iter()
            .flat_map(|line| Segment::chain(line))
            .map(|segment| (segment.distance_to_point_sq(anchor), segment))
            .filter(|(distance, _)| *distance < max_distance_sq)
            .min_by(|a, b| a.0.total_cmp(&b.0));

        if let Some((_, segment)) = nearest {
            feature.attributes.rotation = Some(segment.readable_angle());
            rotated += 1;
        }
    }

    rotated
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use geoconv_types::Feature;

    fn text(x: f64, y: f64, layer: &str) -> Feature {
        Feature::new(Coord::xy(x, y), FeatureKind::Text)
            .with_layer(layer)
            .with_text("label")
            .with_rotation(0.0)
    }

    #[test]
    fn rotates_along_nearby_segment() {
        let mut collection: FeatureCollection = vec![
            Feature::new(
                Geometry::LineString(vec![Coord::xy(0.0, 0.0), Coord::xy(-10.0, -10.0)]),
                FeatureKind::Polyline,
            )
            .with_layer("ROAD"),
            text(-5.0, -4.0, "ROAD"),
            text(-5.0, -4.0, "OTHER"),
            text(100.0, 100.0, "ROAD"),
        ]
        .into();

        assert_eq!(orient_texts(&mut collection, 5.0), 1);
        let features = collection.features();
        assert_abs_diff_eq!(
            features[1].attributes.rotation.unwrap_or_default(),
            45.0,
            epsilon = 1e-9
        );
        assert_eq!(features[2].attributes.rotation, Some(0.0));
        assert_eq!(features[3].attributes.rotation, Some(0.0));
    }

    #[test]
    fn keeps_explicit_rotation() {
        let mut collection: FeatureCollection = vec![
            Feature::new(
                Geometry::LineString(vec![Coord::xy(0.0, 0.0), Coord::xy(10.0, 0.0)]),
                FeatureKind::Line,
            ),
            text(5.0, 1.0, "default").with_rotation(30.0),
        ]
        .into();

        assert_eq!(orient_texts(&mut collection, 5.0), 0);
        assert_eq!(collection.features()[1].attributes.rotation, Some(30.0));
    }
}
