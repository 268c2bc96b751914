//! DXF drawing decoder.
//!
//! Entities on frozen layers and on layers that are turned off are ignored. Curved entities are approximated with
//! polylines, see [`flatten`].

use geoconv_types::{Coord, Feature, FeatureCollection, FeatureKind, Geometry};

use crate::config::TextOrientation;
use crate::decode::{Decoded, InputFormat};
use crate::diagnostics::Diagnostics;
use crate::error::GeoconvError;

pub mod entities;
pub mod flatten;
pub mod groups;
pub mod orient;

use entities::{DxfEntity, TextData};

/// Options of [`decode`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DxfDecodeOptions {
    /// Rotate texts along the nearest polyline on the same layer.
    pub orient_text: bool,
    /// Maximum distance between a text and a polyline for the rotation to apply.
    pub max_text_distance: f64,
}

impl Default for DxfDecodeOptions {
    fn default() -> Self {
        Self {
            orient_text: false,
            max_text_distance: 5.0,
        }
    }
}

impl From<&TextOrientation> for DxfDecodeOptions {
    fn from(value: &TextOrientation) -> Self {
        Self {
            orient_text: value.enabled,
            max_text_distance: value.max_distance,
        }
    }
}

/// Decodes an ASCII or binary DXF file.
///
/// Malformed and unsupported entities are skipped and reported in the diagnostics. Fails with
/// [`GeoconvError::NoVisibleLayers`] if the drawing has a layer table but none of its layers is visible.
pub fn decode(bytes: &[u8], options: &DxfDecodeOptions) -> Result<Decoded, GeoconvError> {
    let groups =
        groups::read_groups(bytes).map_err(|message| GeoconvError::decode(InputFormat::Dxf, message))?;
    let document = entities::parse_document(&groups)
        .map_err(|message| GeoconvError::decode(InputFormat::Dxf, message))?;

    if document.has_no_visible_layers() {
        return Err(GeoconvError::NoVisibleLayers);
    }

    let mut diagnostics = Diagnostics::new();
    if let Some(units) = document.units {
        diagnostics.note(format!("drawing units: {}", entities::units_name(units)));
    }

    let mut collection = FeatureCollection::new();
    let mut hidden = 0;
    for raw in &document.entities {
        let layer = raw.layer();
        if !document.is_layer_visible(layer) {
            hidden += 1;
            continue;
        }

        match DxfEntity::parse(raw) {
            Ok(Some(entity)) => {
                if let DxfEntity::Insert {
                    rejected_attribs, ..
                } = &entity
                {
                    for reason in rejected_attribs {
                        diagnostics.skip("ATTRIB", reason.as_str());
                    }
                }
                if let Err(reason) = push_features(entity, layer, &mut collection) {
                    diagnostics.skip(&raw.kind, reason);
                }
            }
            Ok(None) => diagnostics.skip(&raw.kind, "unsupported entity type"),
            Err(reason) => diagnostics.skip(&raw.kind, reason),
        }
    }

    if hidden > 0 {
        diagnostics.note(format!("{hidden} entities on hidden layers ignored"));
    }

    if options.orient_text {
        let rotated = orient::orient_texts(&mut collection, options.max_text_distance);
        log::debug!("{rotated} texts rotated along nearby polylines");
    }

    log::info!(
        "decoded {} features from {} DXF entities",
        collection.len(),
        document.entities.len()
    );

    Ok(Decoded {
        collection,
        diagnostics,
    })
}

fn line_feature(
    points: Vec<Coord>,
    kind: FeatureKind,
    layer: &str,
) -> Result<Feature, &'static str> {
    if points.len() < 2 {
        return Err("fewer than 2 points after approximation");
    }

    Ok(Feature::new(Geometry::LineString(points), kind).with_layer(layer))
}

fn text_feature(text: TextData, layer: &str) -> Feature {
    let mut feature = Feature::new(text.point, FeatureKind::Text)
        .with_layer(layer)
        .with_text(text.text)
        .with_rotation(text.rotation);
    if let Some(tag) = text.tag {
        feature = feature.with_name(tag);
    }

    feature
}

fn push_features(
    entity: DxfEntity,
    layer: &str,
    collection: &mut FeatureCollection,
) -> Result<(), &'static str> {
    match entity {
        DxfEntity::Point(point) => {
            collection.push(Feature::new(point, FeatureKind::Point).with_layer(layer))
        }
        DxfEntity::Line(from, to) => {
            collection.push(line_feature(vec![from, to], FeatureKind::Line, layer)?)
        }
        DxfEntity::LwPolyline { vertices, closed } | DxfEntity::Polyline { vertices, closed } => {
            collection.push(line_feature(
                flatten::polyline(&vertices, closed),
                FeatureKind::Polyline,
                layer,
            )?)
        }
        DxfEntity::Circle { center, radius } => collection.push(
            line_feature(flatten::circle(&center, radius), FeatureKind::Circle, layer)?
                .with_attr("radius", radius),
        ),
        DxfEntity::Arc {
            center,
            radius,
            start_angle,
            end_angle,
        } => collection.push(line_feature(
            flatten::arc(&center, radius, start_angle, end_angle),
            FeatureKind::Polyline,
            layer,
        )?),
        DxfEntity::Ellipse {
            center,
            major_axis,
            ratio,
            start_param,
            end_param,
        } => collection.push(line_feature(
            flatten::ellipse(&center, &major_axis, ratio, start_param, end_param),
            FeatureKind::Shape,
            layer,
        )?),
        DxfEntity::Spline(data) => collection.push(line_feature(
            flatten::spline(&data),
            FeatureKind::Polyline,
            layer,
        )?),
        DxfEntity::Hatch(paths) => {
            let outlines: Vec<Feature> = paths
                .iter()
                .filter_map(|path| {
                    line_feature(flatten::hatch_path(path), FeatureKind::Shape, layer).ok()
                })
                .collect();
            if outlines.is_empty() {
                return Err("hatch has no usable boundary path");
            }
            collection.extend(outlines);
        }
        DxfEntity::Insert {
            point,
            block,
            attribs,
            ..
        } => {
            collection.push(
                Feature::new(point, FeatureKind::Block)
                    .with_layer(layer)
                    .with_name(block),
            );
            collection.extend(attribs.into_iter().map(|text| text_feature(text, layer)));
        }
        DxfEntity::Text(text) => collection.push(text_feature(text, layer)),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn drawing(layers: &str, entities: &str) -> Vec<u8> {
        format!(
            "0\nSECTION\n2\nHEADER\n9\n$INSUNITS\n70\n6\n0\nENDSEC\n\
             0\nSECTION\n2\nTABLES\n0\nTABLE\n2\nLAYER\n{layers}0\nENDTAB\n0\nENDSEC\n\
             0\nSECTION\n2\nENTITIES\n{entities}0\nENDSEC\n0\nEOF\n"
        )
        .into_bytes()
    }

    #[test]
    fn converts_entities() {
        let _ = env_logger::try_init();
        let bytes = drawing(
            "0\nLAYER\n2\nSITE\n70\n0\n62\n7\n",
            "0\nCIRCLE\n8\nSITE\n10\n0\n20\n0\n40\n5\n\
             0\nLINE\n8\nSITE\n10\n0\n20\n0\n11\n10\n21\n0\n\
             0\nTEXT\n8\nSITE\n10\n1\n20\n1\n1\nBM-1\n50\n0\n\
             0\nINSERT\n8\nSITE\n2\nTREE\n10\n3\n20\n3\n66\n1\n\
             0\nATTRIB\n8\nSITE\n10\n3\n20\n4\n1\nOak\n2\nSPECIES\n\
             0\nATTRIB\n8\nSITE\n1\nlost\n2\nHEIGHT\n0\nSEQEND\n\
             0\n3DFACE\n8\nSITE\n",
        );

        let decoded = decode(&bytes, &DxfDecodeOptions::default()).expect("valid drawing");
        let kinds: Vec<FeatureKind> = decoded.collection.iter().map(Feature::kind).collect();
        assert_eq!(
            kinds,
            vec![
                FeatureKind::Circle,
                FeatureKind::Line,
                FeatureKind::Text,
                FeatureKind::Block,
                FeatureKind::Text,
            ]
        );

        let circle = &decoded.collection.features()[0];
        assert_eq!(circle.geometry.coord_count(), 65);
        assert_eq!(circle.layer(), "SITE");

        let attrib = &decoded.collection.features()[4];
        assert_eq!(attrib.attributes.text.as_deref(), Some("Oak"));
        assert_eq!(attrib.attributes.name.as_deref(), Some("SPECIES"));

        assert_eq!(decoded.diagnostics.skipped_count("3DFACE"), 1);
        assert_eq!(decoded.diagnostics.skipped_count("ATTRIB"), 1);
        assert!(decoded
            .diagnostics
            .notes
            .contains(&"drawing units: meters".to_string()));
    }

    #[test]
    fn hidden_layers_are_ignored() {
        let bytes = drawing(
            "0\nLAYER\n2\nA\n70\n0\n62\n7\n0\nLAYER\n2\nB\n70\n1\n62\n7\n0\nLAYER\n2\nC\n70\n0\n62\n-7\n",
            "0\nPOINT\n8\nA\n10\n1\n20\n1\n0\nPOINT\n8\nB\n10\n2\n20\n2\n0\nPOINT\n8\nC\n10\n3\n20\n3\n",
        );

        let decoded = decode(&bytes, &DxfDecodeOptions::default()).expect("valid drawing");
        assert_eq!(decoded.collection.len(), 1);
        assert_eq!(decoded.collection.features()[0].layer(), "A");
    }

    #[test]
    fn no_visible_layers_is_fatal() {
        let bytes = drawing(
            "0\nLAYER\n2\nA\n70\n1\n62\n7\n",
            "0\nPOINT\n8\nA\n10\n1\n20\n1\n",
        );
        assert_matches!(
            decode(&bytes, &DxfDecodeOptions::default()),
            Err(GeoconvError::NoVisibleLayers)
        );
    }

    #[test]
    fn drawing_without_layer_table() {
        let bytes = b"0\nSECTION\n2\nENTITIES\n0\nPOINT\n8\nANY\n10\n1\n20\n2\n30\n3\n0\nENDSEC\n0\nEOF\n";
        let decoded = decode(bytes, &DxfDecodeOptions::default()).expect("valid drawing");
        assert_eq!(
            decoded.collection.features()[0].geometry,
            Geometry::Point(Coord::xyz(1.0, 2.0, 3.0))
        );
    }

    #[test]
    fn binary_drawing() {
        let bytes = groups::tests::encode_binary(&[
            (0, "SECTION"),
            (2, "ENTITIES"),
            (0, "ARC"),
            (8, "0"),
            (10, "0.0"),
            (20, "0.0"),
            (40, "2.0"),
            (50, "0.0"),
            (51, "90.0"),
            (0, "ENDSEC"),
            (0, "EOF"),
        ]);

        let decoded = decode(&bytes, &DxfDecodeOptions::default()).expect("valid drawing");
        let arc = &decoded.collection.features()[0];
        assert_eq!(arc.kind(), FeatureKind::Polyline);
        assert_eq!(arc.geometry.coord_count(), 17);
    }

    #[test]
    fn garbage_is_decode_error() {
        assert_matches!(
            decode(b"not a drawing\nat all\n", &DxfDecodeOptions::default()),
            Err(GeoconvError::Decode {
                format: InputFormat::Dxf,
                ..
            })
        );
    }
}
