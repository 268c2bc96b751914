//! Features are geometries with attributes attached.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GeoconvTypesError;
use crate::geometry::Geometry;

/// Layer name used when the source format does not provide one.
pub const DEFAULT_LAYER: &str = "default";

/// Semantic origin of a feature.
///
/// This is independent of the geometry variant: a CAD circle is stored as a closed line string but keeps
/// [`FeatureKind::Circle`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    /// Survey point, waypoint or DXF POINT.
    Point,
    /// Straight line or KML line string.
    Line,
    /// DXF polyline or a two-point tabular chain.
    Polyline,
    /// Closed area.
    Polygon,
    /// Flattened CAD circle.
    Circle,
    /// Annotation anchored at a point.
    Text,
    /// Block insertion point.
    Block,
    /// GPX track segment.
    Track,
    /// GPX route.
    Route,
    /// Flattened CAD ellipse or hatch boundary.
    Shape,
}

impl FeatureKind {
    /// All kinds, in the order encoders present them.
    pub const ALL: [FeatureKind; 10] = [
        FeatureKind::Point,
        FeatureKind::Line,
        FeatureKind::Polyline,
        FeatureKind::Polygon,
        FeatureKind::Circle,
        FeatureKind::Text,
        FeatureKind::Block,
        FeatureKind::Track,
        FeatureKind::Route,
        FeatureKind::Shape,
    ];

    /// Tag value, e.g. `"circle"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Point => "point",
            FeatureKind::Line => "line",
            FeatureKind::Polyline => "polyline",
            FeatureKind::Polygon => "polygon",
            FeatureKind::Circle => "circle",
            FeatureKind::Text => "text",
            FeatureKind::Block => "block",
            FeatureKind::Track => "track",
            FeatureKind::Route => "route",
            FeatureKind::Shape => "shape",
        }
    }

    /// Name of the group the kind belongs to when grouping by type, e.g. `"circles"`.
    pub fn group_name(&self) -> &'static str {
        match self {
            FeatureKind::Point => "points",
            FeatureKind::Line => "lines",
            FeatureKind::Polyline => "polylines",
            FeatureKind::Polygon => "polygons",
            FeatureKind::Circle => "circles",
            FeatureKind::Text => "texts",
            FeatureKind::Block => "blocks",
            FeatureKind::Track => "tracks",
            FeatureKind::Route => "routes",
            FeatureKind::Shape => "shapes",
        }
    }

    /// Human readable plural title, e.g. `"Circles"`.
    pub fn title(&self) -> &'static str {
        match self {
            FeatureKind::Point => "Points",
            FeatureKind::Line => "Lines",
            FeatureKind::Polyline => "Polylines",
            FeatureKind::Polygon => "Polygons",
            FeatureKind::Circle => "Circles",
            FeatureKind::Text => "Texts",
            FeatureKind::Block => "Blocks",
            FeatureKind::Track => "Tracks",
            FeatureKind::Route => "Routes",
            FeatureKind::Shape => "Shapes",
        }
    }
}

impl Display for FeatureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureKind {
    type Err = GeoconvTypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| GeoconvTypesError::UnknownFeatureKind(s.to_string()))
    }
}

/// Value of an attribute that does not have a dedicated field in [`Attributes`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer number.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Free text.
    String(String),
}

impl Display for AttrValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::String(v) => write!(f, "{v}"),
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl AttrValue {
    /// Numeric value of the attribute, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Float(v) => Some(*v),
            AttrValue::String(v) => v.trim().parse().ok(),
            AttrValue::Bool(_) => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Attributes of a feature.
///
/// `kind` and `layer` are always present, so grouping by either of them is total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    /// Semantic `type` tag.
    #[serde(rename = "type")]
    pub kind: FeatureKind,
    /// Source layer name, [`DEFAULT_LAYER`] if the source had none.
    pub layer: String,
    /// Feature name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Annotation text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Rotation of the annotation in degrees, counterclockwise from the x axis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    /// Any other source fields.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, AttrValue>,
}

impl Attributes {
    /// Creates attributes of the given kind on the default layer.
    pub fn new(kind: FeatureKind) -> Self {
        Self {
            kind,
            layer: DEFAULT_LAYER.to_string(),
            name: None,
            text: None,
            rotation: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Single feature of a [`FeatureCollection`](crate::FeatureCollection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Geometry in the coordinate system of the collection.
    pub geometry: Geometry,
    /// Semantic tag, layer and source fields.
    pub attributes: Attributes,
}

impl Feature {
    /// Creates a new feature of the given kind on the default layer.
    pub fn new(geometry: impl Into<Geometry>, kind: FeatureKind) -> Self {
        Self {
            geometry: geometry.into(),
            attributes: Attributes::new(kind),
        }
    }

    /// Sets the layer. Empty names are replaced with [`DEFAULT_LAYER`].
    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        let layer = layer.into();
        self.attributes.layer = if layer.trim().is_empty() {
            DEFAULT_LAYER.to_string()
        } else {
            layer
        };
        self
    }

    /// Sets the feature name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.attributes.name = Some(name.into());
        self
    }

    /// Sets the annotation text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.attributes.text = Some(text.into());
        self
    }

    /// Sets the annotation rotation in degrees.
    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.attributes.rotation = Some(degrees);
        self
    }

    /// Adds an arbitrary attribute.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.extra.insert(key.into(), value.into());
        self
    }

    /// Semantic `type` tag.
    pub fn kind(&self) -> FeatureKind {
        self.attributes.kind
    }

    /// Source layer name.
    pub fn layer(&self) -> &str {
        &self.attributes.layer
    }

    /// Key of the group this feature belongs to under the given policy.
    pub fn group_key(&self, grouping: Grouping) -> &str {
        match grouping {
            Grouping::Type => self.kind().group_name(),
            Grouping::Layer => self.layer(),
        }
    }
}

/// Policy of partitioning features before encoding.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grouping {
    /// Group by the semantic `type` tag.
    #[default]
    Type,
    /// Group by the source layer.
    Layer,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::Coord;

    #[test]
    fn kind_round_trips_through_string() {
        for kind in FeatureKind::ALL {
            assert_eq!(kind.as_str().parse::<FeatureKind>(), Ok(kind));
        }
        assert!("arc".parse::<FeatureKind>().is_err());
    }

    #[test]
    fn empty_layer_falls_back_to_default() {
        let feature = Feature::new(Coord::xy(0.0, 0.0), FeatureKind::Point).with_layer("  ");
        assert_eq!(feature.layer(), DEFAULT_LAYER);
    }

    #[test]
    fn group_key_follows_policy() {
        let feature = Feature::new(Coord::xy(0.0, 0.0), FeatureKind::Circle).with_layer("WALLS");
        assert_eq!(feature.group_key(Grouping::Type), "circles");
        assert_eq!(feature.group_key(Grouping::Layer), "WALLS");
    }
}
