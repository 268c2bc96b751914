//! Configuration of a conversion job.
//!
//! Every field has a default, so an empty JSON object (`{}`) is a valid configuration.

use std::path::Path;

use geoconv_types::geo::{Crs, SpatialReference};
use geoconv_types::Grouping;
use serde::{Deserialize, Serialize};

use crate::error::GeoconvError;
use crate::heatmap::InterpolationMethod;

/// Immutable settings of one conversion job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// CRS of the input coordinates, e.g. `EPSG:32717`.
    pub input_crs: String,
    /// CRS of the output coordinates.
    pub output_crs: String,
    /// How features are partitioned into shapefile writers and layers.
    pub grouping: Grouping,
    /// Whether z values are kept in the output.
    pub dimension: Dimension,
    /// Heatmap raster settings.
    pub heatmap: HeatmapConfig,
    /// Style of the DXF output.
    pub dxf_style: DxfStyle,
    /// Style of the KML output. Default KML styling is used if not set.
    pub kml_style: Option<KmlStyle>,
    /// How tabular input is turned into features.
    pub tabular_mode: TabularMode,
    /// Rotation of DXF texts along nearby polylines.
    pub text_orientation: TextOrientation,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            input_crs: default_crs(),
            output_crs: default_crs(),
            grouping: Grouping::Type,
            dimension: Dimension::TwoD,
            heatmap: HeatmapConfig::default(),
            dxf_style: DxfStyle::default(),
            kml_style: None,
            tabular_mode: TabularMode::Points,
            text_orientation: TextOrientation::default(),
        }
    }
}

fn default_crs() -> String {
    "EPSG:4326".to_string()
}

impl ConversionConfig {
    /// Parses the configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, GeoconvError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, GeoconvError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks values that serde cannot check by itself.
    pub fn validate(&self) -> Result<(), GeoconvError> {
        if self.heatmap.resolution == 0 {
            return Err(GeoconvError::Config(
                "heatmap resolution must be positive".into(),
            ));
        }
        if !self.heatmap.margin_percent.is_finite() || self.heatmap.margin_percent < 0.0 {
            return Err(GeoconvError::Config(format!(
                "heatmap margin must be a non-negative number, got {}",
                self.heatmap.margin_percent
            )));
        }
        if !self.text_orientation.max_distance.is_finite()
            || self.text_orientation.max_distance < 0.0
        {
            return Err(GeoconvError::Config(format!(
                "text orientation distance must be a non-negative number, got {}",
                self.text_orientation.max_distance
            )));
        }

        Ok(())
    }

    /// Source and target CRS of the job.
    pub fn spatial_reference(&self) -> Result<SpatialReference, GeoconvError> {
        Ok(SpatialReference::parse(&self.input_crs, &self.output_crs)?)
    }

    /// Target CRS of the job.
    pub fn output_crs(&self) -> Result<Crs, GeoconvError> {
        Ok(self.output_crs.parse()?)
    }
}

/// Dimensionality of the output coordinates.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dimension {
    /// Z values are dropped before encoding.
    #[default]
    #[serde(rename = "2D", alias = "2d")]
    TwoD,
    /// Z values are kept.
    #[serde(rename = "3D", alias = "3d")]
    ThreeD,
}

/// Settings of the heatmap raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    /// Whether a heatmap raster is produced at all.
    pub enabled: bool,
    /// Padding added on each side of the points' bounding box, in percent of its size.
    pub margin_percent: f64,
    /// Number of raster cells along each axis.
    pub resolution: usize,
    /// Interpolation between the points.
    pub method: InterpolationMethod,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            margin_percent: 10.0,
            resolution: 200,
            method: InterpolationMethod::Linear,
        }
    }
}

/// Style of the DXF output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DxfStyle {
    /// AutoCAD colour index of the points layer.
    pub point_color: u8,
    /// AutoCAD colour index of the lines layer.
    pub line_color: u8,
    /// AutoCAD colour index of the texts layer.
    pub text_color: u8,
    /// Line weight of the lines layer, in hundredths of a millimetre.
    pub line_width: i16,
    /// Line type name of the lines layer.
    pub line_type: String,
    /// Names of the generated layers.
    pub layer_names: DxfLayerNames,
    /// Offset of texts from their anchor point, in drawing units.
    pub text_offset: TextOffset,
    /// Height of texts, in drawing units.
    pub text_height: f64,
}

impl Default for DxfStyle {
    fn default() -> Self {
        Self {
            point_color: 1,
            line_color: 7,
            text_color: 3,
            line_width: 25,
            line_type: "CONTINUOUS".to_string(),
            layer_names: DxfLayerNames::default(),
            text_offset: TextOffset::default(),
            text_height: 1.0,
        }
    }
}

/// Names of the layers of the DXF output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DxfLayerNames {
    pub points: String,
    pub lines: String,
    pub texts: String,
}

impl Default for DxfLayerNames {
    fn default() -> Self {
        Self {
            points: "POINTS".to_string(),
            lines: "LINES".to_string(),
            texts: "TEXTS".to_string(),
        }
    }
}

/// Offset of a text from its anchor point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOffset {
    pub dx: f64,
    pub dy: f64,
}

impl Default for TextOffset {
    fn default() -> Self {
        Self { dx: 0.5, dy: 0.5 }
    }
}

/// Per-feature style of the KML output. Colours are `#rrggbb` or `#rrggbbaa` strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KmlStyle {
    pub point_color: String,
    pub line_color: String,
    pub line_width: f64,
}

impl Default for KmlStyle {
    fn default() -> Self {
        Self {
            point_color: "#ff0000".to_string(),
            line_color: "#0000ff".to_string(),
            line_width: 2.0,
        }
    }
}

/// How rows of tabular input become features.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabularMode {
    /// Every row becomes a point.
    #[default]
    Points,
    /// Points plus one polyline or polygon per group of rows.
    PointsAndPolylines,
}

/// Settings of the text orientation heuristic of the DXF decoder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOrientation {
    pub enabled: bool,
    /// Maximum distance between a text and a polyline, in drawing units.
    pub max_distance: f64,
}

impl Default for TextOrientation {
    fn default() -> Self {
        Self {
            enabled: false,
            max_distance: 5.0,
        }
    }
}
