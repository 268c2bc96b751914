//! Heatmap raster generator.
//!
//! Interpolates the elevation of scattered survey points over a regular grid and keeps the affine transform that
//! maps grid cells back to the ground.

use geoconv_types::geo::Crs;
use geoconv_types::{BoundingRect, Coord, FeatureCollection, Geometry};
use serde::{Deserialize, Serialize};

use crate::config::HeatmapConfig;
use crate::error::GeoconvError;

pub mod geotiff;
pub mod interpolate;

/// Minimum number of points for a heatmap.
pub const MIN_POINTS: usize = 3;

/// Expansion, in CRS units, of a bounding box axis with zero extent.
const DEGENERATE_PADDING: f64 = 1.0;

/// Interpolation method of the heatmap.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    /// Value of the closest input point.
    Nearest,
    /// Barycentric interpolation on the Delaunay triangle containing the cell.
    #[default]
    Linear,
    /// Sibson's C1 natural neighbour interpolation.
    Cubic,
}

/// Statistics of the valid (non-NaN) cells of a band.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct BandStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    /// Number of valid cells.
    pub valid_count: usize,
}

impl BandStatistics {
    /// Computes statistics over the non-NaN values. Returns `None` if there are none.
    pub fn compute(values: &[f32]) -> Option<Self> {
        let valid: Vec<f64> = values
            .iter()
            .filter(|v| !v.is_nan())
            .map(|v| f64::from(*v))
            .collect();
        if valid.is_empty() {
            return None;
        }

        let count = valid.len() as f64;
        let mean = valid.iter().sum::<f64>() / count;
        let variance = valid.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;

        Some(Self {
            min: valid.iter().copied().fold(f64::INFINITY, f64::min),
            max: valid.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean,
            std_dev: variance.sqrt(),
            valid_count: valid.len(),
        })
    }
}

/// Single band georeferenced raster.
///
/// `origin` is the top-left corner of the top-left cell and `pixel_size.1` is negative: row 0 of the band is the
/// northernmost row.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    pub origin: (f64, f64),
    pub pixel_size: (f64, f64),
    pub width: usize,
    pub height: usize,
    pub crs: Crs,
    /// Row-major cell values, NaN for cells without data.
    pub band: Vec<f32>,
    pub statistics: Option<BandStatistics>,
}

impl RasterGrid {
    /// Value of the cell, or `None` if the cell is out of the grid.
    pub fn value(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.band.get(row * self.width + col).copied()
    }

    /// Ground coordinates of the top-left corner of the cell.
    pub fn pixel_to_world(&self, row: f64, col: f64) -> Coord {
        Coord::xy(
            self.origin.0 + col * self.pixel_size.0,
            self.origin.1 + row * self.pixel_size.1,
        )
    }

    /// Affine transform in GDAL order: `[x0, dx, 0, y0, 0, dy]`.
    pub fn geo_transform(&self) -> [f64; 6] {
        [
            self.origin.0,
            self.pixel_size.0,
            0.0,
            self.origin.1,
            0.0,
            self.pixel_size.1,
        ]
    }

    /// Area covered by the grid.
    pub fn bounds(&self) -> BoundingRect {
        let top_left = self.pixel_to_world(0.0, 0.0);
        let bottom_right = self.pixel_to_world(self.height as f64, self.width as f64);
        BoundingRect::new(top_left.x, bottom_right.y, bottom_right.x, top_left.y)
    }
}

/// Collects the points with a finite elevation from the point geometries of the collection.
pub fn heatmap_points(collection: &FeatureCollection) -> Vec<Coord> {
    collection
        .iter()
        .flat_map(|feature| match &feature.geometry {
            Geometry::Point(c) => vec![*c],
            Geometry::MultiPoint(points) => points.clone(),
            _ => vec![],
        })
        .filter(|c| c.is_finite() && c.z.is_some_and(f64::is_finite))
        .collect()
}

/// Interpolates the elevation of `points` over a `resolution x resolution` grid.
///
/// Points without an elevation are ignored. Fails with [`GeoconvError::InsufficientPoints`] if fewer than
/// [`MIN_POINTS`] points remain.
pub fn generate(
    points: &[Coord],
    crs: Crs,
    config: &HeatmapConfig,
) -> Result<RasterGrid, GeoconvError> {
    let points: Vec<Coord> = points
        .iter()
        .filter(|c| c.is_finite() && c.z.is_some_and(f64::is_finite))
        .copied()
        .collect();
    if points.len() < MIN_POINTS {
        return Err(GeoconvError::InsufficientPoints {
            found: points.len(),
        });
    }
    if config.resolution == 0 {
        return Err(GeoconvError::Config(
            "heatmap resolution must be positive".into(),
        ));
    }

    let bounds = BoundingRect::from_coords(points.iter())
        .ok_or(GeoconvError::InsufficientPoints { found: 0 })?
        .expand_by_percent(config.margin_percent, DEGENERATE_PADDING);

    let size = config.resolution;
    let dx = bounds.width() / size as f64;
    let dy = bounds.height() / size as f64;

    let mut south_up = interpolate::interpolate_grid(&points, &bounds, size, size, config.method);
    if south_up.iter().all(|v| v.is_nan()) {
        log::warn!(
            "{:?} interpolation produced no values, rasterizing the {} points directly",
            config.method,
            points.len()
        );
        south_up = interpolate::rasterize_points(&points, &bounds, size, size);
    }

    let band: Vec<f32> = south_up
        .chunks(size)
        .rev()
        .flat_map(|row| row.iter().copied())
        .collect();
    let statistics = BandStatistics::compute(&band);

    log::info!(
        "heatmap of {} points: {size}x{size} cells, {} with data",
        points.len(),
        statistics.map_or(0, |s| s.valid_count)
    );

    Ok(RasterGrid {
        origin: (bounds.x_min, bounds.y_max),
        pixel_size: (dx, -dy),
        width: size,
        height: size,
        crs,
        band,
        statistics,
    })
}
