//! See [`Coord`].

use serde::{Deserialize, Serialize};

/// A single coordinate tuple: `(x, y)` or `(x, y, z)`.
///
/// In geographic coordinate systems `x` is the longitude and `y` is the latitude.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    /// Easting or longitude.
    pub x: f64,
    /// Northing or latitude.
    pub y: f64,
    /// Elevation, if the coordinate is 3d.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Coord {
    /// Creates a 2d coordinate.
    pub const fn xy(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    /// Creates a 3d coordinate.
    pub const fn xyz(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    /// Creates a coordinate from a longitude/latitude pair. Only a readability helper: the result is
    /// still stored as `(x = lon, y = lat)`.
    pub const fn lonlat(lon: f64, lat: f64) -> Self {
        Self::xy(lon, lat)
    }

    /// Creates a coordinate from a slice of 2 or 3 numbers. Returns `None` for any other length.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [x, y] => Some(Self::xy(*x, *y)),
            [x, y, z] => Some(Self::xyz(*x, *y, *z)),
            _ => None,
        }
    }

    /// Number of dimensions of the coordinate (2 or 3).
    pub fn dimensions(&self) -> usize {
        if self.z.is_some() {
            3
        } else {
            2
        }
    }

    /// Returns the same coordinate without the z component.
    pub fn without_z(&self) -> Self {
        Self::xy(self.x, self.y)
    }

    /// Returns `true` if both `x` and `y` components are equal, ignoring `z`.
    pub fn equal_xy(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }

    /// Squared planar distance to the `other` coordinate.
    pub fn distance_sq(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Planar distance to the `other` coordinate.
    pub fn distance(&self, other: &Self) -> f64 {
        self.distance_sq(other).sqrt()
    }

    /// Returns `true` if all components are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.map_or(true, f64::is_finite)
    }

    /// Components as a vector of 2 or 3 numbers, in `(x, y[, z])` order.
    pub fn to_vec(&self) -> Vec<f64> {
        match self.z {
            Some(z) => vec![self.x, self.y, z],
            None => vec![self.x, self.y],
        }
    }
}

impl From<(f64, f64)> for Coord {
    fn from((x, y): (f64, f64)) -> Self {
        Self::xy(x, y)
    }
}

impl From<(f64, f64, f64)> for Coord {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Self::xyz(x, y, z)
    }
}
