use serde::{Deserialize, Serialize};

use crate::coord::Coord;

/// Axis aligned bounding rectangle in `(x, y)` order.
///
/// For geographic coordinates `x` is longitude. Callers that need `(lat, lon)` order must swap the values
/// explicitly.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingRect {
    /// Minimum x.
    pub x_min: f64,
    /// Minimum y.
    pub y_min: f64,
    /// Maximum x.
    pub x_max: f64,
    /// Maximum y.
    pub y_max: f64,
}

impl BoundingRect {
    /// Creates a rectangle from its extremes.
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Zero-sized rectangle at the coordinate.
    pub fn from_coord(c: &Coord) -> Self {
        Self {
            x_min: c.x,
            x_max: c.x,
            y_min: c.y,
            y_max: c.y,
        }
    }

    /// Bounding rectangle of all coordinates of the iterator, or `None` if the iterator is empty.
    pub fn from_coords<'a>(mut coords: impl Iterator<Item = &'a Coord>) -> Option<Self> {
        let first = coords.next()?;
        let mut rect = Self::from_coord(first);
        for c in coords {
            rect.include(c);
        }

        Some(rect)
    }

    /// Extends the rectangle to contain the coordinate.
    pub fn include(&mut self, c: &Coord) {
        if self.x_min > c.x {
            self.x_min = c.x;
        }
        if self.y_min > c.y {
            self.y_min = c.y;
        }
        if self.x_max < c.x {
            self.x_max = c.x;
        }
        if self.y_max < c.y {
            self.y_max = c.y;
        }
    }

    /// Smallest rectangle containing both rectangles.
    pub fn merge(&self, other: Self) -> Self {
        Self {
            x_min: self.x_min.min(other.x_min),
            y_min: self.y_min.min(other.y_min),
            x_max: self.x_max.max(other.x_max),
            y_max: self.y_max.max(other.y_max),
        }
    }

    /// Union of all rectangles of the iterator, or `None` if the iterator is empty.
    pub fn merge_all(rects: impl IntoIterator<Item = Self>) -> Option<Self> {
        rects.into_iter().reduce(|acc, rect| acc.merge(rect))
    }

    /// Extent along x.
    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    /// Extent along y.
    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Minimum corner of the rectangle.
    pub fn min(&self) -> Coord {
        Coord::xy(self.x_min, self.y_min)
    }

    /// Maximum corner of the rectangle.
    pub fn max(&self) -> Coord {
        Coord::xy(self.x_max, self.y_max)
    }

    /// Returns a copy of the rectangle expanded by `percent` of its width and height on each side.
    ///
    /// An axis with zero extent is expanded by `fallback` units instead, so the result always has a non-zero area.
    pub fn expand_by_percent(&self, percent: f64, fallback: f64) -> Self {
        let pad = |extent: f64| {
            if extent > 0.0 {
                extent * percent / 100.0
            } else {
                fallback
            }
        };
        let dx = pad(self.width());
        let dy = pad(self.height());

        Self {
            x_min: self.x_min - dx,
            x_max: self.x_max + dx,
            y_min: self.y_min - dy,
            y_max: self.y_max + dy,
        }
    }

    /// Returns `true` if the coordinate is inside the rectangle or on its border.
    pub fn contains(&self, c: &Coord) -> bool {
        self.x_min <= c.x && self.x_max >= c.x && self.y_min <= c.y && self.y_max >= c.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_by_percent_pads_each_side() {
        let rect = BoundingRect::new(0.0, 0.0, 100.0, 50.0).expand_by_percent(10.0, 1.0);
        assert_eq!(rect, BoundingRect::new(-10.0, -5.0, 110.0, 55.0));
    }

    #[test]
    fn expand_by_percent_uses_fallback_for_flat_axis() {
        let rect = BoundingRect::new(0.0, 3.0, 10.0, 3.0).expand_by_percent(10.0, 1.0);
        assert_eq!(rect, BoundingRect::new(-1.0, 2.0, 11.0, 4.0));
    }

    #[test]
    fn merge_collects_rectangles() {
        let merged = BoundingRect::merge_all([
            BoundingRect::new(0.0, 0.0, 1.0, 1.0),
            BoundingRect::new(-1.0, 0.5, 0.5, 3.0),
        ]);
        assert_eq!(merged, Some(BoundingRect::new(-1.0, 0.0, 1.0, 3.0)));
    }
}
