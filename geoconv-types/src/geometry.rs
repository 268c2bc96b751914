//! See [`Geometry`].

use serde::{Deserialize, Serialize};

use crate::bounding_rect::BoundingRect;
use crate::coord::Coord;

/// Geometry of a feature.
///
/// Polygons are stored as a list of rings, the first one being the outer boundary. A ring is closed when its first
/// and last coordinates are equal. Decoders try to produce closed rings, but encoders must not rely on that and call
/// [`Geometry::close_rings`] (or [`close_ring`]) before writing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    /// Single point.
    Point(Coord),
    /// Sequence of points connected by straight segments.
    LineString(Vec<Coord>),
    /// Outer ring followed by any number of holes.
    Polygon(Vec<Vec<Coord>>),
    /// Set of points.
    MultiPoint(Vec<Coord>),
    /// Set of line strings.
    MultiLineString(Vec<Vec<Coord>>),
    /// Set of polygons.
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
}

/// Class of the shape used by formats that cannot mix geometry kinds in one layer (e.g. shapefiles).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ShapeClass {
    /// Single points.
    Point,
    /// Multipoints.
    MultiPoint,
    /// Line strings and multi line strings.
    Polyline,
    /// Polygons and multi polygons.
    Polygon,
}

impl ShapeClass {
    /// Lowercase name of the class.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeClass::Point => "point",
            ShapeClass::MultiPoint => "multipoint",
            ShapeClass::Polyline => "polyline",
            ShapeClass::Polygon => "polygon",
        }
    }
}

impl Geometry {
    /// Shape class of the geometry.
    pub fn shape_class(&self) -> ShapeClass {
        match self {
            Geometry::Point(_) => ShapeClass::Point,
            Geometry::MultiPoint(_) => ShapeClass::MultiPoint,
            Geometry::LineString(_) | Geometry::MultiLineString(_) => ShapeClass::Polyline,
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => ShapeClass::Polygon,
        }
    }

    /// Name of the geometry variant as used by GeoJSON.
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// Iterates over all coordinates of the geometry, including every ring of every polygon.
    pub fn coords(&self) -> Box<dyn Iterator<Item = &Coord> + '_> {
        match self {
            Geometry::Point(c) => Box::new(std::iter::once(c)),
            Geometry::LineString(line) | Geometry::MultiPoint(line) => Box::new(line.iter()),
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                Box::new(rings.iter().flatten())
            }
            Geometry::MultiPolygon(polygons) => Box::new(polygons.iter().flatten().flatten()),
        }
    }

    /// Same as [`Geometry::coords`] but with mutable access.
    pub fn coords_mut(&mut self) -> Box<dyn Iterator<Item = &mut Coord> + '_> {
        match self {
            Geometry::Point(c) => Box::new(std::iter::once(c)),
            Geometry::LineString(line) | Geometry::MultiPoint(line) => Box::new(line.iter_mut()),
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                Box::new(rings.iter_mut().flatten())
            }
            Geometry::MultiPolygon(polygons) => {
                Box::new(polygons.iter_mut().flatten().flatten())
            }
        }
    }

    /// Total number of coordinates in the geometry.
    pub fn coord_count(&self) -> usize {
        self.coords().count()
    }

    /// Returns true if the geometry has no coordinates at all.
    pub fn is_empty(&self) -> bool {
        self.coords().next().is_none()
    }

    /// Returns true if any coordinate of the geometry has a z component.
    pub fn has_z(&self) -> bool {
        self.coords().any(|c| c.z.is_some())
    }

    /// Drops the z component of every coordinate.
    pub fn strip_z(&mut self) {
        for c in self.coords_mut() {
            c.z = None;
        }
    }

    /// Closes every polygon ring that arrived open by appending its first coordinate.
    pub fn close_rings(&mut self) {
        match self {
            Geometry::Polygon(rings) => rings.iter_mut().for_each(close_ring),
            Geometry::MultiPolygon(polygons) => polygons
                .iter_mut()
                .flat_map(|rings| rings.iter_mut())
                .for_each(close_ring),
            _ => {}
        }
    }

    /// Bounding rectangle of the geometry, or `None` if it has no coordinates.
    pub fn bounding_rect(&self) -> Option<BoundingRect> {
        BoundingRect::from_coords(self.coords())
    }
}

/// Appends the first coordinate of the ring to its end if the ring is not closed yet.
pub fn close_ring(ring: &mut Vec<Coord>) {
    if let (Some(first), Some(last)) = (ring.first(), ring.last()) {
        if !first.equal_xy(last) {
            ring.push(*first);
        }
    }
}

/// Returns true if the ring has at least one coordinate and its first and last coordinates are equal.
pub fn is_ring_closed(ring: &[Coord]) -> bool {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) => ring.len() > 1 && first.equal_xy(last),
        _ => false,
    }
}

impl From<Coord> for Geometry {
    fn from(value: Coord) -> Self {
        Self::Point(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Coord> {
        vec![
            Coord::xy(0.0, 0.0),
            Coord::xy(1.0, 0.0),
            Coord::xy(1.0, 1.0),
            Coord::xy(0.0, 1.0),
        ]
    }

    #[test]
    fn close_rings_appends_first_point_once() {
        let mut polygon = Geometry::Polygon(vec![square()]);
        polygon.close_rings();
        polygon.close_rings();

        let Geometry::Polygon(rings) = &polygon else {
            panic!("geometry type changed");
        };
        assert_eq!(rings[0].len(), 5);
        assert!(is_ring_closed(&rings[0]));
    }

    #[test]
    fn coords_visits_every_ring() {
        let geometry = Geometry::MultiPolygon(vec![vec![square(), square()], vec![square()]]);
        assert_eq!(geometry.coord_count(), 12);
    }

    #[test]
    fn shape_class_groups_multi_variants() {
        assert_eq!(
            Geometry::MultiLineString(vec![]).shape_class(),
            ShapeClass::Polyline
        );
        assert_eq!(
            Geometry::MultiPolygon(vec![]).shape_class(),
            ShapeClass::Polygon
        );
        assert_eq!(
            Geometry::MultiPoint(vec![]).shape_class(),
            ShapeClass::MultiPoint
        );
    }

    #[test]
    fn strip_z_removes_elevation() {
        let mut line = Geometry::LineString(vec![Coord::xyz(1.0, 2.0, 3.0), Coord::xy(4.0, 5.0)]);
        assert!(line.has_z());
        line.strip_z();
        assert!(!line.has_z());
    }
}
