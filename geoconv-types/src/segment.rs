use crate::coord::Coord;

/// A straight line segment between two coordinates.
#[derive(Debug, PartialEq)]
pub struct Segment<'a>(pub &'a Coord, pub &'a Coord);

impl<'a> Segment<'a> {
    /// Point of the segment closest to `point`.
    pub fn closest_point(&self, point: &Coord) -> Coord {
        let (start, end) = (self.0, self.1);
        let length_sq = start.distance_sq(end);
        if length_sq == 0.0 {
            return start.without_z();
        }

        // position of the foot of the perpendicular along the segment, clamped to the segment ends
        let t = (((point.x - start.x) * (end.x - start.x) + (point.y - start.y) * (end.y - start.y))
            / length_sq)
            .clamp(0.0, 1.0);
        Coord::xy(
            start.x + t * (end.x - start.x),
            start.y + t * (end.y - start.y),
        )
    }

    /// Squared planar distance from `point` to the nearest point of the segment.
    pub fn distance_to_point_sq(&self, point: &Coord) -> f64 {
        self.closest_point(point).distance_sq(point)
    }

    /// Direction of the segment in degrees, counterclockwise from the x axis, normalized to `(-90, 90]`.
    ///
    /// Segments pointing "backwards" get the same value as the reversed segment, so a label placed along the
    /// segment is never upside down.
    pub fn readable_angle(&self) -> f64 {
        let angle = (self.1.y - self.0.y).atan2(self.1.x - self.0.x).to_degrees();
        normalize_readable_angle(angle)
    }

    /// Segments of a chain of coordinates.
    pub fn chain(coords: &'a [Coord]) -> impl Iterator<Item = Segment<'a>> + 'a {
        coords.windows(2).map(|pair| Segment(&pair[0], &pair[1]))
    }
}

/// Brings an angle in degrees into the `(-90, 90]` range by adding or subtracting half turns.
pub fn normalize_readable_angle(degrees: f64) -> f64 {
    let mut angle = degrees % 180.0;
    if angle > 90.0 {
        angle -= 180.0;
    } else if angle <= -90.0 {
        angle += 180.0;
    }

    angle
}
