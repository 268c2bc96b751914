//! Interpolation of scattered points over a Delaunay triangulation.
//!
//! Grids produced here are south-up: row 0 samples the minimum Y of the bounds.

use geoconv_types::{BoundingRect, Coord};
use spade::{
    DelaunayTriangulation, FloatTriangulation, HasPosition, Point2, PositionInTriangulation, Triangulation,
};

use crate::heatmap::InterpolationMethod;

/// Flatness of Sibson's C1 interpolant. `0` is close to linear, larger values give rounder surfaces.
const SIBSON_FLATNESS: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
struct Sample {
    position: Point2<f64>,
    value: f64,
}

impl HasPosition for Sample {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        self.position
    }
}

struct Surface {
    triangulation: DelaunayTriangulation<Sample>,
    /// Gradient estimate of every vertex, indexed by the vertex index.
    gradients: Vec<[f64; 2]>,
}

impl Surface {
    fn new(points: &[Coord]) -> Self {
        let mut triangulation = DelaunayTriangulation::<Sample>::new();
        for c in points {
            let sample = Sample {
                position: Point2::new(c.x, c.y),
                value: c.z.unwrap_or_default(),
            };
            if let Err(err) = triangulation.insert(sample) {
                log::warn!("point ({}, {}) not used for interpolation: {err:?}", c.x, c.y);
            }
        }

        let gradients = estimate_gradients(&triangulation);
        Self {
            triangulation,
            gradients,
        }
    }

    fn is_degenerate(&self) -> bool {
        self.triangulation.num_inner_faces() == 0
    }

    fn inside_hull(&self, position: Point2<f64>) -> bool {
        matches!(
            self.triangulation.locate(position),
            PositionInTriangulation::OnFace(_)
                | PositionInTriangulation::OnEdge(_)
                | PositionInTriangulation::OnVertex(_)
        )
    }

    fn sample(&self, position: Point2<f64>, method: InterpolationMethod) -> Option<f64> {
        if !self.inside_hull(position) {
            return None;
        }

        match method {
            InterpolationMethod::Nearest => self
                .triangulation
                .nearest_neighbor(position)
                .map(|v| v.data().value),
            InterpolationMethod::Linear => self
                .triangulation
                .barycentric()
                .interpolate(|v| v.data().value, position),
            InterpolationMethod::Cubic => self.triangulation.natural_neighbor().interpolate_gradient(
                |v| v.data().value,
                |v| self.gradients[v.fix().index()],
                SIBSON_FLATNESS,
                position,
            ),
        }
    }
}

/// Least squares estimate of the surface gradient at every vertex from its direct neighbours.
fn estimate_gradients(triangulation: &DelaunayTriangulation<Sample>) -> Vec<[f64; 2]> {
    let mut gradients = vec![[0.0, 0.0]; triangulation.num_vertices()];

    for vertex in triangulation.vertices() {
        let origin = vertex.data();
        let (mut sxx, mut sxy, mut syy, mut sxz, mut syz) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for edge in vertex.out_edges() {
            let to = edge.to();
            let neighbour = to.data();
            let dx = neighbour.position.x - origin.position.x;
            let dy = neighbour.position.y - origin.position.y;
            let dz = neighbour.value - origin.value;
            sxx += dx * dx;
            sxy += dx * dy;
            syy += dy * dy;
            sxz += dx * dz;
            syz += dy * dz;
        }

        let det = sxx * syy - sxy * sxy;
        if det.abs() > f64::EPSILON * (sxx * syy).abs().max(1.0) {
            gradients[vertex.fix().index()] = [
                (syy * sxz - sxy * syz) / det,
                (sxx * syz - sxy * sxz) / det,
            ];
        }
    }

    gradients
}

fn cell_centre(bounds: &BoundingRect, width: usize, height: usize, row: usize, col: usize) -> Point2<f64> {
    let dx = bounds.width() / width as f64;
    let dy = bounds.height() / height as f64;
    Point2::new(
        bounds.x_min + (col as f64 + 0.5) * dx,
        bounds.y_min + (row as f64 + 0.5) * dy,
    )
}

/// Samples the surface through `points` at every cell centre. Cells outside the convex hull of the points are NaN.
///
/// Returns a south-up, row-major grid of `width * height` values.
pub fn interpolate_grid(
    points: &[Coord],
    bounds: &BoundingRect,
    width: usize,
    height: usize,
    method: InterpolationMethod,
) -> Vec<f32> {
    let surface = Surface::new(points);
    if surface.is_degenerate() {
        log::debug!("points do not span an area, triangulation has no faces");
        return vec![f32::NAN; width * height];
    }

    let mut grid = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let value = surface
                .sample(cell_centre(bounds, width, height, row, col), method)
                .map_or(f32::NAN, |v| v as f32);
            grid.push(value);
        }
    }

    grid
}

/// Puts every point into the cell containing it. Cells shared by several points get the mean of their values,
/// cells without points are NaN.
///
/// Returns a south-up, row-major grid of `width * height` values.
pub fn rasterize_points(
    points: &[Coord],
    bounds: &BoundingRect,
    width: usize,
    height: usize,
) -> Vec<f32> {
    let dx = bounds.width() / width as f64;
    let dy = bounds.height() / height as f64;
    let cell = |offset: f64, size: f64, count: usize| -> usize {
        ((offset / size).floor().max(0.0) as usize).min(count - 1)
    };

    let mut sums = vec![(0.0f64, 0usize); width * height];
    for c in points {
        let col = cell(c.x - bounds.x_min, dx, width);
        let row = cell(c.y - bounds.y_min, dy, height);
        let entry = &mut sums[row * width + col];
        entry.0 += c.z.unwrap_or_default();
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(sum, count)| {
            if count == 0 {
                f32::NAN
            } else {
                (sum / count as f64) as f32
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn cubic_reproduces_plane() {
        let points: Vec<Coord> = [(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (2.0, 1.0), (1.0, 3.0)]
            .iter()
            .map(|(x, y)| Coord::xyz(*x, *y, 3.0 * x - y + 1.0))
            .collect();
        let bounds = BoundingRect::new(0.0, 0.0, 4.0, 4.0);

        let grid = interpolate_grid(&points, &bounds, 4, 4, InterpolationMethod::Cubic);
        // south-up, cell (row 1, col 2) has the centre (2.5, 1.5)
        assert_abs_diff_eq!(grid[4 + 2], 3.0 * 2.5 - 1.5 + 1.0, epsilon = 1e-3);
    }

    #[test]
    fn nearest_takes_closest_point() {
        let points = [
            Coord::xyz(0.0, 0.0, 1.0),
            Coord::xyz(4.0, 0.0, 2.0),
            Coord::xyz(0.0, 4.0, 3.0),
            Coord::xyz(4.0, 4.0, 4.0),
        ];
        let bounds = BoundingRect::new(0.0, 0.0, 4.0, 4.0);

        let grid = interpolate_grid(&points, &bounds, 2, 2, InterpolationMethod::Nearest);
        assert_eq!(grid, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn degenerate_triangulation_is_all_nan() {
        let points = [
            Coord::xyz(0.0, 0.0, 1.0),
            Coord::xyz(1.0, 1.0, 2.0),
            Coord::xyz(2.0, 2.0, 3.0),
        ];
        let bounds = BoundingRect::new(0.0, 0.0, 2.0, 2.0);
        let grid = interpolate_grid(&points, &bounds, 2, 2, InterpolationMethod::Linear);
        assert!(grid.iter().all(|v| v.is_nan()));
    }
}
