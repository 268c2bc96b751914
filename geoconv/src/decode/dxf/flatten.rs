//! Approximation of curved CAD primitives with polylines.

use std::f64::consts::TAU;

use geoconv_types::Coord;

use super::entities::{BoundaryPath, HatchEdge, SplineData, Vertex};

/// Number of segments used for a full turn of a circle, arc or ellipse.
pub const SEGMENTS_PER_TURN: usize = 64;
/// Number of points sampled along a spline.
pub const SPLINE_SAMPLES: usize = 100;

const EPSILON: f64 = 1e-9;

fn segments_for(sweep: f64) -> usize {
    ((SEGMENTS_PER_TURN as f64 * sweep.abs() / TAU).ceil() as usize).max(1)
}

fn with_z(x: f64, y: f64, z: Option<f64>) -> Coord {
    Coord { x, y, z }
}

/// Circle as a closed ring of `SEGMENTS_PER_TURN + 1` coordinates. The last coordinate is an exact copy of the first.
pub fn circle(center: &Coord, radius: f64) -> Vec<Coord> {
    let mut points: Vec<Coord> = (0..SEGMENTS_PER_TURN)
        .map(|i| {
            let angle = TAU * i as f64 / SEGMENTS_PER_TURN as f64;
            with_z(
                center.x + radius * angle.cos(),
                center.y + radius * angle.sin(),
                center.z,
            )
        })
        .collect();
    points.push(points[0]);

    points
}

/// Counterclockwise arc from `start` to `end` (degrees), both endpoints included.
///
/// An end angle that is not greater than the start angle wraps around a full turn.
pub fn arc(center: &Coord, radius: f64, start: f64, end: f64) -> Vec<Coord> {
    let mut sweep = (end - start).to_radians();
    if sweep <= 0.0 {
        sweep += TAU;
    }

    arc_points(center, radius, start.to_radians(), sweep)
}

fn arc_points(center: &Coord, radius: f64, start: f64, sweep: f64) -> Vec<Coord> {
    let segments = segments_for(sweep);
    (0..=segments)
        .map(|i| {
            let angle = start + sweep * i as f64 / segments as f64;
            with_z(
                center.x + radius * angle.cos(),
                center.y + radius * angle.sin(),
                center.z,
            )
        })
        .collect()
}

/// Elliptical arc between two parameters (radians).
///
/// `major_axis` is the endpoint of the major axis relative to the center, the minor axis is perpendicular to it
/// with length `ratio * |major_axis|`.
pub fn ellipse(center: &Coord, major_axis: &Coord, ratio: f64, start: f64, end: f64) -> Vec<Coord> {
    let mut sweep = end - start;
    if sweep <= 0.0 {
        sweep += TAU;
    }

    let mut points = ellipse_points(center, major_axis, ratio, start, sweep);
    if (sweep - TAU).abs() < EPSILON {
        if let Some(first) = points.first().copied() {
            if let Some(last) = points.last_mut() {
                *last = first;
            }
        }
    }

    points
}

fn ellipse_points(
    center: &Coord,
    major_axis: &Coord,
    ratio: f64,
    start: f64,
    sweep: f64,
) -> Vec<Coord> {
    let (minor_x, minor_y) = (-major_axis.y * ratio, major_axis.x * ratio);
    let segments = segments_for(sweep);
    (0..=segments)
        .map(|i| {
            let t = start + sweep * i as f64 / segments as f64;
            let (sin, cos) = t.sin_cos();
            with_z(
                center.x + major_axis.x * cos + minor_x * sin,
                center.y + major_axis.y * cos + minor_y * sin,
                center.z,
            )
        })
        .collect()
}

/// Points of the segment from `from` to `to` with the given bulge, excluding `from` and ending exactly at `to`.
///
/// The bulge is the tangent of a quarter of the included angle, positive for counterclockwise arcs.
pub fn bulge_segment(from: &Coord, to: &Coord, bulge: f64) -> Vec<Coord> {
    let (dx, dy) = (to.x - from.x, to.y - from.y);
    let chord = dx.hypot(dy);
    if bulge.abs() < EPSILON || chord < EPSILON {
        return vec![*to];
    }

    let theta = 4.0 * bulge.atan();
    let radius = chord / (2.0 * (theta / 2.0).sin());
    let offset = radius * (theta / 2.0).cos();
    let center = Coord::xy(
        (from.x + to.x) / 2.0 - dy / chord * offset,
        (from.y + to.y) / 2.0 + dx / chord * offset,
    );
    let start = (from.y - center.y).atan2(from.x - center.x);
    let radius = radius.abs();

    let segments = segments_for(theta);
    let mut points: Vec<Coord> = (1..segments)
        .map(|i| {
            let angle = start + theta * i as f64 / segments as f64;
            with_z(
                center.x + radius * angle.cos(),
                center.y + radius * angle.sin(),
                from.z,
            )
        })
        .collect();
    points.push(*to);

    points
}

/// Vertex list of a polyline with bulges expanded. Closed polylines end with a copy of the first vertex.
pub fn polyline(vertices: &[Vertex], closed: bool) -> Vec<Coord> {
    let Some(first) = vertices.first() else {
        return vec![];
    };

    let mut points = vec![first.coord];
    for pair in vertices.windows(2) {
        points.extend(bulge_segment(&pair[0].coord, &pair[1].coord, pair[0].bulge));
    }

    if closed && vertices.len() > 1 {
        if let Some(last) = vertices.last() {
            if last.coord.equal_xy(&first.coord) {
                if let Some(end) = points.last_mut() {
                    *end = first.coord;
                }
            } else {
                points.extend(bulge_segment(&last.coord, &first.coord, last.bulge));
            }
        }
    }

    points
}

/// Samples a B-spline with the de Boor algorithm.
///
/// If the knot vector does not fit the control points, the control points themselves (or the fit points if there
/// are no control points) are returned.
pub fn spline(data: &SplineData) -> Vec<Coord> {
    match sample_spline(data) {
        Some(points) => points,
        None if data.control_points.len() >= 2 => data.control_points.clone(),
        None => data.fit_points.clone(),
    }
}

fn sample_spline(data: &SplineData) -> Option<Vec<Coord>> {
    let degree = data.degree;
    let control = &data.control_points;
    let knots = &data.knots;
    let n = control.len();

    if n <= degree || knots.len() != n + degree + 1 {
        return None;
    }
    if knots.windows(2).any(|pair| pair[1] < pair[0]) || knots.iter().any(|k| !k.is_finite()) {
        return None;
    }

    let (t_min, t_max) = (knots[degree], knots[n]);
    if t_max - t_min <= EPSILON {
        return None;
    }

    let has_z = control.iter().any(|c| c.z.is_some());
    let rational = data.weights.len() == n && data.weights.iter().all(|w| *w > 0.0);
    let homogeneous: Vec<[f64; 4]> = control
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let w = if rational { data.weights[i] } else { 1.0 };
            [c.x * w, c.y * w, c.z.unwrap_or(0.0) * w, w]
        })
        .collect();

    let points = (0..SPLINE_SAMPLES)
        .map(|i| {
            let t = t_min + (t_max - t_min) * i as f64 / (SPLINE_SAMPLES - 1) as f64;
            let span = find_span(knots, degree, n, t);
            let [x, y, z, w] = de_boor(knots, &homogeneous, degree, span, t);
            with_z(x / w, y / w, has_z.then_some(z / w))
        })
        .collect();

    Some(points)
}

fn find_span(knots: &[f64], degree: usize, n: usize, t: f64) -> usize {
    if t >= knots[n] {
        let mut span = n - 1;
        while span > degree && knots[span] >= knots[n] {
            span -= 1;
        }
        return span;
    }

    (degree..n)
        .rev()
        .find(|&k| knots[k] <= t)
        .unwrap_or(degree)
}

fn de_boor(knots: &[f64], control: &[[f64; 4]], degree: usize, span: usize, t: f64) -> [f64; 4] {
    let mut d: Vec<[f64; 4]> = (0..=degree).map(|j| control[j + span - degree]).collect();

    for r in 1..=degree {
        for j in (r..=degree).rev() {
            let left = knots[j + span - degree];
            let right = knots[j + 1 + span - r];
            let alpha = if right - left > EPSILON {
                (t - left) / (right - left)
            } else {
                0.0
            };
            for axis in 0..4 {
                d[j][axis] = (1.0 - alpha) * d[j - 1][axis] + alpha * d[j][axis];
            }
        }
    }

    d[degree]
}

/// Outline of a hatch boundary path.
///
/// Edges are concatenated in order, dropping the first point of an edge when it repeats the end of the previous one.
/// If the outline ends where it started, the last coordinate is snapped to an exact copy of the first.
pub fn hatch_path(path: &BoundaryPath) -> Vec<Coord> {
    let mut points = match path {
        BoundaryPath::Polyline { vertices, closed } => polyline(vertices, *closed),
        BoundaryPath::Edges(edges) => {
            let mut points: Vec<Coord> = vec![];
            for edge in edges {
                let edge_points = hatch_edge(edge);
                let skip = match (points.last(), edge_points.first()) {
                    (Some(last), Some(first)) => usize::from(last.distance_sq(first) < EPSILON),
                    _ => 0,
                };
                points.extend(edge_points.into_iter().skip(skip));
            }
            points
        }
    };

    if points.len() > 2 {
        let first = points[0];
        if let Some(last) = points.last_mut() {
            if last.distance_sq(&first) < EPSILON {
                *last = first;
            }
        }
    }

    points
}

fn hatch_edge(edge: &HatchEdge) -> Vec<Coord> {
    match edge {
        HatchEdge::Line(from, to) => vec![*from, *to],
        HatchEdge::Arc {
            center,
            radius,
            start_angle,
            end_angle,
            ccw,
        } => {
            if *ccw {
                arc(center, *radius, *start_angle, *end_angle)
            } else {
                let mut sweep = (end_angle - start_angle).to_radians();
                if sweep <= 0.0 {
                    sweep += TAU;
                }
                arc_points(center, *radius, -start_angle.to_radians(), -sweep)
            }
        }
        HatchEdge::Ellipse {
            center,
            major_axis,
            ratio,
            start_angle,
            end_angle,
            ccw,
        } => {
            let mut sweep = (end_angle - start_angle).to_radians();
            if sweep <= 0.0 {
                sweep += TAU;
            }
            if *ccw {
                ellipse_points(center, major_axis, *ratio, start_angle.to_radians(), sweep)
            } else {
                ellipse_points(center, major_axis, *ratio, -start_angle.to_radians(), -sweep)
            }
        }
        HatchEdge::Spline(data) => spline(data),
    }
}
