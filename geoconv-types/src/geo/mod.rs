//! Coordinate reference systems and reprojection of [`FeatureCollection`](crate::FeatureCollection)s between them.

mod crs;
mod datum;
mod projection;

pub use crs::{Crs, ProjectionType};
pub use datum::Datum;
pub use projection::{GeodesyProjection, Projection, Reprojector, SpatialReference, WebMercator};
