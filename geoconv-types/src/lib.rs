//! Canonical geometry model used by the `geoconv` conversion engine.
//!
//! Every decoder produces a [`FeatureCollection`], every encoder consumes one. Between the two the
//! collection can be reprojected with a [`Reprojector`](geo::Reprojector) built from a
//! [`SpatialReference`](geo::SpatialReference), and flattened to 2d with
//! [`FeatureCollection::strip_z`].
//!
//! Coordinates are always stored in `(x, y[, z])` order. For geographic coordinate systems this means
//! `(longitude, latitude)`.

pub mod bounding_rect;
pub mod collection;
pub mod coord;
pub mod error;
pub mod feature;
pub mod geo;
pub mod geometry;
pub mod segment;

pub use bounding_rect::BoundingRect;
pub use collection::FeatureCollection;
pub use coord::Coord;
pub use error::GeoconvTypesError;
pub use feature::{AttrValue, Attributes, Feature, FeatureKind, Grouping};
pub use geometry::{Geometry, ShapeClass};
pub use segment::Segment;
