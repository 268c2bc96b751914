//! Error type used by the crate.

use thiserror::Error;

/// Error enum.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoconvTypesError {
    /// The string is not an `authority:code` pair.
    #[error("invalid CRS identifier: {0:?}")]
    InvalidCrs(String),
    /// The `authority:code` pair is well formed but not known to the engine.
    #[error("unsupported CRS: {0}")]
    UnsupportedCrs(String),
    /// The transformation between two coordinate systems could not be set up.
    #[error("cannot build transformation from {from} to {to}: {reason}")]
    Transformation {
        /// Source CRS.
        from: String,
        /// Target CRS.
        to: String,
        /// Error reported by the projection library.
        reason: String,
    },
    /// The string is not a name of a [`FeatureKind`](crate::FeatureKind).
    #[error("unknown feature kind: {0:?}")]
    UnknownFeatureKind(String),
    /// A coordinate could not be reprojected.
    #[error("failed to reproject coordinate ({x}, {y})")]
    Coordinate {
        /// X (or longitude) of the offending coordinate.
        x: f64,
        /// Y (or latitude) of the offending coordinate.
        y: f64,
    },
}
