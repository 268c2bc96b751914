//! Error types used by the crate.

use geoconv_types::GeoconvTypesError;
use thiserror::Error;

use crate::decode::InputFormat;
use crate::encode::Artifact;

/// Geoconv error type.
///
/// Problems with single entities or rows are not errors: they are skipped and reported through
/// [`Diagnostics`](crate::Diagnostics) instead.
#[derive(Debug, Error)]
pub enum GeoconvError {
    /// The input cannot be read as the given format.
    #[error("failed to decode {format} input: {message}")]
    Decode {
        /// Format the input was decoded as.
        format: InputFormat,
        /// What went wrong.
        message: String,
    },
    /// The drawing has a layer table, but every layer in it is frozen or turned off.
    #[error("drawing declares layers but none of them is visible")]
    NoVisibleLayers,
    /// Not enough points with elevation to interpolate a surface.
    #[error("at least 3 points with elevation are required for a heatmap, found {found}")]
    InsufficientPoints {
        /// Number of usable points.
        found: usize,
    },
    /// Unknown CRS or failed coordinate transformation.
    #[error("reprojection failed: {0}")]
    Reprojection(#[from] GeoconvTypesError),
    /// One output artifact could not be produced.
    #[error("failed to write {artifact}: {message}")]
    Encode {
        /// Artifact that failed.
        artifact: Artifact,
        /// What went wrong.
        message: String,
    },
    /// Configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Error reading or writing files.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Error reading or writing zip archives (KMZ and zipped shapefiles).
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// Error reading or writing XML (KML).
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    /// Error writing a DXF drawing.
    #[error("dxf error: {0}")]
    Dxf(#[from] dxf::DxfError),
    /// Error writing shapefiles.
    #[error("shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),
    /// Error writing GeoTIFF.
    #[error("tiff error: {0}")]
    Tiff(#[from] tiff::TiffError),
    /// Error reading configuration or writing GeoJSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Error reading delimited text.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl GeoconvError {
    pub(crate) fn decode(format: InputFormat, message: impl Into<String>) -> Self {
        Self::Decode {
            format,
            message: message.into(),
        }
    }

    pub(crate) fn encode(artifact: Artifact, message: impl Into<String>) -> Self {
        Self::Encode {
            artifact,
            message: message.into(),
        }
    }
}
