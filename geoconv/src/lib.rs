//! Geoconv converts survey and drawing files between geospatial formats.
//!
//! # Quick start
//!
//! Convert a DXF drawing in UTM coordinates into GeoJSON, shapefiles, KML and a re-projected DXF:
//!
//! ```no_run
//! use geoconv::{ConversionConfig, Pipeline};
//!
//! let config = ConversionConfig::from_json_str(r#"{ "input_crs": "EPSG:32717", "output_crs": "EPSG:4326" }"#)?;
//! let report = Pipeline::new(config)?.convert_file("site.dxf", "out")?;
//! for artifact in &report.artifacts {
//!     println!("{}: {:?}", artifact.artifact, artifact.result);
//! }
//! # Ok::<(), geoconv::GeoconvError>(())
//! ```
//!
//! # Main components
//!
//! * [`decode`] turns DXF, KML/KMZ, GPX and tabular point lists into a
//!   [`FeatureCollection`](geoconv_types::FeatureCollection). Entities that cannot be converted are skipped and
//!   reported in [`Diagnostics`].
//! * [`Reprojector`](geoconv_types::geo::Reprojector) from `geoconv-types` moves the collection between coordinate
//!   systems. A job reprojects exactly once.
//! * [`encode`] writes the collection as GeoJSON, shapefiles, KML/KMZ or DXF.
//! * [`heatmap`] interpolates point elevations into a georeferenced raster and writes it as GeoTIFF.
//! * [`Pipeline`] wires the steps together and reports the result of every artifact separately.
//!
//! Everything runs synchronously on the calling thread. Jobs share no state.

pub mod config;
pub mod decode;
pub mod diagnostics;
pub mod encode;
pub mod error;
pub mod heatmap;
pub mod pipeline;

pub use config::ConversionConfig;
pub use decode::{decode, decode_file, Decoded, InputFormat};
pub use diagnostics::{Diagnostics, EntitySkipped};
pub use encode::Artifact;
pub use error::GeoconvError;
pub use geoconv_types;
pub use pipeline::{ArtifactReport, ConversionReport, Pipeline};
