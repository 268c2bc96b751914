//! Encoders writing a reprojected [`FeatureCollection`](geoconv_types::FeatureCollection) into output formats.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

pub mod dxf;
pub mod geojson;
pub mod kml;
pub mod shapefile;

/// Output artifact of a conversion job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    /// RFC 7946 GeoJSON document.
    GeoJson,
    /// Set of `.shp/.shx/.dbf/.prj` files in a directory.
    Shapefile,
    /// The shapefile set packed into one zip archive.
    ShapefileZip,
    /// KML document.
    Kml,
    /// Zipped KML document.
    Kmz,
    /// DXF drawing.
    Dxf,
    /// Single band heatmap raster.
    GeoTiff,
}

impl Artifact {
    /// All artifacts in the order a job produces them.
    pub const ALL: [Artifact; 7] = [
        Artifact::GeoJson,
        Artifact::Shapefile,
        Artifact::ShapefileZip,
        Artifact::Kml,
        Artifact::Kmz,
        Artifact::Dxf,
        Artifact::GeoTiff,
    ];

    /// Name of the output file (or directory for [`Artifact::Shapefile`]) for the given stem.
    pub fn file_name(&self, stem: &str) -> String {
        match self {
            Artifact::GeoJson => format!("{stem}.geojson"),
            Artifact::Shapefile => format!("{stem}_shp"),
            Artifact::ShapefileZip => format!("{stem}_shp.zip"),
            Artifact::Kml => format!("{stem}.kml"),
            Artifact::Kmz => format!("{stem}.kmz"),
            Artifact::Dxf => format!("{stem}.dxf"),
            Artifact::GeoTiff => format!("{stem}_heatmap.tif"),
        }
    }
}

impl Display for Artifact {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Artifact::GeoJson => "GeoJSON",
            Artifact::Shapefile => "shapefile",
            Artifact::ShapefileZip => "zipped shapefile",
            Artifact::Kml => "KML",
            Artifact::Kmz => "KMZ",
            Artifact::Dxf => "DXF",
            Artifact::GeoTiff => "GeoTIFF",
        };
        write!(f, "{name}")
    }
}
