//! Decoders turning native drawing and survey formats into a [`FeatureCollection`].

use std::fmt::{Display, Formatter};
use std::path::Path;

use geoconv_types::FeatureCollection;
use serde::{Deserialize, Serialize};

use crate::config::ConversionConfig;
use crate::diagnostics::Diagnostics;
use crate::error::GeoconvError;

pub mod dxf;
pub mod gpx;
pub mod kml;
pub mod tabular;

/// Format of an input file.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// AutoCAD drawing exchange format, ASCII or binary.
    Dxf,
    /// Keyhole markup language.
    Kml,
    /// Zipped KML.
    Kmz,
    /// GPS exchange format.
    Gpx,
    /// Delimited point list (`id, x, y, elevation, description[, group]`).
    Tabular,
}

impl Display for InputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InputFormat::Dxf => "DXF",
            InputFormat::Kml => "KML",
            InputFormat::Kmz => "KMZ",
            InputFormat::Gpx => "GPX",
            InputFormat::Tabular => "tabular",
        };
        write!(f, "{name}")
    }
}

impl InputFormat {
    /// Format for the given file extension (case-insensitive, without the dot).
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "dxf" => Some(Self::Dxf),
            "kml" => Some(Self::Kml),
            "kmz" => Some(Self::Kmz),
            "gpx" => Some(Self::Gpx),
            "txt" | "csv" | "tsv" | "xyz" => Some(Self::Tabular),
            _ => None,
        }
    }

    /// Guesses the format from the first bytes of the content. Anything unrecognized is taken for tabular data.
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(b"PK\x03\x04") {
            return Self::Kmz;
        }
        if bytes.starts_with(dxf::groups::BINARY_SENTINEL) {
            return Self::Dxf;
        }

        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(1024)]);
        let head = head.trim_start_matches('\u{feff}').trim_start();
        if head.starts_with('<') {
            if head.contains("<gpx") {
                return Self::Gpx;
            }
            return Self::Kml;
        }

        let mut lines = head.lines().map(str::trim);
        if let (Some("0"), Some("SECTION")) = (lines.next(), lines.next()) {
            return Self::Dxf;
        }

        Self::Tabular
    }
}

/// Result of a decoder: the features and the non-fatal problems found on the way.
#[derive(Debug, Clone, Default)]
pub struct Decoded {
    /// Decoded features in document order.
    pub collection: FeatureCollection,
    /// Skipped entities and other remarks.
    pub diagnostics: Diagnostics,
}

/// Decodes an in-memory input of the given format.
pub fn decode(
    bytes: &[u8],
    format: InputFormat,
    config: &ConversionConfig,
) -> Result<Decoded, GeoconvError> {
    log::debug!("decoding {} bytes of {format} input", bytes.len());
    match format {
        InputFormat::Dxf => dxf::decode(bytes, &(&config.text_orientation).into()),
        InputFormat::Kml => kml::decode_kml(bytes),
        InputFormat::Kmz => kml::decode_kmz(bytes),
        InputFormat::Gpx => gpx::decode_gpx(bytes),
        InputFormat::Tabular => tabular::decode_tabular(bytes, config.tabular_mode),
    }
}

/// Reads and decodes a file. The format is taken from the file extension, or guessed from the content if the
/// extension is unknown.
pub fn decode_file(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<Decoded, GeoconvError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(InputFormat::from_extension)
        .unwrap_or_else(|| InputFormat::sniff(&bytes));

    decode(&bytes, format, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension() {
        assert_eq!(InputFormat::from_extension("DXF"), Some(InputFormat::Dxf));
        assert_eq!(InputFormat::from_extension("kmz"), Some(InputFormat::Kmz));
        assert_eq!(InputFormat::from_extension("csv"), Some(InputFormat::Tabular));
        assert_eq!(InputFormat::from_extension("shp"), None);
    }

    #[test]
    fn sniff_content() {
        assert_eq!(InputFormat::sniff(b"PK\x03\x04rest"), InputFormat::Kmz);
        assert_eq!(
            InputFormat::sniff(b"AutoCAD Binary DXF\r\n\x1a\x00"),
            InputFormat::Dxf
        );
        assert_eq!(InputFormat::sniff(b"  0\nSECTION\n  2\nHEADER\n"), InputFormat::Dxf);
        assert_eq!(
            InputFormat::sniff(b"<?xml version=\"1.0\"?><gpx version=\"1.1\">"),
            InputFormat::Gpx
        );
        assert_eq!(
            InputFormat::sniff(b"<?xml version=\"1.0\"?><kml xmlns=\"http://www.opengis.net/kml/2.2\">"),
            InputFormat::Kml
        );
        assert_eq!(InputFormat::sniff(b"1,0,0,10,A"), InputFormat::Tabular);
    }

    #[test]
    fn decode_file_uses_extension() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("survey.txt");
        std::fs::write(&path, "1 10 20 5 BM\n").expect("write input");

        let decoded = decode_file(&path, &ConversionConfig::default()).expect("decoded");
        assert_eq!(decoded.collection.len(), 1);
    }
}
