//! KML and KMZ encoder.
//!
//! Placemarks are put into one folder per feature type. Folders without features are not written.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use geoconv_types::geometry::close_ring;
use geoconv_types::{Coord, Feature, FeatureCollection, FeatureKind, Geometry};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::config::KmlStyle;
use crate::encode::Artifact;
use crate::error::GeoconvError;

const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";

/// Converts a `#rrggbb` or `#rrggbbaa` colour into the `aabbggrr` notation of KML.
pub fn kml_color(color: &str) -> Option<String> {
    let hex = color.trim().trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let (rgb, alpha) = match hex.len() {
        6 => (hex, "ff"),
        8 => (&hex[..6], &hex[6..]),
        _ => return None,
    };

    Some(format!("{alpha}{}{}{}", &rgb[4..6], &rgb[2..4], &rgb[0..2]).to_ascii_lowercase())
}

/// Resolved colours of a [`KmlStyle`].
#[derive(Debug, Clone)]
struct PlacemarkStyle {
    point_color: String,
    line_color: String,
    line_width: f64,
}

impl PlacemarkStyle {
    fn new(style: &KmlStyle, artifact: Artifact) -> Result<Self, GeoconvError> {
        let color = |value: &str| {
            kml_color(value)
                .ok_or_else(|| GeoconvError::encode(artifact, format!("invalid colour '{value}'")))
        };

        Ok(Self {
            point_color: color(&style.point_color)?,
            line_color: color(&style.line_color)?,
            line_width: style.line_width,
        })
    }
}

struct KmlWriter<W: Write> {
    writer: Writer<W>,
    artifact: Artifact,
}

impl<W: Write> KmlWriter<W> {
    fn event<'a>(&mut self, event: impl Into<Event<'a>>) -> Result<(), GeoconvError> {
        let artifact = self.artifact;
        self.writer
            .write_event(event.into())
            .map_err(|err| GeoconvError::encode(artifact, err.to_string()))
    }

    fn start(&mut self, name: &str) -> Result<(), GeoconvError> {
        self.event(Event::Start(BytesStart::new(name)))
    }

    fn end(&mut self, name: &str) -> Result<(), GeoconvError> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn element(&mut self, name: &str, text: &str) -> Result<(), GeoconvError> {
        self.start(name)?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn coordinates(&mut self, coords: &[Coord]) -> Result<(), GeoconvError> {
        let text = coords
            .iter()
            .map(|c| match c.z {
                Some(z) => format!("{},{},{z}", c.x, c.y),
                None => format!("{},{}", c.x, c.y),
            })
            .collect::<Vec<_>>()
            .join(" ");
        self.element("coordinates", &text)
    }

    fn point(&mut self, c: &Coord) -> Result<(), GeoconvError> {
        self.start("Point")?;
        self.coordinates(std::slice::from_ref(c))?;
        self.end("Point")
    }

    fn line_string(&mut self, line: &[Coord]) -> Result<(), GeoconvError> {
        self.start("LineString")?;
        self.element("tessellate", "1")?;
        self.coordinates(line)?;
        self.end("LineString")
    }

    fn polygon(&mut self, rings: &[Vec<Coord>]) -> Result<(), GeoconvError> {
        self.start("Polygon")?;
        for (index, ring) in rings.iter().enumerate() {
            let boundary = if index == 0 {
                "outerBoundaryIs"
            } else {
                "innerBoundaryIs"
            };
            let mut ring = ring.clone();
            close_ring(&mut ring);

            self.start(boundary)?;
            self.start("LinearRing")?;
            self.coordinates(&ring)?;
            self.end("LinearRing")?;
            self.end(boundary)?;
        }
        self.end("Polygon")
    }

    fn geometry(&mut self, geometry: &Geometry) -> Result<(), GeoconvError> {
        match geometry {
            Geometry::Point(c) => self.point(c),
            Geometry::LineString(line) => self.line_string(line),
            Geometry::Polygon(rings) => self.polygon(rings),
            Geometry::MultiPoint(points) => {
                self.start("MultiGeometry")?;
                for c in points {
                    self.point(c)?;
                }
                self.end("MultiGeometry")
            }
            Geometry::MultiLineString(lines) => {
                self.start("MultiGeometry")?;
                for line in lines {
                    self.line_string(line)?;
                }
                self.end("MultiGeometry")
            }
            Geometry::MultiPolygon(polygons) => {
                self.start("MultiGeometry")?;
                for rings in polygons {
                    self.polygon(rings)?;
                }
                self.end("MultiGeometry")
            }
        }
    }

    fn style(&mut self, style: &PlacemarkStyle, geometry: &Geometry) -> Result<(), GeoconvError> {
        self.start("Style")?;
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => {
                self.start("IconStyle")?;
                self.element("color", &style.point_color)?;
                self.end("IconStyle")?;
            }
            _ => {
                self.start("LineStyle")?;
                self.element("color", &style.line_color)?;
                self.element("width", &style.line_width.to_string())?;
                self.end("LineStyle")?;
                self.start("PolyStyle")?;
                self.element("fill", "0")?;
                self.end("PolyStyle")?;
            }
        }
        self.end("Style")
    }

    fn placemark(
        &mut self,
        feature: &Feature,
        style: Option<&PlacemarkStyle>,
    ) -> Result<(), GeoconvError> {
        let attributes = &feature.attributes;
        self.start("Placemark")?;

        if let Some(name) = attributes.name.as_ref().or(attributes.text.as_ref()) {
            self.element("name", name)?;
        }
        if let Some(description) = attributes.extra.get("description") {
            self.element("description", &description.to_string())?;
        }
        if let Some(style) = style {
            self.style(style, &feature.geometry)?;
        }

        let mut data: Vec<(&str, String)> = vec![];
        if let Some(text) = &attributes.text {
            data.push(("text", text.clone()));
        }
        if let Some(rotation) = attributes.rotation {
            data.push(("rotation", rotation.to_string()));
        }
        data.extend(
            attributes
                .extra
                .iter()
                .filter(|(key, _)| key.as_str() != "description")
                .map(|(key, value)| (key.as_str(), value.to_string())),
        );
        if !data.is_empty() {
            self.start("ExtendedData")?;
            for (name, value) in data {
                self.data(name, &value)?;
            }
            self.end("ExtendedData")?;
        }

        self.geometry(&feature.geometry)?;
        self.end("Placemark")
    }

    fn data(&mut self, name: &str, value: &str) -> Result<(), GeoconvError> {
        let mut start = BytesStart::new("Data");
        start.push_attribute(("name", name));
        self.event(Event::Start(start))?;
        self.element("value", value)?;
        self.end("Data")
    }
}

/// Serializes the collection into a KML document.
pub fn to_kml(
    collection: &FeatureCollection,
    document_name: &str,
    style: Option<&KmlStyle>,
) -> Result<Vec<u8>, GeoconvError> {
    encode(collection, document_name, style, Artifact::Kml)
}

fn encode(
    collection: &FeatureCollection,
    document_name: &str,
    style: Option<&KmlStyle>,
    artifact: Artifact,
) -> Result<Vec<u8>, GeoconvError> {
    let style = style
        .map(|style| PlacemarkStyle::new(style, artifact))
        .transpose()?;

    let mut kml = KmlWriter {
        writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        artifact,
    };

    kml.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut root = BytesStart::new("kml");
    root.push_attribute(("xmlns", KML_NAMESPACE));
    kml.event(Event::Start(root))?;
    kml.start("Document")?;
    kml.element("name", document_name)?;

    for kind in FeatureKind::ALL {
        let features: Vec<&Feature> = collection.iter().filter(|f| f.kind() == kind).collect();
        if features.is_empty() {
            continue;
        }

        kml.start("Folder")?;
        kml.element("name", kind.title())?;
        for feature in &features {
            kml.placemark(feature, style.as_ref())?;
        }
        kml.end("Folder")?;
        log::debug!("KML folder {}: {} placemarks", kind.title(), features.len());
    }

    kml.end("Document")?;
    kml.end("kml")?;

    Ok(kml.writer.into_inner())
}

/// Writes the collection into a KML file.
pub fn write_kml(
    collection: &FeatureCollection,
    path: impl AsRef<Path>,
    style: Option<&KmlStyle>,
) -> Result<(), GeoconvError> {
    let path = path.as_ref();
    let document = encode(collection, &document_name(path), style, Artifact::Kml)?;
    std::fs::write(path, document)?;

    log::info!("wrote {} features to {}", collection.len(), path.display());
    Ok(())
}

/// Writes the collection into a KMZ archive holding a single `doc.kml` member.
pub fn write_kmz(
    collection: &FeatureCollection,
    path: impl AsRef<Path>,
    style: Option<&KmlStyle>,
) -> Result<(), GeoconvError> {
    let path = path.as_ref();
    let document = encode(collection, &document_name(path), style, Artifact::Kmz)?;

    let mut zip = zip::ZipWriter::new(BufWriter::new(File::create(path)?));
    zip.start_file(
        "doc.kml",
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
    )?;
    zip.write_all(&document)?;
    zip.finish()?.flush()?;

    log::info!("wrote {} features to {}", collection.len(), path.display());
    Ok(())
}

fn document_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "geoconv".to_string())
}
