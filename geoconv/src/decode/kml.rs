//! KML and KMZ decoder.
//!
//! The primary parser walks `Document/Folder/Placemark` elements of the KML namespace and keeps placemark metadata.
//! If it fails or finds nothing, a namespace-tolerant fallback picks up geometries by their local element names.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use geoconv_types::geometry::close_ring;
use geoconv_types::{AttrValue, Coord, Feature, FeatureCollection, FeatureKind, Geometry};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::{NsReader, Reader};

use crate::decode::{Decoded, InputFormat};
use crate::diagnostics::Diagnostics;
use crate::error::GeoconvError;

const KML_NAMESPACES: [&[u8]; 2] = [b"http://www.opengis.net/kml/", b"http://earth.google.com/kml/"];

fn is_kml_namespace(ns: &[u8]) -> bool {
    KML_NAMESPACES.iter().any(|prefix| ns.starts_with(prefix))
}

/// Decodes a KML document.
pub fn decode_kml(bytes: &[u8]) -> Result<Decoded, GeoconvError> {
    let text = String::from_utf8_lossy(bytes);
    decode_text(&text, InputFormat::Kml)
}

/// Decodes a KMZ archive: `doc.kml` if present, otherwise the first `.kml` member.
pub fn decode_kmz(bytes: &[u8]) -> Result<Decoded, GeoconvError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| GeoconvError::decode(InputFormat::Kmz, err.to_string()))?;

    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    let member = names
        .iter()
        .find(|name| name.eq_ignore_ascii_case("doc.kml"))
        .or_else(|| {
            names
                .iter()
                .find(|name| name.to_ascii_lowercase().ends_with(".kml"))
        })
        .ok_or_else(|| GeoconvError::decode(InputFormat::Kmz, "archive contains no .kml file"))?;
    log::debug!("reading KMZ member {member}");

    let mut content = vec![];
    archive
        .by_name(member)
        .map_err(|err| GeoconvError::decode(InputFormat::Kmz, err.to_string()))?
        .read_to_end(&mut content)?;

    decode_text(&String::from_utf8_lossy(&content), InputFormat::Kmz)
}

fn decode_text(text: &str, format: InputFormat) -> Result<Decoded, GeoconvError> {
    let mut diagnostics = Diagnostics::new();

    let primary_error = match parse_structured(text) {
        Ok(builder) if !builder.features.is_empty() => {
            diagnostics.merge(builder.diagnostics);
            return Ok(Decoded {
                collection: builder.features.into(),
                diagnostics,
            });
        }
        Ok(_) => {
            log::debug!("structured KML parse found no placemarks, trying fallback parser");
            None
        }
        Err(err) => {
            log::warn!("structured KML parse failed ({err}), trying fallback parser");
            Some(err.to_string())
        }
    };

    let builder = parse_tolerant(text).map_err(|err| {
        let message = match &primary_error {
            Some(primary) => format!("{primary}; fallback parser: {err}"),
            None => err.to_string(),
        };
        GeoconvError::decode(format, message)
    })?;

    diagnostics.merge(builder.diagnostics);
    if builder.features.is_empty() {
        log::warn!("KML document contains no geometries");
        diagnostics.note("document contains no geometries");
    }

    Ok(Decoded {
        collection: FeatureCollection::from(builder.features),
        diagnostics,
    })
}

fn local_name(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    match name.rfind(':') {
        Some(position) => name[position + 1..].to_string(),
        None => name.into_owned(),
    }
}

fn attribute(e: &BytesStart, key: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == key.as_bytes())
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

/// Structured walk over elements of the KML namespace.
fn parse_structured(text: &str) -> Result<KmlBuilder, quick_xml::Error> {
    let mut reader = NsReader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut builder = KmlBuilder::new(true);
    // Depth of elements outside the KML namespace (e.g. `gx:Track`), whose content is ignored.
    let mut foreign_depth = 0usize;

    loop {
        let (resolved, event) = reader.read_resolved_event()?;
        let in_kml = matches!(resolved, ResolveResult::Bound(ns) if is_kml_namespace(ns.0));
        match event {
            Event::Start(e) => {
                if foreign_depth > 0 || !in_kml {
                    foreign_depth += 1;
                } else {
                    builder.start(&local_name(e.local_name().as_ref()), &e);
                }
            }
            Event::Empty(e) => {
                if foreign_depth == 0 && in_kml {
                    let name = local_name(e.local_name().as_ref());
                    builder.start(&name, &e);
                    builder.end(&name);
                }
            }
            Event::End(e) => {
                if foreign_depth > 0 {
                    foreign_depth -= 1;
                } else {
                    builder.end(&local_name(e.local_name().as_ref()));
                }
            }
            Event::Text(e) => {
                if foreign_depth == 0 {
                    builder.text(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if foreign_depth == 0 {
                    builder.text(&String::from_utf8_lossy(&e));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(builder)
}

/// Namespace-tolerant walk matching geometry elements by local name only.
fn parse_tolerant(text: &str) -> Result<KmlBuilder, quick_xml::Error> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut builder = KmlBuilder::new(false);

    loop {
        match reader.read_event()? {
            Event::Start(e) => builder.start(&local_name(e.name().as_ref()), &e),
            Event::Empty(e) => {
                let name = local_name(e.name().as_ref());
                builder.start(&name, &e);
                builder.end(&name);
            }
            Event::End(e) => builder.end(&local_name(e.name().as_ref())),
            Event::Text(e) => builder.text(&e.unescape()?),
            Event::CData(e) => builder.text(&String::from_utf8_lossy(&e)),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(builder)
}

/// Parses whitespace separated `lon,lat[,alt]` tuples. Whitespace next to a comma belongs to the
/// tuple, so `lon, lat` is one coordinate. Malformed tuples are skipped.
pub fn parse_coordinates(text: &str) -> (Vec<Coord>, usize) {
    let mut coords = vec![];
    let mut malformed = 0;
    let joined = text.split(',').map(str::trim).collect::<Vec<_>>().join(",");
    for tuple in joined.split_whitespace() {
        let values: Result<Vec<f64>, _> = tuple
            .split(',')
            .filter(|v| !v.is_empty())
            .map(str::parse::<f64>)
            .collect();
        match values.ok().as_deref().and_then(Coord::from_slice) {
            Some(coord) if coord.is_finite() => coords.push(coord),
            _ => malformed += 1,
        }
    }

    (coords, malformed)
}

#[derive(Debug, Default)]
struct PlacemarkState {
    name: Option<String>,
    description: Option<String>,
    extended: BTreeMap<String, AttrValue>,
    geometries: Vec<(Geometry, FeatureKind)>,
}

#[derive(Debug, Default)]
struct PolygonState {
    outer: Option<Vec<Coord>>,
    inner: Vec<Vec<Coord>>,
}

/// Turns a stream of element events into features.
struct KmlBuilder {
    /// Keep placemark metadata and folder layers.
    with_metadata: bool,
    path: Vec<String>,
    folders: Vec<Option<String>>,
    placemark: Option<PlacemarkState>,
    polygons: Vec<PolygonState>,
    coordinates: Vec<Coord>,
    data_name: Option<String>,
    text: String,
    features: Vec<Feature>,
    diagnostics: Diagnostics,
}

impl KmlBuilder {
    fn new(with_metadata: bool) -> Self {
        Self {
            with_metadata,
            path: vec![],
            folders: vec![],
            placemark: None,
            polygons: vec![],
            coordinates: vec![],
            data_name: None,
            text: String::new(),
            features: vec![],
            diagnostics: Diagnostics::new(),
        }
    }

    fn parent(&self) -> Option<&str> {
        self.path.iter().rev().nth(1).map(String::as_str)
    }

    fn inside(&self, name: &str) -> bool {
        self.path.iter().any(|p| p == name)
    }

    fn layer(&self) -> Option<String> {
        let names: Vec<&str> = self.folders.iter().flatten().map(String::as_str).collect();
        (!names.is_empty()).then(|| names.join("/"))
    }

    fn start(&mut self, name: &str, e: &BytesStart) {
        self.path.push(name.to_string());
        self.text.clear();

        match name {
            "Folder" if self.with_metadata => self.folders.push(None),
            "Placemark" if self.with_metadata => self.placemark = Some(PlacemarkState::default()),
            "Polygon" => self.polygons.push(PolygonState::default()),
            "coordinates" => self.coordinates.clear(),
            "Data" | "SimpleData" if self.with_metadata => self.data_name = attribute(e, "name"),
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn end(&mut self, name: &str) {
        let text = std::mem::take(&mut self.text);
        let parent = self.parent().map(str::to_string);

        match name {
            "coordinates" => {
                let (coords, malformed) = parse_coordinates(&text);
                if malformed > 0 {
                    log::debug!("{malformed} malformed coordinate tuples skipped");
                }
                self.coordinates = coords;
            }
            "Point" => match std::mem::take(&mut self.coordinates).first() {
                Some(coord) => self.emit(Geometry::Point(*coord), FeatureKind::Point),
                None => self.diagnostics.skip("Point", "no coordinates"),
            },
            "LineString" => {
                let coords = std::mem::take(&mut self.coordinates);
                if coords.len() < 2 {
                    self.diagnostics.skip("LineString", "fewer than 2 coordinates");
                } else {
                    self.emit(Geometry::LineString(coords), FeatureKind::Line);
                }
            }
            "LinearRing" => {
                let mut ring = std::mem::take(&mut self.coordinates);
                close_ring(&mut ring);
                let in_polygon = !self.polygons.is_empty() && self.inside("Polygon");
                if ring.len() < 4 {
                    self.diagnostics.skip("LinearRing", "fewer than 3 distinct coordinates");
                } else if in_polygon && self.inside("innerBoundaryIs") {
                    if let Some(polygon) = self.polygons.last_mut() {
                        polygon.inner.push(ring);
                    }
                } else if in_polygon {
                    if let Some(polygon) = self.polygons.last_mut() {
                        polygon.outer = Some(ring);
                    }
                } else {
                    self.emit(Geometry::Polygon(vec![ring]), FeatureKind::Polygon);
                }
            }
            "Polygon" => {
                if let Some(polygon) = self.polygons.pop() {
                    match polygon.outer {
                        Some(outer) => {
                            let mut rings = vec![outer];
                            rings.extend(polygon.inner);
                            self.emit(Geometry::Polygon(rings), FeatureKind::Polygon);
                        }
                        None => self.diagnostics.skip("Polygon", "no outer boundary"),
                    }
                }
            }
            "name" if self.with_metadata => match parent.as_deref() {
                Some("Placemark") => {
                    if let Some(placemark) = &mut self.placemark {
                        placemark.name = Some(text.trim().to_string());
                    }
                }
                Some("Folder") => {
                    if let Some(folder) = self.folders.last_mut() {
                        *folder = Some(text.trim().to_string());
                    }
                }
                _ => {}
            },
            "description" if self.with_metadata && parent.as_deref() == Some("Placemark") => {
                if let Some(placemark) = &mut self.placemark {
                    placemark.description = Some(text.trim().to_string());
                }
            }
            "value" | "SimpleData" if self.with_metadata => {
                let key = if name == "SimpleData" {
                    self.data_name.take()
                } else {
                    self.data_name.clone()
                };
                if let (Some(key), Some(placemark)) = (key, &mut self.placemark) {
                    placemark
                        .extended
                        .insert(key, AttrValue::String(text.trim().to_string()));
                }
            }
            "Data" => self.data_name = None,
            "Placemark" if self.with_metadata => self.finish_placemark(),
            "Folder" if self.with_metadata => {
                self.folders.pop();
            }
            _ => {}
        }

        self.path.pop();
    }

    fn emit(&mut self, geometry: Geometry, kind: FeatureKind) {
        match &mut self.placemark {
            Some(placemark) => placemark.geometries.push((geometry, kind)),
            None => {
                let mut feature = Feature::new(geometry, kind);
                if let Some(layer) = self.layer() {
                    feature = feature.with_layer(layer);
                }
                self.features.push(feature);
            }
        }
    }

    fn finish_placemark(&mut self) {
        let Some(placemark) = self.placemark.take() else {
            return;
        };
        let layer = self.layer();

        for (geometry, kind) in placemark.geometries {
            let mut feature = Feature::new(geometry, kind);
            if let Some(layer) = &layer {
                feature = feature.with_layer(layer.clone());
            }
            if let Some(name) = &placemark.name {
                feature = feature.with_name(name.clone());
            }
            if let Some(description) = &placemark.description {
                feature = feature.with_attr("description", description.clone());
            }
            feature
                .attributes
                .extra
                .extend(placemark.extended.iter().map(|(k, v)| (k.clone(), v.clone())));
            self.features.push(feature);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:gx="http://www.google.com/kml/ext/2.2">
  <Document>
    <name>Survey</name>
    <Folder>
      <name>Benchmarks</name>
      <Placemark>
        <name>BM 1</name>
        <description><![CDATA[<b>steel</b> pin]]></description>
        <ExtendedData>
          <Data name="elevation"><value>12.5</value></Data>
        </ExtendedData>
        <Point><coordinates>-78.5,-0.2,2800</coordinates></Point>
      </Placemark>
      <Placemark>
        <name>Parcel</name>
        <MultiGeometry>
          <Polygon>
            <outerBoundaryIs><LinearRing><coordinates>0,0 1,0 1,1 0,1</coordinates></LinearRing></outerBoundaryIs>
            <innerBoundaryIs><LinearRing><coordinates>0.2,0.2 0.4,0.2 0.4,0.4 0.2,0.2</coordinates></LinearRing></innerBoundaryIs>
          </Polygon>
          <LineString><coordinates>0,0 2,2 bad 3,3</coordinates></LineString>
        </MultiGeometry>
      </Placemark>
      <Placemark>
        <gx:Track><when>2020-01-01T00:00:00Z</when><gx:coord>1 2 3</gx:coord></gx:Track>
      </Placemark>
    </Folder>
  </Document>
</kml>"#;

    #[test]
    fn structured_parse_keeps_metadata() {
        let decoded = decode_kml(DOCUMENT.as_bytes()).expect("valid KML");
        let features = decoded.collection.features();
        assert_eq!(features.len(), 3);

        let point = &features[0];
        assert_eq!(point.kind(), FeatureKind::Point);
        assert_eq!(point.layer(), "Benchmarks");
        assert_eq!(point.attributes.name.as_deref(), Some("BM 1"));
        assert_eq!(
            point.attributes.extra.get("description"),
            Some(&AttrValue::from("<b>steel</b> pin"))
        );
        assert_eq!(
            point.attributes.extra.get("elevation"),
            Some(&AttrValue::from("12.5"))
        );
        assert_eq!(point.geometry, Geometry::Point(Coord::xyz(-78.5, -0.2, 2800.0)));

        let Geometry::Polygon(rings) = &features[1].geometry else {
            panic!("expected polygon");
        };
        assert_eq!(rings.len(), 2);
        assert_eq!(rings[0].len(), 5);
        assert_eq!(rings[0][0], rings[0][4]);

        assert_eq!(features[2].kind(), FeatureKind::Line);
        assert_eq!(features[2].geometry.coord_count(), 3);
        assert_eq!(features[2].attributes.name.as_deref(), Some("Parcel"));
    }

    #[test]
    fn fallback_handles_missing_namespace() {
        let text = r#"<kml><Placemark><foo:LineString xmlns:foo="urn:x"><foo:coordinates>
            1,2 3,4
        </foo:coordinates></foo:LineString></Placemark></kml>"#;

        let decoded = decode_kml(text.as_bytes()).expect("valid XML");
        assert_eq!(decoded.collection.len(), 1);
        assert_eq!(
            decoded.collection.features()[0].geometry,
            Geometry::LineString(vec![Coord::xy(1.0, 2.0), Coord::xy(3.0, 4.0)])
        );
    }

    #[test]
    fn empty_document_is_not_an_error() {
        let decoded = decode_kml(br#"<kml xmlns="http://www.opengis.net/kml/2.2"><Document/></kml>"#)
            .expect("valid KML");
        assert!(decoded.collection.is_empty());
        assert!(!decoded.diagnostics.notes.is_empty());
    }

    #[test]
    fn broken_xml_is_decode_error() {
        assert_matches!(
            decode_kml(b"<kml><Placemark></kml>"),
            Err(GeoconvError::Decode { .. })
        );
    }

    #[test]
    fn kmz_prefers_doc_kml() {
        let mut buffer = Cursor::new(vec![]);
        {
            let mut zip = zip::ZipWriter::new(&mut buffer);
            let options = SimpleFileOptions::default();
            zip.start_file("other.kml", options).expect("zip entry");
            zip.write_all(b"<kml><Point><coordinates>9,9</coordinates></Point></kml>")
                .expect("zip write");
            zip.start_file("doc.kml", options).expect("zip entry");
            zip.write_all(DOCUMENT.as_bytes()).expect("zip write");
            zip.finish().expect("zip finish");
        }

        let decoded = decode_kmz(buffer.get_ref()).expect("valid KMZ");
        assert_eq!(decoded.collection.len(), 3);
    }

    #[test]
    fn kmz_without_kml_member() {
        let mut buffer = Cursor::new(vec![]);
        {
            let mut zip = zip::ZipWriter::new(&mut buffer);
            zip.start_file("image.png", SimpleFileOptions::default())
                .expect("zip entry");
            zip.write_all(b"png").expect("zip write");
            zip.finish().expect("zip finish");
        }

        assert_matches!(
            decode_kmz(buffer.get_ref()),
            Err(GeoconvError::Decode {
                format: InputFormat::Kmz,
                ..
            })
        );
    }

    #[test]
    fn coordinates_skip_malformed_tuples() {
        let (coords, malformed) = parse_coordinates("1,2\n 3,4,5 x,y 6 7,8,9,10");
        assert_eq!(coords, vec![Coord::xy(1.0, 2.0), Coord::xyz(3.0, 4.0, 5.0)]);
        assert_eq!(malformed, 3);
    }

    #[test]
    fn coordinates_allow_spaces_around_commas() {
        let (coords, malformed) = parse_coordinates("-78.5, -0.2, 10  -78.6 ,-0.3\n\t-78.7 , -0.4");
        assert_eq!(
            coords,
            vec![
                Coord::xyz(-78.5, -0.2, 10.0),
                Coord::xy(-78.6, -0.3),
                Coord::xy(-78.7, -0.4),
            ]
        );
        assert_eq!(malformed, 0);
    }
}
