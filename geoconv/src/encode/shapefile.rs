//! Shapefile encoder.
//!
//! Features are split into groups by the [`Grouping`] policy, and every group is split further by
//! [`ShapeClass`], since a shapefile holds a single kind of shape. Writers are opened lazily when the first shape of
//! their `(group, class)` pair is written.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use geoconv_types::geo::Crs;
use geoconv_types::geometry::close_ring;
use geoconv_types::{Coord, Feature, FeatureCollection, Geometry, Grouping, ShapeClass};
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use shapefile::{
    Multipoint, MultipointZ, Point, PointZ, Polygon, PolygonRing, PolygonZ, Polyline, PolylineZ,
    Writer, NO_DATA,
};
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::encode::Artifact;
use crate::error::GeoconvError;

const TEXT_FIELD_LENGTH: u8 = 254;
const NAME_FIELD_LENGTH: u8 = 80;

/// Counts of one shapefile writer.
///
/// Every shape is written together with its record, so `shapes` and `records` are always equal for a successful
/// job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterSummary {
    /// File stem of the shapefile, e.g. `points` or `default_polygon`.
    pub stem: String,
    /// Group the writer belongs to.
    pub group: String,
    /// Class of the shapes in the file.
    pub class: ShapeClass,
    /// Number of written shapes.
    pub shapes: usize,
    /// Number of written attribute records.
    pub records: usize,
}

/// Writes shapefiles of the collection into the `dir` directory, which is created if it does not exist.
///
/// Returns one summary per written shapefile, in the order the writers were opened.
pub fn write_shapefiles(
    collection: &FeatureCollection,
    dir: impl AsRef<Path>,
    grouping: Grouping,
    crs: &Crs,
) -> Result<Vec<WriterSummary>, GeoconvError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let three_d = collection.has_z();
    let stems = file_stems(collection, grouping);
    let prj = crs.esri_wkt();

    let mut writers: HashMap<(String, ShapeClass), ShapeWriter> = HashMap::new();
    let mut order: Vec<(String, ShapeClass)> = vec![];

    for feature in collection {
        let class = feature.geometry.shape_class();
        let Some(shape) = ShapeData::from_geometry(&feature.geometry, three_d) else {
            log::warn!(
                "skipping {} feature with a degenerate {} geometry",
                feature.kind(),
                feature.geometry.type_name()
            );
            continue;
        };

        let key = (feature.group_key(grouping).to_string(), class);
        let writer = match writers.entry(key.clone()) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let stem = stems.get(&key).cloned().unwrap_or_else(|| sanitize(&key.0));
                log::debug!("opening shapefile writer {stem} for {}", class.as_str());
                order.push(key.clone());
                entry.insert(ShapeWriter::open(dir, stem, key.0.clone(), class, &prj)?)
            }
        };

        writer.write(&shape, feature)?;
    }

    let mut summaries = vec![];
    for key in order {
        if let Some(writer) = writers.remove(&key) {
            summaries.push(writer.finish());
        }
    }

    log::info!(
        "wrote {} shapefiles into {}",
        summaries.len(),
        dir.display()
    );

    Ok(summaries)
}

/// Writes the shapefiles of the collection into a zip archive at `path`.
///
/// The files are written into a temporary directory first. The directory is removed when the function returns,
/// whether it succeeds or not. The archive itself is built in a temporary file next to `path` and only moved to
/// `path` once it is complete.
pub fn write_shapefile_zip(
    collection: &FeatureCollection,
    path: impl AsRef<Path>,
    grouping: Grouping,
    crs: &Crs,
) -> Result<Vec<WriterSummary>, GeoconvError> {
    let path = path.as_ref();
    let scratch = tempfile::tempdir()?;
    let summaries = write_shapefiles(collection, scratch.path(), grouping, crs)?;

    let mut files: Vec<PathBuf> = std::fs::read_dir(scratch.path())?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    files.sort();

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut archive = tempfile::NamedTempFile::new_in(parent)?;
    {
        let mut zip = zip::ZipWriter::new(BufWriter::new(archive.as_file_mut()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for file in files {
            let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            zip.start_file(name, options)?;
            zip.write_all(&std::fs::read(&file)?)?;
        }
        zip.finish()?.flush()?;
    }
    archive.persist(path).map_err(|err| err.error)?;

    log::debug!(
        "packed shapefiles into {}, removing {}",
        path.display(),
        scratch.path().display()
    );

    Ok(summaries)
}

/// Computes the file stem of every `(group, class)` pair. The class is appended to the group name only if the
/// group holds more than one class.
///
/// Stems are unique ignoring case. A stem that is already taken, e.g. by another group that sanitizes to the same
/// name, gets a numeric suffix (`A_B`, `A_B_2`, ...).
fn file_stems(
    collection: &FeatureCollection,
    grouping: Grouping,
) -> HashMap<(String, ShapeClass), String> {
    let mut classes: BTreeMap<&str, BTreeSet<ShapeClass>> = BTreeMap::new();
    for feature in collection {
        classes
            .entry(feature.group_key(grouping))
            .or_default()
            .insert(feature.geometry.shape_class());
    }

    let mut taken = HashSet::new();
    let mut stems = HashMap::new();
    for (group, group_classes) in &classes {
        let base = sanitize(group);
        for class in group_classes {
            let candidate = if group_classes.len() > 1 {
                format!("{base}_{}", class.as_str())
            } else {
                base.clone()
            };

            let mut stem = candidate.clone();
            let mut n = 2;
            while !taken.insert(stem.to_lowercase()) {
                stem = format!("{candidate}_{n}");
                n += 1;
            }
            if stem != candidate {
                log::debug!("shapefile stem {candidate} is taken, group {group} uses {stem}");
            }
            stems.insert((group.to_string(), *class), stem);
        }
    }

    stems
}

fn sanitize(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "default".to_string()
    } else {
        sanitized
    }
}

fn field_name(name: &str) -> Result<FieldName, GeoconvError> {
    FieldName::try_from(name)
        .map_err(|err| GeoconvError::encode(Artifact::Shapefile, format!("{err:?}")))
}

fn table_builder() -> Result<TableWriterBuilder, GeoconvError> {
    Ok(TableWriterBuilder::new()
        .add_character_field(field_name("type")?, 16)
        .add_character_field(field_name("layer")?, NAME_FIELD_LENGTH)
        .add_character_field(field_name("name")?, NAME_FIELD_LENGTH)
        .add_character_field(field_name("text")?, TEXT_FIELD_LENGTH)
        .add_numeric_field(field_name("rotation")?, 18, 6))
}

fn record(feature: &Feature) -> Record {
    let attributes = &feature.attributes;
    let mut record = Record::default();
    record.insert(
        "type".to_string(),
        FieldValue::Character(Some(attributes.kind.as_str().to_string())),
    );
    record.insert(
        "layer".to_string(),
        FieldValue::Character(Some(truncate(&attributes.layer, NAME_FIELD_LENGTH))),
    );
    record.insert(
        "name".to_string(),
        FieldValue::Character(attributes.name.as_deref().map(|v| truncate(v, NAME_FIELD_LENGTH))),
    );
    record.insert(
        "text".to_string(),
        FieldValue::Character(attributes.text.as_deref().map(|v| truncate(v, TEXT_FIELD_LENGTH))),
    );
    record.insert("rotation".to_string(), FieldValue::Numeric(attributes.rotation));

    record
}

/// Cuts the value to at most `max` bytes on a char boundary.
fn truncate(value: &str, max: u8) -> String {
    let max = max as usize;
    if value.len() <= max {
        return value.to_string();
    }

    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Geometry converted into one of the shape types of the shapefile crate.
enum ShapeData {
    Point(Point),
    PointZ(PointZ),
    Multipoint(Multipoint),
    MultipointZ(MultipointZ),
    Polyline(Polyline),
    PolylineZ(PolylineZ),
    Polygon(Polygon),
    PolygonZ(PolygonZ),
}

fn point(c: &Coord) -> Point {
    Point::new(c.x, c.y)
}

fn point_z(c: &Coord) -> PointZ {
    PointZ::new(c.x, c.y, c.z.unwrap_or_default(), NO_DATA)
}

impl ShapeData {
    /// Converts the geometry. Returns `None` for lines with fewer than 2 points and polygons without a ring of at
    /// least 3 distinct points.
    fn from_geometry(geometry: &Geometry, three_d: bool) -> Option<Self> {
        match geometry {
            Geometry::Point(c) => Some(if three_d {
                Self::PointZ(point_z(c))
            } else {
                Self::Point(point(c))
            }),
            Geometry::MultiPoint(points) => {
                if points.is_empty() {
                    return None;
                }
                Some(if three_d {
                    Self::MultipointZ(MultipointZ::new(points.iter().map(point_z).collect()))
                } else {
                    Self::Multipoint(Multipoint::new(points.iter().map(point).collect()))
                })
            }
            Geometry::LineString(line) => Self::polyline(std::slice::from_ref(line), three_d),
            Geometry::MultiLineString(lines) => Self::polyline(lines, three_d),
            Geometry::Polygon(rings) => Self::polygon(std::slice::from_ref(rings), three_d),
            Geometry::MultiPolygon(polygons) => Self::polygon(polygons, three_d),
        }
    }

    fn polyline(lines: &[Vec<Coord>], three_d: bool) -> Option<Self> {
        let parts: Vec<&Vec<Coord>> = lines.iter().filter(|line| line.len() >= 2).collect();
        if parts.is_empty() {
            return None;
        }

        Some(if three_d {
            Self::PolylineZ(PolylineZ::with_parts(
                parts
                    .iter()
                    .map(|line| line.iter().map(point_z).collect())
                    .collect(),
            ))
        } else {
            Self::Polyline(Polyline::with_parts(
                parts
                    .iter()
                    .map(|line| line.iter().map(point).collect())
                    .collect(),
            ))
        })
    }

    fn polygon(polygons: &[Vec<Vec<Coord>>], three_d: bool) -> Option<Self> {
        let mut rings: Vec<(bool, Vec<Coord>)> = vec![];
        for polygon in polygons {
            for (index, ring) in polygon.iter().enumerate() {
                let mut ring = ring.clone();
                close_ring(&mut ring);
                if ring.len() < 4 {
                    continue;
                }
                rings.push((index == 0, ring));
            }
        }

        if !rings.iter().any(|(outer, _)| *outer) {
            return None;
        }

        Some(if three_d {
            Self::PolygonZ(PolygonZ::with_rings(
                rings
                    .into_iter()
                    .map(|(outer, ring)| {
                        let points = ring.iter().map(point_z).collect();
                        if outer {
                            PolygonRing::Outer(points)
                        } else {
                            PolygonRing::Inner(points)
                        }
                    })
                    .collect(),
            ))
        } else {
            Self::Polygon(Polygon::with_rings(
                rings
                    .into_iter()
                    .map(|(outer, ring)| {
                        let points = ring.iter().map(point).collect();
                        if outer {
                            PolygonRing::Outer(points)
                        } else {
                            PolygonRing::Inner(points)
                        }
                    })
                    .collect(),
            ))
        })
    }
}

struct ShapeWriter {
    writer: Writer<BufWriter<File>>,
    summary: WriterSummary,
}

impl ShapeWriter {
    fn open(
        dir: &Path,
        stem: String,
        group: String,
        class: ShapeClass,
        prj: &str,
    ) -> Result<Self, GeoconvError> {
        let writer = Writer::from_path(dir.join(format!("{stem}.shp")), table_builder()?)?;
        std::fs::write(dir.join(format!("{stem}.prj")), prj)?;

        Ok(Self {
            writer,
            summary: WriterSummary {
                stem,
                group,
                class,
                shapes: 0,
                records: 0,
            },
        })
    }

    fn write(&mut self, shape: &ShapeData, feature: &Feature) -> Result<(), GeoconvError> {
        let record = record(feature);
        match shape {
            ShapeData::Point(s) => self.writer.write_shape_and_record(s, &record)?,
            ShapeData::PointZ(s) => self.writer.write_shape_and_record(s, &record)?,
            ShapeData::Multipoint(s) => self.writer.write_shape_and_record(s, &record)?,
            ShapeData::MultipointZ(s) => self.writer.write_shape_and_record(s, &record)?,
            ShapeData::Polyline(s) => self.writer.write_shape_and_record(s, &record)?,
            ShapeData::PolylineZ(s) => self.writer.write_shape_and_record(s, &record)?,
            ShapeData::Polygon(s) => self.writer.write_shape_and_record(s, &record)?,
            ShapeData::PolygonZ(s) => self.writer.write_shape_and_record(s, &record)?,
        }
        self.summary.shapes += 1;
        self.summary.records += 1;

        Ok(())
    }

    /// Closes the files and returns the counts.
    fn finish(self) -> WriterSummary {
        let Self { writer, summary } = self;
        drop(writer);
        log::debug!(
            "shapefile {}: {} shapes, {} records",
            summary.stem,
            summary.shapes,
            summary.records
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoconv_types::FeatureKind;

    fn line(kind: FeatureKind, layer: &str) -> Feature {
        Feature::new(
            Geometry::LineString(vec![Coord::xy(0.0, 0.0), Coord::xy(1.0, 1.0)]),
            kind,
        )
        .with_layer(layer)
    }

    #[test]
    fn stems_get_class_suffix_only_for_mixed_groups() {
        let collection: FeatureCollection = vec![
            Feature::new(Coord::xy(0.0, 0.0), FeatureKind::Point).with_layer("SITE"),
            line(FeatureKind::Line, "SITE"),
            line(FeatureKind::Line, "ROADS"),
        ]
        .into();

        let stems = file_stems(&collection, Grouping::Layer);
        assert_eq!(
            stems.get(&("SITE".to_string(), ShapeClass::Point)).map(String::as_str),
            Some("SITE_point")
        );
        assert_eq!(
            stems.get(&("SITE".to_string(), ShapeClass::Polyline)).map(String::as_str),
            Some("SITE_polyline")
        );
        assert_eq!(
            stems.get(&("ROADS".to_string(), ShapeClass::Polyline)).map(String::as_str),
            Some("ROADS")
        );

        let stems = file_stems(&collection, Grouping::Type);
        assert_eq!(
            stems.get(&("lines".to_string(), ShapeClass::Polyline)).map(String::as_str),
            Some("lines")
        );
    }

    #[test]
    fn writes_files_with_prj() {
        let dir = tempfile::tempdir().expect("temp dir");
        let collection: FeatureCollection = vec![
            Feature::new(Coord::xyz(500000.0, 9800000.0, 10.0), FeatureKind::Point),
            Feature::new(
                Geometry::Polygon(vec![vec![
                    Coord::xyz(0.0, 0.0, 1.0),
                    Coord::xyz(10.0, 0.0, 1.0),
                    Coord::xyz(10.0, 10.0, 1.0),
                ]]),
                FeatureKind::Polygon,
            ),
            line(FeatureKind::Polyline, "default").with_text("a".repeat(300)),
        ]
        .into();
        let crs = Crs::from_epsg(32717).expect("supported");

        let summaries =
            write_shapefiles(&collection, dir.path(), Grouping::Type, &crs).expect("written");
        assert_eq!(summaries.len(), 3);
        for summary in &summaries {
            assert_eq!(summary.shapes, 1);
            assert_eq!(summary.shapes, summary.records);
            for extension in ["shp", "shx", "dbf", "prj"] {
                assert!(dir.path().join(format!("{}.{extension}", summary.stem)).exists());
            }
        }

        let prj = std::fs::read_to_string(dir.path().join("points.prj")).expect("prj");
        assert!(prj.contains("WGS_1984_UTM_Zone_17S"));

        let reader = shapefile::ShapeReader::from_path(dir.path().join("polygons.shp")).expect("reader");
        let shapes = reader.read().expect("shapes");
        assert_eq!(shapes.len(), 1);
        assert!(matches!(shapes[0], shapefile::Shape::PolygonZ(_)));
    }

    #[test]
    fn zip_bundle() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("out_shp.zip");
        let collection: FeatureCollection =
            vec![Feature::new(Coord::xy(1.0, 2.0), FeatureKind::Text).with_text("BM")].into();

        let summaries = write_shapefile_zip(
            &collection,
            &path,
            Grouping::Type,
            &Crs::EPSG4326,
        )
        .expect("written");
        assert_eq!(summaries[0].stem, "texts");

        let archive = zip::ZipArchive::new(File::open(&path).expect("zip")).expect("valid zip");
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort();
        assert_eq!(names, vec!["texts.dbf", "texts.prj", "texts.shp", "texts.shx"]);
    }

    #[test]
    fn zip_bundle_reads_back() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("survey_shp.zip");
        let collection: FeatureCollection = (0..3)
            .map(|i| Feature::new(Coord::xy(f64::from(i), 1.0), FeatureKind::Point).with_name(format!("P{i}")))
            .collect();

        write_shapefile_zip(&collection, &path, Grouping::Type, &Crs::EPSG4326).expect("written");
        let entries: Vec<PathBuf> = std::fs::read_dir(dir.path())
            .expect("dir")
            .map(|e| e.expect("entry").path())
            .collect();
        assert_eq!(entries, vec![path.clone()]);

        let extracted = tempfile::tempdir().expect("temp dir");
        zip::ZipArchive::new(File::open(&path).expect("zip"))
            .expect("valid zip")
            .extract(extracted.path())
            .expect("extracted");

        let mut reader =
            shapefile::Reader::from_path(extracted.path().join("points.shp")).expect("reader");
        let records = reader.read().expect("records");
        assert_eq!(records.len(), 3);
        let (shape, record) = &records[2];
        assert!(matches!(shape, shapefile::Shape::Point(p) if p.x == 2.0));
        assert!(matches!(
            record.get("name"),
            Some(FieldValue::Character(Some(name))) if name == "P2"
        ));
    }

    #[test]
    fn groups_sanitized_to_the_same_stem_get_their_own_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let collection: FeatureCollection = vec![
            Feature::new(Coord::xy(0.0, 0.0), FeatureKind::Point).with_layer("A B"),
            Feature::new(Coord::xy(1.0, 0.0), FeatureKind::Point).with_layer("A_B"),
            Feature::new(Coord::xy(2.0, 0.0), FeatureKind::Point).with_layer("A_B"),
            Feature::new(Coord::xy(3.0, 0.0), FeatureKind::Point).with_layer("SITE"),
            line(FeatureKind::Line, "SITE"),
            Feature::new(Coord::xy(4.0, 0.0), FeatureKind::Point).with_layer("SITE_point"),
        ]
        .into();

        let summaries =
            write_shapefiles(&collection, dir.path(), Grouping::Layer, &Crs::EPSG4326).expect("written");
        let mut stems: Vec<&str> = summaries.iter().map(|s| s.stem.as_str()).collect();
        stems.sort();
        stems.dedup();
        assert_eq!(stems.len(), summaries.len());

        for summary in &summaries {
            let reader = shapefile::ShapeReader::from_path(dir.path().join(format!("{}.shp", summary.stem)))
                .expect("reader");
            assert_eq!(reader.read().expect("shapes").len(), summary.shapes, "{summary:?}");
        }
        let total: usize = summaries.iter().map(|s| s.records).sum();
        assert_eq!(total, collection.len());
    }
}
