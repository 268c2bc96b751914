//! Decoder of pasted topographic point lists.
//!
//! Rows have the form `id, x, y, elevation, description[, group]`. The delimiter is detected from the first
//! non-empty line.
//!
//! Whitespace separated rows have no group column: everything after the elevation is the description, so it may
//! contain spaces.

use std::collections::HashSet;

use geoconv_types::geometry::close_ring;
use geoconv_types::{Coord, Feature, FeatureCollection, FeatureKind, Geometry};

use crate::config::TabularMode;
use crate::decode::Decoded;
use crate::diagnostics::Diagnostics;
use crate::error::GeoconvError;

const COLUMNS: usize = 6;

/// Field separator of a tabular input.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Delimiter {
    /// `\t`
    Tab,
    /// `;`
    Semicolon,
    /// `,`
    Comma,
    /// Any run of spaces.
    Whitespace,
}

impl Delimiter {
    /// Picks the delimiter of the first non-empty line: tab, then semicolon, then comma, otherwise whitespace.
    pub fn detect(text: &str) -> Self {
        let first = text.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
        if first.contains('\t') {
            Self::Tab
        } else if first.contains(';') {
            Self::Semicolon
        } else if first.contains(',') {
            Self::Comma
        } else {
            Self::Whitespace
        }
    }

    fn byte(&self) -> Option<u8> {
        match self {
            Self::Tab => Some(b'\t'),
            Self::Semicolon => Some(b';'),
            Self::Comma => Some(b','),
            Self::Whitespace => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Row {
    line: usize,
    fields: Vec<String>,
}

fn split_rows(text: &str, delimiter: Delimiter) -> Result<Vec<Row>, GeoconvError> {
    let Some(byte) = delimiter.byte() else {
        return Ok(text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| Row {
                line: index + 1,
                fields: split_whitespace_row(line),
            })
            .collect());
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(byte)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut rows = vec![];
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = record.position().map_or(rows.len() + 1, |p| p.line() as usize);
        rows.push(Row {
            line,
            fields: record.iter().map(str::to_string).collect(),
        });
    }

    Ok(rows)
}

/// Splits the four leading fields on whitespace and keeps the rest of the line as the description.
fn split_whitespace_row(line: &str) -> Vec<String> {
    let mut fields = Vec::with_capacity(5);
    let mut rest = line.trim();
    while fields.len() < 4 && !rest.is_empty() {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        fields.push(rest[..end].to_string());
        rest = rest[end..].trim_start();
    }
    if !rest.is_empty() {
        fields.push(rest.to_string());
    }

    fields
}

fn parse_number(field: &str, delimiter: Delimiter) -> Option<f64> {
    let field = field.trim();
    let value = if delimiter == Delimiter::Comma {
        field.parse::<f64>().ok()?
    } else {
        field.replace(',', ".").parse::<f64>().ok()?
    };

    value.is_finite().then_some(value)
}

#[derive(Debug, Clone)]
struct SurveyPoint {
    id: String,
    coord: Coord,
    description: String,
    group: Option<String>,
}

impl SurveyPoint {
    fn into_feature(self) -> Feature {
        let z = self.coord.z.unwrap_or_default();
        let mut feature = Feature::new(self.coord, FeatureKind::Point)
            .with_attr("id", self.id.clone())
            .with_attr("x", self.coord.x)
            .with_attr("y", self.coord.y)
            .with_attr("cota", z)
            .with_attr("description", self.description);
        if !self.id.is_empty() {
            feature = feature.with_name(self.id);
        }

        feature
    }
}

/// Decodes a tabular point list.
///
/// Rows with a non-numeric `x` or `y` are skipped; a first row like that is taken for a header and ignored
/// silently. A non-numeric elevation is replaced by `0`.
pub fn decode_tabular(bytes: &[u8], mode: TabularMode) -> Result<Decoded, GeoconvError> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_start_matches('\u{feff}');
    let delimiter = Delimiter::detect(text);
    log::debug!("tabular input delimiter: {delimiter:?}");

    let mut diagnostics = Diagnostics::new();
    let mut points = vec![];

    for (index, mut row) in split_rows(text, delimiter)?.into_iter().enumerate() {
        if row.fields.len() < COLUMNS {
            row.fields.resize(COLUMNS, String::new());
        }

        let x = parse_number(&row.fields[1], delimiter);
        let y = parse_number(&row.fields[2], delimiter);
        let (Some(x), Some(y)) = (x, y) else {
            if index == 0 && x.is_none() && y.is_none() {
                log::debug!("skipping header row");
            } else {
                diagnostics.skip(
                    "row",
                    format!(
                        "line {}: coordinates '{}', '{}' are not numbers",
                        row.line, row.fields[1], row.fields[2]
                    ),
                );
            }
            continue;
        };

        let elevation_field = row.fields[3].trim();
        let z = if elevation_field.is_empty() {
            0.0
        } else {
            parse_number(elevation_field, delimiter).unwrap_or_else(|| {
                diagnostics.coerced_elevations += 1;
                log::warn!(
                    "line {}: elevation '{elevation_field}' is not a number, using 0",
                    row.line
                );
                0.0
            })
        };

        let group = row.fields[5].trim();
        points.push(SurveyPoint {
            id: row.fields[0].trim().to_string(),
            coord: Coord::xyz(x, y, z),
            description: row.fields[4].trim().to_string(),
            group: (!group.is_empty()).then(|| group.to_string()),
        });
    }

    let mut collection = FeatureCollection::new();
    if mode == TabularMode::PointsAndPolylines {
        for (group, chain) in chains(&points) {
            if let Some(feature) = chain_feature(group, chain) {
                collection.push(feature);
            }
        }
    }

    let mut seen = HashSet::new();
    for point in points {
        if point.id.is_empty() || seen.insert(point.id.clone()) {
            collection.push(point.into_feature());
        }
    }

    log::info!(
        "decoded {} features from tabular input ({} rows skipped)",
        collection.len(),
        diagnostics.skipped_count("row")
    );

    Ok(Decoded {
        collection,
        diagnostics,
    })
}

fn chains(points: &[SurveyPoint]) -> Vec<(Option<&str>, Vec<Coord>)> {
    let mut chains: Vec<(Option<&str>, Vec<Coord>)> = vec![];
    for point in points {
        let group = point.group.as_deref();
        match chains.iter_mut().find(|(key, _)| *key == group) {
            Some((_, chain)) => chain.push(point.coord),
            None => chains.push((group, vec![point.coord])),
        }
    }

    chains
}

fn chain_feature(group: Option<&str>, mut chain: Vec<Coord>) -> Option<Feature> {
    chain.dedup_by(|a, b| a.equal_xy(b));

    let mut distinct: Vec<Coord> = vec![];
    for c in &chain {
        if !distinct.iter().any(|d| d.equal_xy(c)) {
            distinct.push(*c);
        }
    }

    let feature = match distinct.len() {
        0..=1 => return None,
        2 => Feature::new(Geometry::LineString(distinct), FeatureKind::Polyline),
        _ => {
            close_ring(&mut chain);
            Feature::new(Geometry::Polygon(vec![chain]), FeatureKind::Polygon)
        }
    };

    Some(match group {
        Some(group) => feature.with_layer(group).with_name(group),
        None => feature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_delimiter() {
        assert_eq!(Delimiter::detect("\n1\t2\t3"), Delimiter::Tab);
        assert_eq!(Delimiter::detect("1;2,5;3"), Delimiter::Semicolon);
        assert_eq!(Delimiter::detect("1,2,3"), Delimiter::Comma);
        assert_eq!(Delimiter::detect("1   2 3"), Delimiter::Whitespace);
    }

    #[test]
    fn decimal_commas_and_header() {
        let input = "ID;X;Y;Z;DESC\nP1;500000,5;9800000,25;2800,1;BM\n";
        let decoded = decode_tabular(input.as_bytes(), TabularMode::Points).expect("valid input");
        assert_eq!(decoded.collection.len(), 1);
        assert!(decoded.diagnostics.skipped.is_empty());

        let point = &decoded.collection.features()[0];
        assert_eq!(
            point.geometry,
            Geometry::Point(Coord::xyz(500000.5, 9800000.25, 2800.1))
        );
        assert_eq!(point.attributes.name.as_deref(), Some("P1"));
        assert_eq!(
            point.attributes.extra.get("description").map(ToString::to_string),
            Some("BM".to_string())
        );
    }

    #[test]
    fn whitespace_rows_are_padded_and_counted() {
        let input = "1 10 20 abc\n2 bad 20 5 X\n3 30 40\n\n";
        let decoded = decode_tabular(input.as_bytes(), TabularMode::Points).expect("valid input");

        assert_eq!(decoded.collection.len(), 2);
        assert_eq!(decoded.diagnostics.skipped_count("row"), 1);
        assert_eq!(decoded.diagnostics.coerced_elevations, 1);
        assert_eq!(
            decoded.collection.features()[1].geometry,
            Geometry::Point(Coord::xyz(30.0, 40.0, 0.0))
        );
    }

    #[test]
    fn groups_become_polygons_and_polylines() {
        let input = "1,0,0,1,A,lot\n2,10,0,1,B,lot\n3,10,10,1,C,lot\n4,0,20,1,D,fence\n5,5,20,1,E,fence\n6,7,7,1,F\n";
        let decoded =
            decode_tabular(input.as_bytes(), TabularMode::PointsAndPolylines).expect("valid input");
        let features = decoded.collection.features();

        assert_eq!(features[0].kind(), FeatureKind::Polygon);
        assert_eq!(features[0].layer(), "lot");
        let Geometry::Polygon(rings) = &features[0].geometry else {
            panic!("expected polygon");
        };
        assert_eq!(rings[0].len(), 4);
        assert!(rings[0][0].equal_xy(&rings[0][3]));

        assert_eq!(features[1].kind(), FeatureKind::Polyline);
        assert_eq!(features[1].geometry.coord_count(), 2);

        // the default group has a single point and produces nothing
        assert_eq!(
            features.iter().filter(|f| f.kind() == FeatureKind::Point).count(),
            6
        );
        assert_eq!(features.len(), 8);
    }

    #[test]
    fn whitespace_description_keeps_all_words() {
        let input = "1 0 0 5 BENCH MARK
2 10 0 5   BENCH   MARK 2
3 10 10 5 BENCH MARK
";
        let decoded =
            decode_tabular(input.as_bytes(), TabularMode::PointsAndPolylines).expect("valid input");
        let features = decoded.collection.features();

        // all rows belong to the default group
        assert_eq!(features[0].kind(), FeatureKind::Polygon);
        assert_eq!(features[0].layer(), geoconv_types::feature::DEFAULT_LAYER);
        assert_eq!(features.len(), 4);
        assert!(!features.iter().any(|f| f.layer() == "MARK"));

        let descriptions: Vec<String> = features[1..]
            .iter()
            .filter_map(|f| f.attributes.extra.get("description").map(ToString::to_string))
            .collect();
        assert_eq!(descriptions, vec!["BENCH MARK", "BENCH   MARK 2", "BENCH MARK"]);
    }
}
