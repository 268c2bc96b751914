//! Sections, layer table and entities of a DXF drawing.

use geoconv_types::Coord;

use super::groups::Group;

/// Layer name used by entities that do not declare one.
pub const DEFAULT_DXF_LAYER: &str = "0";

/// Entry of the `LAYER` table.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerEntry {
    pub name: String,
    /// Colour index. Negative values mean the layer is turned off.
    pub color: i32,
    pub frozen: bool,
}

impl LayerEntry {
    pub fn is_visible(&self) -> bool {
        !self.frozen && self.color >= 0
    }
}

/// Entity as a list of groups, with its `VERTEX` or `ATTRIB` sub-entities attached.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntity {
    pub kind: String,
    pub groups: Vec<Group>,
    pub children: Vec<RawEntity>,
}

impl RawEntity {
    fn first(&self, code: i32) -> Option<&Group> {
        self.groups.iter().find(|g| g.code == code)
    }

    pub fn f64(&self, code: i32) -> Option<f64> {
        self.first(code).and_then(Group::as_f64)
    }

    pub fn i32(&self, code: i32) -> Option<i32> {
        self.first(code).and_then(Group::as_i32)
    }

    pub fn string(&self, code: i32) -> Option<&str> {
        self.first(code).map(|g| g.value.as_str())
    }

    pub fn layer(&self) -> &str {
        self.string(8)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_DXF_LAYER)
    }

    /// Reads a point stored in groups `code`, `code + 10` and optionally `code + 20`.
    fn coord(&self, code: i32) -> Option<Coord> {
        let x = self.f64(code)?;
        let y = self.f64(code + 10)?;
        Some(match self.f64(code + 20) {
            Some(z) => Coord::xyz(x, y, z),
            None => Coord::xy(x, y),
        })
    }

    fn required_coord(&self, code: i32) -> Result<Coord, String> {
        self.coord(code)
            .ok_or_else(|| format!("missing coordinate in groups {code}/{}", code + 10))
    }

    fn required_f64(&self, code: i32, name: &str) -> Result<f64, String> {
        self.f64(code)
            .ok_or_else(|| format!("missing {name} (group {code})"))
    }
}

/// Parsed content of a DXF file that the decoder cares about.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DxfDocument {
    /// Value of the `$INSUNITS` header variable.
    pub units: Option<i32>,
    pub layers: Vec<LayerEntry>,
    pub entities: Vec<RawEntity>,
}

impl DxfDocument {
    /// Returns true if an entity on the given layer should be converted.
    ///
    /// Layers missing from the layer table are visible.
    pub fn is_layer_visible(&self, name: &str) -> bool {
        self.layers
            .iter()
            .find(|layer| layer.name.eq_ignore_ascii_case(name))
            .map_or(true, LayerEntry::is_visible)
    }

    /// True if the drawing has a layer table and every layer in it is hidden.
    pub fn has_no_visible_layers(&self) -> bool {
        !self.layers.is_empty() && !self.layers.iter().any(LayerEntry::is_visible)
    }
}

/// Human readable name of an `$INSUNITS` value.
pub fn units_name(units: i32) -> &'static str {
    match units {
        0 => "unitless",
        1 => "inches",
        2 => "feet",
        3 => "miles",
        4 => "millimeters",
        5 => "centimeters",
        6 => "meters",
        7 => "kilometers",
        8 => "microinches",
        9 => "mils",
        10 => "yards",
        _ => "other",
    }
}

/// Splits groups into records, each starting with a group of code `0`.
fn records(groups: &[Group]) -> Vec<&[Group]> {
    let mut records = vec![];
    let mut start = None;
    for (index, group) in groups.iter().enumerate() {
        if group.code == 0 {
            if let Some(start) = start {
                records.push(&groups[start..index]);
            }
            start = Some(index);
        }
    }
    if let Some(start) = start {
        records.push(&groups[start..]);
    }

    records
}

/// Walks the sections of a drawing.
pub fn parse_document(groups: &[Group]) -> Result<DxfDocument, String> {
    let mut document = DxfDocument::default();
    let mut section: Option<String> = None;
    let mut entities: Vec<RawEntity> = vec![];

    let all_records = records(groups);
    if all_records.is_empty() {
        return Err("file contains no DXF groups".into());
    }

    for record in all_records {
        let marker = record[0].value.as_str();
        match marker {
            "SECTION" => {
                section = record
                    .iter()
                    .find(|g| g.code == 2)
                    .map(|g| g.value.to_ascii_uppercase());
                if section.as_deref() == Some("HEADER") {
                    document.units = header_units(record);
                }
            }
            "ENDSEC" => section = None,
            "EOF" => break,
            _ => match section.as_deref() {
                Some("TABLES") if marker == "LAYER" => document.layers.push(layer_entry(record)),
                Some("ENTITIES") => entities.push(RawEntity {
                    kind: marker.to_ascii_uppercase(),
                    groups: record[1..].to_vec(),
                    children: vec![],
                }),
                _ => {}
            },
        }
    }

    document.entities = attach_children(entities);
    Ok(document)
}

fn header_units(record: &[Group]) -> Option<i32> {
    let position = record
        .iter()
        .position(|g| g.code == 9 && g.value.eq_ignore_ascii_case("$INSUNITS"))?;
    record[position + 1..]
        .iter()
        .take_while(|g| g.code != 9)
        .find(|g| g.code == 70)
        .and_then(Group::as_i32)
}

fn layer_entry(record: &[Group]) -> LayerEntry {
    let mut entry = LayerEntry {
        name: DEFAULT_DXF_LAYER.to_string(),
        color: 7,
        frozen: false,
    };
    for group in &record[1..] {
        match group.code {
            2 => entry.name = group.value.clone(),
            62 => entry.color = group.as_i32().unwrap_or(7),
            70 => entry.frozen = group.as_i32().unwrap_or(0) & 1 != 0,
            _ => {}
        }
    }

    entry
}

/// Moves `VERTEX` and `ATTRIB` records into the preceding `POLYLINE` or `INSERT`, dropping `SEQEND` markers.
fn attach_children(entities: Vec<RawEntity>) -> Vec<RawEntity> {
    let mut result: Vec<RawEntity> = Vec::with_capacity(entities.len());
    for entity in entities {
        match entity.kind.as_str() {
            "VERTEX" | "ATTRIB" => {
                let parent_kind = if entity.kind == "VERTEX" {
                    "POLYLINE"
                } else {
                    "INSERT"
                };
                match result.last_mut() {
                    Some(parent) if parent.kind == parent_kind => parent.children.push(entity),
                    _ => log::debug!("orphan {} record ignored", entity.kind),
                }
            }
            "SEQEND" => {}
            _ => result.push(entity),
        }
    }

    result
}

/// Polyline vertex with the bulge of the segment starting at it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub coord: Coord,
    pub bulge: f64,
}

/// Text carried by `TEXT`, `MTEXT` and `ATTRIB` entities.
#[derive(Debug, Clone, PartialEq)]
pub struct TextData {
    pub point: Coord,
    pub text: String,
    /// Degrees, counterclockwise.
    pub rotation: f64,
    /// Attribute tag, only set for `ATTRIB`.
    pub tag: Option<String>,
}

/// Definition of a B-spline curve.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SplineData {
    pub degree: usize,
    pub knots: Vec<f64>,
    pub control_points: Vec<Coord>,
    pub weights: Vec<f64>,
    pub fit_points: Vec<Coord>,
    pub closed: bool,
}

/// Edge of a hatch boundary path.
#[derive(Debug, Clone, PartialEq)]
pub enum HatchEdge {
    Line(Coord, Coord),
    Arc {
        center: Coord,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
        ccw: bool,
    },
    Ellipse {
        center: Coord,
        major_axis: Coord,
        ratio: f64,
        start_angle: f64,
        end_angle: f64,
        ccw: bool,
    },
    Spline(SplineData),
}

/// Boundary path of a hatch.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryPath {
    Polyline { vertices: Vec<Vertex>, closed: bool },
    Edges(Vec<HatchEdge>),
}

/// Entity the decoder knows how to convert.
#[derive(Debug, Clone, PartialEq)]
pub enum DxfEntity {
    Point(Coord),
    Line(Coord, Coord),
    LwPolyline {
        vertices: Vec<Vertex>,
        closed: bool,
    },
    Polyline {
        vertices: Vec<Vertex>,
        closed: bool,
    },
    Circle {
        center: Coord,
        radius: f64,
    },
    Arc {
        center: Coord,
        radius: f64,
        /// Degrees.
        start_angle: f64,
        /// Degrees.
        end_angle: f64,
    },
    Ellipse {
        center: Coord,
        /// Endpoint of the major axis relative to the center.
        major_axis: Coord,
        ratio: f64,
        /// Radians.
        start_param: f64,
        /// Radians.
        end_param: f64,
    },
    Spline(SplineData),
    Hatch(Vec<BoundaryPath>),
    Insert {
        point: Coord,
        block: String,
        attribs: Vec<TextData>,
        /// Reasons the malformed `ATTRIB` records of the insert were dropped for.
        rejected_attribs: Vec<String>,
    },
    Text(TextData),
}

impl DxfEntity {
    /// Interprets a raw entity.
    ///
    /// Returns `Ok(None)` for entity types the decoder does not convert and `Err` with the reason for malformed
    /// entities.
    pub fn parse(raw: &RawEntity) -> Result<Option<Self>, String> {
        let entity = match raw.kind.as_str() {
            "POINT" => DxfEntity::Point(raw.required_coord(10)?),
            "LINE" => DxfEntity::Line(raw.required_coord(10)?, raw.required_coord(11)?),
            "LWPOLYLINE" => {
                let vertices = lw_vertices(raw);
                if vertices.is_empty() {
                    return Err("polyline has no vertices".into());
                }
                DxfEntity::LwPolyline {
                    vertices,
                    closed: raw.i32(70).unwrap_or(0) & 1 != 0,
                }
            }
            "POLYLINE" => {
                let vertices: Vec<Vertex> = raw
                    .children
                    .iter()
                    // spline frame control points and polyface records are not part of the outline
                    .filter(|v| v.i32(70).unwrap_or(0) & (16 | 128) == 0)
                    .map(|v| {
                        Ok(Vertex {
                            coord: v.required_coord(10)?,
                            bulge: v.f64(42).unwrap_or(0.0),
                        })
                    })
                    .collect::<Result<_, String>>()?;
                if vertices.is_empty() {
                    return Err("polyline has no vertices".into());
                }
                DxfEntity::Polyline {
                    vertices,
                    closed: raw.i32(70).unwrap_or(0) & 1 != 0,
                }
            }
            "CIRCLE" => DxfEntity::Circle {
                center: raw.required_coord(10)?,
                radius: positive(raw.required_f64(40, "radius")?, "radius")?,
            },
            "ARC" => DxfEntity::Arc {
                center: raw.required_coord(10)?,
                radius: positive(raw.required_f64(40, "radius")?, "radius")?,
                start_angle: raw.required_f64(50, "start angle")?,
                end_angle: raw.required_f64(51, "end angle")?,
            },
            "ELLIPSE" => DxfEntity::Ellipse {
                center: raw.required_coord(10)?,
                major_axis: raw.required_coord(11)?,
                ratio: positive(raw.required_f64(40, "axis ratio")?, "axis ratio")?,
                start_param: raw.f64(41).unwrap_or(0.0),
                end_param: raw.f64(42).unwrap_or(std::f64::consts::TAU),
            },
            "SPLINE" => DxfEntity::Spline(spline(raw)?),
            "HATCH" => DxfEntity::Hatch(hatch_paths(&raw.groups)?),
            "INSERT" => {
                let (attribs, rejected): (Vec<_>, Vec<_>) =
                    raw.children.iter().map(text).partition(Result::is_ok);
                DxfEntity::Insert {
                    point: raw.required_coord(10)?,
                    block: raw.string(2).unwrap_or_default().to_string(),
                    attribs: attribs.into_iter().filter_map(Result::ok).collect(),
                    rejected_attribs: rejected.into_iter().filter_map(Result::err).collect(),
                }
            }
            "TEXT" | "MTEXT" => DxfEntity::Text(text(raw)?),
            _ => return Ok(None),
        };

        Ok(Some(entity))
    }
}

fn positive(value: f64, name: &str) -> Result<f64, String> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(format!("{name} must be positive, got {value}"))
    }
}

fn lw_vertices(raw: &RawEntity) -> Vec<Vertex> {
    let elevation = raw.f64(38);
    let mut vertices: Vec<Vertex> = vec![];
    let mut pending_x: Option<f64> = None;

    for group in &raw.groups {
        match group.code {
            10 => pending_x = group.as_f64(),
            20 => {
                if let (Some(x), Some(y)) = (pending_x.take(), group.as_f64()) {
                    let coord = match elevation {
                        Some(z) => Coord::xyz(x, y, z),
                        None => Coord::xy(x, y),
                    };
                    vertices.push(Vertex { coord, bulge: 0.0 });
                }
            }
            42 => {
                if let (Some(vertex), Some(bulge)) = (vertices.last_mut(), group.as_f64()) {
                    vertex.bulge = bulge;
                }
            }
            _ => {}
        }
    }

    vertices
}

fn text(raw: &RawEntity) -> Result<TextData, String> {
    let point = raw.required_coord(10)?;
    let text = if raw.kind == "MTEXT" {
        let mut content: String = raw
            .groups
            .iter()
            .filter(|g| g.code == 3)
            .map(|g| g.value.as_str())
            .collect();
        content.push_str(raw.string(1).unwrap_or_default());
        content.replace("\\P", "\n")
    } else {
        raw.string(1).unwrap_or_default().to_string()
    };

    let rotation = match (raw.f64(50), raw.f64(11), raw.f64(21)) {
        (Some(rotation), _, _) => rotation,
        (None, Some(dx), Some(dy)) if raw.kind == "MTEXT" => dy.atan2(dx).to_degrees(),
        _ => 0.0,
    };

    Ok(TextData {
        point,
        text,
        rotation,
        tag: raw.string(2).map(str::to_string).filter(|_| raw.kind == "ATTRIB"),
    })
}

fn spline(raw: &RawEntity) -> Result<SplineData, String> {
    let mut data = SplineData {
        degree: raw.i32(71).unwrap_or(3).max(1) as usize,
        closed: raw.i32(70).unwrap_or(0) & 1 != 0,
        ..Default::default()
    };

    let mut control_x = None;
    let mut fit_x = None;
    for group in &raw.groups {
        match group.code {
            40 => data.knots.extend(group.as_f64()),
            41 => data.weights.extend(group.as_f64()),
            10 => control_x = group.as_f64(),
            20 => {
                if let (Some(x), Some(y)) = (control_x.take(), group.as_f64()) {
                    data.control_points.push(Coord::xy(x, y));
                }
            }
            30 => {
                if let (Some(last), Some(z)) = (data.control_points.last_mut(), group.as_f64()) {
                    last.z = Some(z);
                }
            }
            11 => fit_x = group.as_f64(),
            21 => {
                if let (Some(x), Some(y)) = (fit_x.take(), group.as_f64()) {
                    data.fit_points.push(Coord::xy(x, y));
                }
            }
            31 => {
                if let (Some(last), Some(z)) = (data.fit_points.last_mut(), group.as_f64()) {
                    last.z = Some(z);
                }
            }
            _ => {}
        }
    }

    if data.control_points.len() < 2 && data.fit_points.len() < 2 {
        return Err("spline has neither control points nor fit points".into());
    }

    Ok(data)
}

/// Sequential reader over the groups of one entity.
struct Cursor<'a> {
    groups: &'a [Group],
    position: usize,
}

impl<'a> Cursor<'a> {
    fn peek_code(&self) -> Option<i32> {
        self.groups.get(self.position).map(|g| g.code)
    }

    fn peek_code_at(&self, offset: usize) -> Option<i32> {
        self.groups.get(self.position + offset).map(|g| g.code)
    }

    /// Advances to the next group with the given code and returns it.
    fn seek(&mut self, code: i32) -> Result<&'a Group, String> {
        while let Some(group) = self.groups.get(self.position) {
            self.position += 1;
            if group.code == code {
                return Ok(group);
            }
        }

        Err(format!("hatch boundary is truncated, expected group {code}"))
    }

    fn f64(&mut self, code: i32) -> Result<f64, String> {
        self.seek(code)?
            .as_f64()
            .ok_or_else(|| format!("group {code} is not a number"))
    }

    fn i32(&mut self, code: i32) -> Result<i32, String> {
        self.seek(code)?
            .as_i32()
            .ok_or_else(|| format!("group {code} is not an integer"))
    }

    fn count(&mut self, code: i32) -> Result<usize, String> {
        let value = self.i32(code)?;
        usize::try_from(value).map_err(|_| format!("negative count {value} in group {code}"))
    }

    fn xy(&mut self, code: i32) -> Result<Coord, String> {
        Ok(Coord::xy(self.f64(code)?, self.f64(code + 10)?))
    }

    fn skip_if(&mut self, code: i32) -> bool {
        if self.peek_code() == Some(code) {
            self.position += 1;
            true
        } else {
            false
        }
    }
}

fn hatch_paths(groups: &[Group]) -> Result<Vec<BoundaryPath>, String> {
    let mut cursor = Cursor {
        groups,
        position: 0,
    };
    let path_count = cursor.count(91)?;
    let mut paths = Vec::with_capacity(path_count);

    for _ in 0..path_count {
        let flags = cursor.i32(92)?;
        let path = if flags & 2 != 0 {
            let has_bulge = cursor.i32(72)? != 0;
            let closed = cursor.i32(73)? != 0;
            let vertex_count = cursor.count(93)?;
            let mut vertices = Vec::with_capacity(vertex_count);
            for _ in 0..vertex_count {
                let coord = cursor.xy(10)?;
                let bulge = if has_bulge && cursor.peek_code() == Some(42) {
                    cursor.f64(42)?
                } else {
                    0.0
                };
                vertices.push(Vertex { coord, bulge });
            }
            BoundaryPath::Polyline { vertices, closed }
        } else {
            let edge_count = cursor.count(93)?;
            let mut edges = Vec::with_capacity(edge_count);
            for _ in 0..edge_count {
                edges.push(hatch_edge(&mut cursor)?);
            }
            BoundaryPath::Edges(edges)
        };

        if cursor.peek_code() == Some(97) {
            let sources = cursor.count(97)?;
            for _ in 0..sources {
                if !cursor.skip_if(330) {
                    break;
                }
            }
        }
        paths.push(path);
    }

    Ok(paths)
}

fn hatch_edge(cursor: &mut Cursor) -> Result<HatchEdge, String> {
    let edge = match cursor.i32(72)? {
        1 => HatchEdge::Line(cursor.xy(10)?, cursor.xy(11)?),
        2 => HatchEdge::Arc {
            center: cursor.xy(10)?,
            radius: cursor.f64(40)?,
            start_angle: cursor.f64(50)?,
            end_angle: cursor.f64(51)?,
            ccw: cursor.i32(73)? != 0,
        },
        3 => HatchEdge::Ellipse {
            center: cursor.xy(10)?,
            major_axis: cursor.xy(11)?,
            ratio: cursor.f64(40)?,
            start_angle: cursor.f64(50)?,
            end_angle: cursor.f64(51)?,
            ccw: cursor.i32(73)? != 0,
        },
        4 => HatchEdge::Spline(hatch_spline_edge(cursor)?),
        other => return Err(format!("unknown hatch edge type {other}")),
    };

    Ok(edge)
}

fn hatch_spline_edge(cursor: &mut Cursor) -> Result<SplineData, String> {
    let degree = cursor.count(94)?.max(1);
    let rational = cursor.i32(73)? != 0;
    let periodic = cursor.i32(74)? != 0;
    let knot_count = cursor.count(95)?;
    let control_count = cursor.count(96)?;

    let mut data = SplineData {
        degree,
        closed: periodic,
        ..Default::default()
    };
    for _ in 0..knot_count {
        data.knots.push(cursor.f64(40)?);
    }
    for _ in 0..control_count {
        data.control_points.push(cursor.xy(10)?);
        if rational && cursor.peek_code() == Some(42) {
            data.weights.push(cursor.f64(42)?);
        }
    }

    // Fit data is optional. A `97` group not followed by fit points or tangents is the source boundary count of
    // the path and is left to the caller.
    if cursor.peek_code() == Some(97) {
        let next = cursor.peek_code_at(1);
        let count = cursor.groups[cursor.position].as_i32().unwrap_or(0);
        if next == Some(11) || (count == 0 && matches!(next, Some(12) | Some(13))) {
            let fit_count = cursor.count(97)?;
            for _ in 0..fit_count {
                data.fit_points.push(cursor.xy(11)?);
            }
            for code in [12, 22, 13, 23] {
                cursor.skip_if(code);
            }
        }
    }

    Ok(data)
}
