//! Low level reader of DXF group code / value pairs.
//!
//! Both the ASCII flavour and the binary flavour of AutoCAD R13 and newer are supported. Binary values are
//! converted to their textual form, so the rest of the decoder works with one representation.

use std::fmt::Write;

/// Sentinel at the start of a binary DXF file.
pub const BINARY_SENTINEL: &[u8] = b"AutoCAD Binary DXF\r\n\x1a\0";

/// One group code with its value.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub code: i32,
    pub value: String,
}

impl Group {
    pub fn new(code: i32, value: impl Into<String>) -> Self {
        Self {
            code,
            value: value.into(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.value.trim().parse().ok()
    }

    pub fn as_i32(&self) -> Option<i32> {
        let value = self.value.trim();
        value
            .parse()
            .ok()
            .or_else(|| value.parse::<f64>().ok().map(|v| v as i32))
    }

    /// True if this group is `0/<name>`.
    pub fn is_marker(&self, name: &str) -> bool {
        self.code == 0 && self.value == name
    }
}

/// Returns true if the bytes start with the binary DXF sentinel.
pub fn is_binary(bytes: &[u8]) -> bool {
    bytes.starts_with(BINARY_SENTINEL)
}

/// Reads all groups of a DXF file.
pub fn read_groups(bytes: &[u8]) -> Result<Vec<Group>, String> {
    if is_binary(bytes) {
        read_binary(&bytes[BINARY_SENTINEL.len()..])
    } else {
        read_ascii(bytes)
    }
}

fn keeps_whitespace(code: i32) -> bool {
    matches!(code, 1 | 3)
}

fn read_ascii(bytes: &[u8]) -> Result<Vec<Group>, String> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.strip_prefix('\u{feff}').unwrap_or(&*text);
    let mut lines = text.lines();
    let mut groups = vec![];
    let mut line_number = 0;

    while let Some(code_line) = lines.next() {
        line_number += 1;
        let code_line = code_line.trim();
        if code_line.is_empty() {
            if lines.clone().all(|l| l.trim().is_empty()) {
                break;
            }
            return Err(format!("empty group code at line {line_number}"));
        }

        let code: i32 = code_line
            .parse()
            .map_err(|_| format!("invalid group code {code_line:?} at line {line_number}"))?;
        let value = lines
            .next()
            .ok_or_else(|| format!("missing value of group code {code} at line {line_number}"))?;
        line_number += 1;

        let value = if keeps_whitespace(code) {
            value.trim_end_matches('\r')
        } else {
            value.trim()
        };
        groups.push(Group::new(code, value));

        if code == 0 && value == "EOF" {
            break;
        }
    }

    Ok(groups)
}

#[derive(Debug, Copy, Clone, PartialEq)]
enum BinaryKind {
    Int16,
    Int32,
    Int64,
    Double,
    Bool,
    Chunk,
    String,
}

fn binary_kind(code: u16) -> BinaryKind {
    match code {
        60..=79 | 170..=179 | 270..=289 | 370..=389 | 400..=409 | 1060..=1070 => BinaryKind::Int16,
        90..=99 | 420..=429 | 440..=459 | 1071 => BinaryKind::Int32,
        160..=169 => BinaryKind::Int64,
        10..=59 | 110..=149 | 210..=239 | 460..=469 | 1010..=1059 => BinaryKind::Double,
        290..=299 => BinaryKind::Bool,
        310..=319 | 1004 => BinaryKind::Chunk,
        _ => BinaryKind::String,
    }
}

struct BinaryCursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> BinaryCursor<'a> {
    fn take(&mut self, count: usize) -> Result<&'a [u8], String> {
        let end = self.position + count;
        if end > self.bytes.len() {
            return Err(format!(
                "unexpected end of binary data at byte {}",
                self.position
            ));
        }

        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], String> {
        let mut array = [0; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    fn take_string(&mut self) -> Result<String, String> {
        let rest = &self.bytes[self.position..];
        let length = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| format!("unterminated string at byte {}", self.position))?;
        let value = String::from_utf8_lossy(&rest[..length]).into_owned();
        self.position += length + 1;
        Ok(value)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.bytes.len()
    }
}

fn read_binary(bytes: &[u8]) -> Result<Vec<Group>, String> {
    let mut cursor = BinaryCursor { bytes, position: 0 };
    let mut groups = vec![];

    while !cursor.is_at_end() {
        let code = u16::from_le_bytes(cursor.take_array()?);
        let value = match binary_kind(code) {
            BinaryKind::Int16 => i16::from_le_bytes(cursor.take_array()?).to_string(),
            BinaryKind::Int32 => i32::from_le_bytes(cursor.take_array()?).to_string(),
            BinaryKind::Int64 => i64::from_le_bytes(cursor.take_array()?).to_string(),
            BinaryKind::Double => f64::from_le_bytes(cursor.take_array()?).to_string(),
            BinaryKind::Bool => u8::from_le_bytes(cursor.take_array()?).to_string(),
            BinaryKind::Chunk => {
                let [length] = cursor.take_array()?;
                cursor
                    .take(length as usize)?
                    .iter()
                    .fold(String::new(), |mut hex, b| {
                        let _ = write!(hex, "{b:02X}");
                        hex
                    })
            }
            BinaryKind::String => cursor.take_string()?,
        };

        let is_eof = code == 0 && value == "EOF";
        groups.push(Group::new(i32::from(code), value));
        if is_eof {
            break;
        }
    }

    Ok(groups)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Encodes groups in the binary DXF flavour.
    pub(crate) fn encode_binary(groups: &[(u16, &str)]) -> Vec<u8> {
        let mut bytes = BINARY_SENTINEL.to_vec();
        for (code, value) in groups {
            bytes.extend_from_slice(&code.to_le_bytes());
            match binary_kind(*code) {
                BinaryKind::Int16 => {
                    bytes.extend_from_slice(&value.parse::<i16>().expect("int16").to_le_bytes())
                }
                BinaryKind::Int32 => {
                    bytes.extend_from_slice(&value.parse::<i32>().expect("int32").to_le_bytes())
                }
                BinaryKind::Int64 => {
                    bytes.extend_from_slice(&value.parse::<i64>().expect("int64").to_le_bytes())
                }
                BinaryKind::Double => {
                    bytes.extend_from_slice(&value.parse::<f64>().expect("double").to_le_bytes())
                }
                BinaryKind::Bool => bytes.push(value.parse::<u8>().expect("bool")),
                BinaryKind::Chunk => {
                    bytes.push(0);
                }
                BinaryKind::String => {
                    bytes.extend_from_slice(value.as_bytes());
                    bytes.push(0);
                }
            }
        }

        bytes
    }

    #[test]
    fn ascii_pairs() {
        let groups = read_groups(b"  0\r\nSECTION\r\n  2\r\nENTITIES\r\n 10\r\n 1.5\r\n  1\r\n two words \r\n  0\r\nEOF\r\n")
            .expect("valid groups");
        assert_eq!(
            groups,
            vec![
                Group::new(0, "SECTION"),
                Group::new(2, "ENTITIES"),
                Group::new(10, "1.5"),
                Group::new(1, " two words "),
                Group::new(0, "EOF"),
            ]
        );
        assert_eq!(groups[2].as_f64(), Some(1.5));
    }

    #[test]
    fn ascii_rejects_bad_code() {
        assert!(read_groups(b"  0\nSECTION\nabc\nENTITIES\n").is_err());
    }

    #[test]
    fn binary_pairs() {
        let bytes = encode_binary(&[
            (0, "SECTION"),
            (2, "ENTITIES"),
            (0, "CIRCLE"),
            (10, "2.5"),
            (62, "-7"),
            (90, "12"),
            (0, "EOF"),
        ]);
        let groups = read_groups(&bytes).expect("valid groups");

        assert_eq!(groups.len(), 7);
        assert_eq!(groups[3].as_f64(), Some(2.5));
        assert_eq!(groups[4].as_i32(), Some(-7));
        assert_eq!(groups[5].as_i32(), Some(12));
        assert!(groups[6].is_marker("EOF"));
    }

    #[test]
    fn binary_truncated_value() {
        let mut bytes = encode_binary(&[(0, "SECTION"), (10, "1.0")]);
        bytes.truncate(bytes.len() - 3);
        assert!(read_groups(&bytes).is_err());
    }
}
