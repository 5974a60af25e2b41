//! Position translation through source-map v3 artifacts.
//!
//! One normalized convention everywhere inside: 0-based lines and columns,
//! exactly what VLQ decoding yields. Conversions to other conventions
//! happen at the boundaries only — the engine protocol (1-based, see
//! [`crate::protocol::EnginePosition`]) and nowhere else; collaborator
//! positions are already 0-based.
//!
//! A lookup propagates the column offset within the covering segment, so
//! translating there and back returns the exact starting position for any
//! position inside a mapped segment. A position with no covering segment on
//! its line is unresolved — that is an answer, not an error.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

use treels_types::{GeneratedPosition, OriginalPosition};

#[derive(Debug, Error)]
pub enum SourceMapError {
    #[error("unsupported source map version {0}")]
    UnsupportedVersion(u32),

    #[error("invalid VLQ data in mappings")]
    InvalidVlq,

    #[error("invalid source map JSON")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct RawSourceMap {
    version: u32,
    #[serde(default)]
    mappings: String,
}

/// One decoded mapping segment; all coordinates 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    gen_line: u32,
    gen_col: u32,
    orig_line: u32,
    orig_col: u32,
}

/// Read-only mapping table for one document pair.
#[derive(Debug, Clone)]
pub struct MappingTable {
    /// Sorted by (generated line, generated column).
    by_generated: Vec<Segment>,
    /// The same segments sorted by (original line, original column).
    by_original: Vec<Segment>,
}

impl MappingTable {
    pub fn parse(json: &str) -> Result<Self, SourceMapError> {
        let raw: RawSourceMap = serde_json::from_str(json)?;
        if raw.version != 3 {
            return Err(SourceMapError::UnsupportedVersion(raw.version));
        }
        Self::decode(&raw.mappings)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading mapping artifact {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("decoding mapping artifact {}", path.display()))
    }

    fn decode(mappings: &str) -> Result<Self, SourceMapError> {
        let mut segments = Vec::new();
        let mut src_idx: i64 = 0;
        let mut orig_line: i64 = 0;
        let mut orig_col: i64 = 0;

        for (gen_line, line) in mappings.split(';').enumerate() {
            let mut gen_col: i64 = 0;
            for encoded in line.split(',') {
                if encoded.is_empty() {
                    continue;
                }
                let fields = decode_vlq_fields(encoded)?;
                let Some(&col_delta) = fields.first() else {
                    continue;
                };
                gen_col += col_delta;
                // 1-field segments carry no original position; they still
                // advance the generated column.
                if fields.len() >= 4 {
                    src_idx += fields[1];
                    orig_line += fields[2];
                    orig_col += fields[3];
                    if gen_col < 0 || src_idx < 0 || orig_line < 0 || orig_col < 0 {
                        return Err(SourceMapError::InvalidVlq);
                    }
                    segments.push(Segment {
                        gen_line: gen_line as u32,
                        gen_col: gen_col as u32,
                        orig_line: orig_line as u32,
                        orig_col: orig_col as u32,
                    });
                }
            }
        }

        let mut by_generated = segments.clone();
        by_generated.sort_by_key(|s| (s.gen_line, s.gen_col));
        let mut by_original = segments;
        by_original.sort_by_key(|s| (s.orig_line, s.orig_col));
        Ok(Self {
            by_generated,
            by_original,
        })
    }

    /// Build a table directly from ((gen_line, gen_col), (orig_line,
    /// orig_col)) pairs, all 0-based.
    #[cfg(test)]
    pub(crate) fn from_pairs(pairs: &[((u32, u32), (u32, u32))]) -> Self {
        let segments: Vec<Segment> = pairs
            .iter()
            .map(|&((gen_line, gen_col), (orig_line, orig_col))| Segment {
                gen_line,
                gen_col,
                orig_line,
                orig_col,
            })
            .collect();
        let mut by_generated = segments.clone();
        by_generated.sort_by_key(|s| (s.gen_line, s.gen_col));
        let mut by_original = segments;
        by_original.sort_by_key(|s| (s.orig_line, s.orig_col));
        Self {
            by_generated,
            by_original,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_generated.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_generated.len()
    }

    /// Generated-space counterpart of an original position, when one exists.
    #[must_use]
    pub fn to_generated(&self, pos: OriginalPosition) -> Option<GeneratedPosition> {
        let segment = covering(&self.by_original, pos.line(), pos.column(), |s| {
            (s.orig_line, s.orig_col)
        })?;
        let delta = pos.column() - segment.orig_col;
        Some(GeneratedPosition::new(
            segment.gen_line,
            segment.gen_col + delta,
        ))
    }

    /// Original-space counterpart of a generated position, when one exists.
    #[must_use]
    pub fn to_original(&self, pos: GeneratedPosition) -> Option<OriginalPosition> {
        let segment = covering(&self.by_generated, pos.line(), pos.column(), |s| {
            (s.gen_line, s.gen_col)
        })?;
        let delta = pos.column() - segment.gen_col;
        Some(OriginalPosition::new(
            segment.orig_line,
            segment.orig_col + delta,
        ))
    }
}

/// Greatest segment on `line` starting at or before `column`.
fn covering(
    sorted: &[Segment],
    line: u32,
    column: u32,
    key: impl Fn(&Segment) -> (u32, u32),
) -> Option<&Segment> {
    let idx = sorted.partition_point(|s| key(s) <= (line, column));
    let segment = sorted.get(idx.checked_sub(1)?)?;
    (key(segment).0 == line).then_some(segment)
}

const VLQ_CONTINUATION_BIT: i64 = 0x20;

const VLQ_VALUE_MASK: i64 = 0x1f;

fn base64_value(byte: u8) -> Option<i64> {
    match byte {
        b'A'..=b'Z' => Some(i64::from(byte - b'A')),
        b'a'..=b'z' => Some(i64::from(byte - b'a') + 26),
        b'0'..=b'9' => Some(i64::from(byte - b'0') + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

/// Decode one comma-separated segment into its signed fields.
fn decode_vlq_fields(encoded: &str) -> Result<Vec<i64>, SourceMapError> {
    let mut fields = Vec::new();
    let mut value: i64 = 0;
    let mut shift: u32 = 0;

    for &byte in encoded.as_bytes() {
        let digit = base64_value(byte).ok_or(SourceMapError::InvalidVlq)?;
        value |= (digit & VLQ_VALUE_MASK) << shift;
        if digit & VLQ_CONTINUATION_BIT != 0 {
            shift += 5;
            if shift > 30 {
                return Err(SourceMapError::InvalidVlq);
            }
        } else {
            let negative = value & 1 == 1;
            let magnitude = value >> 1;
            fields.push(if negative { -magnitude } else { magnitude });
            value = 0;
            shift = 0;
        }
    }

    if shift != 0 {
        // Dangling continuation bit.
        return Err(SourceMapError::InvalidVlq);
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn vlq_decodes_known_values() {
        // 'A' = 0, 'C' = 1, 'E' = 2, 'U' = 10, 'D' = -1
        assert_eq!(decode_vlq_fields("AAAA").unwrap(), vec![0, 0, 0, 0]);
        assert_eq!(decode_vlq_fields("IAUE").unwrap(), vec![4, 0, 10, 2]);
        assert_eq!(decode_vlq_fields("D").unwrap(), vec![-1]);
        // Continuation: 'gB' = 32 | continuation, then 1 → 16
        assert_eq!(decode_vlq_fields("gB").unwrap(), vec![16]);
    }

    #[test]
    fn vlq_rejects_garbage() {
        assert!(matches!(
            decode_vlq_fields("!"),
            Err(SourceMapError::InvalidVlq)
        ));
        // 'g' alone leaves a dangling continuation bit
        assert!(matches!(
            decode_vlq_fields("g"),
            Err(SourceMapError::InvalidVlq)
        ));
    }

    #[test]
    fn parse_decodes_segments_across_lines() {
        let table = MappingTable::parse(r#"{ "version": 3, "mappings": "AAAA;AAEC" }"#).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.to_original(GeneratedPosition::new(0, 0)),
            Some(OriginalPosition::new(0, 0))
        );
        // Second line: orig_line accumulated +2, orig_col +1
        assert_eq!(
            table.to_original(GeneratedPosition::new(1, 0)),
            Some(OriginalPosition::new(2, 1))
        );
    }

    #[test]
    fn parse_skips_one_field_segments_but_advances_column() {
        // "I" advances gen_col by 4 without recording an original position;
        // the following "AAAA" lands at column 4.
        let table = MappingTable::parse(r#"{ "version": 3, "mappings": "I,AAAA" }"#).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.to_original(GeneratedPosition::new(0, 4)),
            Some(OriginalPosition::new(0, 0))
        );
        assert_eq!(table.to_original(GeneratedPosition::new(0, 3)), None);
    }

    #[test]
    fn parse_rejects_unsupported_version() {
        let err = MappingTable::parse(r#"{ "version": 2, "mappings": "" }"#).unwrap_err();
        assert!(matches!(err, SourceMapError::UnsupportedVersion(2)));
    }

    #[test]
    fn parse_rejects_broken_json() {
        assert!(matches!(
            MappingTable::parse("not json"),
            Err(SourceMapError::Json(_))
        ));
    }

    #[test]
    fn empty_mappings_resolve_nothing() {
        let table = MappingTable::parse(r#"{ "version": 3, "mappings": "" }"#).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.to_original(GeneratedPosition::new(0, 0)), None);
        assert_eq!(table.to_generated(OriginalPosition::new(0, 0)), None);
    }

    #[test]
    fn offset_propagates_within_a_segment() {
        let table = MappingTable::from_pairs(&[((2, 4), (10, 2))]);
        assert_eq!(
            table.to_original(GeneratedPosition::new(2, 4)),
            Some(OriginalPosition::new(10, 2))
        );
        assert_eq!(
            table.to_original(GeneratedPosition::new(2, 9)),
            Some(OriginalPosition::new(10, 7))
        );
        assert_eq!(
            table.to_generated(OriginalPosition::new(10, 5)),
            Some(GeneratedPosition::new(2, 7))
        );
    }

    #[test]
    fn round_trip_inside_mapped_segments() {
        let table = MappingTable::from_pairs(&[
            ((0, 0), (0, 1)),
            ((0, 12), (1, 1)),
            ((3, 8), (2, 4)),
        ]);
        for pos in [
            OriginalPosition::new(0, 1),
            OriginalPosition::new(0, 5),
            OriginalPosition::new(1, 1),
            OriginalPosition::new(1, 3),
            OriginalPosition::new(2, 4),
            OriginalPosition::new(2, 10),
        ] {
            let generated = table.to_generated(pos).unwrap();
            assert_eq!(table.to_original(generated), Some(pos), "round trip of {pos:?}");
        }
    }

    #[test]
    fn positions_outside_mapped_regions_are_unresolved() {
        let table = MappingTable::from_pairs(&[((2, 4), (10, 2))]);
        // Wrong line entirely
        assert_eq!(table.to_original(GeneratedPosition::new(1, 4)), None);
        assert_eq!(table.to_generated(OriginalPosition::new(9, 2)), None);
        // Same line, before the first segment
        assert_eq!(table.to_original(GeneratedPosition::new(2, 3)), None);
        assert_eq!(table.to_generated(OriginalPosition::new(10, 1)), None);
    }

    #[test]
    fn lookup_picks_the_nearest_preceding_segment() {
        let table = MappingTable::from_pairs(&[((5, 0), (1, 0)), ((5, 10), (2, 0))]);
        assert_eq!(
            table.to_original(GeneratedPosition::new(5, 9)),
            Some(OriginalPosition::new(1, 9))
        );
        assert_eq!(
            table.to_original(GeneratedPosition::new(5, 10)),
            Some(OriginalPosition::new(2, 0))
        );
        assert_eq!(
            table.to_original(GeneratedPosition::new(5, 14)),
            Some(OriginalPosition::new(2, 4))
        );
    }

    #[test]
    fn from_file_reads_a_real_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.view.tree.map");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{ "version": 3, "sources": ["a.view.tree"], "mappings": ";;IAUE" }}"#
        )
        .unwrap();

        let table = MappingTable::from_file(&path).unwrap();
        assert_eq!(
            table.to_original(GeneratedPosition::new(2, 4)),
            Some(OriginalPosition::new(10, 2))
        );
    }

    #[test]
    fn from_file_fails_for_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        assert!(MappingTable::from_file(&dir.path().join("missing.map")).is_err());
    }
}
