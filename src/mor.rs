// SPDX-FileCopyrightText: 2025 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use glam::Vec3;

use tracing::debug;

use crate::ByteSpan;
use crate::{Error, Result};

/// Morph files start with the 8-byte container magic, no struct table is used.
const MOR_MAGIC: &[u8; 8] = b"GFF V4.0";

/// Smallest buffer worth scanning.
const MIN_SIZE: usize = 32;

/// Morph target names observed in shipped head morphs, encoded as UTF-16LE
/// during the scan.
const TARGET_NAMES: [&str; 9] = [
    "FaceM1", "EyesM1", "LashesM1", "HairM1", "HairM2", "HairM3", "BeardM1", "BeardM2", "BeardM3",
];

// The scan bounds below are empirical, derived from observed files rather
// than a format specification.

/// Declared float counts at or above this are considered a false match.
const MAX_TARGET_FLOATS: u32 = 50_000;

/// Each vertex record is three floats of position plus four bytes of padding.
const VERTEX_RECORD_SIZE: usize = 16;
const FLOATS_PER_VERTEX: u32 = 4;

/// One named morph target and its vertex positions.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphTarget {
    pub name: String,
    /// The name with its variation suffix stripped, e.g. `Hair` for `HairM2`.
    pub category: String,
    pub index: u32,
    pub vertices: Vec<Vec3>,
}

/// A head morph (MOR) file, recovered by byte-pattern search.
///
/// The format has no known table of contents for its vertex blocks, so
/// targets are located by scanning for their UTF-16 names. Finding nothing is
/// not an error; an empty result means the format wasn't recognized here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Morph {
    pub name: String,
    pub model_refs: Vec<String>,
    pub targets: Vec<MorphTarget>,
}

impl Morph {
    /// Scans `buffer` for morph targets and model references.
    pub fn from_existing(buffer: ByteSpan) -> Result<Self> {
        if buffer.len() < MIN_SIZE {
            return Err(Error::BufferTooSmall {
                size: buffer.len(),
                needed: MIN_SIZE,
            });
        }
        if buffer[0..4] != MOR_MAGIC[0..4] {
            return Err(Error::BadMagic {
                found: buffer[0..4].try_into().unwrap(),
            });
        }
        if buffer[4..8] != MOR_MAGIC[4..8] {
            return Err(Error::UnsupportedVersion {
                found: buffer[4..8].try_into().unwrap(),
            });
        }

        let mut morph = Morph::default();

        let mut positions = Vec::new();
        for name in TARGET_NAMES {
            let pattern: Vec<u8> = name
                .encode_utf16()
                .flat_map(|unit| unit.to_le_bytes())
                .collect();
            if let Some(pos) = find_named_target(buffer, &pattern) {
                positions.push((pos, name));
            }
        }
        positions.sort();

        for (pos, name) in positions {
            if let Some(vertices) = parse_target_vertices(buffer, pos) {
                debug!(name, vertices = vertices.len(), "Found morph target");
                let (category, index) = split_target_name(name);
                morph.targets.push(MorphTarget {
                    name: name.to_string(),
                    category,
                    index,
                    vertices,
                });
            }
        }

        morph.sweep_model_refs(buffer);

        debug!(
            targets = morph.targets.len(),
            model_refs = morph.model_refs.len(),
            "Scanned morph"
        );

        Ok(morph)
    }

    /// Finds a target by its full name.
    pub fn find_target(&self, name: &str) -> Option<&MorphTarget> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Whether any target carries vertex data.
    pub fn has_vertex_data(&self) -> bool {
        self.targets.iter().any(|t| !t.vertices.is_empty())
    }

    // Length-prefixed UTF-16 resource names float free in the buffer; sweep
    // for anything shaped like a base model or character-creator reference.
    fn sweep_model_refs(&mut self, buffer: ByteSpan) {
        let mut pos = 0;
        while pos + 30 < buffer.len() {
            let length = read_u32(buffer, pos);
            if (10..=20).contains(&length) {
                let s = read_utf16(buffer, pos + 4, length as usize);
                let lower = s.to_lowercase();

                if (lower.contains("_uhm_")
                    || lower.contains("_uem_")
                    || lower.contains("_ulm_")
                    || lower.contains("_har_"))
                    && lower.contains("_bas")
                    && !self.model_refs.contains(&s)
                {
                    self.model_refs.push(s.clone());
                }
                if lower.contains("_pcc_") {
                    self.name = s;
                }
            }
            pos += 1;
        }
    }
}

// First occurrence of the pattern immediately followed by a double NUL.
fn find_named_target(buffer: ByteSpan, pattern: &[u8]) -> Option<usize> {
    let mut pos = 0;
    while pos + pattern.len() + 2 < buffer.len() {
        if &buffer[pos..pos + pattern.len()] == pattern
            && buffer[pos + pattern.len()] == 0
            && buffer[pos + pattern.len() + 1] == 0
        {
            return Some(pos);
        }
        pos += 1;
    }
    None
}

// Skips the rest of the name and any run of 0xFFFF padding, then reads a
// declared float count, sanity-bounded to reject wrong matches.
fn parse_target_vertices(buffer: ByteSpan, name_pos: usize) -> Option<Vec<Vec3>> {
    let mut name_end = name_pos;
    while name_end + 2 < buffer.len() && (buffer[name_end] != 0 || buffer[name_end + 1] != 0) {
        name_end += 2;
    }
    name_end += 2;

    let mut vertex_start = name_end;
    while vertex_start + 2 < buffer.len()
        && buffer[vertex_start] == 0xFF
        && buffer[vertex_start + 1] == 0xFF
    {
        vertex_start += 2;
    }

    if vertex_start + 4 >= buffer.len() {
        return None;
    }
    let float_count = read_u32(buffer, vertex_start);
    if float_count == 0 || float_count >= MAX_TARGET_FLOATS || float_count % FLOATS_PER_VERTEX != 0
    {
        return None;
    }

    let vertex_count = (float_count / FLOATS_PER_VERTEX) as usize;
    let data_start = vertex_start + 4;
    if data_start + float_count as usize * 4 > buffer.len() {
        return None;
    }

    let mut vertices = Vec::with_capacity(vertex_count);
    for v in 0..vertex_count {
        let offset = data_start + v * VERTEX_RECORD_SIZE;
        vertices.push(Vec3::new(
            read_f32(buffer, offset),
            read_f32(buffer, offset + 4),
            read_f32(buffer, offset + 8),
        ));
    }

    Some(vertices)
}

// "HairM2" becomes ("Hair", 2); names without a variation digit keep
// themselves as the category with index 1.
fn split_target_name(name: &str) -> (String, u32) {
    let bytes = name.as_bytes();
    if let Some(m_pos) = name.find('M') {
        if m_pos > 0 && m_pos + 1 < bytes.len() && bytes[m_pos + 1].is_ascii_digit() {
            return (name[..m_pos].to_string(), (bytes[m_pos + 1] - b'0') as u32);
        }
    }
    (name.to_string(), 1)
}

fn read_u32(buffer: ByteSpan, pos: usize) -> u32 {
    u32::from_le_bytes(buffer[pos..pos + 4].try_into().unwrap())
}

fn read_f32(buffer: ByteSpan, pos: usize) -> f32 {
    f32::from_le_bytes(buffer[pos..pos + 4].try_into().unwrap())
}

// ASCII-only UTF-16 read: stops at a NUL unit, skips non-ASCII units.
fn read_utf16(buffer: ByteSpan, pos: usize, max_chars: usize) -> String {
    let mut result = String::new();
    for i in 0..max_chars {
        let offset = pos + i * 2;
        if offset + 2 > buffer.len() {
            break;
        }
        let unit = u16::from_le_bytes([buffer[offset], buffer[offset + 1]]);
        if unit == 0 {
            break;
        }
        if unit < 128 {
            result.push(unit as u8 as char);
        }
    }
    result
}
