// SPDX-FileCopyrightText: 2025 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use glam::Vec3;
use tracing::debug;

use crate::mesh::{MeshData, Vertex};
use crate::ByteSpan;
use crate::{Error, Result};

/// Vertex stride when no VERT struct declares one.
const DEFAULT_VERTEX_SIZE: usize = 32;

/// A plausible vertex list holds between these many entries (exclusive).
const MIN_VERTEX_COUNT: u32 = 100;
const MAX_VERTEX_COUNT: u32 = 100_000;

/// World-space envelope a terrain vertex is expected to fall in.
const COORD_LIMIT: f32 = 1000.0;
const HEIGHT_LIMIT: f32 = 500.0;

/// How many vertices of a candidate list are sampled, and how many of those
/// must be in range and away from the origin.
const SAMPLE_SIZE: usize = 100;
const MIN_VALID_SAMPLES: usize = 50;
const MIN_NONZERO_SAMPLES: usize = 10;

/// Polygon records in the fallback section are this wide, and at least this
/// many must appear back to back.
const POLYGON_RECORD_SIZE: usize = 32;
const MIN_POLYGON_RUN: usize = 50;

const STRUCT_TABLE_OFFSET: usize = 28;
const STRUCT_ENTRY_SIZE: usize = 16;

/// A terrain mesh (TMSH) recovered from a level file.
///
/// The format does not index its vertex list from the header, so the list is
/// found by scanning the data section for a count and offset pair that
/// describes vertices inside the expected world envelope. Files where no such
/// list is recognized load as an empty mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerrainMesh {
    pub mesh: MeshData,
}

impl TerrainMesh {
    pub fn from_existing(buffer: ByteSpan) -> Result<Self> {
        if buffer.len() < 28 {
            return Err(Error::BufferTooSmall {
                size: buffer.len(),
                needed: 28,
            });
        }
        if &buffer[0..4] != b"GFF " {
            return Err(Error::BadMagic {
                found: buffer[0..4].try_into().unwrap(),
            });
        }
        if &buffer[4..8] != b"V4.0" {
            return Err(Error::UnsupportedVersion {
                found: buffer[4..8].try_into().unwrap(),
            });
        }

        let data_offset = read_u32(buffer, 24) as usize;
        let vertex_size = vertex_struct_size(buffer);

        let mut mesh = MeshData::default();
        if let Some((count, list_offset)) = find_vertex_list(buffer, data_offset, vertex_size) {
            debug!(count, list_offset, vertex_size, "Found vertex list");
            for i in 0..count as usize {
                let pos = list_offset + i * vertex_size;
                mesh.vertices.push(Vertex {
                    position: read_vec3(buffer, pos),
                    normal: Vec3::Z,
                    uv: [0.0, 0.0],
                });
            }
        } else if let Some((start, run)) = find_polygon_run(buffer, data_offset) {
            debug!(start, run, "No vertex list, recovered polygon records");
            for i in 0..run {
                let pos = start + i * POLYGON_RECORD_SIZE;
                mesh.vertices.push(Vertex {
                    position: read_vec3(buffer, pos + 16),
                    normal: Vec3::Z,
                    uv: [0.0, 0.0],
                });
            }
        } else {
            debug!("No plausible vertex data found");
        }

        mesh.calculate_bounds();
        Ok(TerrainMesh { mesh })
    }
}

fn read_u32(data: ByteSpan, pos: usize) -> u32 {
    if pos + 4 > data.len() {
        return 0;
    }
    u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap())
}

fn read_f32(data: ByteSpan, pos: usize) -> f32 {
    f32::from_bits(read_u32(data, pos))
}

fn read_vec3(data: ByteSpan, pos: usize) -> Vec3 {
    Vec3::new(
        read_f32(data, pos),
        read_f32(data, pos + 4),
        read_f32(data, pos + 8),
    )
}

fn in_envelope(v: Vec3) -> bool {
    v.x.abs() < COORD_LIMIT && v.y.abs() < COORD_LIMIT && v.z.abs() < HEIGHT_LIMIT
}

/// Looks up the declared size of the VERT struct, if the file has one.
fn vertex_struct_size(data: ByteSpan) -> usize {
    let struct_count = read_u32(data, 20) as usize;
    for i in 0..struct_count {
        let pos = STRUCT_TABLE_OFFSET + i * STRUCT_ENTRY_SIZE;
        if pos + STRUCT_ENTRY_SIZE > data.len() {
            break;
        }
        if &data[pos..pos + 4] == b"VERT" {
            let size = read_u32(data, pos + 12) as usize;
            if size > 0 {
                return size;
            }
        }
    }
    DEFAULT_VERTEX_SIZE
}

/// Scans the data section for a (count, offset) pair whose vertices look like
/// terrain. Of all pairs that pass the sample test, the largest count wins.
fn find_vertex_list(
    data: ByteSpan,
    data_offset: usize,
    vertex_size: usize,
) -> Option<(u32, usize)> {
    let mut best: Option<(u32, usize)> = None;

    let scan_end = data.len().saturating_sub(8);
    for pos in (data_offset..scan_end).step_by(4) {
        let count = read_u32(data, pos);
        let list_offset = read_u32(data, pos + 4) as usize;

        if count <= MIN_VERTEX_COUNT || count >= MAX_VERTEX_COUNT {
            continue;
        }
        if list_offset <= data_offset {
            continue;
        }
        let list_bytes = count as u64 * vertex_size as u64;
        if list_offset as u64 + list_bytes > data.len() as u64 {
            continue;
        }
        if let Some((best_count, _)) = best {
            if count <= best_count {
                continue;
            }
        }

        let mut valid = 0;
        let mut nonzero = 0;
        for i in 0..SAMPLE_SIZE.min(count as usize) {
            let v = read_vec3(data, list_offset + i * vertex_size);
            if in_envelope(v) {
                valid += 1;
                if v != Vec3::ZERO {
                    nonzero += 1;
                }
            }
        }

        if valid >= MIN_VALID_SAMPLES && nonzero >= MIN_NONZERO_SAMPLES {
            best = Some((count, list_offset));
        }
    }

    best
}

// Some files carry no recognizable vertex list but do have a polygon section:
// 32-byte records with a flag word of 1, a position at +16 and a zero pad at
// the end. A long enough run of those is taken as the vertex stream.
fn find_polygon_run(data: ByteSpan, data_offset: usize) -> Option<(usize, usize)> {
    for start in (data_offset..data.len()).step_by(4) {
        if start + POLYGON_RECORD_SIZE * MIN_POLYGON_RUN > data.len() {
            break;
        }

        let mut run = 0;
        let mut pos = start;
        while pos + POLYGON_RECORD_SIZE <= data.len() {
            let flag = read_u32(data, pos + 4);
            let v = read_vec3(data, pos + 16);
            let pad = read_f32(data, pos + 28);
            if flag != 1 || !in_envelope(v) || pad != 0.0 {
                break;
            }
            run += 1;
            pos += POLYGON_RECORD_SIZE;
        }

        if run >= MIN_POLYGON_RUN {
            return Some((start, run));
        }
    }

    None
}
