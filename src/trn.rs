// SPDX-FileCopyrightText: 2025 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use glam::Vec3;
use tracing::debug;

use crate::mesh::{MeshData, Vertex};
use crate::ByteSpan;
use crate::{Error, Result};

/// The full signature of a PC terrain file.
pub const TRN_MAGIC: &[u8; 16] = b"GFF V4.0PC  TRN ";

/// The byte pattern that marks the start of the packed height grid.
const HEIGHT_SENTINEL: [u8; 3] = [0x01, 0x23, 0xFF];

/// Terrain sectors are always authored on this grid.
const GRID_SIZE: usize = 512;

/// World-space edge length of one sector.
const SECTOR_SIZE: f32 = 256.0;

const STRUCT_TABLE_OFFSET: usize = 0x20;
const STRUCT_ENTRY_SIZE: usize = 16;
const CELL_SIZE: usize = 4;

/// A decoded terrain sector: a regular height grid turned into a renderable mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainSector {
    pub grid_width: usize,
    pub grid_height: usize,
    pub sector_size: f32,
    pub mesh: MeshData,
}

/// Which major sections a level declares in its header tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelContents {
    pub has_area: bool,
    pub has_terrain: bool,
}

impl TerrainSector {
    /// Decodes a terrain (TRN) file into a sector mesh.
    ///
    /// The height grid has no offset in the header tables; it is located by
    /// scanning for its sentinel pattern past the struct table. A file without
    /// the sentinel loads as an empty sector.
    pub fn from_existing(buffer: ByteSpan) -> Result<Self> {
        if buffer.len() < 0x30 {
            return Err(Error::BufferTooSmall {
                size: buffer.len(),
                needed: 0x30,
            });
        }
        if &buffer[0..4] != b"GFF " {
            return Err(Error::BadMagic {
                found: buffer[0..4].try_into().unwrap(),
            });
        }
        if buffer[8..16] != TRN_MAGIC[8..16] {
            return Err(Error::UnsupportedVersion {
                found: buffer[12..16].try_into().unwrap(),
            });
        }

        let struct_count = read_u32(buffer, 0x18) as usize;
        let table_end = STRUCT_TABLE_OFFSET + struct_count * STRUCT_ENTRY_SIZE;

        let mut sector = TerrainSector {
            grid_width: GRID_SIZE,
            grid_height: GRID_SIZE,
            sector_size: SECTOR_SIZE,
            mesh: MeshData::default(),
        };

        let Some(grid_start) = find_sentinel(buffer, table_end) else {
            debug!("No height grid sentinel found, returning empty sector");
            return Ok(sector);
        };

        sector.mesh = decode_height_grid(buffer, grid_start);
        sector.mesh.calculate_bounds();

        debug!(
            vertices = sector.mesh.vertices.len(),
            indices = sector.mesh.indices.len(),
            "Decoded terrain sector"
        );

        Ok(sector)
    }
}

/// Reads the struct table tags of a level header to report which sections
/// the level carries.
pub fn probe_level(buffer: ByteSpan) -> Result<LevelContents> {
    if buffer.len() < 0x20 {
        return Err(Error::BufferTooSmall {
            size: buffer.len(),
            needed: 0x20,
        });
    }
    if &buffer[0..4] != b"GFF " {
        return Err(Error::BadMagic {
            found: buffer[0..4].try_into().unwrap(),
        });
    }

    let struct_count = read_u32(buffer, 0x18) as usize;

    let mut contents = LevelContents::default();
    for i in 0..struct_count {
        let pos = STRUCT_TABLE_OFFSET + i * STRUCT_ENTRY_SIZE;
        if pos + 4 > buffer.len() {
            break;
        }
        match &buffer[pos..pos + 4] {
            b"AREA" => contents.has_area = true,
            b"MESH" => contents.has_terrain = true,
            _ => (),
        }
    }

    Ok(contents)
}

fn read_u32(data: ByteSpan, pos: usize) -> u32 {
    if pos + 4 > data.len() {
        return 0;
    }
    u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap())
}

fn find_sentinel(data: ByteSpan, from: usize) -> Option<usize> {
    if data.len() < HEIGHT_SENTINEL.len() {
        return None;
    }
    (from..=data.len() - HEIGHT_SENTINEL.len())
        .find(|&i| data[i..i + HEIGHT_SENTINEL.len()] == HEIGHT_SENTINEL)
}

// Each cell is 4 bytes: flags, layer, and a split height. The coarse part
// counts down from 255 and the fine part adds tenths on top.
fn decode_height_grid(data: ByteSpan, start: usize) -> MeshData {
    let mut mesh = MeshData::default();

    let mut rows: usize = 0;
    for y in 0..GRID_SIZE {
        let row_start = start + y * GRID_SIZE * CELL_SIZE;
        if row_start + GRID_SIZE * CELL_SIZE > data.len() {
            break;
        }

        for x in 0..GRID_SIZE {
            let cell = row_start + x * CELL_SIZE;
            let height_low = data[cell + 2];
            let height_high = data[cell + 3];
            let height = (255 - height_low) as f32 + height_high as f32 * 0.1;

            let step = SECTOR_SIZE / GRID_SIZE as f32;
            mesh.vertices.push(Vertex {
                position: Vec3::new(x as f32 * step, y as f32 * step, height * 0.5),
                normal: Vec3::Z,
                uv: [x as f32 / GRID_SIZE as f32, y as f32 / GRID_SIZE as f32],
            });
        }
        rows += 1;
    }

    // two triangles per grid quad, over the rows actually decoded
    for y in 0..rows.saturating_sub(1) {
        for x in 0..GRID_SIZE - 1 {
            let i0 = (y * GRID_SIZE + x) as u32;
            let i1 = i0 + 1;
            let i2 = i0 + GRID_SIZE as u32;
            let i3 = i2 + 1;
            mesh.indices.extend_from_slice(&[i0, i1, i2, i1, i3, i2]);
        }
    }

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::random_bytes;

    fn build_test_trn() -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(TRN_MAGIC);
        buffer.extend_from_slice(&[0u8; 8]); // file type words
        buffer.extend_from_slice(&1u32.to_le_bytes()); // struct count
        buffer.extend_from_slice(&0x30u32.to_le_bytes()); // data offset
        buffer.extend_from_slice(b"SECT");
        buffer.extend_from_slice(&[0u8; 12]);

        // the grid starts at the sentinel itself, so the first cell
        // carries the pattern as its flag, layer and coarse height
        let mut grid = vec![0u8; GRID_SIZE * GRID_SIZE * CELL_SIZE];
        grid[0] = HEIGHT_SENTINEL[0];
        grid[1] = HEIGHT_SENTINEL[1];
        grid[2] = HEIGHT_SENTINEL[2];
        // flat ground everywhere else
        for cell in grid.chunks_exact_mut(CELL_SIZE).skip(1) {
            cell[2] = 255;
        }
        // one raised cell at (1, 0): coarse 5, fine 1.0
        grid[CELL_SIZE + 2] = 250;
        grid[CELL_SIZE + 3] = 10;

        buffer.extend_from_slice(&grid);
        buffer
    }

    #[test]
    fn decodes_height_grid() {
        let buffer = build_test_trn();
        let sector = TerrainSector::from_existing(&buffer).unwrap();

        assert_eq!(sector.mesh.vertices.len(), GRID_SIZE * GRID_SIZE);
        assert_eq!(
            sector.mesh.indices.len(),
            (GRID_SIZE - 1) * (GRID_SIZE - 1) * 6
        );

        // (255 - 250) + 10 * 0.1 = 6.0, halved into world space
        let raised = &sector.mesh.vertices[1];
        assert_eq!(raised.position, Vec3::new(0.5, 0.0, 3.0));
        assert_eq!(raised.normal, Vec3::Z);

        // flat cells sit at zero
        assert_eq!(sector.mesh.vertices[2].position.z, 0.0);

        // the first quad references its four corner vertices
        assert_eq!(&sector.mesh.indices[0..6], &[0, 1, 512, 1, 513, 512]);
    }

    #[test]
    fn truncated_grid_decodes_whole_rows() {
        let mut buffer = build_test_trn();
        // keep the header and exactly two rows of cells
        buffer.truncate(0x30 + 2 * GRID_SIZE * CELL_SIZE);

        let sector = TerrainSector::from_existing(&buffer).unwrap();
        assert_eq!(sector.mesh.vertices.len(), 2 * GRID_SIZE);
        assert_eq!(sector.mesh.indices.len(), (GRID_SIZE - 1) * 6);
    }

    #[test]
    fn sentinel_at_buffer_tail_is_found() {
        let mut data = vec![0u8; 64];
        let tail = data.len() - HEIGHT_SENTINEL.len();
        data[tail..].copy_from_slice(&HEIGHT_SENTINEL);

        assert_eq!(find_sentinel(&data, 0), Some(tail));

        // less than a full row after the pattern decodes to nothing
        let mut buffer = build_test_trn();
        buffer.truncate(0x40);
        for b in &mut buffer[0x30..0x3d] {
            *b = 0;
        }
        buffer[0x3d..0x40].copy_from_slice(&HEIGHT_SENTINEL);

        let sector = TerrainSector::from_existing(&buffer).unwrap();
        assert!(sector.mesh.vertices.is_empty());
        assert!(sector.mesh.indices.is_empty());
    }

    #[test]
    fn missing_sentinel_is_an_empty_sector() {
        let mut buffer = build_test_trn();
        buffer.truncate(0x40);
        for b in &mut buffer[0x30..] {
            *b = 0;
        }

        let sector = TerrainSector::from_existing(&buffer).unwrap();
        assert!(sector.mesh.vertices.is_empty());
    }

    #[test]
    fn wrong_variant_is_rejected() {
        let mut buffer = build_test_trn();
        buffer[12..16].copy_from_slice(b"ARL ");

        assert_eq!(
            TerrainSector::from_existing(&buffer).err(),
            Some(Error::UnsupportedVersion { found: *b"ARL " })
        );
    }

    #[test]
    fn probes_level_contents() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(b"GFF V4.0PC  LVL ");
        buffer.extend_from_slice(&[0u8; 8]);
        buffer.extend_from_slice(&2u32.to_le_bytes());
        buffer.extend_from_slice(&0x40u32.to_le_bytes());
        buffer.extend_from_slice(b"AREA");
        buffer.extend_from_slice(&[0u8; 12]);
        buffer.extend_from_slice(b"MESH");
        buffer.extend_from_slice(&[0u8; 12]);

        let contents = probe_level(&buffer).unwrap();
        assert!(contents.has_area);
        assert!(contents.has_terrain);

        let nothing = probe_level(&buffer[..0x20]).unwrap();
        assert_eq!(nothing, LevelContents::default());
    }

    #[test]
    fn invalid_data_wont_load() {
        assert!(TerrainSector::from_existing(&random_bytes()).is_err());
        assert!(probe_level(&random_bytes()).is_err());
    }
}
