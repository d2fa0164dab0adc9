// SPDX-FileCopyrightText: 2025 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! The two hashes the engine derives identifiers from. Field labels use a
//! case-folded FNV-1a, table column names a CRC32 over case-folded UTF-16
//! code units. Both fold case before mixing, so lookups are effectively
//! case-insensitive.

const FNV_OFFSET_BASIS: u32 = 2166136261;
const FNV_PRIME: u32 = 16777619;

/// Hashes a field label the way the engine does: FNV-1a/32 with each byte
/// lowercased before mixing.
pub fn hash_label(name: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for c in name.bytes() {
        hash ^= c.to_ascii_lowercase() as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

struct Crc32 {
    table: [u32; 256],
}

impl Crc32 {
    const fn new() -> Self {
        let mut table: [u32; 256] = [0u32; 256];

        let polynomial: u32 = 0xEDB88320;
        let mut i = 0;
        while i < table.len() {
            let mut c: u32 = i as u32;
            let mut j = 0;
            while j < 8 {
                if (c & 1u32) == 1u32 {
                    c = polynomial ^ (c >> 1);
                } else {
                    c >>= 1;
                }
                j += 1;
            }

            table[i] = c;
            i += 1;
        }

        Self { table }
    }

    fn mix(&self, crc: u32, byte: u8) -> u32 {
        (crc >> 8) ^ self.table[((crc ^ byte as u32) & 0xFF) as usize]
    }
}

static CRC32: Crc32 = Crc32::new();

/// Hashes a table column name: standard CRC32, fed the UTF-16LE encoding of
/// the lowercased name (low byte then high byte of every code unit).
pub fn hash_column_name(name: &str) -> u32 {
    let mut crc: u32 = 0xFFFFFFFF;
    for c in name.chars() {
        let wc = c.to_ascii_lowercase() as u32 as u16;
        crc = CRC32.mix(crc, (wc & 0xFF) as u8);
        crc = CRC32.mix(crc, (wc >> 8) as u8);
    }
    crc ^ 0xFFFFFFFF
}
