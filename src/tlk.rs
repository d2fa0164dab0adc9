// SPDX-FileCopyrightText: 2025 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;

use tracing::debug;

use crate::common::Platform;
use crate::gff::Gff;
use crate::ByteSpan;
use crate::{Error, Result};

// Talk table field labels.
const LABEL_STRING_LIST: u32 = 19001;
const LABEL_STRING_ID: u32 = 19002;
const LABEL_STRING_TEXT: u32 = 19003;
const LABEL_HSTRING_ID: u32 = 19004;
const LABEL_HSTRING_BIT_OFFSET: u32 = 19005;
const LABEL_HSTRING_LIST: u32 = 19006;
const LABEL_HUFFMAN_TREE: u32 = 19007;
const LABEL_HUFFMAN_DATA: u32 = 19008;

/// A localization talk table, mapping string ids to text.
///
/// Two wire layouts exist: V0.2 stores plain string entries, V0.5 packs all
/// text into one Huffman-coded bit stream with per-entry bit offsets.
pub struct TalkTable {
    strings: HashMap<u32, String>,
}

impl TalkTable {
    /// Parses a talk table out of `buffer`.
    pub fn from_existing(platform: Platform, buffer: ByteSpan) -> Result<Self> {
        let gff = Gff::from_existing(platform, buffer)?;

        let strings = match &gff.header.file_version {
            b"V0.2" => Self::parse_plain(&gff),
            b"V0.5" => Self::parse_huffman(&gff),
            other => {
                return Err(Error::UnsupportedVersion { found: *other });
            }
        };

        debug!(strings = strings.len(), "Parsed talk table");

        Ok(Self { strings })
    }

    fn parse_plain(gff: &Gff) -> HashMap<u32, String> {
        let mut strings = HashMap::new();

        for entry in gff.read_struct_list(0, LABEL_STRING_LIST, 0) {
            let id = gff.read_u32_by_label(entry.struct_index, LABEL_STRING_ID, entry.offset);
            let Some(field) = gff.find_field(entry.struct_index, LABEL_STRING_TEXT) else {
                continue;
            };

            let Some(field_offset) = entry.offset.checked_add(field.data_offset) else {
                continue;
            };
            let reader = gff.reader();
            let rel_offset = reader.read_i32(gff.data_position(field_offset));
            if rel_offset < 0 {
                continue;
            }

            let text = gff.read_wide_string(gff.data_position(rel_offset as u32));
            strings.insert(id, text);
        }

        strings
    }

    fn parse_huffman(gff: &Gff) -> HashMap<u32, String> {
        let mut strings = HashMap::new();

        let Some((tree_count, tree_start)) = gff.primitive_list_info(0, LABEL_HUFFMAN_TREE, 0)
        else {
            return strings;
        };
        let Some((data_count, data_start)) = gff.primitive_list_info(0, LABEL_HUFFMAN_DATA, 0)
        else {
            return strings;
        };
        if tree_count == 0 || data_count == 0 {
            return strings;
        }

        let reader = gff.reader();
        let tree: Vec<i32> = (0..tree_count as usize)
            .map(|i| reader.read_i32(tree_start + i * 4))
            .collect();
        let data: Vec<u32> = (0..data_count as usize)
            .map(|i| reader.read_u32(data_start + i * 4))
            .collect();

        for entry in gff.read_struct_list(0, LABEL_HSTRING_LIST, 0) {
            let id = gff.read_u32_by_label(entry.struct_index, LABEL_HSTRING_ID, entry.offset);
            let bit_offset =
                gff.read_u32_by_label(entry.struct_index, LABEL_HSTRING_BIT_OFFSET, entry.offset);
            strings.insert(id, huffman_decode(bit_offset, &tree, &data));
        }

        strings
    }

    /// Looks up the text for a string id.
    pub fn lookup(&self, id: u32) -> Option<&str> {
        self.strings.get(&id).map(String::as_str)
    }

    /// How many strings the table holds.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

// Walks the bit stream through the coding tree. Interior nodes hold two child
// indices; a negative value is a leaf encoding the code unit `-value - 1`,
// and a decoded -1 leaf terminates the string.
fn huffman_decode(bit_start: u32, tree: &[i32], data: &[u32]) -> String {
    if tree.len() < 2 || data.is_empty() {
        return String::new();
    }

    let mut index = (bit_start >> 5) as usize;
    let mut shift = bit_start & 0x1F;
    if index >= data.len() {
        return String::new();
    }
    let mut n = data[index] >> shift;

    let mut result = String::new();
    loop {
        let mut e = (tree.len() / 2) as i32 - 1;
        while e >= 0 {
            let slot = e as usize * 2 + (n & 1) as usize;
            let Some(&next) = tree.get(slot) else {
                return result;
            };
            e = next;

            if shift < 31 {
                n >>= 1;
                shift += 1;
            } else {
                index += 1;
                if index >= data.len() {
                    return result;
                }
                n = data[index];
                shift = 0;
            }
        }

        if e == -1 {
            break;
        }
        let unit = (-e - 1) as u16;
        result.push(char::from_u32(unit as u32).unwrap_or(char::REPLACEMENT_CHARACTER));
    }

    result
}
