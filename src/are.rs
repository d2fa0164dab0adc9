// SPDX-FileCopyrightText: 2025 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::Cursor;

use binrw::binread;
use binrw::BinReaderExt;
use glam::{Quat, Vec3};
use tracing::debug;

use crate::ByteSpan;
use crate::{Error, Result};

/// The object-list field type in the area table of contents.
const TYPE_LIST: u32 = 15;

const LABEL_ENTRY_SIZE: usize = 16;
const FIELD_ENTRY_SIZE: usize = 12;
const STRUCT_ENTRY_SIZE: usize = 12;
const TOP_FIELDS_OFFSET: usize = 0x40;

// Area files use an older container variant with a full table of contents:
// fixed-width labels instead of hashes, 12-byte field entries, and struct
// field sets resolved through a shared field-index table.
#[binread]
#[br(little)]
#[derive(Debug)]
struct AreaHeader {
    magic: [u8; 4],
    _version: [u8; 8],
    top_field_count: u32,
    struct_offset: u32,
    struct_count: u32,
    field_offset: u32,
    field_count: u32,
    label_offset: u32,
    label_count: u32,
    field_data_offset: u32,
    _field_data_size: u32,
    field_indices_offset: u32,
    _field_indices_size: u32,
    list_indices_offset: u32,
    _list_indices_size: u32,
}

#[derive(Debug, Clone)]
struct FieldEntry {
    label: String,
    type_id: u32,
    data_offset: u32,
}

/// One placed object in an area, as declared by its object lists.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaObject {
    pub template_res_ref: String,
    pub position: Vec3,
    pub orientation: Quat,
    pub active: bool,
}

/// The object lists of an area definition (ARE) file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Area {
    pub creatures: Vec<AreaObject>,
    pub placeables: Vec<AreaObject>,
    pub triggers: Vec<AreaObject>,
    pub waypoints: Vec<AreaObject>,
    pub sounds: Vec<AreaObject>,
    pub stores: Vec<AreaObject>,
    pub items: Vec<AreaObject>,
    pub stages: Vec<AreaObject>,
}

impl Area {
    /// Parses the object lists out of an area file.
    pub fn from_existing(buffer: ByteSpan) -> Result<Self> {
        if buffer.len() < 64 {
            return Err(Error::BufferTooSmall {
                size: buffer.len(),
                needed: 64,
            });
        }

        let mut cursor = Cursor::new(buffer);
        let header: AreaHeader = cursor.read_le().map_err(|_| Error::BufferTooSmall {
            size: buffer.len(),
            needed: 64,
        })?;
        if header.magic != *b"ARE " {
            return Err(Error::BadMagic {
                found: header.magic,
            });
        }

        let parser = AreaParser {
            data: buffer,
            labels: parse_labels(buffer, &header),
            header,
        };

        let mut area = Area::default();
        for field in parser.top_fields() {
            if field.type_id != TYPE_LIST {
                continue;
            }

            let mut objects = Vec::new();
            for struct_index in parser.list_indices(field.data_offset) {
                let object = parser.parse_object(struct_index);
                // entries without a template are editor leftovers
                if !object.template_res_ref.is_empty() {
                    objects.push(object);
                }
            }

            debug!(list = field.label, objects = objects.len(), "Parsed object list");

            match field.label.as_str() {
                "CreatureList" => area.creatures = objects,
                "PlaceableList" => area.placeables = objects,
                "TriggerList" => area.triggers = objects,
                "WaypointList" => area.waypoints = objects,
                "SoundList" => area.sounds = objects,
                "StoreList" => area.stores = objects,
                "ItemList" => area.items = objects,
                "StageList" => area.stages = objects,
                _ => (),
            }
        }

        Ok(area)
    }
}

fn parse_labels(data: ByteSpan, header: &AreaHeader) -> Vec<String> {
    let mut labels = Vec::new();
    let base = header.label_offset as usize;
    for i in 0..header.label_count as usize {
        let start = base + i * LABEL_ENTRY_SIZE;
        if start + LABEL_ENTRY_SIZE > data.len() {
            break;
        }
        let raw = &data[start..start + LABEL_ENTRY_SIZE];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(LABEL_ENTRY_SIZE);
        labels.push(String::from_utf8_lossy(&raw[..end]).into_owned());
    }
    labels
}

struct AreaParser<'a> {
    data: ByteSpan<'a>,
    header: AreaHeader,
    labels: Vec<String>,
}

impl AreaParser<'_> {
    fn read_u32(&self, pos: usize) -> u32 {
        if pos + 4 > self.data.len() {
            return 0;
        }
        u32::from_le_bytes(self.data[pos..pos + 4].try_into().unwrap())
    }

    fn read_f32(&self, pos: usize) -> f32 {
        f32::from_bits(self.read_u32(pos))
    }

    fn label(&self, index: u32) -> String {
        self.labels.get(index as usize).cloned().unwrap_or_default()
    }

    fn field_at(&self, field_index: u32) -> Option<FieldEntry> {
        if field_index >= self.header.field_count {
            return None;
        }
        let pos = self.header.field_offset as usize + field_index as usize * FIELD_ENTRY_SIZE;
        if pos + FIELD_ENTRY_SIZE > self.data.len() {
            return None;
        }
        Some(FieldEntry {
            label: self.label(self.read_u32(pos)),
            type_id: self.read_u32(pos + 4),
            data_offset: self.read_u32(pos + 8),
        })
    }

    fn top_fields(&self) -> Vec<FieldEntry> {
        let mut fields = Vec::new();
        let mut pos = TOP_FIELDS_OFFSET;
        for _ in 0..self.header.top_field_count {
            if pos + FIELD_ENTRY_SIZE > self.data.len() {
                break;
            }
            fields.push(FieldEntry {
                label: self.label(self.read_u32(pos)),
                type_id: self.read_u32(pos + 4),
                data_offset: self.read_u32(pos + 8),
            });
            pos += FIELD_ENTRY_SIZE;
        }
        fields
    }

    // A list value is a count followed by struct indices, stored either in
    // the dedicated list-index table or inline in the field data section.
    fn list_indices(&self, offset: u32) -> Vec<u32> {
        let base = if self.header.list_indices_offset == 0xFFFFFFFF {
            self.header.field_data_offset
        } else {
            self.header.list_indices_offset
        };

        let mut pos = base as usize + offset as usize;
        if pos + 4 > self.data.len() {
            return Vec::new();
        }
        let count = self.read_u32(pos);
        pos += 4;

        let mut indices = Vec::new();
        for _ in 0..count {
            if pos + 4 > self.data.len() {
                break;
            }
            indices.push(self.read_u32(pos));
            pos += 4;
        }
        indices
    }

    // A struct stores its field set either directly (single-field structs
    // hold a field index inline) or indirectly (an offset into the shared
    // field-index table, followed by that many consecutive indices).
    fn struct_fields(&self, struct_index: u32) -> Vec<FieldEntry> {
        if struct_index >= self.header.struct_count {
            return Vec::new();
        }
        let pos = self.header.struct_offset as usize + struct_index as usize * STRUCT_ENTRY_SIZE;
        if pos + STRUCT_ENTRY_SIZE > self.data.len() {
            return Vec::new();
        }

        let data_or_index = self.read_u32(pos + 4);
        let field_count = self.read_u32(pos + 8);

        let mut fields = Vec::new();
        if field_count == 1 {
            if let Some(field) = self.field_at(data_or_index) {
                fields.push(field);
            }
        } else if field_count > 1 {
            let mut index_pos = self.header.field_indices_offset as usize + data_or_index as usize;
            for _ in 0..field_count {
                if index_pos + 4 > self.data.len() {
                    break;
                }
                if let Some(field) = self.field_at(self.read_u32(index_pos)) {
                    fields.push(field);
                }
                index_pos += 4;
            }
        }
        fields
    }

    // A resource name is a 1-byte length followed by that many bytes.
    fn res_ref(&self, offset: u32) -> String {
        let pos = self.header.field_data_offset as usize + offset as usize;
        if pos >= self.data.len() {
            return String::new();
        }
        let length = self.data[pos] as usize;
        if pos + 1 + length > self.data.len() {
            return String::new();
        }
        String::from_utf8_lossy(&self.data[pos + 1..pos + 1 + length]).into_owned()
    }

    fn float_field(&self, offset: u32) -> f32 {
        self.read_f32(self.header.field_data_offset as usize + offset as usize)
    }

    fn parse_object(&self, struct_index: u32) -> AreaObject {
        let mut object = AreaObject {
            template_res_ref: String::new(),
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            active: true,
        };

        for field in self.struct_fields(struct_index) {
            match field.label.as_str() {
                "TemplateResRef" => object.template_res_ref = self.res_ref(field.data_offset),
                "XPosition" => object.position.x = self.float_field(field.data_offset),
                "YPosition" => object.position.y = self.float_field(field.data_offset),
                "ZPosition" => object.position.z = self.float_field(field.data_offset),
                "XOrientation" => object.orientation.x = self.float_field(field.data_offset),
                "YOrientation" => object.orientation.y = self.float_field(field.data_offset),
                "ZOrientation" => object.orientation.z = self.float_field(field.data_offset),
                "WOrientation" => object.orientation.w = self.float_field(field.data_offset),
                // small values live inline in the offset slot
                "Active" => object.active = field.data_offset != 0,
                _ => (),
            }
        }

        object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::random_bytes;

    struct Buf(Vec<u8>);

    impl Buf {
        fn u32(&mut self, v: u32) {
            self.0.extend_from_slice(&v.to_le_bytes());
        }

        fn f32(&mut self, v: f32) {
            self.0.extend_from_slice(&v.to_le_bytes());
        }

        fn bytes(&mut self, v: &[u8]) {
            self.0.extend_from_slice(v);
        }

        fn label(&mut self, name: &str) {
            let mut raw = [0u8; 16];
            raw[..name.len()].copy_from_slice(name.as_bytes());
            self.0.extend_from_slice(&raw);
        }
    }

    // A CreatureList of two objects: one through the indirect multi-field
    // path (resref, position x, active) and one through the direct
    // single-field path (resref only).
    fn build_test_are() -> Vec<u8> {
        let mut b = Buf(Vec::new());

        b.bytes(b"ARE ");
        b.bytes(b"V4.0");
        b.u32(0);
        b.u32(1); // top-level field count
        b.u32(140); // struct table
        b.u32(2);
        b.u32(164); // field table
        b.u32(3);
        b.u32(76); // label table
        b.u32(4);
        b.u32(212); // field data
        b.u32(36);
        b.u32(200); // field indices
        b.u32(12);
        b.u32(0xFFFFFFFF); // list indices stored in field data
        b.u32(0);

        // top field: CreatureList
        b.u32(3);
        b.u32(TYPE_LIST);
        b.u32(24);

        b.label("TemplateResRef");
        b.label("XPosition");
        b.label("Active");
        b.label("CreatureList");

        // struct 0: three fields through the index table
        b.bytes(b"UTC ");
        b.u32(0);
        b.u32(3);

        // struct 1: one field, index stored inline
        b.bytes(b"UTC ");
        b.u32(0);
        b.u32(1);

        // field table
        b.u32(0); // TemplateResRef
        b.u32(11);
        b.u32(0);

        b.u32(1); // XPosition
        b.u32(8);
        b.u32(16);

        b.u32(2); // Active, value inline
        b.u32(0);
        b.u32(1);

        // field indices
        b.u32(0);
        b.u32(1);
        b.u32(2);

        // field data
        b.bytes(&[5]); // resref at +0
        b.bytes(b"gobbo");
        b.bytes(&[0; 10]); // pad to +16
        b.f32(7.5); // XPosition at +16
        b.u32(0); // pad to +24
        b.u32(2); // list at +24: two struct indices
        b.u32(0);
        b.u32(1);

        b.0
    }

    #[test]
    fn parses_creature_list() {
        let buffer = build_test_are();
        let area = Area::from_existing(&buffer).unwrap();

        assert_eq!(area.creatures.len(), 2);

        let first = &area.creatures[0];
        assert_eq!(first.template_res_ref, "gobbo");
        assert_eq!(first.position, Vec3::new(7.5, 0.0, 0.0));
        assert!(first.active);

        // the single-field struct only carries its template
        let second = &area.creatures[1];
        assert_eq!(second.template_res_ref, "gobbo");
        assert_eq!(second.position, Vec3::ZERO);

        assert!(area.placeables.is_empty());
    }

    #[test]
    fn too_small_is_rejected() {
        let result = Area::from_existing(&[0u8; 63]);
        assert_eq!(
            result.err(),
            Some(Error::BufferTooSmall {
                size: 63,
                needed: 64
            })
        );
    }

    #[test]
    fn invalid_data_wont_load() {
        assert!(Area::from_existing(&random_bytes()).is_err());
    }
}
