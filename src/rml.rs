// SPDX-FileCopyrightText: 2025 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use glam::{Quat, Vec3};

use crate::common::Platform;
use crate::gff::Gff;
use crate::ByteSpan;
use crate::Result;

// Room layout field labels, stored numerically rather than hashed.
const LABEL_POSITION: u32 = 4;
const LABEL_ORIENTATION: u32 = 5;
const LABEL_ENV_ROOM_MODEL_LIST: u32 = 3050;
const LABEL_ENV_MODEL_SCALE: u32 = 3059;
const LABEL_ENV_MODEL_ID: u32 = 3061;
const LABEL_ENV_MODEL_NAME: u32 = 3062;
const LABEL_ENV_MODEL_FILE: u32 = 3063;
const LABEL_ENV_ROOM_SPT_LIST: u32 = 0xd1a;
const LABEL_SPT_SCALE: u32 = 0xd1c;
const LABEL_SPT_TREE_ID: u32 = 0xd1d;

// Vector and quaternion type-ids as room layouts declare them.
const TYPE_VECTOR3: u16 = 10;
const TYPE_QUATERNION: u16 = 13;

/// One placed prop model in a room.
#[derive(Debug, Clone, PartialEq)]
pub struct PropInstance {
    pub model_name: String,
    pub model_file: String,
    pub position: Vec3,
    pub orientation: Quat,
    pub scale: f32,
    pub model_id: i32,
}

/// One placed SpeedTree instance in a room.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedTreeInstance {
    pub position: Vec3,
    pub orientation: Quat,
    pub tree_id: i32,
    pub scale: f32,
}

/// The placement data of a room model layout (RML) file.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomLayout {
    pub room_position: Vec3,
    pub props: Vec<PropInstance>,
    pub speed_trees: Vec<SpeedTreeInstance>,
}

impl RoomLayout {
    /// Parses a room layout out of `buffer`.
    pub fn from_existing(platform: Platform, buffer: ByteSpan) -> Result<Self> {
        let gff = Gff::from_existing(platform, buffer)?;

        let room_position = read_vec3(&gff, 0, LABEL_POSITION, 0).unwrap_or(Vec3::ZERO);

        let mut props = Vec::new();
        for model in gff.read_struct_list(0, LABEL_ENV_ROOM_MODEL_LIST, 0) {
            let prop = PropInstance {
                model_name: gff.read_string_by_label(
                    model.struct_index,
                    LABEL_ENV_MODEL_NAME,
                    model.offset,
                ),
                model_file: gff.read_string_by_label(
                    model.struct_index,
                    LABEL_ENV_MODEL_FILE,
                    model.offset,
                ),
                position: read_vec3(&gff, model.struct_index, LABEL_POSITION, model.offset)
                    .unwrap_or(Vec3::ZERO),
                orientation: read_quat(&gff, model.struct_index, LABEL_ORIENTATION, model.offset)
                    .unwrap_or(Quat::IDENTITY),
                scale: read_typed_f32(&gff, model.struct_index, LABEL_ENV_MODEL_SCALE, model.offset)
                    .unwrap_or(1.0),
                model_id: read_typed_i32(&gff, model.struct_index, LABEL_ENV_MODEL_ID, model.offset)
                    .unwrap_or(-1),
            };

            // entries with no model at all are placement junk
            if !prop.model_name.is_empty() || !prop.model_file.is_empty() {
                props.push(prop);
            }
        }

        let mut speed_trees = Vec::new();
        for spt in gff.read_struct_list(0, LABEL_ENV_ROOM_SPT_LIST, 0) {
            speed_trees.push(SpeedTreeInstance {
                position: read_vec3(&gff, spt.struct_index, LABEL_POSITION, spt.offset)
                    .unwrap_or(Vec3::ZERO),
                orientation: read_quat(&gff, spt.struct_index, LABEL_ORIENTATION, spt.offset)
                    .unwrap_or(Quat::IDENTITY),
                tree_id: read_typed_i32(&gff, spt.struct_index, LABEL_SPT_TREE_ID, spt.offset)
                    .unwrap_or(-1),
                scale: read_typed_f32(&gff, spt.struct_index, LABEL_SPT_SCALE, spt.offset)
                    .unwrap_or(1.0),
            });
        }

        Ok(Self {
            room_position,
            props,
            speed_trees,
        })
    }
}

fn read_vec3(gff: &Gff, struct_index: u32, label: u32, base_offset: u32) -> Option<Vec3> {
    let field = gff.find_field(struct_index, label)?;
    if field.type_id != TYPE_VECTOR3 {
        return None;
    }

    let reader = gff.reader();
    let pos = gff.data_position(field.data_offset.checked_add(base_offset)?);
    Some(Vec3::new(
        reader.read_f32(pos),
        reader.read_f32(pos + 4),
        reader.read_f32(pos + 8),
    ))
}

fn read_quat(gff: &Gff, struct_index: u32, label: u32, base_offset: u32) -> Option<Quat> {
    let field = gff.find_field(struct_index, label)?;
    if field.type_id != TYPE_QUATERNION {
        return None;
    }

    let reader = gff.reader();
    let pos = gff.data_position(field.data_offset.checked_add(base_offset)?);
    Some(Quat::from_xyzw(
        reader.read_f32(pos),
        reader.read_f32(pos + 4),
        reader.read_f32(pos + 8),
        reader.read_f32(pos + 12),
    ))
}

fn read_typed_f32(gff: &Gff, struct_index: u32, label: u32, base_offset: u32) -> Option<f32> {
    let field = gff.find_field(struct_index, label)?;
    if field.type_id != 8 {
        return None;
    }
    Some(gff.read_f32_by_label(struct_index, label, base_offset))
}

fn read_typed_i32(gff: &Gff, struct_index: u32, label: u32, base_offset: u32) -> Option<i32> {
    let field = gff.find_field(struct_index, label)?;
    if field.type_id != 5 {
        return None;
    }
    Some(gff.read_i32_by_label(struct_index, label, base_offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::random_bytes;

    struct Buf(Vec<u8>);

    impl Buf {
        fn u16(&mut self, v: u16) {
            self.0.extend_from_slice(&v.to_le_bytes());
        }

        fn u32(&mut self, v: u32) {
            self.0.extend_from_slice(&v.to_le_bytes());
        }

        fn i32(&mut self, v: i32) {
            self.0.extend_from_slice(&v.to_le_bytes());
        }

        fn f32(&mut self, v: f32) {
            self.0.extend_from_slice(&v.to_le_bytes());
        }

        fn bytes(&mut self, v: &[u8]) {
            self.0.extend_from_slice(v);
        }
    }

    // A room at (1,2,3) with one placed prop model named "chair".
    fn build_test_rml() -> Vec<u8> {
        let mut b = Buf(Vec::new());

        b.bytes(b"GFF ");
        b.bytes(b"V4.0");
        b.bytes(b"PC  ");
        b.bytes(b"RML ");
        b.bytes(b"V4.0");
        b.u32(2);
        b.u32(156); // data offset

        b.bytes(b"RML ");
        b.u32(2);
        b.u32(60);
        b.u32(16);

        b.bytes(b"PROP");
        b.u32(6);
        b.u32(84);
        b.u32(48);

        // root fields
        b.u32(LABEL_POSITION);
        b.u16(TYPE_VECTOR3);
        b.u16(0);
        b.u32(0);

        b.u32(LABEL_ENV_ROOM_MODEL_LIST);
        b.u16(1); // PROP struct index
        b.u16(0xC000); // LIST | STRUCT
        b.u32(12);

        // PROP fields
        b.u32(LABEL_POSITION);
        b.u16(TYPE_VECTOR3);
        b.u16(0);
        b.u32(0);

        b.u32(LABEL_ORIENTATION);
        b.u16(TYPE_QUATERNION);
        b.u16(0);
        b.u32(12);

        b.u32(LABEL_ENV_MODEL_SCALE);
        b.u16(8);
        b.u16(0);
        b.u32(28);

        b.u32(LABEL_ENV_MODEL_ID);
        b.u16(5);
        b.u16(0);
        b.u32(32);

        b.u32(LABEL_ENV_MODEL_NAME);
        b.u16(10);
        b.u16(0);
        b.u32(36);

        b.u32(LABEL_ENV_MODEL_FILE);
        b.u16(10);
        b.u16(0);
        b.u32(40);

        // data section, offsets relative to 156
        b.f32(1.0); // room position
        b.f32(2.0);
        b.f32(3.0);
        b.i32(16); // model list at +16
        b.u32(1); // one prop, inline at +20

        b.f32(4.0); // prop position
        b.f32(5.0);
        b.f32(6.0);
        b.f32(0.0); // orientation
        b.f32(0.0);
        b.f32(0.0);
        b.f32(1.0);
        b.f32(2.0); // scale
        b.i32(77); // model id
        b.u32(72); // model name string at +72
        b.u32(0xFFFFFFFF); // no model file
        b.u32(0); // struct padding

        b.u32(0); // pad up to +72
        b.u32(5);
        b.bytes(b"chair");

        b.0
    }

    #[test]
    fn parses_room_and_props() {
        let buffer = build_test_rml();
        let layout = RoomLayout::from_existing(Platform::Win32, &buffer).unwrap();

        assert_eq!(layout.room_position, Vec3::new(1.0, 2.0, 3.0));
        assert!(layout.speed_trees.is_empty());

        assert_eq!(layout.props.len(), 1);
        let prop = &layout.props[0];
        assert_eq!(prop.model_name, "chair");
        assert_eq!(prop.model_file, "");
        assert_eq!(prop.position, Vec3::new(4.0, 5.0, 6.0));
        assert_eq!(prop.orientation, Quat::IDENTITY);
        assert_eq!(prop.scale, 2.0);
        assert_eq!(prop.model_id, 77);
    }

    #[test]
    fn invalid_data_wont_load() {
        assert!(RoomLayout::from_existing(Platform::Win32, &random_bytes()).is_err());
    }
}
