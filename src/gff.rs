// SPDX-FileCopyrightText: 2025 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::Cursor;

use binrw::binread;
use binrw::BinReaderExt;
use binrw::Endian;
use bitflags::bitflags;

use crate::common::Platform;
use crate::labels::LabelRegistry;
use crate::ByteBuffer;
use crate::ByteSpan;
use crate::EndianReader;
use crate::{Error, Result};

/// Fixed prologue size shared by every GFF variant.
const HEADER_SIZE: usize = 28;

/// In GFF V4.1 the header grows to hold the shared string table location.
const HEADER_SIZE_V41: usize = 36;

/// Size of one entry in the struct table.
const STRUCT_ENTRY_SIZE: usize = 16;

/// Size of one entry in a struct's field table.
const FIELD_ENTRY_SIZE: usize = 12;

/// Recursion cap for [Gff::walk], corrupt files can declare cyclic struct types.
const MAX_WALK_DEPTH: u32 = 64;

#[binread]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GffHeader {
    pub magic: [u8; 4],
    pub version: [u8; 4],
    pub platform: [u8; 4],
    pub file_type: [u8; 4],
    pub file_version: [u8; 4],
    pub struct_count: u32,
    // V4.1 inserts a shared string table between the tables and the data section.
    #[br(if(version >= *b"V4.1"))]
    pub string_count: Option<u32>,
    #[br(if(version >= *b"V4.1"))]
    pub string_offset: Option<u32>,
    pub data_offset: u32,
}

#[binread]
#[derive(Debug, Clone, PartialEq, Eq)]
struct StructEntry {
    struct_type: [u8; 4],
    field_count: u32,
    field_offset: u32,
    struct_size: u32,
}

bitflags! {
    /// How a field's value is stored. The bits are orthogonal and combine,
    /// most importantly in [Gff::read_struct_list].
    pub struct FieldFlags: u16 {
        const LIST = 0x8000;
        const STRUCT = 0x4000;
        const REFERENCE = 0x2000;
    }
}

/// One field declared by a struct. `data_offset` is relative to the data
/// section plus whatever base offset the containing struct instance has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GffField {
    pub label: u32,
    pub type_id: u16,
    pub flags: FieldFlags,
    pub data_offset: u32,
}

/// A struct declaration plus its parsed field table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GffStruct {
    pub struct_type: [u8; 4],
    pub field_count: u32,
    pub field_offset: u32,
    /// Stride in bytes when instances of this struct repeat inline in a list.
    pub struct_size: u32,
    pub fields: Vec<GffField>,
}

/// One instance of a struct: its index in the struct table plus the base
/// offset to add when resolving that instance's own fields.
///
/// `(0, 0)` conventionally means "absent", struct 0 is the document root and
/// never a valid sub-reference target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StructRef {
    pub struct_index: u32,
    pub offset: u32,
}

/// One record produced by [Gff::walk].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Dotted path from the root, list elements as `Path[i]`.
    pub path: String,
    pub label: String,
    pub type_name: String,
    pub value: String,
    pub depth: u32,
    pub is_complex: bool,
}

/// A parsed generic container (GFF) document.
///
/// The struct and field tables are self-describing data, discovered at parse
/// time. Once loaded, per-field reads never fail: anything missing, out of
/// bounds or mistyped resolves to a documented zero/empty default so a caller
/// can walk a half-corrupt capture end to end.
pub struct Gff {
    pub header: GffHeader,
    pub structs: Vec<GffStruct>,
    data: ByteBuffer,
    endian: Endian,
    string_cache: Vec<String>,
}

impl Gff {
    /// Parses a GFF document out of `buffer`.
    ///
    /// Only header or struct-table corruption is fatal; a truncated field
    /// table is parsed as far as it goes.
    pub fn from_existing(platform: Platform, buffer: ByteSpan) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                size: buffer.len(),
                needed: HEADER_SIZE,
            });
        }

        if &buffer[0..4] != b"GFF " {
            return Err(Error::BadMagic {
                found: buffer[0..4].try_into().unwrap(),
            });
        }

        let endian = platform.endianness();
        let mut cursor = Cursor::new(buffer);
        let header: GffHeader =
            cursor
                .read_type(endian)
                .map_err(|_| Error::BufferTooSmall {
                    size: buffer.len(),
                    needed: HEADER_SIZE_V41,
                })?;

        let struct_base = if header.string_count.is_some() {
            HEADER_SIZE_V41
        } else {
            HEADER_SIZE
        };

        let table_end = struct_base
            .saturating_add((header.struct_count as usize).saturating_mul(STRUCT_ENTRY_SIZE));
        if table_end > buffer.len() {
            return Err(Error::BufferTooSmall {
                size: buffer.len(),
                needed: table_end,
            });
        }

        cursor.set_position(struct_base as u64);

        let mut structs = Vec::with_capacity(header.struct_count as usize);
        for _ in 0..header.struct_count {
            let entry: StructEntry =
                cursor
                    .read_type(endian)
                    .map_err(|_| Error::BufferTooSmall {
                        size: buffer.len(),
                        needed: table_end,
                    })?;
            structs.push(GffStruct {
                struct_type: entry.struct_type,
                field_count: entry.field_count,
                field_offset: entry.field_offset,
                struct_size: entry.struct_size,
                fields: Vec::new(),
            });
        }

        let reader = EndianReader::new(buffer, endian);
        for st in &mut structs {
            let mut pos = st.field_offset as usize;
            for _ in 0..st.field_count {
                // tolerate a truncated field table, keeping what parsed
                if pos + FIELD_ENTRY_SIZE > buffer.len() {
                    break;
                }
                st.fields.push(GffField {
                    label: reader.read_u32(pos),
                    type_id: reader.read_u16(pos + 4),
                    flags: FieldFlags::from_bits_truncate(reader.read_u16(pos + 6)),
                    data_offset: reader.read_u32(pos + 8),
                });
                pos += FIELD_ENTRY_SIZE;
            }
        }

        let string_cache = Self::parse_string_cache(&header, buffer);

        Ok(Self {
            header,
            structs,
            data: buffer.to_vec(),
            endian,
            string_cache,
        })
    }

    // V4.1 keeps one flat run of NUL-terminated strings between the string
    // offset and the data section; wide string fields index into it.
    fn parse_string_cache(header: &GffHeader, buffer: ByteSpan) -> Vec<String> {
        let (Some(count), Some(offset)) = (header.string_count, header.string_offset) else {
            return Vec::new();
        };

        let start = offset as usize;
        let end = header.data_offset as usize;
        if end <= start || end > buffer.len() {
            return Vec::new();
        }

        let mut cache = Vec::new();
        let mut current = Vec::new();
        for &b in &buffer[start..end] {
            if b == 0 {
                cache.push(String::from_utf8_lossy(&current).into_owned());
                current.clear();
                if cache.len() >= count as usize {
                    break;
                }
            } else {
                current.push(b);
            }
        }

        cache
    }

    /// A forgiving reader over the raw document bytes.
    pub fn reader(&self) -> EndianReader<'_> {
        EndianReader::new(&self.data, self.endian)
    }

    /// The raw bytes the document was loaded from.
    pub fn raw_data(&self) -> ByteSpan<'_> {
        &self.data
    }

    /// Whether the document is a model hierarchy file.
    pub fn is_mmh(&self) -> bool {
        self.header.file_type == *b"MHM "
    }

    /// Whether the document is a mesh data file.
    pub fn is_msh(&self) -> bool {
        self.header.file_type == *b"MESH"
    }

    /// Finds the first struct whose 4-character type tag matches one of `tags`.
    pub fn find_struct(&self, tags: &[&[u8; 4]]) -> Option<u32> {
        self.structs
            .iter()
            .position(|st| tags.iter().any(|tag| st.struct_type == **tag))
            .map(|i| i as u32)
    }

    /// Linear scan for a label in a struct's field table, first match wins.
    pub fn find_field(&self, struct_index: u32, label: u32) -> Option<&GffField> {
        self.structs
            .get(struct_index as usize)?
            .fields
            .iter()
            .find(|field| field.label == label)
    }

    fn field_position(&self, field: &GffField, base_offset: u32) -> usize {
        self.header
            .data_offset
            .wrapping_add(field.data_offset)
            .wrapping_add(base_offset) as usize
    }

    // Data-section offsets come straight from file bytes and can be huge on
    // corrupt input; widened before the add so they land out of bounds
    // instead of overflowing.
    pub(crate) fn data_position(&self, offset: u32) -> usize {
        usize::try_from(self.header.data_offset as u64 + offset as u64).unwrap_or(usize::MAX)
    }

    /// Reads an `i32` field. The declared type-id is not checked, the bytes
    /// at the field's position are reinterpreted as-is.
    pub fn read_i32_by_label(&self, struct_index: u32, label: u32, base_offset: u32) -> i32 {
        match self.find_field(struct_index, label) {
            Some(field) => self.reader().read_i32(self.field_position(field, base_offset)),
            None => 0,
        }
    }

    /// Reads a `u32` field. The declared type-id is not checked.
    pub fn read_u32_by_label(&self, struct_index: u32, label: u32, base_offset: u32) -> u32 {
        match self.find_field(struct_index, label) {
            Some(field) => self.reader().read_u32(self.field_position(field, base_offset)),
            None => 0,
        }
    }

    /// Reads an `f32` field. The declared type-id is not checked.
    pub fn read_f32_by_label(&self, struct_index: u32, label: u32, base_offset: u32) -> f32 {
        match self.find_field(struct_index, label) {
            Some(field) => self.reader().read_f32(self.field_position(field, base_offset)),
            None => 0.0,
        }
    }

    /// Reads a string field. Unlike the numeric readers, the type-id is
    /// checked: only the byte string (10, 11) and wide string (14) types are
    /// accepted, anything else returns an empty string.
    pub fn read_string_by_label(&self, struct_index: u32, label: u32, base_offset: u32) -> String {
        let Some(field) = self.find_field(struct_index, label) else {
            return String::new();
        };
        if field.type_id != 10 && field.type_id != 11 && field.type_id != 14 {
            return String::new();
        }

        let reader = self.reader();
        let address = reader.read_u32(self.field_position(field, base_offset));
        if address == 0xFFFFFFFF {
            return String::new();
        }

        if field.type_id == 14 && !self.string_cache.is_empty() {
            return self
                .string_cache
                .get(address as usize)
                .cloned()
                .unwrap_or_default();
        }

        let str_pos = self.data_position(address);
        if field.type_id == 14 {
            self.read_wide_string(str_pos)
        } else {
            self.read_byte_string(str_pos)
        }
    }

    // Length-prefixed, one byte per character; embedded NULs are filtered
    // rather than treated as terminators.
    fn read_byte_string(&self, pos: usize) -> String {
        let reader = self.reader();
        if !reader.in_bounds(pos, 4) {
            return String::new();
        }
        let length = reader.read_u32(pos) as usize;
        let bytes: Vec<u8> = reader
            .read_bytes(pos + 4, length.min(reader.len().saturating_sub(pos + 4)))
            .iter()
            .copied()
            .filter(|&b| b != 0)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    // Length-prefixed UTF-16LE code units, NUL units dropped.
    pub(crate) fn read_wide_string(&self, pos: usize) -> String {
        let reader = self.reader();
        if !reader.in_bounds(pos, 4) {
            return String::new();
        }
        let length = reader.read_u32(pos) as usize;

        let mut result = String::new();
        let mut unit_pos = pos + 4;
        for _ in 0..length {
            if !reader.in_bounds(unit_pos, 2) {
                break;
            }
            let unit = reader.read_u16(unit_pos);
            unit_pos += 2;
            if unit == 0 {
                continue;
            }
            result.push(char::from_u32(unit as u32).unwrap_or(char::REPLACEMENT_CHARACTER));
        }
        result
    }

    // A localized string record: 12-byte header of discriminant, signed
    // string-table reference and translation count. A nonzero count means an
    // embedded string follows and is preferred over the reference.
    fn read_loc_string(&self, pos: usize) -> String {
        let reader = self.reader();
        if !reader.in_bounds(pos, 12) {
            return String::new();
        }
        let str_ref = reader.read_i32(pos + 4);
        let count = reader.read_u32(pos + 8);

        if count > 0 {
            let current = pos + 12;
            if reader.in_bounds(current, 8) {
                let length = reader.read_u32(current + 4) as usize;
                if reader.in_bounds(current + 8, length) {
                    let bytes: Vec<u8> = reader
                        .read_bytes(current + 8, length)
                        .iter()
                        .copied()
                        .filter(|&b| b != 0)
                        .collect();
                    return String::from_utf8_lossy(&bytes).into_owned();
                }
            }
        }

        if str_ref != -1 {
            return format!("StrRef:{str_ref}");
        }
        String::new()
    }

    /// Resolves a non-list reference field to the struct instance it points
    /// at. Returns the `(0, 0)` sentinel when the field is missing or its
    /// flags are not a plain reference.
    pub fn read_struct_ref(&self, struct_index: u32, label: u32, base_offset: u32) -> StructRef {
        let Some(field) = self.find_field(struct_index, label) else {
            return StructRef::default();
        };

        if !field.flags.contains(FieldFlags::REFERENCE) || field.flags.contains(FieldFlags::LIST) {
            return StructRef::default();
        }

        let reader = self.reader();
        let pos = self.field_position(field, base_offset);
        StructRef {
            struct_index: reader.read_u16(pos) as u32,
            offset: reader.read_u32(pos + 4),
        }
    }

    /// Expands a list field into one [StructRef] per element.
    ///
    /// Three layouts exist, selected by the flag combination:
    /// LIST+STRUCT stores elements inline with the element struct's size as
    /// stride; LIST+STRUCT+REFERENCE stores one 4-byte offset per element;
    /// LIST+REFERENCE stores 8-byte entries of struct index plus offset.
    /// A negative list offset, an unknown flag combination or an out-of-range
    /// element struct index all yield an empty list.
    pub fn read_struct_list(&self, struct_index: u32, label: u32, base_offset: u32) -> Vec<StructRef> {
        let Some(field) = self.find_field(struct_index, label) else {
            return Vec::new();
        };

        let is_list = field.flags.contains(FieldFlags::LIST);
        let is_struct = field.flags.contains(FieldFlags::STRUCT);
        let is_ref = field.flags.contains(FieldFlags::REFERENCE);

        let reader = self.reader();
        let data_pos = self.field_position(field, base_offset);
        let list_ref = reader.read_i32(data_pos);
        if list_ref < 0 {
            return Vec::new();
        }

        let mut list_pos = self.data_position(list_ref as u32);
        if !reader.in_bounds(list_pos, 4) {
            return Vec::new();
        }
        let count = reader.read_u32(list_pos);
        list_pos += 4;

        let mut result = Vec::new();
        if is_list && is_struct && !is_ref {
            let Some(element) = self.structs.get(field.type_id as usize) else {
                return Vec::new();
            };
            let stride = element.struct_size;
            let mut item_offset = list_ref as u32 + 4;
            for _ in 0..count {
                if self.data_position(item_offset) >= reader.len() {
                    break;
                }
                result.push(StructRef {
                    struct_index: field.type_id as u32,
                    offset: item_offset,
                });
                item_offset = match item_offset.checked_add(stride) {
                    Some(next) => next,
                    None => break,
                };
            }
        } else if is_list && is_struct && is_ref {
            for _ in 0..count {
                if !reader.in_bounds(list_pos, 4) {
                    break;
                }
                result.push(StructRef {
                    struct_index: field.type_id as u32,
                    offset: reader.read_u32(list_pos),
                });
                list_pos += 4;
            }
        } else if is_list && is_ref && !is_struct {
            for _ in 0..count {
                if !reader.in_bounds(list_pos, 8) {
                    break;
                }
                result.push(StructRef {
                    struct_index: reader.read_u16(list_pos) as u32,
                    offset: reader.read_u32(list_pos + 4),
                });
                list_pos += 8;
            }
        }

        result
    }

    /// For a list field of primitive elements, returns the element count and
    /// the absolute position of the first element's bytes.
    pub fn primitive_list_info(
        &self,
        struct_index: u32,
        label: u32,
        base_offset: u32,
    ) -> Option<(u32, usize)> {
        let field = self.find_field(struct_index, label)?;
        if !field.flags.contains(FieldFlags::LIST) {
            return None;
        }

        let reader = self.reader();
        let data_pos = self.field_position(field, base_offset);
        if !reader.in_bounds(data_pos, 4) {
            return None;
        }
        let list_ref = reader.read_i32(data_pos);
        if list_ref < 0 {
            return None;
        }

        let list_pos = self.data_position(list_ref as u32);
        if !reader.in_bounds(list_pos, 4) {
            return None;
        }
        Some((reader.read_u32(list_pos), list_pos + 4))
    }

    /// Renders a leaf field's value to text for inspection. Flags take
    /// precedence over the type-id: lists, structs and wide references render
    /// as placeholders rather than chasing data.
    pub fn display_value(&self, field: &GffField, base_offset: u32) -> String {
        if field.flags.contains(FieldFlags::LIST) {
            return "(List)".to_string();
        }
        if field.flags.contains(FieldFlags::STRUCT) {
            return "(Struct)".to_string();
        }
        if field.flags.contains(FieldFlags::REFERENCE) && field.type_id > 17 {
            return "(Reference)".to_string();
        }

        let reader = self.reader();
        let mut data_pos = self.field_position(field, base_offset);

        if field.flags.contains(FieldFlags::REFERENCE) && field.type_id != 14 {
            let ptr = reader.read_u32(data_pos);
            if ptr == 0xFFFFFFFF {
                return "null".to_string();
            }
            data_pos = self.data_position(ptr);
        }

        match field.type_id {
            0 => reader.read_u8(data_pos).to_string(),
            1 => reader.read_i8(data_pos).to_string(),
            2 => reader.read_u16(data_pos).to_string(),
            3 => reader.read_i16(data_pos).to_string(),
            4 => reader.read_u32(data_pos).to_string(),
            5 => reader.read_i32(data_pos).to_string(),
            6 => reader.read_u64(data_pos).to_string(),
            7 => reader.read_i64(data_pos).to_string(),
            8 => reader.read_f32(data_pos).to_string(),
            9 => reader.read_f64(data_pos).to_string(),
            10 | 11 => {
                let rel_offset = reader.read_i32(data_pos);
                if rel_offset < 0 {
                    return String::new();
                }
                self.read_byte_string(self.data_position(rel_offset as u32))
            }
            12 => {
                let rel_offset = reader.read_i32(data_pos);
                if rel_offset < 0 {
                    return String::new();
                }
                self.read_loc_string(self.data_position(rel_offset as u32))
            }
            13 => "(Binary)".to_string(),
            14 => {
                let address = reader.read_u32(data_pos);
                if address == 0xFFFFFFFF {
                    return String::new();
                }
                if !self.string_cache.is_empty() {
                    return self
                        .string_cache
                        .get(address as usize)
                        .cloned()
                        .unwrap_or_default();
                }
                self.read_wide_string(self.data_position(address))
            }
            17 => {
                // talk table reference: numeric id plus an optional inline string
                let tlk_id = reader.read_u32(data_pos);
                let address = reader.read_u32(data_pos + 4);
                let mut text = String::new();
                if address != 0xFFFFFFFF && (address != 0 || !self.string_cache.is_empty()) {
                    if !self.string_cache.is_empty() {
                        text = self
                            .string_cache
                            .get(address as usize)
                            .cloned()
                            .unwrap_or_default();
                    } else {
                        text = self.read_wide_string(self.data_position(address));
                    }
                }
                if text.is_empty() {
                    tlk_id.to_string()
                } else {
                    format!("{tlk_id}, {text}")
                }
            }
            _ => "???".to_string(),
        }
    }

    fn type_name(field: &GffField) -> String {
        if field.flags.contains(FieldFlags::LIST) {
            return "List".to_string();
        }
        if field.flags.contains(FieldFlags::STRUCT) {
            return "Struct".to_string();
        }
        if field.flags.contains(FieldFlags::REFERENCE) && field.type_id > 17 {
            return "Reference".to_string();
        }
        match field.type_id {
            0 => "BYTE".to_string(),
            4 => "DWORD".to_string(),
            5 => "INT".to_string(),
            8 => "FLOAT".to_string(),
            10 => "STRING".to_string(),
            11 => "RESREF".to_string(),
            other => format!("Type_{other}"),
        }
    }

    /// Depth-first traversal from the root struct, producing one record per
    /// field of every reachable struct instance in encounter order.
    ///
    /// Struct-typed fields recurse into the nested struct at the same base
    /// offset; list fields recurse into every element at the element's own
    /// base offset, with a synthetic index record per element. The traversal
    /// never mutates the document, so repeated walks yield identical output.
    pub fn walk(&self, labels: &LabelRegistry) -> Vec<WalkEntry> {
        enum Task {
            Emit(WalkEntry),
            Visit {
                struct_index: u32,
                base_offset: u32,
                path: String,
                depth: u32,
            },
        }

        let mut out = Vec::new();
        if self.structs.is_empty() {
            return out;
        }

        let mut stack = vec![Task::Visit {
            struct_index: 0,
            base_offset: 0,
            path: String::new(),
            depth: 0,
        }];

        while let Some(task) = stack.pop() {
            let (struct_index, base_offset, path, depth) = match task {
                Task::Emit(entry) => {
                    out.push(entry);
                    continue;
                }
                Task::Visit {
                    struct_index,
                    base_offset,
                    path,
                    depth,
                } => (struct_index, base_offset, path, depth),
            };

            let Some(st) = self.structs.get(struct_index as usize) else {
                continue;
            };

            let mut pending = Vec::new();
            for field in &st.fields {
                let label = labels.lookup(field.label);
                let field_path = if path.is_empty() {
                    label.clone()
                } else {
                    format!("{path}.{label}")
                };

                let is_complex = field.flags
                    .intersects(FieldFlags::LIST | FieldFlags::STRUCT)
                    || (field.flags.contains(FieldFlags::REFERENCE) && field.type_id > 17);

                pending.push(Task::Emit(WalkEntry {
                    path: field_path.clone(),
                    label,
                    type_name: Self::type_name(field),
                    value: self.display_value(field, base_offset),
                    depth,
                    is_complex,
                }));

                if depth >= MAX_WALK_DEPTH {
                    continue;
                }

                if field.flags.contains(FieldFlags::STRUCT)
                    && !field.flags.contains(FieldFlags::LIST)
                    && !field.flags.contains(FieldFlags::REFERENCE)
                {
                    pending.push(Task::Visit {
                        struct_index: field.type_id as u32,
                        base_offset,
                        path: field_path,
                        depth: depth + 1,
                    });
                } else if field.flags.contains(FieldFlags::LIST) {
                    for (k, element) in self
                        .read_struct_list(struct_index, field.label, base_offset)
                        .iter()
                        .enumerate()
                    {
                        let element_path = format!("{field_path}[{k}]");
                        pending.push(Task::Emit(WalkEntry {
                            path: element_path.clone(),
                            label: k.to_string(),
                            type_name: "Struct".to_string(),
                            value: String::new(),
                            depth: depth + 1,
                            is_complex: true,
                        }));
                        pending.push(Task::Visit {
                            struct_index: element.struct_index,
                            base_offset: element.offset,
                            path: element_path,
                            depth: depth + 2,
                        });
                    }
                }
            }

            for task in pending.into_iter().rev() {
                stack.push(task);
            }
        }

        out
    }
}
