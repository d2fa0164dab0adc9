// SPDX-FileCopyrightText: 2025 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use tracing::debug;

use crate::common::Platform;
use crate::crc::hash_column_name;
use crate::gff::{FieldFlags, Gff};
use crate::ByteBuffer;
use crate::ByteSpan;
use crate::{Error, Result};

/// Cell text used by the game's own tools to mean "unset".
pub const UNSET_CELL: &str = "****";

/// Column names seen across the shipped 2DA tables. Column labels are stored
/// hashed, so names have to be recovered from a known list.
const KNOWN_COLUMNS: [&str; 26] = [
    "ID",
    "LABEL",
    "MODELTYPE",
    "MODELSUBTYPE",
    "MODELVARIATION",
    "ICONNAME",
    "DEFAULTMATERIAL",
    "NAME",
    "DESCRIPTION",
    "RESREF",
    "TAG",
    "ENABLED",
    "STRINGID",
    "COST",
    "VALUE",
    "COMMENT",
    "SCRIPT",
    "MODEL",
    "TEXTURE",
    "MATERIAL",
    "APPEARANCE",
    "NAMESTRINGID",
    "DESCSTRINGID",
    "PREFIX",
    "PACKAGE",
    "PARENTFOLDER",
];

fn column_name(hash: u32) -> String {
    for name in KNOWN_COLUMNS {
        if hash_column_name(name) == hash {
            return name.to_string();
        }
    }
    format!("COL_{hash}")
}

/// Semantic type of a column, derived from the GFF type-id of its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    String,
    /// A resource name, stored like a string.
    Resource,
}

impl ColumnType {
    fn from_type_id(type_id: u16) -> Self {
        match type_id {
            5 => ColumnType::Int,
            8 => ColumnType::Float,
            10 | 11 => ColumnType::String,
            12 => ColumnType::Resource,
            _ => ColumnType::Int,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub hash: u32,
    pub ty: ColumnType,
    /// Byte offset of this column's value within a row record.
    pub offset: u32,
    pub flags: FieldFlags,
}

/// One typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    String(String),
}

impl Value {
    /// Renders the value as the editor shows it.
    pub fn to_display(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::String(v) => v.clone(),
        }
    }
}

/// One row: its identity plus one value per public column.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: i32,
    pub values: Vec<Value>,
}

/// A 2DA-style table stored in a GFF container.
///
/// Columns come from the fields of the struct tagged `COLM`, rows from the
/// root struct's list field with the stride of the struct tagged `ROWS`. A
/// column literally named `ID` becomes each row's identity and is removed
/// from the public column list.
///
/// Row edits made through the mutation methods live in memory only; saving
/// writes back the pristine source buffer.
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Row>,
    data: ByteBuffer,
    modified: bool,
}

impl Table {
    /// Parses a table. Fails when the underlying container fails to load or
    /// when no `COLM` struct is present; a missing `ROWS` struct degrades to
    /// a table with columns but zero rows.
    pub fn from_existing(platform: Platform, buffer: ByteSpan) -> Result<Self> {
        let gff = Gff::from_existing(platform, buffer)?;

        let colm_index = gff
            .find_struct(&[b"COLM", b"colm"])
            .ok_or(Error::MissingStruct { tag: "COLM" })?;
        let rows_index = gff.find_struct(&[b"ROWS", b"rows"]);

        let mut columns: Vec<Column> = gff.structs[colm_index as usize]
            .fields
            .iter()
            .map(|field| Column {
                name: column_name(field.label),
                hash: field.label,
                ty: ColumnType::from_type_id(field.type_id),
                offset: field.data_offset,
                flags: field.flags,
            })
            .collect();

        let mut rows = Vec::new();
        if let Some(rows_index) = rows_index {
            rows = Self::parse_rows(&gff, rows_index, &columns);
        }

        // ID is the row identity, not a value
        if let Some(id_index) = columns.iter().position(|c| c.name.eq_ignore_ascii_case("ID")) {
            columns.remove(id_index);
            for row in &mut rows {
                if id_index < row.values.len() {
                    if let Value::Int(id) = row.values.remove(id_index) {
                        row.id = id;
                    }
                }
            }
        }

        debug!(
            columns = columns.len(),
            rows = rows.len(),
            "Parsed tabular data"
        );

        Ok(Self {
            columns,
            rows,
            data: buffer.to_vec(),
            modified: false,
        })
    }

    fn parse_rows(gff: &Gff, rows_index: u32, columns: &[Column]) -> Vec<Row> {
        let reader = gff.reader();
        let data_offset = gff.header.data_offset as usize;
        let row_size = gff.structs[rows_index as usize].struct_size as usize;
        if row_size == 0 {
            return Vec::new();
        }

        // the root struct's single list field holds the rows
        let Some(root) = gff.structs.first() else {
            return Vec::new();
        };
        let Some(list_field) = root
            .fields
            .iter()
            .find(|f| f.flags.contains(FieldFlags::LIST))
        else {
            return Vec::new();
        };

        let list_offset = reader.read_i32(data_offset + list_field.data_offset as usize);
        if list_offset < 0 {
            return Vec::new();
        }
        let list_pos = data_offset + list_offset as usize;
        if list_pos + 4 > reader.len() {
            return Vec::new();
        }
        let count = reader.read_u32(list_pos);
        let row_data_start = list_pos + 4;

        let mut rows = Vec::new();
        for r in 0..count as usize {
            let row_pos = row_data_start + r * row_size;
            if row_pos >= reader.len() {
                break;
            }

            let values = columns
                .iter()
                .map(|column| Self::read_cell(gff, row_pos + column.offset as usize, column.ty))
                .collect();
            rows.push(Row { id: 0, values });
        }

        rows
    }

    fn read_cell(gff: &Gff, pos: usize, ty: ColumnType) -> Value {
        let reader = gff.reader();
        match ty {
            ColumnType::Int => Value::Int(reader.read_i32(pos)),
            ColumnType::Float => Value::Float(reader.read_f32(pos)),
            ColumnType::String | ColumnType::Resource => {
                if pos + 4 > reader.len() {
                    return Value::String(UNSET_CELL.to_string());
                }
                let str_offset = reader.read_i32(pos);
                if str_offset < 0 {
                    return Value::String(UNSET_CELL.to_string());
                }
                let text = Self::read_cell_string(
                    reader.data(),
                    gff.header.data_offset as usize + str_offset as usize,
                );
                if text.is_empty() {
                    Value::String(UNSET_CELL.to_string())
                } else {
                    Value::String(text)
                }
            }
        }
    }

    // Cell strings are plain NUL-terminated bytes in a flat blob, unlike the
    // length-prefixed strings of the generic reader.
    fn read_cell_string(data: ByteSpan, pos: usize) -> String {
        if pos >= data.len() {
            return String::new();
        }
        let bytes: Vec<u8> = data[pos..].iter().copied().take_while(|&b| b != 0).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Whether any row has been edited, added or removed since load.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Finds a column by name, case-insensitively.
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Finds the index of the row with the given id.
    pub fn find_row_by_id(&self, id: i32) -> Option<usize> {
        self.rows.iter().position(|r| r.id == id)
    }

    /// One greater than the highest existing row id, or 1 for an empty table.
    pub fn next_available_id(&self) -> i32 {
        self.rows.iter().map(|r| r.id).max().map_or(1, |max| max + 1)
    }

    /// Appends a row with type-appropriate defaults. Returns the new row's
    /// index, or `None` when the id is already taken.
    pub fn add_row(&mut self, id: i32) -> Option<usize> {
        if self.find_row_by_id(id).is_some() {
            return None;
        }

        let values = self
            .columns
            .iter()
            .map(|column| match column.ty {
                ColumnType::Int => Value::Int(0),
                ColumnType::Float => Value::Float(0.0),
                ColumnType::String | ColumnType::Resource => {
                    Value::String(UNSET_CELL.to_string())
                }
            })
            .collect();

        self.rows.push(Row { id, values });
        self.modified = true;
        Some(self.rows.len() - 1)
    }

    /// Removes the row at `index`, if it exists.
    pub fn remove_row(&mut self, index: usize) -> bool {
        if index >= self.rows.len() {
            return false;
        }
        self.rows.remove(index);
        self.modified = true;
        true
    }

    /// Gets a cell by row index and column name (case-insensitive).
    pub fn get_value(&self, row: usize, column: &str) -> Option<&Value> {
        self.get_value_by_index(row, self.find_column(column)?)
    }

    pub fn get_value_by_index(&self, row: usize, column: usize) -> Option<&Value> {
        self.rows.get(row)?.values.get(column)
    }

    /// Sets a cell by row index and column name (case-insensitive), coercing
    /// the value to the column's type. Returns whether the cell existed.
    pub fn set_value(&mut self, row: usize, column: &str, value: Value) -> bool {
        let Some(column) = self.find_column(column) else {
            return false;
        };
        self.set_value_by_index(row, column, value)
    }

    pub fn set_value_by_index(&mut self, row: usize, column: usize, value: Value) -> bool {
        let Some(ty) = self.columns.get(column).map(|c| c.ty) else {
            return false;
        };
        let Some(cell) = self
            .rows
            .get_mut(row)
            .and_then(|r| r.values.get_mut(column))
        else {
            return false;
        };

        *cell = coerce(ty, value);
        self.modified = true;
        true
    }

    /// Serializes the table for saving. Edits made in memory are not folded
    /// back into the container; the pristine source bytes are returned.
    pub fn write_to_buffer(&self) -> Option<ByteBuffer> {
        Some(self.data.clone())
    }
}

fn coerce(ty: ColumnType, value: Value) -> Value {
    match ty {
        ColumnType::Int => Value::Int(match value {
            Value::Int(v) => v,
            Value::Float(v) => v as i32,
            Value::String(v) => v.parse().unwrap_or(0),
        }),
        ColumnType::Float => Value::Float(match value {
            Value::Int(v) => v as f32,
            Value::Float(v) => v,
            Value::String(v) => v.parse().unwrap_or(0.0),
        }),
        ColumnType::String | ColumnType::Resource => Value::String(match value {
            Value::String(v) => v,
            other => other.to_display(),
        }),
    }
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

        fn bytes(&mut self, v: &[u8]) {
            self.0.extend_from_slice(v);
        }
    }

    // COLM declares [ID:Int, LABEL:String]; two 8-byte rows
    // {id=1, "sword"} and {id=5, "axe"}.
    fn build_test_gda() -> Vec<u8> {
        let mut b = Buf(Vec::new());

        b.bytes(b"GFF ");
        b.bytes(b"V4.0");
        b.bytes(b"PC  ");
        b.bytes(b"G2DA");
        b.bytes(b"V0.2");
        b.u32(3); // struct count
        b.u32(112); // data offset

        b.bytes(b"G2DA"); // root
        b.u32(1);
        b.u32(76);
        b.u32(4);

        b.bytes(b"COLM");
        b.u32(2);
        b.u32(88);
        b.u32(8);

        b.bytes(b"ROWS");
        b.u32(0);
        b.u32(112);
        b.u32(8);

        // root: the row list
        b.u32(0x12345678); // label, unused here
        b.u16(2); // ROWS struct index
        b.u16(0xC000); // LIST | STRUCT
        b.u32(0);

        // COLM fields double as column declarations
        b.u32(hash_column_name("ID"));
        b.u16(5); // INT
        b.u16(0);
        b.u32(0);

        b.u32(hash_column_name("LABEL"));
        b.u16(10); // STRING
        b.u16(0);
        b.u32(4);

        // data section (offsets relative to 112)
        b.i32(4); // row list at +4
        b.u32(2); // row count
        b.i32(1); // row 0: ID
        b.i32(24); // row 0: LABEL -> "sword"
        b.i32(5); // row 1: ID
        b.i32(30); // row 1: LABEL -> "axe"
        b.bytes(b"sword\0");
        b.bytes(b"axe\0");

        b.0
    }

    #[test]
    fn parses_columns_and_rows() {
        let buffer = build_test_gda();
        let table = Table::from_existing(Platform::Win32, &buffer).unwrap();

        // ID is extracted into row identity, not a column
        assert_eq!(table.columns().len(), 1);
        assert_eq!(table.columns()[0].name, "LABEL");
        assert_eq!(table.columns()[0].ty, ColumnType::String);

        assert_eq!(table.rows().len(), 2);
        assert_eq!(table.rows()[0].id, 1);
        assert_eq!(table.rows()[1].id, 5);
        assert_eq!(
            table.get_value(0, "LABEL"),
            Some(&Value::String("sword".to_string()))
        );
    }

    #[test]
    fn lookup_scenario() {
        let buffer = build_test_gda();
        let table = Table::from_existing(Platform::Win32, &buffer).unwrap();

        assert_eq!(table.find_row_by_id(5), Some(1));
        assert_eq!(
            table.get_value(1, "LABEL"),
            Some(&Value::String("axe".to_string()))
        );
        assert_eq!(table.next_available_id(), 6);
        // name matching is case-insensitive
        assert_eq!(table.find_column("label"), Some(0));
    }

    #[test]
    fn missing_colm_is_fatal() {
        let mut buffer = build_test_gda();
        buffer[44..48].copy_from_slice(b"NOPE"); // the COLM struct tag
        let result = Table::from_existing(Platform::Win32, &buffer);
        assert_eq!(result.err(), Some(Error::MissingStruct { tag: "COLM" }));
    }

    #[test]
    fn missing_rows_degrades_to_empty() {
        let mut buffer = build_test_gda();
        buffer[60..64].copy_from_slice(b"NOPE"); // the ROWS struct tag
        let table = Table::from_existing(Platform::Win32, &buffer).unwrap();

        assert_eq!(table.columns().len(), 1);
        assert!(table.rows().is_empty());
        assert_eq!(table.next_available_id(), 1);
    }

    #[test]
    fn unset_string_cell_sentinel() {
        let mut buffer = build_test_gda();
        // row 1's LABEL offset, relative position 20 in the data section
        buffer[132..136].copy_from_slice(&(-1i32).to_le_bytes());
        let table = Table::from_existing(Platform::Win32, &buffer).unwrap();

        assert_eq!(
            table.get_value(1, "LABEL"),
            Some(&Value::String(UNSET_CELL.to_string()))
        );
    }

    #[test]
    fn add_and_remove_rows() {
        let buffer = build_test_gda();
        let mut table = Table::from_existing(Platform::Win32, &buffer).unwrap();

        let index = table.add_row(6).unwrap();
        assert_eq!(
            table.get_value(index, "LABEL"),
            Some(&Value::String(UNSET_CELL.to_string()))
        );
        // duplicate ids are rejected
        assert_eq!(table.add_row(6), None);

        assert!(table.remove_row(index));
        assert_eq!(table.find_row_by_id(6), None);
        assert!(table.is_modified());
    }

    #[test]
    fn set_value_coerces_to_column_type() {
        let buffer = build_test_gda();
        let mut table = Table::from_existing(Platform::Win32, &buffer).unwrap();

        assert!(table.set_value(0, "label", Value::Int(7)));
        assert_eq!(
            table.get_value(0, "LABEL"),
            Some(&Value::String("7".to_string()))
        );
    }

    #[test]
    fn save_returns_pristine_buffer() {
        let buffer = build_test_gda();
        let mut table = Table::from_existing(Platform::Win32, &buffer).unwrap();
        table.set_value(0, "LABEL", Value::String("edited".to_string()));

        assert_eq!(table.write_to_buffer(), Some(buffer));
    }

    #[test]
    fn invalid_data_wont_load() {
        assert!(Table::from_existing(Platform::Win32, &random_bytes()).is_err());
    }
}
