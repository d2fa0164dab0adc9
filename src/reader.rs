// SPDX-FileCopyrightText: 2025 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use binrw::Endian;

use crate::ByteSpan;

/// Bounds-checked primitive reads at arbitrary offsets of a byte span.
///
/// A read that would run past the end of the buffer returns zero instead of
/// an error. Format exploration has to degrade gracefully on truncated or
/// half-corrupt captures, so callers can keep walking a damaged document and
/// report per-field fallbacks rather than aborting.
#[derive(Clone, Copy)]
pub struct EndianReader<'a> {
    data: ByteSpan<'a>,
    endian: Endian,
}

macro_rules! read_fn {
    ($name:ident, $t:ty) => {
        #[doc = concat!("Reads a `", stringify!($t), "` at `pos`, or zero if out of bounds.")]
        pub fn $name(&self, pos: usize) -> $t {
            match self.span(pos, std::mem::size_of::<$t>()) {
                Some(bytes) => {
                    let bytes = bytes.try_into().unwrap();
                    match self.endian {
                        Endian::Little => <$t>::from_le_bytes(bytes),
                        Endian::Big => <$t>::from_be_bytes(bytes),
                    }
                }
                None => <$t>::default(),
            }
        }
    };
}

impl<'a> EndianReader<'a> {
    /// Creates a reader over `data` with the given byte order.
    pub fn new(data: ByteSpan<'a>, endian: Endian) -> Self {
        Self { data, endian }
    }

    /// The length of the underlying buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the underlying buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The underlying buffer.
    pub fn data(&self) -> ByteSpan<'a> {
        self.data
    }

    /// Whether `len` bytes at `pos` are inside the buffer. Lets a caller
    /// distinguish a genuine zero value from the out-of-bounds default.
    pub fn in_bounds(&self, pos: usize, len: usize) -> bool {
        self.span(pos, len).is_some()
    }

    fn span(&self, pos: usize, len: usize) -> Option<&'a [u8]> {
        let end = pos.checked_add(len)?;
        if end > self.data.len() {
            return None;
        }
        Some(&self.data[pos..end])
    }

    read_fn!(read_u8, u8);
    read_fn!(read_i8, i8);
    read_fn!(read_u16, u16);
    read_fn!(read_i16, i16);
    read_fn!(read_u32, u32);
    read_fn!(read_i32, i32);
    read_fn!(read_u64, u64);
    read_fn!(read_i64, i64);
    read_fn!(read_f32, f32);
    read_fn!(read_f64, f64);

    /// Returns `len` bytes at `pos`, or an empty slice if out of bounds.
    pub fn read_bytes(&self, pos: usize, len: usize) -> &'a [u8] {
        self.span(pos, len).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn little_endian_reads() {
        let reader = EndianReader::new(&DATA, Endian::Little);

        assert_eq!(reader.read_u8(0), 0x01);
        assert_eq!(reader.read_u16(0), 0x0201);
        assert_eq!(reader.read_u32(0), 0x04030201);
        assert_eq!(reader.read_u64(0), 0x0807060504030201);
    }

    #[test]
    fn big_endian_reads() {
        let reader = EndianReader::new(&DATA, Endian::Big);

        assert_eq!(reader.read_u16(0), 0x0102);
        assert_eq!(reader.read_u32(4), 0x05060708);
    }

    #[test]
    fn out_of_bounds_is_zero() {
        let reader = EndianReader::new(&DATA, Endian::Little);

        // straddling the end; in_bounds tells the default apart from real zeroes
        assert_eq!(reader.read_u32(6), 0);
        assert!(!reader.in_bounds(6, 4));
        assert!(reader.in_bounds(4, 4));
        // entirely past the end
        assert_eq!(reader.read_u8(100), 0);
        // offset arithmetic must not overflow
        assert_eq!(reader.read_u32(usize::MAX - 1), 0);
        assert_eq!(reader.read_f32(100), 0.0);
    }

    #[test]
    fn float_reads() {
        let bytes = 1.5f32.to_le_bytes();
        let reader = EndianReader::new(&bytes, Endian::Little);
        assert_eq!(reader.read_f32(0), 1.5);
    }

    #[test]
    fn byte_slices() {
        let reader = EndianReader::new(&DATA, Endian::Little);
        assert_eq!(reader.read_bytes(2, 2), &[0x03, 0x04]);
        assert_eq!(reader.read_bytes(7, 4), &[] as &[u8]);
    }
}
