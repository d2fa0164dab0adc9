// SPDX-FileCopyrightText: 2025 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use binrw::Endian;

/// The platform a file was built for.
///
/// PC captures are little-endian; console captures are big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Windows and other PC platforms.
    Win32,
    /// PlayStation 3.
    PS3,
    /// Xbox 360.
    Xbox360,
}

impl Platform {
    /// Returns the byte order of primitive values on this platform.
    pub fn endianness(&self) -> Endian {
        match self {
            Platform::Win32 => Endian::Little,
            Platform::PS3 | Platform::Xbox360 => Endian::Big,
        }
    }
}

/// Renders a 4-character type tag for display, replacing non-printable bytes.
pub fn fourcc_to_string(tag: [u8; 4]) -> String {
    tag.iter()
        .map(|&b| {
            if (0x20..0x7F).contains(&b) {
                b as char
            } else {
                '?'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_endianness() {
        assert_eq!(Platform::Win32.endianness(), Endian::Little);
        assert_eq!(Platform::PS3.endianness(), Endian::Big);
    }

    #[test]
    fn fourcc_display() {
        assert_eq!(fourcc_to_string(*b"GDA "), "GDA ");
        assert_eq!(fourcc_to_string([0x00, 0x41, 0xFF, 0x42]), "?A?B");
    }
}
