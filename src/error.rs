// SPDX-FileCopyrightText: 2025 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

/// Why a file was rejected at load time.
///
/// Only the top-level load of a document can fail; reads of individual fields
/// fall back to documented defaults instead. Keeping the failed precondition
/// distinct matters for diagnosing new file variants in the wild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The buffer is smaller than the fixed header of the format.
    BufferTooSmall {
        /// How many bytes were given.
        size: usize,
        /// How many bytes the header needs.
        needed: usize,
    },
    /// The magic at the start of the buffer doesn't match the format's signature.
    BadMagic {
        /// The first bytes actually found.
        found: [u8; 4],
    },
    /// A struct the format requires (such as the column struct of a table) is missing.
    MissingStruct {
        /// The 4-character type tag that wasn't found.
        tag: &'static str,
    },
    /// The file declares a version this crate doesn't know how to read.
    UnsupportedVersion {
        /// The version tag found in the header.
        found: [u8; 4],
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BufferTooSmall { size, needed } => {
                write!(f, "buffer too small: {size} bytes, need at least {needed}")
            }
            Error::BadMagic { found } => {
                write!(f, "bad magic: {}", crate::common::fourcc_to_string(*found))
            }
            Error::MissingStruct { tag } => write!(f, "missing mandatory struct: {tag:?}"),
            Error::UnsupportedVersion { found } => {
                write!(f, "unsupported version: {}", crate::common::fourcc_to_string(*found))
            }
        }
    }
}

impl std::error::Error for Error {}

/// Alias for results whose error is [Error].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_render_printable() {
        let error = Error::BadMagic { found: *b"RIFF" };
        assert_eq!(error.to_string(), "bad magic: RIFF");

        // non-printable bytes render as placeholders instead of raw control codes
        let error = Error::UnsupportedVersion { found: [0x00, b'V', 0x01, b'9'] };
        assert_eq!(error.to_string(), "unsupported version: ?V?9");
    }
}
