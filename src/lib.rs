// SPDX-FileCopyrightText: 2025 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Crate for reading the binary formats of BioWare's Eclipse engine, such as
//! the GFF container and the formats layered on top of it.

/// Represents a continuous block of memory which is not owned, and comes from an outside source.
pub type ByteSpan<'a> = &'a [u8];

/// Represents a continuous block of memory which is owned.
pub type ByteBuffer = Vec<u8>;

/// Common structures and enumerations used by other modules.
pub mod common;

/// Reading generic container (GFF) files.
pub mod gff;

/// Reading and editing tabular data (GDA) files.
pub mod gda;

/// Resolving field label hashes into human-readable names.
pub mod labels;

/// Reading room model layout (RML) files.
pub mod rml;

/// Reading localization talk tables (TLK).
pub mod tlk;

/// Reading area definition (ARE) files.
pub mod are;

/// Reading terrain heightmap (TRN) sectors.
pub mod trn;

/// Reading terrain mesh (TMSH) sectors.
pub mod tmsh;

/// Reading head morph (MOR) files.
pub mod mor;

/// Vertex stream transforms and blending.
pub mod mesh;

/// Hashing field labels and table column names.
pub mod crc;

mod reader;

pub use reader::EndianReader;

mod error;
pub use error::Error;
pub use error::Result;

#[cfg(test)]
mod test_helpers {
    use std::fs::read;
    use std::path::PathBuf;

    /// Returns the junk-byte fixture used to check that parsers never panic on invalid data.
    pub fn random_bytes() -> Vec<u8> {
        let mut d = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        d.push("resources/tests");
        d.push("random");

        read(d).unwrap()
    }
}
