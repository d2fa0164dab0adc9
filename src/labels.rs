// SPDX-FileCopyrightText: 2025 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use tracing::debug;

use crate::crc::hash_label;

/// The community hash-list files we know how to pick up, if present.
const EXTERNAL_FILES: [&str; 4] = [
    "StatPropertyNames.txt",
    "StatPropertyNames2.txt",
    "ResRefNames.txt",
    "ResRefNames2.txt",
];

/// Directories searched for external hash-list files, relative to the working directory.
const SEARCH_PATHS: [&str; 8] = [
    "src/dependencies/hashes/",
    "../src/dependencies/hashes/",
    "../../src/dependencies/hashes/",
    "../../../src/dependencies/hashes/",
    "dependencies/hashes/",
    "hashes/",
    "../hashes/",
    "./",
];

/// Field names observed across save, area, item and appearance documents.
/// Labels in the files are stored only as hashes, so anything we want to
/// display by name has to be seeded here or loaded from an external list.
const KNOWN_LABELS: &[&str] = &[
    "Name", "Tag", "ResRef", "TemplateResRef", "Active", "ID", "Count", "Type",
    "Position_X", "Position_Y", "Position_Z",
    "Orientation_X", "Orientation_Y", "Orientation_Z", "Orientation_W",
    "Bearings_X", "Bearings_Y", "Bearings_Z",
    "Strength", "Dexterity", "Willpower", "Magic", "Cunning", "Constitution",
    "Health", "Mana", "Stamina", "Mana_Stamina",
    "Attack", "Defense", "Armor", "DamageScale", "SpellPower",
    "Level", "Experience", "Gold", "Silver", "Copper",
    "Regeneration_Health", "Regeneration_Stamina", "Regeneration_Mana",
    "Damage_Resistance_Fire", "Damage_Resistance_Cold",
    "Damage_Resistance_Electricity", "Damage_Resistance_Nature",
    "Damage_Resistance_Spirit", "Damage_Resistance_Physical",
    "Agent_ID", "Appearance_Type", "Gender", "Race", "Background",
    "Portrait", "Head_Morph", "Conversation", "Script",
    "Inventory", "ItemList", "Equip_ItemList",
    "Creature_Stats", "Creature_Type", "AI_BEHAVIOR",
    "Party_Rank", "Current_Strategy", "Approvel",
    "Area_ID", "Area_Name", "Objects", "Creatures", "Placeables", "Triggers",
    "Waypoints", "Stores", "Sounds", "Lights", "Cameras",
    "Variables", "Map_ID", "World_Map", "Note", "Trap_Data",
    "StackSize", "Cost", "BaseCost", "Plot", "Stolen", "Droppable",
    "Item_Material", "Item_Type", "Item_Icon",
    "GFF_ROOT", "SAVEGAME_PLAYERCHAR", "SAVEGAME_PLAYERCHAR_CHAR",
    "SAVEGAME_PARTYLIST", "SAVEGAME_CAMPAIGN_ID", "SAVEGAME_AREA_LIST",
    "SAVEGAME_WORLD_TIME", "SAVEGAME_GAMEMODE", "SAVEGAME_APPEARANCE",
    "ModelName", "TintFileName", "VFXName", "PhysicsName",
    "Body_Tint", "Face_Tint", "Hair_Tint", "Eyes_Tint", "Skin_Tint",
];

/// Resolves 32-bit field label hashes into human-readable names.
///
/// The registry is seeded with every known label and can be augmented from
/// external hash-list files. Once constructed it is read-only, so it can be
/// shared freely between parsers.
pub struct LabelRegistry {
    names: HashMap<u32, String>,
}

impl LabelRegistry {
    /// Creates a registry seeded with the known labels, without touching the filesystem.
    pub fn new() -> Self {
        let mut names = HashMap::new();
        for label in KNOWN_LABELS {
            names.insert(hash_label(label), label.to_string());
        }

        Self { names }
    }

    /// Creates a registry seeded with the known labels, then augmented from
    /// any of the well-known external hash-list files found on disk.
    pub fn with_external_files() -> Self {
        let mut registry = Self::new();
        for filename in EXTERNAL_FILES {
            registry.merge_external_file(filename);
        }
        registry
    }

    /// Merges names from the first copy of `filename` found in the candidate
    /// directories. Lines hold one name, optionally followed by a comma and
    /// extra columns which are ignored. Already-registered hashes keep their
    /// existing name. Returns whether a file was found.
    pub fn merge_external_file(&mut self, filename: &str) -> bool {
        for prefix in SEARCH_PATHS {
            let path = Path::new(prefix).join(filename);
            let Ok(file) = File::open(&path) else {
                continue;
            };

            debug!(path = %path.display(), "Merging label hash list");

            for line in BufReader::new(file).lines().map_while(Result::ok) {
                let line = line.trim_end_matches('\r');
                let key = match line.split_once(',') {
                    Some((first, _)) => first,
                    None => line.split_whitespace().next().unwrap_or(""),
                };
                if key.is_empty() {
                    continue;
                }

                self.names
                    .entry(hash_label(key))
                    .or_insert_with(|| key.to_string());
            }

            return true;
        }

        debug!(filename, "No label hash list found, skipping");
        false
    }

    /// Returns the name registered for `hash`, or the hash rendered as an
    /// uppercase hex literal (e.g. `0x1F4A`) if it is unknown.
    pub fn lookup(&self, hash: u32) -> String {
        match self.names.get(&hash) {
            Some(name) => name.clone(),
            None => format!("0x{hash:X}"),
        }
    }

    /// Whether a name is registered for `hash`.
    pub fn contains(&self, hash: u32) -> bool {
        self.names.contains_key(&hash)
    }

    /// A process-wide registry, built with external files on first use.
    ///
    /// Initialization is guarded, so concurrent first lookups from multiple
    /// threads are safe; afterwards the registry is read-only.
    pub fn global() -> &'static LabelRegistry {
        static GLOBAL: OnceLock<LabelRegistry> = OnceLock::new();
        GLOBAL.get_or_init(LabelRegistry::with_external_files)
    }
}

impl Default for LabelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_lookup() {
        let registry = LabelRegistry::new();

        assert_eq!(registry.lookup(hash_label("Name")), "Name");
        assert_eq!(registry.lookup(hash_label("TemplateResRef")), "TemplateResRef");
        // seeded under its canonical spelling regardless of lookup-side case
        assert_eq!(registry.lookup(hash_label("orientation_w")), "Orientation_W");
    }

    #[test]
    fn every_seed_resolves_to_itself() {
        let registry = LabelRegistry::new();

        // also catches hash collisions within the seed list
        for label in KNOWN_LABELS {
            assert_eq!(registry.lookup(hash_label(label)), *label);
        }
    }

    #[test]
    fn unknown_hash_renders_as_hex() {
        let registry = LabelRegistry::new();

        let mut hash = 0xDEADBEEFu32;
        while registry.contains(hash) {
            hash = hash.wrapping_add(1);
        }

        let rendered = registry.lookup(hash);
        assert!(rendered.starts_with("0x"));
        assert!(rendered.len() >= 3 && rendered.len() <= 10);
        assert!(rendered[2..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));

        // stable across repeated calls
        assert_eq!(registry.lookup(hash), rendered);
    }

    #[test]
    fn global_is_initialized_once() {
        let a = LabelRegistry::global() as *const LabelRegistry;
        let b = LabelRegistry::global() as *const LabelRegistry;
        assert_eq!(a, b);
    }
}
