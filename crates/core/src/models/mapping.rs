#![allow(missing_docs)]

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RomKind;

fn default_enabled() -> bool {
    true
}

/// One configured source → destination pairing for an emulator profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorMapping {
    /// Stable id; `Uuid::nil()` until assigned on load.
    #[serde(default)]
    pub mapping_id: Uuid,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub emulator_id: Uuid,
    pub emulator_profile_id: String,
    pub platform_id: String,
    pub source_path: PathBuf,
    /// May contain the portable placeholder.
    pub destination_path: String,
    pub rom_kind: RomKind,
}

impl EmulatorMapping {
    pub fn description_lines(&self) -> Vec<String> {
        vec![
            format!("MappingId: {}", self.mapping_id),
            format!("Enabled: {}", self.enabled),
            format!("EmulatorId: {}", self.emulator_id),
            format!("EmulatorProfileId: {}", self.emulator_profile_id),
            format!("PlatformId: {}", self.platform_id),
            format!("SourcePath: {}", self.source_path.display()),
            format!("DestinationPath: {}", self.destination_path),
            format!("RomKind: {}", self.rom_kind),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image_extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emulator {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub install_dir: Option<String>,
    #[serde(default)]
    pub profiles: Vec<EmulatorProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub id: String,
    pub name: String,
}

/// A mapping with every reference looked up and its paths resolved.
#[derive(Debug, Clone)]
pub struct ResolvedMapping {
    pub mapping: EmulatorMapping,
    pub emulator: Emulator,
    pub profile: EmulatorProfile,
    pub platform: Platform,
    /// Lower-cased, trimmed, in configured order.
    pub image_extensions: Vec<String>,
    /// Absolute destination with the portable placeholder expanded.
    pub destination: PathBuf,
}

impl ResolvedMapping {
    pub fn id(&self) -> Uuid {
        self.mapping.mapping_id
    }

    pub fn source(&self) -> &PathBuf {
        &self.mapping.source_path
    }

    pub fn play_action_name(&self) -> String {
        format!("Play in {}", self.emulator.name)
    }
}

#[cfg(test)]
impl ResolvedMapping {
    /// Fully resolved mapping over two directories.
    pub(crate) fn fixture(
        kind: RomKind,
        source: &std::path::Path,
        destination: &std::path::Path,
        extensions: &[&str],
    ) -> Self {
        let emulator_id = Uuid::new_v4();
        let profile = EmulatorProfile {
            id: "default".to_string(),
            name: "Default".to_string(),
            image_extensions: extensions.iter().map(|ext| ext.to_string()).collect(),
        };
        ResolvedMapping {
            mapping: EmulatorMapping {
                mapping_id: Uuid::new_v4(),
                enabled: true,
                emulator_id,
                emulator_profile_id: profile.id.clone(),
                platform_id: "psx".to_string(),
                source_path: source.to_path_buf(),
                destination_path: destination.to_string_lossy().into_owned(),
                rom_kind: kind,
            },
            emulator: Emulator {
                id: emulator_id,
                name: "DuckStation".to_string(),
                install_dir: None,
                profiles: vec![profile.clone()],
            },
            image_extensions: profile.image_extensions.clone(),
            profile,
            platform: Platform {
                id: "psx".to_string(),
                name: "Sony PlayStation".to_string(),
            },
            destination: destination.to_path_buf(),
        }
    }
}
