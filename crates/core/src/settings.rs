//! Read-only view of the host's settings and mapping resolution.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::{Emulator, EmulatorMapping, Platform, ResolvedMapping, RomKind},
    paths::PathVariables,
};

/// Which host UI is running; selects the copy strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppMode {
    /// Desktop window.
    #[default]
    Desktop,
    /// Couch/TV interface.
    Fullscreen,
}

/// Problems with a mapping's configuration. Reported per mapping, never fatal to a scan.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The game references a mapping that no longer exists.
    #[error("mapping {0} not found; try removing and re-adding the game")]
    MappingNotFound(Uuid),
    /// Mapping references an unknown emulator.
    #[error("emulator {0} not found")]
    EmulatorNotFound(Uuid),
    /// Mapping references an unknown emulator profile.
    #[error("emulator profile {profile} for emulator {emulator} not found")]
    ProfileNotFound {
        /// Emulator id.
        emulator: Uuid,
        /// Missing profile id.
        profile: String,
    },
    /// Mapping references an unknown platform.
    #[error("platform {0} not found")]
    PlatformNotFound(String),
    /// Two enabled mappings scan the same source as the same kind.
    #[error("mappings {first} and {second} both scan {} as {kind}", .source_path.display())]
    OverlappingMappings {
        /// Earlier mapping.
        first: Uuid,
        /// Later mapping.
        second: Uuid,
        /// Shared source directory.
        source_path: PathBuf,
        /// Shared kind.
        kind: RomKind,
    },
}

/// Settings collaborator consumed by every component that needs mapping data.
pub trait MappingProvider: Send + Sync {
    /// Configured mappings, in order.
    fn mappings(&self) -> Vec<EmulatorMapping>;
    /// Known emulators.
    fn emulator(&self, id: Uuid) -> Option<Emulator>;
    /// Known platforms.
    fn platform(&self, id: &str) -> Option<Platform>;
    /// Running UI mode.
    fn app_mode(&self) -> AppMode;
    /// Copy-dialog preference for desktop mode.
    fn use_copy_dialog_in_desktop_mode(&self) -> bool;
    /// Copy-dialog preference for fullscreen mode.
    fn use_copy_dialog_in_fullscreen_mode(&self) -> bool;
    /// Whether scans run while the host is in fullscreen mode.
    fn scan_games_in_fullscreen(&self) -> bool;
    /// Whether to notify when an install finishes.
    fn notify_on_install_complete(&self) -> bool;

    /// Look up a mapping by id.
    fn mapping(&self, id: Uuid) -> Option<EmulatorMapping> {
        self.mappings().into_iter().find(|m| m.mapping_id == id)
    }

    /// Whether installs should go through the progress-dialog copy strategy.
    fn use_copy_dialog(&self) -> bool {
        match self.app_mode() {
            AppMode::Desktop => self.use_copy_dialog_in_desktop_mode(),
            AppMode::Fullscreen => self.use_copy_dialog_in_fullscreen_mode(),
        }
    }
}

/// Look up the emulator, profile and platform of `mapping` and resolve its paths.
pub fn resolve(
    provider: &dyn MappingProvider,
    mapping: &EmulatorMapping,
    paths: &PathVariables,
) -> Result<ResolvedMapping, ConfigError> {
    let emulator = provider
        .emulator(mapping.emulator_id)
        .ok_or(ConfigError::EmulatorNotFound(mapping.emulator_id))?;

    let profile = emulator
        .profiles
        .iter()
        .find(|p| p.id == mapping.emulator_profile_id)
        .cloned()
        .ok_or_else(|| ConfigError::ProfileNotFound {
            emulator: mapping.emulator_id,
            profile: mapping.emulator_profile_id.clone(),
        })?;

    let platform = provider
        .platform(&mapping.platform_id)
        .ok_or_else(|| ConfigError::PlatformNotFound(mapping.platform_id.clone()))?;

    let image_extensions = profile
        .image_extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();

    Ok(ResolvedMapping {
        destination: paths.expand(&mapping.destination_path),
        mapping: mapping.clone(),
        emulator,
        profile,
        platform,
        image_extensions,
    })
}

/// Resolve the mapping with the given id.
pub fn resolve_by_id(
    provider: &dyn MappingProvider,
    id: Uuid,
    paths: &PathVariables,
) -> Result<ResolvedMapping, ConfigError> {
    let mapping = provider.mapping(id).ok_or(ConfigError::MappingNotFound(id))?;
    resolve(provider, &mapping, paths)
}

/// Reject enabled mappings that share a `(source_path, rom_kind)` pair.
pub fn validate_mappings(mappings: &[EmulatorMapping]) -> Result<(), ConfigError> {
    let enabled: Vec<_> = mappings.iter().filter(|m| m.enabled).collect();
    for (index, first) in enabled.iter().enumerate() {
        if let Some(second) = enabled[index + 1..]
            .iter()
            .find(|m| m.source_path == first.source_path && m.rom_kind == first.rom_kind)
        {
            return Err(ConfigError::OverlappingMappings {
                first: first.mapping_id,
                second: second.mapping_id,
                source_path: first.source_path.clone(),
                kind: first.rom_kind,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::models::EmulatorProfile;

    fn sample_config() -> AppConfig {
        let emulator_id = Uuid::new_v4();
        let mut config = AppConfig::default();
        config.emulators.push(Emulator {
            id: emulator_id,
            name: "Mesen".to_string(),
            install_dir: None,
            profiles: vec![EmulatorProfile {
                id: "default".to_string(),
                name: "Default".to_string(),
                image_extensions: vec![" NES".to_string(), "".to_string(), ".fds".to_string()],
            }],
        });
        config.platforms.push(Platform {
            id: "nes".to_string(),
            name: "Nintendo Entertainment System".to_string(),
        });
        config.mappings.push(EmulatorMapping {
            mapping_id: Uuid::new_v4(),
            enabled: true,
            emulator_id,
            emulator_profile_id: "default".to_string(),
            platform_id: "nes".to_string(),
            source_path: PathBuf::from("/archive/nes"),
            destination_path: "{PlayniteDirectory}/roms/nes".to_string(),
            rom_kind: RomKind::SingleFile,
        });
        config
    }

    #[test]
    fn resolves_extensions_and_portable_destination() {
        let config = sample_config();
        let paths = PathVariables::new("/opt/host", true);
        let mapping = config.mappings[0].clone();
        let resolved = resolve(&config, &mapping, &paths).expect("resolves");
        assert_eq!(resolved.image_extensions, vec!["nes", "fds"]);
        assert_eq!(resolved.destination, PathBuf::from("/opt/host/roms/nes"));
        assert_eq!(resolved.play_action_name(), "Play in Mesen");
    }

    #[test]
    fn missing_references_are_reported() {
        let mut config = sample_config();
        let paths = PathVariables::default();
        let mut mapping = config.mappings[0].clone();

        mapping.platform_id = "snes".to_string();
        assert_eq!(
            resolve(&config, &mapping, &paths).err(),
            Some(ConfigError::PlatformNotFound("snes".to_string()))
        );

        mapping.emulator_profile_id = "other".to_string();
        assert!(matches!(
            resolve(&config, &mapping, &paths),
            Err(ConfigError::ProfileNotFound { .. })
        ));

        config.emulators.clear();
        assert!(matches!(
            resolve(&config, &mapping, &paths),
            Err(ConfigError::EmulatorNotFound(_))
        ));

        let unknown = Uuid::new_v4();
        assert_eq!(
            resolve_by_id(&config, unknown, &paths).err(),
            Some(ConfigError::MappingNotFound(unknown))
        );
    }

    #[test]
    fn overlapping_enabled_mappings_are_rejected() {
        let config = sample_config();
        let mut mappings = config.mappings.clone();
        let mut duplicate = mappings[0].clone();
        duplicate.mapping_id = Uuid::new_v4();
        mappings.push(duplicate.clone());
        assert!(matches!(
            validate_mappings(&mappings),
            Err(ConfigError::OverlappingMappings { .. })
        ));

        mappings[1].enabled = false;
        assert!(validate_mappings(&mappings).is_ok());

        mappings[1].enabled = true;
        mappings[1].rom_kind = RomKind::MultiFile;
        assert!(validate_mappings(&mappings).is_ok());
    }
}
