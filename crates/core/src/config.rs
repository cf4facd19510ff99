//! Application configuration loaded from disk and the environment.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    models::{Emulator, EmulatorMapping, Platform},
    paths::PathVariables,
    settings::{validate_mappings, AppMode, MappingProvider},
};

/// Directory under the user's config dir holding `config.toml`.
pub const CONFIG_DIR_NAME: &str = "romvault";
/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Prefix for environment overrides, e.g. `ROMVAULT__APP_MODE=fullscreen`.
pub const ENV_PREFIX: &str = "ROMVAULT";

/// Settings and mappings for the library.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Private data directory (source caches live here).
    pub data_dir: PathBuf,
    /// Running host UI mode.
    pub app_mode: AppMode,
    /// Whether the host runs from a relocatable install.
    pub portable: bool,
    /// Host install directory used for portable path substitution.
    pub application_path: PathBuf,
    /// Scan even when the host is in fullscreen mode.
    pub scan_games_in_fullscreen: bool,
    /// Post a notification once an install completes.
    pub notify_on_install_complete: bool,
    /// Use the progress-dialog copy strategy in desktop mode.
    pub use_copy_dialog_in_desktop_mode: bool,
    /// Use the progress-dialog copy strategy in fullscreen mode.
    pub use_copy_dialog_in_fullscreen_mode: bool,
    /// Known emulators and their profiles.
    pub emulators: Vec<Emulator>,
    /// Known platforms.
    pub platforms: Vec<Platform>,
    /// Configured mappings.
    pub mappings: Vec<EmulatorMapping>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(CONFIG_DIR_NAME),
            app_mode: AppMode::Desktop,
            portable: false,
            application_path: PathBuf::new(),
            scan_games_in_fullscreen: false,
            notify_on_install_complete: false,
            use_copy_dialog_in_desktop_mode: false,
            use_copy_dialog_in_fullscreen_mode: false,
            emulators: Vec::new(),
            platforms: Vec::new(),
            mappings: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Load from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load from `path` layered with `ROMVAULT_*` environment variables.
    ///
    /// Mappings without an id get one and the file is rewritten.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        let mut config: AppConfig = settings
            .try_deserialize()
            .with_context(|| format!("failed to parse configuration {}", path.display()))?;

        let assigned = config.assign_missing_mapping_ids();
        validate_mappings(&config.mappings).context("invalid mapping configuration")?;

        if assigned > 0 && path.exists() {
            info!(assigned, path = %path.display(), "Assigned ids to mappings");
            config.save_to(path)?;
        }

        Ok(config)
    }

    /// Write the configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let serialized = toml::to_string_pretty(self).context("failed to serialize configuration")?;
        fs::write(path, serialized).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Substitution table for portable installs.
    pub fn path_variables(&self) -> PathVariables {
        let application_path = if self.application_path.as_os_str().is_empty() {
            std::env::current_dir().unwrap_or_default()
        } else {
            self.application_path.clone()
        };
        PathVariables::new(application_path, self.portable)
    }

    /// Directory where per-mapping source caches are persisted.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("source-cache")
    }

    fn assign_missing_mapping_ids(&mut self) -> usize {
        let mut assigned = 0;
        for mapping in self.mappings.iter_mut().filter(|m| m.mapping_id.is_nil()) {
            mapping.mapping_id = Uuid::new_v4();
            assigned += 1;
        }
        assigned
    }
}

impl MappingProvider for AppConfig {
    fn mappings(&self) -> Vec<EmulatorMapping> {
        self.mappings.clone()
    }

    fn emulator(&self, id: Uuid) -> Option<Emulator> {
        self.emulators.iter().find(|e| e.id == id).cloned()
    }

    fn platform(&self, id: &str) -> Option<Platform> {
        self.platforms.iter().find(|p| p.id == id).cloned()
    }

    fn app_mode(&self) -> AppMode {
        self.app_mode
    }

    fn use_copy_dialog_in_desktop_mode(&self) -> bool {
        self.use_copy_dialog_in_desktop_mode
    }

    fn use_copy_dialog_in_fullscreen_mode(&self) -> bool {
        self.use_copy_dialog_in_fullscreen_mode
    }

    fn scan_games_in_fullscreen(&self) -> bool {
        self.scan_games_in_fullscreen
    }

    fn notify_on_install_complete(&self) -> bool {
        self.notify_on_install_complete
    }
}

/// Write a default configuration file when none exists yet.
pub fn ensure_default_config() -> Result<PathBuf> {
    let path = AppConfig::default_path();
    if !path.exists() {
        AppConfig::default().save_to(&path)?;
        info!(path = %path.display(), "Wrote default configuration");
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RomKind;
    use tempfile::tempdir;

    #[test]
    fn loads_mappings_and_assigns_missing_ids() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(CONFIG_FILE_NAME);
        let emulator_id = Uuid::new_v4();
        fs::write(
            &path,
            format!(
                r#"
data_dir = "{data}"
app_mode = "fullscreen"
use_copy_dialog_in_fullscreen_mode = true

[[emulators]]
id = "{emulator_id}"
name = "Mesen"

[[emulators.profiles]]
id = "default"
name = "Default"
image_extensions = ["nes"]

[[platforms]]
id = "nes"
name = "NES"

[[mappings]]
emulator_id = "{emulator_id}"
emulator_profile_id = "default"
platform_id = "nes"
source_path = "/archive/nes"
destination_path = "/roms/nes"
rom_kind = "single_file"
"#,
                data = dir.path().join("data").display(),
            ),
        )?;

        let config = AppConfig::load_from(&path)?;
        assert_eq!(config.app_mode, AppMode::Fullscreen);
        assert!(config.use_copy_dialog());
        assert_eq!(config.mappings.len(), 1);
        let mapping = &config.mappings[0];
        assert!(mapping.enabled);
        assert_eq!(mapping.rom_kind, RomKind::SingleFile);
        assert!(!mapping.mapping_id.is_nil());

        let reloaded = AppConfig::load_from(&path)?;
        assert_eq!(reloaded.mappings[0].mapping_id, mapping.mapping_id);
        Ok(())
    }

    #[test]
    fn missing_file_yields_defaults() -> Result<()> {
        let dir = tempdir()?;
        let config = AppConfig::load_from(dir.path().join("absent.toml"))?;
        assert!(config.mappings.is_empty());
        assert_eq!(config.app_mode, AppMode::Desktop);
        Ok(())
    }
}
