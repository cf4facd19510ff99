#![allow(dead_code)]

use std::{
    fs,
    path::PathBuf,
    sync::Arc,
};

use anyhow::Result;
use parking_lot::Mutex;
use romvault_core::{
    models::{Emulator, EmulatorMapping, EmulatorProfile, InstallationData, Platform, RomKind},
    AppConfig, HostEvents, Library, LibraryContext, PathVariables, Severity,
};
use tempfile::{tempdir, TempDir};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Notify(String, Severity),
    Installed(InstallationData),
    Uninstalled,
    Aborted,
    UninstallAborted,
}

#[derive(Default)]
pub struct RecordingHost {
    events: Mutex<Vec<Event>>,
}

impl RecordingHost {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Notify(message, Severity::Error) => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl HostEvents for RecordingHost {
    fn notify(&self, _game_id: &str, message: &str, severity: Severity) {
        self.events
            .lock()
            .push(Event::Notify(message.to_string(), severity));
    }

    fn game_installed(&self, _game_id: &str, data: InstallationData) {
        self.events.lock().push(Event::Installed(data));
    }

    fn game_uninstalled(&self, _game_id: &str) {
        self.events.lock().push(Event::Uninstalled);
    }

    fn install_aborted(&self, _game_id: &str) {
        self.events.lock().push(Event::Aborted);
    }

    fn uninstall_aborted(&self, _game_id: &str) {
        self.events.lock().push(Event::UninstallAborted);
    }
}

/// Temporary source/destination pair with one mapping configured.
pub struct Fixture {
    pub dir: TempDir,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub config: AppConfig,
    pub host: Arc<RecordingHost>,
}

impl Fixture {
    pub fn new(kind: RomKind, extensions: &[&str]) -> Result<Self> {
        let dir = tempdir()?;
        let source = dir.path().join("source");
        let destination = dir.path().join("dest");
        fs::create_dir_all(&source)?;

        let emulator_id = Uuid::new_v4();
        let config = AppConfig {
            data_dir: dir.path().join("data"),
            emulators: vec![Emulator {
                id: emulator_id,
                name: "Mesen".to_string(),
                install_dir: None,
                profiles: vec![EmulatorProfile {
                    id: "default".to_string(),
                    name: "Default".to_string(),
                    image_extensions: extensions.iter().map(|ext| ext.to_string()).collect(),
                }],
            }],
            platforms: vec![Platform {
                id: "nes".to_string(),
                name: "Nintendo Entertainment System".to_string(),
            }],
            mappings: vec![EmulatorMapping {
                mapping_id: Uuid::new_v4(),
                enabled: true,
                emulator_id,
                emulator_profile_id: "default".to_string(),
                platform_id: "nes".to_string(),
                source_path: source.clone(),
                destination_path: destination.to_string_lossy().into_owned(),
                rom_kind: kind,
            }],
            ..AppConfig::default()
        };

        Ok(Self {
            dir,
            source,
            destination,
            config,
            host: Arc::new(RecordingHost::default()),
        })
    }

    pub fn mapping(&self) -> &EmulatorMapping {
        &self.config.mappings[0]
    }

    pub fn write(&self, relative: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.source.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn context(&self) -> LibraryContext {
        LibraryContext::new(
            Arc::new(self.config.clone()),
            self.host.clone(),
            PathVariables::default(),
            self.config.cache_dir(),
        )
    }

    pub fn library(&self) -> Library {
        Library::new(Arc::new(self.context()))
    }
}

