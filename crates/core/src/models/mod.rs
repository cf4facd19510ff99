//! Shared domain models.

mod mapping;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use mapping::{Emulator, EmulatorMapping, EmulatorProfile, Platform, ResolvedMapping};

/// Discriminant selecting the identity payload, scanner and installer for a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RomKind {
    /// One launchable file per game, copied verbatim.
    SingleFile,
    /// A bundle directory holding a launchable file plus supporting files.
    MultiFile,
    /// Titles identified by embedded content ids and registered into an emulator store.
    ContentStore,
}

impl RomKind {
    /// Human readable label.
    pub fn label(&self) -> &'static str {
        match self {
            RomKind::SingleFile => "single file",
            RomKind::MultiFile => "multi file",
            RomKind::ContentStore => "content store",
        }
    }
}

impl fmt::Display for RomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fixed-width numeric title identifier read from file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub u64);

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for ContentId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s.trim_start_matches("0x"), 16).map(ContentId)
    }
}

/// Payload for [`RomKind::SingleFile`] games.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleFileInfo {
    /// Owning mapping.
    pub mapping_id: Uuid,
    /// ROM file, relative to the mapping's source path (`/`-separated).
    pub source_path: String,
}

/// Payload for [`RomKind::MultiFile`] games.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiFileInfo {
    /// Owning mapping.
    pub mapping_id: Uuid,
    /// Launchable file, relative to the mapping's source path.
    pub source_file_path: String,
    /// Bundle directory, relative to the mapping's source path.
    pub source_base_dir: String,
}

/// Payload for [`RomKind::ContentStore`] games.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStoreInfo {
    /// Owning mapping.
    pub mapping_id: Uuid,
    /// Base title id.
    pub content_id: ContentId,
}

/// One identified game. Never mutated: a moved artifact yields a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameInfo {
    /// See [`SingleFileInfo`].
    SingleFile(SingleFileInfo),
    /// See [`MultiFileInfo`].
    MultiFile(MultiFileInfo),
    /// See [`ContentStoreInfo`].
    ContentStore(ContentStoreInfo),
}

impl GameInfo {
    /// Kind discriminant of the payload.
    pub fn kind(&self) -> RomKind {
        match self {
            GameInfo::SingleFile(_) => RomKind::SingleFile,
            GameInfo::MultiFile(_) => RomKind::MultiFile,
            GameInfo::ContentStore(_) => RomKind::ContentStore,
        }
    }

    /// Mapping the game was scanned from.
    pub fn mapping_id(&self) -> Uuid {
        match self {
            GameInfo::SingleFile(info) => info.mapping_id,
            GameInfo::MultiFile(info) => info.mapping_id,
            GameInfo::ContentStore(info) => info.mapping_id,
        }
    }

    /// Kind-specific `name: value` lines for troubleshooting output.
    pub fn description_lines(&self) -> Vec<String> {
        match self {
            GameInfo::SingleFile(info) => vec![format!("SourcePath: {}", info.source_path)],
            GameInfo::MultiFile(info) => vec![
                format!("SourceFilePath: {}", info.source_file_path),
                format!("SourceBaseDir: {}", info.source_base_dir),
            ],
            GameInfo::ContentStore(info) => vec![format!("ContentId: {}", info.content_id)],
        }
    }
}

/// A launchable file reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRom {
    /// Display name.
    pub name: String,
    /// Path as handed to the host (portable placeholder applied).
    pub path: String,
}

/// Payload of the install-completed notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationData {
    /// Directory the game now lives in (portable placeholder applied).
    pub install_directory: String,
    /// One or more launchable files.
    pub roms: Vec<GameRom>,
}

/// Play action attached to every scanned game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayAction {
    /// Action label, e.g. `Play in Mesen`.
    pub name: String,
    /// Emulator to launch.
    pub emulator_id: Uuid,
    /// Emulator profile to launch with.
    pub emulator_profile_id: String,
}

/// Logical game produced by a scan pass, ready for the host to persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannedGame {
    /// Identity token, the host's primary key for this game.
    pub game_id: String,
    /// Display title.
    pub name: String,
    /// Whether the artifact is present at the destination.
    pub is_installed: bool,
    /// Installed location (installed games only).
    pub install_directory: Option<String>,
    /// Launchable files (installed games only).
    pub roms: Vec<GameRom>,
    /// Sum of file sizes of the artifact, when known.
    pub install_size: Option<u64>,
    /// Platform display name.
    pub platform: String,
    /// Regions guessed from file names or known for the kind.
    pub regions: Vec<String>,
    /// Launch configuration.
    pub play_action: PlayAction,
    /// Decoded form of `game_id`.
    #[serde(skip)]
    pub info: Option<GameInfo>,
}

/// The host's persisted view of a game, as handed back for install/uninstall.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameRecord {
    /// Identity token.
    pub game_id: String,
    /// Display title.
    pub name: String,
    /// Whether the host currently considers the game installed.
    #[serde(default)]
    pub is_installed: bool,
    /// Recorded install directory, possibly containing the portable placeholder.
    #[serde(default)]
    pub install_directory: Option<String>,
    /// Recorded launchable files.
    #[serde(default)]
    pub roms: Vec<GameRom>,
}

impl From<&ScannedGame> for GameRecord {
    fn from(game: &ScannedGame) -> Self {
        Self {
            game_id: game.game_id.clone(),
            name: game.name.clone(),
            is_installed: game.is_installed,
            install_directory: game.install_directory.clone(),
            roms: game.roms.clone(),
        }
    }
}
