//! Lazy per-kind scans that turn a mapping's directories into games.
//!
//! Every scan walks the destination first and the source second, so keys of
//! installed games are recorded before any uninstalled candidate is judged.

mod content;
mod files;

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    identity::{self, IdentityError},
    models::{
        EmulatorMapping, GameInfo, GameRom, PlayAction, ResolvedMapping, RomKind, ScannedGame,
    },
};

pub use content::ContentScanner;
pub use files::{FileLayout, FileScan, FileScanner};

/// Games yielded by a scan, produced on demand.
pub type GameStream = Box<dyn Iterator<Item = ScannedGame> + Send>;

/// Which pass a scan is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// Walking the destination.
    Installed,
    /// Walking the source.
    Uninstalled,
    /// Finished or cancelled.
    Done,
}

impl ScanPhase {
    fn advance(self) -> Self {
        match self {
            ScanPhase::Installed => ScanPhase::Uninstalled,
            ScanPhase::Uninstalled | ScanPhase::Done => ScanPhase::Done,
        }
    }
}

/// Kind-specific discovery of games for one mapping.
pub trait RomScanner: Send + Sync {
    /// Kind handled by this scanner.
    fn kind(&self) -> RomKind;

    /// Start a lazy scan. The stream ends early once `cancel` trips.
    fn scan(&self, mapping: &ResolvedMapping, cancel: &CancellationToken) -> GameStream;

    /// Rebuild a game from a legacy id.
    fn legacy_game_info(
        &self,
        game_id: &str,
        mapping: &EmulatorMapping,
    ) -> Result<GameInfo, IdentityError> {
        identity::decode_legacy(game_id, mapping)
    }

    /// Whether an uninstalled game's source artifact has disappeared.
    fn is_source_missing(&self, info: &GameInfo, mapping: &ResolvedMapping) -> bool;
}

/// Fields shared by every scanned game.
struct GameDraft {
    info: GameInfo,
    name: String,
    installed: Option<(String, Vec<GameRom>)>,
    install_size: Option<u64>,
    regions: Vec<String>,
}

impl GameDraft {
    fn build(self, mapping: &ResolvedMapping) -> Option<ScannedGame> {
        let game_id = match identity::encode(&self.info) {
            Ok(id) => id,
            Err(err) => {
                warn!("Skipping {}: {}", self.name, err);
                return None;
            }
        };
        let (install_directory, roms) = match self.installed {
            Some((dir, roms)) => (Some(dir), roms),
            None => (None, Vec::new()),
        };
        Some(ScannedGame {
            game_id,
            name: self.name,
            is_installed: install_directory.is_some(),
            install_directory,
            roms,
            install_size: self.install_size,
            platform: mapping.platform.name.clone(),
            regions: self.regions,
            play_action: PlayAction {
                name: mapping.play_action_name(),
                emulator_id: mapping.mapping.emulator_id,
                emulator_profile_id: mapping.mapping.emulator_profile_id.clone(),
            },
            info: Some(self.info),
        })
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
