//! Host-facing entry point tying mappings, scanners and controllers together.

use std::{collections::HashMap, fmt::Write as _, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    context::LibraryContext,
    identity::{self, IdentityError},
    install::{InstallController, InstallError, UninstallController},
    models::{GameInfo, GameRecord, PlayAction, RomKind},
    registry::{self, KindHandlers},
    scanner::GameStream,
    settings::AppMode,
};

/// A host game whose id predates versioned tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyGame {
    /// Stored id.
    pub game_id: String,
    /// Play action, used to find the owning mapping.
    #[serde(default)]
    pub play_action: Option<PlayAction>,
}

/// A legacy id and its replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMigration {
    /// Id the host has stored.
    pub old_id: String,
    /// Versioned token to store instead.
    pub new_id: String,
}

/// The game library over every configured mapping.
pub struct Library {
    ctx: Arc<LibraryContext>,
    handlers: HashMap<RomKind, KindHandlers>,
}

impl Library {
    /// Build scanners and installers for every kind the context supports.
    pub fn new(ctx: Arc<LibraryContext>) -> Self {
        let handlers = registry::build_handlers(&ctx).into_iter().collect();
        Self { ctx, handlers }
    }

    /// Shared context.
    pub fn context(&self) -> &Arc<LibraryContext> {
        &self.ctx
    }

    /// Lazily scan every enabled mapping.
    ///
    /// Mappings that do not resolve, or whose kind has no handler, are skipped
    /// with a warning.
    pub fn games(&self, cancel: &CancellationToken) -> GameStream {
        let provider = &self.ctx.provider;
        if provider.app_mode() == AppMode::Fullscreen && !provider.scan_games_in_fullscreen() {
            debug!("Skipping scan in fullscreen mode");
            return Box::new(std::iter::empty());
        }

        let mut streams: Vec<GameStream> = Vec::new();
        for mapping in provider.mappings().into_iter().filter(|m| m.enabled) {
            if cancel.is_cancelled() {
                break;
            }
            let resolved = match self.ctx.resolve(&mapping) {
                Ok(resolved) => resolved,
                Err(err) => {
                    warn!(mapping = %mapping.mapping_id, "Skipping mapping: {}", err);
                    continue;
                }
            };
            let Some(handlers) = self.handlers.get(&mapping.rom_kind) else {
                warn!(
                    mapping = %mapping.mapping_id,
                    kind = %mapping.rom_kind,
                    "Skipping mapping: kind not supported"
                );
                continue;
            };
            info!(
                mapping = %mapping.mapping_id,
                kind = %mapping.rom_kind,
                source = %mapping.source_path.display(),
                "Scanning"
            );
            streams.push(handlers.scanner.scan(&resolved, cancel));
        }
        Box::new(streams.into_iter().flatten())
    }

    fn handlers_for(&self, info: &GameInfo) -> Result<&KindHandlers, InstallError> {
        match self.handlers.get(&info.kind()) {
            Some(handlers) => Ok(handlers),
            None if info.kind() == RomKind::ContentStore => Err(InstallError::NoContentBackend),
            None => Err(IdentityError::UnregisteredKind(info.kind()).into()),
        }
    }

    /// Install controller for `game`.
    pub fn install_controller(&self, game: &GameRecord) -> Result<InstallController, InstallError> {
        let info = identity::decode(&game.game_id)?;
        let installer = Arc::clone(&self.handlers_for(&info)?.installer);
        Ok(InstallController::new(
            game.clone(),
            info,
            installer,
            Arc::clone(&self.ctx),
        ))
    }

    /// Uninstall controller for `game`.
    pub fn uninstall_controller(
        &self,
        game: &GameRecord,
    ) -> Result<UninstallController, InstallError> {
        let info = identity::decode(&game.game_id)?;
        let installer = Arc::clone(&self.handlers_for(&info)?.installer);
        Ok(UninstallController::new(
            game.clone(),
            info,
            installer,
            Arc::clone(&self.ctx),
        ))
    }

    /// Convert legacy ids to versioned tokens.
    ///
    /// The owning mapping is the one whose emulator and profile match the
    /// game's play action. Games that cannot be converted are left out.
    pub fn migrate_legacy_ids(&self, games: &[LegacyGame]) -> Vec<IdMigration> {
        let legacy: Vec<_> = games
            .iter()
            .filter(|game| !identity::is_versioned(&game.game_id))
            .collect();
        if legacy.is_empty() {
            return Vec::new();
        }
        info!(count = legacy.len(), "Updating games to the versioned id format");

        let mappings = self.ctx.provider.mappings();
        legacy
            .into_iter()
            .filter_map(|game| {
                let action = game.play_action.as_ref()?;
                let mapping = mappings.iter().find(|m| {
                    m.emulator_id == action.emulator_id
                        && m.emulator_profile_id == action.emulator_profile_id
                })?;
                let handlers = self.handlers.get(&mapping.rom_kind)?;
                let converted = handlers
                    .scanner
                    .legacy_game_info(&game.game_id, mapping)
                    .and_then(|info| identity::encode(&info));
                match converted {
                    Ok(new_id) => Some(IdMigration {
                        old_id: game.game_id.clone(),
                        new_id,
                    }),
                    Err(err) => {
                        warn!("Skipping {}: {}", game.game_id, err);
                        None
                    }
                }
            })
            .collect()
    }

    /// Uninstalled games whose source artifact no longer exists.
    pub fn games_missing_source(
        &self,
        games: &[GameRecord],
        cancel: &CancellationToken,
    ) -> Vec<GameRecord> {
        games
            .iter()
            .take_while(|_| !cancel.is_cancelled())
            .filter(|game| !game.is_installed)
            .filter(|game| {
                let Ok(info) = identity::decode(&game.game_id) else {
                    return false;
                };
                let Some(handlers) = self.handlers.get(&info.kind()) else {
                    return false;
                };
                match self.ctx.resolve_by_id(info.mapping_id()) {
                    Ok(mapping) => handlers.scanner.is_source_missing(&info, &mapping),
                    Err(err) => {
                        debug!(game = %game.name, "Cannot check source: {}", err);
                        false
                    }
                }
            })
            .cloned()
            .collect()
    }

    /// Multi-line troubleshooting description of `game`'s decoded id.
    pub fn describe(&self, game: &GameRecord) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Game: {}", game.name);
        let info = match identity::decode(&game.game_id) {
            Ok(info) => info,
            Err(err) => {
                let _ = writeln!(out, "GameId: {}", game.game_id);
                let _ = writeln!(out, "Error: {}", err.user_message());
                return out;
            }
        };

        let kind = info.kind();
        let tag = registry::tag_for_kind(kind).unwrap_or_default();
        let _ = writeln!(out, "RomKind: {kind} ({tag})");
        let _ = writeln!(out, "MappingId: {}", info.mapping_id());
        for line in info.description_lines() {
            let _ = writeln!(out, "{line}");
        }

        if let Some(mapping) = self.ctx.provider.mapping(info.mapping_id()) {
            let _ = writeln!(out);
            let _ = writeln!(out, "Mapping Info:");
            for line in mapping.description_lines() {
                let _ = writeln!(out, "    {line}");
            }
        }
        out
    }
}
