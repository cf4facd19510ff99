//! Install and uninstall state machines.
//!
//! A [`KindInstaller`] does the kind-specific work; the controllers own the
//! background task, the cancellation token and every report to the host.

mod content;
mod files;

use std::{io, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    context::{LibraryContext, Severity},
    copy::CopyError,
    identity::IdentityError,
    models::{
        ContentId, GameInfo, GameRecord, GameRom, InstallationData, ResolvedMapping, RomKind,
    },
    paths::PathVariables,
    settings::ConfigError,
};

pub use content::ContentInstaller;
pub use files::FileInstaller;

/// Why an install or uninstall did not complete.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The game's mapping was removed from the settings.
    #[error("mapped emulator data for mapping {0} cannot be found, try removing and re-adding the game")]
    MappingMissing(Uuid),
    /// The mapping exists but does not resolve.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The game id does not decode.
    #[error(transparent)]
    Identity(#[from] IdentityError),
    /// The copy engine failed or was cancelled.
    #[error(transparent)]
    Copy(#[from] CopyError),
    /// The content cache has no source files for the title.
    #[error("title {0} is not present in the source cache")]
    ContentNotCached(ContentId),
    /// A content-store game was requested without a backend.
    #[error("no content store backend is configured")]
    NoContentBackend,
    /// The content store rejected an operation.
    #[error("content store failed: {0}")]
    Store(String),
    /// Removing an installed artifact failed.
    #[error("failed to remove {}: {io}", .path.display())]
    Remove {
        /// Artifact being removed.
        path: PathBuf,
        /// Original error.
        #[source]
        io: io::Error,
    },
    /// The background task panicked or was aborted.
    #[error("install task failed: {0}")]
    Task(String),
}

impl InstallError {
    /// Whether this is the silent cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, InstallError::Copy(err) if err.is_cancelled())
    }

    pub(crate) fn store(err: anyhow::Error) -> Self {
        InstallError::Store(format!("{err:#}"))
    }
}

/// Fail with the silent cancellation error once `cancel` has tripped.
pub(crate) fn ensure_running(cancel: &CancellationToken) -> Result<(), InstallError> {
    if cancel.is_cancelled() {
        return Err(CopyError::UserCancelled.into());
    }
    Ok(())
}

/// Where an install placed the game, as absolute paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledArtifact {
    /// Install directory.
    pub install_directory: PathBuf,
    /// `(display name, launchable file)` pairs.
    pub roms: Vec<(String, PathBuf)>,
}

impl InstalledArtifact {
    /// Host-ready form with the portable placeholder applied.
    pub fn to_installation_data(&self, paths: &PathVariables) -> InstallationData {
        InstallationData {
            install_directory: paths.collapse(&self.install_directory),
            roms: self
                .roms
                .iter()
                .map(|(name, path)| GameRom {
                    name: name.clone(),
                    path: paths.collapse(path),
                })
                .collect(),
        }
    }
}

/// How an uninstall ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallOutcome {
    /// The artifact was removed.
    Removed,
    /// Nothing was on disk; the game is marked uninstalled anyway.
    AlreadyMissing,
}

/// Kind-specific install work.
#[async_trait]
pub trait KindInstaller: Send + Sync {
    /// Kind handled by this installer.
    fn kind(&self) -> RomKind;

    /// Place the game's artifact under the mapping's destination.
    async fn install(
        &self,
        game: &GameRecord,
        info: &GameInfo,
        mapping: &ResolvedMapping,
        cancel: CancellationToken,
    ) -> Result<InstalledArtifact, InstallError>;

    /// Remove the recorded artifact. `mapping` is `None` when the mapping no
    /// longer resolves; file kinds only need the recorded paths. `cancel` is
    /// checked before each removal step.
    async fn uninstall(
        &self,
        game: &GameRecord,
        info: &GameInfo,
        mapping: Option<&ResolvedMapping>,
        cancel: CancellationToken,
    ) -> Result<UninstallOutcome, InstallError>;
}

/// `Idle → Installing → {Installed | Failed | Cancelled}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallState {
    /// Not started.
    Idle,
    /// Background task running.
    Installing,
    /// Reported to the host.
    Installed,
    /// Ended with the given error.
    Failed(String),
    /// Stopped by the user; nothing was reported as an error.
    Cancelled,
}

/// `Idle → Uninstalling → {Uninstalled | Failed | Cancelled}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallState {
    /// Not started.
    Idle,
    /// Background task running.
    Uninstalling,
    /// Reported to the host.
    Uninstalled,
    /// Ended with the given error.
    Failed(String),
    /// Stopped before anything was removed.
    Cancelled,
}

fn resolve_for(ctx: &LibraryContext, info: &GameInfo) -> Result<ResolvedMapping, InstallError> {
    let id = info.mapping_id();
    ctx.resolve_by_id(id).map_err(|err| match err {
        ConfigError::MappingNotFound(_) => InstallError::MappingMissing(id),
        other => InstallError::Config(other),
    })
}

async fn run_guarded<T, F>(job: F) -> Result<T, InstallError>
where
    T: Send + 'static,
    F: std::future::Future<Output = Result<T, InstallError>> + Send + 'static,
{
    match tokio::spawn(job).await {
        Ok(result) => result,
        Err(err) => Err(InstallError::Task(err.to_string())),
    }
}

/// Drives one background install. Dropping the controller cancels a running
/// install.
pub struct InstallController {
    game: GameRecord,
    info: GameInfo,
    installer: Arc<dyn KindInstaller>,
    ctx: Arc<LibraryContext>,
    state: Arc<RwLock<InstallState>>,
    cancel: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl InstallController {
    pub(crate) fn new(
        game: GameRecord,
        info: GameInfo,
        installer: Arc<dyn KindInstaller>,
        ctx: Arc<LibraryContext>,
    ) -> Self {
        Self {
            game,
            info,
            installer,
            ctx,
            state: Arc::new(RwLock::new(InstallState::Idle)),
            cancel: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Game being installed.
    pub fn game(&self) -> &GameRecord {
        &self.game
    }

    /// Current state.
    pub fn state(&self) -> InstallState {
        self.state.read().clone()
    }

    /// Start the install in the background.
    ///
    /// Fails immediately, after notifying the host, when the game's mapping
    /// cannot be resolved. Must be called inside a tokio runtime.
    pub fn install(&self) -> Result<(), InstallError> {
        let mapping = match resolve_for(&self.ctx, &self.info) {
            Ok(mapping) => mapping,
            Err(err) => {
                warn!(game = %self.game.name, "Cannot install: {}", err);
                self.ctx.host.notify(
                    &self.game.game_id,
                    &format!("Failed to install {}.\n\n{}", self.game.name, err),
                    Severity::Error,
                );
                *self.state.write() = InstallState::Failed(err.to_string());
                self.ctx.host.install_aborted(&self.game.game_id);
                return Err(err);
            }
        };

        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());
        *self.state.write() = InstallState::Installing;
        info!(
            game = %self.game.name,
            mapping = %mapping.id(),
            kind = %self.info.kind(),
            "Installing"
        );

        let game = self.game.clone();
        let info = self.info.clone();
        let installer = Arc::clone(&self.installer);
        let ctx = Arc::clone(&self.ctx);
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            let job_game = game.clone();
            let result = run_guarded(async move {
                installer.install(&job_game, &info, &mapping, token).await
            })
            .await;
            finish_install(&ctx, &game, &state, result);
        });
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Ask a running install to stop. The copy checks the token between chunks.
    pub fn cancel(&self) {
        if let Some(token) = self.cancel.lock().as_ref() {
            token.cancel();
        }
    }

    /// Wait for the background task and return the final state.
    pub async fn wait(&self) -> InstallState {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(game = %self.game.name, "Install task ended abnormally: {}", err);
            }
        }
        self.state()
    }
}

impl Drop for InstallController {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn finish_install(
    ctx: &LibraryContext,
    game: &GameRecord,
    state: &RwLock<InstallState>,
    result: Result<InstalledArtifact, InstallError>,
) {
    match result {
        Ok(artifact) => {
            info!(game = %game.name, dir = %artifact.install_directory.display(), "Installed");
            *state.write() = InstallState::Installed;
            if ctx.provider.notify_on_install_complete() {
                ctx.host.notify(
                    &game.game_id,
                    &format!("{} has been installed.", game.name),
                    Severity::Info,
                );
            }
            ctx.host
                .game_installed(&game.game_id, artifact.to_installation_data(&ctx.paths));
        }
        Err(err) if err.is_cancelled() => {
            info!(game = %game.name, "Install cancelled");
            *state.write() = InstallState::Cancelled;
            ctx.host.install_aborted(&game.game_id);
        }
        Err(err) => {
            warn!(game = %game.name, "Install failed: {}", err);
            ctx.host.notify(
                &game.game_id,
                &format!("Failed to install {}.\n\n{}", game.name, err),
                Severity::Error,
            );
            *state.write() = InstallState::Failed(err.to_string());
            ctx.host.install_aborted(&game.game_id);
        }
    }
}

/// Drives one background uninstall. Dropping the controller cancels a
/// running uninstall.
pub struct UninstallController {
    game: GameRecord,
    info: GameInfo,
    installer: Arc<dyn KindInstaller>,
    ctx: Arc<LibraryContext>,
    state: Arc<RwLock<UninstallState>>,
    cancel: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl UninstallController {
    pub(crate) fn new(
        game: GameRecord,
        info: GameInfo,
        installer: Arc<dyn KindInstaller>,
        ctx: Arc<LibraryContext>,
    ) -> Self {
        Self {
            game,
            info,
            installer,
            ctx,
            state: Arc::new(RwLock::new(UninstallState::Idle)),
            cancel: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Game being uninstalled.
    pub fn game(&self) -> &GameRecord {
        &self.game
    }

    /// Current state.
    pub fn state(&self) -> UninstallState {
        self.state.read().clone()
    }

    /// Start the uninstall in the background. Must be called inside a tokio
    /// runtime.
    pub fn uninstall(&self) {
        *self.state.write() = UninstallState::Uninstalling;
        let mapping = match resolve_for(&self.ctx, &self.info) {
            Ok(mapping) => Some(mapping),
            Err(err) => {
                warn!(game = %self.game.name, "Uninstalling without mapping: {}", err);
                None
            }
        };
        info!(game = %self.game.name, kind = %self.info.kind(), "Uninstalling");

        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());
        let game = self.game.clone();
        let info = self.info.clone();
        let installer = Arc::clone(&self.installer);
        let ctx = Arc::clone(&self.ctx);
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            let job_game = game.clone();
            let result = run_guarded(async move {
                installer
                    .uninstall(&job_game, &info, mapping.as_ref(), token)
                    .await
            })
            .await;
            finish_uninstall(&ctx, &game, &state, result);
        });
        *self.task.lock() = Some(handle);
    }

    /// Ask a running uninstall to stop before its next removal step.
    pub fn cancel(&self) {
        if let Some(token) = self.cancel.lock().as_ref() {
            token.cancel();
        }
    }

    /// Wait for the background task and return the final state.
    pub async fn wait(&self) -> UninstallState {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(game = %self.game.name, "Uninstall task ended abnormally: {}", err);
            }
        }
        self.state()
    }
}

impl Drop for UninstallController {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn finish_uninstall(
    ctx: &LibraryContext,
    game: &GameRecord,
    state: &RwLock<UninstallState>,
    result: Result<UninstallOutcome, InstallError>,
) {
    match result {
        Ok(outcome) => {
            if outcome == UninstallOutcome::AlreadyMissing {
                warn!(game = %game.name, "Artifact already missing, marking as uninstalled");
                ctx.host.notify(
                    &game.game_id,
                    &format!(
                        "{} does not appear to be installed. Marking as uninstalled.",
                        game.name
                    ),
                    Severity::Info,
                );
            } else {
                info!(game = %game.name, "Uninstalled");
            }
            *state.write() = UninstallState::Uninstalled;
            ctx.host.game_uninstalled(&game.game_id);
        }
        Err(err) if err.is_cancelled() => {
            info!(game = %game.name, "Uninstall cancelled");
            *state.write() = UninstallState::Cancelled;
            ctx.host.uninstall_aborted(&game.game_id);
        }
        Err(err) => {
            warn!(game = %game.name, "Uninstall failed: {}", err);
            ctx.host.notify(
                &game.game_id,
                &format!("Failed to uninstall {}.\n\n{}", game.name, err),
                Severity::Error,
            );
            *state.write() = UninstallState::Failed(err.to_string());
            ctx.host.uninstall_aborted(&game.game_id);
        }
    }
}
