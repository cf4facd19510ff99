//! Collaborators handed to every component at construction.

use std::{path::PathBuf, sync::Arc};

use uuid::Uuid;

use crate::{
    cache::CacheRegistry,
    content::ContentBackend,
    copy::{LoggingDialog, ProgressDialog},
    models::{EmulatorMapping, InstallationData, ResolvedMapping},
    paths::PathVariables,
    settings::{self, ConfigError, MappingProvider},
};

/// Importance of a host notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational.
    Info,
    /// Something failed.
    Error,
}

/// Callbacks into the host application.
pub trait HostEvents: Send + Sync {
    /// Show a message about a game.
    fn notify(&self, game_id: &str, message: &str, severity: Severity);

    /// An install finished; `data` carries host-ready paths.
    fn game_installed(&self, game_id: &str, data: InstallationData);

    /// An uninstall finished.
    fn game_uninstalled(&self, game_id: &str);

    /// An install ended without success; the game is no longer installing.
    fn install_aborted(&self, game_id: &str);

    /// An uninstall was cancelled or failed; the game is still installed.
    fn uninstall_aborted(&self, game_id: &str);
}

/// Shared dependencies of scanners and controllers.
pub struct LibraryContext {
    /// Settings and mappings.
    pub provider: Arc<dyn MappingProvider>,
    /// Notification sink.
    pub host: Arc<dyn HostEvents>,
    /// Portable-mode substitution.
    pub paths: PathVariables,
    /// Per-mapping content caches.
    pub caches: Arc<CacheRegistry>,
    /// Progress UI for the dialog copy strategy.
    pub dialog: Arc<dyn ProgressDialog>,
    /// Backend for content-store mappings; those are skipped without one.
    pub content: Option<ContentBackend>,
}

impl LibraryContext {
    /// Context with a logging progress dialog and the sidecar content backend.
    pub fn new(
        provider: Arc<dyn MappingProvider>,
        host: Arc<dyn HostEvents>,
        paths: PathVariables,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            provider,
            host,
            paths,
            caches: Arc::new(CacheRegistry::new(cache_dir)),
            dialog: Arc::new(LoggingDialog),
            content: Some(ContentBackend::sidecar()),
        }
    }

    /// Replace the progress dialog used by the dialog copy strategy.
    pub fn with_dialog(mut self, dialog: Arc<dyn ProgressDialog>) -> Self {
        self.dialog = dialog;
        self
    }

    /// Replace (or remove) the content-store backend.
    pub fn with_content_backend(mut self, content: Option<ContentBackend>) -> Self {
        self.content = content;
        self
    }

    /// Resolve `mapping` against the provider.
    pub fn resolve(&self, mapping: &EmulatorMapping) -> Result<ResolvedMapping, ConfigError> {
        settings::resolve(self.provider.as_ref(), mapping, &self.paths)
    }

    /// Resolve the mapping with id `id`.
    pub fn resolve_by_id(&self, id: Uuid) -> Result<ResolvedMapping, ConfigError> {
        settings::resolve_by_id(self.provider.as_ref(), id, &self.paths)
    }
}
