use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ensure_running, InstallError, InstalledArtifact, KindInstaller, UninstallOutcome};
use crate::{
    cache::{CacheRegistry, InstalledEntry, SourceDirCache, UninstalledEntry},
    content::ContentBackend,
    copy::CopyError,
    identity::IdentityError,
    models::{ContentStoreInfo, GameInfo, GameRecord, ResolvedMapping, RomKind},
    paths::join_slash,
};

/// Registers content-store titles into the emulator's store.
pub struct ContentInstaller {
    caches: Arc<CacheRegistry>,
    backend: ContentBackend,
}

impl ContentInstaller {
    /// Share `caches` with the content scanner.
    pub fn new(caches: Arc<CacheRegistry>, backend: ContentBackend) -> Self {
        Self { caches, backend }
    }
}

fn content_info(info: &GameInfo) -> Result<&ContentStoreInfo, InstallError> {
    match info {
        GameInfo::ContentStore(info) => Ok(info),
        other => Err(InstallError::Identity(IdentityError::KindMismatch {
            expected: RomKind::ContentStore,
            found: other.kind(),
        })),
    }
}

fn save_cache(cache: &SourceDirCache) {
    if let Err(err) = cache.save() {
        warn!(mapping = %cache.mapping_id(), "Failed to save source cache: {:#}", err);
    }
}

/// Blocking part of an install: register every file of `entry`.
fn register(
    backend: &ContentBackend,
    cache: &SourceDirCache,
    mapping: &ResolvedMapping,
    entry: UninstalledEntry,
    cancel: &CancellationToken,
) -> Result<InstalledArtifact, InstallError> {
    let root = &mapping.destination;
    let id = entry.content_id;
    for file in entry.files() {
        if cancel.is_cancelled() {
            if let Err(err) = backend.store.uninstall(root, id) {
                warn!(content_id = %id, "Failed to roll back cancelled install: {:#}", err);
            }
            return Err(CopyError::UserCancelled.into());
        }
        debug!(content_id = %id, file = %file.display(), "Registering");
        backend
            .store
            .install_file(root, &file)
            .map_err(InstallError::store)?;
    }

    let sub_path = backend
        .store
        .launch_sub_path(root, id)
        .map_err(InstallError::store)?;
    let version = entry
        .update_file
        .as_deref()
        .and_then(|update| backend.inspector.inspect(update).ok().flatten())
        .map(|update| update.display_version)
        .unwrap_or_else(|| entry.version.clone());

    let launch = join_slash(root, &sub_path);
    cache.record_installed(InstalledEntry {
        content_id: id,
        title: entry.title.clone(),
        publisher: entry.publisher,
        version,
        sub_path,
    });
    save_cache(cache);
    info!(content_id = %id, title = %entry.title, "Registered title");

    Ok(InstalledArtifact {
        install_directory: root.clone(),
        roms: vec![(entry.title, launch)],
    })
}

#[async_trait]
impl KindInstaller for ContentInstaller {
    fn kind(&self) -> RomKind {
        RomKind::ContentStore
    }

    async fn install(
        &self,
        _game: &GameRecord,
        info: &GameInfo,
        mapping: &ResolvedMapping,
        cancel: CancellationToken,
    ) -> Result<InstalledArtifact, InstallError> {
        let id = content_info(info)?.content_id;
        let cache = self.caches.for_mapping(mapping.id());
        let backend = self.backend.clone();
        let mapping = mapping.clone();

        tokio::task::spawn_blocking(move || -> Result<InstalledArtifact, InstallError> {
            if cache.is_dirty()
                && cache.refresh(
                    &mapping.destination,
                    mapping.source(),
                    backend.inspector.as_ref(),
                    &cancel,
                )
            {
                save_cache(&cache);
            }
            ensure_running(&cancel)?;
            let entry = cache
                .uninstalled(id)
                .ok_or(InstallError::ContentNotCached(id))?;
            register(&backend, &cache, &mapping, entry, &cancel)
        })
        .await
        .map_err(|err| InstallError::Task(err.to_string()))?
    }

    async fn uninstall(
        &self,
        _game: &GameRecord,
        info: &GameInfo,
        mapping: Option<&ResolvedMapping>,
        cancel: CancellationToken,
    ) -> Result<UninstallOutcome, InstallError> {
        let info = content_info(info)?;
        let mapping = mapping.ok_or(InstallError::MappingMissing(info.mapping_id))?;
        let id = info.content_id;
        let cache = self.caches.for_mapping(mapping.id());
        let backend = self.backend.clone();
        let root = mapping.destination.clone();

        tokio::task::spawn_blocking(move || -> Result<UninstallOutcome, InstallError> {
            ensure_running(&cancel)?;
            let removed = backend
                .store
                .uninstall(&root, id)
                .map_err(InstallError::store)?;
            let cached = cache.remove_installed(id).is_some();
            if cached {
                save_cache(&cache);
            }
            Ok(if removed {
                UninstallOutcome::Removed
            } else {
                UninstallOutcome::AlreadyMissing
            })
        })
        .await
        .map_err(|err| InstallError::Task(err.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        content::{
            tests::{program, write_content},
            ContentRole,
        },
        models::ContentId,
    };
    use anyhow::Result;
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        caches: Arc<CacheRegistry>,
        mapping: ResolvedMapping,
        installer: ContentInstaller,
    }

    fn fixture() -> Result<Fixture> {
        let dir = tempdir()?;
        let source = dir.path().join("source");
        let store = dir.path().join("store");
        let mut update = program(0x100, "Zelda");
        update.content_id = ContentId(0x800);
        update.role = ContentRole::Update;
        update.version = 2;
        update.display_version = "1.2.0".to_string();
        write_content(&source, "zelda.nsp", &program(0x100, "Zelda"))?;
        write_content(&source, "zelda-update.nsp", &update)?;

        let caches = Arc::new(CacheRegistry::new(dir.path().join("cache")));
        let mapping = ResolvedMapping::fixture(RomKind::ContentStore, &source, &store, &[]);
        let installer = ContentInstaller::new(Arc::clone(&caches), ContentBackend::sidecar());
        Ok(Fixture {
            _dir: dir,
            caches,
            mapping,
            installer,
        })
    }

    fn info(mapping: &ResolvedMapping, id: u64) -> GameInfo {
        GameInfo::ContentStore(ContentStoreInfo {
            mapping_id: mapping.id(),
            content_id: ContentId(id),
        })
    }

    #[tokio::test]
    async fn install_registers_title_and_updates_cache() -> Result<()> {
        let fx = fixture()?;
        let info = info(&fx.mapping, 0x100);
        let artifact = fx
            .installer
            .install(&GameRecord::default(), &info, &fx.mapping, CancellationToken::new())
            .await?;

        let title_dir = fx.mapping.destination.join("0000000000000100");
        assert!(title_dir.join("zelda.nsp").is_file());
        assert!(title_dir.join("zelda-update.nsp").is_file());
        assert_eq!(artifact.roms[0].0, "Zelda");
        assert_eq!(artifact.roms[0].1, title_dir.join("zelda.nsp"));

        let cache = fx.caches.for_mapping(fx.mapping.id());
        let entry = cache.installed(ContentId(0x100)).expect("cached");
        assert_eq!(entry.version, "1.2.0");
        assert_eq!(entry.sub_path, "0000000000000100/zelda.nsp");

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let err = fx
            .installer
            .uninstall(&GameRecord::default(), &info, Some(&fx.mapping), cancelled)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(title_dir.is_dir());
        assert!(cache.installed(ContentId(0x100)).is_some());

        let outcome = fx
            .installer
            .uninstall(
                &GameRecord::default(),
                &info,
                Some(&fx.mapping),
                CancellationToken::new(),
            )
            .await?;
        assert_eq!(outcome, UninstallOutcome::Removed);
        assert!(!title_dir.exists());
        assert!(cache.installed(ContentId(0x100)).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_title_is_not_installed() -> Result<()> {
        let fx = fixture()?;
        let err = fx
            .installer
            .install(
                &GameRecord::default(),
                &info(&fx.mapping, 0x999),
                &fx.mapping,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::ContentNotCached(ContentId(0x999))));
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_install_is_silent_and_leaves_nothing() -> Result<()> {
        let fx = fixture()?;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = fx
            .installer
            .install(&GameRecord::default(), &info(&fx.mapping, 0x100), &fx.mapping, cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!fx.mapping.destination.join("0000000000000100").exists());
        Ok(())
    }

    #[tokio::test]
    async fn uninstall_of_absent_title_self_heals() -> Result<()> {
        let fx = fixture()?;
        let info = info(&fx.mapping, 0x100);
        let outcome = fx
            .installer
            .uninstall(
                &GameRecord::default(),
                &info,
                Some(&fx.mapping),
                CancellationToken::new(),
            )
            .await?;
        assert_eq!(outcome, UninstallOutcome::AlreadyMissing);

        let err = fx
            .installer
            .uninstall(&GameRecord::default(), &info, None, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::MappingMissing(_)));
        Ok(())
    }
}
