use std::{fs, io, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ensure_running, InstallError, InstalledArtifact, KindInstaller, UninstallOutcome};
use crate::{
    copy::{self, ProgressDialog},
    identity::IdentityError,
    models::{GameInfo, GameRecord, ResolvedMapping, RomKind},
    paths::{join_slash, PathVariables},
    settings::MappingProvider,
};

/// Copies single files or bundle directories into the destination.
pub struct FileInstaller {
    kind: RomKind,
    provider: Arc<dyn MappingProvider>,
    dialog: Arc<dyn ProgressDialog>,
    paths: PathVariables,
}

impl FileInstaller {
    /// Installer for `kind`, which must be a file kind.
    pub fn new(
        kind: RomKind,
        provider: Arc<dyn MappingProvider>,
        dialog: Arc<dyn ProgressDialog>,
        paths: PathVariables,
    ) -> Self {
        Self {
            kind,
            provider,
            dialog,
            paths,
        }
    }

    fn mismatch(&self, info: &GameInfo) -> InstallError {
        InstallError::Identity(IdentityError::KindMismatch {
            expected: self.kind,
            found: info.kind(),
        })
    }

    fn recorded_rom(&self, game: &GameRecord) -> Option<PathBuf> {
        game.roms.first().map(|rom| self.paths.expand(&rom.path))
    }
}

/// Launch file path inside its bundle.
fn path_in_bundle(source_file_path: &str, source_base_dir: &str) -> String {
    let base = source_base_dir.trim_end_matches('/');
    source_file_path
        .strip_prefix(base)
        .map(|rest| rest.trim_start_matches('/'))
        .filter(|rest| !rest.is_empty() && !base.is_empty())
        .unwrap_or(source_file_path)
        .to_string()
}

fn remove(path: PathBuf, result: io::Result<()>) -> Result<UninstallOutcome, InstallError> {
    match result {
        Ok(()) => Ok(UninstallOutcome::Removed),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(UninstallOutcome::AlreadyMissing),
        Err(io) => Err(InstallError::Remove { path, io }),
    }
}

#[async_trait]
impl KindInstaller for FileInstaller {
    fn kind(&self) -> RomKind {
        self.kind
    }

    async fn install(
        &self,
        game: &GameRecord,
        info: &GameInfo,
        mapping: &ResolvedMapping,
        cancel: CancellationToken,
    ) -> Result<InstalledArtifact, InstallError> {
        let source = match (self.kind, info) {
            (RomKind::SingleFile, GameInfo::SingleFile(info)) => {
                join_slash(mapping.source(), &info.source_path)
            }
            (RomKind::MultiFile, GameInfo::MultiFile(info)) => {
                join_slash(mapping.source(), &info.source_base_dir)
            }
            _ => return Err(self.mismatch(info)),
        };

        let copier = copy::select_copier(self.provider.use_copy_dialog(), &self.dialog);
        debug!(
            strategy = copier.name(),
            from = %source.display(),
            to = %mapping.destination.display(),
            "Copying"
        );
        let target = copy::copy(copier, source, mapping.destination.clone(), cancel).await?;

        let artifact = match info {
            GameInfo::MultiFile(info) => {
                let launch = join_slash(
                    &target,
                    &path_in_bundle(&info.source_file_path, &info.source_base_dir),
                );
                InstalledArtifact {
                    install_directory: target,
                    roms: vec![(game.name.clone(), launch)],
                }
            }
            _ => InstalledArtifact {
                install_directory: mapping.destination.clone(),
                roms: vec![(game.name.clone(), target)],
            },
        };
        Ok(artifact)
    }

    async fn uninstall(
        &self,
        game: &GameRecord,
        info: &GameInfo,
        _mapping: Option<&ResolvedMapping>,
        cancel: CancellationToken,
    ) -> Result<UninstallOutcome, InstallError> {
        if info.kind() != self.kind {
            return Err(self.mismatch(info));
        }
        ensure_running(&cancel)?;
        let Some(rom) = self.recorded_rom(game) else {
            return Ok(UninstallOutcome::AlreadyMissing);
        };
        if !rom.is_file() {
            return Ok(UninstallOutcome::AlreadyMissing);
        }

        match self.kind {
            RomKind::MultiFile => {
                let bundle = match &game.install_directory {
                    Some(dir) => self.paths.expand(dir),
                    None => return Ok(UninstallOutcome::AlreadyMissing),
                };
                ensure_running(&cancel)?;
                let result = fs::remove_dir_all(&bundle);
                remove(bundle, result)
            }
            _ => {
                ensure_running(&cancel)?;
                let result = fs::remove_file(&rom);
                remove(rom, result)
            }
        }
    }
}
