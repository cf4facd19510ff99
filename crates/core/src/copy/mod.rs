//! Copy engine used by file-based installers.
//!
//! Two strategies implement [`FileCopier`]: [`DirectCopier`] streams files in
//! fixed-size chunks, [`DialogCopier`] reports progress to a
//! [`ProgressDialog`] and rolls back whatever it created when the copy is
//! abandoned.

mod dialog;
mod direct;

use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

pub use dialog::{DialogCopier, DialogResponse, LoggingDialog, ProgressDialog};
pub use direct::DirectCopier;

/// Bytes moved per read/write call.
pub const CHUNK_SIZE: usize = 81_920;

/// Why a copy did not complete.
#[derive(Debug, Error)]
pub enum CopyError {
    /// Source path is empty or does not exist.
    #[error("copy source {} does not exist", .0.display())]
    SourceMissing(PathBuf),
    /// Destination path is empty or is not a directory.
    #[error("copy destination {} is not a usable directory", .0.display())]
    DestinationInvalid(PathBuf),
    /// The user or the caller's token stopped the copy. Not a failure.
    #[error("copy was cancelled by the user")]
    UserCancelled,
    /// Underlying I/O fault.
    #[error("failed to copy {} to {}: {io}", .from.display(), .to.display())]
    CopyFailed {
        /// Path being read.
        from: PathBuf,
        /// Path being written.
        to: PathBuf,
        /// Original error.
        #[source]
        io: io::Error,
    },
}

impl CopyError {
    /// Whether this is the silent cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CopyError::UserCancelled)
    }

    fn io(from: &Path, to: &Path, io: io::Error) -> Self {
        CopyError::CopyFailed {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            io,
        }
    }
}

/// A copy strategy. `destination` is always a directory; the source is placed
/// inside it under its own name and the created path is returned.
pub trait FileCopier: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Run the copy on the current thread.
    fn copy_blocking(
        &self,
        source: &Path,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, CopyError>;
}

/// Run `copier` on the blocking pool.
pub async fn copy(
    copier: Arc<dyn FileCopier>,
    source: PathBuf,
    destination: PathBuf,
    cancel: CancellationToken,
) -> Result<PathBuf, CopyError> {
    let (from, to) = (source.clone(), destination.clone());
    tokio::task::spawn_blocking(move || copier.copy_blocking(&source, &destination, &cancel))
        .await
        .map_err(|err| CopyError::io(&from, &to, io::Error::other(err.to_string())))?
}

/// Pick the strategy for the current UI preference.
pub fn select_copier(use_dialog: bool, dialog: &Arc<dyn ProgressDialog>) -> Arc<dyn FileCopier> {
    if use_dialog {
        Arc::new(DialogCopier::new(Arc::clone(dialog)))
    } else {
        Arc::new(DirectCopier)
    }
}

/// Check preconditions, create `destination` and return the target path.
fn prepare(source: &Path, destination: &Path) -> Result<PathBuf, CopyError> {
    if source.as_os_str().is_empty() || !source.exists() {
        return Err(CopyError::SourceMissing(source.to_path_buf()));
    }
    if destination.as_os_str().is_empty() || destination.is_file() {
        return Err(CopyError::DestinationInvalid(destination.to_path_buf()));
    }
    let name = source
        .file_name()
        .ok_or_else(|| CopyError::SourceMissing(source.to_path_buf()))?;
    fs::create_dir_all(destination).map_err(|io| CopyError::io(source, destination, io))?;
    Ok(destination.join(name))
}

/// Copy a file or a whole tree to `target`.
///
/// `on_chunk` sees the size of every written chunk; returning `false` stops
/// the copy with [`CopyError::UserCancelled`].
fn copy_entry(
    source: &Path,
    target: &Path,
    cancel: &CancellationToken,
    on_chunk: &mut dyn FnMut(u64) -> bool,
) -> Result<(), CopyError> {
    if source.is_dir() {
        copy_tree(source, target, cancel, on_chunk)
    } else {
        if cancel.is_cancelled() {
            return Err(CopyError::UserCancelled);
        }
        copy_file_chunked(source, target, on_chunk)
    }
}

fn copy_tree(
    source: &Path,
    target: &Path,
    cancel: &CancellationToken,
    on_chunk: &mut dyn FnMut(u64) -> bool,
) -> Result<(), CopyError> {
    for entry in WalkDir::new(source).sort_by_file_name() {
        if cancel.is_cancelled() {
            return Err(CopyError::UserCancelled);
        }
        let entry = entry.map_err(|err| {
            let from = err.path().unwrap_or(source).to_path_buf();
            CopyError::io(&from, target, err.into())
        })?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let dest = target.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).map_err(|io| CopyError::io(entry.path(), &dest, io))?;
        } else {
            copy_file_chunked(entry.path(), &dest, on_chunk)?;
        }
    }
    Ok(())
}

fn copy_file_chunked(
    from: &Path,
    to: &Path,
    on_chunk: &mut dyn FnMut(u64) -> bool,
) -> Result<(), CopyError> {
    let failed = |io: io::Error| CopyError::io(from, to, io);
    let mut reader = File::open(from).map_err(failed)?;
    let mut writer = File::create(to).map_err(failed)?;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = reader.read(&mut buffer).map_err(failed)?;
        if read == 0 {
            break;
        }
        writer.write_all(&buffer[..read]).map_err(failed)?;
        if !on_chunk(read as u64) {
            return Err(CopyError::UserCancelled);
        }
    }
    writer.flush().map_err(failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn preconditions_are_checked() -> Result<()> {
        let dir = tempdir()?;
        let file = dir.path().join("a.nes");
        fs::write(&file, b"rom")?;

        assert!(matches!(
            prepare(&dir.path().join("missing.nes"), dir.path()),
            Err(CopyError::SourceMissing(_))
        ));
        assert!(matches!(
            prepare(Path::new(""), dir.path()),
            Err(CopyError::SourceMissing(_))
        ));
        assert!(matches!(
            prepare(&file, Path::new("")),
            Err(CopyError::DestinationInvalid(_))
        ));
        assert!(matches!(
            prepare(&file, &file),
            Err(CopyError::DestinationInvalid(_))
        ));

        let dest = dir.path().join("new").join("dest");
        assert_eq!(prepare(&file, &dest)?, dest.join("a.nes"));
        assert!(dest.is_dir());
        Ok(())
    }

    #[test]
    fn strategy_follows_preference() {
        let dialog: Arc<dyn ProgressDialog> = Arc::new(LoggingDialog);
        assert_eq!(select_copier(true, &dialog).name(), "dialog");
        assert_eq!(select_copier(false, &dialog).name(), "direct");
    }

    #[tokio::test]
    async fn async_copy_runs_on_blocking_pool() -> Result<()> {
        let dir = tempdir()?;
        let source = dir.path().join("Mario.nes");
        fs::write(&source, vec![7u8; CHUNK_SIZE * 2 + 5])?;
        let dest = dir.path().join("roms");

        let copied = copy(
            Arc::new(DirectCopier),
            source.clone(),
            dest.clone(),
            CancellationToken::new(),
        )
        .await?;
        assert_eq!(copied, dest.join("Mario.nes"));
        assert_eq!(fs::read(&copied)?, fs::read(&source)?);
        Ok(())
    }
}
