use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{copy_entry, prepare, CopyError, FileCopier};
use crate::paths::tree_size;

/// What the user chose after a progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogResponse {
    /// Keep copying.
    Continue,
    /// Close the dialog and abandon the copy.
    Cancel,
}

/// Progress UI shown while a [`DialogCopier`] runs.
pub trait ProgressDialog: Send + Sync {
    /// Copy is about to start.
    fn begin(&self, source: &Path, target: &Path, total_bytes: u64);
    /// Called after each chunk.
    fn update(&self, copied_bytes: u64, total_bytes: u64) -> DialogResponse;
    /// Copy ended; `completed` is false after cancellation or failure.
    fn finish(&self, completed: bool);
}

/// Headless dialog that reports progress to the log and never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDialog;

impl ProgressDialog for LoggingDialog {
    fn begin(&self, source: &Path, target: &Path, total_bytes: u64) {
        info!(
            source = %source.display(),
            target = %target.display(),
            total_bytes,
            "Copying"
        );
    }

    fn update(&self, copied_bytes: u64, total_bytes: u64) -> DialogResponse {
        debug!(copied_bytes, total_bytes, "Copy progress");
        DialogResponse::Continue
    }

    fn finish(&self, completed: bool) {
        info!(completed, "Copy finished");
    }
}

/// Copies with visible progress. Anything it created is removed again when
/// the dialog is closed, the token trips or an I/O error occurs.
pub struct DialogCopier {
    dialog: Arc<dyn ProgressDialog>,
}

impl DialogCopier {
    /// Report progress to `dialog`.
    pub fn new(dialog: Arc<dyn ProgressDialog>) -> Self {
        Self { dialog }
    }
}

impl FileCopier for DialogCopier {
    fn name(&self) -> &'static str {
        "dialog"
    }

    fn copy_blocking(
        &self,
        source: &Path,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, CopyError> {
        let target = prepare(source, destination)?;
        let total = tree_size(source);
        self.dialog.begin(source, &target, total);

        let mut copied = 0u64;
        let mut on_chunk = |bytes: u64| {
            copied += bytes;
            !cancel.is_cancelled() && self.dialog.update(copied, total) == DialogResponse::Continue
        };

        match copy_entry(source, &target, cancel, &mut on_chunk) {
            Ok(()) => {
                self.dialog.finish(true);
                Ok(target)
            }
            Err(err) => {
                self.dialog.finish(false);
                remove_partial(&target, destination);
                Err(err)
            }
        }
    }
}

/// Best-effort removal of `target` and of `destination` if it is left empty.
fn remove_partial(target: &Path, destination: &Path) {
    let removed = if target.is_dir() {
        fs::remove_dir_all(target)
    } else if target.exists() {
        fs::remove_file(target)
    } else {
        Ok(())
    };
    if let Err(err) = removed {
        warn!("Failed to remove partial copy {}: {}", target.display(), err);
    }

    let is_empty = fs::read_dir(destination)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);
    if is_empty {
        if let Err(err) = fs::remove_dir(destination) {
            warn!("Failed to remove empty {}: {}", destination.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy::CHUNK_SIZE;
    use anyhow::Result;
    use parking_lot::Mutex;
    use tempfile::tempdir;

    /// Cancels once `cancel_after` updates have been seen.
    struct ScriptedDialog {
        cancel_after: usize,
        updates: Mutex<usize>,
        finished: Mutex<Option<bool>>,
    }

    impl ScriptedDialog {
        fn new(cancel_after: usize) -> Self {
            Self {
                cancel_after,
                updates: Mutex::new(0),
                finished: Mutex::new(None),
            }
        }
    }

    impl ProgressDialog for ScriptedDialog {
        fn begin(&self, _: &Path, _: &Path, _: u64) {}

        fn update(&self, _: u64, _: u64) -> DialogResponse {
            let mut updates = self.updates.lock();
            *updates += 1;
            if *updates >= self.cancel_after {
                DialogResponse::Cancel
            } else {
                DialogResponse::Continue
            }
        }

        fn finish(&self, completed: bool) {
            *self.finished.lock() = Some(completed);
        }
    }

    #[test]
    fn cancelled_file_copy_leaves_nothing_behind() -> Result<()> {
        let dir = tempdir()?;
        let source = dir.path().join("Mario.nes");
        fs::write(&source, vec![0u8; CHUNK_SIZE * 4])?;
        let dest = dir.path().join("roms").join("nes");

        let dialog = Arc::new(ScriptedDialog::new(2));
        let copier = DialogCopier::new(dialog.clone());
        let result = copier.copy_blocking(&source, &dest, &CancellationToken::new());

        assert!(matches!(result, Err(CopyError::UserCancelled)));
        assert!(!dest.join("Mario.nes").exists());
        assert!(!dest.exists());
        assert!(dir.path().join("roms").exists());
        assert_eq!(*dialog.finished.lock(), Some(false));
        Ok(())
    }

    #[test]
    fn cancelled_directory_copy_removes_the_bundle_only() -> Result<()> {
        let dir = tempdir()?;
        let bundle = dir.path().join("Zelda");
        fs::create_dir_all(&bundle)?;
        fs::write(bundle.join("a.bin"), vec![0u8; CHUNK_SIZE * 2])?;
        fs::write(bundle.join("b.bin"), vec![0u8; CHUNK_SIZE * 2])?;
        let dest = dir.path().join("dest");
        fs::create_dir_all(dest.join("Other"))?;

        let cancel = CancellationToken::new();
        let copier = DialogCopier::new(Arc::new(ScriptedDialog::new(3)));
        let result = copier.copy_blocking(&bundle, &dest, &cancel);

        assert!(matches!(result, Err(CopyError::UserCancelled)));
        assert!(!dest.join("Zelda").exists());
        assert!(dest.join("Other").exists());
        Ok(())
    }

    #[test]
    fn tripped_token_is_treated_like_closing_the_dialog() -> Result<()> {
        let dir = tempdir()?;
        let source = dir.path().join("Mario.nes");
        fs::write(&source, vec![0u8; CHUNK_SIZE + 1])?;
        let dest = dir.path().join("dest");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let copier = DialogCopier::new(Arc::new(LoggingDialog));
        let result = copier.copy_blocking(&source, &dest, &cancel);
        assert!(matches!(result, Err(CopyError::UserCancelled)));
        assert!(!dest.exists());
        Ok(())
    }

    #[test]
    fn completed_copy_is_kept() -> Result<()> {
        let dir = tempdir()?;
        let source = dir.path().join("Mario.nes");
        fs::write(&source, b"rom")?;
        let dest = dir.path().join("dest");

        let dialog = Arc::new(ScriptedDialog::new(usize::MAX));
        let copier = DialogCopier::new(dialog.clone());
        let target = copier.copy_blocking(&source, &dest, &CancellationToken::new())?;
        assert_eq!(fs::read(target)?, b"rom");
        assert_eq!(*dialog.finished.lock(), Some(true));
        Ok(())
    }
}
