use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{copy_entry, prepare, CopyError, FileCopier};

/// Streams files in chunks and overwrites silently. Leaves partial output on
/// failure or cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectCopier;

impl FileCopier for DirectCopier {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn copy_blocking(
        &self,
        source: &Path,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, CopyError> {
        let target = prepare(source, destination)?;
        debug!(source = %source.display(), target = %target.display(), "Direct copy");
        copy_entry(source, &target, cancel, &mut |_| true)?;
        Ok(target)
    }
}
