//! Portable-mode path substitution and relative path helpers.

use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

/// Placeholder the host expands to its own install directory.
pub const APP_DIR_VARIABLE: &str = "{PlayniteDirectory}";

/// Rewrites absolute paths to and from the relocatable application placeholder.
#[derive(Debug, Clone, Default)]
pub struct PathVariables {
    application_path: PathBuf,
    portable: bool,
}

impl PathVariables {
    /// Create a substitution table for the given host install directory.
    pub fn new(application_path: impl Into<PathBuf>, portable: bool) -> Self {
        Self {
            application_path: application_path.into(),
            portable,
        }
    }

    /// Whether the host runs from a relocatable install.
    pub fn is_portable(&self) -> bool {
        self.portable
    }

    /// Host install directory.
    pub fn application_path(&self) -> &Path {
        &self.application_path
    }

    /// Convert an absolute path into the string handed to the host, replacing the
    /// application directory prefix with [`APP_DIR_VARIABLE`] in portable mode.
    pub fn collapse(&self, path: &Path) -> String {
        if !self.portable || self.application_path.as_os_str().is_empty() {
            return path.to_string_lossy().into_owned();
        }
        match path.strip_prefix(&self.application_path) {
            Ok(rest) if rest.as_os_str().is_empty() => APP_DIR_VARIABLE.to_string(),
            Ok(rest) => format!(
                "{APP_DIR_VARIABLE}{}{}",
                std::path::MAIN_SEPARATOR,
                rest.to_string_lossy()
            ),
            Err(_) => path.to_string_lossy().into_owned(),
        }
    }

    /// Resolve a host-recorded path back to an absolute location.
    pub fn expand(&self, recorded: &str) -> PathBuf {
        if !recorded.contains(APP_DIR_VARIABLE) {
            return PathBuf::from(recorded);
        }
        let app = self.application_path.to_string_lossy();
        PathBuf::from(recorded.replace(APP_DIR_VARIABLE, app.as_ref()))
    }
}

/// Express `path` relative to `base` as a `/`-separated string.
///
/// Returns `None` when `path` is not located under `base`.
pub fn relative_slash_path(base: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    Some(to_slash(rel))
}

/// Join normal components of a relative path with `/`.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve a `/`-separated relative path against `base`.
pub fn join_slash(base: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(base.to_path_buf(), |acc, segment| acc.join(segment))
}

/// Total size in bytes of a file, or of every file under a directory.
pub fn tree_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// Lower-cased extension of `path` without the leading dot.
pub fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}
