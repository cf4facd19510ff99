//! Collaborators for content-store games: reading content ids out of files and
//! registering titles into an emulator's data store.

#![allow(missing_docs)]

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::ContentId;

/// What a file contributes to its title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentRole {
    /// The base game.
    Program,
    /// A patch; only the highest version is used.
    Update,
    /// Downloadable content.
    AddOn,
}

/// Metadata read from a content file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectedContent {
    /// Id of this particular file's content.
    pub content_id: ContentId,
    /// Id of the base title the content belongs to.
    pub base_id: ContentId,
    pub role: ContentRole,
    /// Numeric version used to pick the latest update.
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub display_version: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub publisher: String,
    /// Launchable file relative to the store root, when known.
    #[serde(default)]
    pub launch_sub_path: Option<String>,
}

/// Reads content ids and metadata out of files.
pub trait ContentInspector: Send + Sync {
    /// Whether `path` is worth inspecting.
    fn is_candidate(&self, path: &Path) -> bool;

    /// Inspect `path`. `Ok(None)` means the file is not a supported content file.
    fn inspect(&self, path: &Path) -> Result<Option<InspectedContent>>;
}

/// An emulator's internal title store.
pub trait ContentStore: Send + Sync {
    /// Register `file` into the store under `root`.
    fn install_file(&self, root: &Path, file: &Path) -> Result<()>;

    /// Launchable file of title `id`, relative to `root`.
    fn launch_sub_path(&self, root: &Path, id: ContentId) -> Result<String>;

    /// Remove title `id`. Returns `false` when it was not installed.
    fn uninstall(&self, root: &Path, id: ContentId) -> Result<bool>;
}

/// Inspector and store pair used by the content-store kind.
#[derive(Clone)]
pub struct ContentBackend {
    pub inspector: Arc<dyn ContentInspector>,
    pub store: Arc<dyn ContentStore>,
}

impl ContentBackend {
    /// Sidecar descriptors and a plain directory store.
    pub fn sidecar() -> Self {
        let inspector: Arc<dyn ContentInspector> = Arc::new(SidecarInspector);
        Self {
            store: Arc::new(DirectoryStore::new(Arc::clone(&inspector))),
            inspector,
        }
    }
}

/// Suffix of the descriptor file stored next to each content file.
pub const SIDECAR_SUFFIX: &str = ".meta.json";

/// Reads `<file>.meta.json` descriptors written by dumping tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidecarInspector;

impl SidecarInspector {
    /// Descriptor path for `path`.
    pub fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(SIDECAR_SUFFIX);
        PathBuf::from(name)
    }
}

impl ContentInspector for SidecarInspector {
    fn is_candidate(&self, path: &Path) -> bool {
        let is_sidecar = path
            .file_name()
            .map(|name| name.to_string_lossy().ends_with(SIDECAR_SUFFIX))
            .unwrap_or(true);
        !is_sidecar && path.is_file() && Self::sidecar_path(path).is_file()
    }

    fn inspect(&self, path: &Path) -> Result<Option<InspectedContent>> {
        let sidecar = Self::sidecar_path(path);
        if !sidecar.is_file() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&sidecar)
            .with_context(|| format!("failed to read {}", sidecar.display()))?;
        let content = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", sidecar.display()))?;
        Ok(Some(content))
    }
}

/// Keeps every title in `<root>/<base id>/` together with its descriptors.
pub struct DirectoryStore {
    inspector: Arc<dyn ContentInspector>,
}

impl DirectoryStore {
    pub fn new(inspector: Arc<dyn ContentInspector>) -> Self {
        Self { inspector }
    }

    fn title_dir(root: &Path, id: ContentId) -> PathBuf {
        root.join(id.to_string())
    }
}

impl ContentStore for DirectoryStore {
    fn install_file(&self, root: &Path, file: &Path) -> Result<()> {
        let content = self
            .inspector
            .inspect(file)?
            .with_context(|| format!("{} is not a content file", file.display()))?;
        let name = file
            .file_name()
            .with_context(|| format!("{} has no file name", file.display()))?;

        let dir = Self::title_dir(root, content.base_id);
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let target = dir.join(name);
        fs::copy(file, &target).with_context(|| {
            format!("failed to copy {} to {}", file.display(), target.display())
        })?;

        let sidecar = SidecarInspector::sidecar_path(file);
        if sidecar.is_file() {
            let target_sidecar = SidecarInspector::sidecar_path(&target);
            fs::copy(&sidecar, &target_sidecar)
                .with_context(|| format!("failed to copy {}", sidecar.display()))?;
        }
        debug!(content_id = %content.content_id, file = %target.display(), "Registered content");
        Ok(())
    }

    fn launch_sub_path(&self, root: &Path, id: ContentId) -> Result<String> {
        let dir = Self::title_dir(root, id);
        let entries =
            fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| self.inspector.is_candidate(path))
            .collect();
        files.sort();

        for file in files {
            if let Some(content) = self.inspector.inspect(&file)? {
                if content.role == ContentRole::Program {
                    if let Some(sub_path) = content.launch_sub_path {
                        return Ok(sub_path);
                    }
                    let name = file.file_name().unwrap_or_default().to_string_lossy();
                    return Ok(format!("{id}/{name}"));
                }
            }
        }
        anyhow::bail!("no program content installed for {id}")
    }

    fn uninstall(&self, root: &Path, id: ContentId) -> Result<bool> {
        let dir = Self::title_dir(root, id);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir).with_context(|| format!("failed to remove {}", dir.display()))?;
        info!(content_id = %id, "Removed title from store");
        Ok(true)
    }
}
