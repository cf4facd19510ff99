//! Persisted per-mapping index of content-store titles.
//!
//! Inspecting content files is expensive, so the results are kept in
//! `<cache dir>/<mapping id>.json` and only rebuilt when the cache is dirty.
//! Installs and uninstalls update single entries instead of forcing a rebuild.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::{
    content::{ContentInspector, ContentRole, InspectedContent},
    models::ContentId,
    paths::relative_slash_path,
};

/// A title present in the emulator's store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledEntry {
    /// Base title id.
    pub content_id: ContentId,
    /// Display title.
    pub title: String,
    /// Publisher name.
    pub publisher: String,
    /// Display version of the newest installed update, or of the base title.
    pub version: String,
    /// Launchable file relative to the store root.
    pub sub_path: String,
}

/// A title available in the source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstalledEntry {
    /// Base title id.
    pub content_id: ContentId,
    /// Display title.
    pub title: String,
    /// Publisher name.
    pub publisher: String,
    /// Display version of the base title.
    pub version: String,
    /// Base game file.
    pub program_file: PathBuf,
    /// Newest update file, if any.
    #[serde(default)]
    pub update_file: Option<PathBuf>,
    /// One file per distinct add-on.
    #[serde(default)]
    pub addon_files: Vec<PathBuf>,
}

impl UninstalledEntry {
    /// Every file to register, base game first.
    pub fn files(&self) -> Vec<PathBuf> {
        std::iter::once(self.program_file.clone())
            .chain(self.update_file.clone())
            .chain(self.addon_files.iter().cloned())
            .collect()
    }
}

/// Serialized form of a [`SourceDirCache`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheData {
    /// Titles found in the store.
    #[serde(default)]
    pub installed_games: BTreeMap<ContentId, InstalledEntry>,
    /// Titles found in the source directory.
    #[serde(default)]
    pub uninstalled_games: BTreeMap<ContentId, UninstalledEntry>,
    /// Time of the last completed refresh.
    #[serde(default)]
    pub refreshed_at: Option<DateTime<Utc>>,
}

struct CacheState {
    data: CacheData,
    dirty: bool,
    /// Bumped by every `mark_dirty`; a refresh only clears `dirty` when this
    /// did not move while it was scanning.
    marks: u64,
}

/// Content index for one mapping.
pub struct SourceDirCache {
    mapping_id: Uuid,
    path: PathBuf,
    state: RwLock<CacheState>,
    /// Serializes a refresh against single-entry updates.
    write_gate: Mutex<()>,
}

impl SourceDirCache {
    /// Empty, dirty cache persisted under `cache_dir`.
    pub fn new(cache_dir: &Path, mapping_id: Uuid) -> Self {
        Self {
            mapping_id,
            path: cache_dir.join(format!("{mapping_id}.json")),
            state: RwLock::new(CacheState {
                data: CacheData::default(),
                dirty: true,
                marks: 0,
            }),
            write_gate: Mutex::new(()),
        }
    }

    /// Load the persisted cache, starting cold when it is missing or unreadable.
    /// The result is always dirty.
    pub fn load(cache_dir: &Path, mapping_id: Uuid) -> Self {
        let cache = Self::new(cache_dir, mapping_id);
        if !cache.path.exists() {
            info!(mapping = %mapping_id, "No source cache yet");
            return cache;
        }
        match read_data(&cache.path) {
            Ok(data) => cache.state.write().data = data,
            Err(err) => warn!(
                "Discarding unreadable source cache {}: {:#}",
                cache.path.display(),
                err
            ),
        }
        cache
    }

    /// Mapping this cache belongs to.
    pub fn mapping_id(&self) -> Uuid {
        self.mapping_id
    }

    /// Location of the persisted file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the next scan should rebuild the cache.
    pub fn is_dirty(&self) -> bool {
        self.state.read().dirty
    }

    /// Force a rebuild on the next scan.
    pub fn mark_dirty(&self) {
        let mut state = self.state.write();
        state.dirty = true;
        state.marks += 1;
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let _gate = self.write_gate.lock();
        let mut state = self.state.write();
        state.data = CacheData::default();
        state.dirty = true;
        state.marks += 1;
    }

    /// Installed entry for a title.
    pub fn installed(&self, id: ContentId) -> Option<InstalledEntry> {
        self.state.read().data.installed_games.get(&id).cloned()
    }

    /// Source entry for a title.
    pub fn uninstalled(&self, id: ContentId) -> Option<UninstalledEntry> {
        self.state.read().data.uninstalled_games.get(&id).cloned()
    }

    /// Every title in the store, ordered by id.
    pub fn installed_games(&self) -> Vec<InstalledEntry> {
        self.state.read().data.installed_games.values().cloned().collect()
    }

    /// Every title in the source directory, ordered by id.
    pub fn uninstalled_games(&self) -> Vec<UninstalledEntry> {
        self.state.read().data.uninstalled_games.values().cloned().collect()
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> CacheData {
        self.state.read().data.clone()
    }

    /// Rebuild both maps by inspecting `store_root` and `source`.
    ///
    /// Returns `false` when cancelled; the previous contents are kept and the
    /// cache stays dirty. A [`mark_dirty`](Self::mark_dirty) that lands while
    /// the refresh is running keeps the cache dirty as well.
    pub fn refresh(
        &self,
        store_root: &Path,
        source: &Path,
        inspector: &dyn ContentInspector,
        cancel: &CancellationToken,
    ) -> bool {
        let _gate = self.write_gate.lock();
        let marks = self.state.read().marks;

        let Some(installed) = inspect_tree(store_root, inspector, cancel) else {
            return false;
        };
        let installed = build_installed(store_root, installed);
        info!(mapping = %self.mapping_id, count = installed.len(), "Refreshed installed titles");

        let Some(uninstalled) = inspect_tree(source, inspector, cancel) else {
            return false;
        };
        let uninstalled = build_uninstalled(uninstalled);
        info!(mapping = %self.mapping_id, count = uninstalled.len(), "Refreshed source titles");

        let mut state = self.state.write();
        state.data = CacheData {
            installed_games: installed,
            uninstalled_games: uninstalled,
            refreshed_at: Some(Utc::now()),
        };
        state.dirty = state.marks != marks;
        true
    }

    /// Record a freshly installed title.
    pub fn record_installed(&self, entry: InstalledEntry) {
        let _gate = self.write_gate.lock();
        debug!(content_id = %entry.content_id, "Caching installed title");
        self.state
            .write()
            .data
            .installed_games
            .insert(entry.content_id, entry);
    }

    /// Forget an installed title.
    pub fn remove_installed(&self, id: ContentId) -> Option<InstalledEntry> {
        let _gate = self.write_gate.lock();
        self.state.write().data.installed_games.remove(&id)
    }

    /// Write the cache to disk, replacing any previous file.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(&self.state.read().data)
            .context("failed to serialize source cache")?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

fn read_data(path: &Path) -> Result<CacheData> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

type Inspected = Vec<(PathBuf, InspectedContent)>;

/// Inspect every candidate under `root`, grouped by base title.
fn inspect_tree(
    root: &Path,
    inspector: &dyn ContentInspector,
    cancel: &CancellationToken,
) -> Option<BTreeMap<ContentId, Inspected>> {
    let mut grouped: BTreeMap<ContentId, Inspected> = BTreeMap::new();
    if !root.is_dir() {
        return Some(grouped);
    }

    let files = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file());

    for entry in files {
        if cancel.is_cancelled() {
            return None;
        }
        let path = entry.path();
        if !inspector.is_candidate(path) {
            continue;
        }
        match inspector.inspect(path) {
            Ok(Some(content)) => grouped
                .entry(content.base_id)
                .or_default()
                .push((path.to_path_buf(), content)),
            Ok(None) => continue,
            Err(err) => warn!("Skipping {}: {:#}", path.display(), err),
        }
    }
    Some(grouped)
}

fn latest_update(files: &Inspected) -> Option<&(PathBuf, InspectedContent)> {
    files
        .iter()
        .filter(|(_, content)| content.role == ContentRole::Update)
        .max_by_key(|(_, content)| content.version)
}

fn build_installed(
    root: &Path,
    grouped: BTreeMap<ContentId, Inspected>,
) -> BTreeMap<ContentId, InstalledEntry> {
    grouped
        .into_iter()
        .filter_map(|(base_id, files)| {
            let (path, program) = files
                .iter()
                .find(|(_, content)| content.role == ContentRole::Program)?;
            let version = latest_update(&files)
                .map(|(_, update)| update.display_version.clone())
                .unwrap_or_else(|| program.display_version.clone());
            let sub_path = program
                .launch_sub_path
                .clone()
                .or_else(|| relative_slash_path(root, path))?;
            Some((
                base_id,
                InstalledEntry {
                    content_id: base_id,
                    title: program.title.clone(),
                    publisher: program.publisher.clone(),
                    version,
                    sub_path,
                },
            ))
        })
        .collect()
}

fn build_uninstalled(
    grouped: BTreeMap<ContentId, Inspected>,
) -> BTreeMap<ContentId, UninstalledEntry> {
    grouped
        .into_iter()
        .filter_map(|(base_id, files)| {
            let (program_file, program) = files
                .iter()
                .find(|(_, content)| content.role == ContentRole::Program)?;

            let mut seen_addons = BTreeSet::new();
            let addon_files = files
                .iter()
                .filter(|(_, content)| content.role == ContentRole::AddOn)
                .filter(|(_, content)| seen_addons.insert(content.content_id))
                .map(|(path, _)| path.clone())
                .collect();

            Some((
                base_id,
                UninstalledEntry {
                    content_id: base_id,
                    title: program.title.clone(),
                    publisher: program.publisher.clone(),
                    version: program.display_version.clone(),
                    program_file: program_file.clone(),
                    update_file: latest_update(&files).map(|(path, _)| path.clone()),
                    addon_files,
                },
            ))
        })
        .collect()
}

/// Lazily loaded caches, one per mapping, shared by scanner and controllers.
pub struct CacheRegistry {
    cache_dir: PathBuf,
    caches: Mutex<HashMap<Uuid, Arc<SourceDirCache>>>,
}

impl CacheRegistry {
    /// Caches persisted under `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            caches: Mutex::new(HashMap::new()),
        }
    }

    /// Cache for `mapping_id`, loading it on first use.
    pub fn for_mapping(&self, mapping_id: Uuid) -> Arc<SourceDirCache> {
        let mut caches = self.caches.lock();
        Arc::clone(
            caches
                .entry(mapping_id)
                .or_insert_with(|| Arc::new(SourceDirCache::load(&self.cache_dir, mapping_id))),
        )
    }
}
