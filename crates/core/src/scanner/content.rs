use std::{collections::HashSet, fs, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{GameDraft, GameStream, RomScanner};
use crate::{
    cache::{CacheRegistry, InstalledEntry, UninstalledEntry},
    content::ContentBackend,
    models::{ContentStoreInfo, GameInfo, GameRom, ResolvedMapping, RomKind},
    paths::PathVariables,
};

// Titles are region-free; the store holds one build per title id.
const CONTENT_REGION: &str = "World";

/// Scanner for content-store games, served from the per-mapping cache.
pub struct ContentScanner {
    caches: Arc<CacheRegistry>,
    backend: ContentBackend,
    paths: PathVariables,
}

enum Title {
    Installed(InstalledEntry),
    Uninstalled(UninstalledEntry),
}

impl ContentScanner {
    /// Share `caches` with the content installer.
    pub fn new(caches: Arc<CacheRegistry>, backend: ContentBackend, paths: PathVariables) -> Self {
        Self {
            caches,
            backend,
            paths,
        }
    }
}

impl RomScanner for ContentScanner {
    fn kind(&self) -> RomKind {
        RomKind::ContentStore
    }

    fn scan(&self, mapping: &ResolvedMapping, cancel: &CancellationToken) -> GameStream {
        if cancel.is_cancelled() {
            return Box::new(std::iter::empty());
        }

        let cache = self.caches.for_mapping(mapping.id());
        if cache.is_dirty()
            && cache.refresh(
                &mapping.destination,
                mapping.source(),
                self.backend.inspector.as_ref(),
                cancel,
            )
        {
            if let Err(err) = cache.save() {
                warn!("Failed to save source cache for {}: {:#}", mapping.id(), err);
            }
        }

        let installed = cache.installed_games();
        let installed_ids: HashSet<_> = installed.iter().map(|entry| entry.content_id).collect();
        let titles = installed.into_iter().map(Title::Installed).chain(
            cache
                .uninstalled_games()
                .into_iter()
                .filter(move |entry| !installed_ids.contains(&entry.content_id))
                .map(Title::Uninstalled),
        );

        let cancel = cancel.clone();
        let mapping = mapping.clone();
        let paths = self.paths.clone();
        Box::new(
            titles
                .take_while(move |_| !cancel.is_cancelled())
                .filter_map(move |title| draft(title, &mapping, &paths).build(&mapping)),
        )
    }

    fn is_source_missing(&self, _info: &GameInfo, _mapping: &ResolvedMapping) -> bool {
        false
    }
}

fn draft(title: Title, mapping: &ResolvedMapping, paths: &PathVariables) -> GameDraft {
    let info = |content_id| {
        GameInfo::ContentStore(ContentStoreInfo {
            mapping_id: mapping.id(),
            content_id,
        })
    };
    match title {
        Title::Installed(entry) => {
            let rom = GameRom {
                name: entry.title.clone(),
                path: paths.collapse(&mapping.destination.join(&entry.sub_path)),
            };
            GameDraft {
                info: info(entry.content_id),
                name: entry.title,
                installed: Some((paths.collapse(&mapping.destination), vec![rom])),
                install_size: None,
                regions: vec![CONTENT_REGION.to_string()],
            }
        }
        Title::Uninstalled(entry) => {
            let size: u64 = entry
                .files()
                .iter()
                .filter_map(|file| fs::metadata(file).ok())
                .map(|metadata| metadata.len())
                .sum();
            GameDraft {
                info: info(entry.content_id),
                name: entry.title,
                installed: None,
                install_size: Some(size),
                regions: vec![CONTENT_REGION.to_string()],
            }
        }
    }
}
