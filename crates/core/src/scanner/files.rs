use std::{
    collections::HashSet,
    fs::{self, ReadDir},
    io,
    path::{Path, PathBuf},
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{file_name_of, GameDraft, GameStream, RomScanner, ScanPhase};
use crate::{
    models::{
        GameInfo, GameRom, MultiFileInfo, ResolvedMapping, RomKind, ScannedGame, SingleFileInfo,
    },
    naming::{game_name_from_file_name, guess_regions, is_continuation_disc},
    paths::{extension_lower, join_slash, relative_slash_path, PathVariables},
};

/// How games are laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileLayout {
    /// Each top-level file is a game.
    Flat,
    /// Each top-level directory is a bundle holding one launchable file.
    Folder,
}

/// Scanner for the single-file and multi-file kinds.
pub struct FileScanner {
    kind: RomKind,
    layout: FileLayout,
    paths: PathVariables,
}

impl FileScanner {
    /// Flat layout, one ROM file per game.
    pub fn single_file(paths: PathVariables) -> Self {
        Self {
            kind: RomKind::SingleFile,
            layout: FileLayout::Flat,
            paths,
        }
    }

    /// Folder layout, one bundle directory per game.
    pub fn multi_file(paths: PathVariables) -> Self {
        Self {
            kind: RomKind::MultiFile,
            layout: FileLayout::Folder,
            paths,
        }
    }
}

impl RomScanner for FileScanner {
    fn kind(&self) -> RomKind {
        self.kind
    }

    fn scan(&self, mapping: &ResolvedMapping, cancel: &CancellationToken) -> GameStream {
        Box::new(FileScan::new(
            mapping.clone(),
            self.layout,
            self.paths.clone(),
            cancel.clone(),
        ))
    }

    fn is_source_missing(&self, info: &GameInfo, mapping: &ResolvedMapping) -> bool {
        match info {
            GameInfo::SingleFile(info) => {
                !join_slash(mapping.source(), &info.source_path).is_file()
            }
            GameInfo::MultiFile(info) => {
                !join_slash(mapping.source(), &info.source_base_dir).is_dir()
            }
            GameInfo::ContentStore(_) => false,
        }
    }
}

/// A top-level entry that holds a launchable file.
struct Candidate {
    entry: PathBuf,
    launch: PathBuf,
    /// Entry path relative to the scanned root; the de-duplication key.
    key: String,
    /// Launch file relative to the scanned root.
    launch_key: String,
    file_name: String,
    size: u64,
}

/// Two-pass scan over the top level of a mapping's destination and source.
pub struct FileScan {
    mapping: ResolvedMapping,
    layout: FileLayout,
    paths: PathVariables,
    cancel: CancellationToken,
    phase: ScanPhase,
    entries: Option<ReadDir>,
    seen: HashSet<String>,
}

impl FileScan {
    /// Start in the installed pass.
    pub fn new(
        mapping: ResolvedMapping,
        layout: FileLayout,
        paths: PathVariables,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            mapping,
            layout,
            paths,
            cancel,
            phase: ScanPhase::Installed,
            entries: None,
            seen: HashSet::new(),
        }
    }

    /// Current pass.
    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    fn root(&self) -> &Path {
        match self.phase {
            ScanPhase::Installed => &self.mapping.destination,
            _ => self.mapping.source(),
        }
    }

    fn finish_phase(&mut self) {
        self.entries = None;
        self.phase = self.phase.advance();
    }

    fn open_root(&mut self) -> bool {
        let root = self.root().to_path_buf();
        match fs::read_dir(&root) {
            Ok(entries) => {
                self.entries = Some(entries);
                true
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(root = %root.display(), "Scan root does not exist");
                false
            }
            Err(err) => {
                warn!("Cannot read {}: {}", root.display(), err);
                false
            }
        }
    }

    fn visit(&mut self, entry: PathBuf) -> Option<ScannedGame> {
        let file_name = file_name_of(&entry);
        if is_continuation_disc(&file_name) {
            return None;
        }
        let candidate = match self.layout {
            FileLayout::Flat => self.flat_candidate(entry, file_name)?,
            FileLayout::Folder => self.folder_candidate(entry, file_name)?,
        };

        match self.phase {
            ScanPhase::Installed => {
                self.seen.insert(candidate.key.clone());
                self.installed_game(candidate)
            }
            ScanPhase::Uninstalled => {
                let equivalent = join_slash(&self.mapping.destination, &candidate.launch_key);
                if self.seen.contains(&candidate.key) || equivalent.exists() {
                    return None;
                }
                self.uninstalled_game(candidate)
            }
            ScanPhase::Done => None,
        }
    }

    fn flat_candidate(&self, entry: PathBuf, file_name: String) -> Option<Candidate> {
        if !entry.is_file() {
            return None;
        }
        let extension = extension_lower(&entry)?;
        let mut allowed = false;
        for candidate in &self.mapping.image_extensions {
            if self.cancel.is_cancelled() {
                return None;
            }
            if *candidate == extension {
                allowed = true;
                break;
            }
        }
        if !allowed {
            return None;
        }
        let size = entry.metadata().map(|metadata| metadata.len()).unwrap_or(0);
        Some(Candidate {
            launch: entry.clone(),
            entry,
            key: file_name.clone(),
            launch_key: file_name.clone(),
            file_name,
            size,
        })
    }

    fn folder_candidate(&self, entry: PathBuf, file_name: String) -> Option<Candidate> {
        if !entry.is_dir() {
            return None;
        }
        let files: Vec<(PathBuf, u64)> = WalkDir::new(&entry)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|item| item.ok())
            .filter(|item| item.file_type().is_file())
            .map(|item| {
                let size = item.metadata().map(|metadata| metadata.len()).unwrap_or(0);
                (item.into_path(), size)
            })
            .collect();

        let launch = self.first_allowed(&files)?;
        let launch_key = relative_slash_path(self.root(), &launch)?;
        Some(Candidate {
            launch,
            entry,
            key: file_name.clone(),
            launch_key,
            file_name,
            size: files.iter().map(|(_, size)| size).sum(),
        })
    }

    /// First file of the first allow-listed extension that has any match.
    fn first_allowed(&self, files: &[(PathBuf, u64)]) -> Option<PathBuf> {
        for extension in &self.mapping.image_extensions {
            if self.cancel.is_cancelled() {
                return None;
            }
            let found = files
                .iter()
                .find(|(path, _)| extension_lower(path).as_deref() == Some(extension.as_str()));
            if let Some((path, _)) = found {
                return Some(path.clone());
            }
        }
        None
    }

    fn info_for(&self, candidate: &Candidate) -> GameInfo {
        let mapping_id = self.mapping.id();
        match self.layout {
            FileLayout::Flat => GameInfo::SingleFile(SingleFileInfo {
                mapping_id,
                source_path: candidate.key.clone(),
            }),
            FileLayout::Folder => GameInfo::MultiFile(MultiFileInfo {
                mapping_id,
                source_file_path: candidate.launch_key.clone(),
                source_base_dir: candidate.key.clone(),
            }),
        }
    }

    fn installed_game(&self, candidate: Candidate) -> Option<ScannedGame> {
        let name = game_name_from_file_name(&candidate.file_name);
        let install_directory = match self.layout {
            FileLayout::Flat => self.paths.collapse(&self.mapping.destination),
            FileLayout::Folder => self.paths.collapse(&candidate.entry),
        };
        let roms = vec![GameRom {
            name: name.clone(),
            path: self.paths.collapse(&candidate.launch),
        }];
        GameDraft {
            info: self.info_for(&candidate),
            regions: guess_regions(&candidate.file_name),
            name,
            installed: Some((install_directory, roms)),
            install_size: Some(candidate.size),
        }
        .build(&self.mapping)
    }

    fn uninstalled_game(&self, candidate: Candidate) -> Option<ScannedGame> {
        GameDraft {
            info: self.info_for(&candidate),
            name: game_name_from_file_name(&candidate.file_name),
            installed: None,
            install_size: Some(candidate.size),
            regions: guess_regions(&candidate.file_name),
        }
        .build(&self.mapping)
    }
}

impl Iterator for FileScan {
    type Item = ScannedGame;

    fn next(&mut self) -> Option<ScannedGame> {
        loop {
            if self.cancel.is_cancelled() {
                self.entries = None;
                self.phase = ScanPhase::Done;
            }
            if self.phase == ScanPhase::Done {
                return None;
            }
            if self.entries.is_none() && !self.open_root() {
                self.finish_phase();
                continue;
            }

            let next = self.entries.as_mut().and_then(|entries| entries.next());
            match next {
                None => self.finish_phase(),
                Some(Err(err)) => debug!("Skipping unreadable entry: {}", err),
                Some(Ok(entry)) => {
                    if let Some(game) = self.visit(entry.path()) {
                        return Some(game);
                    }
                }
            }
        }
    }
}
