use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use romvault_core::{models::InstallationData, GameRecord, ScannedGame};

/// The games this host has persisted, keyed by id.
pub struct GameStore {
    path: PathBuf,
    games: Vec<GameRecord>,
}

impl GameStore {
    pub fn path_in(data_dir: &Path) -> PathBuf {
        data_dir.join("library.json")
    }

    pub fn load(path: PathBuf) -> Result<Self> {
        let games = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Vec::new()
        };
        Ok(Self { path, games })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let serialized =
            serde_json::to_string_pretty(&self.games).context("failed to serialize game store")?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    pub fn games(&self) -> &[GameRecord] {
        &self.games
    }

    /// Replace the stored list with a fresh scan.
    pub fn replace_with_scan(&mut self, scanned: &[ScannedGame]) {
        self.games = scanned.iter().map(GameRecord::from).collect();
    }

    /// Find a game by exact id or case-insensitive name.
    pub fn find(&self, query: &str) -> Result<GameRecord> {
        if let Some(game) = self.games.iter().find(|game| game.game_id == query) {
            return Ok(game.clone());
        }
        let matches: Vec<_> = self
            .games
            .iter()
            .filter(|game| game.name.eq_ignore_ascii_case(query))
            .collect();
        match matches.as_slice() {
            [game] => Ok((*game).clone()),
            [] => bail!("no game named {query:?}; run `romvault scan` first"),
            _ => bail!("{} games are named {query:?}; pass the game id instead", matches.len()),
        }
    }

    pub fn mark_installed(&mut self, game_id: &str, data: InstallationData) {
        if let Some(game) = self.games.iter_mut().find(|game| game.game_id == game_id) {
            game.is_installed = true;
            game.install_directory = Some(data.install_directory);
            game.roms = data.roms;
        }
    }

    pub fn mark_uninstalled(&mut self, game_id: &str) {
        if let Some(game) = self.games.iter_mut().find(|game| game.game_id == game_id) {
            game.is_installed = false;
            game.install_directory = None;
            game.roms.clear();
        }
    }

    pub fn rename_id(&mut self, old_id: &str, new_id: &str) {
        if let Some(game) = self.games.iter_mut().find(|game| game.game_id == old_id) {
            game.game_id = new_id.to_string();
        }
    }

    pub fn remove(&mut self, game_ids: &[String]) {
        self.games.retain(|game| !game_ids.contains(&game.game_id));
    }
}
