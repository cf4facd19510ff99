#![warn(clippy::all, missing_docs)]

//! Core of the romvault emulator library.
//!
//! Scans mapped ROM directories into a de-duplicated game list, encodes each
//! game into a stable versioned id, and installs or uninstalls games by
//! copying them between an archival source and a fast local destination.

pub mod cache;
pub mod config;
pub mod content;
pub mod context;
pub mod copy;
pub mod identity;
pub mod install;
pub mod library;
pub mod models;
pub mod naming;
pub mod paths;
pub mod registry;
pub mod scanner;
pub mod settings;

pub use config::AppConfig;
pub use context::{HostEvents, LibraryContext, Severity};
pub use install::{
    InstallController, InstallError, InstallState, UninstallController, UninstallState,
};
pub use library::{IdMigration, LegacyGame, Library};
pub use models::{GameInfo, GameRecord, RomKind, ScannedGame};
pub use paths::PathVariables;
pub use settings::MappingProvider;
