//! The one table binding each ROM kind to its identity tag, scanner and
//! installer. Tags are persisted inside game ids and are never reused.

#![allow(missing_docs)]

use std::sync::Arc;

use crate::{
    context::LibraryContext,
    identity::decode_body,
    install::{ContentInstaller, FileInstaller, KindInstaller},
    models::{ContentStoreInfo, GameInfo, MultiFileInfo, RomKind, SingleFileInfo},
    scanner::{ContentScanner, FileScanner, RomScanner},
};

/// Scanner and installer for one kind.
pub struct KindHandlers {
    pub scanner: Arc<dyn RomScanner>,
    pub installer: Arc<dyn KindInstaller>,
}

/// One registered kind.
pub struct KindEntry {
    pub kind: RomKind,
    /// Identity tag written into game ids.
    pub tag: u32,
    pub name: &'static str,
    pub(crate) decode_body: fn(&[u8]) -> bincode::Result<GameInfo>,
    /// Returns `None` when the context lacks what the kind needs.
    pub build: fn(&LibraryContext) -> Option<KindHandlers>,
}

/// Every supported kind.
pub static KIND_TABLE: &[KindEntry] = &[
    KindEntry {
        kind: RomKind::SingleFile,
        tag: 10,
        name: "SingleFile",
        decode_body: decode_body::<SingleFileInfo>,
        build: build_single_file,
    },
    KindEntry {
        kind: RomKind::MultiFile,
        tag: 11,
        name: "MultiFile",
        decode_body: decode_body::<MultiFileInfo>,
        build: build_multi_file,
    },
    KindEntry {
        kind: RomKind::ContentStore,
        tag: 12,
        name: "ContentStore",
        decode_body: decode_body::<ContentStoreInfo>,
        build: build_content_store,
    },
];

/// Entry registered for `kind`.
pub fn entry_for_kind(kind: RomKind) -> Option<&'static KindEntry> {
    KIND_TABLE.iter().find(|entry| entry.kind == kind)
}

/// Entry registered under `tag`.
pub fn entry_for_tag(tag: u32) -> Option<&'static KindEntry> {
    KIND_TABLE.iter().find(|entry| entry.tag == tag)
}

/// Kind registered under `tag`.
pub fn kind_for_tag(tag: u32) -> Option<RomKind> {
    entry_for_tag(tag).map(|entry| entry.kind)
}

/// Tag registered for `kind`.
pub fn tag_for_kind(kind: RomKind) -> Option<u32> {
    entry_for_kind(kind).map(|entry| entry.tag)
}

/// Build handlers for every kind the context supports.
pub fn build_handlers(ctx: &LibraryContext) -> Vec<(RomKind, KindHandlers)> {
    KIND_TABLE
        .iter()
        .filter_map(|entry| (entry.build)(ctx).map(|handlers| (entry.kind, handlers)))
        .collect()
}

fn build_single_file(ctx: &LibraryContext) -> Option<KindHandlers> {
    Some(KindHandlers {
        scanner: Arc::new(FileScanner::single_file(ctx.paths.clone())),
        installer: Arc::new(FileInstaller::new(
            RomKind::SingleFile,
            Arc::clone(&ctx.provider),
            Arc::clone(&ctx.dialog),
            ctx.paths.clone(),
        )),
    })
}

fn build_multi_file(ctx: &LibraryContext) -> Option<KindHandlers> {
    Some(KindHandlers {
        scanner: Arc::new(FileScanner::multi_file(ctx.paths.clone())),
        installer: Arc::new(FileInstaller::new(
            RomKind::MultiFile,
            Arc::clone(&ctx.provider),
            Arc::clone(&ctx.dialog),
            ctx.paths.clone(),
        )),
    })
}

fn build_content_store(ctx: &LibraryContext) -> Option<KindHandlers> {
    let backend = ctx.content.clone()?;
    Some(KindHandlers {
        scanner: Arc::new(ContentScanner::new(
            Arc::clone(&ctx.caches),
            backend.clone(),
            ctx.paths.clone(),
        )),
        installer: Arc::new(ContentInstaller::new(Arc::clone(&ctx.caches), backend)),
    })
}
