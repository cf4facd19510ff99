//! One-time decoding of unversioned ids.
//!
//! Legacy ids are either `flag|full source path` or a bare source path. The
//! flag was empty for single files and `*` or the bundle directory for
//! multi-file games.

use crate::models::{EmulatorMapping, GameInfo, MultiFileInfo, RomKind, SingleFileInfo};

use super::IdentityError;

/// Rebuild a modern [`GameInfo`] from a legacy id, if its shape fits the
/// mapping's kind.
pub fn decode_legacy(id: &str, mapping: &EmulatorMapping) -> Result<GameInfo, IdentityError> {
    let unrecognized = || IdentityError::UnrecognizedLegacy {
        id: id.to_string(),
        kind: mapping.rom_kind,
    };
    if !id.contains('.') {
        return Err(unrecognized());
    }

    let source = mapping.source_path.to_string_lossy();
    let parts: Vec<&str> = id.split('|').collect();

    match (mapping.rom_kind, parts.as_slice()) {
        (RomKind::SingleFile, [path]) => Ok(GameInfo::SingleFile(SingleFileInfo {
            mapping_id: mapping.mapping_id,
            source_path: relative_to_source(path, &source),
        })),
        (RomKind::SingleFile, ["", path]) => Ok(GameInfo::SingleFile(SingleFileInfo {
            mapping_id: mapping.mapping_id,
            source_path: relative_to_source(path, &source),
        })),
        (RomKind::MultiFile, [base, path]) if !base.is_empty() => {
            let source_file_path = relative_to_source(path, &source);
            let source_base_dir = if *base == "*" {
                source_file_path
                    .rsplit_once('/')
                    .map(|(dir, _)| dir.to_string())
                    .unwrap_or_default()
            } else {
                relative_to_source(base, &source)
            };
            Ok(GameInfo::MultiFile(MultiFileInfo {
                mapping_id: mapping.mapping_id,
                source_file_path,
                source_base_dir,
            }))
        }
        _ => Err(unrecognized()),
    }
}

fn relative_to_source(path: &str, source: &str) -> String {
    let stripped = if source.is_empty() {
        path
    } else {
        path.strip_prefix(source).unwrap_or(path)
    };
    stripped
        .replace('\\', "/")
        .trim_start_matches('/')
        .to_string()
}
