//! Versioned, self-describing game identity tokens.
//!
//! A token is `!`, one format-version character, then base64 of the encoded
//! envelope. Version `1` wraps a bincode envelope `{kind_tag, body}` where
//! `kind_tag` comes from the kind registry and `body` is the kind's payload.
//! Any change to a payload schema must bump the version character.

mod legacy;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::{
    models::{ContentStoreInfo, GameInfo, MultiFileInfo, RomKind, SingleFileInfo},
    registry,
};

pub use legacy::decode_legacy;

/// First character of every versioned token.
pub const TOKEN_MARKER: char = '!';
/// Format version written by [`encode`].
pub const CURRENT_VERSION: char = '1';

const MIN_TOKEN_LEN: usize = 3;

/// Failures to encode or decode an identity token.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Empty string.
    #[error("game id is empty")]
    Empty,
    /// Shorter than marker + version + payload.
    #[error("game id is too short ({0} chars)")]
    TooShort(usize),
    /// Not a versioned token (a legacy id that was never migrated).
    #[error("game id is not in the versioned format")]
    MissingMarker,
    /// Version character with no decoder.
    #[error("game id format version '{0}' is not supported")]
    UnsupportedVersion(char),
    /// Payload is not base64.
    #[error("game id payload is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    /// Envelope or body could not be decoded.
    #[error("game id payload is malformed: {0}")]
    Malformed(#[source] bincode::Error),
    /// Serialization failed.
    #[error("failed to encode game id: {0}")]
    Encode(#[source] bincode::Error),
    /// Envelope carries a kind tag nobody registered.
    #[error("game id uses unsupported kind tag {0}")]
    UnsupportedKind(u32),
    /// No tag is registered for the kind being encoded.
    #[error("no identity tag is registered for {0} games")]
    UnregisteredKind(RomKind),
    /// Token decodes to a different kind than the caller asked for.
    #[error("expected a {expected} game id, found {found}")]
    KindMismatch {
        /// Requested kind.
        expected: RomKind,
        /// Kind stored in the token.
        found: RomKind,
    },
    /// Legacy id whose shape doesn't fit the mapping's kind.
    #[error("legacy game id {id:?} cannot be read as a {kind} game")]
    UnrecognizedLegacy {
        /// Raw legacy id.
        id: String,
        /// Kind of the mapping it was matched against.
        kind: RomKind,
    },
}

impl IdentityError {
    /// Message suitable for showing to a user.
    pub fn user_message(&self) -> String {
        format!("{self}. Try removing and re-adding the game.")
    }
}

/// A concrete payload type bound to one [`RomKind`].
pub trait KindPayload: Serialize + DeserializeOwned + Sized {
    /// Kind this payload belongs to.
    const KIND: RomKind;

    /// Wrap into the tagged union.
    fn into_info(self) -> GameInfo;

    /// Unwrap from the tagged union when the kind matches.
    fn from_info(info: GameInfo) -> Option<Self>;
}

impl KindPayload for SingleFileInfo {
    const KIND: RomKind = RomKind::SingleFile;

    fn into_info(self) -> GameInfo {
        GameInfo::SingleFile(self)
    }

    fn from_info(info: GameInfo) -> Option<Self> {
        match info {
            GameInfo::SingleFile(info) => Some(info),
            _ => None,
        }
    }
}

impl KindPayload for MultiFileInfo {
    const KIND: RomKind = RomKind::MultiFile;

    fn into_info(self) -> GameInfo {
        GameInfo::MultiFile(self)
    }

    fn from_info(info: GameInfo) -> Option<Self> {
        match info {
            GameInfo::MultiFile(info) => Some(info),
            _ => None,
        }
    }
}

impl KindPayload for ContentStoreInfo {
    const KIND: RomKind = RomKind::ContentStore;

    fn into_info(self) -> GameInfo {
        GameInfo::ContentStore(self)
    }

    fn from_info(info: GameInfo) -> Option<Self> {
        match info {
            GameInfo::ContentStore(info) => Some(info),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    kind_tag: u32,
    body: Vec<u8>,
}

/// Decode a kind's body bytes; used by the registry table.
pub(crate) fn decode_body<P: KindPayload>(body: &[u8]) -> bincode::Result<GameInfo> {
    bincode::deserialize::<P>(body).map(P::into_info)
}

/// Encode `info` into a versioned token.
pub fn encode(info: &GameInfo) -> Result<String, IdentityError> {
    let body = match info {
        GameInfo::SingleFile(payload) => bincode::serialize(payload),
        GameInfo::MultiFile(payload) => bincode::serialize(payload),
        GameInfo::ContentStore(payload) => bincode::serialize(payload),
    }
    .map_err(IdentityError::Encode)?;

    let kind = info.kind();
    let envelope = Envelope {
        kind_tag: registry::tag_for_kind(kind).ok_or(IdentityError::UnregisteredKind(kind))?,
        body,
    };
    let bytes = bincode::serialize(&envelope).map_err(IdentityError::Encode)?;
    Ok(format!("{TOKEN_MARKER}{CURRENT_VERSION}{}", STANDARD.encode(bytes)))
}

/// Decode any versioned token.
pub fn decode(token: &str) -> Result<GameInfo, IdentityError> {
    if token.is_empty() {
        return Err(IdentityError::Empty);
    }
    let mut chars = token.chars();
    if chars.next() != Some(TOKEN_MARKER) {
        return Err(IdentityError::MissingMarker);
    }
    let length = token.chars().count();
    if length < MIN_TOKEN_LEN {
        return Err(IdentityError::TooShort(length));
    }

    match chars.next() {
        Some(CURRENT_VERSION) => decode_v1(chars.as_str()),
        Some(other) => Err(IdentityError::UnsupportedVersion(other)),
        None => Err(IdentityError::TooShort(length)),
    }
}

/// Decode a token, failing unless it holds a `P` payload.
pub fn decode_as<P: KindPayload>(token: &str) -> Result<P, IdentityError> {
    let info = decode(token)?;
    let found = info.kind();
    P::from_info(info).ok_or(IdentityError::KindMismatch {
        expected: P::KIND,
        found,
    })
}

/// Whether `id` is a versioned token rather than a legacy id.
pub fn is_versioned(id: &str) -> bool {
    id.starts_with(TOKEN_MARKER)
}

fn decode_v1(payload: &str) -> Result<GameInfo, IdentityError> {
    let bytes = STANDARD.decode(payload)?;
    let envelope: Envelope = bincode::deserialize(&bytes).map_err(IdentityError::Malformed)?;
    let entry = registry::entry_for_tag(envelope.kind_tag)
        .ok_or(IdentityError::UnsupportedKind(envelope.kind_tag))?;
    (entry.decode_body)(&envelope.body).map_err(IdentityError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentId;
    use uuid::Uuid;

    fn samples() -> Vec<GameInfo> {
        let mapping_id = Uuid::new_v4();
        vec![
            GameInfo::SingleFile(SingleFileInfo {
                mapping_id,
                source_path: "Mario.nes".to_string(),
            }),
            GameInfo::SingleFile(SingleFileInfo {
                mapping_id,
                source_path: String::new(),
            }),
            GameInfo::SingleFile(SingleFileInfo {
                mapping_id,
                source_path: "ゼルダの伝説/ゼルダ (Japan).fds".to_string(),
            }),
            GameInfo::SingleFile(SingleFileInfo {
                mapping_id,
                source_path: "a/".repeat(2048) + "long.bin",
            }),
            GameInfo::MultiFile(MultiFileInfo {
                mapping_id,
                source_file_path: "Zelda//zelda.cue".to_string(),
                source_base_dir: "Zelda".to_string(),
            }),
            GameInfo::ContentStore(ContentStoreInfo {
                mapping_id,
                content_id: ContentId(u64::MAX),
            }),
        ]
    }

    #[test]
    fn every_kind_round_trips() -> anyhow::Result<()> {
        for info in samples() {
            let token = encode(&info)?;
            assert!(token.starts_with("!1"));
            assert_eq!(decode(&token)?, info);
        }
        Ok(())
    }

    #[test]
    fn typed_decode_rejects_other_kinds() -> anyhow::Result<()> {
        let info = GameInfo::ContentStore(ContentStoreInfo {
            mapping_id: Uuid::new_v4(),
            content_id: ContentId(7),
        });
        let token = encode(&info)?;
        assert_eq!(decode_as::<ContentStoreInfo>(&token)?.content_id, ContentId(7));
        assert!(matches!(
            decode_as::<SingleFileInfo>(&token),
            Err(IdentityError::KindMismatch {
                expected: RomKind::SingleFile,
                found: RomKind::ContentStore
            })
        ));
        Ok(())
    }

    #[test]
    fn malformed_tokens_fail_loudly() {
        assert!(matches!(decode(""), Err(IdentityError::Empty)));
        assert!(matches!(decode("!1"), Err(IdentityError::TooShort(2))));
        assert!(matches!(decode("!"), Err(IdentityError::TooShort(1))));
        assert!(matches!(decode("Mario.nes"), Err(IdentityError::MissingMarker)));
        assert!(matches!(
            decode("!9AAAA"),
            Err(IdentityError::UnsupportedVersion('9'))
        ));
        assert!(matches!(
            decode("!0AAAA"),
            Err(IdentityError::UnsupportedVersion('0'))
        ));
        assert!(matches!(decode("!1$$$"), Err(IdentityError::InvalidBase64(_))));
        assert!(matches!(decode("!1AAAA"), Err(IdentityError::Malformed(_))));
    }

    #[test]
    fn unknown_kind_tags_are_rejected() -> anyhow::Result<()> {
        let envelope = Envelope {
            kind_tag: 999,
            body: Vec::new(),
        };
        let token = format!("!1{}", STANDARD.encode(bincode::serialize(&envelope)?));
        assert!(matches!(decode(&token), Err(IdentityError::UnsupportedKind(999))));
        Ok(())
    }
}
