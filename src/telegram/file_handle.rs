//! Opaque file handles for MTProto documents and photos.
//!
//! Telegram identifies a stored file by `(id, access_hash, file_reference)`.
//! The catalog only keeps a string, so the triple is packed as
//! `<kind>:<id>:<access_hash>:<base64 file reference>`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use super::TransportError;
use crate::catalog::FileKind;

/// Decoded form of a catalog `file_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub kind: FileKind,
    pub id: i64,
    pub access_hash: i64,
    pub file_reference: Vec<u8>,
}

impl FileHandle {
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.kind,
            self.id,
            self.access_hash,
            URL_SAFE_NO_PAD.encode(&self.file_reference)
        )
    }

    pub fn decode(handle: &str) -> Result<Self, TransportError> {
        let invalid = || TransportError::InvalidFileHandle(handle.to_owned());

        let mut parts = handle.splitn(4, ':');
        let kind = match parts.next() {
            Some("document") => FileKind::Document,
            Some("photo") => FileKind::Photo,
            Some("video") => FileKind::Video,
            _ => return Err(invalid()),
        };
        let id = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let access_hash = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let file_reference = parts
            .next()
            .and_then(|p| URL_SAFE_NO_PAD.decode(p).ok())
            .ok_or_else(invalid)?;

        Ok(Self {
            kind,
            id,
            access_hash,
            file_reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_encoding() {
        let handle = FileHandle {
            kind: FileKind::Video,
            id: 5_012_345_678,
            access_hash: -42,
            file_reference: vec![0, 255, 16, 3],
        };
        let encoded = handle.encode();
        assert!(encoded.starts_with("video:5012345678:-42:"));
        assert_eq!(FileHandle::decode(&encoded).unwrap(), handle);
    }

    #[test]
    fn test_invalid_handles() {
        for bad in ["", "sticker:1:2:AA", "photo:x:2:AA", "photo:1:2", "photo:1:2:***"] {
            assert!(
                matches!(FileHandle::decode(bad), Err(TransportError::InvalidFileHandle(_))),
                "{bad} should be rejected"
            );
        }
    }
}
