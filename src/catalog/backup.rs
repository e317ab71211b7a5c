//! Remote backup of the catalog through chat messages.
//!
//! A backup is one or more text messages, each carrying a JSON envelope:
//!
//! ````text
//! #BACKUP v1
//! ```json
//! {"version":1,"backup_id":"…","total_chunks":2,"chunk_index":0,"checksum":"…","payload":"…"}
//! ```
//! ````
//!
//! `payload` is a base64 slice of the serialized catalog and `checksum` the
//! SHA-256 of the whole document, so reassembly does not depend on the order
//! in which the transport returns history. The older unversioned
//! `#BACKUP` / `#BACKUP_PART_<n>` messages can still be restored.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use super::CatalogRoot;

/// First line of every versioned backup message.
pub const BACKUP_MARKER: &str = "#BACKUP";

/// Current envelope version.
pub const BACKUP_VERSION: u32 = 1;

/// Transport limit for a single text message.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Raw bytes per chunk; base64 grows this by 4/3 and the envelope adds a
/// few hundred characters.
const CHUNK_BYTES: usize = 2400;

const LEGACY_PART_MARKER: &str = "#BACKUP_PART_";

/// Errors from backup encoding and restore.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("No backup found in the recent messages")]
    NotFound,

    #[error("Backup {backup_id} is incomplete: {found}/{total} chunks present")]
    Incomplete {
        backup_id: String,
        found: usize,
        total: usize,
    },

    #[error("Backup {backup_id} failed checksum verification")]
    ChecksumMismatch { backup_id: String },

    #[error("Unsupported backup version: {0}")]
    UnsupportedVersion(u32),

    #[error("Backup chunk is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Backup document is invalid: {0}")]
    Json(#[from] serde_json::Error),
}

/// One chunk of a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEnvelope {
    pub version: u32,
    pub backup_id: String,
    pub created_at: DateTime<Utc>,
    pub total_chunks: usize,
    pub chunk_index: usize,
    pub checksum: String,
    pub payload: String,
}

/// Serializes the catalog into backup messages ready to be sent in order.
pub fn encode_backup(root: &CatalogRoot, now: DateTime<Utc>) -> Result<Vec<String>, BackupError> {
    let document = serde_json::to_vec(root)?;
    let checksum = sha256_hex(&document);
    let backup_id = format!("{}-{}", now.format("%Y%m%d%H%M%S"), &checksum[..8]);

    let chunks: Vec<&[u8]> = document.chunks(CHUNK_BYTES).collect();
    let total_chunks = chunks.len();

    chunks
        .into_iter()
        .enumerate()
        .map(|(chunk_index, chunk)| {
            let envelope = BackupEnvelope {
                version: BACKUP_VERSION,
                backup_id: backup_id.clone(),
                created_at: now,
                total_chunks,
                chunk_index,
                checksum: checksum.clone(),
                payload: BASE64.encode(chunk),
            };
            let json = serde_json::to_string(&envelope)?;
            Ok(format!("{BACKUP_MARKER} v{BACKUP_VERSION}\n```json\n{json}\n```"))
        })
        .collect()
}

/// Restores the newest complete, verified backup from `messages`, which
/// must be ordered newest first.
pub fn decode_backup<S: AsRef<str>>(messages: &[S]) -> Result<CatalogRoot, BackupError> {
    let envelopes: Vec<BackupEnvelope> = messages
        .iter()
        .filter_map(|m| parse_envelope(m.as_ref()))
        .collect();

    if envelopes.is_empty() {
        debug!("No versioned backup envelopes found, trying legacy format");
        return decode_legacy(messages);
    }

    // Group by backup id, keeping the newest-first order of first sighting.
    let mut groups: Vec<(String, BTreeMap<usize, BackupEnvelope>)> = Vec::new();
    for envelope in envelopes {
        let index = match groups.iter().position(|(id, _)| *id == envelope.backup_id) {
            Some(index) => index,
            None => {
                groups.push((envelope.backup_id.clone(), BTreeMap::new()));
                groups.len() - 1
            }
        };
        groups[index].1.entry(envelope.chunk_index).or_insert(envelope);
    }

    let mut first_error = None;
    for (backup_id, chunks) in groups {
        match assemble(&backup_id, &chunks) {
            Ok(root) => return Ok(root),
            Err(e) => {
                warn!("Skipping backup {}: {}", backup_id, e);
                first_error.get_or_insert(e);
            }
        }
    }
    Err(first_error.unwrap_or(BackupError::NotFound))
}

fn assemble(
    backup_id: &str,
    chunks: &BTreeMap<usize, BackupEnvelope>,
) -> Result<CatalogRoot, BackupError> {
    let Some(first) = chunks.values().next() else {
        return Err(BackupError::NotFound);
    };
    if first.version != BACKUP_VERSION {
        return Err(BackupError::UnsupportedVersion(first.version));
    }

    let total = first.total_chunks;
    let consistent = chunks
        .values()
        .all(|c| c.total_chunks == total && c.checksum == first.checksum);
    let complete = (0..total).all(|i| chunks.contains_key(&i));
    if !consistent || !complete || chunks.len() != total {
        return Err(BackupError::Incomplete {
            backup_id: backup_id.to_owned(),
            found: chunks.len(),
            total,
        });
    }

    let mut document = Vec::new();
    for chunk in chunks.values() {
        document.extend(BASE64.decode(&chunk.payload)?);
    }

    if sha256_hex(&document) != first.checksum {
        return Err(BackupError::ChecksumMismatch {
            backup_id: backup_id.to_owned(),
        });
    }

    Ok(serde_json::from_slice(&document)?)
}

fn parse_envelope(message: &str) -> Option<BackupEnvelope> {
    let header = message.lines().next()?;
    if !header.starts_with(&format!("{BACKUP_MARKER} v")) {
        return None;
    }
    let body = code_block(message)?;
    match serde_json::from_str(body) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            debug!("Ignoring malformed backup envelope: {}", e);
            None
        }
    }
}

/// Legacy format: a single `#BACKUP` message, or `#BACKUP_PART_<n>` chunks
/// concatenated in ascending order. Parts are taken from the newest run,
/// which ends at the first repeated part number.
fn decode_legacy<S: AsRef<str>>(messages: &[S]) -> Result<CatalogRoot, BackupError> {
    let mut parts: BTreeMap<u32, &str> = BTreeMap::new();

    for message in messages {
        let message = message.as_ref();
        let Some(header) = message.lines().next() else {
            continue;
        };

        if header.trim() == BACKUP_MARKER && parts.is_empty() {
            let body = code_block(message).ok_or(BackupError::NotFound)?;
            return Ok(serde_json::from_str(body)?);
        }

        if let Some(number) = header.trim().strip_prefix(LEGACY_PART_MARKER) {
            let Ok(number) = number.parse::<u32>() else {
                continue;
            };
            let Some(body) = code_block(message) else {
                continue;
            };
            if parts.contains_key(&number) {
                break;
            }
            parts.insert(number, body);
        }
    }

    if parts.is_empty() {
        return Err(BackupError::NotFound);
    }

    let document: String = parts.values().copied().collect();
    Ok(serde_json::from_str(&document)?)
}

fn code_block(message: &str) -> Option<&str> {
    let start = message.find("```json\n")? + "```json\n".len();
    let end = message.rfind("\n```")?;
    (end >= start).then(|| &message[start..end])
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogPath, FileKind, FileRecord};

    fn big_catalog() -> CatalogRoot {
        let mut root = CatalogRoot::default();
        for i in 0..120 {
            root.append_file(
                &CatalogPath::new("IIT JEE", "Physics", format!("Publisher {}", i % 7)),
                FileRecord::new(format!("file-id-{i:04}"), FileKind::Document, format!("Notes {i}.pdf"), "\"quoted\" caption"),
            )
            .unwrap();
        }
        root
    }

    fn newest_first(mut messages: Vec<String>) -> Vec<String> {
        messages.reverse();
        messages
    }

    #[test]
    fn test_small_backup_is_one_message() {
        let messages = encode_backup(&CatalogRoot::default(), Utc::now()).unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("#BACKUP v1\n```json\n"));
        assert_eq!(decode_backup(&messages).unwrap(), CatalogRoot::default());
    }

    #[test]
    fn test_large_backup_is_chunked_under_limit() {
        let root = big_catalog();
        let messages = encode_backup(&root, Utc::now()).unwrap();

        assert!(messages.len() > 1);
        assert!(messages.iter().all(|m| m.chars().count() < MAX_MESSAGE_CHARS));
        assert_eq!(decode_backup(&newest_first(messages)).unwrap(), root);
    }

    #[test]
    fn test_reordered_chunks_still_restore() {
        let root = big_catalog();
        let mut messages = encode_backup(&root, Utc::now()).unwrap();
        messages.rotate_left(1);
        assert_eq!(decode_backup(&messages).unwrap(), root);
    }

    #[test]
    fn test_missing_chunk_is_reported() {
        let mut messages = encode_backup(&big_catalog(), Utc::now()).unwrap();
        messages.remove(1);
        assert!(matches!(
            decode_backup(&messages),
            Err(BackupError::Incomplete { .. })
        ));
    }

    #[test]
    fn test_incomplete_newest_falls_back_to_older_backup() {
        let older = CatalogRoot::default();
        let newer = big_catalog();
        let old_messages = encode_backup(&older, Utc::now()).unwrap();
        let mut new_messages = newest_first(encode_backup(&newer, Utc::now()).unwrap());
        new_messages.pop();

        let mut history = new_messages;
        history.extend(old_messages);
        assert_eq!(decode_backup(&history).unwrap(), older);
    }

    #[test]
    fn test_tampered_payload_fails_checksum() {
        let messages = encode_backup(&CatalogRoot::default(), Utc::now()).unwrap();
        let body = code_block(&messages[0]).unwrap();
        let mut envelope: BackupEnvelope = serde_json::from_str(body).unwrap();
        envelope.payload = BASE64.encode(br#"{"_meta":{},"exams":{}}"#);
        let tampered = format!(
            "#BACKUP v1\n```json\n{}\n```",
            serde_json::to_string(&envelope).unwrap()
        );

        assert!(matches!(
            decode_backup(&[tampered]),
            Err(BackupError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_legacy_single_message() {
        let json = serde_json::to_string_pretty(&CatalogRoot::default()).unwrap();
        let message = format!("#BACKUP\n```json\n{json}\n```");
        let history = vec!["hello".to_owned(), message];
        assert_eq!(decode_backup(&history).unwrap(), CatalogRoot::default());
    }

    #[test]
    fn test_legacy_parts_in_ascending_order() {
        let json = serde_json::to_string(&CatalogRoot::default()).unwrap();
        let (a, b) = json.split_at(json.len() / 2);
        let history = vec![
            format!("#BACKUP_PART_2\n```json\n{b}\n```"),
            format!("#BACKUP_PART_1\n```json\n{a}\n```"),
        ];
        assert_eq!(decode_backup(&history).unwrap(), CatalogRoot::default());
    }

    #[test]
    fn test_no_backup_messages() {
        let history = vec!["just chatting".to_owned()];
        assert!(matches!(decode_backup(&history), Err(BackupError::NotFound)));
    }
}
