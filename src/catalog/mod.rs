//! Study-materials catalog.
//!
//! Holds the exam/subject/publisher tree with its admin and user registry,
//! persists it as JSON, and round-trips it through chat-message backups.

mod backup;
mod model;
mod store;

pub use backup::{BACKUP_MARKER, BackupEnvelope, BackupError, MAX_MESSAGE_CHARS, decode_backup, encode_backup};
pub use model::{
    CatalogError, CatalogPath, CatalogRoot, CatalogStats, Exam, FileKind, FileRecord, MetaRecord,
    NodeKind, PublisherNode, Subject, match_name,
};
pub use store::{JsonCatalogStore, PersistenceError};
