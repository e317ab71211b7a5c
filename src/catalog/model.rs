//! Catalog data model and tree operations.
//!
//! The tree is `Exam → Subject → Publisher → (files | sub-folder → files)`.
//! A publisher is a [`PublisherNode`]: either a flat file list or a set of
//! named sub-folders, never both. On disk the two variants are told apart by
//! their JSON shape (array vs. object), so no reserved name prefix exists.
//!
//! Name lookups are case-insensitive and ignore surrounding whitespace; the
//! spelling used when a node was created is the one stored and displayed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::UserId;

/// Errors raised by catalog operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("{kind} not found: '{name}'")]
    NotFound { kind: NodeKind, name: String },

    #[error("File number {index} is out of range (1-{len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Publisher '{publisher}' already holds files and cannot contain sub-folders")]
    PathConflict { publisher: String },

    #[error("Publisher '{publisher}' is organised into sub-folders; choose a folder first")]
    FolderRequired { publisher: String },

    #[error("Name cannot be empty")]
    EmptyName,
}

/// Level of the catalog tree, used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Exam,
    Subject,
    Publisher,
    Folder,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Exam => "Exam",
            Self::Subject => "Subject",
            Self::Publisher => "Publisher",
            Self::Folder => "Folder",
        };
        f.write_str(name)
    }
}

/// Media kind of an uploaded file. Decides which send method is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Document,
    Photo,
    Video,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Document => "document",
            Self::Photo => "photo",
            Self::Video => "video",
        };
        f.write_str(name)
    }
}

/// One uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Opaque handle owned by the transport.
    pub file_id: String,

    pub kind: FileKind,

    /// Name shown in file lists.
    #[serde(rename = "name")]
    pub display_name: String,

    #[serde(default)]
    pub caption: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(
        file_id: impl Into<String>,
        kind: FileKind,
        display_name: impl Into<String>,
        caption: impl Into<String>,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            kind,
            display_name: display_name.into(),
            caption: caption.into(),
            added_at: Some(Utc::now()),
        }
    }
}

/// Contents of a publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PublisherNode {
    Files(Vec<FileRecord>),
    Folders(BTreeMap<String, Vec<FileRecord>>),
}

impl Default for PublisherNode {
    fn default() -> Self {
        Self::Files(Vec::new())
    }
}

impl PublisherNode {
    #[must_use]
    pub fn has_folders(&self) -> bool {
        matches!(self, Self::Folders(_))
    }

    /// Total number of files below this publisher.
    #[must_use]
    pub fn file_count(&self) -> usize {
        match self {
            Self::Files(files) => files.len(),
            Self::Folders(folders) => folders.values().map(Vec::len).sum(),
        }
    }
}

pub type Subject = BTreeMap<String, PublisherNode>;
pub type Exam = BTreeMap<String, Subject>;

/// Admins and known users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRecord {
    #[serde(default)]
    pub admins: BTreeSet<UserId>,

    #[serde(default)]
    pub users: BTreeSet<UserId>,
}

impl MetaRecord {
    /// Records a user. Returns `true` on first contact.
    pub fn register_user(&mut self, user: UserId) -> bool {
        self.users.insert(user)
    }

    pub fn add_admin(&mut self, user: UserId) -> bool {
        self.admins.insert(user)
    }

    pub fn remove_admin(&mut self, user: UserId) -> bool {
        self.admins.remove(&user)
    }

    #[must_use]
    pub fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }
}

/// Location of a file list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPath {
    pub exam: String,
    pub subject: String,
    pub publisher: String,
    pub folder: Option<String>,
}

impl CatalogPath {
    #[must_use]
    pub fn new(
        exam: impl Into<String>,
        subject: impl Into<String>,
        publisher: impl Into<String>,
    ) -> Self {
        Self {
            exam: exam.into(),
            subject: subject.into(),
            publisher: publisher.into(),
            folder: None,
        }
    }

    #[must_use]
    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }
}

impl fmt::Display for CatalogPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} › {} › {}", self.exam, self.subject, self.publisher)?;
        if let Some(folder) = &self.folder {
            write!(f, " › {folder}")?;
        }
        Ok(())
    }
}

/// Summary counts shown by `/stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub exams: usize,
    pub subjects: usize,
    pub publishers: usize,
    pub folders: usize,
    pub files: usize,
    pub users: usize,
    pub admins: usize,
}

/// Root of the persisted catalog document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRoot {
    #[serde(rename = "_meta", default)]
    pub meta: MetaRecord,

    #[serde(default)]
    pub exams: BTreeMap<String, Exam>,
}

impl Default for CatalogRoot {
    /// The seeded catalog used on first run.
    fn default() -> Self {
        let mut root = Self::empty();
        for (exam, subjects) in [
            ("IIT JEE", ["Physics", "Chemistry", "Mathematics"]),
            ("NEET", ["Physics", "Chemistry", "Biology"]),
        ] {
            let subjects = subjects
                .iter()
                .map(|s| ((*s).to_owned(), Subject::new()))
                .collect();
            root.exams.insert(exam.to_owned(), subjects);
        }
        root
    }
}

impl CatalogRoot {
    /// A catalog without any exams.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            meta: MetaRecord::default(),
            exams: BTreeMap::new(),
        }
    }

    /// Creates every missing node down to the publisher (and folder, if
    /// given). Existing file lists are never replaced.
    pub fn ensure_path(&mut self, path: &CatalogPath) -> Result<(), CatalogError> {
        let exam = entry_mut(&mut self.exams, &path.exam, true, NodeKind::Exam)?;
        let subject = entry_mut(exam, &path.subject, true, NodeKind::Subject)?;
        let publisher = entry_mut(subject, &path.publisher, true, NodeKind::Publisher)?;
        if let Some(folder) = &path.folder {
            folder_mut(publisher, &path.publisher, folder, true)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn list_exams(&self) -> Vec<String> {
        sorted_names(&self.exams)
    }

    pub fn list_subjects(&self, exam: &str) -> Result<Vec<String>, CatalogError> {
        Ok(sorted_names(self.exam(exam)?))
    }

    pub fn list_publishers(&self, exam: &str, subject: &str) -> Result<Vec<String>, CatalogError> {
        Ok(sorted_names(self.subject(exam, subject)?))
    }

    /// Sub-folder names of a publisher; empty for a publisher holding files.
    pub fn list_folders(
        &self,
        exam: &str,
        subject: &str,
        publisher: &str,
    ) -> Result<Vec<String>, CatalogError> {
        match self.publisher(exam, subject, publisher)? {
            PublisherNode::Files(_) => Ok(Vec::new()),
            PublisherNode::Folders(folders) => Ok(sorted_names(folders)),
        }
    }

    pub fn exam(&self, exam: &str) -> Result<&Exam, CatalogError> {
        find_entry(&self.exams, exam, NodeKind::Exam)
    }

    pub fn subject(&self, exam: &str, subject: &str) -> Result<&Subject, CatalogError> {
        find_entry(self.exam(exam)?, subject, NodeKind::Subject)
    }

    pub fn publisher(
        &self,
        exam: &str,
        subject: &str,
        publisher: &str,
    ) -> Result<&PublisherNode, CatalogError> {
        find_entry(self.subject(exam, subject)?, publisher, NodeKind::Publisher)
    }

    /// File list at `path`.
    pub fn files(&self, path: &CatalogPath) -> Result<&[FileRecord], CatalogError> {
        let node = self.publisher(&path.exam, &path.subject, &path.publisher)?;
        match (node, &path.folder) {
            (PublisherNode::Files(files), None) => Ok(files.as_slice()),
            (PublisherNode::Folders(folders), Some(folder)) => {
                find_entry(folders, folder, NodeKind::Folder).map(Vec::as_slice)
            }
            (PublisherNode::Folders(_), None) => Err(CatalogError::FolderRequired {
                publisher: path.publisher.clone(),
            }),
            (PublisherNode::Files(_), Some(folder)) => Err(CatalogError::NotFound {
                kind: NodeKind::Folder,
                name: folder.clone(),
            }),
        }
    }

    /// Appends a file, creating intermediate nodes as needed.
    pub fn append_file(&mut self, path: &CatalogPath, record: FileRecord) -> Result<(), CatalogError> {
        self.file_list_mut(path, true)?.push(record);
        Ok(())
    }

    /// Removes the file at a 1-based display index.
    pub fn delete_file(&mut self, path: &CatalogPath, index: usize) -> Result<FileRecord, CatalogError> {
        let files = self.file_list_mut(path, false)?;
        if index == 0 || index > files.len() {
            return Err(CatalogError::IndexOutOfRange {
                index,
                len: files.len(),
            });
        }
        Ok(files.remove(index - 1))
    }

    /// Adds an exam. Returns `true` if it did not exist.
    pub fn add_exam(&mut self, exam: &str) -> Result<bool, CatalogError> {
        let existed = find_key(&self.exams, exam).is_some();
        entry_mut(&mut self.exams, exam, true, NodeKind::Exam)?;
        Ok(!existed)
    }

    /// Adds a subject, creating its exam if needed. Returns `true` if the
    /// subject did not exist.
    pub fn add_subject(&mut self, exam: &str, subject: &str) -> Result<bool, CatalogError> {
        if subject.trim().is_empty() {
            return Err(CatalogError::EmptyName);
        }
        let exam = entry_mut(&mut self.exams, exam, true, NodeKind::Exam)?;
        let existed = find_key(exam, subject).is_some();
        entry_mut(exam, subject, true, NodeKind::Subject)?;
        Ok(!existed)
    }

    pub fn delete_exam(&mut self, exam: &str) -> Result<Exam, CatalogError> {
        remove_entry(&mut self.exams, exam, NodeKind::Exam)
    }

    pub fn delete_subject(&mut self, exam: &str, subject: &str) -> Result<Subject, CatalogError> {
        let exam = entry_mut(&mut self.exams, exam, false, NodeKind::Exam)?;
        remove_entry(exam, subject, NodeKind::Subject)
    }

    pub fn delete_publisher(
        &mut self,
        exam: &str,
        subject: &str,
        publisher: &str,
    ) -> Result<PublisherNode, CatalogError> {
        let exam = entry_mut(&mut self.exams, exam, false, NodeKind::Exam)?;
        let subject = entry_mut(exam, subject, false, NodeKind::Subject)?;
        remove_entry(subject, publisher, NodeKind::Publisher)
    }

    /// Removes a sub-folder. A publisher left without folders becomes an
    /// empty file list again.
    pub fn delete_folder(&mut self, path: &CatalogPath) -> Result<Vec<FileRecord>, CatalogError> {
        let Some(folder) = &path.folder else {
            return Err(CatalogError::EmptyName);
        };
        let node = self.publisher_mut(path)?;
        let PublisherNode::Folders(folders) = node else {
            return Err(CatalogError::NotFound {
                kind: NodeKind::Folder,
                name: folder.clone(),
            });
        };
        let removed = remove_entry(folders, folder, NodeKind::Folder)?;
        if folders.is_empty() {
            *node = PublisherNode::default();
        }
        Ok(removed)
    }

    #[must_use]
    pub fn stats(&self) -> CatalogStats {
        let mut stats = CatalogStats {
            exams: self.exams.len(),
            users: self.meta.users.len(),
            admins: self.meta.admins.len(),
            ..CatalogStats::default()
        };
        for subjects in self.exams.values() {
            stats.subjects += subjects.len();
            for publishers in subjects.values() {
                stats.publishers += publishers.len();
                for node in publishers.values() {
                    if let PublisherNode::Folders(folders) = node {
                        stats.folders += folders.len();
                    }
                    stats.files += node.file_count();
                }
            }
        }
        stats
    }

    fn publisher_mut(&mut self, path: &CatalogPath) -> Result<&mut PublisherNode, CatalogError> {
        let exam = entry_mut(&mut self.exams, &path.exam, false, NodeKind::Exam)?;
        let subject = entry_mut(exam, &path.subject, false, NodeKind::Subject)?;
        entry_mut(subject, &path.publisher, false, NodeKind::Publisher)
    }

    fn file_list_mut(
        &mut self,
        path: &CatalogPath,
        create: bool,
    ) -> Result<&mut Vec<FileRecord>, CatalogError> {
        let publisher = if create {
            let exam = entry_mut(&mut self.exams, &path.exam, true, NodeKind::Exam)?;
            let subject = entry_mut(exam, &path.subject, true, NodeKind::Subject)?;
            entry_mut(subject, &path.publisher, true, NodeKind::Publisher)?
        } else {
            self.publisher_mut(path)?
        };

        match &path.folder {
            Some(folder) => folder_mut(publisher, &path.publisher, folder, create),
            None => match publisher {
                PublisherNode::Files(files) => Ok(files),
                PublisherNode::Folders(_) => Err(CatalogError::FolderRequired {
                    publisher: path.publisher.clone(),
                }),
            },
        }
    }
}

/// Finds the option matching `input` under the catalog name policy.
#[must_use]
pub fn match_name<'a>(options: &'a [String], input: &str) -> Option<&'a str> {
    options
        .iter()
        .find(|option| names_match(option, input))
        .map(String::as_str)
}

fn names_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

fn find_key<'a, V>(map: &'a BTreeMap<String, V>, name: &str) -> Option<&'a String> {
    map.keys().find(|key| names_match(key, name))
}

fn sorted_names<V>(map: &BTreeMap<String, V>) -> Vec<String> {
    let mut names: Vec<String> = map.keys().cloned().collect();
    names.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));
    names
}

fn find_entry<'a, V>(
    map: &'a BTreeMap<String, V>,
    name: &str,
    kind: NodeKind,
) -> Result<&'a V, CatalogError> {
    find_key(map, name)
        .and_then(|key| map.get(key))
        .ok_or_else(|| CatalogError::NotFound {
            kind,
            name: name.trim().to_owned(),
        })
}

fn entry_mut<'a, V: Default>(
    map: &'a mut BTreeMap<String, V>,
    name: &str,
    create: bool,
    kind: NodeKind,
) -> Result<&'a mut V, CatalogError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogError::EmptyName);
    }
    let key = match find_key(map, name) {
        Some(key) => key.clone(),
        None if create => name.to_owned(),
        None => {
            return Err(CatalogError::NotFound {
                kind,
                name: name.to_owned(),
            });
        }
    };
    Ok(map.entry(key).or_default())
}

fn remove_entry<V>(
    map: &mut BTreeMap<String, V>,
    name: &str,
    kind: NodeKind,
) -> Result<V, CatalogError> {
    let key = find_key(map, name).cloned().ok_or_else(|| CatalogError::NotFound {
        kind,
        name: name.trim().to_owned(),
    })?;
    map.remove(&key).ok_or(CatalogError::NotFound { kind, name: key })
}

fn folder_mut<'a>(
    node: &'a mut PublisherNode,
    publisher: &str,
    folder: &str,
    create: bool,
) -> Result<&'a mut Vec<FileRecord>, CatalogError> {
    if let PublisherNode::Files(files) = node {
        if !files.is_empty() {
            return Err(CatalogError::PathConflict {
                publisher: publisher.to_owned(),
            });
        }
        if !create {
            return Err(CatalogError::NotFound {
                kind: NodeKind::Folder,
                name: folder.trim().to_owned(),
            });
        }
        *node = PublisherNode::Folders(BTreeMap::new());
    }
    let PublisherNode::Folders(folders) = node else {
        return Err(CatalogError::PathConflict {
            publisher: publisher.to_owned(),
        });
    };
    entry_mut(folders, folder, create, NodeKind::Folder)
}
