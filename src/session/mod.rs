//! Per-user wizard sessions.
//!
//! Sessions are created on first contact, reset by `/cancel` and Menu,
//! and dropped on logout or after sitting idle.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::UserId;
use crate::catalog::CatalogPath;
use crate::wizard::{Mode, Step};

/// Catalog names picked so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub exam: Option<String>,
    pub subject: Option<String>,
    pub publisher: Option<String>,
    pub folder: Option<String>,
}

impl Selection {
    /// The file-list path, once exam, subject and publisher are known.
    #[must_use]
    pub fn path(&self) -> Option<CatalogPath> {
        let path = CatalogPath::new(
            self.exam.clone()?,
            self.subject.clone()?,
            self.publisher.clone()?,
        );
        Some(match &self.folder {
            Some(folder) => path.with_folder(folder.clone()),
            None => path,
        })
    }
}

/// Transient per-step flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    /// The publisher step chose "Add New Publisher".
    pub creating_publisher: bool,

    /// Zero-based page of the file list being browsed.
    pub page: usize,

    /// Files received during the current upload.
    pub uploaded: usize,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub mode: Option<Mode>,
    pub step: Option<Step>,
    pub selection: Selection,
    pub flags: SessionFlags,
    last_seen: Instant,
}

impl SessionState {
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self {
            mode: None,
            step: None,
            selection: Selection::default(),
            flags: SessionFlags::default(),
            last_seen: now,
        }
    }

    /// Enters `mode` at its first step with nothing selected.
    pub fn begin(&mut self, mode: Mode) {
        self.clear();
        self.mode = Some(mode);
        self.step = Some(mode.first_step());
    }

    /// Back to the idle state, keeping only the activity timestamp.
    pub fn clear(&mut self) {
        self.mode = None;
        self.step = None;
        self.selection = Selection::default();
        self.flags = SessionFlags::default();
    }

    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.mode.is_none()
    }

    #[must_use]
    pub const fn last_seen(&self) -> Instant {
        self.last_seen
    }
}

/// All live sessions, keyed by user.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<UserId, SessionState>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the user's session, creating it on first contact, and marks
    /// it active at `now`.
    pub fn get_or_create(&mut self, user: UserId, now: Instant) -> &mut SessionState {
        let session = self
            .sessions
            .entry(user)
            .or_insert_with(|| SessionState::new(now));
        session.last_seen = now;
        session
    }

    #[must_use]
    pub fn get(&self, user: UserId) -> Option<&SessionState> {
        self.sessions.get(&user)
    }

    pub fn reset(&mut self, user: UserId) {
        if let Some(session) = self.sessions.get_mut(&user) {
            session.clear();
        }
    }

    pub fn remove(&mut self, user: UserId) -> Option<SessionState> {
        self.sessions.remove(&user)
    }

    /// Drops sessions not seen within `ttl` of `now`. Returns how many.
    pub fn evict_idle(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| now.saturating_duration_since(session.last_seen) < ttl);
        let evicted = before - self.sessions.len();
        if evicted > 0 {
            debug!("Evicted {} idle sessions", evicted);
        }
        evicted
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_lazily_and_touched() {
        let mut store = SessionStore::new();
        let start = Instant::now();
        assert!(store.get(1).is_none());

        store.get_or_create(1, start).begin(Mode::Browse);
        let later = start + Duration::from_secs(5);
        let session = store.get_or_create(1, later);
        assert_eq!(session.mode, Some(Mode::Browse));
        assert_eq!(session.step, Some(Step::ChooseExam));
        assert_eq!(session.last_seen(), later);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_reset_keeps_entry() {
        let mut store = SessionStore::new();
        let now = Instant::now();
        let session = store.get_or_create(1, now);
        session.begin(Mode::AddMaterial);
        session.selection.exam = Some("NEET".to_owned());

        store.reset(1);
        let session = store.get(1).unwrap();
        assert!(session.is_idle());
        assert_eq!(session.selection, Selection::default());
    }

    #[test]
    fn test_evict_idle() {
        let mut store = SessionStore::new();
        let start = Instant::now();
        store.get_or_create(1, start);
        store.get_or_create(2, start + Duration::from_secs(50));

        let evicted = store.evict_idle(start + Duration::from_secs(70), Duration::from_secs(60));
        assert_eq!(evicted, 1);
        assert!(store.get(1).is_none());
        assert!(store.get(2).is_some());

        assert!(store.remove(2).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn test_selection_path() {
        let mut selection = Selection {
            exam: Some("NEET".to_owned()),
            subject: Some("Biology".to_owned()),
            ..Selection::default()
        };
        assert!(selection.path().is_none());

        selection.publisher = Some("MTG".to_owned());
        selection.folder = Some("Botany".to_owned());
        let path = selection.path().unwrap();
        assert_eq!(path.folder.as_deref(), Some("Botany"));
        assert_eq!(path.to_string(), "NEET › Biology › MTG › Botany");
    }
}
