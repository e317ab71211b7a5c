//! Catalog, its store and the wizard, with storage health tracking.

use tracing::{error, info, warn};

use crate::UserId;
use crate::catalog::{CatalogRoot, JsonCatalogStore, PersistenceError};
use crate::wizard::{Caller, Dispatcher};

/// Why the catalog on disk may not match what users see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProblem {
    /// The catalog could not be loaded and the bot started from the default
    /// one. Cleared by a restore.
    LoadFailed(String),

    /// The last save failed; cleared by the next successful save.
    SaveFailed(String),
}

impl StorageProblem {
    fn describe(&self) -> String {
        match self {
            Self::LoadFailed(reason) => format!(
                "The saved catalog could not be loaded ({reason}). The bot started from the \
                 default catalog. Use /restore to recover from the backup channel."
            ),
            Self::SaveFailed(reason) => format!(
                "The catalog could not be saved ({reason}). Recent changes exist only in memory."
            ),
        }
    }
}

/// Everything the materials bot keeps about the catalog.
#[derive(Debug)]
pub struct CatalogService {
    store: JsonCatalogStore,
    wizard: Dispatcher,
    owner: Option<UserId>,
    problem: Option<StorageProblem>,
    warned: bool,
}

impl CatalogService {
    /// Loads the catalog. A file that cannot be read is moved aside and the
    /// service starts degraded on the default catalog.
    #[must_use]
    pub fn open(store: JsonCatalogStore, owner: Option<UserId>) -> Self {
        let (root, problem) = match store.load() {
            Ok(root) => {
                let stats = root.stats();
                info!(
                    "Catalog loaded: {} exams, {} files, {} users",
                    stats.exams, stats.files, stats.users
                );
                (root, None)
            }
            Err(e) => {
                error!("Failed to load catalog: {}", e);
                if let PersistenceError::Corrupt { .. } = e {
                    if let Err(move_err) = store.quarantine() {
                        warn!("Could not move corrupt catalog aside: {}", move_err);
                    }
                }
                (CatalogRoot::default(), Some(StorageProblem::LoadFailed(e.to_string())))
            }
        };

        let mut service = Self {
            store,
            wizard: Dispatcher::new(root),
            owner,
            problem,
            warned: false,
        };
        service.sync_delete_lock();
        service
    }

    fn sync_delete_lock(&mut self) {
        self.wizard.lock_deletes(self.problem.is_some());
    }

    /// Admins are the owner plus everyone in the admin list.
    #[must_use]
    pub fn is_admin(&self, user: UserId) -> bool {
        self.is_owner(user) || self.wizard.catalog().meta.is_admin(user)
    }

    #[must_use]
    pub fn is_owner(&self, user: UserId) -> bool {
        self.owner == Some(user)
    }

    #[must_use]
    pub fn caller(&self, user: UserId) -> Caller {
        Caller {
            id: user,
            is_admin: self.is_admin(user),
        }
    }

    #[must_use]
    pub const fn catalog(&self) -> &CatalogRoot {
        self.wizard.catalog()
    }

    pub fn catalog_mut(&mut self) -> &mut CatalogRoot {
        self.wizard.catalog_mut()
    }

    pub fn wizard_mut(&mut self) -> &mut Dispatcher {
        &mut self.wizard
    }

    /// Whether destructive operations are currently refused.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.problem.is_some()
    }

    #[must_use]
    pub const fn problem(&self) -> Option<&StorageProblem> {
        self.problem.as_ref()
    }

    /// Records a user; returns `true` the first time they are seen.
    pub fn register(&mut self, user: UserId) -> bool {
        self.wizard.catalog_mut().meta.register_user(user)
    }

    /// Writes the catalog and updates the storage health.
    pub fn persist(&mut self) -> Result<(), PersistenceError> {
        let load_failed = matches!(self.problem, Some(StorageProblem::LoadFailed(_)));

        let result = match self.store.save(self.wizard.catalog()) {
            Ok(()) => {
                if !load_failed && self.problem.take().is_some() {
                    info!("Catalog storage recovered");
                }
                Ok(())
            }
            Err(e) => {
                error!("Failed to save catalog: {}", e);
                if !load_failed {
                    self.problem = Some(StorageProblem::SaveFailed(e.to_string()));
                    self.warned = false;
                }
                Err(e)
            }
        };
        self.sync_delete_lock();
        result
    }

    /// Replaces the catalog with a restored one and saves it. Admins and
    /// users are merged so nobody loses access by restoring an old backup.
    pub fn restore(&mut self, mut root: CatalogRoot) -> Result<(), PersistenceError> {
        let current = &self.wizard.catalog().meta;
        root.meta.admins.extend(current.admins.iter().copied());
        root.meta.users.extend(current.users.iter().copied());

        self.wizard.replace_catalog(root);
        if let Some(StorageProblem::LoadFailed(_)) = self.problem {
            self.problem = None;
        }
        self.persist()
    }

    /// The storage warning for an admin, once per problem.
    pub fn take_warning(&mut self, user: UserId) -> Option<String> {
        if self.warned || !self.is_admin(user) {
            return None;
        }
        let problem = self.problem.as_ref()?;
        self.warned = true;
        Some(format!(
            "⚠️ {} Deleting is disabled until this is resolved.",
            problem.describe()
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn open_in(dir: &tempfile::TempDir, owner: Option<UserId>) -> CatalogService {
        CatalogService::open(JsonCatalogStore::new(dir.path().join("catalog.json")), owner)
    }

    #[test]
    fn test_owner_is_admin() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = open_in(&dir, Some(1));
        assert!(service.is_admin(1));
        assert!(!service.is_admin(2));

        service.catalog_mut().meta.add_admin(2);
        assert!(service.is_admin(2));
        assert!(!service.is_owner(2));
    }

    #[test]
    fn test_register_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = open_in(&dir, None);
        assert!(service.register(5));
        assert!(!service.register(5));
        service.persist().unwrap();

        let reopened = open_in(&dir, None);
        assert!(reopened.catalog().meta.users.contains(&5));
        assert!(!reopened.is_degraded());
    }

    #[test]
    fn test_corrupt_catalog_degrades_until_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let mut service = open_in(&dir, Some(1));
        assert!(service.is_degraded());
        assert!(!path.exists());

        service.register(9);
        service.persist().unwrap();
        assert!(service.is_degraded());

        assert!(service.take_warning(9).is_none());
        let warning = service.take_warning(1).unwrap();
        assert!(warning.contains("/restore"));
        assert!(service.take_warning(1).is_none());

        let wizard = service.wizard_mut();
        wizard.handle_text(Caller::admin(1), "🗑 Delete Subject", Instant::now());
        assert!(wizard.session(1).unwrap().is_idle());

        service.restore(CatalogRoot::empty()).unwrap();
        assert!(!service.is_degraded());
        let wizard = service.wizard_mut();
        wizard.handle_text(Caller::admin(1), "🗑 Delete Subject", Instant::now());
        assert!(!wizard.session(1).unwrap().is_idle());
        assert!(path.exists());
        assert!(service.catalog().meta.users.contains(&9));
        assert!(service.catalog().exams.is_empty());
    }

    #[test]
    fn test_failed_save_degrades_until_next_save() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        let store = JsonCatalogStore::new(nested.join("catalog.json"));
        let mut service = CatalogService::open(store, Some(1));
        assert!(!service.is_degraded());

        // A file where the directory should be makes every write fail.
        std::fs::write(&nested, "").unwrap();

        assert!(service.persist().is_err());
        assert!(matches!(service.problem(), Some(StorageProblem::SaveFailed(_))));
        assert!(service.take_warning(1).is_some());

        std::fs::remove_file(&nested).unwrap();
        service.persist().unwrap();
        assert!(!service.is_degraded());
    }
}
