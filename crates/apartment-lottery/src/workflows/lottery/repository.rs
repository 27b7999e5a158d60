use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::warn;

use super::domain::{HoldId, Project, ProjectId};
use super::ledger::ProjectLedger;
use super::store::QueueStore;

/// Storage abstraction so the service can run against any backing store.
///
/// A transaction is the unit of work of the engine: it has exclusive access to one
/// project's ledger and either commits every change or none of them.
pub trait LedgerRepository: Send + Sync {
    fn create_project(&self, project: Project) -> Result<(), RepositoryError>;

    /// Read-only copy of the project ledger.
    fn snapshot(&self, project: &ProjectId) -> Result<Option<ProjectLedger>, RepositoryError>;

    /// Project owning the hold, if any.
    fn locate_hold(&self, hold: HoldId) -> Result<Option<ProjectId>, RepositoryError>;

    fn transaction<T, E, F>(&self, project: &ProjectId, work: F) -> Result<T, E>
    where
        E: From<RepositoryError>,
        F: FnOnce(&mut ProjectLedger) -> Result<T, E>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Process-local repository with one lock per project.
///
/// Hold lookups go through `hold_index`, which never touches a project lock, so work in
/// one project does not wait on a unit of work running in another.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedgerRepository {
    projects: Arc<RwLock<HashMap<ProjectId, Arc<Mutex<ProjectLedger>>>>>,
    hold_index: Arc<RwLock<HashMap<HoldId, ProjectId>>>,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn project_cell(&self, project: &ProjectId) -> Option<Arc<Mutex<ProjectLedger>>> {
        self.projects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(project)
            .cloned()
    }
}

impl LedgerRepository for InMemoryLedgerRepository {
    fn create_project(&self, project: Project) -> Result<(), RepositoryError> {
        let mut projects = self
            .projects
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if projects.contains_key(&project.id) {
            return Err(RepositoryError::Conflict);
        }
        projects.insert(
            project.id.clone(),
            Arc::new(Mutex::new(ProjectLedger::new(project))),
        );
        Ok(())
    }

    fn snapshot(&self, project: &ProjectId) -> Result<Option<ProjectLedger>, RepositoryError> {
        Ok(self.project_cell(project).map(|cell| {
            cell.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }))
    }

    fn locate_hold(&self, hold: HoldId) -> Result<Option<ProjectId>, RepositoryError> {
        Ok(self
            .hold_index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&hold)
            .cloned())
    }

    fn transaction<T, E, F>(&self, project: &ProjectId, work: F) -> Result<T, E>
    where
        E: From<RepositoryError>,
        F: FnOnce(&mut ProjectLedger) -> Result<T, E>,
    {
        let cell = self.project_cell(project).ok_or(RepositoryError::NotFound)?;
        let mut guard = cell.lock().unwrap_or_else(PoisonError::into_inner);

        let mut working = guard.clone();
        let holds_before = guard.hold_count();
        match work(&mut working) {
            Ok(value) => {
                if working.hold_count() != holds_before {
                    let mut index = self
                        .hold_index
                        .write()
                        .unwrap_or_else(PoisonError::into_inner);
                    for hold in working.hold_ids() {
                        index.entry(hold).or_insert_with(|| project.clone());
                    }
                }
                *guard = working;
                Ok(value)
            }
            Err(error) => {
                warn!(project = %project, "unit of work failed, rolling back");
                Err(error)
            }
        }
    }
}
