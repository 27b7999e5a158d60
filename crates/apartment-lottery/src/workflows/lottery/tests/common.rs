use std::sync::Arc;

use axum::response::Response;
use chrono::Utc;
use serde_json::Value;

use crate::config::LotteryConfig;
use crate::workflows::lottery::domain::{
    ApartmentId, Application, ApplicationId, ApplicationType, HoldId, Project, ProjectId,
    ReservationState,
};
use crate::workflows::lottery::intake::{create_application, ApartmentChoice, ApplicationSubmission};
use crate::workflows::lottery::ledger::ProjectLedger;
use crate::workflows::lottery::repository::{
    InMemoryLedgerRepository, LedgerRepository, RepositoryError,
};
use crate::workflows::lottery::service::LotteryService;

pub(super) fn apartment(id: &str) -> ApartmentId {
    ApartmentId(id.to_string())
}

pub(super) fn application_id(id: &str) -> ApplicationId {
    ApplicationId(id.to_string())
}

pub(super) fn project(id: &str, ownership_type: ApplicationType, apartments: &[&str]) -> Project {
    Project {
        id: ProjectId(id.to_string()),
        ownership_type,
        apartments: apartments.iter().map(|id| apartment(id)).collect(),
    }
}

pub(super) fn ledger(ownership_type: ApplicationType, apartments: &[&str]) -> ProjectLedger {
    ProjectLedger::new(project("project-1", ownership_type, apartments))
}

pub(super) fn submission(
    project_id: &str,
    external_id: &str,
    kind: ApplicationType,
    right_of_residence: Option<u32>,
    choices: &[(&str, u16)],
) -> ApplicationSubmission {
    ApplicationSubmission {
        external_id: Some(application_id(external_id)),
        project_id: ProjectId(project_id.to_string()),
        kind,
        applicants_count: 1,
        right_of_residence,
        apartments: choices
            .iter()
            .map(|(apartment_id, priority)| ApartmentChoice {
                apartment_id: apartment(apartment_id),
                priority: *priority,
            })
            .collect(),
    }
}

/// Submit a HITAS application straight into the ledger.
pub(super) fn hitas(ledger: &mut ProjectLedger, id: &str, choices: &[(&str, u16)]) -> Application {
    let project_id = ledger.project().id.0.clone();
    create_application(
        ledger,
        submission(&project_id, id, ApplicationType::Hitas, None, choices),
        Utc::now(),
    )
    .expect("hitas application accepted")
}

/// Submit a HASO application straight into the ledger.
pub(super) fn haso(
    ledger: &mut ProjectLedger,
    id: &str,
    right_of_residence: u32,
    choices: &[(&str, u16)],
) -> Application {
    let project_id = ledger.project().id.0.clone();
    create_application(
        ledger,
        submission(
            &project_id,
            id,
            ApplicationType::Haso,
            Some(right_of_residence),
            choices,
        ),
        Utc::now(),
    )
    .expect("haso application accepted")
}

pub(super) fn hold(ledger: &ProjectLedger, application: &str, apartment_id: &str) -> HoldId {
    ledger
        .hold_for(&application_id(application), &apartment(apartment_id))
        .expect("hold exists")
}

pub(super) fn state(ledger: &ProjectLedger, application: &str, apartment_id: &str) -> ReservationState {
    ledger
        .reservation_state(hold(ledger, application, apartment_id))
        .expect("reservation exists")
}

/// Number of RESERVED/REVIEW/OFFERED holds the application keeps.
pub(super) fn active_wins(ledger: &ProjectLedger, application: &str) -> usize {
    ledger
        .application_reservations(&application_id(application))
        .expect("application exists")
        .iter()
        .filter(|view| view.state.is_active_win())
        .count()
}

pub(super) fn build_service() -> (
    LotteryService<InMemoryLedgerRepository>,
    Arc<InMemoryLedgerRepository>,
) {
    let repository = Arc::new(InMemoryLedgerRepository::new());
    let service = LotteryService::new(repository.clone(), LotteryConfig::default());
    (service, repository)
}

pub(super) struct UnavailableRepository;

impl LedgerRepository for UnavailableRepository {
    fn create_project(&self, _project: Project) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("ledger offline".to_string()))
    }

    fn snapshot(&self, _project: &ProjectId) -> Result<Option<ProjectLedger>, RepositoryError> {
        Err(RepositoryError::Unavailable("ledger offline".to_string()))
    }

    fn locate_hold(&self, _hold: HoldId) -> Result<Option<ProjectId>, RepositoryError> {
        Err(RepositoryError::Unavailable("ledger offline".to_string()))
    }

    fn transaction<T, E, F>(&self, _project: &ProjectId, _work: F) -> Result<T, E>
    where
        E: From<RepositoryError>,
        F: FnOnce(&mut ProjectLedger) -> Result<T, E>,
    {
        Err(RepositoryError::Unavailable("ledger offline".to_string()).into())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
