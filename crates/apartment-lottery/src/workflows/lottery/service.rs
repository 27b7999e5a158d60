use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::config::LotteryConfig;

use super::cascade::{self, reserve_apartments, CancellationOutcome, CascadeReport};
use super::domain::{
    ApartmentId, Application, ApplicationId, CancellationRequest, HoldId, LotteryError, Project,
    ProjectId, ReservationState, ReservationView,
};
use super::intake::{create_application, ApplicationSubmission};
use super::ledger::ProjectLedger;
use super::repository::{LedgerRepository, RepositoryError};
use super::state::InvalidTransition;
use super::store::QueueStore;

/// Facade owning the repository and the unit-of-work boundary of every operation.
pub struct LotteryService<R> {
    repository: Arc<R>,
    config: LotteryConfig,
}

/// Result of a lottery run over a whole project.
#[derive(Debug, Clone, Serialize)]
pub struct LotteryOutcome {
    pub project_id: ProjectId,
    pub executed_at: DateTime<Utc>,
    pub applications: usize,
    pub report: CascadeReport,
}

/// Stored application plus the reservations created for it.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationReceipt {
    pub application: Application,
    pub reservations: Vec<ReservationView>,
}

impl<R> LotteryService<R>
where
    R: LedgerRepository + 'static,
{
    pub fn new(repository: Arc<R>, config: LotteryConfig) -> Self {
        Self { repository, config }
    }

    pub fn config(&self) -> LotteryConfig {
        self.config
    }

    pub fn register_project(&self, project: Project) -> Result<Project, LotteryError> {
        project.validate()?;
        self.repository.create_project(project.clone())?;
        info!(
            project = %project.id,
            ownership = project.ownership_type.label(),
            apartments = project.apartments.len(),
            "project registered"
        );
        Ok(project)
    }

    pub fn submit_application(
        &self,
        submission: ApplicationSubmission,
    ) -> Result<ApplicationReceipt, LotteryError> {
        let project_id = submission.project_id.clone();
        let now = Utc::now();
        self.in_project(&project_id, |ledger| {
            let application = create_application(ledger, submission, now)?;
            let reservations = ledger.application_reservations(&application.id)?;
            Ok(ApplicationReceipt {
                application,
                reservations,
            })
        })
    }

    /// Seed every apartment of the project into the reservation cascade.
    pub fn run_lottery_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<LotteryOutcome, LotteryError> {
        let executed_at = Utc::now();
        let cancel_reserved = self.config.cancel_reserved;

        let outcome = self.in_project(project_id, |ledger| {
            let applications = ledger.application_count();
            if applications == 0 {
                return Err(LotteryError::NoApplications {
                    project_id: project_id.clone(),
                });
            }
            if ledger.lottery_executed() {
                return Err(LotteryError::LotteryAlreadyExecuted(project_id.clone()));
            }

            ledger.record_lottery(executed_at);
            let apartments = ledger.apartments();
            let report = reserve_apartments(ledger, apartments, cancel_reserved)?;

            Ok(LotteryOutcome {
                project_id: project_id.clone(),
                executed_at,
                applications,
                report,
            })
        })?;

        info!(
            project = %project_id,
            applications = outcome.applications,
            iterations = outcome.report.iterations,
            canceled = outcome.report.canceled.len(),
            "lottery executed"
        );
        Ok(outcome)
    }

    pub fn cancel_application_hold(
        &self,
        hold: HoldId,
        request: CancellationRequest,
    ) -> Result<CancellationOutcome, LotteryError> {
        let project_id = self.project_of(hold)?;
        let requeue_cancels_reserved = self.config.requeue_cancels_reserved;
        self.in_project(&project_id, |ledger| {
            cascade::cancel_application_hold(ledger, hold, request, requeue_cancels_reserved)
        })
    }

    /// Move a reserved hold to OFFERED.
    pub fn offer(&self, hold: HoldId) -> Result<ReservationView, LotteryError> {
        self.advance(hold, ReservationState::Reserved, ReservationState::Offered)
    }

    /// Settle a tie: the REVIEW hold becomes RESERVED.
    pub fn confirm_review(&self, hold: HoldId) -> Result<ReservationView, LotteryError> {
        self.advance(hold, ReservationState::Review, ReservationState::Reserved)
    }

    pub fn apartment_reservations(
        &self,
        project_id: &ProjectId,
        apartment: &ApartmentId,
    ) -> Result<Vec<ReservationView>, LotteryError> {
        self.ledger(project_id)?.apartment_reservations(apartment)
    }

    pub fn application_reservations(
        &self,
        project_id: &ProjectId,
        application: &ApplicationId,
    ) -> Result<Vec<ReservationView>, LotteryError> {
        self.ledger(project_id)?.application_reservations(application)
    }

    pub fn ledger(&self, project_id: &ProjectId) -> Result<ProjectLedger, LotteryError> {
        self.repository
            .snapshot(project_id)?
            .ok_or_else(|| LotteryError::UnknownProject(project_id.clone()))
    }

    fn advance(
        &self,
        hold: HoldId,
        expected: ReservationState,
        next: ReservationState,
    ) -> Result<ReservationView, LotteryError> {
        let project_id = self.project_of(hold)?;
        self.in_project(&project_id, |ledger| {
            let current = ledger.hold(hold)?.reservation.state;
            if current != expected {
                return Err(InvalidTransition {
                    from: current,
                    to: next,
                }
                .into());
            }
            ledger.set_state(hold, next, None)?;
            ledger.reservation_view(hold)
        })
    }

    fn project_of(&self, hold: HoldId) -> Result<ProjectId, LotteryError> {
        self.repository
            .locate_hold(hold)?
            .ok_or(LotteryError::UnknownHold(hold))
    }

    fn in_project<T, F>(&self, project_id: &ProjectId, work: F) -> Result<T, LotteryError>
    where
        F: FnOnce(&mut ProjectLedger) -> Result<T, LotteryError>,
    {
        self.repository
            .transaction(project_id, work)
            .map_err(|error| match error {
                LotteryError::Repository(RepositoryError::NotFound) => {
                    LotteryError::UnknownProject(project_id.clone())
                }
                other => other,
            })
    }
}
