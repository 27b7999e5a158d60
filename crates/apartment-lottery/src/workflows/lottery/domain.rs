use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::intake::ApplicationValidationError;
use super::repository::RepositoryError;
use super::state::InvalidTransition;

/// Identifier of a housing project (a set of apartments sold in one lottery).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub String);

/// Identifier of a single apartment within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApartmentId(pub String);

/// External identifier of a submitted application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Identifier of an application-apartment hold and its reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HoldId(pub u64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ApartmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for HoldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hold-{:06}", self.0)
    }
}

/// Ownership model of the project an application targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    /// Right-of-residence housing, allocated by right-of-residence number.
    Haso,
    /// Price-regulated ownership, allocated by lottery queue position.
    Hitas,
    /// Partially price-regulated ownership, allocated like HITAS.
    #[serde(rename = "puolihitas")]
    HalfHitas,
}

impl ApplicationType {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationType::Haso => "haso",
            ApplicationType::Hitas => "hitas",
            ApplicationType::HalfHitas => "puolihitas",
        }
    }

    /// HALF-HITAS applications may be submitted to HITAS projects and vice versa.
    pub fn is_compatible_with(self, other: ApplicationType) -> bool {
        matches!(
            (self, other),
            (ApplicationType::Haso, ApplicationType::Haso)
                | (
                    ApplicationType::Hitas | ApplicationType::HalfHitas,
                    ApplicationType::Hitas | ApplicationType::HalfHitas
                )
        )
    }
}

/// Allocation state of a single (application, apartment) reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    Submitted,
    Reserved,
    Review,
    Offered,
    Canceled,
}

impl ReservationState {
    pub const fn label(self) -> &'static str {
        match self {
            ReservationState::Submitted => "submitted",
            ReservationState::Reserved => "reserved",
            ReservationState::Review => "review",
            ReservationState::Offered => "offered",
            ReservationState::Canceled => "canceled",
        }
    }
}

impl fmt::Display for ReservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a reservation ended up canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    #[default]
    Canceled,
    Terminated,
    ReservationAgreementCanceled,
    /// Released automatically because the applicant won a more preferred apartment.
    OtherApartmentReserved,
}

impl CancellationReason {
    pub const fn label(self) -> &'static str {
        match self {
            CancellationReason::Canceled => "canceled",
            CancellationReason::Terminated => "terminated",
            CancellationReason::ReservationAgreementCanceled => "reservation_agreement_canceled",
            CancellationReason::OtherApartmentReserved => "other_apartment_reserved",
        }
    }
}

/// Project offered in a single lottery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub ownership_type: ApplicationType,
    pub apartments: Vec<ApartmentId>,
}

impl Project {
    pub fn offers(&self, apartment: &ApartmentId) -> bool {
        self.apartments.contains(apartment)
    }

    pub fn validate(&self) -> Result<(), ProjectValidationError> {
        if self.apartments.is_empty() {
            return Err(ProjectValidationError::NoApartments);
        }
        let mut seen = std::collections::BTreeSet::new();
        for apartment in &self.apartments {
            if !seen.insert(apartment) {
                return Err(ProjectValidationError::DuplicateApartment(apartment.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectValidationError {
    #[error("project must offer at least one apartment")]
    NoApartments,
    #[error("apartment {0} listed more than once")]
    DuplicateApartment(ApartmentId),
}

/// One applicant household's submission for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub project_id: ProjectId,
    pub applicants_count: u8,
    #[serde(rename = "type")]
    pub kind: ApplicationType,
    /// Right-of-residence number; only HASO applications carry one.
    pub right_of_residence: Option<u32>,
    pub created_at: DateTime<Utc>,
    /// Holds ordered by priority number, most preferred first.
    pub holds: Vec<HoldId>,
}

/// Join entity linking an application to one requested apartment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationApartment {
    pub id: HoldId,
    pub application_id: ApplicationId,
    pub apartment_id: ApartmentId,
    pub priority_number: u16,
    pub reservation: Reservation,
}

/// Mutable allocation state owned by an [`ApplicationApartment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub apartment_id: ApartmentId,
    /// Zero-based queue position; `None` once removed from the queue.
    pub queue_position: Option<usize>,
    pub state: ReservationState,
    pub state_changed_at: DateTime<Utc>,
    pub cancellation_reason: Option<CancellationReason>,
    pub history: Vec<StateChangeEvent>,
}

/// Audit record emitted for every reservation state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChangeEvent {
    pub hold_id: HoldId,
    pub apartment_id: ApartmentId,
    pub from: Option<ReservationState>,
    pub to: ReservationState,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<CancellationReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueChangeKind {
    Added,
    Removed,
}

/// Audit record for queue membership changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueChangeEvent {
    pub hold_id: HoldId,
    pub apartment_id: ApartmentId,
    pub kind: QueueChangeKind,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Queue snapshot taken when the lottery seeded an apartment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotteryEvent {
    pub apartment_id: ApartmentId,
    pub executed_at: DateTime<Utc>,
    /// Holds in queue order; the index is the hold's lottery position.
    pub results: Vec<HoldId>,
}

impl LotteryEvent {
    pub fn position_of(&self, hold: HoldId) -> Option<usize> {
        self.results.iter().position(|candidate| *candidate == hold)
    }
}

/// Explicit cancellation payload accepted from callers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CancellationRequest {
    #[serde(default)]
    pub reason: CancellationReason,
    #[serde(default)]
    pub comment: Option<String>,
}

impl CancellationRequest {
    pub fn new(reason: CancellationReason) -> Self {
        Self {
            reason,
            comment: None,
        }
    }

    pub(crate) fn automatic() -> Self {
        Self::new(CancellationReason::OtherApartmentReserved)
    }
}

/// Read model of one reservation, used by the router and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationView {
    pub hold_id: HoldId,
    pub application_id: ApplicationId,
    pub apartment_id: ApartmentId,
    pub priority_number: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_of_residence: Option<u32>,
    pub queue_position: Option<usize>,
    pub lottery_position: Option<usize>,
    pub state: ReservationState,
    pub state_changed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<CancellationReason>,
}

/// Errors surfaced by the reservation engine and the lottery service.
#[derive(Debug, thiserror::Error)]
pub enum LotteryError {
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("project {project_id} does not have applications")]
    NoApplications { project_id: ProjectId },
    #[error("lottery already executed for project {0}")]
    LotteryAlreadyExecuted(ProjectId),
    #[error("unknown project {0}")]
    UnknownProject(ProjectId),
    #[error("unknown apartment {0}")]
    UnknownApartment(ApartmentId),
    #[error("unknown application {0}")]
    UnknownApplication(ApplicationId),
    #[error("unknown reservation {0}")]
    UnknownHold(HoldId),
    #[error("reservation {0} is not queued")]
    NotQueued(HoldId),
    #[error("application {0} already exists")]
    DuplicateApplication(ApplicationId),
    #[error(transparent)]
    InvalidApplication(#[from] ApplicationValidationError),
    #[error(transparent)]
    InvalidProject(#[from] ProjectValidationError),
    #[error("cascade did not settle after {iterations} resolutions")]
    CascadeDiverged { iterations: usize },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
