use serde::Serialize;

use super::domain::{
    ApartmentId, Application, ApplicationApartment, ApplicationId, ApplicationType,
    CancellationRequest, HoldId, LotteryError, ReservationState, StateChangeEvent,
};

/// One queued hold as seen by the resolution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub hold_id: HoldId,
    pub application_id: ApplicationId,
    pub kind: ApplicationType,
    pub right_of_residence: Option<u32>,
    pub priority_number: u16,
    pub queue_position: usize,
    pub state: ReservationState,
}

/// Per-project view of the queues and reservation graph.
///
/// The engine only talks to storage through this trait; everything runs inside a
/// unit of work opened by a [`super::repository::LedgerRepository`].
pub trait QueueStore {
    /// Non-removed holds of the apartment, ordered by queue position.
    fn ordered_applications(&self, apartment: &ApartmentId)
        -> Result<Vec<QueueEntry>, LotteryError>;

    /// Drop the hold from its apartment queue and close the gap it leaves.
    fn remove_from_queue(&mut self, hold: HoldId, comment: Option<String>)
        -> Result<(), LotteryError>;

    /// Queue every hold of a freshly created application.
    fn add_to_queue(&mut self, application: &ApplicationId) -> Result<(), LotteryError>;

    fn hold(&self, hold: HoldId) -> Result<ApplicationApartment, LotteryError>;

    fn application(&self, application: &ApplicationId) -> Result<Application, LotteryError>;

    /// Holds of the application ordered by priority number.
    fn holds_of(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<ApplicationApartment>, LotteryError>;

    fn set_state(
        &mut self,
        hold: HoldId,
        next: ReservationState,
        cancellation: Option<CancellationRequest>,
    ) -> Result<StateChangeEvent, LotteryError>;

    fn apartments(&self) -> Vec<ApartmentId>;

    fn hold_count(&self) -> usize;

    fn application_count(&self) -> usize;
}
