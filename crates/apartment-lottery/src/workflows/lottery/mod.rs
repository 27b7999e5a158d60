//! Apartment lottery: queues, winner resolution and the reservation cascade.
//!
//! HASO projects allocate by right-of-residence number, HITAS and HALF-HITAS projects by
//! lottery queue position. Every mutating operation runs inside one repository
//! transaction, so a failed cascade leaves the project untouched.

pub mod cascade;
pub mod conflicts;
pub mod domain;
pub mod intake;
pub mod ledger;
pub mod policy;
pub mod repository;
pub mod resolution;
pub mod router;
pub mod service;
mod state;
pub mod store;

#[cfg(test)]
mod tests;

pub use cascade::{
    cancel_application_hold, cancel_hold, reserve_apartments, CancellationOutcome, CascadeReport,
    HoldCancellation,
};
pub use conflicts::{cancel_lower_priority, ConflictResolution};
pub use domain::{
    ApartmentId, Application, ApplicationApartment, ApplicationId, ApplicationType,
    CancellationReason, CancellationRequest, HoldId, LotteryError, LotteryEvent, Project,
    ProjectId, ProjectValidationError, QueueChangeEvent, QueueChangeKind, Reservation,
    ReservationState, ReservationView, StateChangeEvent,
};
pub use intake::{
    create_application, ApartmentChoice, ApplicationSubmission, ApplicationValidationError,
};
pub use ledger::ProjectLedger;
pub use policy::AllocationPolicy;
pub use repository::{InMemoryLedgerRepository, LedgerRepository, RepositoryError};
pub use resolution::{resolve_apartment, Resolution};
pub use router::{lottery_router, status_for};
pub use service::{ApplicationReceipt, LotteryOutcome, LotteryService};
pub use state::InvalidTransition;
pub use store::{QueueEntry, QueueStore};
