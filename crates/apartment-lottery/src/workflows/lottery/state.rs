//! Reservation state machine.
//!
//! ```text
//! SUBMITTED ──► REVIEW ──► RESERVED ──► OFFERED
//!     │            │           │            │
//!     └────────────┴─────┬─────┴────────────┘
//!                        ▼
//!                    CANCELED
//! ```
//!
//! `SUBMITTED` may also jump straight to `RESERVED`. Nothing leads back to
//! `SUBMITTED` and `CANCELED` is terminal.

use chrono::{DateTime, Utc};

use super::domain::{
    ApartmentId, CancellationReason, HoldId, Reservation, ReservationState, StateChangeEvent,
};

/// Attempted state change that the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid reservation transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: ReservationState,
    pub to: ReservationState,
}

impl ReservationState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, ReservationState::Canceled)
    }

    /// States in which the applicant actively holds the apartment.
    pub const fn is_active_win(self) -> bool {
        matches!(
            self,
            ReservationState::Reserved | ReservationState::Review | ReservationState::Offered
        )
    }

    pub fn can_transition_to(self, next: ReservationState) -> bool {
        match (self, next) {
            (Self::Canceled, _) => false,
            (_, Self::Canceled) => true,
            (Self::Submitted, Self::Reserved | Self::Review) => true,
            (Self::Review, Self::Reserved) => true,
            (Self::Reserved, Self::Offered) => true,
            _ => false,
        }
    }

    /// Ordering of the forward path, used to keep re-resolution idempotent.
    const fn progress(self) -> u8 {
        match self {
            ReservationState::Submitted => 0,
            ReservationState::Review => 1,
            ReservationState::Reserved => 2,
            ReservationState::Offered => 3,
            ReservationState::Canceled => 4,
        }
    }

    /// Whether a winner already sits at or beyond `target` on the win path.
    pub fn satisfies(self, target: ReservationState) -> bool {
        self == target || (self.is_active_win() && self.progress() > target.progress())
    }
}

impl Reservation {
    pub fn new(apartment_id: ApartmentId, now: DateTime<Utc>) -> Self {
        Self {
            apartment_id,
            queue_position: None,
            state: ReservationState::Submitted,
            state_changed_at: now,
            cancellation_reason: None,
            history: Vec::new(),
        }
    }

    /// Move to `next`, recording the change in the reservation history.
    pub fn transition(
        &mut self,
        hold_id: HoldId,
        next: ReservationState,
        cancellation: Option<(CancellationReason, Option<String>)>,
        at: DateTime<Utc>,
    ) -> Result<StateChangeEvent, InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        let (cancellation_reason, comment) = match cancellation {
            Some((reason, comment)) if next == ReservationState::Canceled => (Some(reason), comment),
            _ => (None, None),
        };

        let event = StateChangeEvent {
            hold_id,
            apartment_id: self.apartment_id.clone(),
            from: Some(self.state),
            to: next,
            at,
            cancellation_reason,
            comment,
        };

        self.state = next;
        self.state_changed_at = at;
        if cancellation_reason.is_some() {
            self.cancellation_reason = cancellation_reason;
        }
        self.history.push(event.clone());
        Ok(event)
    }
}
