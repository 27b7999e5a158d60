use serde::{Deserialize, Serialize};

use super::domain::{ApplicationType, HoldId, ReservationState};
use super::store::QueueEntry;

/// Allocation strategy applied to an apartment queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// HASO: smallest right-of-residence number wins, ties go to review.
    Rank,
    /// HITAS: whoever is first in the queue wins.
    Position,
}

/// Winners chosen for a queue and the state they should end up in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinnerSelection {
    pub target: ReservationState,
    pub holds: Vec<HoldId>,
}

/// What the conflict resolver does with one lower-priority hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
    Cancel,
    /// Still contending at the head of its queue; settled when that apartment is resolved.
    Defer,
    Keep,
}

impl AllocationPolicy {
    pub fn for_type(kind: ApplicationType) -> Self {
        match kind {
            ApplicationType::Haso => AllocationPolicy::Rank,
            ApplicationType::Hitas | ApplicationType::HalfHitas => AllocationPolicy::Position,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            AllocationPolicy::Rank => "rank",
            AllocationPolicy::Position => "position",
        }
    }

    pub fn select_winners(self, queue: &[QueueEntry]) -> Option<WinnerSelection> {
        match self {
            AllocationPolicy::Position => queue.first().map(|head| WinnerSelection {
                target: ReservationState::Reserved,
                holds: vec![head.hold_id],
            }),
            AllocationPolicy::Rank => {
                let best = queue.iter().map(rank_of).min()?;
                let holds: Vec<HoldId> = queue
                    .iter()
                    .filter(|entry| rank_of(entry) == best)
                    .map(|entry| entry.hold_id)
                    .collect();
                let target = if holds.len() > 1 {
                    ReservationState::Review
                } else {
                    ReservationState::Reserved
                };
                Some(WinnerSelection { target, holds })
            }
        }
    }

    pub fn conflict_action(
        self,
        state: ReservationState,
        queue_position: Option<usize>,
        cancel_reserved: bool,
    ) -> ConflictAction {
        if !is_releasable(state, cancel_reserved) {
            return ConflictAction::Keep;
        }

        match (self, queue_position) {
            (AllocationPolicy::Rank, Some(0)) => ConflictAction::Defer,
            _ => ConflictAction::Cancel,
        }
    }

    /// Whether cancelling a hold in `state` leaves its apartment without a winner.
    pub fn vacates_winner(self, state: ReservationState) -> bool {
        match self {
            AllocationPolicy::Rank => {
                matches!(state, ReservationState::Reserved | ReservationState::Review)
            }
            AllocationPolicy::Position => {
                matches!(state, ReservationState::Reserved | ReservationState::Offered)
            }
        }
    }
}

/// States a lower-priority hold may be released from.
pub fn is_releasable(state: ReservationState, cancel_reserved: bool) -> bool {
    match state {
        ReservationState::Submitted => true,
        ReservationState::Reserved | ReservationState::Review => cancel_reserved,
        ReservationState::Offered | ReservationState::Canceled => false,
    }
}

fn rank_of(entry: &QueueEntry) -> u32 {
    entry.right_of_residence.unwrap_or(u32::MAX)
}
