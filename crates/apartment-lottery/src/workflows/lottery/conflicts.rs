use serde::Serialize;
use tracing::debug;

use super::cascade::cancel_hold;
use super::domain::{ApartmentId, CancellationRequest, HoldId, LotteryError};
use super::policy::{AllocationPolicy, ConflictAction};
use super::store::QueueStore;

/// Side effects of releasing a winner's less preferred holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictResolution {
    pub canceled: Vec<HoldId>,
    /// Apartments that lost their winner through a cancellation.
    pub canceled_winners: Vec<ApartmentId>,
    /// Apartments where the applicant still heads the queue.
    pub deferred: Vec<ApartmentId>,
}

impl ConflictResolution {
    /// Apartments whose winner has to be decided again.
    pub fn needs_resolution(&self) -> impl Iterator<Item = &ApartmentId> {
        self.canceled_winners.iter().chain(self.deferred.iter())
    }
}

/// Cancel the holds the winning applicant ranked below `winner`.
///
/// An applicant keeps only one apartment per project, so every hold with a larger
/// priority number is released back to the next applicants in those queues.
pub fn cancel_lower_priority<S>(
    store: &mut S,
    winner: HoldId,
    policy: AllocationPolicy,
    cancel_reserved: bool,
) -> Result<ConflictResolution, LotteryError>
where
    S: QueueStore + ?Sized,
{
    let winning = store.hold(winner)?;
    let mut outcome = ConflictResolution::default();

    let lower_priority = store
        .holds_of(&winning.application_id)?
        .into_iter()
        .filter(|hold| hold.id != winner && hold.priority_number > winning.priority_number)
        .map(|hold| hold.id)
        .collect::<Vec<_>>();

    for hold_id in lower_priority {
        let hold = store.hold(hold_id)?;
        let action = policy.conflict_action(
            hold.reservation.state,
            hold.reservation.queue_position,
            cancel_reserved,
        );

        match action {
            ConflictAction::Keep => {}
            ConflictAction::Defer => {
                debug!(
                    hold = %hold_id,
                    apartment = %hold.apartment_id,
                    "lower priority hold heads its queue, deferring"
                );
                outcome.deferred.push(hold.apartment_id);
            }
            ConflictAction::Cancel => {
                let cancellation = cancel_hold(store, hold_id, CancellationRequest::automatic())?;
                if cancellation.was_winning {
                    outcome.canceled_winners.push(cancellation.apartment_id);
                }
                outcome.canceled.push(hold_id);
            }
        }
    }

    Ok(outcome)
}
