use serde::Serialize;
use tracing::{debug, info};

use super::domain::{ApartmentId, HoldId, LotteryError, ReservationState};
use super::policy::AllocationPolicy;
use super::store::QueueStore;

/// Outcome of deciding the winner(s) of one apartment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub apartment_id: ApartmentId,
    pub policy: Option<AllocationPolicy>,
    pub winners: Vec<HoldId>,
    pub state: Option<ReservationState>,
    /// Winners whose state actually changed during this resolution.
    pub changed: Vec<HoldId>,
}

impl Resolution {
    fn vacant(apartment_id: ApartmentId) -> Self {
        Self {
            apartment_id,
            policy: None,
            winners: Vec::new(),
            state: None,
            changed: Vec::new(),
        }
    }

    pub fn has_winner(&self) -> bool {
        !self.winners.is_empty()
    }
}

/// Mark the current winner(s) of the apartment queue.
///
/// The policy follows the allocation type of the queued applications. Winners already
/// sitting in an equal or later win state are left alone, so resolving a settled
/// apartment again changes nothing.
pub fn resolve_apartment<S>(store: &mut S, apartment: &ApartmentId) -> Result<Resolution, LotteryError>
where
    S: QueueStore + ?Sized,
{
    let queue = store.ordered_applications(apartment)?;
    let Some(policy) = queue
        .first()
        .map(|entry| AllocationPolicy::for_type(entry.kind))
    else {
        debug!(%apartment, "queue empty, no winner");
        return Ok(Resolution::vacant(apartment.clone()));
    };
    let Some(selection) = policy.select_winners(&queue) else {
        return Ok(Resolution::vacant(apartment.clone()));
    };

    let mut changed = Vec::new();
    for entry in queue
        .iter()
        .filter(|entry| selection.holds.contains(&entry.hold_id))
    {
        if entry.state.satisfies(selection.target) {
            continue;
        }
        store.set_state(entry.hold_id, selection.target, None)?;
        changed.push(entry.hold_id);
    }

    info!(
        %apartment,
        policy = policy.label(),
        winners = selection.holds.len(),
        changed = changed.len(),
        state = %selection.target,
        "apartment winner resolved"
    );

    Ok(Resolution {
        apartment_id: apartment.clone(),
        policy: Some(policy),
        winners: selection.holds,
        state: Some(selection.target),
        changed,
    })
}
