use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::conflicts::cancel_lower_priority;
use super::domain::{
    ApartmentId, CancellationRequest, HoldId, LotteryError, ReservationState,
};
use super::policy::{is_releasable, AllocationPolicy};
use super::resolution::{resolve_apartment, Resolution};
use super::store::QueueStore;

/// Record of one reservation leaving its queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoldCancellation {
    pub hold_id: HoldId,
    pub apartment_id: ApartmentId,
    pub previous_state: ReservationState,
    pub former_position: Option<usize>,
    /// The hold occupied a winning slot, so its apartment needs a new winner.
    pub was_winning: bool,
}

/// Cancel a reservation and compact its apartment queue.
pub fn cancel_hold<S>(
    store: &mut S,
    hold_id: HoldId,
    request: CancellationRequest,
) -> Result<HoldCancellation, LotteryError>
where
    S: QueueStore + ?Sized,
{
    let hold = store.hold(hold_id)?;
    let previous_state = hold.reservation.state;
    let former_position = hold.reservation.queue_position;
    let comment = request.comment.clone();

    store.set_state(hold_id, ReservationState::Canceled, Some(request))?;
    if former_position.is_some() {
        store.remove_from_queue(hold_id, comment)?;
    }

    Ok(HoldCancellation {
        hold_id,
        apartment_id: hold.apartment_id,
        previous_state,
        former_position,
        was_winning: former_position == Some(0) || previous_state.is_active_win(),
    })
}

/// Release queue entries of applicants who already won a more preferred apartment.
pub fn release_superseded<S>(
    store: &mut S,
    apartment: &ApartmentId,
    cancel_reserved: bool,
) -> Result<Vec<HoldId>, LotteryError>
where
    S: QueueStore + ?Sized,
{
    let mut released = Vec::new();
    for entry in store.ordered_applications(apartment)? {
        if !is_releasable(entry.state, cancel_reserved) {
            continue;
        }
        let superseded = store.holds_of(&entry.application_id)?.iter().any(|other| {
            other.id != entry.hold_id
                && other.priority_number < entry.priority_number
                && other.reservation.state.is_active_win()
        });
        if superseded {
            debug!(hold = %entry.hold_id, %apartment, "applicant already holds a preferred apartment");
            cancel_hold(store, entry.hold_id, CancellationRequest::automatic())?;
            released.push(entry.hold_id);
        }
    }
    Ok(released)
}

/// Summary of one cascade run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    /// Every resolution in execution order; an apartment appears once per pass.
    pub resolutions: Vec<Resolution>,
    pub canceled: Vec<HoldId>,
    pub iterations: usize,
    pub rounds: usize,
}

impl CascadeReport {
    /// Final winners per apartment, taken from the last pass over each apartment.
    pub fn settled_winners(&self) -> BTreeMap<ApartmentId, Vec<HoldId>> {
        self.resolutions
            .iter()
            .map(|resolution| (resolution.apartment_id.clone(), resolution.winners.clone()))
            .collect()
    }
}

/// Resolve winners for the given apartments until no apartment is pending.
///
/// Each pass works on a snapshot of the pending set; apartments that lose a winner to a
/// conflict cancellation are queued for the next pass.
pub fn reserve_apartments<S, I>(
    store: &mut S,
    apartments: I,
    cancel_lower_priority_reserved: bool,
) -> Result<CascadeReport, LotteryError>
where
    S: QueueStore + ?Sized,
    I: IntoIterator<Item = ApartmentId>,
{
    let mut pending: BTreeSet<ApartmentId> = apartments.into_iter().collect();
    let budget = (store.hold_count() + 1) * (store.apartments().len() + 1);
    let mut report = CascadeReport::default();

    while !pending.is_empty() {
        report.rounds += 1;
        let round = std::mem::take(&mut pending);

        for apartment in round {
            report.iterations += 1;
            if report.iterations > budget {
                warn!(iterations = report.iterations, budget, "reservation cascade did not settle");
                return Err(LotteryError::CascadeDiverged {
                    iterations: report.iterations,
                });
            }

            let released =
                release_superseded(store, &apartment, cancel_lower_priority_reserved)?;
            report.canceled.extend(released);

            let resolution = resolve_apartment(store, &apartment)?;
            if let Some(policy) = resolution.policy {
                for winner in &resolution.winners {
                    let conflicts = cancel_lower_priority(
                        store,
                        *winner,
                        policy,
                        cancel_lower_priority_reserved,
                    )?;
                    pending.extend(conflicts.needs_resolution().cloned());
                    report.canceled.extend(conflicts.canceled);
                }
            }
            report.resolutions.push(resolution);
        }
    }

    info!(
        rounds = report.rounds,
        iterations = report.iterations,
        canceled = report.canceled.len(),
        "reservation cascade settled"
    );
    Ok(report)
}

/// Result of an explicit single-hold cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancellationOutcome {
    pub cancellation: HoldCancellation,
    /// Present when the canceled hold was a winner and its apartment was re-resolved.
    pub cascade: Option<CascadeReport>,
}

pub fn cancel_application_hold<S>(
    store: &mut S,
    hold_id: HoldId,
    request: CancellationRequest,
    requeue_cancels_reserved: bool,
) -> Result<CancellationOutcome, LotteryError>
where
    S: QueueStore + ?Sized,
{
    let hold = store.hold(hold_id)?;
    let application = store.application(&hold.application_id)?;
    let policy = AllocationPolicy::for_type(application.kind);
    let reason = request.reason;

    let cancellation = cancel_hold(store, hold_id, request)?;
    info!(
        hold = %hold_id,
        apartment = %cancellation.apartment_id,
        previous = %cancellation.previous_state,
        reason = reason.label(),
        "reservation canceled"
    );

    let cascade = if policy.vacates_winner(cancellation.previous_state) {
        Some(reserve_apartments(
            store,
            [cancellation.apartment_id.clone()],
            requeue_cancels_reserved,
        )?)
    } else {
        None
    };

    Ok(CancellationOutcome {
        cancellation,
        cascade,
    })
}
