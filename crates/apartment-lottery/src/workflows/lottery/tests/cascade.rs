use super::common::*;

use crate::workflows::lottery::cascade::{cancel_application_hold, reserve_apartments};
use crate::workflows::lottery::conflicts::cancel_lower_priority;
use crate::workflows::lottery::domain::{
    ApplicationType, CancellationReason, CancellationRequest, QueueChangeKind, ReservationState,
};
use crate::workflows::lottery::policy::AllocationPolicy;
use crate::workflows::lottery::resolution::resolve_apartment;
use crate::workflows::lottery::store::QueueStore;

#[test]
fn winning_cancels_lower_priority_head_and_promotes_next() {
    let mut ledger = ledger(ApplicationType::Hitas, &["apt-x", "apt-z"]);
    hitas(&mut ledger, "app-1", &[("apt-x", 1), ("apt-z", 2)]);
    hitas(&mut ledger, "app-2", &[("apt-z", 1)]);

    let report = reserve_apartments(&mut ledger, [apartment("apt-x")], true).expect("settles");

    assert_eq!(state(&ledger, "app-1", "apt-x"), ReservationState::Reserved);
    let canceled = hold(&ledger, "app-1", "apt-z");
    let view = ledger.reservation_view(canceled).expect("view");
    assert_eq!(view.state, ReservationState::Canceled);
    assert_eq!(view.queue_position, None);
    assert_eq!(
        view.cancellation_reason,
        Some(CancellationReason::OtherApartmentReserved)
    );
    assert_eq!(state(&ledger, "app-2", "apt-z"), ReservationState::Reserved);
    assert_eq!(
        ledger.queue(&apartment("apt-z")).expect("queue"),
        &[hold(&ledger, "app-2", "apt-z")]
    );
    assert_eq!(report.rounds, 2);
    assert_eq!(report.canceled, vec![canceled]);
}

#[test]
fn conflict_resolver_reports_canceled_winners() {
    let mut ledger = ledger(ApplicationType::Hitas, &["apt-x", "apt-z", "apt-w"]);
    hitas(&mut ledger, "app-2", &[("apt-w", 1)]);
    hitas(
        &mut ledger,
        "app-1",
        &[("apt-x", 1), ("apt-z", 2), ("apt-w", 3)],
    );

    resolve_apartment(&mut ledger, &apartment("apt-x")).expect("resolves");
    let winner = hold(&ledger, "app-1", "apt-x");
    let conflicts =
        cancel_lower_priority(&mut ledger, winner, AllocationPolicy::Position, false)
            .expect("conflicts");

    assert_eq!(conflicts.canceled.len(), 2);
    // app-1 headed apt-z but sat behind app-2 in apt-w.
    assert_eq!(conflicts.canceled_winners, vec![apartment("apt-z")]);
    assert!(conflicts.deferred.is_empty());
}

#[test]
fn reserved_lower_priority_holds_survive_without_flag() {
    let mut ledger = ledger(ApplicationType::Hitas, &["apt-x", "apt-z"]);
    hitas(&mut ledger, "app-1", &[("apt-x", 1), ("apt-z", 2)]);
    hitas(&mut ledger, "app-2", &[("apt-x", 1)]);

    resolve_apartment(&mut ledger, &apartment("apt-z")).expect("resolves z");
    resolve_apartment(&mut ledger, &apartment("apt-x")).expect("resolves x");
    let winner = hold(&ledger, "app-1", "apt-x");

    let kept = cancel_lower_priority(&mut ledger, winner, AllocationPolicy::Position, false)
        .expect("conflicts");
    assert!(kept.canceled.is_empty());
    assert_eq!(state(&ledger, "app-1", "apt-z"), ReservationState::Reserved);

    let released = cancel_lower_priority(&mut ledger, winner, AllocationPolicy::Position, true)
        .expect("conflicts");
    assert_eq!(released.canceled_winners, vec![apartment("apt-z")]);
    assert_eq!(state(&ledger, "app-1", "apt-z"), ReservationState::Canceled);
}

#[test]
fn three_apartment_priority_cycle_terminates() {
    let mut ledger = ledger(ApplicationType::Hitas, &["apt-1", "apt-2", "apt-3"]);
    hitas(&mut ledger, "app-1", &[("apt-1", 1), ("apt-2", 2)]);
    hitas(&mut ledger, "app-2", &[("apt-2", 1), ("apt-3", 2)]);
    hitas(&mut ledger, "app-3", &[("apt-3", 1), ("apt-1", 2)]);

    let apartments = ledger.apartments();
    let report = reserve_apartments(&mut ledger, apartments, true).expect("settles");

    assert_eq!(state(&ledger, "app-1", "apt-1"), ReservationState::Reserved);
    assert_eq!(state(&ledger, "app-2", "apt-2"), ReservationState::Reserved);
    assert_eq!(state(&ledger, "app-3", "apt-3"), ReservationState::Reserved);
    for application in ["app-1", "app-2", "app-3"] {
        assert_eq!(active_wins(&ledger, application), 1);
    }
    assert_eq!(report.rounds, 2);
}

#[test]
fn chained_cancellations_walk_down_every_queue() {
    let mut ledger = ledger(ApplicationType::Hitas, &["apt-1", "apt-2", "apt-3"]);
    hitas(&mut ledger, "app-1", &[("apt-3", 1), ("apt-1", 2)]);
    hitas(&mut ledger, "app-2", &[("apt-1", 1), ("apt-2", 2)]);
    hitas(&mut ledger, "app-3", &[("apt-2", 1)]);

    let apartments = ledger.apartments();
    let report = reserve_apartments(&mut ledger, apartments, true).expect("settles");

    assert_eq!(state(&ledger, "app-1", "apt-3"), ReservationState::Reserved);
    assert_eq!(state(&ledger, "app-2", "apt-1"), ReservationState::Reserved);
    assert_eq!(state(&ledger, "app-3", "apt-2"), ReservationState::Reserved);
    assert_eq!(state(&ledger, "app-1", "apt-1"), ReservationState::Canceled);
    assert_eq!(state(&ledger, "app-2", "apt-2"), ReservationState::Canceled);
    assert_eq!(report.rounds, 3);

    let winners = report.settled_winners();
    assert_eq!(
        winners.get(&apartment("apt-2")),
        Some(&vec![hold(&ledger, "app-3", "apt-2")])
    );
}

#[test]
fn rank_head_conflicts_are_deferred_then_released() {
    let mut ledger = ledger(ApplicationType::Haso, &["apt-1", "apt-2"]);
    haso(&mut ledger, "app-1", 1, &[("apt-2", 1), ("apt-1", 2)]);
    haso(&mut ledger, "app-2", 2, &[("apt-1", 1)]);

    let apartments = ledger.apartments();
    reserve_apartments(&mut ledger, apartments, true).expect("settles");

    assert_eq!(state(&ledger, "app-1", "apt-2"), ReservationState::Reserved);
    assert_eq!(state(&ledger, "app-1", "apt-1"), ReservationState::Canceled);
    assert_eq!(state(&ledger, "app-2", "apt-1"), ReservationState::Reserved);
    assert_eq!(active_wins(&ledger, "app-1"), 1);
    assert_eq!(active_wins(&ledger, "app-2"), 1);
}

#[test]
fn rank_winner_releases_review_ties_elsewhere() {
    let mut ledger = ledger(ApplicationType::Haso, &["apt-1", "apt-2"]);
    haso(&mut ledger, "app-1", 4, &[("apt-2", 1), ("apt-1", 2)]);
    haso(&mut ledger, "app-2", 4, &[("apt-1", 1)]);

    let apartments = ledger.apartments();
    reserve_apartments(&mut ledger, apartments, true).expect("settles");

    assert_eq!(state(&ledger, "app-1", "apt-2"), ReservationState::Reserved);
    assert_eq!(state(&ledger, "app-1", "apt-1"), ReservationState::Canceled);
    // The remaining tie member wins outright once the other candidate leaves.
    assert_eq!(state(&ledger, "app-2", "apt-1"), ReservationState::Reserved);
    assert_eq!(active_wins(&ledger, "app-1"), 1);
}

#[test]
fn settled_cascade_is_idempotent() {
    let mut ledger = ledger(ApplicationType::Hitas, &["apt-1", "apt-2", "apt-3"]);
    hitas(&mut ledger, "app-1", &[("apt-3", 1), ("apt-1", 2)]);
    hitas(&mut ledger, "app-2", &[("apt-1", 1), ("apt-2", 2)]);
    hitas(&mut ledger, "app-3", &[("apt-2", 1)]);
    hitas(&mut ledger, "app-4", &[("apt-2", 1)]);

    let apartments = ledger.apartments();
    reserve_apartments(&mut ledger, apartments.clone(), true).expect("settles");
    let events = ledger.state_events().len();

    let report = reserve_apartments(&mut ledger, apartments, true).expect("settles again");

    assert_eq!(ledger.state_events().len(), events);
    assert!(report.canceled.is_empty());
    assert_eq!(report.rounds, 1);
}

#[test]
fn canceling_a_winner_promotes_next_applicant() {
    let mut ledger = ledger(ApplicationType::Hitas, &["apt-x"]);
    hitas(&mut ledger, "app-1", &[("apt-x", 1)]);
    hitas(&mut ledger, "app-2", &[("apt-x", 1)]);
    reserve_apartments(&mut ledger, [apartment("apt-x")], true).expect("settles");

    let winner = hold(&ledger, "app-1", "apt-x");
    let outcome = cancel_application_hold(
        &mut ledger,
        winner,
        CancellationRequest::new(CancellationReason::Canceled),
        false,
    )
    .expect("cancels");

    assert_eq!(outcome.cancellation.previous_state, ReservationState::Reserved);
    assert!(outcome.cancellation.was_winning);
    assert!(outcome.cascade.is_some());
    assert_eq!(state(&ledger, "app-1", "apt-x"), ReservationState::Canceled);
    assert_eq!(state(&ledger, "app-2", "apt-x"), ReservationState::Reserved);
    assert_eq!(
        ledger
            .reservation_view(hold(&ledger, "app-2", "apt-x"))
            .expect("view")
            .queue_position,
        Some(0)
    );
}

#[test]
fn canceling_a_review_tie_member_reserves_the_other() {
    let mut ledger = ledger(ApplicationType::Haso, &["apt-y"]);
    haso(&mut ledger, "app-1", 5, &[("apt-y", 1)]);
    haso(&mut ledger, "app-2", 5, &[("apt-y", 1)]);
    haso(&mut ledger, "app-3", 9, &[("apt-y", 1)]);
    reserve_apartments(&mut ledger, [apartment("apt-y")], true).expect("settles");
    assert_eq!(state(&ledger, "app-1", "apt-y"), ReservationState::Review);
    assert_eq!(state(&ledger, "app-2", "apt-y"), ReservationState::Review);

    let target = hold(&ledger, "app-1", "apt-y");
    let outcome = cancel_application_hold(
        &mut ledger,
        target,
        CancellationRequest::default(),
        true,
    )
    .expect("cancels");

    assert!(outcome.cancellation.was_winning);
    let cascade = outcome.cascade.expect("tie re-resolved");
    assert_eq!(
        cascade.settled_winners().get(&apartment("apt-y")),
        Some(&vec![hold(&ledger, "app-2", "apt-y")])
    );
    assert_eq!(state(&ledger, "app-2", "apt-y"), ReservationState::Reserved);
    assert_eq!(state(&ledger, "app-3", "apt-y"), ReservationState::Submitted);
}

#[test]
fn canceling_an_offered_hold_promotes_next_in_queue() {
    let mut ledger = ledger(ApplicationType::Hitas, &["apt-x"]);
    hitas(&mut ledger, "app-1", &[("apt-x", 1)]);
    hitas(&mut ledger, "app-2", &[("apt-x", 1)]);
    hitas(&mut ledger, "app-3", &[("apt-x", 1)]);
    reserve_apartments(&mut ledger, [apartment("apt-x")], true).expect("settles");
    let offered = hold(&ledger, "app-1", "apt-x");
    ledger
        .set_state(offered, ReservationState::Offered, None)
        .expect("offer");

    let outcome = cancel_application_hold(
        &mut ledger,
        offered,
        CancellationRequest::new(CancellationReason::ReservationAgreementCanceled),
        true,
    )
    .expect("cancels");

    assert_eq!(outcome.cancellation.previous_state, ReservationState::Offered);
    assert!(outcome.cascade.is_some());
    assert_eq!(state(&ledger, "app-2", "apt-x"), ReservationState::Reserved);
    assert_eq!(state(&ledger, "app-3", "apt-x"), ReservationState::Submitted);
    assert_eq!(
        ledger
            .reservation_view(hold(&ledger, "app-2", "apt-x"))
            .expect("view")
            .queue_position,
        Some(0)
    );
}

#[test]
fn canceling_a_waiting_hold_only_compacts_the_queue() {
    let mut ledger = ledger(ApplicationType::Hitas, &["apt-x"]);
    hitas(&mut ledger, "app-1", &[("apt-x", 1)]);
    hitas(&mut ledger, "app-2", &[("apt-x", 1)]);
    hitas(&mut ledger, "app-3", &[("apt-x", 1)]);
    reserve_apartments(&mut ledger, [apartment("apt-x")], true).expect("settles");

    let waiting = hold(&ledger, "app-2", "apt-x");
    let mut request = CancellationRequest::new(CancellationReason::Terminated);
    request.comment = Some("applicant withdrew".to_string());
    let outcome = cancel_application_hold(&mut ledger, waiting, request, false).expect("cancels");

    assert!(outcome.cascade.is_none());
    assert!(!outcome.cancellation.was_winning);
    assert_eq!(
        ledger
            .reservation_view(hold(&ledger, "app-3", "apt-x"))
            .expect("view")
            .queue_position,
        Some(1)
    );
    let removal = ledger
        .queue_events()
        .iter()
        .rev()
        .find(|event| event.kind == QueueChangeKind::Removed)
        .expect("removal recorded");
    assert_eq!(removal.comment.as_deref(), Some("applicant withdrew"));
}

#[test]
fn canceling_twice_is_an_invalid_transition() {
    let mut ledger = ledger(ApplicationType::Hitas, &["apt-x"]);
    hitas(&mut ledger, "app-1", &[("apt-x", 1)]);
    let target = hold(&ledger, "app-1", "apt-x");

    cancel_application_hold(&mut ledger, target, CancellationRequest::default(), false)
        .expect("first cancel");
    let error = cancel_application_hold(&mut ledger, target, CancellationRequest::default(), false)
        .expect_err("second cancel rejected");

    assert!(matches!(
        error,
        crate::workflows::lottery::domain::LotteryError::InvalidTransition(_)
    ));
}
