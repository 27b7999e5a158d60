use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::domain::{
    ApartmentId, Application, ApplicationApartment, ApplicationId, ApplicationType,
    CancellationRequest, HoldId, LotteryError, LotteryEvent, Project, QueueChangeEvent,
    QueueChangeKind, ReservationState, ReservationView, StateChangeEvent,
};
use super::store::{QueueEntry, QueueStore};

/// In-memory reservation graph of one project.
///
/// Queues store hold ids in position order; every hold's `queue_position` mirrors its
/// index so positions never contain gaps.
#[derive(Debug, Clone)]
pub struct ProjectLedger {
    project: Project,
    applications: BTreeMap<ApplicationId, Application>,
    holds: BTreeMap<HoldId, ApplicationApartment>,
    queues: BTreeMap<ApartmentId, Vec<HoldId>>,
    state_events: Vec<StateChangeEvent>,
    queue_events: Vec<QueueChangeEvent>,
    lottery_events: BTreeMap<ApartmentId, LotteryEvent>,
}

impl ProjectLedger {
    pub fn new(project: Project) -> Self {
        let queues = project
            .apartments
            .iter()
            .cloned()
            .map(|apartment| (apartment, Vec::new()))
            .collect();

        Self {
            project,
            applications: BTreeMap::new(),
            holds: BTreeMap::new(),
            queues,
            state_events: Vec::new(),
            queue_events: Vec::new(),
            lottery_events: BTreeMap::new(),
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn contains_hold(&self, hold: HoldId) -> bool {
        self.holds.contains_key(&hold)
    }

    pub fn contains_application(&self, application: &ApplicationId) -> bool {
        self.applications.contains_key(application)
    }

    pub fn hold_ids(&self) -> impl Iterator<Item = HoldId> + '_ {
        self.holds.keys().copied()
    }

    pub fn hold_for(&self, application: &ApplicationId, apartment: &ApartmentId) -> Option<HoldId> {
        self.applications.get(application).and_then(|record| {
            record.holds.iter().copied().find(|hold| {
                self.holds
                    .get(hold)
                    .is_some_and(|entry| &entry.apartment_id == apartment)
            })
        })
    }

    pub fn reservation_state(&self, hold: HoldId) -> Option<ReservationState> {
        self.holds.get(&hold).map(|entry| entry.reservation.state)
    }

    pub fn queue(&self, apartment: &ApartmentId) -> Option<&[HoldId]> {
        self.queues.get(apartment).map(Vec::as_slice)
    }

    pub fn state_events(&self) -> &[StateChangeEvent] {
        &self.state_events
    }

    pub fn queue_events(&self) -> &[QueueChangeEvent] {
        &self.queue_events
    }

    pub fn lottery_event(&self, apartment: &ApartmentId) -> Option<&LotteryEvent> {
        self.lottery_events.get(apartment)
    }

    pub fn lottery_executed(&self) -> bool {
        !self.lottery_events.is_empty()
    }

    pub(crate) fn insert_application(
        &mut self,
        application: Application,
        holds: Vec<ApplicationApartment>,
    ) -> Result<(), LotteryError> {
        if self.applications.contains_key(&application.id) {
            return Err(LotteryError::DuplicateApplication(application.id));
        }

        for mut hold in holds {
            let event = StateChangeEvent {
                hold_id: hold.id,
                apartment_id: hold.apartment_id.clone(),
                from: None,
                to: ReservationState::Submitted,
                at: application.created_at,
                cancellation_reason: None,
                comment: None,
            };
            hold.reservation.history.push(event.clone());
            self.state_events.push(event);
            self.holds.insert(hold.id, hold);
        }
        self.applications.insert(application.id.clone(), application);
        Ok(())
    }

    /// Snapshot every apartment queue as its lottery result.
    pub(crate) fn record_lottery(&mut self, executed_at: DateTime<Utc>) {
        for (apartment, queue) in &self.queues {
            self.lottery_events.insert(
                apartment.clone(),
                LotteryEvent {
                    apartment_id: apartment.clone(),
                    executed_at,
                    results: queue.clone(),
                },
            );
        }
    }

    pub fn reservation_view(&self, hold: HoldId) -> Result<ReservationView, LotteryError> {
        let entry = self.holds.get(&hold).ok_or(LotteryError::UnknownHold(hold))?;
        let application = self
            .applications
            .get(&entry.application_id)
            .ok_or_else(|| LotteryError::UnknownApplication(entry.application_id.clone()))?;

        Ok(ReservationView {
            hold_id: entry.id,
            application_id: entry.application_id.clone(),
            apartment_id: entry.apartment_id.clone(),
            priority_number: entry.priority_number,
            right_of_residence: application.right_of_residence,
            queue_position: entry.reservation.queue_position,
            lottery_position: self
                .lottery_events
                .get(&entry.apartment_id)
                .and_then(|event| event.position_of(entry.id)),
            state: entry.reservation.state,
            state_changed_at: entry.reservation.state_changed_at,
            cancellation_reason: entry.reservation.cancellation_reason,
        })
    }

    /// Every reservation for the apartment: queued ones first in queue order,
    /// then removed ones.
    pub fn apartment_reservations(
        &self,
        apartment: &ApartmentId,
    ) -> Result<Vec<ReservationView>, LotteryError> {
        if !self.queues.contains_key(apartment) {
            return Err(LotteryError::UnknownApartment(apartment.clone()));
        }

        let mut views = self
            .holds
            .values()
            .filter(|entry| &entry.apartment_id == apartment)
            .map(|entry| self.reservation_view(entry.id))
            .collect::<Result<Vec<_>, _>>()?;
        views.sort_by_key(|view| (view.queue_position.is_none(), view.queue_position, view.hold_id));
        Ok(views)
    }

    pub fn application_reservations(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<ReservationView>, LotteryError> {
        let record = self
            .applications
            .get(application)
            .ok_or_else(|| LotteryError::UnknownApplication(application.clone()))?;
        record
            .holds
            .iter()
            .map(|hold| self.reservation_view(*hold))
            .collect()
    }

    fn renumber(&mut self, apartment: &ApartmentId) {
        let Some(queue) = self.queues.get(apartment) else {
            return;
        };
        for (position, hold_id) in queue.iter().enumerate() {
            if let Some(entry) = self.holds.get_mut(hold_id) {
                entry.reservation.queue_position = Some(position);
            }
        }
    }

    /// HASO queues stay sorted by right-of-residence number, FIFO among equals.
    fn rank_insertion_index(&self, apartment: &ApartmentId, rank: Option<u32>) -> usize {
        let rank = rank.unwrap_or(u32::MAX);
        let Some(queue) = self.queues.get(apartment) else {
            return 0;
        };

        queue
            .iter()
            .position(|hold_id| {
                self.holds
                    .get(hold_id)
                    .and_then(|entry| self.applications.get(&entry.application_id))
                    .and_then(|application| application.right_of_residence)
                    .unwrap_or(u32::MAX)
                    > rank
            })
            .unwrap_or(queue.len())
    }
}

impl QueueStore for ProjectLedger {
    fn ordered_applications(
        &self,
        apartment: &ApartmentId,
    ) -> Result<Vec<QueueEntry>, LotteryError> {
        let queue = self
            .queues
            .get(apartment)
            .ok_or_else(|| LotteryError::UnknownApartment(apartment.clone()))?;

        let entries = queue
            .iter()
            .enumerate()
            .map(|(position, hold_id)| -> Result<QueueEntry, LotteryError> {
                let hold = self
                    .holds
                    .get(hold_id)
                    .ok_or(LotteryError::UnknownHold(*hold_id))?;
                let application = self
                    .applications
                    .get(&hold.application_id)
                    .ok_or_else(|| LotteryError::UnknownApplication(hold.application_id.clone()))?;

                Ok(QueueEntry {
                    hold_id: hold.id,
                    application_id: application.id.clone(),
                    kind: application.kind,
                    right_of_residence: application.right_of_residence,
                    priority_number: hold.priority_number,
                    queue_position: position,
                    state: hold.reservation.state,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries
            .into_iter()
            .filter(|entry| entry.state != ReservationState::Canceled)
            .collect())
    }

    fn remove_from_queue(
        &mut self,
        hold: HoldId,
        comment: Option<String>,
    ) -> Result<(), LotteryError> {
        let apartment = self
            .holds
            .get(&hold)
            .ok_or(LotteryError::UnknownHold(hold))?
            .apartment_id
            .clone();
        let queue = self
            .queues
            .get_mut(&apartment)
            .ok_or_else(|| LotteryError::UnknownApartment(apartment.clone()))?;
        let index = queue
            .iter()
            .position(|candidate| *candidate == hold)
            .ok_or(LotteryError::NotQueued(hold))?;

        queue.remove(index);
        if let Some(entry) = self.holds.get_mut(&hold) {
            entry.reservation.queue_position = None;
        }
        self.renumber(&apartment);

        debug!(%hold, %apartment, former_position = index, "removed from queue");
        self.queue_events.push(QueueChangeEvent {
            hold_id: hold,
            apartment_id: apartment,
            kind: QueueChangeKind::Removed,
            at: Utc::now(),
            comment,
        });
        Ok(())
    }

    fn add_to_queue(&mut self, application: &ApplicationId) -> Result<(), LotteryError> {
        let record = self
            .applications
            .get(application)
            .cloned()
            .ok_or_else(|| LotteryError::UnknownApplication(application.clone()))?;

        for hold_id in &record.holds {
            let apartment = self
                .holds
                .get(hold_id)
                .ok_or(LotteryError::UnknownHold(*hold_id))?
                .apartment_id
                .clone();

            let index = match record.kind {
                ApplicationType::Haso => {
                    self.rank_insertion_index(&apartment, record.right_of_residence)
                }
                ApplicationType::Hitas | ApplicationType::HalfHitas => self
                    .queues
                    .get(&apartment)
                    .map(Vec::len)
                    .unwrap_or_default(),
            };

            let queue = self
                .queues
                .get_mut(&apartment)
                .ok_or_else(|| LotteryError::UnknownApartment(apartment.clone()))?;
            if queue.contains(hold_id) {
                continue;
            }
            queue.insert(index, *hold_id);
            self.renumber(&apartment);

            self.queue_events.push(QueueChangeEvent {
                hold_id: *hold_id,
                apartment_id: apartment,
                kind: QueueChangeKind::Added,
                at: Utc::now(),
                comment: None,
            });
        }
        Ok(())
    }

    fn hold(&self, hold: HoldId) -> Result<ApplicationApartment, LotteryError> {
        self.holds
            .get(&hold)
            .cloned()
            .ok_or(LotteryError::UnknownHold(hold))
    }

    fn application(&self, application: &ApplicationId) -> Result<Application, LotteryError> {
        self.applications
            .get(application)
            .cloned()
            .ok_or_else(|| LotteryError::UnknownApplication(application.clone()))
    }

    fn holds_of(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<ApplicationApartment>, LotteryError> {
        let record = self
            .applications
            .get(application)
            .ok_or_else(|| LotteryError::UnknownApplication(application.clone()))?;

        let mut holds = record
            .holds
            .iter()
            .map(|hold| self.hold(*hold))
            .collect::<Result<Vec<_>, _>>()?;
        holds.sort_by_key(|hold| hold.priority_number);
        Ok(holds)
    }

    fn set_state(
        &mut self,
        hold: HoldId,
        next: ReservationState,
        cancellation: Option<CancellationRequest>,
    ) -> Result<StateChangeEvent, LotteryError> {
        let entry = self
            .holds
            .get_mut(&hold)
            .ok_or(LotteryError::UnknownHold(hold))?;
        let cancellation = cancellation.map(|request| (request.reason, request.comment));
        let event = entry
            .reservation
            .transition(hold, next, cancellation, Utc::now())?;

        debug!(
            %hold,
            apartment = %event.apartment_id,
            from = ?event.from,
            to = %event.to,
            "reservation state changed"
        );
        self.state_events.push(event.clone());
        Ok(event)
    }

    fn apartments(&self) -> Vec<ApartmentId> {
        self.project.apartments.clone()
    }

    fn hold_count(&self) -> usize {
        self.holds.len()
    }

    fn application_count(&self) -> usize {
        self.applications.len()
    }
}
