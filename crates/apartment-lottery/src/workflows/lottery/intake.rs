use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{
    ApartmentId, Application, ApplicationApartment, ApplicationId, ApplicationType, HoldId,
    LotteryError, ProjectId, Reservation,
};
use super::ledger::ProjectLedger;
use super::store::QueueStore;

/// Payload accepted when an applicant household applies to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSubmission {
    /// External identifier; generated when omitted.
    #[serde(default)]
    pub external_id: Option<ApplicationId>,
    pub project_id: ProjectId,
    #[serde(rename = "type")]
    pub kind: ApplicationType,
    pub applicants_count: u8,
    #[serde(default)]
    pub right_of_residence: Option<u32>,
    pub apartments: Vec<ApartmentChoice>,
}

/// One requested apartment and how much the applicant prefers it (1 = most).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApartmentChoice {
    pub apartment_id: ApartmentId,
    pub priority: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplicationValidationError {
    #[error("application must request at least one apartment")]
    NoApartments,
    #[error("apartment {0} requested more than once")]
    DuplicateApartment(ApartmentId),
    #[error("priority {0} used for more than one apartment")]
    DuplicatePriority(u16),
    #[error("priority numbers start from 1")]
    ZeroPriority,
    #[error("apartment {0} is not part of the project")]
    UnknownApartment(ApartmentId),
    #[error("haso applications require a right-of-residence number")]
    MissingRightOfResidence,
    #[error("{application} application cannot be submitted to a {project} project")]
    OwnershipMismatch {
        application: &'static str,
        project: &'static str,
    },
    #[error("applicant count must be 1 or 2, got {0}")]
    InvalidApplicantCount(u8),
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static HOLD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Generated ids skip any value a client already submitted as its external id.
fn next_application_id(ledger: &ProjectLedger) -> ApplicationId {
    loop {
        let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let candidate = ApplicationId(format!("generated-{id:06}"));
        if !ledger.contains_application(&candidate) {
            return candidate;
        }
    }
}

fn next_hold_id() -> HoldId {
    HoldId(HOLD_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

impl ApplicationSubmission {
    pub fn validate(&self, ledger: &ProjectLedger) -> Result<(), ApplicationValidationError> {
        let project = ledger.project();
        if !self.kind.is_compatible_with(project.ownership_type) {
            return Err(ApplicationValidationError::OwnershipMismatch {
                application: self.kind.label(),
                project: project.ownership_type.label(),
            });
        }
        if !(1..=2).contains(&self.applicants_count) {
            return Err(ApplicationValidationError::InvalidApplicantCount(
                self.applicants_count,
            ));
        }
        if self.kind == ApplicationType::Haso && self.right_of_residence.is_none() {
            return Err(ApplicationValidationError::MissingRightOfResidence);
        }
        if self.apartments.is_empty() {
            return Err(ApplicationValidationError::NoApartments);
        }

        let mut apartments = BTreeSet::new();
        let mut priorities = BTreeSet::new();
        for choice in &self.apartments {
            if choice.priority == 0 {
                return Err(ApplicationValidationError::ZeroPriority);
            }
            if !project.offers(&choice.apartment_id) {
                return Err(ApplicationValidationError::UnknownApartment(
                    choice.apartment_id.clone(),
                ));
            }
            if !apartments.insert(&choice.apartment_id) {
                return Err(ApplicationValidationError::DuplicateApartment(
                    choice.apartment_id.clone(),
                ));
            }
            if !priorities.insert(choice.priority) {
                return Err(ApplicationValidationError::DuplicatePriority(choice.priority));
            }
        }
        Ok(())
    }
}

/// Create the application with its holds and reservations, then queue every hold.
pub fn create_application(
    ledger: &mut ProjectLedger,
    submission: ApplicationSubmission,
    now: DateTime<Utc>,
) -> Result<Application, LotteryError> {
    submission.validate(ledger)?;

    let application_id = submission
        .external_id
        .clone()
        .unwrap_or_else(|| next_application_id(ledger));
    // Non-HASO applications never carry a rank.
    let right_of_residence = match submission.kind {
        ApplicationType::Haso => submission.right_of_residence,
        ApplicationType::Hitas | ApplicationType::HalfHitas => None,
    };

    let mut choices = submission.apartments;
    choices.sort_by_key(|choice| choice.priority);

    let holds: Vec<ApplicationApartment> = choices
        .into_iter()
        .map(|choice| ApplicationApartment {
            id: next_hold_id(),
            application_id: application_id.clone(),
            reservation: Reservation::new(choice.apartment_id.clone(), now),
            apartment_id: choice.apartment_id,
            priority_number: choice.priority,
        })
        .collect();

    let application = Application {
        id: application_id.clone(),
        project_id: submission.project_id,
        applicants_count: submission.applicants_count,
        kind: submission.kind,
        right_of_residence,
        created_at: now,
        holds: holds.iter().map(|hold| hold.id).collect(),
    };

    ledger.insert_application(application.clone(), holds)?;
    ledger.add_to_queue(&application_id)?;

    info!(
        application = %application.id,
        project = %application.project_id,
        kind = application.kind.label(),
        apartments = application.holds.len(),
        "application submitted"
    );
    Ok(application)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::lottery::domain::Project;

    fn ledger() -> ProjectLedger {
        ProjectLedger::new(Project {
            id: ProjectId("project-1".to_string()),
            ownership_type: ApplicationType::Hitas,
            apartments: vec![ApartmentId("apt-1".to_string())],
        })
    }

    fn submission(external_id: Option<&str>) -> ApplicationSubmission {
        ApplicationSubmission {
            external_id: external_id.map(|id| ApplicationId(id.to_string())),
            project_id: ProjectId("project-1".to_string()),
            kind: ApplicationType::Hitas,
            applicants_count: 1,
            right_of_residence: None,
            apartments: vec![ApartmentChoice {
                apartment_id: ApartmentId("apt-1".to_string()),
                priority: 1,
            }],
        }
    }

    #[test]
    fn generated_ids_skip_client_supplied_ids() {
        let mut ledger = ledger();
        let upcoming = APPLICATION_SEQUENCE.load(Ordering::Relaxed);
        let taken: Vec<String> = (upcoming..upcoming + 3)
            .map(|id| format!("generated-{id:06}"))
            .collect();
        for id in &taken {
            create_application(&mut ledger, submission(Some(id)), Utc::now())
                .expect("client id accepted");
        }

        let generated = create_application(&mut ledger, submission(None), Utc::now())
            .expect("generated id does not collide");

        assert!(!taken.contains(&generated.id.0));
        assert!(generated.id.0.starts_with("generated-"));
        assert_eq!(ledger.application_count(), 4);
    }

    #[test]
    fn haso_rank_is_dropped_for_hitas_applications() {
        let mut ledger = ledger();
        let mut hitas = submission(Some("app-1"));
        hitas.right_of_residence = Some(12);

        let application =
            create_application(&mut ledger, hitas, Utc::now()).expect("accepted");

        assert_eq!(application.right_of_residence, None);
    }
}
