use apartment_lottery::config::LotteryConfig;
use apartment_lottery::error::AppError;
use apartment_lottery::workflows::lottery::{
    ApartmentChoice, ApartmentId, ApplicationId, ApplicationSubmission, ApplicationType,
    CancellationReason, CancellationRequest, InMemoryLedgerRepository, LotteryOutcome,
    LotteryService, Project, ProjectId, ReservationState,
};
use clap::Args;
use std::sync::Arc;

type DemoService = LotteryService<InMemoryLedgerRepository>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Only run the scripted project of this ownership type (haso, hitas or puolihitas).
    #[arg(long, value_parser = crate::infra::parse_ownership)]
    pub(crate) ownership: Option<ApplicationType>,
    /// Cancel the first winner after the lottery and show the queue moving up.
    #[arg(long)]
    pub(crate) cancel_winner: bool,
    /// Let applicants promoted by a cancellation keep their reserved fallback.
    #[arg(long)]
    pub(crate) keep_reserved_fallbacks: bool,
    /// Print the lottery outcome as JSON instead of the text summary.
    #[arg(long)]
    pub(crate) json: bool,
}

struct ScriptedApplication {
    id: &'static str,
    right_of_residence: Option<u32>,
    choices: &'static [(&'static str, u16)],
}

struct ScriptedProject {
    id: &'static str,
    ownership: ApplicationType,
    apartments: &'static [&'static str],
    applications: &'static [ScriptedApplication],
}

const HITAS_PROJECT: ScriptedProject = ScriptedProject {
    id: "kalasatama-hitas",
    ownership: ApplicationType::Hitas,
    apartments: &["A1", "A2", "B5"],
    applications: &[
        ScriptedApplication {
            id: "hitas-001",
            right_of_residence: None,
            choices: &[("B5", 1), ("A1", 2)],
        },
        ScriptedApplication {
            id: "hitas-002",
            right_of_residence: None,
            choices: &[("A1", 1), ("A2", 2)],
        },
        ScriptedApplication {
            id: "hitas-003",
            right_of_residence: None,
            choices: &[("A2", 1)],
        },
        ScriptedApplication {
            id: "hitas-004",
            right_of_residence: None,
            choices: &[("A2", 1), ("B5", 2)],
        },
    ],
};

const HASO_PROJECT: ScriptedProject = ScriptedProject {
    id: "jatkasaari-haso",
    ownership: ApplicationType::Haso,
    apartments: &["C1", "C2"],
    applications: &[
        ScriptedApplication {
            id: "haso-001",
            right_of_residence: Some(1_204),
            choices: &[("C1", 1)],
        },
        ScriptedApplication {
            id: "haso-002",
            right_of_residence: Some(388),
            choices: &[("C2", 1), ("C1", 2)],
        },
        ScriptedApplication {
            id: "haso-003",
            right_of_residence: Some(97),
            choices: &[("C2", 1)],
        },
    ],
};

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        ownership,
        cancel_winner,
        keep_reserved_fallbacks,
        json,
    } = args;

    let config = LotteryConfig {
        requeue_cancels_reserved: !keep_reserved_fallbacks,
        ..LotteryConfig::default()
    };
    let service = LotteryService::new(Arc::new(InMemoryLedgerRepository::new()), config);

    let scripted = [&HASO_PROJECT, &HITAS_PROJECT]
        .into_iter()
        .filter(|project| match ownership {
            Some(kind) => kind.is_compatible_with(project.ownership),
            None => true,
        });

    for project in scripted {
        let outcome = run_scripted_project(&service, project)?;
        if json {
            match serde_json::to_string_pretty(&outcome) {
                Ok(payload) => println!("{payload}"),
                Err(err) => println!("Lottery outcome unavailable: {err}"),
            }
        } else {
            render_outcome(&service, project, &outcome)?;
        }

        if cancel_winner {
            cancel_first_winner(&service, project, &outcome, json)?;
        }
    }

    Ok(())
}

fn run_scripted_project(
    service: &DemoService,
    scripted: &ScriptedProject,
) -> Result<LotteryOutcome, AppError> {
    let project_id = ProjectId(scripted.id.to_string());
    service.register_project(Project {
        id: project_id.clone(),
        ownership_type: scripted.ownership,
        apartments: scripted
            .apartments
            .iter()
            .map(|apartment| ApartmentId(apartment.to_string()))
            .collect(),
    })?;

    for application in scripted.applications {
        service.submit_application(ApplicationSubmission {
            external_id: Some(ApplicationId(application.id.to_string())),
            project_id: project_id.clone(),
            kind: scripted.ownership,
            applicants_count: 1,
            right_of_residence: application.right_of_residence,
            apartments: application
                .choices
                .iter()
                .map(|(apartment, priority)| ApartmentChoice {
                    apartment_id: ApartmentId(apartment.to_string()),
                    priority: *priority,
                })
                .collect(),
        })?;
    }

    Ok(service.run_lottery_for_project(&project_id)?)
}

fn render_outcome(
    service: &DemoService,
    scripted: &ScriptedProject,
    outcome: &LotteryOutcome,
) -> Result<(), AppError> {
    println!(
        "\n{} lottery for {} ({} applications, {} resolutions over {} rounds)",
        scripted.ownership.label().to_uppercase(),
        outcome.project_id,
        outcome.applications,
        outcome.report.iterations,
        outcome.report.rounds
    );
    render_queues(service, scripted)
}

fn render_queues(service: &DemoService, scripted: &ScriptedProject) -> Result<(), AppError> {
    let project_id = ProjectId(scripted.id.to_string());
    for apartment in scripted.apartments {
        let apartment_id = ApartmentId(apartment.to_string());
        let views = service.apartment_reservations(&project_id, &apartment_id)?;
        println!("- Apartment {apartment}");
        if views.is_empty() {
            println!("    no applicants");
        }
        for view in views {
            let position = view
                .queue_position
                .map(|position| format!("#{}", position + 1))
                .unwrap_or_else(|| "--".to_string());
            let rank = view
                .right_of_residence
                .map(|rank| format!(" (right of residence {rank})"))
                .unwrap_or_default();
            println!(
                "    {position:>3} {} priority {}{rank}: {}",
                view.application_id,
                view.priority_number,
                view.state.label()
            );
        }
    }
    Ok(())
}

fn cancel_first_winner(
    service: &DemoService,
    scripted: &ScriptedProject,
    outcome: &LotteryOutcome,
    json: bool,
) -> Result<(), AppError> {
    let Some((apartment, winner)) = outcome
        .report
        .settled_winners()
        .into_iter()
        .find_map(|(apartment, winners)| winners.first().map(|hold| (apartment, *hold)))
    else {
        println!("No winners to cancel in {}", outcome.project_id);
        return Ok(());
    };

    let mut request = CancellationRequest::new(CancellationReason::Canceled);
    request.comment = Some("demo cancellation".to_string());
    let canceled = service.cancel_application_hold(winner, request)?;

    if json {
        match serde_json::to_string_pretty(&canceled) {
            Ok(payload) => println!("{payload}"),
            Err(err) => println!("Cancellation outcome unavailable: {err}"),
        }
        return Ok(());
    }

    println!(
        "\nCanceled {winner} on apartment {apartment} (was {})",
        canceled.cancellation.previous_state.label()
    );
    match canceled.cascade {
        Some(cascade) => {
            let promoted = cascade
                .resolutions
                .iter()
                .filter(|resolution| resolution.state == Some(ReservationState::Reserved))
                .count();
            println!(
                "  Cascade settled after {} resolutions ({} apartments with a reserved winner)",
                cascade.iterations, promoted
            );
        }
        None => println!("  Hold was waiting in the queue; no re-resolution needed"),
    }
    render_queues(service, scripted)
}
