use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use super::domain::{
    ApartmentId, CancellationRequest, HoldId, LotteryError, Project, ProjectId,
};
use super::intake::ApplicationSubmission;
use super::repository::{LedgerRepository, RepositoryError};
use super::service::LotteryService;

/// Router builder exposing the lottery endpoints.
pub fn lottery_router<R>(service: Arc<LotteryService<R>>) -> Router
where
    R: LedgerRepository + 'static,
{
    Router::new()
        .route("/api/v1/projects", post(register_project_handler::<R>))
        .route("/api/v1/applications", post(submit_handler::<R>))
        .route(
            "/api/v1/projects/:project_id/lottery",
            post(lottery_handler::<R>),
        )
        .route(
            "/api/v1/projects/:project_id/apartments/:apartment_id/reservations",
            get(apartment_reservations_handler::<R>),
        )
        .route(
            "/api/v1/reservations/:hold_id/cancel",
            post(cancel_handler::<R>),
        )
        .route(
            "/api/v1/reservations/:hold_id/offer",
            post(offer_handler::<R>),
        )
        .route(
            "/api/v1/reservations/:hold_id/confirm",
            post(confirm_handler::<R>),
        )
        .with_state(service)
}

/// HTTP status for an engine error.
pub fn status_for(error: &LotteryError) -> StatusCode {
    match error {
        LotteryError::NoApplications { .. } => StatusCode::BAD_REQUEST,
        LotteryError::InvalidApplication(_) | LotteryError::InvalidProject(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        LotteryError::UnknownProject(_)
        | LotteryError::UnknownApartment(_)
        | LotteryError::UnknownApplication(_)
        | LotteryError::UnknownHold(_)
        | LotteryError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        LotteryError::InvalidTransition(_)
        | LotteryError::LotteryAlreadyExecuted(_)
        | LotteryError::DuplicateApplication(_)
        | LotteryError::NotQueued(_)
        | LotteryError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        LotteryError::CascadeDiverged { .. }
        | LotteryError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn error_response(error: LotteryError) -> Response {
    let message = match &error {
        LotteryError::NoApplications { .. } => "Project does not have applications.".to_string(),
        other => other.to_string(),
    };
    let payload = json!({
        "error": message,
    });
    (status_for(&error), axum::Json(payload)).into_response()
}

pub(crate) async fn register_project_handler<R>(
    State(service): State<Arc<LotteryService<R>>>,
    axum::Json(project): axum::Json<Project>,
) -> Response
where
    R: LedgerRepository + 'static,
{
    match service.register_project(project) {
        Ok(project) => (StatusCode::CREATED, axum::Json(project)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<R>(
    State(service): State<Arc<LotteryService<R>>>,
    axum::Json(submission): axum::Json<ApplicationSubmission>,
) -> Response
where
    R: LedgerRepository + 'static,
{
    match service.submit_application(submission) {
        Ok(receipt) => (StatusCode::CREATED, axum::Json(receipt)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn lottery_handler<R>(
    State(service): State<Arc<LotteryService<R>>>,
    Path(project_id): Path<String>,
) -> Response
where
    R: LedgerRepository + 'static,
{
    match service.run_lottery_for_project(&ProjectId(project_id)) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn apartment_reservations_handler<R>(
    State(service): State<Arc<LotteryService<R>>>,
    Path((project_id, apartment_id)): Path<(String, String)>,
) -> Response
where
    R: LedgerRepository + 'static,
{
    let project_id = ProjectId(project_id);
    let apartment_id = ApartmentId(apartment_id);
    match service.apartment_reservations(&project_id, &apartment_id) {
        Ok(reservations) => {
            let payload = json!({
                "project_id": project_id,
                "apartment_id": apartment_id,
                "reservations": reservations,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn cancel_handler<R>(
    State(service): State<Arc<LotteryService<R>>>,
    Path(hold_id): Path<u64>,
    axum::Json(request): axum::Json<CancellationRequest>,
) -> Response
where
    R: LedgerRepository + 'static,
{
    match service.cancel_application_hold(HoldId(hold_id), request) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn offer_handler<R>(
    State(service): State<Arc<LotteryService<R>>>,
    Path(hold_id): Path<u64>,
) -> Response
where
    R: LedgerRepository + 'static,
{
    match service.offer(HoldId(hold_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn confirm_handler<R>(
    State(service): State<Arc<LotteryService<R>>>,
    Path(hold_id): Path<u64>,
) -> Response
where
    R: LedgerRepository + 'static,
{
    match service.confirm_review(HoldId(hold_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}
