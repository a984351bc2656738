use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{
    ComponentId, EnrollmentId, RequestContext, Role, SectionId, UserId,
};
use super::notify::NotificationSink;
use super::service::{EnrollmentError, EnrollmentService};
use super::settlement::{SettlementEngine, SettlementError};
use super::store::{RegistryStore, StoreError};

/// Shared handler state: the two engines over one store.
pub struct RegistrarState<S, N> {
    pub service: Arc<EnrollmentService<S, N>>,
    pub engine: Arc<SettlementEngine<S, N>>,
}

impl<S, N> Clone for RegistrarState<S, N> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            engine: Arc::clone(&self.engine),
        }
    }
}

/// Router exposing the library-level transaction boundary over HTTP.
///
/// Caller identity arrives in the payloads; authenticating it is the front
/// end's job, not this core's.
pub fn registrar_router<S, N>(
    service: Arc<EnrollmentService<S, N>>,
    engine: Arc<SettlementEngine<S, N>>,
) -> Router
where
    S: RegistryStore + Send + Sync + 'static,
    N: NotificationSink + 'static,
{
    let state = RegistrarState { service, engine };
    Router::new()
        .route("/api/v1/enrollments", post(register_handler::<S, N>))
        .route(
            "/api/v1/enrollments/:enrollment_id/drop",
            post(drop_handler::<S, N>),
        )
        .route(
            "/api/v1/sections/:section_id/settlement",
            post(settlement_handler::<S, N>),
        )
        .route(
            "/api/v1/sections/:section_id/scores",
            put(record_score_handler::<S, N>),
        )
        .route(
            "/api/v1/sections/:section_id/roster",
            get(roster_handler::<S, N>),
        )
        .route(
            "/api/v1/students/:student_id/sections/available",
            get(available_handler::<S, N>),
        )
        .route(
            "/api/v1/students/:student_id/enrollments",
            get(enrollments_handler::<S, N>),
        )
        .with_state(state)
}

fn effective_date(as_of: Option<NaiveDate>) -> NaiveDate {
    as_of.unwrap_or_else(|| Local::now().date_naive())
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterRequest {
    student_id: String,
    section_id: String,
    /// Registrar staff registering on a student's behalf send their own
    /// identity here; absent, the student is the caller.
    #[serde(default)]
    acting_user: Option<String>,
    #[serde(default)]
    acting_role: Option<Role>,
    #[serde(default)]
    as_of: Option<NaiveDate>,
}

pub(crate) async fn register_handler<S, N>(
    State(state): State<RegistrarState<S, N>>,
    Json(payload): Json<RegisterRequest>,
) -> Response
where
    S: RegistryStore + 'static,
    N: NotificationSink + 'static,
{
    let student = UserId(payload.student_id);
    let caller = payload
        .acting_user
        .map(UserId)
        .unwrap_or_else(|| student.clone());
    let role = payload.acting_role.unwrap_or(Role::Student);
    let ctx = RequestContext::new(caller, role, effective_date(payload.as_of));
    let section = SectionId(payload.section_id);

    match state.service.register(&ctx, &student, &section) {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(err) => enrollment_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DropRequest {
    student_id: String,
    #[serde(default)]
    acting_user: Option<String>,
    #[serde(default)]
    acting_role: Option<Role>,
    #[serde(default)]
    as_of: Option<NaiveDate>,
}

pub(crate) async fn drop_handler<S, N>(
    State(state): State<RegistrarState<S, N>>,
    Path(enrollment_id): Path<String>,
    Json(payload): Json<DropRequest>,
) -> Response
where
    S: RegistryStore + 'static,
    N: NotificationSink + 'static,
{
    let caller = payload.acting_user.unwrap_or(payload.student_id);
    let role = payload.acting_role.unwrap_or(Role::Student);
    let ctx = RequestContext::new(UserId(caller), role, effective_date(payload.as_of));
    let enrollment = EnrollmentId(enrollment_id);

    match state.service.drop_enrollment(&ctx, &enrollment) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => enrollment_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SettlementRequest {
    acting_user: String,
    #[serde(default)]
    acting_role: Option<Role>,
    #[serde(default)]
    as_of: Option<NaiveDate>,
}

pub(crate) async fn settlement_handler<S, N>(
    State(state): State<RegistrarState<S, N>>,
    Path(section_id): Path<String>,
    Json(payload): Json<SettlementRequest>,
) -> Response
where
    S: RegistryStore + 'static,
    N: NotificationSink + 'static,
{
    let role = payload.acting_role.unwrap_or(Role::Instructor);
    let ctx = RequestContext::new(
        UserId(payload.acting_user),
        role,
        effective_date(payload.as_of),
    );
    let section = SectionId(section_id);

    match state.engine.compute_final_grades(&ctx, &section) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => settlement_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordScoreRequest {
    acting_user: String,
    #[serde(default)]
    acting_role: Option<Role>,
    enrollment_id: String,
    component_id: String,
    score: f64,
    #[serde(default)]
    as_of: Option<NaiveDate>,
}

pub(crate) async fn record_score_handler<S, N>(
    State(state): State<RegistrarState<S, N>>,
    Path(section_id): Path<String>,
    Json(payload): Json<RecordScoreRequest>,
) -> Response
where
    S: RegistryStore + 'static,
    N: NotificationSink + 'static,
{
    let role = payload.acting_role.unwrap_or(Role::Instructor);
    let ctx = RequestContext::new(
        UserId(payload.acting_user),
        role,
        effective_date(payload.as_of),
    );

    let result = state.engine.record_score(
        &ctx,
        &SectionId(section_id),
        &EnrollmentId(payload.enrollment_id),
        &ComponentId(payload.component_id),
        payload.score,
    );

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => settlement_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RosterQuery {
    acting_user: String,
    #[serde(default)]
    acting_role: Option<Role>,
}

pub(crate) async fn roster_handler<S, N>(
    State(state): State<RegistrarState<S, N>>,
    Path(section_id): Path<String>,
    axum::extract::Query(query): axum::extract::Query<RosterQuery>,
) -> Response
where
    S: RegistryStore + 'static,
    N: NotificationSink + 'static,
{
    let role = query.acting_role.unwrap_or(Role::Instructor);
    let ctx = RequestContext::new(
        UserId(query.acting_user),
        role,
        Local::now().date_naive(),
    );

    match state.service.roster(&ctx, &SectionId(section_id)) {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(err) => enrollment_error_response(err),
    }
}

pub(crate) async fn available_handler<S, N>(
    State(state): State<RegistrarState<S, N>>,
    Path(student_id): Path<String>,
) -> Response
where
    S: RegistryStore + 'static,
    N: NotificationSink + 'static,
{
    let student = UserId(student_id);
    let ctx = RequestContext::new(student.clone(), Role::Student, Local::now().date_naive());

    match state.service.available_sections(&ctx, &student) {
        Ok(views) => (StatusCode::OK, Json(views)).into_response(),
        Err(err) => enrollment_error_response(err),
    }
}

pub(crate) async fn enrollments_handler<S, N>(
    State(state): State<RegistrarState<S, N>>,
    Path(student_id): Path<String>,
) -> Response
where
    S: RegistryStore + 'static,
    N: NotificationSink + 'static,
{
    let student = UserId(student_id);
    let ctx = RequestContext::new(student.clone(), Role::Student, Local::now().date_naive());

    match state.service.active_enrollments(&ctx, &student) {
        Ok(views) => (StatusCode::OK, Json(views)).into_response(),
        Err(err) => enrollment_error_response(err),
    }
}

fn enrollment_error_response(err: EnrollmentError) -> Response {
    let status = match &err {
        EnrollmentError::Denied(_) => StatusCode::FORBIDDEN,
        EnrollmentError::MissingPrerequisites(_)
        | EnrollmentError::PastAddDeadline(_)
        | EnrollmentError::PastDropDeadline(_)
        | EnrollmentError::NotRegistered
        | EnrollmentError::TimetableConflict(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EnrollmentError::AlreadyRegistered | EnrollmentError::SectionFull => StatusCode::CONFLICT,
        EnrollmentError::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,
        EnrollmentError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
        EnrollmentError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let retryable = err.is_retryable();
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        // Infrastructure detail stays in the logs, not the response.
        error!(%err, "enrollment request failed");
        "the registrar is temporarily unavailable, please try again".to_string()
    } else {
        err.to_string()
    };

    let payload = json!({ "error": message, "retryable": retryable });
    (status, Json(payload)).into_response()
}

fn settlement_error_response(err: SettlementError) -> Response {
    let status = match &err {
        SettlementError::Denied(_) => StatusCode::FORBIDDEN,
        SettlementError::IncompleteWeights { .. }
        | SettlementError::ScoreOutOfRange { .. }
        | SettlementError::ComponentMismatch { .. }
        | SettlementError::EnrollmentMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SettlementError::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,
        SettlementError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
        SettlementError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let retryable = matches!(
        status,
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::INTERNAL_SERVER_ERROR
    );
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(%err, "settlement request failed");
        "the registrar is temporarily unavailable, please try again".to_string()
    } else {
        err.to_string()
    };

    let payload = json!({ "error": message, "retryable": retryable });
    (status, Json(payload)).into_response()
}
