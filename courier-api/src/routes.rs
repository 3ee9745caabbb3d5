//! Route table and handlers.
//!
//! Handlers only translate between JSON and the dispatch / scheduling
//! operations; every delivery decision is made behind [`Dispatch`].

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use chrono::TimeDelta;
use courier_common::EmailRequest;
use courier_delivery::Dispatch;
use courier_scheduler::{Scheduler, timezone};

use crate::{
    ApiError,
    models::{
        ApiJson, JobView, JobsResponse, MessageResponse, PlainEmailRequest, RegistrationEvent,
        RegistrationResponse, ScheduleEmailRequest, ScheduledResponse,
    },
    templates::{self, Template},
};

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<dyn Dispatch>,
    scheduler: Arc<Scheduler>,
    default_timezone: Arc<str>,
}

impl AppState {
    pub fn new(
        dispatcher: Arc<dyn Dispatch>,
        scheduler: Arc<Scheduler>,
        default_timezone: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            dispatcher,
            scheduler,
            default_timezone: default_timezone.into(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/send-email", post(send_email))
        .route("/send-html-email", post(send_html_email))
        .route("/send-email-with-attachment", post(send_email_with_attachment))
        .route("/send-template-email/{template}", post(send_template_email))
        .route("/schedule-email", post(schedule_email))
        .route("/user-registration", post(user_registration))
        .route("/scheduled-jobs", get(scheduled_jobs))
        .route("/cancel-scheduled-job/{id}", delete(cancel_scheduled_job))
        .route("/health/live", get(liveness))
        .with_state(state)
}

/// Sends on a task of its own, so a caller that disconnects or hits the
/// request timeout never cuts a delivery off between strategies.
async fn dispatch(state: &AppState, request: EmailRequest) -> Result<bool, ApiError> {
    let dispatcher = Arc::clone(&state.dispatcher);
    tokio::spawn(async move { dispatcher.send(&request).await })
        .await
        .map_err(|e| ApiError::Internal(format!("Email dispatch task failed: {e}")))
}

async fn deliver(state: &AppState, request: EmailRequest) -> Result<(), ApiError> {
    if dispatch(state, request).await? {
        Ok(())
    } else {
        Err(ApiError::Internal("Email sending failed".to_string()))
    }
}

async fn send_email(
    State(state): State<AppState>,
    ApiJson(PlainEmailRequest(request)): ApiJson<PlainEmailRequest>,
) -> ApiResult<MessageResponse> {
    deliver(&state, request).await?;
    Ok(Json(MessageResponse::new("Email sent successfully")))
}

async fn send_html_email(
    State(state): State<AppState>,
    ApiJson(PlainEmailRequest(request)): ApiJson<PlainEmailRequest>,
) -> ApiResult<MessageResponse> {
    deliver(&state, request.html(true)).await?;
    Ok(Json(MessageResponse::new("HTML email sent successfully")))
}

async fn send_email_with_attachment(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<EmailRequest>,
) -> ApiResult<MessageResponse> {
    request.check_attachments()?;
    deliver(&state, request).await?;
    Ok(Json(MessageResponse::new(
        "Email with attachments sent successfully",
    )))
}

async fn send_template_email(
    Path(name): Path<String>,
    State(state): State<AppState>,
    ApiJson(PlainEmailRequest(request)): ApiJson<PlainEmailRequest>,
) -> ApiResult<MessageResponse> {
    let template = Template::from_name(&name)
        .ok_or_else(|| ApiError::BadRequest("Invalid template name".to_string()))?;

    let body = template.render(request.body());
    deliver(&state, request.with_body(body).html(true)).await?;

    Ok(Json(MessageResponse::new(format!(
        "Template email '{}' sent successfully",
        template.name()
    ))))
}

async fn schedule_email(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ScheduleEmailRequest>,
) -> ApiResult<ScheduledResponse> {
    let zone = request
        .timezone
        .as_deref()
        .unwrap_or(&state.default_timezone);

    let job = state
        .scheduler
        .schedule(request.email, request.scheduled_time, zone)?;

    Ok(Json(ScheduledResponse {
        message: "Email successfully scheduled".to_string(),
        job_id: job.id.to_string(),
        scheduled_time: job.trigger_time.to_rfc3339(),
    }))
}

async fn user_registration(
    State(state): State<AppState>,
    ApiJson(event): ApiJson<RegistrationEvent>,
) -> ApiResult<RegistrationResponse> {
    // Resolve the follow-up first so a bad time rejects before anything is sent.
    let follow_up_at = event
        .registration_time
        .checked_add_signed(TimeDelta::days(3))
        .ok_or_else(|| ApiError::BadRequest("registration_time out of range".to_string()))?;
    let follow_up_at = timezone::resolve(follow_up_at, &state.default_timezone)?;

    let welcome = EmailRequest::new(
        vec![event.user_email.clone()],
        templates::WELCOME_SUBJECT,
        templates::registration_welcome(&event.username),
    )?
    .html(true);
    let follow_up = EmailRequest::new(
        vec![event.user_email],
        templates::FOLLOW_UP_SUBJECT,
        templates::registration_follow_up(&event.username),
    )?
    .html(true);

    let welcome_email_sent = dispatch(&state, welcome).await?;
    let job = state.scheduler.schedule_at(follow_up, follow_up_at);

    Ok(Json(RegistrationResponse {
        message: "User registration event handled successfully".to_string(),
        welcome_email_sent,
        follow_up_job_id: job.id.to_string(),
        follow_up_scheduled: job.trigger_time.to_rfc3339(),
    }))
}

async fn scheduled_jobs(State(state): State<AppState>) -> Json<JobsResponse> {
    Json(JobsResponse {
        jobs: state
            .scheduler
            .list()
            .into_iter()
            .map(JobView::from)
            .collect(),
    })
}

async fn cancel_scheduled_job(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<MessageResponse> {
    if state.scheduler.cancel(&id) {
        Ok(Json(MessageResponse::new("Task canceled")))
    } else {
        Err(ApiError::NotFound("Task not found".to_string()))
    }
}

async fn liveness() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
