//! Request and response bodies.
//!
//! Only `/send-email-with-attachment` takes [`EmailRequest`] as-is, with its
//! `attachment_paths`. Every other mail body is attachment-free and rejects
//! unknown fields, so a path can never reach the builder unchecked.

use axum::extract::FromRequest;
use chrono::NaiveDateTime;
use courier_common::{EmailAddress, EmailRequest, RequestError};
use courier_scheduler::ScheduledJob;
use serde::{Deserialize, Serialize};

use crate::ApiError;

/// `axum::Json`, with rejections rendered as [`ApiError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Wire shape shared by the attachment-free bodies.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PlainEmailFields {
    to_emails: Vec<EmailAddress>,
    subject: String,
    body: String,
    #[serde(default)]
    html: bool,
}

impl PlainEmailFields {
    fn into_request(self) -> Result<EmailRequest, RequestError> {
        Ok(EmailRequest::new(self.to_emails, self.subject, self.body)?.html(self.html))
    }
}

/// An [`EmailRequest`] that cannot carry attachments.
#[derive(Debug, Deserialize)]
#[serde(try_from = "PlainEmailFields")]
pub struct PlainEmailRequest(pub EmailRequest);

impl TryFrom<PlainEmailFields> for PlainEmailRequest {
    type Error = RequestError;

    fn try_from(fields: PlainEmailFields) -> Result<Self, Self::Error> {
        fields.into_request().map(Self)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ScheduleEmailFields {
    to_emails: Vec<EmailAddress>,
    subject: String,
    body: String,
    #[serde(default)]
    html: bool,
    scheduled_time: NaiveDateTime,
    #[serde(default)]
    timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(try_from = "ScheduleEmailFields")]
pub struct ScheduleEmailRequest {
    pub email: EmailRequest,

    /// Wall-clock time in `timezone`, without an offset.
    pub scheduled_time: NaiveDateTime,

    /// IANA zone name; the configured default when absent.
    pub timezone: Option<String>,
}

impl TryFrom<ScheduleEmailFields> for ScheduleEmailRequest {
    type Error = RequestError;

    fn try_from(fields: ScheduleEmailFields) -> Result<Self, Self::Error> {
        let email = PlainEmailFields {
            to_emails: fields.to_emails,
            subject: fields.subject,
            body: fields.body,
            html: fields.html,
        }
        .into_request()?;

        Ok(Self {
            email,
            scheduled_time: fields.scheduled_time,
            timezone: fields.timezone,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RegistrationEvent {
    pub user_email: EmailAddress,
    pub username: String,
    pub registration_time: NaiveDateTime,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduledResponse {
    pub message: String,
    pub job_id: String,
    /// RFC 3339, carrying the zone's offset at the trigger instant.
    pub scheduled_time: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub message: String,
    pub welcome_email_sent: bool,
    pub follow_up_job_id: String,
    pub follow_up_scheduled: String,
}

#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: String,
    pub run_time: String,
    pub payload: EmailRequest,
}

impl From<ScheduledJob> for JobView {
    fn from(job: ScheduledJob) -> Self {
        Self {
            id: job.id.to_string(),
            run_time: job.trigger_time.to_rfc3339(),
            payload: job.payload,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<JobView>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_schedule_request_carries_email_fields() {
        let request: ScheduleEmailRequest = serde_json::from_str(
            r#"{
                "to_emails": ["recipient@example.com"],
                "subject": "Scheduled",
                "body": "Later",
                "html": false,
                "scheduled_time": "2024-03-20T10:00:00",
                "timezone": "Asia/Shanghai"
            }"#,
        )
        .unwrap();

        assert_eq!(request.email.recipient_list(), "recipient@example.com");
        assert_eq!(request.email.subject(), "Scheduled");
        assert_eq!(request.scheduled_time.to_string(), "2024-03-20 10:00:00");
        assert_eq!(request.timezone.as_deref(), Some("Asia/Shanghai"));
    }

    #[test]
    fn test_schedule_request_timezone_optional() {
        let request: ScheduleEmailRequest = serde_json::from_str(
            r#"{
                "to_emails": ["a@x.com"],
                "subject": "S",
                "body": "B",
                "scheduled_time": "2030-01-01T00:00:00"
            }"#,
        )
        .unwrap();
        assert_eq!(request.timezone, None);
        assert!(!request.email.is_html());
    }

    #[test]
    fn test_registration_rejects_bad_address() {
        let result: Result<RegistrationEvent, _> = serde_json::from_str(
            r#"{
                "user_email": "bad-address",
                "username": "U",
                "registration_time": "2024-03-19T15:30:00"
            }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_plain_bodies_refuse_attachment_paths() {
        let plain = r#"{
            "to_emails": ["a@x.com"],
            "subject": "S",
            "body": "B",
            "attachment_paths": ["/etc/passwd"]
        }"#;
        let err = serde_json::from_str::<PlainEmailRequest>(plain).unwrap_err();
        assert!(err.to_string().contains("attachment_paths"));

        let scheduled = r#"{
            "to_emails": ["a@x.com"],
            "subject": "S",
            "body": "B",
            "scheduled_time": "2030-01-01T00:00:00",
            "attachment_paths": ["/etc/passwd"]
        }"#;
        assert!(serde_json::from_str::<ScheduleEmailRequest>(scheduled).is_err());
    }

    #[test]
    fn test_plain_body_validates_recipients() {
        let PlainEmailRequest(request) = serde_json::from_str(
            r#"{"to_emails": ["a@x.com"], "subject": "S", "body": "B", "html": true}"#,
        )
        .unwrap();
        assert!(request.is_html());
        assert!(request.attachment_paths().is_empty());

        let empty = r#"{"to_emails": [], "subject": "S", "body": "B"}"#;
        assert!(serde_json::from_str::<PlainEmailRequest>(empty).is_err());
    }
}
