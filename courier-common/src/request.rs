//! The dispatch request handed to the delivery engine and the scheduler.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{EmailAddress, error::RequestError};

/// A request to deliver one email.
///
/// The recipient list is never empty and every recipient is a validated
/// [`EmailAddress`]; both are enforced at construction. Attachment paths are
/// only checked when asked to ([`EmailRequest::check_attachments`]) or when
/// the message is built, since a file can disappear between the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RequestFields")]
pub struct EmailRequest {
    #[serde(rename = "to_emails")]
    recipients: Vec<EmailAddress>,
    subject: String,
    body: String,
    #[serde(rename = "html")]
    is_html: bool,
    #[serde(rename = "attachment_paths", skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<PathBuf>,
}

/// Unvalidated wire shape of [`EmailRequest`].
#[derive(Deserialize)]
struct RequestFields {
    to_emails: Vec<EmailAddress>,
    subject: String,
    body: String,
    #[serde(default)]
    html: bool,
    #[serde(default)]
    attachment_paths: Vec<PathBuf>,
}

impl TryFrom<RequestFields> for EmailRequest {
    type Error = RequestError;

    fn try_from(fields: RequestFields) -> Result<Self, Self::Error> {
        Ok(Self::new(fields.to_emails, fields.subject, fields.body)?
            .html(fields.html)
            .attachments(fields.attachment_paths))
    }
}

impl EmailRequest {
    /// Creates a plain-text request without attachments.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::NoRecipients`] if `recipients` is empty.
    pub fn new(
        recipients: Vec<EmailAddress>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<Self, RequestError> {
        if recipients.is_empty() {
            return Err(RequestError::NoRecipients);
        }

        Ok(Self {
            recipients,
            subject: subject.into(),
            body: body.into(),
            is_html: false,
            attachments: Vec::new(),
        })
    }

    /// Creates a request from unparsed recipient strings.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidRecipient`] for the first address that
    /// fails validation, or [`RequestError::NoRecipients`].
    pub fn parse(
        recipients: &[impl AsRef<str>],
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<Self, RequestError> {
        let recipients = recipients
            .iter()
            .map(|raw| {
                EmailAddress::parse(raw.as_ref()).map_err(|source| {
                    RequestError::InvalidRecipient {
                        address: raw.as_ref().to_string(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(recipients, subject, body)
    }

    /// Marks the body as HTML (`true`) or plain text (`false`).
    #[must_use]
    pub const fn html(mut self, is_html: bool) -> Self {
        self.is_html = is_html;
        self
    }

    /// Replaces the attachment list.
    #[must_use]
    pub fn attachments(mut self, attachments: Vec<PathBuf>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Replaces the body, keeping everything else.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn recipients(&self) -> &[EmailAddress] {
        &self.recipients
    }

    /// Recipients as a single comma-joined header value.
    pub fn recipient_list(&self) -> String {
        self.recipients
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub const fn is_html(&self) -> bool {
        self.is_html
    }

    pub fn attachment_paths(&self) -> &[PathBuf] {
        &self.attachments
    }

    /// Verifies that every attachment path names an existing regular file.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::MissingAttachment`] for the first path that
    /// does not.
    pub fn check_attachments(&self) -> Result<(), RequestError> {
        match self.attachments.iter().find(|path| !path.is_file()) {
            Some(missing) => Err(RequestError::MissingAttachment(missing.clone())),
            None => Ok(()),
        }
    }
}
