//! Building and rendering the outgoing MIME message.

use std::{fmt::Write as _, path::Path};

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use courier_common::{EmailAddress, EmailRequest};
use ulid::Ulid;

use crate::error::BuildError;

/// Base64 output is wrapped at this width (RFC 2045).
const LINE_WIDTH: usize = 76;

/// Bytes of subject text per encoded-word, keeping each word under 75 chars.
const ENCODED_WORD_CHUNK: usize = 45;

/// The single text part of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyPart {
    pub text: String,
    pub is_html: bool,
}

impl BodyPart {
    pub const fn content_type(&self) -> &'static str {
        if self.is_html { "text/html" } else { "text/plain" }
    }
}

/// A file carried as `application/octet-stream`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub const CONTENT_TYPE: &'static str = "application/octet-stream";
}

/// A fully assembled message, ready to render and send.
///
/// Built fresh for every send from an [`EmailRequest`]; attachment files are
/// read during [`MailMessage::build`] so the rendered output never touches the
/// filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    sender: String,
    recipients: Vec<EmailAddress>,
    to_header: String,
    subject: String,
    body: BodyPart,
    attachments: Vec<Attachment>,
    date: DateTime<Utc>,
    id: Ulid,
}

impl MailMessage {
    /// Assembles the message, reading every attachment into memory.
    ///
    /// # Errors
    ///
    /// Fails on the first attachment that cannot be read or has no file
    /// name. No partial message is returned.
    pub async fn build(request: &EmailRequest, sender: &str) -> Result<Self, BuildError> {
        let mut attachments = Vec::with_capacity(request.attachment_paths().len());

        for path in request.attachment_paths() {
            let filename = file_name(path)?;
            let content =
                tokio::fs::read(path)
                    .await
                    .map_err(|source| BuildError::AttachmentUnreadable {
                        path: path.clone(),
                        source,
                    })?;

            attachments.push(Attachment { filename, content });
        }

        Ok(Self {
            sender: sender.to_string(),
            recipients: request.recipients().to_vec(),
            to_header: request.recipient_list(),
            subject: request.subject().to_string(),
            body: BodyPart {
                text: request.body().to_string(),
                is_html: request.is_html(),
            },
            attachments,
            date: Utc::now(),
            id: Ulid::new(),
        })
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipients(&self) -> &[EmailAddress] {
        &self.recipients
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub const fn body(&self) -> &BodyPart {
        &self.body
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// `<ulid@sender-domain>`, falling back to `localhost` for a bare sender.
    pub fn message_id(&self) -> String {
        let domain = self
            .sender
            .rsplit_once('@')
            .map_or("localhost", |(_, domain)| domain);
        format!("<{}@{domain}>", self.id)
    }

    fn boundary(&self) -> String {
        format!("=_courier_{}", self.id)
    }

    /// Renders the RFC 5322 `multipart/mixed` form with CRLF line endings.
    pub fn render(&self) -> Vec<u8> {
        let boundary = self.boundary();
        let mut out = String::with_capacity(
            1024 + self.body.text.len() * 4 / 3
                + self
                    .attachments
                    .iter()
                    .map(|a| a.content.len() * 4 / 3 + 256)
                    .sum::<usize>(),
        );

        let _ = write!(out, "From: {}\r\n", self.sender);
        let _ = write!(out, "To: {}\r\n", self.to_header);
        let _ = write!(out, "Subject: {}\r\n", encode_subject(&self.subject));
        let _ = write!(out, "Date: {}\r\n", self.date.to_rfc2822());
        let _ = write!(out, "Message-ID: {}\r\n", self.message_id());
        out.push_str("MIME-Version: 1.0\r\n");
        let _ = write!(
            out,
            "Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n\r\n"
        );

        let _ = write!(out, "--{boundary}\r\n");
        let _ = write!(
            out,
            "Content-Type: {}; charset=\"utf-8\"\r\n",
            self.body.content_type()
        );
        out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
        push_base64(&mut out, self.body.text.as_bytes());

        for attachment in &self.attachments {
            let _ = write!(out, "--{boundary}\r\n");
            let _ = write!(out, "Content-Type: {}\r\n", Attachment::CONTENT_TYPE);
            let _ = write!(
                out,
                "Content-Disposition: attachment; {}\r\n",
                filename_parameter(&attachment.filename)
            );
            out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
            push_base64(&mut out, &attachment.content);
        }

        let _ = write!(out, "--{boundary}--\r\n");
        out.into_bytes()
    }
}

fn file_name(path: &Path) -> Result<String, BuildError> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| BuildError::InvalidAttachmentName(path.to_path_buf()))
}

fn push_base64(out: &mut String, data: &[u8]) {
    let encoded = STANDARD.encode(data);
    // base64 output is ASCII, so chunking by bytes never splits a char
    for line in encoded.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push_str("\r\n");
    }
}

/// Header-safe subject: CR/LF collapsed, non-ASCII as RFC 2047 encoded-words.
fn encode_subject(subject: &str) -> String {
    let subject = subject.replace(['\r', '\n'], " ");
    if subject.is_ascii() {
        return subject;
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in subject.chars() {
        if chunk.len() + c.len_utf8() > ENCODED_WORD_CHUNK {
            words.push(format!("=?utf-8?B?{}?=", STANDARD.encode(&chunk)));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(format!("=?utf-8?B?{}?=", STANDARD.encode(&chunk)));
    }

    words.join("\r\n ")
}

/// `filename="..."` for ASCII names, RFC 2231 `filename*=` otherwise.
fn filename_parameter(filename: &str) -> String {
    if filename.is_ascii() && !filename.chars().any(|c| c.is_ascii_control()) {
        let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
        return format!("filename=\"{escaped}\"");
    }

    let mut encoded = String::from("filename*=utf-8''");
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    encoded
}
