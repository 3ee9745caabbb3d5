//! Error types for request validation.
//!
//! Everything here is an *input* error: it is raised before any message is
//! built or any connection is opened, and callers surface it as a rejection.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while parsing a mailbox address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Empty address")]
    Empty,

    #[error("Local-part exceeds 64 octets")]
    LocalPartTooLong,

    #[error("Domain exceeds 255 octets")]
    DomainTooLong,

    #[error("Missing '@' separator in mailbox")]
    MissingAtSign,

    #[error("Invalid local-part: {0}")]
    InvalidLocalPart(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid address literal: {0}")]
    InvalidAddressLiteral(String),

    #[error("Unclosed quoted string in local-part")]
    UnclosedQuotedString,

    #[error("Invalid quoted string: {0}")]
    InvalidQuotedString(String),
}

/// Errors that reject an [`EmailRequest`](crate::EmailRequest).
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request names no recipients at all.
    #[error("At least one recipient is required")]
    NoRecipients,

    /// A recipient failed mailbox syntax validation.
    #[error("Invalid recipient '{address}': {source}")]
    InvalidRecipient {
        address: String,
        #[source]
        source: AddressError,
    },

    /// An attachment path does not name an existing regular file.
    #[error("Attachment does not exist: {}", .0.display())]
    MissingAttachment(PathBuf),
}

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;

    use super::*;

    #[test]
    fn test_invalid_recipient_keeps_source() {
        let err = RequestError::InvalidRecipient {
            address: "bad-address".to_string(),
            source: AddressError::MissingAtSign,
        };

        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "Invalid recipient 'bad-address': Missing '@' separator in mailbox"
        );
    }

    #[test]
    fn test_missing_attachment_display() {
        let err = RequestError::MissingAttachment(PathBuf::from("/tmp/nope.pdf"));
        assert_eq!(err.to_string(), "Attachment does not exist: /tmp/nope.pdf");
    }
}
