//! Typed error handling for message building and delivery.
//!
//! Delivery attempts fail with an [`AttemptFault`], which separates
//! transport faults (worth trying the next connection strategy for) from
//! everything else. The session turns the last fault into a
//! [`DeliveryError`], and the dispatcher folds build and delivery failures
//! into a [`DispatchError`].

use std::{io, path::PathBuf};

use courier_smtp::client::ClientError;
use thiserror::Error;

use crate::Strategy;

/// The message could not be assembled. Nothing was sent.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to read attachment {}: {source}", .path.display())]
    AttachmentUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Attachment path has no file name: {}", .0.display())]
    InvalidAttachmentName(PathBuf),
}

/// Failures of the connection or of the relay conversation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),

    /// The relay answered with a 4xx or 5xx reply.
    #[error("Relay rejected command: {code} {message}")]
    Rejected { code: u16, message: String },

    #[error("Authentication failed: {code} {message}")]
    AuthenticationFailed { code: u16, message: String },

    /// Malformed or out-of-sequence replies, or nothing to authenticate with.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Why a single attempt failed.
#[derive(Debug, Error)]
pub enum AttemptFault {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A local fault that another connection strategy would not fix.
    #[error("{0}")]
    Other(String),
}

impl AttemptFault {
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Classifies client failures.
///
/// Everything the relay or the network can cause is a transport fault. An
/// unusable TLS server name is ours, and would fail identically on any port.
impl From<ClientError> for AttemptFault {
    fn from(error: ClientError) -> Self {
        let transport = match error {
            ClientError::Io(e) => TransportError::ConnectionFailed(e.to_string()),
            ClientError::ConnectionClosed => TransportError::ConnectionClosed,
            ClientError::TlsError(msg) => TransportError::TlsHandshakeFailed(msg),
            ClientError::SmtpError { code, message } => {
                TransportError::Rejected { code, message }
            }
            ClientError::AuthenticationFailed { code, message } => {
                TransportError::AuthenticationFailed { code, message }
            }
            ClientError::UnexpectedResponse { code, message } => {
                TransportError::Protocol(format!("Unexpected reply: {code} {message}"))
            }
            ClientError::ParseError(msg) => TransportError::Protocol(msg),
            ClientError::Utf8Error(e) => {
                TransportError::Protocol(format!("Reply is not UTF-8: {e}"))
            }
            ClientError::NoSupportedMechanism(offered) => TransportError::Protocol(format!(
                "No supported AUTH mechanism (relay offers: {offered})"
            )),
            ClientError::InvalidServerName(name) => {
                return Self::Other(format!("Invalid TLS server name: {name}"));
            }
        };

        Self::Transport(transport)
    }
}

/// The final outcome of a failed delivery session.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// A non-transport fault stopped the session before any fallback.
    #[error("Delivery via {strategy} aborted: {fault}")]
    Aborted {
        strategy: Strategy,
        fault: AttemptFault,
    },

    /// Every strategy was tried; `fault` is from the last one.
    #[error("All delivery strategies failed, last via {strategy}: {fault}")]
    Exhausted {
        strategy: Strategy,
        fault: AttemptFault,
    },

    #[error("No delivery strategies configured")]
    NoStrategies,
}

impl DeliveryError {
    /// The fault that ended the session, if an attempt was made.
    pub const fn fault(&self) -> Option<&AttemptFault> {
        match self {
            Self::Aborted { fault, .. } | Self::Exhausted { fault, .. } => Some(fault),
            Self::NoStrategies => None,
        }
    }
}

/// Anything that can stop a `send`.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to build message: {0}")]
    Build(#[from] BuildError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl DispatchError {
    pub const fn is_build(&self) -> bool {
        matches!(self, Self::Build(_))
    }

    pub const fn is_delivery(&self) -> bool {
        matches!(self, Self::Delivery(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Security;

    #[test]
    fn test_reply_rejections_are_transport_faults() {
        let fault = AttemptFault::from(ClientError::SmtpError {
            code: 421,
            message: "Service not available".to_string(),
        });
        assert!(fault.is_transport());
        assert_eq!(
            fault.to_string(),
            "Relay rejected command: 421 Service not available"
        );

        let fault = AttemptFault::from(ClientError::AuthenticationFailed {
            code: 535,
            message: "Bad credentials".to_string(),
        });
        assert!(matches!(
            fault,
            AttemptFault::Transport(TransportError::AuthenticationFailed { code: 535, .. })
        ));
    }

    #[test]
    fn test_network_failures_are_transport_faults() {
        let refused = ClientError::Io(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert!(AttemptFault::from(refused).is_transport());
        assert!(AttemptFault::from(ClientError::ConnectionClosed).is_transport());
        assert!(AttemptFault::from(ClientError::TlsError("bad record".to_string())).is_transport());
        assert!(AttemptFault::from(ClientError::ParseError("junk".to_string())).is_transport());
    }

    #[test]
    fn test_invalid_server_name_is_other() {
        let fault = AttemptFault::from(ClientError::InvalidServerName("bad host".to_string()));
        assert!(!fault.is_transport());
        assert_eq!(fault.to_string(), "Invalid TLS server name: bad host");
    }

    #[test]
    fn test_delivery_error_display() {
        let error = DeliveryError::Exhausted {
            strategy: Strategy::new(Security::StartTls, 587),
            fault: TransportError::ConnectionClosed.into(),
        };
        assert_eq!(
            error.to_string(),
            concat!(
                "All delivery strategies failed, last via STARTTLS on port 587: ",
                "Connection closed unexpectedly"
            )
        );
        assert!(error.fault().is_some_and(AttemptFault::is_transport));
        assert!(DeliveryError::NoStrategies.fault().is_none());
    }

    #[test]
    fn test_dispatch_error_kinds() {
        let error: DispatchError = BuildError::InvalidAttachmentName(PathBuf::from("/")).into();
        assert!(error.is_build());
        assert!(!error.is_delivery());
        assert_eq!(
            error.to_string(),
            "Failed to build message: Attachment path has no file name: /"
        );
    }
}
