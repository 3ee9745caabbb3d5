//! Mail dispatch for courier.
//!
//! A [`Dispatcher`] turns an [`EmailRequest`](courier_common::EmailRequest)
//! into a [`MailMessage`] and hands it to a [`DeliverySession`], which tries
//! implicit TLS first and falls back to STARTTLS when the first attempt fails
//! at the transport level.

mod dispatch;
pub mod error;
mod message;
mod session;
mod transaction;
mod types;

pub use dispatch::{Dispatch, Dispatcher};
pub use error::{AttemptFault, BuildError, DeliveryError, DispatchError, TransportError};
pub use message::{Attachment, BodyPart, MailMessage};
pub use session::{DeliveryReport, DeliverySession, RelayTransport, SmtpRelay};
pub use types::{Credentials, RelayConfig, Security, SmtpTimeouts, Strategy};
