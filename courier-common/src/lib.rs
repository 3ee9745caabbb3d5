//! Types shared by every courier crate: validated mailbox addresses, the
//! dispatch request, logging setup and the process shutdown signal.

pub mod address;
pub mod error;
pub mod logging;
pub mod request;

pub use address::EmailAddress;
pub use error::{AddressError, RequestError};
pub use request::EmailRequest;
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
