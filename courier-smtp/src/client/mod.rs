//! SMTP submission client.
//!
//! The client is deliberately low level: every command method returns the
//! relay's [`Response`] and leaves the decision about which codes are
//! acceptable to the caller. The exceptions are the connection-level steps
//! (TLS handshakes and the multi-step AUTH exchange) which fail with a
//! [`ClientError`] directly.
//!
//! # Examples
//!
//! ## Implicit TLS (port 465)
//!
//! ```no_run
//! use courier_smtp::client::{SmtpClient, TlsContext};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tls = TlsContext::new(false)?;
//! let mut client = SmtpClient::connect_tls("smtp.example.com", 465, &tls).await?;
//! client.read_greeting().await?;
//! client.ehlo("client.example.com").await?;
//! client.authenticate("user@example.com", "secret").await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## STARTTLS (port 587)
//!
//! ```no_run
//! use courier_smtp::client::{SmtpClient, TlsContext};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tls = TlsContext::new(false)?;
//! let mut client = SmtpClient::connect("smtp.example.com", 587).await?;
//! client.read_greeting().await?;
//! client.ehlo("client.example.com").await?;
//! client.starttls(&tls).await?;
//! client.ehlo("client.example.com").await?;
//! # Ok(())
//! # }
//! ```

mod connection;
mod error;
mod response;
mod smtp_client;

pub use connection::TlsContext;
pub use error::{ClientError, Result};
pub use response::Response;
pub use smtp_client::{AuthMechanism, SmtpClient};
