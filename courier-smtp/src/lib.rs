//! Outbound SMTP for courier.
//!
//! Only the submission side of the protocol is implemented: connect (plain
//! or implicit TLS), EHLO, STARTTLS, AUTH, the mail transaction and QUIT.

pub mod client;
