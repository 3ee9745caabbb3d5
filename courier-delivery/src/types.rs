//! Relay configuration, timeouts, credentials and connection strategies.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// SMTP operation timeout configuration
///
/// Every network step of a delivery attempt is bounded by one of these so a
/// stalled relay turns into a transport fault instead of a hung send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpTimeouts {
    /// TCP connect plus, for implicit TLS, the handshake.
    ///
    /// Default: 30 seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_secs: u64,

    /// Greeting, EHLO, STARTTLS, AUTH, MAIL FROM, RCPT TO and DATA.
    ///
    /// Default: 30 seconds
    #[serde(default = "default_command_timeout")]
    pub command_secs: u64,

    /// Message content transmission and the final reply.
    ///
    /// Default: 30 seconds
    #[serde(default = "default_data_timeout")]
    pub data_secs: u64,

    /// QUIT during teardown.
    ///
    /// Default: 10 seconds
    #[serde(default = "default_quit_timeout")]
    pub quit_secs: u64,
}

impl Default for SmtpTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_timeout(),
            command_secs: default_command_timeout(),
            data_secs: default_data_timeout(),
            quit_secs: default_quit_timeout(),
        }
    }
}

impl SmtpTimeouts {
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub const fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    pub const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    pub const fn quit(&self) -> Duration {
        Duration::from_secs(self.quit_secs)
    }
}

const fn default_connect_timeout() -> u64 {
    30
}

const fn default_command_timeout() -> u64 {
    30
}

const fn default_data_timeout() -> u64 {
    30
}

const fn default_quit_timeout() -> u64 {
    10
}

/// Where and how to reach the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for the primary, implicit TLS, strategy.
    #[serde(default = "default_implicit_tls_port")]
    pub implicit_tls_port: u16,

    /// Port for the STARTTLS fallback.
    #[serde(default = "default_starttls_port")]
    pub starttls_port: u16,

    /// Name announced in EHLO.
    #[serde(default = "default_hello_name")]
    pub hello_name: String,

    /// Skip certificate verification. Test relays only.
    #[serde(default)]
    pub accept_invalid_certs: bool,

    #[serde(default)]
    pub timeouts: SmtpTimeouts,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            implicit_tls_port: default_implicit_tls_port(),
            starttls_port: default_starttls_port(),
            hello_name: default_hello_name(),
            accept_invalid_certs: false,
            timeouts: SmtpTimeouts::default(),
        }
    }
}

impl RelayConfig {
    /// The ordered connection strategies: implicit TLS first, STARTTLS second.
    pub fn strategies(&self) -> Vec<Strategy> {
        vec![
            Strategy::new(Security::ImplicitTls, self.implicit_tls_port),
            Strategy::new(Security::StartTls, self.starttls_port),
        ]
    }
}

fn default_host() -> String {
    String::from("smtp.gmail.com")
}

const fn default_implicit_tls_port() -> u16 {
    465
}

const fn default_starttls_port() -> u16 {
    587
}

fn default_hello_name() -> String {
    String::from("localhost")
}

/// How a connection gets encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Security {
    /// TLS from the first byte.
    ImplicitTls,
    /// Plaintext upgraded with the STARTTLS command before authenticating.
    StartTls,
}

/// One way of reaching the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Strategy {
    pub security: Security,
    pub port: u16,
}

impl Strategy {
    pub const fn new(security: Security, port: u16) -> Self {
        Self { security, port }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.security {
            Security::ImplicitTls => write!(f, "implicit TLS on port {}", self.port),
            Security::StartTls => write!(f, "STARTTLS on port {}", self.port),
        }
    }
}

/// Relay login. The username doubles as the envelope sender and `From`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    secret: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}
