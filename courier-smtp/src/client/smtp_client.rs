//! The SMTP submission client.

use base64::{Engine, engine::general_purpose::STANDARD};
use courier_common::{incoming, outgoing};

use super::{
    connection::{ClientConnection, TlsContext},
    error::{ClientError, Result},
    response::Response,
};

/// Initial size of the read buffer for SMTP responses.
const BUFFER_SIZE: usize = 4096;

/// Upper bound for a single reply. Anything larger is not a relay we want to talk to.
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// SASL mechanisms the client can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMechanism {
    Plain,
    Login,
}

impl AuthMechanism {
    /// Picks a mechanism from the relay's advertised list.
    ///
    /// `PLAIN` wins whenever it is offered. A relay that advertises nothing is
    /// also tried with `PLAIN`, since some only list mechanisms after STARTTLS.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoSupportedMechanism` if the relay offers
    /// mechanisms but neither `PLAIN` nor `LOGIN` is among them.
    pub fn select(advertised: &[String]) -> Result<Self> {
        if advertised.is_empty() || advertised.iter().any(|m| m == "PLAIN") {
            Ok(Self::Plain)
        } else if advertised.iter().any(|m| m == "LOGIN") {
            Ok(Self::Login)
        } else {
            Err(ClientError::NoSupportedMechanism(advertised.join(" ")))
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }
}

/// A single connection to a relay.
///
/// Each command method writes one command and waits for the full reply.
pub struct SmtpClient {
    connection: Option<ClientConnection>,
    host: String,
    buffer: Vec<u8>,
    buffer_pos: usize,
    capabilities: Option<Response>,
}

impl SmtpClient {
    fn new(connection: ClientConnection, host: &str) -> Self {
        Self {
            connection: Some(connection),
            host: host.to_string(),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            capabilities: None,
        }
    }

    /// Opens a plaintext connection, to be upgraded with [`SmtpClient::starttls`].
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Io` if the TCP connection cannot be established.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        Ok(Self::new(ClientConnection::plain(host, port).await?, host))
    }

    /// Opens a connection that is encrypted from the first byte (implicit TLS).
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP connection or the TLS handshake fails, or
    /// if `host` is not a valid TLS server name.
    pub async fn connect_tls(host: &str, port: u16, tls: &TlsContext) -> Result<Self> {
        Ok(Self::new(ClientConnection::tls(host, port, tls).await?, host))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_tls(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(ClientConnection::is_tls)
    }

    /// The most recent EHLO reply on the current transport layer.
    pub const fn capabilities(&self) -> Option<&Response> {
        self.capabilities.as_ref()
    }

    /// Reads the relay's greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is malformed.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// Sends a raw command line and reads the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        self.command_logged(command, command).await
    }

    /// Like [`SmtpClient::command`], but logs `shown` in place of the real line.
    async fn command_logged(&mut self, command: &str, shown: &str) -> Result<Response> {
        outgoing!("[{}] {}", self.host, shown);

        let connection = self
            .connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?;
        connection.send(format!("{command}\r\n").as_bytes()).await?;
        connection.flush().await?;

        self.read_response().await
    }

    /// Sends EHLO and remembers the advertised extensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        let response = self.command(&format!("EHLO {domain}")).await?;
        if response.is_success() {
            self.capabilities = Some(response.clone());
        }
        Ok(response)
    }

    /// Sends STARTTLS and, on a 220 reply, upgrades the connection in place.
    ///
    /// The relay forgets everything it learnt before the upgrade, so EHLO must
    /// be sent again afterwards.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::SmtpError` if the relay refuses, or a TLS error if
    /// the handshake fails.
    pub async fn starttls(&mut self, tls: &TlsContext) -> Result<Response> {
        let response = self.command("STARTTLS").await?.expect_code(220)?;

        let connection = self
            .connection
            .take()
            .ok_or(ClientError::ConnectionClosed)?;
        self.connection = Some(connection.upgrade(&self.host, tls).await?);
        self.capabilities = None;
        self.buffer_pos = 0;

        Ok(response)
    }

    /// Authenticates with the mechanism chosen from the last EHLO reply.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::AuthenticationFailed` if the relay rejects the
    /// credentials, or `ClientError::NoSupportedMechanism` if it offers
    /// nothing the client can speak.
    pub async fn authenticate(&mut self, username: &str, secret: &str) -> Result<AuthMechanism> {
        let advertised = self
            .capabilities
            .as_ref()
            .map(Response::auth_mechanisms)
            .unwrap_or_default();
        let mechanism = AuthMechanism::select(&advertised)?;

        match mechanism {
            AuthMechanism::Plain => {
                let token = STANDARD.encode(format!("\0{username}\0{secret}"));
                let response = self
                    .command_logged(&format!("AUTH PLAIN {token}"), "AUTH PLAIN <redacted>")
                    .await?;
                auth_step(response, 235)?;
            }
            AuthMechanism::Login => {
                let response = self.command("AUTH LOGIN").await?;
                auth_step(response, 334)?;

                let response = self
                    .command_logged(&STANDARD.encode(username), "<username>")
                    .await?;
                auth_step(response, 334)?;

                let response = self
                    .command_logged(&STANDARD.encode(secret), "<redacted>")
                    .await?;
                auth_step(response, 235)?;
            }
        }

        Ok(mechanism)
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Sends the message content followed by the end-of-data marker.
    ///
    /// Lines beginning with `.` are dot-stuffed, and the content is
    /// terminated with CRLF if it is not already.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading the reply fails.
    pub async fn send_data(&mut self, content: &[u8]) -> Result<Response> {
        outgoing!("[{}] <{} bytes of message content>", self.host, content.len());

        let connection = self
            .connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?;
        connection.send(&dot_stuff(content)).await?;
        connection.flush().await?;

        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) = Response::parse(&self.buffer[..self.buffer_pos])? {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("[{}] {} {}", self.host, response.code, response.message());
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }
}

fn auth_step(response: Response, expected: u16) -> Result<Response> {
    if response.code == expected {
        Ok(response)
    } else if response.is_error() {
        Err(ClientError::AuthenticationFailed {
            code: response.code,
            message: response.message(),
        })
    } else {
        Err(response.into_error())
    }
}

/// Applies SMTP transparency and appends the `.` terminator.
fn dot_stuff(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 64);
    let mut at_line_start = true;

    for &byte in content {
        if at_line_start && byte == b'.' {
            out.push(b'.');
        }
        out.push(byte);
        at_line_start = byte == b'\n';
    }

    if !out.ends_with(b"\r\n") {
        if out.ends_with(b"\n") {
            out.pop();
        }
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}
