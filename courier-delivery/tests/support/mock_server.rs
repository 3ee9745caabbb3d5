//! Mock SMTP relay for delivery tests
//!
//! This module provides a configurable mock relay that can:
#![allow(dead_code)] // Test utility module - not all methods used in every test
//! - Speak plaintext, implicit TLS, or upgrade with STARTTLS (self-signed cert)
//! - Simulate per-command replies, including AUTH rejections
//! - Track received commands and accepted connections for verification
//! - Delay replies to exercise timeout handling
//! - Misbehave on QUIT: reply with an error, hang up, or never answer
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_server::MockSmtpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockSmtpServer::builder()
//!     .with_starttls()
//!     .with_auth_response(535, "5.7.8 Bad credentials")
//!     .build()
//!     .await?;
//!
//! // Relay is now listening on server.port()
//!
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{
    fmt::Write,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};
use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ServerConfig,
        pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer},
    },
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// SMTP command received by the mock relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    StartTls,
    /// AUTH with everything after the keyword
    Auth(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Message content (after DATA), still dot-stuffed
    MessageContent(Vec<u8>),
    Quit,
    Other(String),
}

/// Reply configuration for SMTP commands
#[derive(Debug, Clone)]
pub struct SmtpResponse {
    pub code: u16,
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

/// How the relay secures connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    Plain,
    Implicit,
    StartTls,
}

/// What the relay does once it sees QUIT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitMode {
    /// Send the configured QUIT reply
    Reply,
    /// Drop the connection without replying
    Close,
    /// Never reply; wait for the client to give up
    Hang,
}

#[derive(Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    capabilities: Vec<String>,
    auth_response: SmtpResponse,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    quit_response: SmtpResponse,
    quit_mode: QuitMode,
    tls_mode: TlsMode,
    response_delay: Option<Duration>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "Mock SMTP Relay"),
            capabilities: vec![
                "localhost".to_string(),
                "SIZE 10000000".to_string(),
                "AUTH PLAIN LOGIN".to_string(),
            ],
            auth_response: SmtpResponse::new(235, "2.7.0 Authentication successful"),
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            quit_response: SmtpResponse::new(221, "Bye"),
            quit_mode: QuitMode::Reply,
            tls_mode: TlsMode::Plain,
            response_delay: None,
        }
    }
}

impl MockServerConfig {
    fn ehlo_bytes(&self, offer_starttls: bool) -> Vec<u8> {
        let mut lines = self.capabilities.clone();
        if offer_starttls {
            lines.push("STARTTLS".to_string());
        }

        let mut response = String::new();
        let last = lines.len() - 1;
        for (i, line) in lines.iter().enumerate() {
            let separator = if i == last { ' ' } else { '-' };
            let _ = write!(&mut response, "250{separator}{line}\r\n");
        }
        response.into_bytes()
    }
}

/// Shared state of one running relay
struct Shared {
    config: MockServerConfig,
    acceptor: Option<TlsAcceptor>,
    commands: RwLock<Vec<SmtpCommand>>,
    connections: AtomicUsize,
}

/// Mock SMTP relay for testing
pub struct MockSmtpServer {
    port: u16,
    shared: Arc<Shared>,
    shutdown: Arc<AtomicBool>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::new()
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Get all commands received so far, across connections
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.shared.commands.read().await.clone()
    }

    /// Number of connections accepted
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client(stream: TcpStream, shared: Arc<Shared>) -> Result<(), BoxError> {
        match (shared.config.tls_mode, shared.acceptor.as_ref()) {
            (TlsMode::Implicit, Some(acceptor)) => {
                let stream = acceptor.accept(stream).await?;
                Self::run_session(stream, &shared, true, false).await?;
            }
            (TlsMode::StartTls, Some(acceptor)) => {
                if let Some(stream) = Self::run_session(stream, &shared, true, true).await? {
                    let stream = acceptor.accept(stream).await?;
                    Self::run_session(stream, &shared, false, false).await?;
                }
            }
            _ => {
                Self::run_session(stream, &shared, true, false).await?;
            }
        }
        Ok(())
    }

    /// Runs the command loop. Returns the raw stream if the client asked for
    /// and was granted a STARTTLS upgrade.
    async fn run_session<S>(
        stream: S,
        shared: &Shared,
        greet: bool,
        offer_starttls: bool,
    ) -> Result<Option<S>, BoxError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let config = &shared.config;
        let mut stream = BufReader::new(stream);
        let mut line = String::new();

        if greet {
            stream.write_all(&config.greeting.to_bytes()).await?;
            stream.flush().await?;
        }

        loop {
            line.clear();

            let read_result = timeout(Duration::from_secs(10), stream.read_line(&mut line)).await;
            let Ok(bytes_read) = read_result else {
                return Ok(None);
            };
            if bytes_read? == 0 {
                return Ok(None);
            }

            let cmd_line = line.trim();
            let (verb, rest) = cmd_line.split_once(' ').unwrap_or((cmd_line, ""));

            let (response, command) = match verb.to_uppercase().as_str() {
                "EHLO" => (
                    config.ehlo_bytes(offer_starttls),
                    SmtpCommand::Ehlo(rest.to_string()),
                ),
                "STARTTLS" => {
                    shared.commands.write().await.push(SmtpCommand::StartTls);
                    if offer_starttls {
                        stream
                            .write_all(&SmtpResponse::new(220, "Ready to start TLS").to_bytes())
                            .await?;
                        stream.flush().await?;
                        return Ok(Some(stream.into_inner()));
                    }
                    stream
                        .write_all(&SmtpResponse::new(502, "Command not implemented").to_bytes())
                        .await?;
                    stream.flush().await?;
                    continue;
                }
                "AUTH" => (
                    config.auth_response.to_bytes(),
                    SmtpCommand::Auth(rest.to_string()),
                ),
                "MAIL" => (
                    config.mail_from_response.to_bytes(),
                    SmtpCommand::MailFrom(rest.to_string()),
                ),
                "RCPT" => (
                    config.rcpt_to_response.to_bytes(),
                    SmtpCommand::RcptTo(rest.to_string()),
                ),
                "DATA" => (config.data_response.to_bytes(), SmtpCommand::Data),
                "QUIT" => {
                    shared.commands.write().await.push(SmtpCommand::Quit);
                    match config.quit_mode {
                        QuitMode::Reply => {
                            stream.write_all(&config.quit_response.to_bytes()).await?;
                            stream.flush().await?;
                        }
                        QuitMode::Close => {}
                        QuitMode::Hang => {
                            let mut rest = String::new();
                            let _ = timeout(
                                Duration::from_secs(10),
                                stream.read_line(&mut rest),
                            )
                            .await;
                        }
                    }
                    return Ok(None);
                }
                _ => (
                    SmtpResponse::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(cmd_line.to_string()),
                ),
            };

            shared.commands.write().await.push(command.clone());

            if let Some(delay) = config.response_delay {
                tokio::time::sleep(delay).await;
            }

            stream.write_all(&response).await?;
            stream.flush().await?;

            if matches!(command, SmtpCommand::Data) && config.data_response.code == 354 {
                let mut content = Vec::new();
                let mut data_line = String::new();

                loop {
                    data_line.clear();
                    if stream.read_line(&mut data_line).await? == 0 {
                        return Ok(None);
                    }
                    if data_line == ".\r\n" {
                        break;
                    }
                    content.extend_from_slice(data_line.as_bytes());
                }

                shared
                    .commands
                    .write()
                    .await
                    .push(SmtpCommand::MessageContent(content));
                stream.write_all(&config.data_end_response.to_bytes()).await?;
                stream.flush().await?;
            }
        }
    }
}

/// Builder for configuring a `MockSmtpServer`
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    /// TLS from the first byte, like port 465
    #[must_use]
    pub const fn with_implicit_tls(mut self) -> Self {
        self.config.tls_mode = TlsMode::Implicit;
        self
    }

    /// Advertise STARTTLS and upgrade when asked, like port 587
    #[must_use]
    pub const fn with_starttls(mut self) -> Self {
        self.config.tls_mode = TlsMode::StartTls;
        self
    }

    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    /// Replace the EHLO lines (the first is the greeting line)
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.config.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_quit_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.quit_response = SmtpResponse::new(code, message);
        self
    }

    /// Hang up on QUIT instead of replying
    #[must_use]
    pub const fn with_close_on_quit(mut self) -> Self {
        self.config.quit_mode = QuitMode::Close;
        self
    }

    /// Leave QUIT unanswered until the client disconnects
    #[must_use]
    pub const fn with_hang_on_quit(mut self) -> Self {
        self.config.quit_mode = QuitMode::Hang;
        self
    }

    /// Add a delay before sending each command reply
    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.config.response_delay = Some(delay);
        self
    }

    /// Build and start the mock relay on a random local port
    ///
    /// # Errors
    ///
    /// Returns an error if the relay fails to bind or the certificate cannot
    /// be generated
    pub async fn build(self) -> Result<MockSmtpServer, BoxError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let acceptor = match self.config.tls_mode {
            TlsMode::Plain => None,
            TlsMode::Implicit | TlsMode::StartTls => Some(self_signed_acceptor()?),
        };

        let shared = Arc::new(Shared {
            config: self.config,
            acceptor,
            commands: RwLock::new(Vec::new()),
            connections: AtomicUsize::new(0),
        });
        let shutdown = Arc::new(AtomicBool::new(false));

        let shared_clone = Arc::clone(&shared);
        let shutdown_clone = Arc::clone(&shutdown);

        tokio::spawn(async move {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }

                // Accept with a timeout so the shutdown flag is observed
                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    shared_clone.connections.fetch_add(1, Ordering::SeqCst);
                    let shared = Arc::clone(&shared_clone);

                    tokio::spawn(async move {
                        if let Err(e) = MockSmtpServer::handle_client(stream, shared).await {
                            eprintln!("Mock relay client error: {e}");
                        }
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            port,
            shared,
            shutdown,
        })
    }
}

fn self_signed_acceptor() -> Result<TlsAcceptor, BoxError> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;
    let cert_der = cert.serialize_der()?;
    let key_der = cert.serialize_private_key_der();

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(
            vec![CertificateDer::from(cert_der)],
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_der)),
        )?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// A local port with nothing listening on it
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let port = listener.local_addr().expect("local address").port();
    drop(listener);
    port
}
