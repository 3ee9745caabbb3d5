//! A single delivery attempt over one connection strategy.
//!
//! The attempt connects, optionally upgrades with STARTTLS, authenticates
//! and runs the mail transaction. Every step is bounded by a timeout from
//! [`SmtpTimeouts`](crate::SmtpTimeouts), and the connection always receives a
//! QUIT before it is dropped, whatever the outcome.

use std::{future::Future, time::Duration};

use courier_common::tracing;
use courier_smtp::client::{ClientError, SmtpClient, TlsContext};

use crate::{
    Credentials, MailMessage, RelayConfig, Security, Strategy,
    error::{AttemptFault, TransportError},
};

pub struct SmtpTransaction<'a> {
    strategy: Strategy,
    relay: &'a RelayConfig,
    tls: &'a TlsContext,
    credentials: &'a Credentials,
    message: &'a MailMessage,
    content: &'a [u8],
}

impl<'a> SmtpTransaction<'a> {
    pub const fn new(
        strategy: Strategy,
        relay: &'a RelayConfig,
        tls: &'a TlsContext,
        credentials: &'a Credentials,
        message: &'a MailMessage,
        content: &'a [u8],
    ) -> Self {
        Self {
            strategy,
            relay,
            tls,
            credentials,
            message,
            content,
        }
    }

    /// Runs the attempt to completion.
    ///
    /// # Errors
    ///
    /// Returns the classified fault of the first step that failed.
    pub async fn execute(self) -> Result<(), AttemptFault> {
        let mut client = self.connect().await?;

        let result = self.converse(&mut client).await;
        self.teardown(&mut client).await;

        result
    }

    async fn connect(&self) -> Result<SmtpClient, AttemptFault> {
        let host = self.relay.host.as_str();
        let port = self.strategy.port;

        tracing::debug!(%host, %port, strategy = %self.strategy, "Connecting to relay");

        let connecting = async {
            match self.strategy.security {
                Security::ImplicitTls => SmtpClient::connect_tls(host, port, self.tls).await,
                Security::StartTls => SmtpClient::connect(host, port).await,
            }
        };

        Self::bounded(self.relay.timeouts.connect(), "connect", connecting)
            .await
            .map_err(|fault| match fault {
                AttemptFault::Transport(TransportError::ConnectionFailed(e)) => {
                    TransportError::ConnectionFailed(format!("{host}:{port}: {e}")).into()
                }
                other => other,
            })
    }

    async fn converse(&self, client: &mut SmtpClient) -> Result<(), AttemptFault> {
        let command = self.relay.timeouts.command();
        let hello = self.relay.hello_name.as_str();

        Self::bounded(command, "greeting", async {
            client.read_greeting().await?.expect_code(220)
        })
        .await?;

        Self::bounded(command, "EHLO", async {
            client.ehlo(hello).await?.expect_success()
        })
        .await?;

        if self.strategy.security == Security::StartTls {
            Self::bounded(command, "STARTTLS", client.starttls(self.tls)).await?;
            Self::bounded(command, "EHLO after STARTTLS", async {
                client.ehlo(hello).await?.expect_success()
            })
            .await?;
        }

        let mechanism = Self::bounded(
            command,
            "AUTH",
            client.authenticate(self.credentials.username(), self.credentials.secret()),
        )
        .await?;
        tracing::debug!(mechanism = mechanism.as_str(), "Authenticated with relay");

        Self::bounded(command, "MAIL FROM", async {
            client.mail_from(self.message.sender()).await?.expect_success()
        })
        .await?;

        for recipient in self.message.recipients() {
            let address = recipient.to_string();
            Self::bounded(command, "RCPT TO", async {
                client.rcpt_to(&address).await?.expect_success()
            })
            .await?;
        }

        Self::bounded(command, "DATA", async {
            client.data().await?.expect_code(354)
        })
        .await?;

        let accepted = Self::bounded(self.relay.timeouts.data(), "message content", async {
            client.send_data(self.content).await?.expect_success()
        })
        .await?;

        tracing::info!(
            strategy = %self.strategy,
            reply = %accepted.message(),
            "Relay accepted message {}",
            self.message.message_id()
        );

        Ok(())
    }

    /// QUIT, bounded by the quit timeout. Failures never affect the outcome.
    async fn teardown(&self, client: &mut SmtpClient) {
        match tokio::time::timeout(self.relay.timeouts.quit(), client.quit()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::debug!(strategy = %self.strategy, "QUIT failed: {e}"),
            Err(_) => tracing::debug!(strategy = %self.strategy, "QUIT timed out"),
        }
    }

    async fn bounded<T>(
        limit: Duration,
        stage: &str,
        operation: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, AttemptFault> {
        tokio::time::timeout(limit, operation)
            .await
            .map_err(|_| TransportError::Timeout(format!("{stage} after {limit:?}")))?
            .map_err(AttemptFault::from)
    }
}
