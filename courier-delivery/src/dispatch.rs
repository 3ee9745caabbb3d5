use std::sync::Arc;

use async_trait::async_trait;
use courier_common::{EmailRequest, tracing};
use courier_smtp::client::ClientError;

use crate::{
    Credentials, DeliveryReport, DeliverySession, MailMessage, RelayConfig, RelayTransport,
    SmtpRelay, error::DispatchError,
};

/// The capability to send a request right now.
///
/// Implementations never fail outward: every problem is logged and reported
/// as `false`.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn send(&self, request: &EmailRequest) -> bool;
}

/// Builds messages and hands them to a [`DeliverySession`].
///
/// Holds nothing but the credentials and the session, so one instance can
/// serve any number of concurrent sends.
pub struct Dispatcher<T = SmtpRelay> {
    session: DeliverySession<T>,
    credentials: Arc<Credentials>,
}

impl Dispatcher<SmtpRelay> {
    /// # Errors
    ///
    /// Returns an error if the TLS context cannot be built.
    pub fn new(relay: RelayConfig, credentials: Credentials) -> Result<Self, ClientError> {
        Ok(Self::with_session(
            DeliverySession::for_relay(relay)?,
            credentials,
        ))
    }
}

impl<T: RelayTransport> Dispatcher<T> {
    pub fn with_session(
        session: DeliverySession<T>,
        credentials: impl Into<Arc<Credentials>>,
    ) -> Self {
        Self {
            session,
            credentials: credentials.into(),
        }
    }

    /// The envelope sender and `From` address.
    pub fn sender(&self) -> &str {
        self.credentials.username()
    }

    /// Builds and delivers `request`.
    ///
    /// # Errors
    ///
    /// `DispatchError::Build` if the message cannot be assembled (nothing is
    /// sent), `DispatchError::Delivery` if every attempt failed.
    pub async fn try_send(&self, request: &EmailRequest) -> Result<DeliveryReport, DispatchError> {
        let message = MailMessage::build(request, self.sender()).await?;
        Ok(self
            .session
            .try_deliver(&message, &self.credentials)
            .await?)
    }
}

#[async_trait]
impl<T: RelayTransport> Dispatch for Dispatcher<T> {
    async fn send(&self, request: &EmailRequest) -> bool {
        let recipients = request.recipient_list();

        match self.try_send(request).await {
            Ok(report) => {
                tracing::info!(
                    strategy = %report.strategy,
                    attempts = report.attempts,
                    "Email sent to {recipients}"
                );
                true
            }
            Err(e) => {
                tracing::error!("Failed to send email to {recipients}: {e}");
                false
            }
        }
    }
}

#[async_trait]
impl<D: Dispatch + ?Sized> Dispatch for Arc<D> {
    async fn send(&self, request: &EmailRequest) -> bool {
        (**self).send(request).await
    }
}
