//! The delivery session: ordered connection strategies with fallback.

use std::sync::Arc;

use async_trait::async_trait;
use courier_common::{internal, tracing};
use courier_smtp::client::{ClientError, TlsContext};

use crate::{
    Credentials, MailMessage, RelayConfig, Strategy,
    error::{AttemptFault, DeliveryError},
    transaction::SmtpTransaction,
};

/// Something that can make one delivery attempt with a given strategy.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Makes a single attempt. `content` is the rendered form of `message`.
    async fn attempt(
        &self,
        strategy: Strategy,
        message: &MailMessage,
        content: &[u8],
        credentials: &Credentials,
    ) -> Result<(), AttemptFault>;
}

#[async_trait]
impl<T: RelayTransport + ?Sized> RelayTransport for Arc<T> {
    async fn attempt(
        &self,
        strategy: Strategy,
        message: &MailMessage,
        content: &[u8],
        credentials: &Credentials,
    ) -> Result<(), AttemptFault> {
        (**self)
            .attempt(strategy, message, content, credentials)
            .await
    }
}

/// The real transport: SMTP over TLS to the configured relay.
#[derive(Debug, Clone)]
pub struct SmtpRelay {
    config: RelayConfig,
    tls: TlsContext,
}

impl SmtpRelay {
    /// # Errors
    ///
    /// Returns an error if the TLS context cannot be built.
    pub fn new(config: RelayConfig) -> Result<Self, ClientError> {
        let tls = TlsContext::new(config.accept_invalid_certs)?;
        Ok(Self { config, tls })
    }

    pub const fn config(&self) -> &RelayConfig {
        &self.config
    }
}

#[async_trait]
impl RelayTransport for SmtpRelay {
    async fn attempt(
        &self,
        strategy: Strategy,
        message: &MailMessage,
        content: &[u8],
        credentials: &Credentials,
    ) -> Result<(), AttemptFault> {
        SmtpTransaction::new(strategy, &self.config, &self.tls, credentials, message, content)
            .execute()
            .await
    }
}

/// Which strategy delivered a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub strategy: Strategy,
    /// 1 when the first strategy worked, 2 after a fallback.
    pub attempts: usize,
}

impl DeliveryReport {
    pub const fn used_fallback(&self) -> bool {
        self.attempts > 1
    }
}

/// Tries each strategy in order, moving on only after a transport fault.
pub struct DeliverySession<T> {
    transport: T,
    strategies: Vec<Strategy>,
}

impl DeliverySession<SmtpRelay> {
    /// Implicit TLS first, then STARTTLS, against the relay in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS context cannot be built.
    pub fn for_relay(config: RelayConfig) -> Result<Self, ClientError> {
        let strategies = config.strategies();
        Ok(Self::new(SmtpRelay::new(config)?, strategies))
    }
}

impl<T: RelayTransport> DeliverySession<T> {
    pub const fn new(transport: T, strategies: Vec<Strategy>) -> Self {
        Self {
            transport,
            strategies,
        }
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Delivers `message`, reporting the strategy that worked.
    ///
    /// # Errors
    ///
    /// `DeliveryError::Aborted` when an attempt fails with a non-transport
    /// fault, `DeliveryError::Exhausted` when every strategy failed.
    pub async fn try_deliver(
        &self,
        message: &MailMessage,
        credentials: &Credentials,
    ) -> Result<DeliveryReport, DeliveryError> {
        let content = message.render();
        let mut last = None;

        for (index, &strategy) in self.strategies.iter().enumerate() {
            internal!(level = DEBUG, "Attempting delivery via {strategy}");

            match self
                .transport
                .attempt(strategy, message, &content, credentials)
                .await
            {
                Ok(()) => {
                    return Ok(DeliveryReport {
                        strategy,
                        attempts: index + 1,
                    });
                }
                Err(fault) if fault.is_transport() => {
                    tracing::warn!(%strategy, "Delivery attempt failed: {fault}");
                    last = Some((strategy, fault));
                }
                Err(fault) => {
                    tracing::warn!(%strategy, "Delivery attempt aborted: {fault}");
                    return Err(DeliveryError::Aborted { strategy, fault });
                }
            }
        }

        Err(last.map_or(DeliveryError::NoStrategies, |(strategy, fault)| {
            DeliveryError::Exhausted { strategy, fault }
        }))
    }

    /// Like [`DeliverySession::try_deliver`], reduced to success or failure.
    pub async fn deliver(&self, message: &MailMessage, credentials: &Credentials) -> bool {
        match self.try_deliver(message, credentials).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Delivery of {} failed: {e}", message.message_id());
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use courier_common::EmailRequest;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{Security, error::TransportError};

    /// Scripted outcome for each successive attempt; records the strategies used.
    #[derive(Default)]
    pub struct FakeTransport {
        outcomes: Mutex<Vec<Result<(), AttemptFault>>>,
        pub tried: Mutex<Vec<Strategy>>,
        pub calls: AtomicUsize,
    }

    impl FakeTransport {
        pub fn new(outcomes: Vec<Result<(), AttemptFault>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into_iter().rev().collect()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl RelayTransport for FakeTransport {
        async fn attempt(
            &self,
            strategy: Strategy,
            _message: &MailMessage,
            _content: &[u8],
            _credentials: &Credentials,
        ) -> Result<(), AttemptFault> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tried.lock().push(strategy);
            self.outcomes.lock().pop().unwrap_or(Ok(()))
        }
    }

    fn refused() -> AttemptFault {
        TransportError::ConnectionFailed("connection refused".to_string()).into()
    }

    async fn message() -> MailMessage {
        let request = EmailRequest::parse(&["rcpt@example.com"], "Subject", "Body").unwrap();
        MailMessage::build(&request, "sender@example.com")
            .await
            .unwrap()
    }

    fn session(
        outcomes: Vec<Result<(), AttemptFault>>,
    ) -> (DeliverySession<Arc<FakeTransport>>, Arc<FakeTransport>) {
        let transport = Arc::new(FakeTransport::new(outcomes));
        let session = DeliverySession::new(
            Arc::clone(&transport),
            RelayConfig::default().strategies(),
        );
        (session, transport)
    }

    fn credentials() -> Credentials {
        Credentials::new("sender@example.com", "secret")
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let (session, transport) = session(vec![Ok(())]);

        let report = session.try_deliver(&message().await, &credentials()).await.unwrap();

        assert_eq!(report.strategy, Strategy::new(Security::ImplicitTls, 465));
        assert!(!report.used_fallback());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_fault_falls_back_once() {
        let (session, transport) = session(vec![Err(refused()), Ok(())]);

        let report = session.try_deliver(&message().await, &credentials()).await.unwrap();

        assert_eq!(report.strategy, Strategy::new(Security::StartTls, 587));
        assert_eq!(report.attempts, 2);
        assert_eq!(
            *transport.tried.lock(),
            vec![
                Strategy::new(Security::ImplicitTls, 465),
                Strategy::new(Security::StartTls, 587),
            ]
        );
    }

    #[tokio::test]
    async fn test_fallback_failure_is_final() {
        let (session, transport) = session(vec![Err(refused()), Err(refused())]);

        let err = session.try_deliver(&message().await, &credentials()).await.unwrap_err();

        assert!(matches!(
            err,
            DeliveryError::Exhausted { strategy, .. } if strategy.security == Security::StartTls
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_deliver_reduces_to_bool() {
        let (failing, _) = session(vec![Err(refused()), Err(refused())]);
        assert!(!failing.deliver(&message().await, &credentials()).await);

        let (working, _) = session(vec![Err(refused()), Ok(())]);
        assert!(working.deliver(&message().await, &credentials()).await);
    }

    #[tokio::test]
    async fn test_other_fault_does_not_fall_back() {
        let (session, transport) =
            session(vec![Err(AttemptFault::Other("bad server name".to_string()))]);

        let err = session.try_deliver(&message().await, &credentials()).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Aborted { .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_strategies() {
        let session = DeliverySession::new(FakeTransport::default(), Vec::new());
        assert!(matches!(
            session.try_deliver(&message().await, &credentials()).await,
            Err(DeliveryError::NoStrategies)
        ));
    }
}
