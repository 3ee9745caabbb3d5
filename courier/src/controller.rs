use std::sync::{Arc, LazyLock};

use courier_api::{ApiConfig, ApiServer, AppState};
use courier_common::{Signal, internal, logging, tracing};
use courier_delivery::{Dispatch, Dispatcher, RelayConfig};
use courier_scheduler::{Scheduler, timezone};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::credentials;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Zone for scheduled times that do not name one.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Courier {
    #[serde(default)]
    relay: RelayConfig,
    #[serde(default)]
    api: ApiConfig,
    #[serde(default)]
    scheduler: SchedulerConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

impl Courier {
    pub const fn relay(&self) -> &RelayConfig {
        &self.relay
    }

    pub const fn api(&self) -> &ApiConfig {
        &self.api
    }

    pub const fn scheduler(&self) -> &SchedulerConfig {
        &self.scheduler
    }

    /// Run the dispatcher, scheduler and API until a shutdown signal arrives
    ///
    /// # Errors
    ///
    /// This function will return an error if the credentials are missing, the
    /// configuration is invalid, or the API server cannot bind.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let credentials = credentials::from_env()?;
        timezone::parse(&self.scheduler.default_timezone)?;

        let strategies = self
            .relay
            .strategies()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", then ");
        internal!(
            level = INFO,
            "Relaying through {} as {} via {strategies}",
            self.relay.host,
            credentials.username()
        );

        let dispatcher: Arc<dyn Dispatch> = Arc::new(Dispatcher::new(self.relay, credentials)?);
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&dispatcher)));
        let state = AppState::new(
            dispatcher,
            Arc::clone(&scheduler),
            self.scheduler.default_timezone,
        );
        let server = ApiServer::new(&self.api, state).await?;

        internal!("Controller running");

        let ret = tokio::select! {
            r = server.serve(SHUTDOWN_BROADCAST.subscribe()) => {
                r.map_err(anyhow::Error::from)
            }
            r = shutdown() => {
                r
            }
        };

        internal!("Shutting down...");

        // Jobs are held in memory only.
        scheduler.shutdown();

        ret
    }
}
