//! HTTP adapter configuration

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the HTTP adapter
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiConfig {
    /// Address to bind the API server
    ///
    /// Common values:
    /// - `[::]:8000` (IPv6 any address, port 8000)
    /// - `0.0.0.0:8000` (IPv4 any address, port 8000)
    /// - `127.0.0.1:8000` (localhost only, port 8000)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Upper bound on how long any single request may take
    ///
    /// An immediate send can try both delivery strategies, so this should
    /// comfortably exceed two full SMTP conversations. A send still in
    /// flight when the limit fires runs to completion in the background;
    /// the caller sees 408 and the outcome is only logged.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_listen_address() -> String {
    "[::]:8000".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    180
}

impl ApiConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
