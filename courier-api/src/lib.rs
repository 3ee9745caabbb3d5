//! HTTP adapter for the courier dispatcher and scheduler.
//!
//! # Endpoints
//!
//! - **`POST /send-email`**, **`/send-html-email`**, **`/send-email-with-attachment`**,
//!   **`/send-template-email/{template}`** - immediate delivery
//! - **`POST /schedule-email`** - deferred delivery in a named timezone
//! - **`POST /user-registration`** - welcome mail now, follow-up in three days
//! - **`GET /scheduled-jobs`**, **`DELETE /cancel-scheduled-job/{id}`** - pending jobs
//! - **`GET /health/live`** - liveness check
//!
//! Errors are returned as `{"detail": "..."}` with a 4xx/5xx status.

mod config;
mod error;
pub mod models;
mod routes;
mod server;
pub mod templates;

pub use config::ApiConfig;
pub use error::{ApiError, ServerError};
pub use routes::{AppState, router};
pub use server::ApiServer;
