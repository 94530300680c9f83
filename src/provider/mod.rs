//! Provider port: the engine's only view of a remote task service.
//!
//! Every provider exposes the same three operations over the canonical task
//! shape; all network, auth, and field-translation code lives behind this
//! boundary. The engine treats any error as transient for the stage that
//! observed it and degrades per-provider rather than aborting the cycle.

pub mod auth;
pub mod google;
pub mod http;
pub mod metadata;
pub mod microsoft;
pub mod recurrence;
pub mod token;

pub use google::GoogleTasksProvider;
pub use microsoft::MicrosoftTodoProvider;

use crate::task::CanonicalTask;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Non-success response after retries were exhausted.
    #[error("{provider} returned {status}: {message}")]
    Status {
        provider: String,
        status: u16,
        message: String,
    },

    /// No usable token on disk.
    #[error("authentication required for {0}; run `task-sync login {0}`")]
    AuthRequired(String),

    /// Token refresh or exchange failed.
    #[error("token error: {0}")]
    Token(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Http(e.to_string())
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// The three-operation capability set every provider implements.
#[async_trait]
pub trait TaskProvider: Send + Sync {
    /// Stable tag used in mappings, tombstones, and reports.
    fn name(&self) -> &str;

    /// Full snapshot when `since` is absent; otherwise tasks whose
    /// provider-side modified time is at or after `since`. Returned tasks
    /// carry the provider's opaque id in `CanonicalTask::id`.
    async fn list_tasks(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> ProviderResult<Vec<CanonicalTask>>;

    /// Create when `input.id` is empty, otherwise patch. Returns the
    /// authoritative stored record including the server-assigned id.
    async fn upsert_task(&self, input: &CanonicalTask) -> ProviderResult<CanonicalTask>;

    /// Delete by provider-local id. Idempotent from the engine's viewpoint.
    async fn delete_task(&self, id: &str) -> ProviderResult<()>;
}
