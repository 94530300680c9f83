//! Google Tasks provider (REST v1).
//!
//! Google Tasks natively stores title, notes, due date, and a
//! completed/deleted flag only, so the remaining canonical fields travel in
//! the notes metadata block. The `due` field carries date precision only;
//! the canonical due time rides in the block.

use super::http::{send_with_retry, RateLimiter, RetryPolicy};
use super::metadata::{self, MetadataBlock};
use super::token::{OAuthClient, TokenManager, TokenStore};
use super::{auth::LoginFlow, ProviderError, ProviderResult, TaskProvider};
use crate::task::{unix_epoch, CanonicalTask, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const PROVIDER_NAME: &str = "google";

const TASKS_API: &str = "https://tasks.googleapis.com/tasks/v1";
const OAUTH_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SCOPES: &str = "https://www.googleapis.com/auth/tasks";

/// Credentials and target list for the Google side.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Task list id; `@default` addresses the account's primary list.
    pub tasklist: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTask {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    title: Option<String>,
    notes: Option<String>,
    /// `needsAction` or `completed`.
    status: Option<String>,
    due: Option<String>,
    #[serde(skip_serializing)]
    updated: Option<String>,
    #[serde(default, skip_serializing)]
    deleted: bool,
    #[serde(skip_serializing)]
    completed: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskListResponse {
    #[serde(default)]
    items: Vec<GoogleTask>,
    next_page_token: Option<String>,
}

pub struct GoogleTasksProvider {
    http: reqwest::Client,
    tokens: TokenManager,
    tasklist: String,
    retry: RetryPolicy,
    limiter: Option<RateLimiter>,
}

impl GoogleTasksProvider {
    pub fn new(config: GoogleConfig, state_dir: &Path) -> Self {
        let oauth = OAuthClient {
            token_url: OAUTH_TOKEN_URL.to_string(),
            client_id: config.client_id,
            client_secret: config.client_secret,
        };
        Self {
            http: reqwest::Client::new(),
            tokens: TokenManager::new(PROVIDER_NAME, TokenStore::new(state_dir), oauth),
            tasklist: config.tasklist,
            retry: RetryPolicy::default(),
            limiter: None,
        }
    }

    /// Cap outgoing requests to one per `interval`.
    pub fn with_min_request_interval(mut self, interval: Duration) -> Self {
        self.limiter = Some(RateLimiter::new(interval));
        self
    }

    /// Consent-flow description for `task-sync login google`.
    pub fn login_flow(config: &GoogleConfig) -> LoginFlow {
        LoginFlow {
            provider: PROVIDER_NAME.to_string(),
            auth_url: OAUTH_AUTH_URL.to_string(),
            scopes: SCOPES.to_string(),
            oauth: OAuthClient {
                token_url: OAUTH_TOKEN_URL.to_string(),
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
            },
            // Required for Google to issue a refresh token.
            extra_params: vec![
                ("access_type".to_string(), "offline".to_string()),
                ("prompt".to_string(), "consent".to_string()),
            ],
        }
    }

    fn tasks_url(&self) -> String {
        format!("{TASKS_API}/lists/{}/tasks", self.tasklist)
    }

    fn task_url(&self, id: &str) -> String {
        format!("{}/{id}", self.tasks_url())
    }

    fn from_remote(remote: GoogleTask) -> CanonicalTask {
        let (notes, block) = metadata::decode_notes(remote.notes.as_deref());
        let status = if remote.deleted {
            TaskStatus::Deleted
        } else if remote.status.as_deref() == Some("completed") {
            TaskStatus::Completed
        } else {
            TaskStatus::Active
        };
        let updated_at = remote
            .updated
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(unix_epoch);

        let mut task = CanonicalTask::new(remote.title.unwrap_or_default());
        task.id = remote.id;
        task.notes = notes;
        task.due_at = remote.due;
        task.status = status;
        task.updated_at = updated_at;
        block.apply(&mut task);
        task
    }

    fn to_remote(task: &CanonicalTask) -> GoogleTask {
        let block = MetadataBlock::from_task(task);
        GoogleTask {
            id: task.id.clone(),
            title: Some(task.title.clone()),
            notes: Some(metadata::encode_notes(task.notes.as_deref(), &block).unwrap_or_default()),
            status: Some(
                match task.status {
                    TaskStatus::Completed => "completed",
                    _ => "needsAction",
                }
                .to_string(),
            ),
            due: task.due_at.as_deref().map(google_due),
            updated: None,
            deleted: false,
            completed: None,
        }
    }
}

/// Google wants RFC 3339 with only the date part significant.
fn google_due(date: &str) -> String {
    let prefix = date.get(..10).unwrap_or(date);
    format!("{prefix}T00:00:00.000Z")
}

#[async_trait]
impl TaskProvider for GoogleTasksProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn list_tasks(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> ProviderResult<Vec<CanonicalTask>> {
        let bearer = self.tokens.bearer(&self.http).await?;
        let url = self.tasks_url();
        let mut tasks = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let response = send_with_retry(&self.retry, self.limiter.as_ref(), PROVIDER_NAME, || {
                let mut request = self
                    .http
                    .get(&url)
                    .bearer_auth(&bearer)
                    .query(&[
                        ("showCompleted", "true"),
                        ("showHidden", "true"),
                        ("showDeleted", "true"),
                        ("maxResults", "100"),
                    ]);
                if let Some(since) = since {
                    request = request.query(&[("updatedMin", since.to_rfc3339())]);
                }
                if let Some(token) = &page_token {
                    request = request.query(&[("pageToken", token)]);
                }
                request
            })
            .await?;

            let page: TaskListResponse = response.json().await?;
            tasks.extend(page.items.into_iter().map(Self::from_remote));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(tasks)
    }

    async fn upsert_task(&self, input: &CanonicalTask) -> ProviderResult<CanonicalTask> {
        let bearer = self.tokens.bearer(&self.http).await?;
        let body = Self::to_remote(input);

        let response = if input.id.is_empty() {
            let url = self.tasks_url();
            send_with_retry(&self.retry, self.limiter.as_ref(), PROVIDER_NAME, || {
                self.http.post(&url).bearer_auth(&bearer).json(&body)
            })
            .await?
        } else {
            let url = self.task_url(&input.id);
            send_with_retry(&self.retry, self.limiter.as_ref(), PROVIDER_NAME, || {
                self.http.patch(&url).bearer_auth(&bearer).json(&body)
            })
            .await?
        };

        let stored: GoogleTask = response.json().await?;
        Ok(Self::from_remote(stored))
    }

    async fn delete_task(&self, id: &str) -> ProviderResult<()> {
        let bearer = self.tokens.bearer(&self.http).await?;
        let url = self.task_url(id);
        let result = send_with_retry(&self.retry, self.limiter.as_ref(), PROVIDER_NAME, || {
            self.http.delete(&url).bearer_auth(&bearer)
        })
        .await;

        match result {
            Ok(_) => Ok(()),
            // Already gone counts as deleted.
            Err(ProviderError::Status { status, .. }) if status == 404 || status == 410 => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Importance;

    #[test]
    fn remote_round_trip_carries_rich_fields_in_notes() {
        let mut task = CanonicalTask::new("Buy milk");
        task.id = "g1".to_string();
        task.notes = Some("2% fat".to_string());
        task.due_at = Some("2026-03-01".to_string());
        task.due_time = Some("09:30".to_string());
        task.importance = Importance::High;

        let remote = GoogleTasksProvider::to_remote(&task);
        assert_eq!(remote.due.as_deref(), Some("2026-03-01T00:00:00.000Z"));
        assert!(remote.notes.as_deref().unwrap().contains(metadata::METADATA_MARKER));

        let restored = GoogleTasksProvider::from_remote(remote);
        assert_eq!(restored.title, "Buy milk");
        assert_eq!(restored.notes.as_deref(), Some("2% fat"));
        assert_eq!(restored.due_time.as_deref(), Some("09:30"));
        assert_eq!(restored.importance, Importance::High);
    }

    #[test]
    fn deleted_flag_maps_to_deleted_status() {
        let remote = GoogleTask {
            id: "g1".to_string(),
            title: Some("gone".to_string()),
            deleted: true,
            ..GoogleTask::default()
        };
        let task = GoogleTasksProvider::from_remote(remote);
        assert_eq!(task.status, TaskStatus::Deleted);
    }

    #[test]
    fn completed_status_maps_both_ways() {
        let mut task = CanonicalTask::new("done");
        task.status = TaskStatus::Completed;
        let remote = GoogleTasksProvider::to_remote(&task);
        assert_eq!(remote.status.as_deref(), Some("completed"));

        let restored = GoogleTasksProvider::from_remote(remote);
        assert_eq!(restored.status, TaskStatus::Completed);
    }
}
