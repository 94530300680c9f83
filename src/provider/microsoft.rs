//! Microsoft To Do provider (Graph v1.0).
//!
//! Graph stores the rich canonical fields natively: importance, categories,
//! reminder, start, checklist items, and structured recurrence. Listings
//! carry no deleted flag, so deletions on this side surface through the
//! engine's absence sweep rather than the change feed.

use super::http::{send_with_retry, RateLimiter, RetryPolicy};
use super::recurrence::{self, GraphRecurrence};
use super::token::{OAuthClient, TokenManager, TokenStore};
use super::{auth::LoginFlow, ProviderError, ProviderResult, TaskProvider};
use crate::task::{unix_epoch, CanonicalTask, Importance, Step, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const PROVIDER_NAME: &str = "microsoft";

const GRAPH_API: &str = "https://graph.microsoft.com/v1.0";
const OAUTH_AUTH_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
const OAUTH_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const SCOPES: &str = "offline_access Tasks.ReadWrite";

/// Credentials and target list for the Microsoft side.
#[derive(Debug, Clone)]
pub struct MicrosoftConfig {
    pub client_id: String,
    pub client_secret: String,
    /// To Do list id under `/me/todo/lists`.
    pub list_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemBody {
    content: String,
    content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DateTimeTimeZone {
    date_time: String,
    time_zone: String,
}

impl DateTimeTimeZone {
    fn utc(date_time: String) -> Self {
        Self {
            date_time,
            time_zone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChecklistItem {
    display_name: String,
    #[serde(default)]
    is_checked: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphTask {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    title: Option<String>,
    body: Option<ItemBody>,
    /// `notStarted`, `inProgress`, `completed`, `waitingOnOthers`, `deferred`.
    status: Option<String>,
    importance: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    categories: Vec<String>,
    due_date_time: Option<DateTimeTimeZone>,
    reminder_date_time: Option<DateTimeTimeZone>,
    start_date_time: Option<DateTimeTimeZone>,
    recurrence: Option<GraphRecurrence>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    checklist_items: Vec<ChecklistItem>,
    #[serde(skip_serializing)]
    last_modified_date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskPage {
    #[serde(default)]
    value: Vec<GraphTask>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

pub struct MicrosoftTodoProvider {
    http: reqwest::Client,
    tokens: TokenManager,
    list_id: String,
    retry: RetryPolicy,
    limiter: Option<RateLimiter>,
}

impl MicrosoftTodoProvider {
    pub fn new(config: MicrosoftConfig, state_dir: &Path) -> Self {
        let oauth = OAuthClient {
            token_url: OAUTH_TOKEN_URL.to_string(),
            client_id: config.client_id,
            client_secret: config.client_secret,
        };
        Self {
            http: reqwest::Client::new(),
            tokens: TokenManager::new(PROVIDER_NAME, TokenStore::new(state_dir), oauth),
            list_id: config.list_id,
            retry: RetryPolicy::default(),
            limiter: None,
        }
    }

    /// Cap outgoing requests to one per `interval`.
    pub fn with_min_request_interval(mut self, interval: Duration) -> Self {
        self.limiter = Some(RateLimiter::new(interval));
        self
    }

    /// Consent-flow description for `task-sync login microsoft`.
    pub fn login_flow(config: &MicrosoftConfig) -> LoginFlow {
        LoginFlow {
            provider: PROVIDER_NAME.to_string(),
            auth_url: OAUTH_AUTH_URL.to_string(),
            scopes: SCOPES.to_string(),
            oauth: OAuthClient {
                token_url: OAUTH_TOKEN_URL.to_string(),
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
            },
            extra_params: Vec::new(),
        }
    }

    fn tasks_url(&self) -> String {
        format!("{GRAPH_API}/me/todo/lists/{}/tasks", self.list_id)
    }

    fn task_url(&self, id: &str) -> String {
        format!("{}/{id}", self.tasks_url())
    }

    fn from_remote(remote: GraphTask) -> CanonicalTask {
        let status = match remote.status.as_deref() {
            Some("completed") => TaskStatus::Completed,
            _ => TaskStatus::Active,
        };
        let importance = match remote.importance.as_deref() {
            Some("low") => Importance::Low,
            Some("high") => Importance::High,
            _ => Importance::Normal,
        };
        let updated_at = remote
            .last_modified_date_time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(unix_epoch);
        let recurrence = remote.recurrence.as_ref().and_then(|r| {
            let rule = recurrence::graph_to_rrule(r);
            if rule.is_none() {
                debug!(task_id = %remote.id, "recurrence outside translatable subset");
            }
            rule
        });

        let mut task = CanonicalTask::new(remote.title.unwrap_or_default());
        task.id = remote.id;
        task.notes = remote.body.and_then(|b| {
            let trimmed = b.content.trim_end().to_string();
            (!trimmed.is_empty()).then_some(trimmed)
        });
        task.due_at = remote.due_date_time.as_ref().map(|d| d.date_time.clone());
        task.due_time = remote.due_date_time.as_ref().and_then(|d| time_of_day(&d.date_time));
        task.status = status;
        task.reminder = remote.reminder_date_time.map(|d| d.date_time);
        task.recurrence = recurrence;
        task.categories = remote.categories;
        task.importance = importance;
        task.steps = remote
            .checklist_items
            .into_iter()
            .map(|item| Step {
                text: item.display_name,
                checked: item.is_checked,
            })
            .collect();
        task.start_at = remote.start_date_time.map(|d| d.date_time);
        task.updated_at = updated_at;
        task
    }

    fn to_remote(task: &CanonicalTask) -> GraphTask {
        let due_date_time = task.due_at.as_deref().map(|date| {
            let prefix = date.get(..10).unwrap_or(date);
            let time = task.due_time.as_deref().unwrap_or("00:00");
            DateTimeTimeZone::utc(format!("{prefix}T{time}:00.0000000"))
        });
        let recurrence = task
            .recurrence
            .as_deref()
            .and_then(recurrence::rrule_to_graph);

        GraphTask {
            id: task.id.clone(),
            title: Some(task.title.clone()),
            body: Some(ItemBody {
                content: task.notes.clone().unwrap_or_default(),
                content_type: "text".to_string(),
            }),
            status: Some(
                match task.status {
                    TaskStatus::Completed => "completed",
                    _ => "notStarted",
                }
                .to_string(),
            ),
            importance: Some(
                match task.importance {
                    Importance::Low => "low",
                    Importance::Normal => "normal",
                    Importance::High => "high",
                }
                .to_string(),
            ),
            categories: task.categories.clone(),
            due_date_time,
            reminder_date_time: task.reminder.clone().map(DateTimeTimeZone::utc),
            start_date_time: task.start_at.clone().map(DateTimeTimeZone::utc),
            recurrence,
            checklist_items: task
                .steps
                .iter()
                .map(|step| ChecklistItem {
                    display_name: step.text.clone(),
                    is_checked: step.checked,
                })
                .collect(),
            last_modified_date_time: None,
        }
    }
}

/// `HH:MM` from a Graph dateTime, with midnight meaning "date only".
fn time_of_day(date_time: &str) -> Option<String> {
    let time = date_time.get(11..16)?;
    if time == "00:00" {
        None
    } else {
        Some(time.to_string())
    }
}

#[async_trait]
impl TaskProvider for MicrosoftTodoProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn list_tasks(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> ProviderResult<Vec<CanonicalTask>> {
        let bearer = self.tokens.bearer(&self.http).await?;
        let mut tasks = Vec::new();
        let mut next_link: Option<String> = None;

        loop {
            let response = match &next_link {
                // nextLink already carries every query parameter.
                Some(link) => {
                    send_with_retry(&self.retry, self.limiter.as_ref(), PROVIDER_NAME, || {
                        self.http.get(link).bearer_auth(&bearer)
                    })
                    .await?
                }
                None => {
                    let url = self.tasks_url();
                    send_with_retry(&self.retry, self.limiter.as_ref(), PROVIDER_NAME, || {
                        let mut request = self
                            .http
                            .get(&url)
                            .bearer_auth(&bearer)
                            .query(&[("$top", "100"), ("$expand", "checklistItems")]);
                        if let Some(since) = since {
                            request = request.query(&[(
                                "$filter",
                                format!(
                                    "lastModifiedDateTime ge {}",
                                    since.format("%Y-%m-%dT%H:%M:%SZ")
                                ),
                            )]);
                        }
                        request
                    })
                    .await?
                }
            };

            let page: TaskPage = response.json().await?;
            tasks.extend(page.value.into_iter().map(Self::from_remote));
            match page.next_link {
                Some(link) => next_link = Some(link),
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

        let stored: GraphTask = response.json().await?;
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
            Err(ProviderError::Status { status, .. }) if status == 404 || status == 410 => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rich_fields_map_natively() {
        let mut task = CanonicalTask::new("Plan trip");
        task.due_at = Some("2026-05-01".to_string());
        task.due_time = Some("14:30".to_string());
        task.importance = Importance::High;
        task.categories = vec!["travel".to_string()];
        task.recurrence = Some("RRULE:FREQ=WEEKLY;BYDAY=FR".to_string());
        task.steps = vec![Step {
            text: "book hotel".to_string(),
            checked: false,
        }];

        let remote = MicrosoftTodoProvider::to_remote(&task);
        assert_eq!(
            remote.due_date_time.as_ref().unwrap().date_time,
            "2026-05-01T14:30:00.0000000"
        );
        assert_eq!(remote.importance.as_deref(), Some("high"));
        assert_eq!(remote.recurrence.as_ref().unwrap().pattern.kind, "weekly");

        let restored = MicrosoftTodoProvider::from_remote(remote);
        assert_eq!(restored.due_at.as_deref().map(|d| &d[..10]), Some("2026-05-01"));
        assert_eq!(restored.due_time.as_deref(), Some("14:30"));
        assert_eq!(restored.importance, Importance::High);
        assert_eq!(
            restored.recurrence.as_deref(),
            Some("RRULE:FREQ=WEEKLY;BYDAY=FR")
        );
        assert_eq!(restored.steps.len(), 1);
    }

    #[test]
    fn midnight_due_means_date_only() {
        assert_eq!(time_of_day("2026-05-01T00:00:00.0000000"), None);
        assert_eq!(
            time_of_day("2026-05-01T09:15:00.0000000").as_deref(),
            Some("09:15")
        );
    }

    #[test]
    fn listing_never_reports_deleted_status() {
        let remote = GraphTask {
            id: "m1".to_string(),
            title: Some("t".to_string()),
            status: Some("inProgress".to_string()),
            ..GraphTask::default()
        };
        let task = MicrosoftTodoProvider::from_remote(remote);
        assert_eq!(task.status, TaskStatus::Active);
    }
}
