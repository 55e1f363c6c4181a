//! Request/response payloads decoded once at the API boundary (spec.md §9:
//! "runtime-typed params" become validated structs with total field
//! coverage). Each `*Request::validate` returns per-field details for the
//! 422 envelope rather than a single opaque message.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dispatch_shared::ids::{EndpointId, MonitorId, OrganizationId, TaskId};
use dispatch_shared::types::{HttpMethod, ScheduleType};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::ApiError;

type FieldErrors = BTreeMap<&'static str, String>;

fn fail(mut errors: FieldErrors) -> Result<(), ApiError> {
    if errors.is_empty() {
        return Ok(());
    }
    let details = serde_json::to_value(std::mem::take(&mut errors)).unwrap_or(Json::Null);
    Err(ApiError::invalid_input("request failed validation", details))
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskRequest {
    pub name: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: Json,
    #[serde(default)]
    pub body: Option<String>,
    pub schedule_type: ScheduleType,
    pub cron_expression: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i32,
    #[serde(default)]
    pub retry_attempts: i32,
    pub callback_url: Option<String>,
    pub expected_status_codes: Option<Vec<i32>>,
    pub expected_body_pattern: Option<String>,
    pub queue: Option<String>,
    pub notify_on_failure: Option<bool>,
    pub notify_on_recovery: Option<bool>,
}

fn default_method() -> HttpMethod {
    HttpMethod::Get
}
fn default_true() -> bool {
    true
}
fn default_timeout_ms() -> i32 {
    30_000
}

impl TaskRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if self.name.trim().is_empty() {
            errors.insert("name", "must not be empty".to_string());
        }
        if self.url.trim().is_empty() {
            errors.insert("url", "must not be empty".to_string());
        }
        match self.schedule_type {
            ScheduleType::Cron => {
                if self.cron_expression.as_deref().unwrap_or("").is_empty() {
                    errors.insert("cron_expression", "required when schedule_type=cron".to_string());
                } else if let Err(e) = dispatch_shared::cron::CronSchedule::parse(self.cron_expression.as_deref().unwrap()) {
                    errors.insert("cron_expression", e.0);
                }
            }
            ScheduleType::Once => {
                if self.scheduled_at.is_none() {
                    errors.insert("scheduled_at", "required when schedule_type=once".to_string());
                }
            }
        }
        if !(1000..=300_000).contains(&self.timeout_ms) {
            errors.insert("timeout_ms", "must be between 1000 and 300000".to_string());
        }
        if !(0..=10).contains(&self.retry_attempts) {
            errors.insert("retry_attempts", "must be between 0 and 10".to_string());
        }
        fail(errors)
    }

    pub fn body_bytes(&self) -> Option<Vec<u8>> {
        self.body.as_ref().map(|s| s.clone().into_bytes())
    }
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: TaskId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    pub headers: Json,
    pub schedule_type: ScheduleType,
    pub cron_expression: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub timeout_ms: i32,
    pub retry_attempts: i32,
    pub callback_url: Option<String>,
    pub expected_status_codes: Option<Vec<i32>>,
    pub expected_body_pattern: Option<String>,
    pub queue: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_execution_at: Option<DateTime<Utc>>,
    pub last_execution_status: Option<String>,
}

impl From<dispatch_store::models::Task> for TaskResponse {
    fn from(t: dispatch_store::models::Task) -> Self {
        TaskResponse {
            id: t.id,
            organization_id: t.organization_id,
            name: t.name,
            url: t.url,
            method: t.method,
            headers: t.headers,
            schedule_type: t.schedule_type,
            cron_expression: t.cron_expression,
            scheduled_at: t.scheduled_at,
            enabled: t.enabled,
            timeout_ms: t.timeout_ms,
            retry_attempts: t.retry_attempts,
            callback_url: t.callback_url,
            expected_status_codes: t.expected_status_codes,
            expected_body_pattern: t.expected_body_pattern,
            queue: t.queue,
            next_run_at: t.next_run_at,
            last_execution_at: t.last_execution_at,
            last_execution_status: t.last_execution_status,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchTaskRequest {
    pub queue: Option<String>,
    pub items: Vec<TaskRequest>,
}

impl BatchTaskRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if self.items.is_empty() {
            errors.insert("items", "must contain at least one task".to_string());
        } else if self.items.len() > 1000 {
            errors.insert("items", "must not exceed 1000 tasks".to_string());
        }
        fail(errors)?;
        for (i, item) in self.items.iter().enumerate() {
            if let Err(e) = item.validate() {
                return Err(ApiError::invalid_input(
                    format!("item {i} failed validation"),
                    e.details.unwrap_or(Json::Null),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueActionRequest {}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub name: String,
    pub paused: bool,
}

impl From<dispatch_store::models::Queue> for QueueResponse {
    fn from(q: dispatch_store::models::Queue) -> Self {
        QueueResponse { name: q.name, paused: q.paused }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorRequest {
    pub name: String,
    pub interval_seconds: Option<i32>,
    pub cron_expression: Option<String>,
    #[serde(default = "default_grace_period")]
    pub grace_period_seconds: i32,
}

fn default_grace_period() -> i32 {
    300
}

impl MonitorRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if self.name.trim().is_empty() {
            errors.insert("name", "must not be empty".to_string());
        }
        match (&self.interval_seconds, &self.cron_expression) {
            (None, None) => {
                errors.insert("interval_seconds", "either interval_seconds or cron_expression is required".to_string());
            }
            (Some(interval), _) => {
                if !(60..=604_800).contains(interval) {
                    errors.insert("interval_seconds", "must be between 60 and 604800".to_string());
                }
            }
            (None, Some(expr)) => {
                if let Err(e) = dispatch_shared::cron::CronSchedule::parse(expr) {
                    errors.insert("cron_expression", e.0);
                }
            }
        }
        if !(0..=3600).contains(&self.grace_period_seconds) {
            errors.insert("grace_period_seconds", "must be between 0 and 3600".to_string());
        }
        fail(errors)
    }
}

#[derive(Debug, Serialize)]
pub struct MonitorResponse {
    pub id: MonitorId,
    pub name: String,
    pub ping_token: String,
    pub schedule_type: String,
    pub interval_seconds: Option<i32>,
    pub cron_expression: Option<String>,
    pub grace_period_seconds: i32,
    pub status: dispatch_shared::types::MonitorStatus,
    pub enabled: bool,
    pub last_ping_at: Option<DateTime<Utc>>,
    pub next_expected_at: Option<DateTime<Utc>>,
}

impl From<dispatch_store::models::Monitor> for MonitorResponse {
    fn from(m: dispatch_store::models::Monitor) -> Self {
        MonitorResponse {
            id: m.id,
            name: m.name,
            ping_token: m.ping_token,
            schedule_type: m.schedule_type,
            interval_seconds: m.interval_seconds,
            cron_expression: m.cron_expression,
            grace_period_seconds: m.grace_period_seconds,
            status: m.status,
            enabled: m.enabled,
            last_ping_at: m.last_ping_at,
            next_expected_at: m.next_expected_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointRequest {
    pub name: String,
    pub slug: Option<String>,
    pub forward_urls: Vec<String>,
    #[serde(default)]
    pub use_queue: bool,
    #[serde(default = "default_endpoint_retry_attempts")]
    pub retry_attempts: i32,
}

fn default_endpoint_retry_attempts() -> i32 {
    5
}

impl EndpointRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if self.name.trim().is_empty() {
            errors.insert("name", "must not be empty".to_string());
        }
        if self.forward_urls.is_empty() || self.forward_urls.len() > 10 {
            errors.insert("forward_urls", "must contain between 1 and 10 urls".to_string());
        }
        if !(0..=10).contains(&self.retry_attempts) {
            errors.insert("retry_attempts", "must be between 0 and 10".to_string());
        }
        fail(errors)
    }
}

#[derive(Debug, Serialize)]
pub struct EndpointResponse {
    pub id: EndpointId,
    pub name: String,
    pub slug: String,
    pub forward_urls: Vec<String>,
    pub use_queue: bool,
    pub retry_attempts: i32,
    pub enabled: bool,
}

impl From<dispatch_store::models::Endpoint> for EndpointResponse {
    fn from(e: dispatch_store::models::Endpoint) -> Self {
        EndpointResponse {
            id: e.id,
            name: e.name,
            slug: e.slug,
            forward_urls: e.forward_urls,
            use_queue: e.use_queue,
            retry_attempts: e.retry_attempts,
            enabled: e.enabled,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncRequest {
    pub tasks: Vec<TaskRequestWithSlug>,
    #[serde(default)]
    pub delete_removed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskRequestWithSlug {
    /// A client-chosen stable identifier used to decide which existing
    /// task a sync entry upserts rather than duplicates.
    pub external_id: String,
    #[serde(flatten)]
    pub task: TaskRequest,
}
