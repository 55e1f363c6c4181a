//! Row types returned by store queries. These mirror the data model of
//! spec.md §3 directly; application code elsewhere never hand-rolls SQL
//! against these tables.

use chrono::{DateTime, Utc};
use dispatch_shared::ids::{
    ApiKeyId, EndpointId, ExecutionId, InboundEventId, MonitorId, MonitorPingId, OrganizationId,
    TaskId,
};
use dispatch_shared::types::{ExecutionStatus, HttpMethod, MonitorStatus, ScheduleType, Tier, TaskStatus};
use serde_json::Value as Json;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Organization {
    pub id: OrganizationId,
    pub tier: Tier,
    pub webhook_secret: String,
    pub exec_count: i64,
    pub reset_at: DateTime<Utc>,
    pub warning_sent_at: Option<DateTime<Utc>>,
    pub reached_sent_at: Option<DateTime<Utc>>,
    pub notify_on_failure: bool,
    pub notify_on_recovery: bool,
    pub email: Option<String>,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub key_id: String,
    pub key_hash: String,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Queue {
    pub organization_id: OrganizationId,
    pub name: String,
    pub paused: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Task {
    pub id: TaskId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    pub headers: Json,
    pub body: Option<Vec<u8>>,
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
    pub deleted_at: Option<DateTime<Utc>>,
    pub notify_on_failure: Option<bool>,
    pub notify_on_recovery: Option<bool>,
    pub external_id: Option<String>,
}

impl Task {
    pub fn status(&self) -> TaskStatus {
        if self.deleted_at.is_some() {
            TaskStatus::Deleted
        } else if self.enabled {
            TaskStatus::Active
        } else {
            TaskStatus::Paused
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Execution {
    pub id: ExecutionId,
    pub task_id: TaskId,
    pub organization_id: OrganizationId,
    pub queue: Option<String>,
    pub status: ExecutionStatus,
    pub scheduled_for: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status_code: Option<i32>,
    pub duration_ms: Option<i32>,
    pub response_body: Option<Vec<u8>>,
    pub error_message: Option<String>,
    pub attempt: i32,
    pub callback_url: Option<String>,
    pub is_internal: bool,
}

/// The outcome a worker writes back via `record_execution_finished`.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub status_code: Option<i32>,
    pub duration_ms: Option<i32>,
    pub response_body: Option<Vec<u8>>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Endpoint {
    pub id: EndpointId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub slug: String,
    pub forward_urls: Vec<String>,
    pub forward_method: Option<String>,
    pub forward_headers: Option<Json>,
    pub forward_body: Option<Vec<u8>>,
    pub retry_attempts: i32,
    pub use_queue: bool,
    pub enabled: bool,
    pub notify_on_failure: Option<bool>,
    pub notify_on_recovery: Option<bool>,
    pub on_failure_url: Option<String>,
    pub on_recovery_url: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InboundEvent {
    pub id: InboundEventId,
    pub endpoint_id: EndpointId,
    pub method: String,
    pub headers: Json,
    pub body: Option<Vec<u8>>,
    pub source_ip: Option<String>,
    pub received_at: DateTime<Utc>,
    pub task_ids: Vec<TaskId>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Monitor {
    pub id: MonitorId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub ping_token: String,
    pub schedule_type: String,
    pub interval_seconds: Option<i32>,
    pub cron_expression: Option<String>,
    pub grace_period_seconds: i32,
    pub status: MonitorStatus,
    pub enabled: bool,
    pub last_ping_at: Option<DateTime<Utc>>,
    pub next_expected_at: Option<DateTime<Utc>>,
    pub notify_on_failure: Option<bool>,
    pub notify_on_recovery: Option<bool>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MonitorPing {
    pub id: MonitorPingId,
    pub monitor_id: MonitorId,
    pub received_at: DateTime<Utc>,
    pub expected_interval_seconds: i32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IdempotencyRecord {
    pub organization_id: OrganizationId,
    pub key: String,
    pub status_code: Option<i32>,
    pub response_body: Option<Json>,
    pub inserted_at: DateTime<Utc>,
}
