//! The scheduler's wake-up signal (spec.md §4.3, §5): sleeps are fully
//! interruptible when the API creates or enables a task. Grounded on the
//! LISTEN/NOTIFY push pattern the teacher uses for its message queue
//! providers, adapted here to a plain notification channel instead of a
//! queued-message payload.

use sqlx::postgres::PgListener;
use sqlx::PgPool;
use std::time::Duration;

pub const WAKE_CHANNEL: &str = "dispatch_wake";

/// Publishes a wake-up notification. Called by `dispatch-api` after a task
/// create/enable; fire-and-forget, matching spec.md §5's "fire-and-forget
/// from the request path" framing for non-critical side effects.
pub async fn notify_wake(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_notify($1, '')")
        .bind(WAKE_CHANNEL)
        .execute(pool)
        .await?;
    Ok(())
}

/// Sleeps until either `timeout` elapses or a wake notification arrives.
/// Returns `true` if woken early by a notification.
pub async fn sleep_or_wake(listener: &mut PgListener, timeout: Duration) -> bool {
    matches!(tokio::time::timeout(timeout, listener.recv()).await, Ok(Ok(_)))
}

pub async fn new_listener(pool: &PgPool) -> Result<PgListener, sqlx::Error> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(WAKE_CHANNEL).await?;
    Ok(listener)
}
