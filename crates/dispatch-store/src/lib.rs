//! The only component allowed to mutate persisted state (spec.md §4.2).
//!
//! Callers get typed, narrow operations; nothing outside this crate composes
//! ad-hoc SQL. The atomic claim primitive in [`executions::claim_next_execution`]
//! is the concurrency keystone the rest of the system is built around.

pub mod api_keys;
pub mod endpoints;
pub mod executions;
pub mod idempotency;
pub mod models;
pub mod monitors;
pub mod notifications;
pub mod organizations;
pub mod queues;
pub mod tasks;

use sqlx::PgPool;

/// Embedded migrations, shared by `dispatch-ctl migrate` and by
/// `#[sqlx::test(migrator = "MIGRATOR")]` in every crate's test suite.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Handle to the database pool. Cheap to clone (it's an `Arc` internally);
/// every `dispatch-*` binary holds exactly one.
#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Truncates a response body to `max_response_capture` bytes before it
    /// is ever written to a row (spec.md §4.2).
    pub fn truncate_response(body: &[u8], max_response_capture: usize) -> Vec<u8> {
        if body.len() <= max_response_capture {
            body.to_vec()
        } else {
            body[..max_response_capture].to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_response_leaves_short_bodies_untouched() {
        assert_eq!(Store::truncate_response(b"hello", 64), b"hello");
    }

    #[test]
    fn truncate_response_caps_long_bodies() {
        let body = vec![b'x'; 100];
        assert_eq!(Store::truncate_response(&body, 10).len(), 10);
    }
}
