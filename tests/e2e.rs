//! Workspace end-to-end scenario tests (spec.md §8, S1-S6). Each scenario
//! exercises real crates against a real database rather than mocking the
//! store, differing from the component-level tests only in scope: these
//! wire the scheduler, worker, and API crates together the way the
//! `dispatch-*` binaries do at runtime.

#[path = "e2e/common.rs"]
mod common;
#[path = "e2e/s1_cron_happy_path.rs"]
mod s1_cron_happy_path;
#[path = "e2e/s2_retry_exhaustion.rs"]
mod s2_retry_exhaustion;
#[path = "e2e/s3_queue_serialization.rs"]
mod s3_queue_serialization;
#[path = "e2e/s4_idempotent_batch_create.rs"]
mod s4_idempotent_batch_create;
#[path = "e2e/s5_endpoint_fanout.rs"]
mod s5_endpoint_fanout;
#[path = "e2e/s6_monitor_recovery.rs"]
mod s6_monitor_recovery;
