//! Workspace root for the `dispatch-core` task scheduler and dispatcher.
//!
//! This crate has no runtime code of its own. The implementation lives in
//! the member crates under `crates/`:
//!
//! - [`dispatch_shared`] — domain types, cron evaluator, config, errors.
//! - `dispatch_store` — Postgres persistence and the atomic claim primitive.
//! - `dispatch_scheduler` — the scheduler and monitor watchdog loops.
//! - `dispatch_worker` — the worker pool, notifier, and quota counter.
//! - `dispatch_api` — the HTTP ingress.
//!
//! End-to-end scenario tests live under `tests/e2e` and exercise these
//! crates together against a real database.
