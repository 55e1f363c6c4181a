//! The worker pool (C6), SSRF guard (part of C6's dispatch step), fairness
//! gate integration (C7, via `Store::claim_next_execution`), retry backoff,
//! notifier (C10), and quota counter (C11).

pub mod dispatch;
pub mod notifier;
pub mod pool;
pub mod quota;
pub mod retry;
pub mod ssrf;

pub use dispatch::{perform, WorkerContext};
pub use notifier::{notify_monitor_event, LoggingSink, NotifyEvent, Notifier, Sink};
pub use pool::PoolConfig;
