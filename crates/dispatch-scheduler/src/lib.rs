//! The scheduler (C5) and monitor watchdog (C9): both leader-gated
//! background loops that share one advisory lock and one tick.

pub mod leader;
pub mod scheduler;
pub mod wake;
pub mod watchdog;

pub use leader::LeaderLock;
pub use scheduler::{tick, SchedulerTickConfig, TickReport};
pub use watchdog::{sweep, WatchdogEvent};
