//! Domain types, configuration, error vocabulary, cron evaluation, and
//! cross-cutting concerns (logging, circuit breakers) shared by every
//! `dispatch-*` crate.

pub mod apikey;
pub mod config;
pub mod cron;
pub mod error;
pub mod ids;
pub mod logging;
pub mod resilience;
pub mod types;

pub use config::DispatchConfig;
pub use error::DispatchError;
