//! Tracing bootstrap shared by every `dispatch-*` binary.

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber. `RUST_LOG` controls the
/// filter; defaults to `info` when unset. `json` selects structured JSON
/// output for production deployments, matching the teacher's split between
/// human-readable dev logs and machine-parseable prod logs.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt().with_env_filter(filter).with_target(true);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_does_not_panic_when_called_once() {
        // tracing_subscriber::fmt().init() panics if a global subscriber is
        // already set, so this is exercised via `try_init` semantics in
        // practice; here we just confirm the filter builder doesn't panic.
        let _ = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    }
}
