//! Tracing setup for binaries and tests that embed the pipeline.

use tracing_subscriber::EnvFilter;

/// Install a formatted tracing subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set. Returns `false` when a global
/// subscriber was already installed, which is harmless.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing("article_core=debug");
        assert!(!init_tracing("info"));
    }
}
