//! Tracing setup for hosts that do not install their own subscriber.

use lorekeeper_core::config::GeneralConfig;
use tracing_subscriber::EnvFilter;

/// Install a formatted subscriber filtered at `level`.
///
/// `RUST_LOG` overrides `level` when set. Returns `false` if a global
/// subscriber was already installed.
pub fn init_tracing(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// [`init_tracing`] at the configured `log_level`.
pub fn init_tracing_from_config(general: &GeneralConfig) -> bool {
    init_tracing(&general.log_level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_existing_subscriber() {
        let _ = init_tracing("debug");
        assert!(!init_tracing("info"));
        assert!(!init_tracing_from_config(&GeneralConfig::default()));
    }
}
