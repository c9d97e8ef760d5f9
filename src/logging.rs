//! Subscriber setup for shells that do not install their own.
//!
//! Info-level records are only shown in debug mode; warnings and errors are
//! always shown. `RUST_LOG` overrides both.

use tracing_subscriber::EnvFilter;

use crate::config::PanelConfig;

#[must_use]
pub fn default_directive(config: &PanelConfig) -> &'static str {
    if config.debug_mode {
        "control_panel=debug"
    } else {
        "control_panel=warn"
    }
}

/// Returns `false` when a global subscriber was already installed.
pub fn init(config: &PanelConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_follows_debug_mode() {
        let quiet = PanelConfig::default();
        assert_eq!(default_directive(&quiet), "control_panel=warn");

        let verbose = PanelConfig {
            debug_mode: true,
            ..PanelConfig::default()
        };
        assert_eq!(default_directive(&verbose), "control_panel=debug");
    }

    #[test]
    fn test_second_install_is_tolerated() {
        let config = PanelConfig::default();
        let _ = init(&config);
        assert!(!init(&config));
    }
}
