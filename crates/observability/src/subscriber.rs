//! Tracing subscriber initialization.
//!
//! `RUST_LOG` always wins over the configured default directive.

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// JSON lines when true, human-readable text otherwise.
    pub json: bool,
    /// Filter used when `RUST_LOG` is unset or unparsable.
    pub default_directive: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            json: true,
            default_directive: "info".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn text() -> Self {
        Self {
            json: false,
            ..Self::default()
        }
    }

    pub fn with_default_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }

    /// Filter from `RUST_LOG`, else the default directive, else `info`.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.default_directive))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Installs the global subscriber. Later calls leave the first one in place.
pub fn install(config: &ObservabilityConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_a_no_op() {
        install(&ObservabilityConfig::text());
        assert!(!install(&ObservabilityConfig::default()));
    }

    #[test]
    fn bad_directive_falls_back() {
        let config = ObservabilityConfig::default().with_default_directive("not a [valid directive");
        // Must not panic.
        let _ = config.env_filter();
    }
}
