//! Tracing/logging setup shared by every binary.

/// Subscriber construction and installation.
pub mod subscriber;

pub use subscriber::ObservabilityConfig;

/// Initialize process-wide observability with JSON logs at `info`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    subscriber::install(&ObservabilityConfig::default());
}

/// Like [`init`], with explicit output format and default filter.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_with(config: &ObservabilityConfig) -> bool {
    subscriber::install(config)
}
