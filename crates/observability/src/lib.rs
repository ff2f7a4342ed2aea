//! Process-wide tracing setup shared by the binaries.

/// Initialize tracing with the format selected by `PROCURA_LOG_FORMAT`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env());
}

/// Subscriber configuration (filter, output format).
pub mod tracing;
