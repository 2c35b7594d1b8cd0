//! Diagnostic logging for the bridge and the native layer
//!
//! `pomelo.configure{ log = ... }` picks the level. The first level other than
//! `DISABLE` installs a `tracing_subscriber` fmt subscriber whose filter sits
//! behind a reload handle; later calls swap the filter, and `DISABLE` turns
//! output off again. `RUST_LOG`, when set, takes precedence over the
//! configured level.

use pomelo_native::LogLevel;
use std::sync::OnceLock;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER: OnceLock<FilterHandle> = OnceLock::new();

/// Tracing level for `level`; `None` when logging is disabled.
pub fn tracing_level(level: LogLevel) -> Option<Level> {
    match level {
        LogLevel::Debug => Some(Level::DEBUG),
        LogLevel::Info => Some(Level::INFO),
        LogLevel::Warn => Some(Level::WARN),
        LogLevel::Error => Some(Level::ERROR),
        LogLevel::Disable => None,
    }
}

/// Filter directives covering both pomelo crates.
pub fn build_filter_string(level: Level) -> String {
    let level = level.to_string().to_lowercase();
    format!("pomelo_lua={level},pomelo_native={level}")
}

/// Directives for `level`, `off` for [`LogLevel::Disable`].
pub fn directives(level: LogLevel) -> String {
    tracing_level(level)
        .map(build_filter_string)
        .unwrap_or_else(|| "off".to_string())
}

fn env_override() -> bool {
    std::env::var_os(EnvFilter::DEFAULT_ENV).is_some()
}

/// Swap the filter behind `handle` for `level`.
fn apply_level(handle: &FilterHandle, level: LogLevel) -> bool {
    handle.reload(EnvFilter::new(directives(level))).is_ok()
}

/// Set the process-wide log level.
///
/// Returns whether the active filter was installed or changed. Nothing is
/// installed for [`LogLevel::Disable`], when `RUST_LOG` governs an installed
/// subscriber, or when another subscriber already owns the process.
pub fn init_logging(level: LogLevel) -> bool {
    if let Some(handle) = FILTER.get() {
        if env_override() {
            return false;
        }
        let changed = apply_level(handle, level);
        debug!(?level, "pomelo log level changed");
        return changed;
    }

    if tracing_level(level).is_none() {
        return false;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(level)));
    let (filter, handle) = reload::Layer::new(filter);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok();

    if installed {
        let _ = FILTER.set(handle);
        debug!(?level, "pomelo logging initialized");
    }
    installed
}
