#![deny(missing_docs)]
//! Shared logging utilities for the harvest workspace.
//!
//! This crate provides the `engine_*` logging macros used across the codebase,
//! a per-thread worker tag for attributing log lines to harvest workers, and a
//! minimal test initializer for the global logger.

use std::cell::Cell;

thread_local! {
    /// Worker id of the harvest worker currently driving this thread (0 = none).
    static WORKER_ID: Cell<usize> = const { Cell::new(0) };
}

/// Tags the current thread with a harvest worker id.
///
/// Workers run on a multi-threaded runtime, so the tag is refreshed by the
/// worker each time it resumes after a suspension point.
pub fn set_worker_id(worker: usize) {
    WORKER_ID.with(|v| v.set(worker));
}

/// Returns the worker id tagged on the current thread, or 0 if untagged.
pub fn current_worker_id() -> usize {
    WORKER_ID.with(|v| v.get())
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! engine_trace {
    ($($arg:tt)*) => {{
        log::trace!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! engine_info {
    ($($arg:tt)*) => {{
        log::info!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! engine_debug {
    ($($arg:tt)*) => {{
        log::debug!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! engine_warn {
    ($($arg:tt)*) => {{
        log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! engine_error {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
    }};
}

/// Logs a debug-level message prefixed with the current worker tag (`W<n>:`).
#[macro_export]
macro_rules! worker_debug {
    ($($arg:tt)*) => {{
        log::debug!("W{}: {}", $crate::current_worker_id(), format_args!($($arg)*));
    }};
}

/// Logs a warn-level message prefixed with the current worker tag (`W<n>:`).
#[macro_export]
macro_rules! worker_warn {
    ($($arg:tt)*) => {{
        log::warn!("W{}: {}", $crate::current_worker_id(), format_args!($($arg)*));
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

#[cfg(test)]
mod tests {
    use super::{current_worker_id, set_worker_id};

    #[test]
    fn worker_tag_is_per_thread() {
        set_worker_id(3);
        assert_eq!(current_worker_id(), 3);
        let other = std::thread::spawn(current_worker_id).join().unwrap();
        assert_eq!(other, 0);
    }
}
