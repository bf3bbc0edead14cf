// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Compile-time configurable logging, off by default.
//!
//! A wait-free queue's own hot path must stay wait-free, so logging is a
//! zero-cost no-op unless the `logging` feature is enabled — and even then
//! nothing logs from `put`/`get` themselves, only from segment allocation
//! and reclamation (see module docs on [`crate::queue`]).
//!
//! ```ignore
//! use wfqueue::logging::{init_logger, ConsoleOutput, LogLevel};
//! use std::sync::Arc;
//!
//! init_logger(Arc::new(ConsoleOutput::new(LogLevel::Debug)), LogLevel::Debug);
//! debug!("segment {} allocated", id);
//! ```

#[cfg(feature = "logging")]
pub mod logger;
#[cfg(feature = "logging")]
mod output;

#[cfg(feature = "logging")]
pub use logger::{flush_logger, init_logger};
#[cfg(feature = "logging")]
pub use output::{ConsoleOutput, LogLevel, Output};

/// Debug-level log message. No-op unless the `logging` feature is enabled.
#[macro_export]
#[cfg(feature = "logging")]
macro_rules! debug {
    ($($arg:tt)*) => {
        let _ = $crate::logging::logger::log_message(
            $crate::logging::LogLevel::Debug,
            &format!($($arg)*),
        );
    };
}

/// Info-level log message. No-op unless the `logging` feature is enabled.
#[macro_export]
#[cfg(feature = "logging")]
macro_rules! info {
    ($($arg:tt)*) => {
        let _ = $crate::logging::logger::log_message(
            $crate::logging::LogLevel::Info,
            &format!($($arg)*),
        );
    };
}

/// Warning-level log message. No-op unless the `logging` feature is enabled.
#[macro_export]
#[cfg(feature = "logging")]
macro_rules! warn {
    ($($arg:tt)*) => {
        let _ = $crate::logging::logger::log_message(
            $crate::logging::LogLevel::Warning,
            &format!($($arg)*),
        );
    };
}

/// Error-level log message. No-op unless the `logging` feature is enabled.
#[macro_export]
#[cfg(feature = "logging")]
macro_rules! error {
    ($($arg:tt)*) => {
        let _ = $crate::logging::logger::log_message(
            $crate::logging::LogLevel::Error,
            &format!($($arg)*),
        );
    };
}

/// Function-entry trace marker. Only active with both `logging` and `trace`
/// enabled — a finer-grained, noisier sibling of `debug!` for call-stack
/// instrumentation during development, not something the hot path ever pays
/// for in a normal build.
#[macro_export]
#[cfg(all(feature = "logging", feature = "trace"))]
macro_rules! trace_fn {
    ($fn_name:expr) => {
        let _ = $crate::logging::logger::trace_entry($fn_name);
    };
}

#[macro_export]
#[cfg(not(all(feature = "logging", feature = "trace")))]
macro_rules! trace_fn {
    ($fn_name:expr) => {};
}

#[macro_export]
#[cfg(not(feature = "logging"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

#[macro_export]
#[cfg(not(feature = "logging"))]
macro_rules! info {
    ($($arg:tt)*) => {};
}

#[macro_export]
#[cfg(not(feature = "logging"))]
macro_rules! warn {
    ($($arg:tt)*) => {};
}

#[macro_export]
#[cfg(not(feature = "logging"))]
macro_rules! error {
    ($($arg:tt)*) => {};
}

#[cfg(all(test, feature = "logging"))]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn macros_compile_and_run() {
        init_logger(Arc::new(ConsoleOutput::new(LogLevel::Debug)), LogLevel::Debug);
        crate::debug!("segment {} allocated", 3);
        crate::info!("registered participant");
        crate::warn!("reclamation CAS lost, deferring");
        crate::error!("allocator reported OOM");
        crate::trace_fn!("queue::put");
        assert!(flush_logger().is_ok());
    }
}
