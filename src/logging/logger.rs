// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global logger instance, lazily initialized.

use super::output::{LogLevel, Output};
use std::io;
use std::sync::{Arc, Mutex, OnceLock};

static LOGGER: OnceLock<Arc<Mutex<GlobalLogger>>> = OnceLock::new();

struct GlobalLogger {
    output: Arc<dyn Output>,
}

impl GlobalLogger {
    fn log(&self, level: LogLevel, message: &str) -> io::Result<()> {
        self.output.write(level, message)
    }

    fn flush(&self) -> io::Result<()> {
        self.output.flush()
    }
}

/// Initialize the global logger. Only the first call takes effect;
/// subsequent calls are ignored.
pub fn init_logger(output: Arc<dyn Output>, _level: LogLevel) {
    let _ = LOGGER.get_or_init(|| Arc::new(Mutex::new(GlobalLogger { output })));
}

#[inline]
fn get_logger() -> Option<Arc<Mutex<GlobalLogger>>> {
    LOGGER.get().cloned()
}

/// Called by the `debug!`/`info!`/`warn!` macros. A no-op before
/// `init_logger` is called.
#[inline]
pub(crate) fn log_message(level: LogLevel, message: &str) -> io::Result<()> {
    match get_logger() {
        Some(logger) => {
            let guard = logger
                .lock()
                .map_err(|_| io::Error::other("global logger mutex poisoned"))?;
            guard.log(level, message)
        }
        None => Ok(()),
    }
}

/// Called by `trace_fn!` (only compiled in when both `logging` and `trace`
/// are enabled): logs a function-entry marker at debug level.
#[inline]
#[cfg(feature = "trace")]
pub(crate) fn trace_entry(fn_name: &str) -> io::Result<()> {
    log_message(LogLevel::Debug, &format!("[ENTER:FNC] {fn_name}"))
}

/// Flush the global logger's output. Safe to call even if uninitialized.
pub fn flush_logger() -> io::Result<()> {
    match get_logger() {
        Some(logger) => {
            let guard = logger
                .lock()
                .map_err(|_| io::Error::other("global logger mutex poisoned"))?;
            guard.flush()
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::output::ConsoleOutput;

    #[test]
    fn log_message_before_init_is_a_silent_noop() {
        assert!(log_message(LogLevel::Info, "no logger yet").is_ok());
    }

    #[test]
    fn init_then_log_succeeds() {
        init_logger(Arc::new(ConsoleOutput::new(LogLevel::Debug)), LogLevel::Debug);
        assert!(log_message(LogLevel::Debug, "hello").is_ok());
        assert!(flush_logger().is_ok());
    }
}
