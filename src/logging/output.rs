// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Logging output backend (console only — this crate has no file/network
//! transport of its own to hang a file sink off of).

use std::io::{self, Write};
use std::sync::Mutex;

/// Log level for filtering and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO ",
            Self::Warning => "WARN ",
            Self::Error => "ERROR",
        }
    }
}

/// Output destination for log messages. Implementations must be
/// thread-safe.
pub trait Output: Send + Sync {
    fn write(&self, level: LogLevel, message: &str) -> io::Result<()>;
    fn flush(&self) -> io::Result<()>;
}

/// Writes to stderr with a level prefix and newline. Thread-safe via an
/// internal mutex (serializes interleaved writes from concurrent queue
/// threads, nothing more).
pub struct ConsoleOutput {
    level_filter: Mutex<LogLevel>,
}

impl ConsoleOutput {
    pub fn new(level_filter: LogLevel) -> Self {
        Self {
            level_filter: Mutex::new(level_filter),
        }
    }
}

impl Output for ConsoleOutput {
    fn write(&self, level: LogLevel, message: &str) -> io::Result<()> {
        let filter = *self
            .level_filter
            .lock()
            .map_err(|_| io::Error::other("console output mutex poisoned"))?;
        if level < filter {
            return Ok(());
        }
        let mut stderr = io::stderr();
        writeln!(stderr, "[{}] {}", level.as_str(), message)
    }

    fn flush(&self) -> io::Result<()> {
        io::stderr().flush()
    }
}
