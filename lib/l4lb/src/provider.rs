// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Providers let the engine run in different contexts by allowing
//! implementations of core services to be plugged into it. Logging is
//! the one service done this way today: a unit test maps it to
//! `println!`, while `l4lbadm` maps it onto its `slog` drain.
//!
//! The engine only logs from control-path operations such as a table
//! swap. Nothing on the per-packet path logs.

use core::fmt;
use core::fmt::Display;

/// A logging provider provides the means to log messages to some
/// destination based on the context in which the engine is running.
///
/// Logging levels are provided by [`LogLevel`]. These levels will map
/// to the underlying provider with varying degrees of success.
pub trait LogProvider: Send + Sync {
    /// Log a message at the specified level.
    fn log(&self, level: LogLevel, msg: &str);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Note,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level_s = match self {
            Self::Note => "[NOTE]",
            Self::Warn => "[WARN]",
            Self::Error => "[ERROR]",
        };
        write!(f, "{level_s}")
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PrintlnLog;

impl LogProvider for PrintlnLog {
    fn log(&self, level: LogLevel, msg: &str) {
        println!("{level} {msg}");
    }
}

/// Discard everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullLog;

impl LogProvider for NullLog {
    fn log(&self, _level: LogLevel, _msg: &str) {}
}
