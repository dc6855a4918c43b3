// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Injectable logging. Named `logging` rather than using the `log` crate's
//! process-wide facade, since sinks here are owned by a `Master` instance
//! rather than registered globally.

use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// A destination for log messages, owned by whoever constructs a `Master`.
pub trait LogSink {
    fn log(&self, level: LogLevel, message: &str);
}

/// Discards everything. The default sink when a caller doesn't care about logs.
#[derive(Debug, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Formats `bytes` as a space-separated hex string, for `log_raw_frames` diagnostics.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02x}", b);
    }
    out
}
