// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

use std::error;
use std::fmt;
use std::io::Error as IOError;

use crate::application::Iin;

/// Error taxonomy for the DNP3 master stack.
///
/// Every variant carries the context needed to debug it without re-reading the
/// frame: host/port for communication failures, expected/actual for CRC
/// mismatches, function code and IIN for protocol rejections, and so on.
#[derive(Debug)]
pub enum Error {
    /// Socket connect/read/write failure. Retriable.
    Communication {
        host: String,
        port: u16,
        reason: String,
    },
    /// No response within the configured deadline, or reassembly deadline exceeded. Retriable.
    Timeout { timeout_seconds: f64 },
    /// Header or block CRC mismatch. Not retriable; the caller should reset the connection.
    Crc { expected: u16, actual: u16 },
    /// Malformed frame: bad start bytes, length mismatch, unexpected address. Not retriable.
    Frame { reason: String },
    /// Transport reassembly violation, unexpected function code, or IIN rejection. Not retriable.
    Protocol {
        function_code: u8,
        iin: Iin,
        reason: String,
    },
    /// Unsupported or malformed object block. Not retriable.
    Object {
        group: u8,
        variation: u8,
        reason: String,
    },
    /// Non-zero CROB/AOC status echoed back by the outstation. Not retriable.
    Control { status_code: u8 },
    /// Bad argument at a config or API boundary. Not retriable.
    Validation { message: String },
    /// The connection mutex was poisoned by a panicking holder.
    Lock,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Communication { host, port, reason } => {
                write!(f, "communication error with {}:{}: {}", host, port, reason)
            }
            Error::Timeout { timeout_seconds } => write!(
                f,
                "timed out after {:.3}s waiting for a response",
                timeout_seconds
            ),
            Error::Crc { expected, actual } => write!(
                f,
                "CRC mismatch: expected {:#06x}, got {:#06x}",
                expected, actual
            ),
            Error::Frame { reason } => write!(f, "invalid frame: {}", reason),
            Error::Protocol {
                function_code,
                iin,
                reason,
            } => write!(
                f,
                "protocol error on function {:#04x} (iin1={:#04x} iin2={:#04x}): {}",
                function_code, iin.iin1, iin.iin2, reason
            ),
            Error::Object {
                group,
                variation,
                reason,
            } => write!(f, "object error for g{}v{}: {}", group, variation, reason),
            Error::Control { status_code } => {
                write!(f, "control operation rejected, status code {}", status_code)
            }
            Error::Validation { message } => write!(f, "validation error: {}", message),
            Error::Lock => write!(f, "connection lock poisoned"),
        }
    }
}

// This is important for other errors to wrap this one.
impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        None
    }
}

impl Error {
    /// Whether the coordinator should retry a transaction that failed with this error.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Communication { .. } | Error::Timeout { .. })
    }

    pub(crate) fn communication(host: &str, port: u16, io_err: IOError) -> Error {
        Error::Communication {
            host: host.to_string(),
            port,
            reason: io_err.to_string(),
        }
    }
}
