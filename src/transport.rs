// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Byte-stream abstraction the master talks through.

use super::error::Error;
use std::time::Instant;

/// An abstract duplex byte stream used by the master to reach an outstation.
///
/// Types implementing `Transport` should enforce `deadline` on `read` by
/// translating it into a socket read timeout (or equivalent) rather than
/// busy-polling `Instant::now()`.
pub trait Transport {
    fn open(&mut self) -> Result<(), Error>;
    fn close(&mut self);
    /// Reads at least one byte into `buf`, returning the count read.
    /// Returns `Error::Timeout` if `deadline` passes with nothing read.
    fn read(&mut self, buf: &mut [u8], deadline: Instant) -> Result<usize, Error>;
    fn write(&mut self, bytes: &[u8]) -> Result<(), Error>;
}

/// An in-process `Transport` backed by two byte queues, shared by the crate's own
/// unit tests and `tests/integration_test.rs` so both exercise the master against
/// the same fake wire rather than maintaining separate scripted stand-ins.
pub mod mock {
    use super::*;
    use std::collections::VecDeque;

    /// An in-process transport backed by two byte queues, for exercising the
    /// master and its layers without a real socket.
    #[derive(Debug, Default)]
    pub struct MockTransport {
        pub inbound: VecDeque<u8>,
        pub outbound: Vec<u8>,
        pub opened: bool,
    }

    impl MockTransport {
        pub fn new() -> MockTransport {
            MockTransport::default()
        }

        pub fn push_inbound(&mut self, bytes: &[u8]) {
            self.inbound.extend(bytes.iter().copied());
        }
    }

    impl Transport for MockTransport {
        fn open(&mut self) -> Result<(), Error> {
            self.opened = true;
            Ok(())
        }

        fn close(&mut self) {
            self.opened = false;
        }

        fn read(&mut self, buf: &mut [u8], _deadline: Instant) -> Result<usize, Error> {
            if self.inbound.is_empty() {
                return Err(Error::Timeout {
                    timeout_seconds: 0.0,
                });
            }
            let mut n = 0;
            while n < buf.len() {
                match self.inbound.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }

        fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
            self.outbound.extend_from_slice(bytes);
            Ok(())
        }
    }
}
