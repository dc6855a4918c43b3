// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! TCP transport implementation.

use super::error::Error;
use super::transport::Transport as TransportTrait;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A `Transport` over a plain TCP socket, guarded by a mutex so a `Master`
/// can hand out the same connection across retries without re-dialing.
pub struct TcpTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpTransport {
    pub fn new(host: &str, port: u16, connect_timeout: Duration) -> TcpTransport {
        TcpTransport {
            host: host.to_string(),
            port,
            connect_timeout,
            stream: Mutex::new(None),
        }
    }
}

impl TransportTrait for TcpTransport {
    fn open(&mut self) -> Result<(), Error> {
        let address = format!("{}:{}", self.host, self.port);
        let socket_addr = address
            .parse()
            .map_err(|_| Error::Validation {
                message: format!("invalid address {}", address),
            })?;
        let stream = TcpStream::connect_timeout(&socket_addr, self.connect_timeout)
            .map_err(|e| Error::communication(&self.host, self.port, e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::communication(&self.host, self.port, e))?;
        let mut guard = self.stream.lock().map_err(|_| Error::Lock)?;
        *guard = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if let Ok(mut guard) = self.stream.lock() {
            *guard = None;
        }
    }

    fn read(&mut self, buf: &mut [u8], deadline: Instant) -> Result<usize, Error> {
        let mut guard = self.stream.lock().map_err(|_| Error::Lock)?;
        let stream = guard.as_mut().ok_or_else(|| Error::Communication {
            host: self.host.clone(),
            port: self.port,
            reason: "not connected".to_string(),
        })?;
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::Timeout {
                timeout_seconds: 0.0,
            });
        }
        stream
            .set_read_timeout(Some(remaining))
            .map_err(|e| Error::communication(&self.host, self.port, e))?;
        match stream.read(buf) {
            Ok(0) => Err(Error::Communication {
                host: self.host.clone(),
                port: self.port,
                reason: "peer closed the connection".to_string(),
            }),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                Err(Error::Timeout {
                    timeout_seconds: remaining.as_secs_f64(),
                })
            }
            Err(e) => Err(Error::communication(&self.host, self.port, e)),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let mut guard = self.stream.lock().map_err(|_| Error::Lock)?;
        let stream = guard.as_mut().ok_or_else(|| Error::Communication {
            host: self.host.clone(),
            port: self.port,
            reason: "not connected".to_string(),
        })?;
        stream
            .write_all(bytes)
            .map_err(|e| Error::communication(&self.host, self.port, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_before_open_is_communication_error() {
        let mut transport = TcpTransport::new("127.0.0.1", 1, Duration::from_millis(100));
        let mut buf = [0u8; 4];
        let err = transport.read(&mut buf, Instant::now() + Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, Error::Communication { .. }));
    }

    #[test]
    fn write_before_open_is_communication_error() {
        let mut transport = TcpTransport::new("127.0.0.1", 1, Duration::from_millis(100));
        let err = transport.write(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::Communication { .. }));
    }

    #[test]
    fn open_to_unreachable_port_fails() {
        let mut transport = TcpTransport::new("127.0.0.1", 1, Duration::from_millis(200));
        assert!(transport.open().is_err());
    }
}
