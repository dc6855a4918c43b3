// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Transport function: segmentation of an APDU into link-sized segments and
//! reassembly of segments back into an APDU, with FIR/FIN/sequence bookkeeping.

use super::constant::transport_header;
use super::error::Error;
use std::time::{Duration, Instant};

/// Encodes `(FIR<<7)|(FIN<<6)|(seq&0x3F)` as the leading byte of a segment.
fn segment_header(fir: bool, fin: bool, seq: u8) -> u8 {
    let mut b = seq & transport_header::SEQUENCE_MASK;
    if fir {
        b |= transport_header::FIR;
    }
    if fin {
        b |= transport_header::FIN;
    }
    b
}

/// Splits `apdu` into transport segments of at most `max_payload` bytes each
/// (the caller passes a value bounded by the data link's own per-frame user data
/// limit), prefixing each with its transport header. `start_seq` is the 6-bit
/// sequence number of the first segment; later segments increment it mod 64.
/// `apdu.len()` must not exceed `max_apdu_size`.
pub fn segment(apdu: &[u8], max_payload: usize, start_seq: u8, max_apdu_size: usize) -> Result<Vec<Vec<u8>>, Error> {
    if max_payload == 0 {
        return Err(Error::Validation {
            message: "transport segment max_payload must be nonzero".to_string(),
        });
    }
    if apdu.len() > max_apdu_size {
        return Err(Error::Validation {
            message: format!("apdu length {} exceeds max_apdu_size {}", apdu.len(), max_apdu_size),
        });
    }
    if apdu.is_empty() {
        return Ok(vec![vec![segment_header(true, true, start_seq)]]);
    }
    let chunks: Vec<&[u8]> = apdu.chunks(max_payload).collect();
    let total = chunks.len();
    let mut segments = Vec::with_capacity(total);
    for (i, chunk) in chunks.into_iter().enumerate() {
        let seq = start_seq.wrapping_add(i as u8) & transport_header::SEQUENCE_MASK;
        let mut segment = Vec::with_capacity(chunk.len() + 1);
        segment.push(segment_header(i == 0, i == total - 1, seq));
        segment.extend_from_slice(chunk);
        segments.push(segment);
    }
    Ok(segments)
}

/// Accumulates transport segments into a complete APDU, enforcing FIR-starts /
/// FIN-ends, a strictly incrementing 6-bit sequence number, a maximum reassembled
/// size, and an overall deadline started on the FIR segment.
#[derive(Debug)]
pub struct Reassembler {
    buffer: Vec<u8>,
    expected_seq: Option<u8>,
    started: bool,
    deadline: Option<Instant>,
    max_apdu_size: usize,
    timeout: Duration,
}

impl Reassembler {
    /// `max_apdu_size` bounds the total reassembled length; `timeout` is the
    /// duration allowed between the FIR segment and the FIN segment completing it.
    pub fn new(max_apdu_size: usize, timeout: Duration) -> Reassembler {
        Reassembler {
            buffer: Vec::new(),
            expected_seq: None,
            started: false,
            deadline: None,
            max_apdu_size,
            timeout,
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.started = false;
        self.expected_seq = None;
        self.deadline = None;
    }

    /// Feeds one segment. Returns `Ok(Some(apdu))` once a FIN segment completes
    /// the fragment, `Ok(None)` while more segments are expected.
    pub fn feed(&mut self, segment_bytes: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        if segment_bytes.is_empty() {
            return Err(Error::Frame {
                reason: "empty transport segment".to_string(),
            });
        }
        let header = segment_bytes[0];
        let fir = header & transport_header::FIR != 0;
        let fin = header & transport_header::FIN != 0;
        let seq = header & transport_header::SEQUENCE_MASK;

        if fir {
            self.buffer.clear();
            self.started = true;
            self.expected_seq = Some(seq);
            self.deadline = Some(Instant::now() + self.timeout);
        } else if !self.started {
            return Err(Error::Frame {
                reason: "transport segment without a preceding FIR".to_string(),
            });
        }

        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                self.reset();
                return Err(Error::Timeout {
                    timeout_seconds: self.timeout.as_secs_f64(),
                });
            }
        }

        match self.expected_seq {
            Some(expected) if expected == seq => {}
            Some(expected) => {
                self.reset();
                return Err(Error::Frame {
                    reason: format!("transport sequence mismatch: expected {} got {}", expected, seq),
                });
            }
            None => unreachable!("started implies expected_seq is set"),
        }

        let payload = &segment_bytes[1..];
        if self.buffer.len() + payload.len() > self.max_apdu_size {
            self.reset();
            return Err(Error::Frame {
                reason: format!("reassembled apdu exceeds max_apdu_size {}", self.max_apdu_size),
            });
        }
        self.buffer.extend_from_slice(payload);
        self.expected_seq = Some(seq.wrapping_add(1) & transport_header::SEQUENCE_MASK);

        if fin {
            self.deadline = None;
            self.started = false;
            Ok(Some(std::mem::take(&mut self.buffer)))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassembler() -> Reassembler {
        Reassembler::new(2048, Duration::from_secs(5))
    }

    #[test]
    fn single_segment_round_trip() {
        let apdu = b"short apdu".to_vec();
        let segments = segment(&apdu, 249, 0, 2048).unwrap();
        assert_eq!(segments.len(), 1);
        let mut reassembler = reassembler();
        let result = reassembler.feed(&segments[0]).unwrap();
        assert_eq!(result, Some(apdu));
    }

    #[test]
    fn multi_segment_round_trip() {
        let apdu: Vec<u8> = (0..700u32).map(|i| (i % 256) as u8).collect();
        let segments = segment(&apdu, 249, 10, 2048).unwrap();
        assert_eq!(segments.len(), 3);
        let mut reassembler = reassembler();
        let mut result = None;
        for seg in &segments {
            result = reassembler.feed(seg).unwrap();
        }
        assert_eq!(result, Some(apdu));
    }

    #[test]
    fn empty_apdu_produces_one_empty_segment() {
        let segments = segment(&[], 249, 0, 2048).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len(), 1);
    }

    #[test]
    fn sequence_wraps_mod_64() {
        let apdu: Vec<u8> = vec![0u8; 249 * 2 + 1];
        let segments = segment(&apdu, 249, 63, 2048).unwrap();
        assert_eq!(segments[0][0] & transport_header::SEQUENCE_MASK, 63);
        assert_eq!(segments[1][0] & transport_header::SEQUENCE_MASK, 0);
        assert_eq!(segments[2][0] & transport_header::SEQUENCE_MASK, 1);
    }

    #[test]
    fn segment_rejects_apdu_over_max_apdu_size() {
        let apdu = vec![0u8; 10];
        let err = segment(&apdu, 249, 0, 5).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn reassembler_rejects_sequence_gap() {
        let apdu: Vec<u8> = vec![0u8; 300];
        let segments = segment(&apdu, 249, 0, 2048).unwrap();
        let mut reassembler = reassembler();
        reassembler.feed(&segments[0]).unwrap();
        let mut tampered = segments[1].clone();
        tampered[0] = (tampered[0] & !transport_header::SEQUENCE_MASK) | 5;
        let err = reassembler.feed(&tampered).unwrap_err();
        assert!(matches!(err, Error::Frame { .. }));
    }

    #[test]
    fn reassembler_rejects_segment_without_fir() {
        let mut reassembler = reassembler();
        let err = reassembler.feed(&[0x40]).unwrap_err(); // FIN only, no FIR
        assert!(matches!(err, Error::Frame { .. }));
    }

    #[test]
    fn reassembler_rejects_payload_over_max_apdu_size() {
        let mut reassembler = Reassembler::new(4, Duration::from_secs(5));
        let segments = segment(&vec![0u8; 10], 249, 0, 2048).unwrap();
        // Feed a single FIR+FIN segment whose payload alone exceeds max_apdu_size.
        let err = reassembler.feed(&segments[0]).unwrap_err();
        assert!(matches!(err, Error::Frame { .. }));
    }

    #[test]
    fn reassembler_times_out_waiting_for_fin() {
        let mut reassembler = Reassembler::new(2048, Duration::from_millis(1));
        let segments = segment(&vec![0u8; 300], 249, 0, 2048).unwrap();
        reassembler.feed(&segments[0]).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        let err = reassembler.feed(&segments[1]).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }
}
