// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Application layer: request/response fragment construction and parsing.

use super::constant::{app_control, function, group, iin, qualifier};
use super::error::Error;
use super::object::{decode_one, decode_points, object_size, ObjectSize, Point};
use byteorder::{ByteOrder, LittleEndian};

/// Internal Indications, the two status bytes carried in every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Iin {
    pub iin1: u8,
    pub iin2: u8,
}

impl Iin {
    pub fn device_restart(self) -> bool {
        self.iin1 & iin::IIN1_DEVICE_RESTART != 0
    }
    pub fn need_time(self) -> bool {
        self.iin1 & iin::IIN1_NEED_TIME != 0
    }
    pub fn class_1_events(self) -> bool {
        self.iin1 & iin::IIN1_CLASS1_EVENTS != 0
    }
    pub fn class_2_events(self) -> bool {
        self.iin1 & iin::IIN1_CLASS2_EVENTS != 0
    }
    pub fn class_3_events(self) -> bool {
        self.iin1 & iin::IIN1_CLASS3_EVENTS != 0
    }
    pub fn no_func_code_support(self) -> bool {
        self.iin2 & iin::IIN2_NO_FUNC_CODE_SUPPORT != 0
    }
    pub fn object_unknown(self) -> bool {
        self.iin2 & iin::IIN2_OBJECT_UNKNOWN != 0
    }
    pub fn parameter_error(self) -> bool {
        self.iin2 & iin::IIN2_PARAMETER_ERROR != 0
    }
    pub fn already_executing(self) -> bool {
        self.iin2 & iin::IIN2_ALREADY_EXECUTING != 0
    }
    /// Any of the rejection bits that mean the request itself was bad, not just unanswerable.
    pub fn is_rejection(self) -> bool {
        self.no_func_code_support() || self.object_unknown() || self.parameter_error()
    }
}

/// Application control byte: `(FIR<<7)|(FIN<<6)|(CON<<5)|(UNS<<4)|(seq&0x0F)`.
pub fn encode_app_control(fir: bool, fin: bool, con: bool, uns: bool, seq: u8) -> u8 {
    let mut b = seq & app_control::SEQUENCE_MASK;
    if fir {
        b |= app_control::FIR;
    }
    if fin {
        b |= app_control::FIN;
    }
    if con {
        b |= app_control::CON;
    }
    if uns {
        b |= app_control::UNS;
    }
    b
}

/// A decoded response APDU fragment: control byte, function code, IIN (responses only) and points.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub seq: u8,
    pub fin: bool,
    pub con: bool,
    pub iin: Iin,
    pub points: Vec<Point>,
}

/// Builds a READ request for (group, variation) over an index range [start, stop], qualifier 0x00/0x01
/// chosen by whether the range fits in 8 bits.
pub fn build_read_range(seq: u8, grp: u8, variation: u8, start: u32, stop: u32) -> Result<Vec<u8>, Error> {
    if start > stop {
        return Err(Error::Validation {
            message: format!("read range start {} is greater than stop {}", start, stop),
        });
    }
    let mut apdu = vec![encode_app_control(true, true, false, false, seq), function::READ];
    push_range_header(&mut apdu, grp, variation, start, stop)?;
    Ok(apdu)
}

/// Builds a READ request for an entire class (group 60, variation 1-4), qualifier 0x06 (all objects).
pub fn build_read_class(seq: u8, class_variation: u8) -> Vec<u8> {
    vec![
        encode_app_control(true, true, false, false, seq),
        function::READ,
        group::CLASS_DATA,
        class_variation,
        qualifier::ALL_OBJECTS,
    ]
}

fn push_range_header(apdu: &mut Vec<u8>, grp: u8, variation: u8, start: u32, stop: u32) -> Result<(), Error> {
    apdu.push(grp);
    apdu.push(variation);
    if stop <= 0xFF {
        apdu.push(qualifier::RANGE_8BIT_START_STOP);
        apdu.push(start as u8);
        apdu.push(stop as u8);
    } else if stop <= 0xFFFF {
        apdu.push(qualifier::RANGE_16BIT_START_STOP);
        let mut tmp = [0u8; 2];
        LittleEndian::write_u16(&mut tmp, start as u16);
        apdu.extend_from_slice(&tmp);
        LittleEndian::write_u16(&mut tmp, stop as u16);
        apdu.extend_from_slice(&tmp);
    } else {
        return Err(Error::Validation {
            message: format!("range stop {} exceeds 16-bit addressing", stop),
        });
    }
    Ok(())
}

/// Builds a single-object request (DIRECT_OPERATE / SELECT / OPERATE / WRITE) using qualifier
/// 0x17 (count=1, 8-bit indexed). This qualifier's index field is one byte wide, so `index`
/// must fit in `u8`.
fn build_indexed_control(seq: u8, func: u8, grp: u8, variation: u8, index: u32, payload: &[u8]) -> Result<Vec<u8>, Error> {
    if index > 0xFF {
        return Err(Error::Validation {
            message: format!("index {} exceeds the 8-bit indexed qualifier's range", index),
        });
    }
    let mut apdu = vec![
        encode_app_control(true, true, false, false, seq),
        func,
        grp,
        variation,
        qualifier::COUNT_8BIT_INDEXED,
        1,
        index as u8,
    ];
    apdu.extend_from_slice(payload);
    Ok(apdu)
}

pub fn build_direct_operate_crob(seq: u8, index: u32, crob_bytes: &[u8]) -> Result<Vec<u8>, Error> {
    build_indexed_control(seq, function::DIRECT_OPERATE, group::CROB, 1, index, crob_bytes)
}

pub fn build_select_crob(seq: u8, index: u32, crob_bytes: &[u8]) -> Result<Vec<u8>, Error> {
    build_indexed_control(seq, function::SELECT, group::CROB, 1, index, crob_bytes)
}

pub fn build_operate_crob(seq: u8, index: u32, crob_bytes: &[u8]) -> Result<Vec<u8>, Error> {
    build_indexed_control(seq, function::OPERATE, group::CROB, 1, index, crob_bytes)
}

pub fn build_direct_operate_analog(seq: u8, variation: u8, index: u32, cmd_bytes: &[u8]) -> Result<Vec<u8>, Error> {
    build_indexed_control(seq, function::DIRECT_OPERATE, group::ANALOG_OUTPUT_COMMAND, variation, index, cmd_bytes)
}

/// Builds a WRITE request for a single indexed object (e.g. clearing a status byte).
pub fn build_write(seq: u8, grp: u8, variation: u8, index: u32, payload: &[u8]) -> Result<Vec<u8>, Error> {
    build_indexed_control(seq, function::WRITE, grp, variation, index, payload)
}

/// Builds an application-layer CONFIRM fragment (no object content).
pub fn build_confirm(seq: u8, uns: bool) -> Vec<u8> {
    vec![encode_app_control(true, true, false, uns, seq), function::CONFIRM]
}

/// Parses a complete (reassembled) response APDU fragment.
pub fn parse_response(apdu: &[u8]) -> Result<Response, Error> {
    if apdu.len() < 4 {
        return Err(Error::Frame {
            reason: format!("response APDU too short: {} bytes", apdu.len()),
        });
    }
    let control = apdu[0];
    let func = apdu[1];
    if func != function::RESPONSE && func != function::UNSOLICITED_RESPONSE {
        return Err(Error::Protocol {
            function_code: func,
            iin: Iin::default(),
            reason: "expected a RESPONSE or UNSOLICITED_RESPONSE function code".to_string(),
        });
    }
    let iin = Iin {
        iin1: apdu[2],
        iin2: apdu[3],
    };
    if iin.is_rejection() {
        return Err(Error::Protocol {
            function_code: func,
            iin,
            reason: "outstation rejected the request".to_string(),
        });
    }

    let seq = control & app_control::SEQUENCE_MASK;
    let fin = control & app_control::FIN != 0;
    let con = control & app_control::CON != 0;

    let mut points = Vec::new();
    let mut cursor = &apdu[4..];
    while !cursor.is_empty() {
        if cursor.len() < 2 {
            return Err(Error::Frame {
                reason: "truncated object header".to_string(),
            });
        }
        let grp = cursor[0];
        let variation = cursor[1];
        let qualifier_code = *cursor.get(2).ok_or_else(|| Error::Frame {
            reason: "truncated object header qualifier".to_string(),
        })?;

        if qualifier_code == qualifier::COUNT_8BIT_INDEXED {
            let count = *cursor.get(3).ok_or_else(|| Error::Frame {
                reason: "truncated indexed count".to_string(),
            })?;
            cursor = &cursor[4..];
            let width = match object_size(grp, variation)? {
                ObjectSize::Fixed(width) => width,
                _ => {
                    return Err(Error::Frame {
                        reason: "8-bit indexed qualifier requires a fixed-size object".to_string(),
                    })
                }
            };
            for _ in 0..count {
                if cursor.len() < 1 + width {
                    return Err(Error::Frame {
                        reason: format!("indexed object truncated: need {} got {}", 1 + width, cursor.len()),
                    });
                }
                let index = cursor[0] as u32;
                let obj = &cursor[1..1 + width];
                points.push(decode_one(grp, variation, index, obj)?);
                cursor = &cursor[1 + width..];
            }
            continue;
        }

        let (start, count, header_len) = parse_range_or_count(qualifier_code, &cursor[3..])?;
        cursor = &cursor[3 + header_len..];

        let size = object_size(grp, variation)?;
        let payload_len = match size {
            ObjectSize::Fixed(width) => width * count as usize,
            ObjectSize::Packed => ((count as usize) + 7) / 8,
            ObjectSize::Empty => 0,
        };
        if cursor.len() < payload_len {
            return Err(Error::Frame {
                reason: format!("object payload truncated: need {} got {}", payload_len, cursor.len()),
            });
        }
        let (payload, rest) = cursor.split_at(payload_len);
        points.extend(decode_points(grp, variation, start, count, payload)?);
        cursor = rest;
    }

    Ok(Response { seq, fin, con, iin, points })
}

/// Parses an object-header qualifier/range/count and returns (start_index, count, bytes consumed
/// after the qualifier byte).
fn parse_range_or_count(qualifier_code: u8, rest: &[u8]) -> Result<(u32, u32, usize), Error> {
    match qualifier_code {
        q if q == qualifier::RANGE_8BIT_START_STOP => {
            if rest.len() < 2 {
                return Err(Error::Frame {
                    reason: "truncated 8-bit range".to_string(),
                });
            }
            let start = rest[0] as u32;
            let stop = rest[1] as u32;
            Ok((start, stop.saturating_sub(start) + 1, 2))
        }
        q if q == qualifier::RANGE_16BIT_START_STOP => {
            if rest.len() < 4 {
                return Err(Error::Frame {
                    reason: "truncated 16-bit range".to_string(),
                });
            }
            let start = LittleEndian::read_u16(&rest[0..2]) as u32;
            let stop = LittleEndian::read_u16(&rest[2..4]) as u32;
            Ok((start, stop.saturating_sub(start) + 1, 4))
        }
        q if q == qualifier::ALL_OBJECTS => Ok((0, 0, 0)),
        q if q == qualifier::COUNT_8BIT => {
            if rest.is_empty() {
                return Err(Error::Frame {
                    reason: "truncated 8-bit count".to_string(),
                });
            }
            Ok((0, rest[0] as u32, 1))
        }
        _ => Err(Error::Frame {
            reason: format!("unsupported object qualifier {:#04x}", qualifier_code),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iin_rejection_bits() {
        let iin = Iin {
            iin1: 0,
            iin2: iin::IIN2_PARAMETER_ERROR,
        };
        assert!(iin.is_rejection());
        assert!(iin.parameter_error());
    }

    #[test]
    fn build_read_range_picks_8bit_qualifier() {
        let apdu = build_read_range(0, group::BINARY_INPUT, 2, 0, 10).unwrap();
        assert_eq!(apdu[4], qualifier::RANGE_8BIT_START_STOP);
    }

    #[test]
    fn build_read_range_picks_16bit_qualifier_above_255() {
        let apdu = build_read_range(0, group::ANALOG_INPUT, 1, 0, 300).unwrap();
        assert_eq!(apdu[4], qualifier::RANGE_16BIT_START_STOP);
    }

    #[test]
    fn read_range_rejects_inverted_range() {
        let err = build_read_range(0, group::BINARY_INPUT, 2, 10, 5).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn parse_response_round_trip_binary_input() {
        let mut apdu = vec![0xC0, function::RESPONSE, 0x00, 0x00];
        apdu.push(group::BINARY_INPUT);
        apdu.push(2); // with flags
        apdu.push(qualifier::RANGE_8BIT_START_STOP);
        apdu.push(0);
        apdu.push(1);
        apdu.push(0x81); // online + state
        apdu.push(0x01); // second point: online only, value false
        let response = parse_response(&apdu).unwrap();
        assert_eq!(response.points.len(), 2);
        match response.points[0] {
            Point::BinaryInput { index, value, .. } => {
                assert_eq!(index, 0);
                assert!(value);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn parse_response_rejects_on_iin2() {
        let apdu = vec![0xC0, function::RESPONSE, 0x00, iin::IIN2_OBJECT_UNKNOWN];
        let err = parse_response(&apdu).unwrap_err();
        match err {
            Error::Protocol { iin, .. } => assert!(iin.object_unknown()),
            _ => panic!("expected Error::Protocol"),
        }
    }

    #[test]
    fn direct_operate_crob_has_expected_header() {
        let crob_bytes = [0u8; 11];
        let apdu = build_direct_operate_crob(3, 7, &crob_bytes).unwrap();
        assert_eq!(apdu[1], function::DIRECT_OPERATE);
        assert_eq!(apdu[2], group::CROB);
        assert_eq!(apdu[4], qualifier::COUNT_8BIT_INDEXED);
        assert_eq!(apdu[6], 7); // index
    }

    #[test]
    fn build_indexed_control_rejects_index_above_8bit() {
        let err = build_direct_operate_crob(0, 256, &[0u8; 11]).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn parse_response_decodes_indexed_control_echo() {
        let crob = super::super::object::Crob {
            control_code: super::super::constant::control_code::LATCH_ON,
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
            status: super::super::constant::command_status::NOT_SUPPORTED,
        };
        let mut apdu = vec![0xC0, function::RESPONSE, 0x00, 0x00, group::CROB, 1, qualifier::COUNT_8BIT_INDEXED, 1, 5];
        apdu.extend_from_slice(&crob.encode());
        let response = parse_response(&apdu).unwrap();
        assert_eq!(
            response.points[0],
            Point::ControlStatus {
                index: 5,
                status: super::super::constant::command_status::NOT_SUPPORTED
            }
        );
    }
}
