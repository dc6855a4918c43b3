// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Group/variation identity and typed object encode/decode.
//!
//! Byte layouts for groups 30/32/40/41 (analog input/event, analog output
//! status/command) follow the textual value-width description in the system
//! spec (i32/i16/float32/float64, each with a leading flag or status byte)
//! rather than the literal per-variation size list, which does not divide
//! evenly across four value widths. See DESIGN.md.

use super::constant::group;
use super::error::Error;
use byteorder::{ByteOrder, LittleEndian};

/// Quality flags byte shared by most static/event object variations.
///
/// Bit meanings vary slightly between binary and analog points; accessors are
/// provided for both and callers use whichever applies to the point type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags(pub u8);

impl Flags {
    pub fn online(self) -> bool {
        self.0 & 0x01 != 0
    }
    pub fn restart(self) -> bool {
        self.0 & 0x02 != 0
    }
    pub fn comm_lost(self) -> bool {
        self.0 & 0x04 != 0
    }
    pub fn remote_forced(self) -> bool {
        self.0 & 0x08 != 0
    }
    pub fn local_forced(self) -> bool {
        self.0 & 0x10 != 0
    }
    /// Chatter filter (binary points) / rollover (counters) / over-range (analog).
    pub fn chatter_filter_or_over_range(self) -> bool {
        self.0 & 0x20 != 0
    }
    /// Reserved (binary) / discontinuity (counters) / reference error (analog).
    pub fn reference_err_or_discontinuity(self) -> bool {
        self.0 & 0x40 != 0
    }
    /// The point's logical state, valid only for binary variations that pack it here.
    pub fn state(self) -> bool {
        self.0 & 0x80 != 0
    }
}

/// Width of an analog value, shared by groups 30, 32, 40 and 41.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnalogValue {
    I32(i32),
    I16(i16),
    F32(f32),
    F64(f64),
}

impl AnalogValue {
    fn encoded_len(self) -> usize {
        match self {
            AnalogValue::I32(_) => 4,
            AnalogValue::I16(_) => 2,
            AnalogValue::F32(_) => 4,
            AnalogValue::F64(_) => 8,
        }
    }

    fn write(self, buf: &mut Vec<u8>) {
        match self {
            AnalogValue::I32(v) => {
                let mut tmp = [0u8; 4];
                LittleEndian::write_i32(&mut tmp, v);
                buf.extend_from_slice(&tmp);
            }
            AnalogValue::I16(v) => {
                let mut tmp = [0u8; 2];
                LittleEndian::write_i16(&mut tmp, v);
                buf.extend_from_slice(&tmp);
            }
            AnalogValue::F32(v) => {
                let mut tmp = [0u8; 4];
                LittleEndian::write_f32(&mut tmp, v);
                buf.extend_from_slice(&tmp);
            }
            AnalogValue::F64(v) => {
                let mut tmp = [0u8; 8];
                LittleEndian::write_f64(&mut tmp, v);
                buf.extend_from_slice(&tmp);
            }
        }
    }
}

/// A single decoded point, tagged by the group/variation family it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Point {
    BinaryInput {
        index: u32,
        flags: Flags,
        value: bool,
    },
    BinaryInputEvent {
        index: u32,
        flags: Flags,
        value: bool,
        time_ms: Option<u64>,
    },
    BinaryOutputStatus {
        index: u32,
        flags: Flags,
        value: bool,
    },
    Counter {
        index: u32,
        flags: Flags,
        value: u32,
    },
    CounterEvent {
        index: u32,
        flags: Flags,
        value: u32,
    },
    AnalogInput {
        index: u32,
        flags: Flags,
        value: AnalogValue,
    },
    AnalogInputEvent {
        index: u32,
        flags: Flags,
        value: AnalogValue,
    },
    AnalogOutputStatus {
        index: u32,
        flags: Flags,
        value: AnalogValue,
    },
    /// Echoed status byte from a CROB (g12v1) or analog output command (g41v1-4).
    ControlStatus { index: u32, status: u8 },
}

/// Per-variation fixed object size in bytes. `Packed` variations occupy
/// `ceil(count/8)` bytes for the whole range rather than a fixed size per index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectSize {
    Fixed(usize),
    Packed,
    /// Class-data objects (group 60) carry no data at all.
    Empty,
}

/// Returns the per-object size for a supported (group, variation), or an
/// object error carrying (group, variation) if unsupported.
pub fn object_size(grp: u8, variation: u8) -> Result<ObjectSize, Error> {
    use group::*;
    let size = match (grp, variation) {
        (g, 1) if g == BINARY_INPUT => ObjectSize::Packed,
        (g, 2) if g == BINARY_INPUT => ObjectSize::Fixed(1),
        (g, 1) if g == BINARY_INPUT_EVENT => ObjectSize::Fixed(1),
        (g, 2) if g == BINARY_INPUT_EVENT => ObjectSize::Fixed(7),
        (g, 1) if g == BINARY_OUTPUT_STATUS => ObjectSize::Packed,
        (g, 2) if g == BINARY_OUTPUT_STATUS => ObjectSize::Fixed(1),
        (g, 1) if g == CROB => ObjectSize::Fixed(11),
        (g, 1) if g == COUNTER => ObjectSize::Fixed(5),
        (g, 2) if g == COUNTER => ObjectSize::Fixed(3),
        (g, 5) if g == COUNTER => ObjectSize::Fixed(4),
        (g, 6) if g == COUNTER => ObjectSize::Fixed(2),
        (g, 1) if g == COUNTER_EVENT => ObjectSize::Fixed(5),
        (g, 2) if g == COUNTER_EVENT => ObjectSize::Fixed(3),
        (g, 1) if g == ANALOG_INPUT => ObjectSize::Fixed(5), // i32 + flag
        (g, 2) if g == ANALOG_INPUT => ObjectSize::Fixed(3), // i16 + flag
        (g, 3) if g == ANALOG_INPUT => ObjectSize::Fixed(4), // i32, no flag
        (g, 4) if g == ANALOG_INPUT => ObjectSize::Fixed(2), // i16, no flag
        (g, 5) if g == ANALOG_INPUT => ObjectSize::Fixed(5), // f32 + flag
        (g, 6) if g == ANALOG_INPUT => ObjectSize::Fixed(9), // f64 + flag
        (g, 1) if g == ANALOG_INPUT_EVENT => ObjectSize::Fixed(5), // i32 + flag
        (g, 2) if g == ANALOG_INPUT_EVENT => ObjectSize::Fixed(3), // i16 + flag
        (g, 3) if g == ANALOG_INPUT_EVENT => ObjectSize::Fixed(5), // f32 + flag
        (g, 4) if g == ANALOG_INPUT_EVENT => ObjectSize::Fixed(9), // f64 + flag
        (g, 1) if g == ANALOG_OUTPUT_STATUS => ObjectSize::Fixed(5),
        (g, 2) if g == ANALOG_OUTPUT_STATUS => ObjectSize::Fixed(3),
        (g, 3) if g == ANALOG_OUTPUT_STATUS => ObjectSize::Fixed(5),
        (g, 4) if g == ANALOG_OUTPUT_STATUS => ObjectSize::Fixed(9),
        (g, 1) if g == ANALOG_OUTPUT_COMMAND => ObjectSize::Fixed(5),
        (g, 2) if g == ANALOG_OUTPUT_COMMAND => ObjectSize::Fixed(3),
        (g, 3) if g == ANALOG_OUTPUT_COMMAND => ObjectSize::Fixed(5),
        (g, 4) if g == ANALOG_OUTPUT_COMMAND => ObjectSize::Fixed(9),
        (g, v) if g == CLASS_DATA && (1..=4).contains(&v) => ObjectSize::Empty,
        _ => {
            return Err(Error::Object {
                group: grp,
                variation,
                reason: "unsupported group/variation".to_string(),
            })
        }
    };
    Ok(size)
}

fn analog_width(grp: u8, variation: u8) -> (usize, bool) {
    // (value width in bytes, is_float)
    match (grp, variation) {
        (_, 1) => (4, false),
        (_, 2) => (2, false),
        (_, 3) if grp == group::ANALOG_INPUT => (4, false),
        (_, 4) if grp == group::ANALOG_INPUT => (2, false),
        (_, 3) => (4, true),
        (_, 4) => (8, true),
        (_, 5) => (4, true),
        (_, 6) => (8, true),
        _ => (4, false),
    }
}

fn read_analog_value(grp: u8, variation: u8, data: &[u8]) -> AnalogValue {
    let (width, is_float) = analog_width(grp, variation);
    match (width, is_float) {
        (4, false) => AnalogValue::I32(LittleEndian::read_i32(data)),
        (2, false) => AnalogValue::I16(LittleEndian::read_i16(data)),
        (4, true) => AnalogValue::F32(LittleEndian::read_f32(data)),
        (8, true) => AnalogValue::F64(LittleEndian::read_f64(data)),
        _ => unreachable!("analog_width only returns the four combinations above"),
    }
}

/// Decodes `count` consecutive objects of (`grp`, `variation`) starting at
/// `start_index`, reading from `payload`. `payload` must contain exactly the
/// bytes needed (the caller slices it from the object block using `object_size`).
pub fn decode_points(
    grp: u8,
    variation: u8,
    start_index: u32,
    count: u32,
    payload: &[u8],
) -> Result<Vec<Point>, Error> {
    let size = object_size(grp, variation)?;
    let mut points = Vec::with_capacity(count as usize);

    match size {
        ObjectSize::Packed => {
            let needed = ((count as usize) + 7) / 8;
            if payload.len() < needed {
                return Err(Error::Object {
                    group: grp,
                    variation,
                    reason: format!("packed payload too short: need {} got {}", needed, payload.len()),
                });
            }
            for i in 0..count {
                let byte = payload[(i / 8) as usize];
                let bit = i % 8;
                let value = byte & (1 << bit) != 0;
                let index = start_index + i;
                points.push(match grp {
                    g if g == group::BINARY_INPUT => Point::BinaryInput {
                        index,
                        flags: Flags(0),
                        value,
                    },
                    g if g == group::BINARY_OUTPUT_STATUS => Point::BinaryOutputStatus {
                        index,
                        flags: Flags(0),
                        value,
                    },
                    _ => {
                        return Err(Error::Object {
                            group: grp,
                            variation,
                            reason: "packed variation not recognized".to_string(),
                        })
                    }
                });
            }
        }
        ObjectSize::Empty => {
            // Class data carries no per-point payload; nothing to decode.
        }
        ObjectSize::Fixed(width) => {
            let needed = width * count as usize;
            if payload.len() < needed {
                return Err(Error::Object {
                    group: grp,
                    variation,
                    reason: format!("payload too short: need {} got {}", needed, payload.len()),
                });
            }
            for i in 0..count {
                let index = start_index + i;
                let obj = &payload[(i as usize) * width..(i as usize + 1) * width];
                points.push(decode_one(grp, variation, index, obj)?);
            }
        }
    }

    Ok(points)
}

pub(crate) fn decode_one(grp: u8, variation: u8, index: u32, obj: &[u8]) -> Result<Point, Error> {
    use group::*;
    let point = match grp {
        g if g == BINARY_INPUT => {
            let flags = Flags(obj[0]);
            Point::BinaryInput {
                index,
                flags,
                value: flags.state(),
            }
        }
        g if g == BINARY_INPUT_EVENT => {
            let flags = Flags(obj[0]);
            let time_ms = if variation == 2 {
                let mut tmp = [0u8; 8];
                tmp[..6].copy_from_slice(&obj[1..7]);
                Some(LittleEndian::read_u64(&tmp))
            } else {
                None
            };
            Point::BinaryInputEvent {
                index,
                flags,
                value: flags.state(),
                time_ms,
            }
        }
        g if g == BINARY_OUTPUT_STATUS => {
            let flags = Flags(obj[0]);
            Point::BinaryOutputStatus {
                index,
                flags,
                value: flags.state(),
            }
        }
        g if g == COUNTER => {
            let (flags, value) = if variation == 5 || variation == 6 {
                (Flags(0), read_counter_value(variation, obj))
            } else {
                (Flags(obj[0]), read_counter_value(variation, &obj[1..]))
            };
            Point::Counter { index, flags, value }
        }
        g if g == COUNTER_EVENT => {
            let flags = Flags(obj[0]);
            let value = read_counter_value(variation, &obj[1..]);
            Point::CounterEvent { index, flags, value }
        }
        g if g == ANALOG_INPUT => {
            let (flags, value_bytes) = if variation == 3 || variation == 4 {
                (Flags(0), obj)
            } else {
                (Flags(obj[0]), &obj[1..])
            };
            Point::AnalogInput {
                index,
                flags,
                value: read_analog_value(grp, variation, value_bytes),
            }
        }
        g if g == ANALOG_INPUT_EVENT => {
            let flags = Flags(obj[0]);
            Point::AnalogInputEvent {
                index,
                flags,
                value: read_analog_value(grp, variation, &obj[1..]),
            }
        }
        g if g == ANALOG_OUTPUT_STATUS => {
            let flags = Flags(obj[0]);
            Point::AnalogOutputStatus {
                index,
                flags,
                value: read_analog_value(grp, variation, &obj[1..]),
            }
        }
        g if g == CROB => Point::ControlStatus {
            index,
            status: Crob::decode(obj)?.status,
        },
        g if g == ANALOG_OUTPUT_COMMAND => Point::ControlStatus {
            index,
            status: AnalogOutputCommand::decode(variation, obj)?.status,
        },
        _ => {
            return Err(Error::Object {
                group: grp,
                variation,
                reason: "no point decoder for this group".to_string(),
            })
        }
    };
    Ok(point)
}

fn read_counter_value(variation: u8, data: &[u8]) -> u32 {
    match variation {
        2 | 6 => LittleEndian::read_u16(data) as u32,
        _ => LittleEndian::read_u32(data),
    }
}

/// Control Relay Output Block (g12v1), 11 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crob {
    pub control_code: u8,
    pub count: u8,
    pub on_time_ms: u32,
    pub off_time_ms: u32,
    pub status: u8,
}

impl Crob {
    pub const ENCODED_LEN: usize = 11;

    pub fn encode(self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[0] = self.control_code;
        buf[1] = self.count;
        LittleEndian::write_u32(&mut buf[2..6], self.on_time_ms);
        LittleEndian::write_u32(&mut buf[6..10], self.off_time_ms);
        buf[10] = self.status;
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Crob, Error> {
        if data.len() != Self::ENCODED_LEN {
            return Err(Error::Object {
                group: group::CROB,
                variation: 1,
                reason: format!("expected {} bytes, got {}", Self::ENCODED_LEN, data.len()),
            });
        }
        Ok(Crob {
            control_code: data[0],
            count: data[1],
            on_time_ms: LittleEndian::read_u32(&data[2..6]),
            off_time_ms: LittleEndian::read_u32(&data[6..10]),
            status: data[10],
        })
    }
}

/// Analog Output Command (g41v1..v4): a value of the variation's width plus a status byte.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogOutputCommand {
    pub value: AnalogValue,
    pub status: u8,
}

impl AnalogOutputCommand {
    /// Picks a variation for `value`: 1 for i32, 2 for i16, 3 for f32, 4 for f64.
    pub fn variation(self) -> u8 {
        match self.value {
            AnalogValue::I32(_) => 1,
            AnalogValue::I16(_) => 2,
            AnalogValue::F32(_) => 3,
            AnalogValue::F64(_) => 4,
        }
    }

    pub fn encode(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.value.encoded_len() + 1);
        self.value.write(&mut buf);
        buf.push(self.status);
        buf
    }

    pub fn decode(variation: u8, data: &[u8]) -> Result<AnalogOutputCommand, Error> {
        let (width, is_float) = analog_width(group::ANALOG_OUTPUT_COMMAND, variation);
        if data.len() != width + 1 {
            return Err(Error::Object {
                group: group::ANALOG_OUTPUT_COMMAND,
                variation,
                reason: format!("expected {} bytes, got {}", width + 1, data.len()),
            });
        }
        let value = match (width, is_float) {
            (4, false) => AnalogValue::I32(LittleEndian::read_i32(&data[..4])),
            (2, false) => AnalogValue::I16(LittleEndian::read_i16(&data[..2])),
            (4, true) => AnalogValue::F32(LittleEndian::read_f32(&data[..4])),
            (8, true) => AnalogValue::F64(LittleEndian::read_f64(&data[..8])),
            _ => unreachable!(),
        };
        Ok(AnalogOutputCommand {
            value,
            status: data[width],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crob_round_trip() {
        let crob = Crob {
            control_code: super::super::constant::control_code::LATCH_ON,
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
            status: 0,
        };
        let encoded = crob.encode();
        assert_eq!(encoded.len(), Crob::ENCODED_LEN);
        let decoded = Crob::decode(&encoded).unwrap();
        assert_eq!(decoded, crob);
    }

    #[test]
    fn analog_output_command_round_trip_each_width() {
        for value in [
            AnalogValue::I32(-12345),
            AnalogValue::I16(321),
            AnalogValue::F32(3.25),
            AnalogValue::F64(-9.5),
        ] {
            let cmd = AnalogOutputCommand { value, status: 0 };
            let variation = cmd.variation();
            let encoded = cmd.encode();
            let decoded = AnalogOutputCommand::decode(variation, &encoded).unwrap();
            assert_eq!(decoded, cmd);
        }
    }

    #[test]
    fn binary_input_packed_decode() {
        // 10 points, bits LSB-first: 0b00000101 0b00000001 -> indices 0,2,8 set
        let payload = [0b0000_0101u8, 0b0000_0001u8];
        let points = decode_points(group::BINARY_INPUT, 1, 0, 10, &payload).unwrap();
        assert_eq!(points.len(), 10);
        let set: Vec<u32> = points
            .iter()
            .filter_map(|p| match p {
                Point::BinaryInput { index, value: true, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(set, vec![0, 2, 8]);
    }

    #[test]
    fn binary_input_with_flag_decode() {
        let payload = [0b1000_0001u8]; // online + state set
        let points = decode_points(group::BINARY_INPUT, 2, 5, 1, &payload).unwrap();
        match points[0] {
            Point::BinaryInput { index, flags, value } => {
                assert_eq!(index, 5);
                assert!(flags.online());
                assert!(value);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn counter_without_flag_decode() {
        let mut payload = [0u8; 4];
        LittleEndian::write_u32(&mut payload, 42);
        let points = decode_points(group::COUNTER, 5, 0, 1, &payload).unwrap();
        match points[0] {
            Point::Counter { value, .. } => assert_eq!(value, 42),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unsupported_variation_is_object_error() {
        let err = object_size(group::COUNTER, 99).unwrap_err();
        match err {
            Error::Object { group, variation, .. } => {
                assert_eq!(group, group::COUNTER);
                assert_eq!(variation, 99);
            }
            _ => panic!("expected Error::Object"),
        }
    }

    #[test]
    fn class_data_has_no_payload() {
        assert_eq!(object_size(group::CLASS_DATA, 1).unwrap(), ObjectSize::Empty);
        let points = decode_points(group::CLASS_DATA, 1, 0, 0, &[]).unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn crob_echo_decodes_to_control_status() {
        let crob = Crob {
            control_code: super::super::constant::control_code::LATCH_ON,
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
            status: super::super::constant::command_status::NOT_SUPPORTED,
        };
        let points = decode_points(group::CROB, 1, 9, 1, &crob.encode()).unwrap();
        assert_eq!(
            points[0],
            Point::ControlStatus {
                index: 9,
                status: super::super::constant::command_status::NOT_SUPPORTED
            }
        );
    }

    #[test]
    fn analog_output_command_echo_decodes_to_control_status() {
        let cmd = AnalogOutputCommand {
            value: AnalogValue::I32(42),
            status: super::super::constant::command_status::OUT_OF_RANGE,
        };
        let points = decode_points(group::ANALOG_OUTPUT_COMMAND, cmd.variation(), 3, 1, &cmd.encode()).unwrap();
        assert_eq!(
            points[0],
            Point::ControlStatus {
                index: 3,
                status: super::super::constant::command_status::OUT_OF_RANGE
            }
        );
    }
}
