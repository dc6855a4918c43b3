// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Wire-level constants for the DNP3 data link, transport and application layers.

/// First start byte of every FT3 frame.
pub const START1: u8 = 0x05;
/// Second start byte of every FT3 frame.
pub const START2: u8 = 0x64;

/// Fixed 10-byte data-link header size (start x2, length, control, dest x2, src x2, crc x2).
pub const LINK_HEADER_SIZE: usize = 10;
/// Maximum user-data bytes carried by a single FT3 frame.
pub const MAX_USER_DATA: usize = 250;
/// Bytes per CRC-protected data block.
pub const BLOCK_SIZE: usize = 16;

/// Data link control byte bit masks.
pub mod control {
    pub const DIR: u8 = 0x80;
    pub const PRM: u8 = 0x40;
    pub const FCB: u8 = 0x20;
    pub const FCV: u8 = 0x10;
    pub const FUNCTION_MASK: u8 = 0x0F;
}

/// Data link layer function codes (lower nibble of the control byte).
pub mod link_function {
    pub const RESET_LINK_STATES: u8 = 0x00;
    pub const TEST_LINK_STATES: u8 = 0x02;
    pub const USER_DATA_CONFIRMED: u8 = 0x03;
    pub const UNCONFIRMED_USER_DATA: u8 = 0x04;
    pub const REQUEST_LINK_STATUS: u8 = 0x09;
    // secondary (outstation -> master) function codes
    pub const ACK: u8 = 0x00;
    pub const NACK: u8 = 0x01;
    pub const LINK_STATUS: u8 = 0x0B;
}

/// Transport-layer segment header bit masks.
pub mod transport_header {
    pub const FIR: u8 = 0x80;
    pub const FIN: u8 = 0x40;
    pub const SEQUENCE_MASK: u8 = 0x3F;
}

/// Maximum payload bytes carried by a single transport segment.
pub const MAX_SEGMENT_PAYLOAD: usize = 249;

/// Application control byte bit masks.
pub mod app_control {
    pub const FIR: u8 = 0x80;
    pub const FIN: u8 = 0x40;
    pub const CON: u8 = 0x20;
    pub const UNS: u8 = 0x10;
    pub const SEQUENCE_MASK: u8 = 0x0F;
}

/// Application layer function codes.
pub mod function {
    pub const CONFIRM: u8 = 0x00;
    pub const READ: u8 = 0x01;
    pub const WRITE: u8 = 0x02;
    pub const SELECT: u8 = 0x03;
    pub const OPERATE: u8 = 0x04;
    pub const DIRECT_OPERATE: u8 = 0x05;
    pub const DIRECT_OPERATE_NR: u8 = 0x06;
    pub const RESPONSE: u8 = 0x81;
    pub const UNSOLICITED_RESPONSE: u8 = 0x82;
}

/// Internal Indications bit masks, split across the two IIN bytes (iin1, iin2).
pub mod iin {
    pub const IIN1_DEVICE_RESTART: u8 = 0x80;
    pub const IIN1_NEED_TIME: u8 = 0x10;
    pub const IIN1_CLASS1_EVENTS: u8 = 0x02;
    pub const IIN1_CLASS2_EVENTS: u8 = 0x04;
    pub const IIN1_CLASS3_EVENTS: u8 = 0x08;

    pub const IIN2_NO_FUNC_CODE_SUPPORT: u8 = 0x01;
    pub const IIN2_OBJECT_UNKNOWN: u8 = 0x02;
    pub const IIN2_PARAMETER_ERROR: u8 = 0x04;
    pub const IIN2_ALREADY_EXECUTING: u8 = 0x10;
}

/// Object header qualifier codes.
pub mod qualifier {
    pub const RANGE_8BIT_START_STOP: u8 = 0x00;
    pub const RANGE_16BIT_START_STOP: u8 = 0x01;
    pub const ALL_OBJECTS: u8 = 0x06;
    pub const COUNT_8BIT: u8 = 0x07;
    pub const COUNT_8BIT_INDEXED: u8 = 0x17;
}

/// Control Relay Output Block control codes.
pub mod control_code {
    pub const NUL: u8 = 0x00;
    pub const PULSE_ON: u8 = 0x01;
    pub const PULSE_OFF: u8 = 0x02;
    pub const LATCH_ON: u8 = 0x03;
    pub const LATCH_OFF: u8 = 0x04;
}

/// CROB / Analog Output Command status codes echoed back in a response.
pub mod command_status {
    pub const SUCCESS: u8 = 0;
    pub const TIMEOUT: u8 = 1;
    pub const NO_SELECT: u8 = 2;
    pub const FORMAT_ERROR: u8 = 3;
    pub const NOT_SUPPORTED: u8 = 4;
    pub const ALREADY_ACTIVE: u8 = 5;
    pub const HARDWARE_ERROR: u8 = 6;
    pub const LOCAL: u8 = 7;
    pub const TOO_MANY_OPS: u8 = 8;
    pub const NOT_AUTHORIZED: u8 = 9;
    pub const AUTOMATION_INHIBIT: u8 = 10;
    pub const PROCESSING_LIMITED: u8 = 11;
    pub const OUT_OF_RANGE: u8 = 12;
    pub const NOT_EXECUTED: u8 = 126;
}

/// Object group identifiers.
pub mod group {
    pub const BINARY_INPUT: u8 = 1;
    pub const BINARY_INPUT_EVENT: u8 = 2;
    pub const BINARY_OUTPUT_STATUS: u8 = 10;
    pub const CROB: u8 = 12;
    pub const COUNTER: u8 = 20;
    pub const COUNTER_EVENT: u8 = 22;
    pub const ANALOG_INPUT: u8 = 30;
    pub const ANALOG_INPUT_EVENT: u8 = 32;
    pub const ANALOG_OUTPUT_STATUS: u8 = 40;
    pub const ANALOG_OUTPUT_COMMAND: u8 = 41;
    pub const CLASS_DATA: u8 = 60;
}

/// Default connect port for DNP3 over TCP.
pub const DEFAULT_PORT: u16 = 20000;
/// Highest address value allowed by the protocol; 65520-65535 are reserved broadcast addresses.
pub const MAX_ADDRESS: u16 = 65519;
