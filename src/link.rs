// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! FT3 data link framing: header + block-wise CRC, up to 16 blocks of 16 bytes.

use super::constant::{control, link_function, BLOCK_SIZE, LINK_HEADER_SIZE, MAX_USER_DATA, START1, START2};
use super::crc;
use super::error::Error;
use byteorder::{ByteOrder, LittleEndian};

/// A parsed data link frame: the control byte plus the user data it carried, with
/// addresses already checked against the expected pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub control: u8,
    pub user_data: Vec<u8>,
}

impl Frame {
    pub fn is_primary(&self) -> bool {
        self.control & control::PRM != 0
    }
    pub fn function_code(&self) -> u8 {
        self.control & control::FUNCTION_MASK
    }
}

fn build_header(dest: u16, src: u16, control_byte: u8, user_len: usize) -> Vec<u8> {
    let mut header = Vec::with_capacity(LINK_HEADER_SIZE);
    header.push(START1);
    header.push(START2);
    header.push((user_len + 5) as u8); // control + dest(2) + src(2) + user_len
    header.push(control_byte);
    let mut tmp = [0u8; 2];
    LittleEndian::write_u16(&mut tmp, dest);
    header.extend_from_slice(&tmp);
    LittleEndian::write_u16(&mut tmp, src);
    header.extend_from_slice(&tmp);
    let header_crc = crc::calculate(&header[2..8]);
    LittleEndian::write_u16(&mut tmp, header_crc);
    header.extend_from_slice(&tmp);
    header
}

/// Builds a complete FT3 frame carrying `user_data` (at most `MAX_USER_DATA` bytes),
/// block-encoding it into CRC-protected 16-byte chunks.
pub fn build_frame(dest: u16, src: u16, control_byte: u8, user_data: &[u8]) -> Result<Vec<u8>, Error> {
    if user_data.len() > MAX_USER_DATA {
        return Err(Error::Validation {
            message: format!("frame user data {} exceeds max {}", user_data.len(), MAX_USER_DATA),
        });
    }
    let mut frame = build_header(dest, src, control_byte, user_data.len());
    for chunk in user_data.chunks(BLOCK_SIZE) {
        frame.extend_from_slice(chunk);
        let block_crc = crc::calculate(chunk);
        let mut tmp = [0u8; 2];
        LittleEndian::write_u16(&mut tmp, block_crc);
        frame.extend_from_slice(&tmp);
    }
    Ok(frame)
}

pub fn build_reset_link(dest: u16, src: u16) -> Vec<u8> {
    let control_byte = control::PRM | link_function::RESET_LINK_STATES;
    build_header(dest, src, control_byte, 0)
}

pub fn build_request_link_status(dest: u16, src: u16) -> Vec<u8> {
    let control_byte = control::PRM | link_function::REQUEST_LINK_STATUS;
    build_header(dest, src, control_byte, 0)
}

/// Parses one complete FT3 frame out of `bytes`, which must start exactly at the first
/// start byte. Returns the parsed frame and the number of bytes consumed.
pub fn parse_frame(bytes: &[u8], expected_dest: u16, expected_src: u16) -> Result<(Frame, usize), Error> {
    if bytes.len() < LINK_HEADER_SIZE {
        return Err(Error::Frame {
            reason: format!("frame shorter than header: {} bytes", bytes.len()),
        });
    }
    if bytes[0] != START1 || bytes[1] != START2 {
        return Err(Error::Frame {
            reason: format!("bad start bytes {:#04x} {:#04x}", bytes[0], bytes[1]),
        });
    }
    let length = bytes[2] as usize;
    if length < 5 {
        return Err(Error::Frame {
            reason: format!("length byte {} too small to cover control+addresses", length),
        });
    }
    let user_len = length - 5;

    let header_crc_actual = LittleEndian::read_u16(&bytes[8..10]);
    let header_crc_expected = crc::calculate(&bytes[2..8]);
    if header_crc_actual != header_crc_expected {
        return Err(Error::Crc {
            expected: header_crc_expected,
            actual: header_crc_actual,
        });
    }

    let control_byte = bytes[3];
    let dest = LittleEndian::read_u16(&bytes[4..6]);
    let src = LittleEndian::read_u16(&bytes[6..8]);
    if dest != expected_dest || src != expected_src {
        return Err(Error::Frame {
            reason: format!(
                "address mismatch: got dest={} src={}, expected dest={} src={}",
                dest, src, expected_dest, expected_src
            ),
        });
    }

    let mut user_data = Vec::with_capacity(user_len);
    let mut offset = LINK_HEADER_SIZE;
    let mut remaining = user_len;
    while remaining > 0 {
        let block_len = remaining.min(BLOCK_SIZE);
        let block_end = offset + block_len;
        let crc_end = block_end + 2;
        if bytes.len() < crc_end {
            return Err(Error::Frame {
                reason: "frame truncated inside a data block".to_string(),
            });
        }
        let block_crc_actual = LittleEndian::read_u16(&bytes[block_end..crc_end]);
        let block_crc_expected = crc::calculate(&bytes[offset..block_end]);
        if block_crc_actual != block_crc_expected {
            return Err(Error::Crc {
                expected: block_crc_expected,
                actual: block_crc_actual,
            });
        }
        user_data.extend_from_slice(&bytes[offset..block_end]);
        offset = crc_end;
        remaining -= block_len;
    }

    Ok((
        Frame {
            control: control_byte,
            user_data,
        },
        offset,
    ))
}
