// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Master coordinator: owns the connection, sequence counters and retry
//! policy, and exposes the higher-level read/control operations.

use super::application::{
    build_confirm, build_direct_operate_analog, build_direct_operate_crob, build_operate_crob,
    build_read_class, build_read_range, build_select_crob, parse_response, Response,
};
use super::config::Config;
use super::constant::{command_status, control, control_code, function, group, link_function};
use super::error::Error;
use super::link::{self, Frame};
use super::logging::{hex_dump, LogLevel, LogSink, NullSink};
use super::object::{AnalogOutputCommand, AnalogValue, Crob, Point};
use super::tf::{self, Reassembler};
use super::transport::Transport;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct ConnectionState {
    link_fcb: bool,
    app_seq: u8,
    transport_seq: u8,
}

impl ConnectionState {
    fn new() -> ConnectionState {
        ConnectionState {
            link_fcb: false,
            app_seq: 0,
            transport_seq: 0,
        }
    }

    fn next_app_seq(&mut self) -> u8 {
        let seq = self.app_seq;
        self.app_seq = self.app_seq.wrapping_add(1) & 0x0F;
        seq
    }

    fn next_transport_seq(&mut self) -> u8 {
        let seq = self.transport_seq;
        self.transport_seq = self.transport_seq.wrapping_add(1) & 0x3F;
        seq
    }
}

/// The result of a poll operation (any READ): the points decoded from the
/// response, plus the IIN the outstation attached to it.
#[derive(Debug, Clone)]
pub struct PollResult {
    pub points: Vec<Point>,
    pub device_restart: bool,
    pub need_time: bool,
}

/// A select-before-operate handle obtained from [`Master::select_crob`], valid
/// until `select_timeout_seconds` elapses or it is consumed by `operate_crob`.
pub struct SelectHandle {
    index: u32,
    crob: Crob,
    selected_at: Instant,
}

/// Coordinates a single DNP3 master-to-outstation session over one `Transport`.
pub struct Master<T: Transport> {
    config: Config,
    transport: T,
    sink: Box<dyn LogSink + Send + Sync>,
    state: Mutex<ConnectionState>,
}

impl<T: Transport> Master<T> {
    pub fn new(config: Config, transport: T) -> Result<Master<T>, Error> {
        let config = config.validate()?;
        Ok(Master {
            config,
            transport,
            sink: Box::new(NullSink),
            state: Mutex::new(ConnectionState::new()),
        })
    }

    pub fn with_log_sink(mut self, sink: Box<dyn LogSink + Send + Sync>) -> Master<T> {
        self.sink = sink;
        self
    }

    fn log(&self, level: LogLevel, message: &str) {
        if level >= self.config.log_level {
            self.sink.log(level, message);
        }
    }

    pub fn connect(&mut self) -> Result<(), Error> {
        self.transport.open()?;
        let mut state = self.state.lock().map_err(|_| Error::Lock)?;
        *state = ConnectionState::new();
        drop(state);
        self.reset_link()
    }

    pub fn close(&mut self) {
        self.transport.close();
    }

    fn deadline(&self, seconds: f64) -> Instant {
        Instant::now() + Duration::from_secs_f64(seconds)
    }

    fn reset_link(&mut self) -> Result<(), Error> {
        let frame = link::build_reset_link(self.config.outstation_address, self.config.master_address);
        if self.config.log_raw_frames {
            self.log(LogLevel::Debug, &format!("tx frame: {}", hex_dump(&frame)));
        }
        self.transport.write(&frame)?;
        let deadline = self.deadline(self.config.connect_timeout_seconds);
        let _ = self.read_link_frame(deadline)?;
        Ok(())
    }

    fn read_link_frame(&mut self, deadline: Instant) -> Result<Frame, Error> {
        let mut header = [0u8; 10];
        let mut filled = 0;
        while filled < header.len() {
            let n = self.transport.read(&mut header[filled..], deadline)?;
            filled += n;
        }
        let length = header[2] as usize;
        let user_len = length.saturating_sub(5);
        let block_count = if user_len == 0 { 0 } else { (user_len + 15) / 16 };
        let rest_len = user_len + block_count * 2;
        let mut rest = vec![0u8; rest_len];
        let mut filled = 0;
        while filled < rest.len() {
            let n = self.transport.read(&mut rest[filled..], deadline)?;
            filled += n;
        }
        let mut full_frame = header.to_vec();
        full_frame.extend_from_slice(&rest);
        if self.config.log_raw_frames {
            self.log(LogLevel::Debug, &format!("rx frame: {}", hex_dump(&full_frame)));
        }
        let (frame, _) = link::parse_frame(&full_frame, self.config.master_address, self.config.outstation_address)?;
        Ok(frame)
    }

    /// Sends one APDU (already carrying `seq` as its application sequence) to the
    /// outstation, transport-segmenting and link-framing it, then reassembles and
    /// returns the parsed response matching `seq`. Frames mismatched in sequence
    /// are discarded and the receive loop keeps reading until `response_timeout`.
    fn send_apdu(&mut self, seq: u8, apdu: &[u8]) -> Result<Response, Error> {
        let confirmed = self.config.confirm_required;
        let (link_control, transport_seq) = {
            let mut state = self.state.lock().map_err(|_| Error::Lock)?;
            let transport_seq = state.next_transport_seq();
            let mut ctrl = control::PRM;
            if confirmed {
                ctrl |= control::FCV | link_function::USER_DATA_CONFIRMED;
                let fcb = state.link_fcb;
                state.link_fcb = !fcb;
                if fcb {
                    ctrl |= control::FCB;
                }
            } else {
                ctrl |= link_function::UNCONFIRMED_USER_DATA;
            }
            (ctrl, transport_seq)
        };

        let segments = tf::segment(
            apdu,
            self.config.max_frame_size.saturating_sub(1),
            transport_seq,
            self.config.max_apdu_size,
        )?;
        for segment in &segments {
            let frame = link::build_frame(
                self.config.outstation_address,
                self.config.master_address,
                link_control,
                segment,
            )?;
            if self.config.log_raw_frames {
                self.log(LogLevel::Debug, &format!("tx frame: {}", hex_dump(&frame)));
            }
            self.transport.write(&frame)?;
        }

        let overall_deadline = self.deadline(self.config.response_timeout_seconds);
        let mut reassembler = Reassembler::new(
            self.config.max_apdu_size,
            Duration::from_secs_f64(self.config.response_timeout_seconds),
        );
        loop {
            if Instant::now() >= overall_deadline {
                return Err(Error::Timeout {
                    timeout_seconds: self.config.response_timeout_seconds,
                });
            }
            let frame = self.read_link_frame(overall_deadline)?;
            if frame.function_code() != link_function::USER_DATA_CONFIRMED
                && frame.function_code() != link_function::UNCONFIRMED_USER_DATA
            {
                continue;
            }
            let response_apdu = match reassembler.feed(&frame.user_data)? {
                Some(apdu) => apdu,
                None => continue,
            };
            let response = parse_response(&response_apdu)?;
            if response.seq != seq {
                self.log(
                    LogLevel::Warning,
                    &format!("discarding response with mismatched sequence: expected {} got {}", seq, response.seq),
                );
                continue;
            }
            if response.con {
                let confirm = build_confirm(response.seq, false);
                self.send_fire_and_forget(&confirm)?;
            }
            return Ok(response);
        }
    }

    /// Sends an UNCONFIRMED_USER_DATA fragment with no response expected (used for
    /// application-layer CONFIRMs). Never carries FCV/FCB: those only apply to
    /// confirmed data-link transfers.
    fn send_fire_and_forget(&mut self, apdu: &[u8]) -> Result<(), Error> {
        let transport_seq = {
            let mut state = self.state.lock().map_err(|_| Error::Lock)?;
            state.next_transport_seq()
        };
        let link_control = control::PRM | link_function::UNCONFIRMED_USER_DATA;
        let segments = tf::segment(
            apdu,
            self.config.max_frame_size.saturating_sub(1),
            transport_seq,
            self.config.max_apdu_size,
        )?;
        for segment in &segments {
            let frame = link::build_frame(
                self.config.outstation_address,
                self.config.master_address,
                link_control,
                segment,
            )?;
            self.transport.write(&frame)?;
        }
        Ok(())
    }

    /// Runs `operation` up to `max_retries + 1` times, retrying only on retriable
    /// errors and pausing `retry_delay_seconds` between attempts.
    fn with_retry<R>(&mut self, mut operation: impl FnMut(&mut Self) -> Result<R, Error>) -> Result<R, Error> {
        let mut attempt = 0;
        loop {
            match operation(self) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retriable() && attempt < self.config.max_retries => {
                    self.log(LogLevel::Warning, &format!("retrying after error: {}", err));
                    attempt += 1;
                    std::thread::sleep(Duration::from_secs_f64(self.config.retry_delay_seconds));
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn next_seq(&self) -> Result<u8, Error> {
        let mut state = self.state.lock().map_err(|_| Error::Lock)?;
        Ok(state.next_app_seq())
    }

    fn poll_from_response(response: Response) -> PollResult {
        PollResult {
            points: response.points,
            device_restart: response.iin.device_restart(),
            need_time: response.iin.need_time(),
        }
    }

    pub fn read_range(&mut self, grp: u8, variation: u8, start: u32, stop: u32) -> Result<PollResult, Error> {
        self.with_retry(move |master| {
            let seq = master.next_seq()?;
            let apdu = build_read_range(seq, grp, variation, start, stop)?;
            let response = master.send_apdu(seq, &apdu)?;
            Ok(Self::poll_from_response(response))
        })
    }

    /// READ of group 1, variation 0 ("any" — the outstation picks its default representation).
    pub fn read_binary_inputs(&mut self, start: u32, stop: u32) -> Result<PollResult, Error> {
        self.read_range(group::BINARY_INPUT, 0, start, stop)
    }

    /// READ of group 30, variation 0 ("any").
    pub fn read_analog_inputs(&mut self, start: u32, stop: u32) -> Result<PollResult, Error> {
        self.read_range(group::ANALOG_INPUT, 0, start, stop)
    }

    /// READ of group 20, variation 0 ("any").
    pub fn read_counters(&mut self, start: u32, stop: u32) -> Result<PollResult, Error> {
        self.read_range(group::COUNTER, 0, start, stop)
    }

    pub fn integrity_poll(&mut self) -> Result<PollResult, Error> {
        self.with_retry(|master| {
            let seq = master.next_seq()?;
            let apdu = build_read_class(seq, 1);
            let response = master.send_apdu(seq, &apdu)?;
            Ok(Self::poll_from_response(response))
        })
    }

    pub fn read_class(&mut self, class_variation: u8) -> Result<PollResult, Error> {
        self.with_retry(move |master| {
            let seq = master.next_seq()?;
            let apdu = build_read_class(seq, class_variation);
            let response = master.send_apdu(seq, &apdu)?;
            Ok(Self::poll_from_response(response))
        })
    }

    fn check_control_status(status: u8) -> Result<(), Error> {
        if status == command_status::SUCCESS {
            Ok(())
        } else {
            Err(Error::Control { status_code: status })
        }
    }

    /// Sends a single-CROB control request (DIRECT_OPERATE/SELECT/OPERATE) and
    /// returns the status byte echoed back for `index`.
    fn crob_command(&mut self, func: u8, index: u32, crob: Crob) -> Result<u8, Error> {
        self.with_retry(move |master| {
            let seq = master.next_seq()?;
            let crob_bytes = crob.encode();
            let apdu = match func {
                f if f == function::DIRECT_OPERATE => build_direct_operate_crob(seq, index, &crob_bytes)?,
                f if f == function::SELECT => build_select_crob(seq, index, &crob_bytes)?,
                f if f == function::OPERATE => build_operate_crob(seq, index, &crob_bytes)?,
                _ => unreachable!("crob_command is only called with control function codes"),
            };
            let response = master.send_apdu(seq, &apdu)?;
            echoed_control_status(&response, index)
        })
    }

    /// Issues a DIRECT_OPERATE on a single CROB, no select phase.
    pub fn direct_operate_crob(&mut self, index: u32, crob: Crob) -> Result<(), Error> {
        let status = self.crob_command(function::DIRECT_OPERATE, index, crob)?;
        Self::check_control_status(status)
    }

    /// DIRECT_OPERATE of a CROB LATCH_ON/LATCH_OFF. Returns `true` iff the
    /// echoed status byte is `SUCCESS`; only transport/protocol failures propagate
    /// as an error.
    pub fn direct_operate_binary(&mut self, index: u32, value: bool) -> Result<bool, Error> {
        let control_code = if value { control_code::LATCH_ON } else { control_code::LATCH_OFF };
        let crob = Crob {
            control_code,
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
            status: 0,
        };
        let status = self.crob_command(function::DIRECT_OPERATE, index, crob)?;
        Ok(status == command_status::SUCCESS)
    }

    /// DIRECT_OPERATE of a CROB PULSE_ON/PULSE_OFF.
    pub fn pulse_binary(&mut self, index: u32, on_time_ms: u32, off_time_ms: u32, count: u8, pulse_on: bool) -> Result<bool, Error> {
        let control_code = if pulse_on { control_code::PULSE_ON } else { control_code::PULSE_OFF };
        let crob = Crob {
            control_code,
            count,
            on_time_ms,
            off_time_ms,
            status: 0,
        };
        let status = self.crob_command(function::DIRECT_OPERATE, index, crob)?;
        Ok(status == command_status::SUCCESS)
    }

    /// SELECT then OPERATE the same CROB LATCH_ON/LATCH_OFF. Returns `true` iff
    /// both phases echo `SUCCESS`; a status mismatch from the device yields
    /// `Ok(false)`, but exceeding `select_timeout_seconds` between the two phases
    /// is reported as `Error::Control`.
    pub fn select_operate_binary(&mut self, index: u32, value: bool) -> Result<bool, Error> {
        let control_code = if value { control_code::LATCH_ON } else { control_code::LATCH_OFF };
        let crob = Crob {
            control_code,
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
            status: 0,
        };
        let select_status = self.crob_command(function::SELECT, index, crob)?;
        if select_status != command_status::SUCCESS {
            return Ok(false);
        }
        let selected_at = Instant::now();
        let operate_status = self.crob_command(function::OPERATE, index, crob)?;
        if selected_at.elapsed().as_secs_f64() > self.config.select_timeout_seconds {
            return Err(Error::Control {
                status_code: command_status::TIMEOUT,
            });
        }
        Ok(operate_status == command_status::SUCCESS)
    }

    /// Phase one of select-before-operate: SELECT a CROB, returning a handle that
    /// must be consumed by `operate_crob` within `select_timeout_seconds`.
    pub fn select_crob(&mut self, index: u32, crob: Crob) -> Result<SelectHandle, Error> {
        let status = self.crob_command(function::SELECT, index, crob)?;
        Self::check_control_status(status)?;
        Ok(SelectHandle {
            index,
            crob,
            selected_at: Instant::now(),
        })
    }

    /// Phase two of select-before-operate.
    pub fn operate_crob(&mut self, handle: SelectHandle) -> Result<(), Error> {
        let elapsed = handle.selected_at.elapsed().as_secs_f64();
        if elapsed > self.config.select_timeout_seconds {
            return Err(Error::Control {
                status_code: command_status::TIMEOUT,
            });
        }
        let status = self.crob_command(function::OPERATE, handle.index, handle.crob)?;
        Self::check_control_status(status)
    }

    /// DIRECT_OPERATE on an analog output; the wire variation (g41v1..v4) is
    /// chosen automatically from the value's Rust type. Returns `true` iff the
    /// echoed status byte is `SUCCESS`.
    pub fn direct_operate_analog(&mut self, index: u32, value: AnalogValue) -> Result<bool, Error> {
        let cmd = AnalogOutputCommand { value, status: 0 };
        let variation = cmd.variation();
        let status = self.with_retry(move |master| {
            let seq = master.next_seq()?;
            let apdu = build_direct_operate_analog(seq, variation, index, &cmd.encode())?;
            let response = master.send_apdu(seq, &apdu)?;
            echoed_control_status(&response, index)
        })?;
        Ok(status == command_status::SUCCESS)
    }
}

/// Finds the `ControlStatus` point echoed back for `index`. `parse_response`
/// already rejects IIN2 rejection bits, so reaching here means the request was
/// structurally accepted; a missing echo is itself a protocol violation.
fn echoed_control_status(response: &Response, index: u32) -> Result<u8, Error> {
    response
        .points
        .iter()
        .find_map(|p| match p {
            Point::ControlStatus { index: i, status } if *i == index => Some(*status),
            _ => None,
        })
        .ok_or_else(|| Error::Protocol {
            function_code: function::RESPONSE,
            iin: response.iin,
            reason: format!("response did not echo a control status object for index {}", index),
        })
}
