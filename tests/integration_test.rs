// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

use dnp3_master::config::Config;
use dnp3_master::constant;
use dnp3_master::error::Error;
use dnp3_master::link;
use dnp3_master::logging::{LogLevel, LogSink};
use dnp3_master::master::Master;
use dnp3_master::object::{AnalogValue, Crob};
use dnp3_master::tf;
use dnp3_master::transport::mock::MockTransport;
use std::sync::Mutex;

fn link_ack(config: &Config) -> Vec<u8> {
    link::build_frame(
        config.master_address,
        config.outstation_address,
        constant::control::PRM | constant::link_function::ACK,
        &[],
    )
    .unwrap()
}

fn integrity_response_apdu() -> Vec<u8> {
    let mut apdu = vec![0xC0, 0x81, 0x00, 0x00];
    apdu.push(constant::group::BINARY_INPUT);
    apdu.push(2);
    apdu.push(constant::qualifier::RANGE_8BIT_START_STOP);
    apdu.push(0);
    apdu.push(1);
    apdu.push(0x81);
    apdu.push(0x00);
    apdu
}

/// Builds a RESPONSE apdu echoing a single CROB (g12v1) with the given status.
fn crob_echo_apdu(index: u8, status: u8) -> Vec<u8> {
    let mut apdu = vec![0xC0, 0x81, 0x00, 0x00, constant::group::CROB, 1, constant::qualifier::COUNT_8BIT_INDEXED, 1, index];
    let crob = Crob {
        control_code: constant::control_code::LATCH_ON,
        count: 1,
        on_time_ms: 0,
        off_time_ms: 0,
        status,
    };
    apdu.extend_from_slice(&crob.encode());
    apdu
}

/// Builds a RESPONSE apdu echoing a single analog output command (g41v1) with the given status.
fn analog_echo_apdu(index: u8, status: u8) -> Vec<u8> {
    use dnp3_master::object::AnalogOutputCommand;
    let cmd = AnalogOutputCommand {
        value: AnalogValue::I32(1000),
        status,
    };
    let mut apdu = vec![
        0xC0,
        0x81,
        0x00,
        0x00,
        constant::group::ANALOG_OUTPUT_COMMAND,
        cmd.variation(),
        constant::qualifier::COUNT_8BIT_INDEXED,
        1,
        index,
    ];
    apdu.extend_from_slice(&cmd.encode());
    apdu
}

fn queue_apdu(transport: &mut MockTransport, config: &Config, apdu: &[u8]) {
    let ctrl = constant::control::PRM | constant::control::FCV | constant::link_function::USER_DATA_CONFIRMED;
    for segment in tf::segment(apdu, 249, 0, config.max_apdu_size).unwrap() {
        let frame = link::build_frame(config.master_address, config.outstation_address, ctrl, &segment).unwrap();
        transport.push_inbound(&frame);
    }
}

#[test]
fn integrity_poll_round_trips_through_the_full_stack() {
    let config = Config {
        confirm_required: false,
        ..Config::default()
    };
    let mut transport = MockTransport::new();
    transport.push_inbound(&link_ack(&config));
    queue_apdu(&mut transport, &config, &integrity_response_apdu());

    let mut master = Master::new(config, transport).unwrap();
    master.connect().unwrap();
    let result = master.integrity_poll().unwrap();
    assert_eq!(result.points.len(), 2);
}

#[test]
fn corrupted_frame_surfaces_crc_error_without_retry() {
    let config = Config::default();

    let apdu = integrity_response_apdu();
    let ctrl = constant::control::PRM | constant::control::FCV | constant::link_function::USER_DATA_CONFIRMED;
    let segments = tf::segment(&apdu, 249, 0, config.max_apdu_size).unwrap();
    let mut frame = link::build_frame(config.master_address, config.outstation_address, ctrl, &segments[0]).unwrap();
    let last = frame.len() - 1;
    frame[last] ^= 0xFF;

    let mut transport = MockTransport::new();
    transport.push_inbound(&link_ack(&config));
    transport.push_inbound(&frame);

    let mut master = Master::new(config, transport).unwrap();
    master.connect().unwrap();
    let err = master.integrity_poll().unwrap_err();
    assert!(matches!(err, Error::Crc { .. }));
}

#[test]
fn direct_operate_crob_fails_on_nonzero_echoed_status() {
    let config = Config {
        confirm_required: false,
        ..Config::default()
    };
    let mut transport = MockTransport::new();
    transport.push_inbound(&link_ack(&config));
    queue_apdu(&mut transport, &config, &crob_echo_apdu(3, constant::command_status::NOT_SUPPORTED));

    let mut master = Master::new(config, transport).unwrap();
    master.connect().unwrap();
    let crob = Crob {
        control_code: constant::control_code::LATCH_ON,
        count: 1,
        on_time_ms: 0,
        off_time_ms: 0,
        status: 0,
    };
    let err = master.direct_operate_crob(3, crob).unwrap_err();
    assert!(matches!(err, Error::Control { status_code } if status_code == constant::command_status::NOT_SUPPORTED));
}

#[test]
fn direct_operate_crob_succeeds_on_zero_echoed_status() {
    let config = Config {
        confirm_required: false,
        ..Config::default()
    };
    let mut transport = MockTransport::new();
    transport.push_inbound(&link_ack(&config));
    queue_apdu(&mut transport, &config, &crob_echo_apdu(3, constant::command_status::SUCCESS));

    let mut master = Master::new(config, transport).unwrap();
    master.connect().unwrap();
    let crob = Crob {
        control_code: constant::control_code::LATCH_ON,
        count: 1,
        on_time_ms: 0,
        off_time_ms: 0,
        status: 0,
    };
    master.direct_operate_crob(3, crob).unwrap();
}

#[test]
fn direct_operate_analog_fails_on_nonzero_echoed_status() {
    let config = Config {
        confirm_required: false,
        ..Config::default()
    };
    let mut transport = MockTransport::new();
    transport.push_inbound(&link_ack(&config));
    queue_apdu(&mut transport, &config, &analog_echo_apdu(9, constant::command_status::OUT_OF_RANGE));

    let mut master = Master::new(config, transport).unwrap();
    master.connect().unwrap();
    let ok = master.direct_operate_analog(9, AnalogValue::I32(1000)).unwrap();
    assert!(!ok);
}

#[test]
fn direct_operate_analog_succeeds_on_zero_echoed_status() {
    let config = Config {
        confirm_required: false,
        ..Config::default()
    };
    let mut transport = MockTransport::new();
    transport.push_inbound(&link_ack(&config));
    queue_apdu(&mut transport, &config, &analog_echo_apdu(9, constant::command_status::SUCCESS));

    let mut master = Master::new(config, transport).unwrap();
    master.connect().unwrap();
    let ok = master.direct_operate_analog(9, AnalogValue::I32(1000)).unwrap();
    assert!(ok);
}

#[test]
fn log_sink_receives_debug_hex_dump_per_frame() {
    use std::sync::Arc;

    struct SharedSink(Arc<Mutex<Vec<LogLevel>>>);
    impl LogSink for SharedSink {
        fn log(&self, level: LogLevel, _message: &str) {
            self.0.lock().unwrap().push(level);
        }
    }

    let config = Config {
        confirm_required: false,
        log_raw_frames: true,
        log_level: LogLevel::Debug,
        ..Config::default()
    };
    let mut transport = MockTransport::new();
    transport.push_inbound(&link_ack(&config));
    queue_apdu(&mut transport, &config, &integrity_response_apdu());

    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut master = Master::new(config, transport).unwrap().with_log_sink(Box::new(SharedSink(calls.clone())));
    master.connect().unwrap();
    master.integrity_poll().unwrap();

    let recorded = calls.lock().unwrap();
    // reset-link tx + ack rx + read tx + response rx = 4 Debug-level hex dumps.
    assert_eq!(recorded.len(), 4);
    assert!(recorded.iter().all(|level| *level == LogLevel::Debug));
}
