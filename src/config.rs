// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Master configuration and validation.

use super::constant::{DEFAULT_PORT, MAX_ADDRESS, MAX_SEGMENT_PAYLOAD, MAX_USER_DATA};
use super::error::Error;
use super::logging::LogLevel;

/// Periodic class-poll intervals, in seconds; `0.0` disables polling that class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassPollIntervals {
    pub class1_seconds: f64,
    pub class2_seconds: f64,
    pub class3_seconds: f64,
}

impl Default for ClassPollIntervals {
    fn default() -> ClassPollIntervals {
        ClassPollIntervals {
            class1_seconds: 0.0,
            class2_seconds: 0.0,
            class3_seconds: 0.0,
        }
    }
}

/// Configuration for a `Master`. Plain public fields, constructed with struct
/// literal syntax (optionally starting from `Config::default()`) rather than a
/// builder; `validate()` is the only gate before a `Master` can be built.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub master_address: u16,
    pub outstation_address: u16,
    pub max_frame_size: usize,
    pub max_apdu_size: usize,
    pub response_timeout_seconds: f64,
    pub connect_timeout_seconds: f64,
    pub select_timeout_seconds: f64,
    pub max_retries: u32,
    pub retry_delay_seconds: f64,
    pub confirm_required: bool,
    pub class_poll_intervals: ClassPollIntervals,
    pub log_level: LogLevel,
    pub log_raw_frames: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            master_address: 1,
            outstation_address: 1024,
            max_frame_size: MAX_USER_DATA,
            max_apdu_size: 2048,
            response_timeout_seconds: 5.0,
            connect_timeout_seconds: 5.0,
            select_timeout_seconds: 5.0,
            max_retries: 2,
            retry_delay_seconds: 1.0,
            confirm_required: true,
            class_poll_intervals: ClassPollIntervals::default(),
            log_level: LogLevel::Info,
            log_raw_frames: false,
        }
    }
}

impl Config {
    /// Checks every field for internal consistency and wire-format limits,
    /// consuming and returning `self` so call sites can chain `Config { .. }.validate()?`.
    pub fn validate(mut self) -> Result<Config, Error> {
        self.host = self.host.trim().to_string();
        if self.host.is_empty() {
            return Err(Error::Validation {
                message: "host must not be empty".to_string(),
            });
        }
        if self.master_address > MAX_ADDRESS {
            return Err(Error::Validation {
                message: format!("master_address {} exceeds max {}", self.master_address, MAX_ADDRESS),
            });
        }
        if self.outstation_address > MAX_ADDRESS {
            return Err(Error::Validation {
                message: format!("outstation_address {} exceeds max {}", self.outstation_address, MAX_ADDRESS),
            });
        }
        if self.master_address == self.outstation_address {
            return Err(Error::Validation {
                message: "master_address and outstation_address must differ".to_string(),
            });
        }
        if self.max_frame_size == 0 || self.max_frame_size > MAX_USER_DATA {
            return Err(Error::Validation {
                message: format!("max_frame_size must be in 1..={}", MAX_USER_DATA),
            });
        }
        if self.max_apdu_size == 0 || self.max_apdu_size < MAX_SEGMENT_PAYLOAD {
            return Err(Error::Validation {
                message: format!("max_apdu_size must be at least {}", MAX_SEGMENT_PAYLOAD),
            });
        }
        if self.response_timeout_seconds <= 0.0 {
            return Err(Error::Validation {
                message: "response_timeout_seconds must be positive".to_string(),
            });
        }
        if self.connect_timeout_seconds <= 0.0 {
            return Err(Error::Validation {
                message: "connect_timeout_seconds must be positive".to_string(),
            });
        }
        if self.select_timeout_seconds <= 0.0 {
            return Err(Error::Validation {
                message: "select_timeout_seconds must be positive".to_string(),
            });
        }
        if self.retry_delay_seconds < 0.0 {
            return Err(Error::Validation {
                message: "retry_delay_seconds must not be negative".to_string(),
            });
        }
        let intervals = self.class_poll_intervals;
        if intervals.class1_seconds < 0.0 || intervals.class2_seconds < 0.0 || intervals.class3_seconds < 0.0 {
            return Err(Error::Validation {
                message: "class_poll_intervals must not be negative".to_string(),
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_empty_host() {
        let config = Config {
            host: "  ".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_address_over_max() {
        let config = Config {
            master_address: MAX_ADDRESS + 1,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_matching_addresses() {
        let config = Config {
            master_address: 5,
            outstation_address: 5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_oversized_frame() {
        let config = Config {
            max_frame_size: MAX_USER_DATA + 1,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_nonpositive_timeouts() {
        let config = Config {
            response_timeout_seconds: 0.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_trims_host() {
        let config = Config {
            host: "  10.0.0.1  ".to_string(),
            ..Config::default()
        };
        let validated = config.validate().unwrap();
        assert_eq!(validated.host, "10.0.0.1");
    }

    #[test]
    fn rejects_negative_retry_delay() {
        let config = Config {
            retry_delay_seconds: -1.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_negative_class_poll_interval() {
        let config = Config {
            class_poll_intervals: ClassPollIntervals {
                class1_seconds: -1.0,
                ..ClassPollIntervals::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
