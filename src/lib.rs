// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! A master-station driver for DNP3 (IEEE 1815) over TCP.
//!
//! # Examples
//! ```no_run
//! # use dnp3_master::{config::Config, master::Master, tcp::TcpTransport};
//! # use std::time::Duration;
//! # fn main() {
//!     let config = Config {
//!         host: "127.0.0.1".to_string(),
//!         ..Config::default()
//!     }
//!     .validate()
//!     .unwrap();
//!
//!     let transport = TcpTransport::new(&config.host, config.port, Duration::from_secs(5));
//!     let mut master = match Master::new(config, transport) {
//!         Ok(m) => m,
//!         Err(e) => {
//!             println!("{:?}", e.to_string());
//!             return;
//!         }
//!     };
//!
//!     master.connect().unwrap();
//!     match master.integrity_poll() {
//!         Ok(result) => println!("points: {:?}", result.points),
//!         Err(e) => println!("error: {}", e),
//!     }
//! # }
//! ```
pub mod application;
pub mod constant;
pub mod config;
pub mod crc;
pub mod error;
pub mod link;
pub mod logging;
pub mod master;
pub mod object;
pub mod tcp;
pub mod tf;
pub mod transport;
