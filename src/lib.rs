//! # ESP-AT serial bridge
//!
//! Modem side of the ESP-AT dialect: a host talks AT commands over a serial port, the bridge joins a
//! WIFI network, listens on a TCP port and multiplexes up to 16 connections onto the serial link.
//!
//! Supported commands: `AT`, `AT+RST`, `AT+CWMODE=1`, `AT+CIPMUX=1`, `AT+CWJAP?`, `AT+CWJAP=`,
//! `AT+CIPSTA=`, `AT+CIPSERVER=`, `AT+CIPCLOSE=`, `AT+CIPSEND=`.
//!
//! ```text
//! host -> AT+CIPSERVER=1,8081
//! host <- OK
//!         (remote peer connects)
//! host <- 0,CONNECT
//!         (remote peer sends "hi")
//! host <- +IPD,0,2:hi
//! host <- OK
//! host -> AT+CIPSEND=0,5
//! host <- >
//! host -> hello
//! host <- SEND OK
//! ```
//!
//! Radio, TCP stack, storage and the diagnostics HTTP server are provided by the platform by
//! implementing [wifi::WifiStation], [stack::ServerStack], [storage::DurableStorage],
//! [storage::ScratchStorage] and [diagnostics::DiagnosticsServer].
#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]

extern crate alloc;

pub mod commands;
pub mod diagnostics;
mod dispatcher;
pub mod gateway;
pub mod history;
pub mod responses;
pub mod send;
pub mod stack;
pub mod storage;
pub mod wifi;

#[cfg(test)]
mod tests;
