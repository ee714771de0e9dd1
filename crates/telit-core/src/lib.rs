//! # telit-core
//!
//! Driver layer for Telit cellular modules spoken to over an AT command
//! channel. Layered bottom-up:
//!
//! - [`decoder`]: typed field extraction from AT responses
//! - [`engine`]: one command, one completion
//! - [`workflow`]: lazy steps, linear chains and deregister/act/restore
//! - [`registry`] and [`facility`]: named drivers, instance lifecycle and
//!   the per-capability front ends
//! - [`telit`]: the Telit command tables behind every facility
//! - [`modem`]: power-on sequences and facility bring-up per model
//! - [`presence`] and [`runtime`]: device-node tracking and the single core
//!   thread everything runs on
//!
//! [`sim::SimulatedModem`] stands in for a real channel in tests and in
//! `telit-agent --simulate`.

pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod facility;
pub mod modem;
pub mod notify;
pub mod presence;
pub mod registry;
pub mod runtime;
pub mod sim;
pub mod telit;
pub mod transport;
pub mod workflow;

pub use error::{DecodeError, Error, Result};
