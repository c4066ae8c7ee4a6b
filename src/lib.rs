// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # wrangler-headunit
//!
//! CAN transport, ISO-TP, a pub/sub frame database, OBD-II/GM-LAN/Jeep
//! protocol decoders, a factory-radio DTC responder, and an SDR receive
//! pipeline for a Jeep Wrangler head-unit retrofit.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wrangler_headunit::{can_transport::CanTransport, config::Config, frame_db::FrameDb};
//! use std::sync::Arc;
//!
//! fn main() -> wrangler_headunit::Result<()> {
//!     let db = Arc::new(FrameDb::new());
//!     let cfg = Config::default();
//!     let transport = CanTransport::new(cfg, db)?;
//!     transport.start("can0")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                     CAN path                                |
//! |  socket -> reader thread -> ISO-TP dispatch -> decoders      |
//! |                                   |                          |
//! |                                   v                          |
//! |                             frame database                  |
//! |                                   ^                          |
//! |                 DTC responder  ---+---  polling scheduler    |
//! +-------------------------------------------------------------+
//! |                     SDR path                                 |
//! |  RTL-SDR -> reader -> IQ queue -> processor -> audio queue   |
//! |                                       -> output -> audio sink |
//! +-------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`frame_db::FrameDb`] | Typed value store + frame cache |
//! | [`isotp::IsoTpEngine`] | ISO-TP segmentation/reassembly engine |
//! | [`can_transport::CanTransport`] | Per-interface raw-CAN socket lifecycle |
//! | [`dtc_responder::DtcResponder`] | Impersonates the factory radio module |
//! | [`sdr::supervisor::RadioSupervisor`] | Ties the SDR pipeline together |
//!
//! ## Modules Overview
//!
//! - [`frame_db`] - pub/sub frame and value store (C1)
//! - [`decoders`] - OBD-II, GM LAN, and Jeep Wrangler protocol decoders (C2)
//! - [`isotp`] - ISO-TP segmentation/reassembly engine (C3)
//! - [`can_transport`] - raw-CAN socket transport (C4)
//! - [`scheduler`] - OBD polling and periodic task scheduler (C5)
//! - [`dtc_responder`] - factory radio impersonation (C6)
//! - [`sdr`] - RTL-SDR source, sample queues, radio supervisor (C7, C9, C10)
//! - [`demod`] - IQ-to-audio demodulator pipeline (C8)
//! - [`external`] - narrow traits for out-of-scope collaborators
//! - [`persistence`] - property-file and stations-file formats

#[cfg(feature = "can")]
pub mod can_transport;
pub mod config;
pub mod decoders;
#[cfg(feature = "sdr")]
pub mod demod;
pub mod dtc_responder;
pub mod error;
pub mod external;
pub mod frame_db;
pub mod isotp;
pub mod persistence;
pub mod scheduler;
#[cfg(feature = "sdr")]
pub mod sdr;

pub use config::Config;
pub use error::{Error, Result};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
