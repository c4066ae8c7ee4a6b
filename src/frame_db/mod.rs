// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pub/sub frame and value database (C1).
//!
//! [`FrameDb`] is the hub every other component publishes through or reads
//! from: the CAN reader calls [`FrameDb::save_frame`] for every received
//! frame, decoders call [`FrameDb::update_value`] from inside their
//! [`ProtocolDecoder::process_frame`] callback, and the polling scheduler
//! and DTC responder read back via [`FrameDb::value`] and
//! [`FrameDb::frames_since`]/[`FrameDb::values_since`].

mod store;
mod types;

pub use store::{FlowControlSender, FrameDb, NullSender, ProtocolDecoder};
pub use types::{CachedFrameEntry, CanFrame, FrameTag, Schema, Units, Value};
