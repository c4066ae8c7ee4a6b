// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OBD-II, GM LAN, and Jeep Wrangler protocol decoders (C2).
//!
//! Each decoder receives `(database, interface, frame, wall_time)` and
//! publishes zero or more value updates; all three are stateless except
//! the OBD decoder's partial-reassembly table and the Jeep decoder's VIN
//! accumulator.

mod gmlan;
mod jeep;
mod obd2;

pub use gmlan::GmLanDecoder;
pub use jeep::JeepDecoder;
pub use obd2::Obd2Decoder;
