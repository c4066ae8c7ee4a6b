// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-wide error type.
//!
//! Protocol-layer anomalies (malformed flow control, sequence breaks, short
//! SDR reads) are not modeled as variants here: they are logged and the
//! offending session/frame is dropped in place, per the error handling
//! policy in the component design. This enum covers setup-time and
//! programmer-error conditions that are meant to propagate.

/// Errors returned by this crate's public API.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Device errors
    // ========================================================================
    /// A CAN socket, RTL-SDR device, or serial/I2C bus could not be opened.
    DeviceOpenFailed(String),
    /// An I/O error occurred with an underlying cause.
    Io(std::io::Error),

    // ========================================================================
    // Protocol / programmer errors
    // ========================================================================
    /// `save_frame` was called with a blank interface name.
    BlankInterface,
    /// An ISO-TP send payload exceeded the 4096-byte limit.
    PayloadTooLarge(usize),
    /// A value update named a schema key that was never registered.
    SchemaUnknown(String),
    /// A schema key was registered with a duplicate, non-idempotent definition.
    DuplicateSchema(String),

    // ========================================================================
    // Resource errors
    // ========================================================================
    /// The frame cache or a sample queue could not grow.
    ResourceExhausted(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DeviceOpenFailed(msg) => write!(f, "device open failed: {msg}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::BlankInterface => write!(f, "interface name is blank"),
            Error::PayloadTooLarge(len) => write!(f, "ISO-TP payload too large: {len} bytes"),
            Error::SchemaUnknown(key) => write!(f, "unregistered schema key: {key}"),
            Error::DuplicateSchema(key) => write!(f, "duplicate schema registration: {key}"),
            Error::ResourceExhausted(msg) => write!(f, "resource exhausted: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Convenient alias for this crate's fallible operations.
pub type Result<T> = core::result::Result<T, Error>;
