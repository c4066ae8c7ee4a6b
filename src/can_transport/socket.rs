// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A raw-CAN socket, opened by interface name.
//!
//! Wraps [`socketcan::CanSocket`] and exposes a raw file descriptor for
//! registration with [`mio::Poll`] via [`mio::unix::SourceFd`]. Reads and
//! writes both go through this one socket; the reader thread owns it for
//! polling while [`RawCanSocket::try_clone`] hands a `dup(2)`'d descriptor
//! to callers that need to write from another thread (the ISO-TP send path
//! and flow-control replies), matching the "send is synchronous" design.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Socket, StandardId};

use crate::{Error, Result};

/// An open, non-blocking raw-CAN socket bound to one interface.
pub struct RawCanSocket {
    inner: CanSocket,
}

impl RawCanSocket {
    /// Open and bind to `interface` (e.g. `"can0"`), set non-blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceOpenFailed`] if the interface does not exist
    /// or the socket cannot be created.
    pub fn open(interface: &str) -> Result<Self> {
        let socket = CanSocket::open(interface)
            .map_err(|e| Error::DeviceOpenFailed(format!("{interface}: {e}")))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| Error::DeviceOpenFailed(format!("{interface}: set_nonblocking: {e}")))?;
        Ok(Self { inner: socket })
    }

    /// Duplicate the underlying file descriptor so a second handle can
    /// write independently of the reader thread's poll registration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if `dup(2)` fails.
    pub fn try_clone(&self) -> Result<Self> {
        let fd = self.inner.as_raw_fd();
        // SAFETY: `fd` is a valid, open file descriptor owned by `self.inner`
        // for the duration of this call; `dup` does not take ownership of it.
        let dup_fd: OwnedFd = unsafe {
            let raw = libc::dup(fd);
            if raw < 0 {
                return Err(Error::Io(std::io::Error::last_os_error()));
            }
            OwnedFd::from_raw_fd(raw)
        };
        let socket = CanSocket::from(dup_fd);
        Ok(Self { inner: socket })
    }

    /// Raw file descriptor, for `mio::unix::SourceFd` registration.
    #[must_use]
    pub fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }

    /// Read one frame. `Ok(None)` means the read would block; the caller
    /// should stop draining the socket for this poll cycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] for anything other than `WouldBlock`.
    pub fn read_frame(&self) -> Result<Option<(u32, Vec<u8>)>> {
        match self.inner.read_frame() {
            Ok(CanFrame::Data(frame)) => Ok(Some((frame.raw_id(), frame.data().to_vec()))),
            Ok(CanFrame::Remote(_) | CanFrame::Error(_)) => Ok(Some((0, Vec::new()))),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Write one frame. `data.len()` must be 0..=8; the DLC is forced to 8
    /// on the wire by right-padding in the caller (ISO-TP) or left as-is
    /// for shorter raw frames understood by the bus.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on write failure.
    pub fn write_frame(&self, can_id: u32, data: &[u8]) -> Result<()> {
        let id = StandardId::new(can_id as u16).ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("CAN id {can_id:#x} exceeds 11-bit standard range"),
            ))
        })?;
        let frame = CanFrame::new(id, data)
            .ok_or_else(|| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, "frame data too long")))?;
        self.inner.write_frame(&frame).map_err(Error::Io)
    }
}
