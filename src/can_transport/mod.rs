// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Raw-CAN socket transport (C4): one reader thread multiplexing every
//! registered interface through `mio::Poll`, dispatching received frames
//! to the frame database and the ISO-TP engine, and exposing a synchronous
//! send path and per-interface statistics.

mod reader;
mod socket;
mod stats;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

pub use reader::DirectSender;
pub use socket::RawCanSocket;
pub use stats::InterfaceStats;

use crate::frame_db::FrameDb;
use crate::isotp::IsoTpEngine;
use crate::scheduler::Scheduler;
use crate::{Config, Result};

/// Owns the CAN reader thread and the shared subsystems it drives.
pub struct CanTransport {
    handle: reader::CanReaderHandle,
    db: Arc<FrameDb>,
    isotp: Arc<IsoTpEngine>,
    scheduler: Arc<Scheduler>,
    stats: Arc<Mutex<HashMap<String, Arc<InterfaceStats>>>>,
}

impl CanTransport {
    /// Build a transport wired to `db`. Spawns the reader thread
    /// immediately; interfaces are added with [`CanTransport::start`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the underlying `mio::Poll`/`Waker`
    /// cannot be created.
    pub fn new(config: Config, db: Arc<FrameDb>) -> Result<Self> {
        let isotp = Arc::new(IsoTpEngine::new());
        let scheduler = Arc::new(Scheduler::new(db.clone()));
        let (handle, stats) = reader::spawn(config, db.clone(), isotp.clone(), scheduler.clone())?;
        Ok(Self { handle, db, isotp, scheduler, stats })
    }

    /// Open and register `interface` with the reader's poll loop.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DeviceOpenFailed`] if the interface cannot
    /// be opened.
    pub fn start(&self, interface: &str) -> Result<()> {
        self.handle.add_interface(interface)
    }

    /// The frame database this transport publishes into.
    #[must_use]
    pub fn frame_db(&self) -> &Arc<FrameDb> {
        &self.db
    }

    /// The ISO-TP engine shared with the reader thread.
    #[must_use]
    pub fn isotp(&self) -> &Arc<IsoTpEngine> {
        &self.isotp
    }

    /// The OBD/periodic scheduler shared with the reader thread.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// A sender usable from any thread to write frames directly to a
    /// registered interface's socket.
    #[must_use]
    pub fn sender(&self) -> Arc<DirectSender> {
        self.handle.sender()
    }

    /// Current statistics for `interface`, if it has been started.
    #[must_use]
    pub fn stats(&self, interface: &str) -> Option<Arc<InterfaceStats>> {
        self.stats.lock().get(interface).cloned()
    }

    /// True while the reader thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// Stop the reader thread and join it.
    pub fn shutdown(&mut self) {
        self.handle.shutdown();
    }
}
