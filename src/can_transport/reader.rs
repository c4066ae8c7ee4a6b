// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The CAN reader thread: a `mio::Poll`-based event loop multiplexing every
//! registered interface, modeled on the teacher's `IoThread`/`IoCommand`
//! pattern but narrowed to the one concern this codebase needs —
//! registration and shutdown travel through a `Waker`-signaled command
//! channel, while sends go straight to the socket from any thread.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};

use crate::can_transport::socket::RawCanSocket;
use crate::can_transport::stats::InterfaceStats;
use crate::frame_db::{CanFrame, FlowControlSender, FrameDb};
use crate::isotp::IsoTpEngine;
use crate::scheduler::Scheduler;
use crate::{Config, Error, Result};

const WAKER_TOKEN: Token = Token(0);
const INTERFACE_TOKEN_START: usize = 1;
const MAX_EVENTS: usize = 64;

enum Command {
    AddInterface { name: String, socket: RawCanSocket },
    Shutdown,
}

/// A sender usable from any thread: writes directly to the registered
/// socket for `interface`, duplicated at registration time.
pub struct DirectSender {
    sockets: parking_lot::Mutex<HashMap<String, RawCanSocket>>,
}

impl DirectSender {
    fn new() -> Self {
        Self { sockets: parking_lot::Mutex::new(HashMap::new()) }
    }

    fn register(&self, interface: &str, socket: RawCanSocket) {
        self.sockets.lock().insert(interface.to_string(), socket);
    }
}

impl FlowControlSender for DirectSender {
    fn send_raw(&self, interface: &str, can_id: u32, data: &[u8]) -> bool {
        let sockets = self.sockets.lock();
        match sockets.get(interface) {
            Some(socket) => socket.write_frame(can_id, data).is_ok(),
            None => {
                log::warn!("can_transport: send_raw on unregistered interface {interface}");
                false
            }
        }
    }
}

/// Handle for registering interfaces with the running reader thread and
/// sending frames.
pub struct CanReaderHandle {
    cmd_tx: Sender<Command>,
    waker: Arc<Waker>,
    running: Arc<AtomicBool>,
    sender: Arc<DirectSender>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CanReaderHandle {
    /// Open `interface` and register it with the reader's poll loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceOpenFailed`] if the interface cannot be opened.
    pub fn add_interface(&self, interface: &str) -> Result<()> {
        let socket = RawCanSocket::open(interface)?;
        let send_handle = socket.try_clone()?;
        self.sender.register(interface, send_handle);
        self.cmd_tx
            .send(Command::AddInterface { name: interface.to_string(), socket })
            .map_err(|_| Error::DeviceOpenFailed("reader thread stopped".to_string()))?;
        self.waker.wake().map_err(Error::Io)?;
        Ok(())
    }

    /// The shared sender this reader's sockets were registered under.
    #[must_use]
    pub fn sender(&self) -> Arc<DirectSender> {
        self.sender.clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Signal the reader thread to stop and join it.
    pub fn shutdown(&mut self) {
        if !self.is_running() {
            return;
        }
        let _ = self.cmd_tx.send(Command::Shutdown);
        let _ = self.waker.wake();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CanReaderHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct InterfaceEntry {
    name: String,
    socket: RawCanSocket,
    stats: Arc<InterfaceStats>,
}

struct CanReader {
    poll: Poll,
    cmd_rx: Receiver<Command>,
    interfaces: HashMap<Token, InterfaceEntry>,
    next_token: usize,
    running: Arc<AtomicBool>,
    db: Arc<FrameDb>,
    isotp: Arc<IsoTpEngine>,
    scheduler: Arc<Scheduler>,
    sender: Arc<DirectSender>,
    stats: Arc<parking_lot::Mutex<HashMap<String, Arc<InterfaceStats>>>>,
    config: Config,
}

impl CanReader {
    fn run(mut self) {
        let mut events = Events::with_capacity(MAX_EVENTS);
        let start = Instant::now();
        let mut last_second_tick = start.elapsed().as_secs();

        while self.running.load(Ordering::Relaxed) {
            if let Err(e) = self.poll.poll(&mut events, Some(self.config.can_poll_timeout)) {
                if e.kind() != io::ErrorKind::Interrupted {
                    log::warn!("can_transport: poll error: {e}");
                }
                continue;
            }

            let now_secs = start.elapsed().as_secs();
            if now_secs != last_second_tick {
                last_second_tick = now_secs;
                for entry in self.interfaces.values() {
                    entry.stats.tick_second();
                }
            }

            for event in events.iter() {
                match event.token() {
                    WAKER_TOKEN => self.handle_commands(),
                    token => {
                        if event.is_readable() {
                            self.handle_readable(token, start.elapsed().as_secs_f64());
                        }
                    }
                }
            }

            let now = start.elapsed().as_secs_f64();
            self.scheduler.tick(now, self.sender.as_ref());
            self.isotp.session_tick(now, self.config.isotp_session_timeout.as_secs_f64());
        }
    }

    fn handle_commands(&mut self) {
        loop {
            match self.cmd_rx.try_recv() {
                Ok(Command::AddInterface { name, socket }) => self.add_interface(name, socket),
                Ok(Command::Shutdown) => {
                    self.running.store(false, Ordering::Relaxed);
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running.store(false, Ordering::Relaxed);
                    break;
                }
            }
        }
    }

    fn add_interface(&mut self, name: String, socket: RawCanSocket) {
        let token = Token(self.next_token);
        self.next_token += 1;
        let fd = socket.as_raw_fd();
        if let Err(e) = self.poll.registry().register(&mut SourceFd(&fd), token, Interest::READABLE) {
            log::warn!("can_transport: failed to register {name}: {e}");
            return;
        }
        let stats = Arc::new(InterfaceStats::new());
        self.stats.lock().insert(name.clone(), stats.clone());
        self.interfaces.insert(token, InterfaceEntry { name, socket, stats });
    }

    fn handle_readable(&mut self, token: Token, now: f64) {
        let Some(entry) = self.interfaces.get(&token) else { return };
        loop {
            match entry.socket.read_frame() {
                Ok(Some((can_id, data))) => {
                    entry.stats.record_frame(now);
                    let frame = CanFrame::new(can_id, data.clone());
                    if let Err(e) = self.db.save_frame(&entry.name, frame, now, self.sender.as_ref()) {
                        log::warn!("can_transport: save_frame failed on {}: {e}", entry.name);
                    }
                    self.isotp.on_frame(self.sender.as_ref(), &entry.name, can_id, &data, now);
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("can_transport: read error on {}: {e}, marking dead", entry.name);
                    break;
                }
            }
        }
    }
}

/// Spawn the CAN reader thread.
///
/// # Errors
///
/// Returns [`Error::Io`] if the `mio::Poll` or `Waker` cannot be created.
pub fn spawn(
    config: Config,
    db: Arc<FrameDb>,
    isotp: Arc<IsoTpEngine>,
    scheduler: Arc<Scheduler>,
) -> Result<(CanReaderHandle, Arc<parking_lot::Mutex<HashMap<String, Arc<InterfaceStats>>>>)> {
    let poll = Poll::new().map_err(Error::Io)?;
    let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN).map_err(Error::Io)?);
    let (cmd_tx, cmd_rx) = channel();
    let running = Arc::new(AtomicBool::new(true));
    let sender = Arc::new(DirectSender::new());
    let stats = Arc::new(parking_lot::Mutex::new(HashMap::new()));

    let reader = CanReader {
        poll,
        cmd_rx,
        interfaces: HashMap::new(),
        next_token: INTERFACE_TOKEN_START,
        running: running.clone(),
        db,
        isotp,
        scheduler,
        sender: sender.clone(),
        stats: stats.clone(),
        config,
    };

    let thread_handle = thread::Builder::new()
        .name("can-reader".to_string())
        .spawn(move || reader.run())
        .map_err(Error::Io)?;

    Ok((
        CanReaderHandle {
            cmd_tx,
            waker,
            running,
            sender,
            thread_handle: Some(thread_handle),
        },
        stats,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_sender_reports_failure_for_unknown_interface() {
        let sender = DirectSender::new();
        assert!(!sender.send_raw("can9", 0x100, &[1, 2, 3]));
    }
}
