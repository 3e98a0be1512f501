//! Link reader task
//!
//! The only place in the engine that blocks on I/O. A dedicated thread
//! reads raw bytes from the transport, reassembles newline-delimited
//! records across partial reads, and hands parsed frames to the processing
//! engine through the non-blocking injector. A transport failure is
//! terminal for the ingestion session: it is logged once, the link state
//! flips to `Failed`, the thread exits and the transport is released. There
//! is no automatic reconnect.

use crate::monitor::FrameInjector;
use crate::transport::SharedTransport;
use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Pause between polls when the link is idle.
const IDLE_SLEEP: Duration = Duration::from_millis(2);

/// Read chunk size.
const READ_CHUNK: usize = 512;

/// Noise guard: a "line" that grows past this without a newline is garbage
/// (the longest valid wire line is well under 64 bytes) and gets discarded.
const MAX_LINE_LEN: usize = 4096;

/// Lifecycle of the ingestion link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Reader thread is consuming the transport.
    Running,
    /// Stopped on request; the transport was released cleanly.
    Closed,
    /// The transport failed; ingestion ended and will not be retried.
    Failed,
}

/// Handle to the background reader thread.
pub struct LinkReader {
    state: Arc<Mutex<LinkState>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl LinkReader {
    /// Spawn the reader thread over `transport`, producing into `injector`.
    pub fn spawn(transport: SharedTransport, injector: FrameInjector) -> crate::types::Result<LinkReader> {
        let state = Arc::new(Mutex::new(LinkState::Running));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = {
            let state = Arc::clone(&state);
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("link-reader".to_string())
                .spawn(move || read_loop(transport, injector, state, shutdown))?
        };

        Ok(LinkReader {
            state,
            shutdown,
            worker: Some(worker),
        })
    }

    pub fn state(&self) -> LinkState {
        *self.state.lock()
    }

    /// Request shutdown and join the reader. The transport reference held
    /// by the thread is dropped on exit.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for LinkReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop(
    transport: SharedTransport,
    injector: FrameInjector,
    state: Arc<Mutex<LinkState>>,
    shutdown: Arc<AtomicBool>,
) {
    info!("Link reader started");
    let mut carry: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    while !shutdown.load(Ordering::SeqCst) {
        let read = {
            let mut transport = transport.lock();
            transport.read(&mut chunk)
        };

        match read {
            Ok(0) => thread::sleep(IDLE_SLEEP),
            Ok(n) => {
                carry.extend_from_slice(&chunk[..n]);
                drain_lines(&mut carry, &injector);
                if carry.len() > MAX_LINE_LEN {
                    debug!("Discarding {} bytes of unterminated noise", carry.len());
                    carry.clear();
                }
            }
            Err(e) => {
                // sudden disconnect: surface once, stop for good
                error!("Link read failed, stopping ingestion: {}", e);
                *state.lock() = LinkState::Failed;
                return;
            }
        }
    }

    *state.lock() = LinkState::Closed;
    info!("Link reader stopped");
}

/// Split complete lines out of the carry buffer and inject each one.
/// Bytes after the last newline stay buffered for the next read.
fn drain_lines(carry: &mut Vec<u8>, injector: &FrameInjector) {
    while let Some(pos) = carry.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = carry.drain(..=pos).collect();
        // invalid UTF-8 is just noise on the wire
        if let Ok(text) = std::str::from_utf8(&line[..line.len() - 1]) {
            injector.inject_line(text);
        }
    }
}
