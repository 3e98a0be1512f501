//! Mock transport for testing

use super::Transport;
use crate::types::{Result, SnifferError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Scripted transport for unit and integration tests.
///
/// Reads drain a shared byte buffer filled by [`MockTransport::feed`];
/// writes accumulate and can be inspected with [`MockTransport::written`].
/// Clones share the same buffers, so a test can keep a handle while the
/// transport itself is owned by the link reader.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
}

#[derive(Default)]
struct MockInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    fail_reads: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue data to be returned by subsequent reads.
    pub fn feed(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Everything written so far.
    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    /// Make every following read fail, simulating a yanked cable.
    pub fn fail_reads(&self) {
        self.inner.lock().fail_reads = true;
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().read_buffer.len()
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.fail_reads {
            return Err(SnifferError::Transport("mock link failure".to_string()));
        }
        let n = inner.read_buffer.len().min(buffer.len());
        for slot in buffer.iter_mut().take(n) {
            *slot = inner.read_buffer.pop_front().unwrap();
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.inner.lock().write_buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn available(&mut self) -> Result<usize> {
        Ok(self.inner.lock().read_buffer.len())
    }
}
