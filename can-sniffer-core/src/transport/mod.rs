//! Transport layer for link I/O abstraction
//!
//! The engine never talks to `serialport` directly: the link reader, the
//! manual transmitter and playback retransmission all go through this trait,
//! which keeps the whole pipeline testable against a scripted mock.

use crate::parser;
use crate::types::Result;
use parking_lot::Mutex;
use std::sync::Arc;

mod mock;
mod serial;

pub use mock::MockTransport;
pub use serial::SerialTransport;

/// Byte-stream transport to the bus adapter.
pub trait Transport: Send {
    /// Read available data into `buffer`, returns number of bytes read.
    /// A read timeout is not an error; it returns 0.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from `buffer`, returns number of bytes written.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Number of bytes ready to read without blocking.
    fn available(&mut self) -> Result<usize> {
        Ok(0)
    }
}

/// A transport handle shareable between the reader thread and writers.
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Wrap a transport for shared use.
pub fn shared(transport: impl Transport + 'static) -> SharedTransport {
    Arc::new(Mutex::new(Box::new(transport)))
}

/// Outbound command writer over a shared transport.
///
/// Used for manual transmission and playback retransmit. Writes hold the
/// transport lock only for the duration of one command line.
#[derive(Clone)]
pub struct Transmitter {
    transport: SharedTransport,
}

impl Transmitter {
    pub fn new(transport: SharedTransport) -> Self {
        Transmitter { transport }
    }

    /// Encode and send one `SEND:<id>|<bytes>` command.
    pub fn send(&self, id: &str, payload: &[u8]) -> Result<()> {
        let line = parser::encode_send(id, payload);
        let bytes = line.as_bytes();

        let mut transport = self.transport.lock();
        let mut written = 0;
        while written < bytes.len() {
            written += transport.write(&bytes[written..])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transmitter_writes_encoded_command() {
        let mock = MockTransport::new();
        let tx = Transmitter::new(shared(mock.clone()));

        tx.send("541", &[0x1A, 0x00]).unwrap();
        tx.send("7DF", &[0x02]).unwrap();

        let written = String::from_utf8(mock.written()).unwrap();
        assert_eq!(written, "SEND:541|1A 00\nSEND:7DF|02\n");
    }
}
