//! Core types for the sniffer engine
//!
//! This module defines the frame value type that flows through the whole
//! pipeline (parser → ingestion queue → filters → aggregation) and the
//! engine-wide error enum.

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, SnifferError>;

/// Number of payload bytes a frame carries after normalization.
pub const PAYLOAD_LEN: usize = 8;

/// One decoded bus message as received over the serial link.
///
/// A `Frame` is an immutable value: it is built once by the parser (or by the
/// playback engine from a stored session entry) and never mutated afterwards.
/// The payload is always normalized to exactly [`PAYLOAD_LEN`] bytes; `dlc`
/// records the length the sender declared.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Source identifier as uppercase hex text (e.g. `"7DF"`, `"18DAF110"`).
    pub id: String,
    /// Remote transmission request flag.
    pub rtr: bool,
    /// Extended (29-bit) identifier flag.
    pub ide: bool,
    /// Declared payload length, validated to 0..=8.
    pub dlc: u8,
    /// Payload, zero-padded or truncated to exactly 8 bytes.
    pub payload: [u8; PAYLOAD_LEN],
    /// Seconds since the session origin (monotonic).
    pub capture_time: f64,
}

impl Frame {
    /// Payload rendered as space-joined two-hex-digit bytes,
    /// e.g. `"02 01 0C 00 00 00 00 00"`.
    pub fn payload_text(&self) -> String {
        let pairs: Vec<String> = self.payload.iter().map(|b| format!("{:02X}", b)).collect();
        pairs.join(" ")
    }

    /// True if every payload byte is zero.
    pub fn is_all_zero(&self) -> bool {
        self.payload.iter().all(|b| *b == 0)
    }
}

/// Errors surfaced by the sniffer engine.
///
/// Malformed wire lines are never errors: the parser drops them silently,
/// since noise on a live link is expected. These variants cover the failures
/// a caller can actually act on.
#[derive(Debug, Error)]
pub enum SnifferError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read session file '{path}': {source}")]
    SessionRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write session file '{path}': {source}")]
    SessionWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write label database '{path}': {source}")]
    LabelDbWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Link transport failed: {0}")]
    Transport(String),
}
