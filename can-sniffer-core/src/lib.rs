//! CAN Sniffer Engine Library
//!
//! A reusable engine for monitoring, recording and replaying CAN traffic
//! arriving as framed text lines over a serial link.
//!
//! # Architecture
//!
//! The engine is a single pipeline:
//!
//! ```text
//! serial link → LinkReader → FrameQueue → filters → AggregationStore
//!                                ↑                        + session log
//!                         PlaybackEngine
//! ```
//!
//! - The link reader is the only task that blocks on I/O.
//! - One processing thread consumes the bounded queue and is the only
//!   writer of aggregation state; live and replayed frames share the queue.
//! - Presentation reads copy-out snapshots; it never holds engine locks.
//!
//! The library does NOT:
//! - Render anything (tables, colors, change animation are the caller's)
//! - Enumerate serial ports or own configuration files
//!
//! All higher-level functionality is in the application layer
//! (can-sniffer-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use can_sniffer_core::config::MonitorConfig;
//! use can_sniffer_core::ingest::LinkReader;
//! use can_sniffer_core::monitor::Monitor;
//! use can_sniffer_core::transport::{shared, SerialTransport};
//!
//! let monitor = Monitor::start(MonitorConfig::default()).unwrap();
//! let port = SerialTransport::open("/dev/ttyUSB0", 115200).unwrap();
//! let reader = LinkReader::spawn(shared(port), monitor.injector()).unwrap();
//!
//! // ... later: inspect monitor.snapshot(), export the session ...
//! drop(reader);
//! ```

// Public modules
pub mod aggregate;
pub mod channel;
pub mod config;
pub mod filter;
pub mod ingest;
pub mod labels;
pub mod monitor;
pub mod parser;
pub mod playback;
pub mod session;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use aggregate::{AggregatedSource, AggregationStore};
pub use config::MonitorConfig;
pub use filter::FilterSettings;
pub use ingest::{LinkReader, LinkState};
pub use monitor::{FrameInjector, Monitor};
pub use playback::{PlaybackEngine, PlaybackSession, PlaybackState};
pub use session::SessionEntry;
pub use types::{Frame, Result, SnifferError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
