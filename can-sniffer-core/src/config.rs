//! Engine configuration types
//!
//! Everything the processing engine needs arrives through this struct at
//! construction time; there is no process-wide mutable configuration.

use crate::filter::FilterSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the processing engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Ingestion queue capacity in frames.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Consumer sleep when the queue is empty, in milliseconds.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    /// Filter settings active at startup.
    #[serde(default)]
    pub filters: FilterSettings,
}

fn default_queue_capacity() -> usize {
    crate::channel::DEFAULT_CAPACITY
}

fn default_idle_poll_ms() -> u64 {
    2
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            queue_capacity: default_queue_capacity(),
            idle_poll_ms: default_idle_poll_ms(),
            filters: FilterSettings::default(),
        }
    }
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the ingestion queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Builder method: set the startup filter settings.
    pub fn with_filters(mut self, filters: FilterSettings) -> Self {
        self.filters = filters;
        self
    }
}
