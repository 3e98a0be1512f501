//! The processing engine
//!
//! One consumer thread drains the ingestion queue, runs the filter pipeline
//! and mutates the aggregation store, the only writer that state ever has.
//! Live traffic and playback both produce into the same queue through a
//! [`FrameInjector`], which is what keeps aggregation single-writer without
//! any lock juggling between the two paths.

use crate::aggregate::{AggregatedSource, AggregationStore};
use crate::channel::FrameQueue;
use crate::config::MonitorConfig;
use crate::filter::{FilterControl, FilterSettings};
use crate::parser;
use crate::session::{self, SessionEntry};
use crate::types::{Frame, Result};
use log::{debug, info};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Restartable monotonic session origin.
///
/// Capture times are seconds since this origin; `restart` is invoked
/// together with a full statistics reset so a fresh recording starts at
/// zero.
pub struct SessionClock {
    origin: Mutex<Instant>,
}

impl SessionClock {
    pub fn new() -> Self {
        SessionClock {
            origin: Mutex::new(Instant::now()),
        }
    }

    /// Seconds elapsed since the session origin.
    pub fn now(&self) -> f64 {
        self.origin.lock().elapsed().as_secs_f64()
    }

    pub fn restart(&self) {
        *self.origin.lock() = Instant::now();
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer handle into the processing engine.
///
/// Cloneable; the link reader and the playback engine each hold one. All
/// injection is non-blocking (queue overflow drops, see
/// [`crate::channel::FrameQueue`]).
#[derive(Clone)]
pub struct FrameInjector {
    queue: Arc<FrameQueue>,
    clock: Arc<SessionClock>,
}

impl FrameInjector {
    pub fn new(queue: Arc<FrameQueue>, clock: Arc<SessionClock>) -> Self {
        FrameInjector { queue, clock }
    }

    /// Current session time, for stamping frames built outside the parser.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Offer an already-built frame.
    pub fn inject(&self, frame: Frame) -> bool {
        self.queue.push(frame)
    }

    /// Parse one wire line, stamp it with the session time and enqueue it.
    /// Returns `false` for unrecognized/malformed lines and queue overflow.
    pub fn inject_line(&self, line: &str) -> bool {
        match parser::parse_line(line, self.clock.now()) {
            Some(frame) => self.queue.push(frame),
            None => false,
        }
    }
}

/// The engine: queue, filters, store, clock and the consumer thread.
pub struct Monitor {
    queue: Arc<FrameQueue>,
    store: Arc<Mutex<AggregationStore>>,
    filters: Arc<FilterControl>,
    clock: Arc<SessionClock>,
    shutdown: Arc<AtomicBool>,
    accepted: Arc<AtomicU64>,
    rejected: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl Monitor {
    /// Build the engine and spawn the processing thread.
    pub fn start(config: MonitorConfig) -> Result<Monitor> {
        let queue = Arc::new(FrameQueue::new(config.queue_capacity));
        let store = Arc::new(Mutex::new(AggregationStore::new()));
        let filters = Arc::new(FilterControl::new(config.filters.clone()));
        let clock = Arc::new(SessionClock::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let accepted = Arc::new(AtomicU64::new(0));
        let rejected = Arc::new(AtomicU64::new(0));

        let worker = {
            let queue = Arc::clone(&queue);
            let store = Arc::clone(&store);
            let filters = Arc::clone(&filters);
            let shutdown = Arc::clone(&shutdown);
            let accepted = Arc::clone(&accepted);
            let rejected = Arc::clone(&rejected);
            let idle_poll = Duration::from_millis(config.idle_poll_ms.max(1));

            thread::Builder::new()
                .name("frame-processor".to_string())
                .spawn(move || {
                    process_loop(queue, store, filters, shutdown, accepted, rejected, idle_poll);
                })?
        };

        info!(
            "Monitor started (queue capacity {})",
            config.queue_capacity.max(1)
        );

        Ok(Monitor {
            queue,
            store,
            filters,
            clock,
            shutdown,
            accepted,
            rejected,
            worker: Some(worker),
        })
    }

    /// Producer handle shared by live ingestion and playback.
    pub fn injector(&self) -> FrameInjector {
        FrameInjector::new(Arc::clone(&self.queue), Arc::clone(&self.clock))
    }

    /// Replace the active filter settings as one atomic snapshot.
    pub fn set_filters(&self, settings: FilterSettings) {
        self.filters.replace(settings);
    }

    pub fn filters(&self) -> Arc<FilterSettings> {
        self.filters.load()
    }

    /// Copy-out of the live per-id state. No lock is held beyond the copy.
    pub fn snapshot(&self) -> Vec<AggregatedSource> {
        self.store.lock().snapshot()
    }

    /// Copy of the session log, in arrival order.
    pub fn session_entries(&self) -> Vec<SessionEntry> {
        self.store.lock().session_log().to_vec()
    }

    /// Export the session log to `path` (atomic replace).
    pub fn export_session(&self, path: &Path) -> Result<()> {
        let entries = self.session_entries();
        session::export_session(path, &entries)
    }

    /// Clear the live view; with `also_statistics` also drop the session
    /// log and restart the elapsed-time origin.
    pub fn reset(&self, also_statistics: bool) {
        if also_statistics {
            self.clock.restart();
        }
        self.store.lock().reset(also_statistics);
        debug!("Monitor reset (also_statistics={})", also_statistics);
    }

    /// Frames that passed the filter pipeline.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Frames the filter pipeline rejected.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Frames lost to ingestion queue overflow.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Ask the consumer to drain the queue and exit, then join it.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn process_loop(
    queue: Arc<FrameQueue>,
    store: Arc<Mutex<AggregationStore>>,
    filters: Arc<FilterControl>,
    shutdown: Arc<AtomicBool>,
    accepted: Arc<AtomicU64>,
    rejected: Arc<AtomicU64>,
    idle_poll: Duration,
) {
    debug!("Frame processor running");
    loop {
        match queue.pop() {
            Some(frame) => {
                let settings = filters.load();
                let mut store = store.lock();
                if settings.accepts(&frame, &store) {
                    store.apply(frame);
                    accepted.fetch_add(1, Ordering::Relaxed);
                } else {
                    rejected.fetch_add(1, Ordering::Relaxed);
                }
            }
            None => {
                // shutdown only once the queue is drained
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                thread::sleep(idle_poll);
            }
        }
    }
    debug!("Frame processor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_until(monitor: &Monitor, processed: u64) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while monitor.accepted() + monitor.rejected() < processed {
            assert!(Instant::now() < deadline, "processor did not catch up");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn live_lines_flow_into_aggregation() {
        let monitor = Monitor::start(MonitorConfig::default()).unwrap();
        let injector = monitor.injector();

        assert!(injector.inject_line("FRAME:7DF|0|0|8|02 01 0C 00 00 00 00 00"));
        assert!(injector.inject_line("FRAME:7DF|0|0|8|02 01 0D 00 00 00 00 00"));
        wait_until(&monitor, 2);

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.len(), 1);
        let source = &snapshot[0];
        assert_eq!(source.last_frame.id, "7DF");
        assert_eq!(source.last_frame.payload[2], 0x0D);
        assert!(source.last_change[2].is_some());
        for i in [0usize, 1, 3, 4, 5, 6, 7] {
            assert!(source.last_change[i].is_none());
        }
    }

    #[test]
    fn malformed_lines_never_reach_the_store() {
        let monitor = Monitor::start(MonitorConfig::default()).unwrap();
        let injector = monitor.injector();

        assert!(!injector.inject_line("FRAME:123|0|0|9|01 02 03 04 05 06 07 08 09"));
        assert!(!injector.inject_line("noise"));
        assert!(injector.inject_line("FRAME:123|0|0|1|AA"));
        wait_until(&monitor, 1);

        assert_eq!(monitor.snapshot().len(), 1);
        assert_eq!(monitor.session_entries().len(), 1);
    }

    #[test]
    fn filter_rejection_leaves_log_and_state_untouched() {
        let mut settings = FilterSettings::default();
        settings.deny_ids.insert("666".to_string());
        let monitor = Monitor::start(MonitorConfig::new().with_filters(settings)).unwrap();
        let injector = monitor.injector();

        injector.inject_line("FRAME:666|0|0|8|01 00 00 00 00 00 00 00");
        injector.inject_line("FRAME:100|0|0|8|01 00 00 00 00 00 00 00");
        wait_until(&monitor, 2);

        assert_eq!(monitor.accepted(), 1);
        assert_eq!(monitor.rejected(), 1);
        let entries = monitor.session_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "100");
    }

    #[test]
    fn view_reset_preserves_exportable_log() {
        let monitor = Monitor::start(MonitorConfig::default()).unwrap();
        let injector = monitor.injector();

        injector.inject_line("FRAME:100|0|0|8|01 00 00 00 00 00 00 00");
        injector.inject_line("FRAME:200|0|0|8|02 00 00 00 00 00 00 00");
        wait_until(&monitor, 2);

        monitor.reset(false);
        assert!(monitor.snapshot().is_empty());
        assert_eq!(monitor.session_entries().len(), 2);

        monitor.reset(true);
        assert!(monitor.session_entries().is_empty());
    }

    #[test]
    fn stop_drains_pending_frames() {
        let mut monitor = Monitor::start(MonitorConfig::default()).unwrap();
        let injector = monitor.injector();

        for i in 0..50 {
            injector.inject_line(&format!("FRAME:{:03X}|0|0|8|01 00 00 00 00 00 00 00", i));
        }
        monitor.stop();

        assert_eq!(monitor.accepted(), 50);
        assert_eq!(monitor.session_entries().len(), 50);
    }
}
