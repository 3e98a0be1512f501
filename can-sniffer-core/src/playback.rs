//! Timed session replay
//!
//! Replays a loaded session with the original inter-frame delays
//! reconstructed from the stored timestamps. Replayed frames are injected
//! through the same queue as live traffic, so aggregation stays
//! single-writer no matter how many producers exist; optionally each frame
//! is also re-encoded and retransmitted out the serial link.

use crate::monitor::FrameInjector;
use crate::session::{self, SessionEntry};
use crate::transport::Transmitter;
use crate::types::Result;
use log::{info, warn};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Upper clamp on a reconstructed inter-frame delay. A malformed recording
/// with a clock discontinuity must not stall playback for minutes.
pub const MAX_GAP: Duration = Duration::from_secs(5);

/// Fallback delay when consecutive timestamps are unusable
/// (non-monotonic or not finite), and for the loop wrap-around.
pub const DEFAULT_GAP: Duration = Duration::from_millis(10);

/// Slice size for interruptible sleeps; `stop()` lands within one slice
/// of a pending delay.
const STOP_POLL: Duration = Duration::from_millis(25);

/// A loaded session plus its replay controls.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    /// Entries in stored order.
    pub entries: Vec<SessionEntry>,
    /// 0 = as fast as possible; otherwise a real-time divisor
    /// (2.0 replays twice as fast, 0.5 at half speed).
    pub speed: f64,
    /// Restart from the first entry after the last, without leaving
    /// the `Playing` state.
    pub looped: bool,
    /// Re-encode each entry as a `SEND:` command toward the transport.
    pub retransmit: bool,
}

impl PlaybackSession {
    pub fn from_entries(entries: Vec<SessionEntry>) -> Self {
        PlaybackSession {
            entries,
            speed: 1.0,
            looped: false,
            retransmit: false,
        }
    }

    /// Load a session from an exported file.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::from_entries(session::import_session(path)?))
    }

    /// Builder method: set the speed multiplier.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Builder method: enable looping.
    pub fn with_loop(mut self, looped: bool) -> Self {
        self.looped = looped;
        self
    }

    /// Builder method: enable outward retransmission.
    pub fn with_retransmit(mut self, retransmit: bool) -> Self {
        self.retransmit = retransmit;
        self
    }

    /// Stored duration from first to last timestamp, in seconds.
    pub fn span(&self) -> f64 {
        match (self.entries.first(), self.entries.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).max(0.0),
            _ => 0.0,
        }
    }
}

/// Replay lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    /// The sequence ran to its end (only reachable with looping off).
    Completed,
    /// `stop()` interrupted the run.
    Stopped,
}

/// Replay driver; owns the playback thread.
pub struct PlaybackEngine {
    session: Arc<PlaybackSession>,
    state: Arc<Mutex<PlaybackState>>,
    stop_flag: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    pub fn new(session: PlaybackSession) -> Self {
        PlaybackEngine {
            session: Arc::new(session),
            state: Arc::new(Mutex::new(PlaybackState::Idle)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.lock()
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    /// Begin replaying into `injector`; frames also go out through
    /// `transmitter` when the session has retransmit enabled.
    ///
    /// A no-op returning `false` while already `Playing`. Restarting after
    /// `Completed`/`Stopped` is allowed.
    pub fn start(&mut self, injector: FrameInjector, transmitter: Option<Transmitter>) -> bool {
        {
            let mut state = self.state.lock();
            if *state == PlaybackState::Playing {
                return false;
            }
            *state = PlaybackState::Playing;
        }
        // reap a finished previous run
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.stop_flag.store(false, Ordering::SeqCst);

        let session = Arc::clone(&self.session);
        let state = Arc::clone(&self.state);
        let stop_flag = Arc::clone(&self.stop_flag);

        info!(
            "Playback started: {} entries, speed {}, loop={}, retransmit={}",
            session.entries.len(),
            session.speed,
            session.looped,
            session.retransmit
        );

        self.worker = Some(thread::spawn(move || {
            run_session(&session, &injector, transmitter.as_ref(), &state, &stop_flag);
        }));
        true
    }

    /// Request a stop. Takes effect within one sleep slice; the partially
    /// applied aggregation state of the frame in flight is not rolled back.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    /// Block until the current run finishes on its own.
    pub fn wait(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_session(
    session: &PlaybackSession,
    injector: &FrameInjector,
    transmitter: Option<&Transmitter>,
    state: &Mutex<PlaybackState>,
    stop_flag: &AtomicBool,
) {
    loop {
        let mut prev_timestamp: Option<f64> = None;
        for entry in &session.entries {
            let delay = match prev_timestamp {
                // first entry plays immediately
                None => Duration::ZERO,
                Some(prev) => entry_delay(prev, entry.timestamp, session.speed),
            };
            if !paced_wait(stop_flag, delay) {
                *state.lock() = PlaybackState::Stopped;
                info!("Playback stopped");
                return;
            }

            let frame = entry.to_frame(injector.now());
            if session.retransmit {
                if let Some(tx) = transmitter {
                    if let Err(e) = tx.send(&frame.id, &frame.payload) {
                        warn!("Retransmit failed for id {}: {}", frame.id, e);
                    }
                }
            }
            injector.inject(frame);
            prev_timestamp = Some(entry.timestamp);
        }

        if !session.looped {
            break;
        }
        // wrap-around is non-monotonic by construction; use the default gap
        let gap = if session.speed <= 0.0 {
            Duration::ZERO
        } else {
            DEFAULT_GAP
        };
        if !paced_wait(stop_flag, gap) {
            *state.lock() = PlaybackState::Stopped;
            info!("Playback stopped");
            return;
        }
    }

    *state.lock() = PlaybackState::Completed;
    info!("Playback completed");
}

/// Delay between two consecutive entries, scaled and clamped.
fn entry_delay(prev: f64, next: f64, speed: f64) -> Duration {
    if speed <= 0.0 {
        return Duration::ZERO;
    }
    let dt = next - prev;
    if !dt.is_finite() || dt <= 0.0 {
        // data anomaly: keep going at the fallback pace
        return DEFAULT_GAP;
    }
    let scaled = dt / speed;
    if !scaled.is_finite() || scaled >= MAX_GAP.as_secs_f64() {
        return MAX_GAP;
    }
    Duration::from_secs_f64(scaled)
}

/// Sleep `delay` in interruptible slices. Returns `false` if a stop was
/// requested before the delay elapsed.
fn paced_wait(stop_flag: &AtomicBool, delay: Duration) -> bool {
    let mut remaining = delay;
    loop {
        if stop_flag.load(Ordering::SeqCst) {
            return false;
        }
        if remaining.is_zero() {
            return true;
        }
        let slice = remaining.min(STOP_POLL);
        thread::sleep(slice);
        remaining -= slice;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::FrameQueue;
    use crate::monitor::SessionClock;
    use crate::transport::{shared, MockTransport};
    use std::time::Instant;

    fn entry(ts: f64, id: &str, data: &str) -> SessionEntry {
        SessionEntry {
            timestamp: ts,
            id: id.to_string(),
            rtr: false,
            ide: false,
            dlc: 8,
            data: data.to_string(),
        }
    }

    fn test_injector(capacity: usize) -> (Arc<FrameQueue>, FrameInjector) {
        let queue = Arc::new(FrameQueue::new(capacity));
        let injector = FrameInjector::new(Arc::clone(&queue), Arc::new(SessionClock::new()));
        (queue, injector)
    }

    #[test]
    fn delay_scaling_and_clamping() {
        assert_eq!(entry_delay(0.0, 0.1, 1.0), Duration::from_millis(100));
        assert_eq!(entry_delay(0.0, 0.1, 2.0), Duration::from_millis(50));
        assert_eq!(entry_delay(0.0, 0.1, 0.5), Duration::from_millis(200));
        // speed 0 removes all delays
        assert_eq!(entry_delay(0.0, 100.0, 0.0), Duration::ZERO);
        // clock discontinuities are clamped
        assert_eq!(entry_delay(0.0, 3600.0, 1.0), MAX_GAP);
        // non-monotonic data falls back to the default gap
        assert_eq!(entry_delay(5.0, 1.0, 1.0), DEFAULT_GAP);
        assert_eq!(entry_delay(0.0, f64::NAN, 1.0), DEFAULT_GAP);
    }

    #[test]
    fn flat_out_replay_injects_everything_in_order() {
        let (queue, injector) = test_injector(64);
        let session = PlaybackSession::from_entries(vec![
            entry(0.0, "100", "01 00 00 00 00 00 00 00"),
            entry(10.0, "200", "02 00 00 00 00 00 00 00"),
            entry(20.0, "300", "03 00 00 00 00 00 00 00"),
        ])
        .with_speed(0.0);

        let start = Instant::now();
        let mut engine = PlaybackEngine::new(session);
        assert!(engine.start(injector, None));
        engine.wait();

        assert!(start.elapsed() < Duration::from_millis(500), "speed 0 must not pace");
        assert_eq!(engine.state(), PlaybackState::Completed);

        let ids: Vec<String> = std::iter::from_fn(|| queue.pop()).map(|f| f.id).collect();
        assert_eq!(ids, ["100", "200", "300"]);
    }

    #[test]
    fn real_time_replay_takes_about_the_recorded_span() {
        let (_queue, injector) = test_injector(64);
        let session = PlaybackSession::from_entries(vec![
            entry(0.00, "100", "01 00 00 00 00 00 00 00"),
            entry(0.04, "100", "02 00 00 00 00 00 00 00"),
            entry(0.08, "100", "03 00 00 00 00 00 00 00"),
        ]);

        let start = Instant::now();
        let mut engine = PlaybackEngine::new(session);
        assert!(engine.start(injector, None));
        engine.wait();
        let elapsed = start.elapsed();

        assert_eq!(engine.state(), PlaybackState::Completed);
        assert!(elapsed >= Duration::from_millis(60), "replayed too fast: {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "replayed too slow: {:?}", elapsed);
    }

    #[test]
    fn start_is_a_noop_while_playing() {
        let (_queue, injector) = test_injector(64);
        let session = PlaybackSession::from_entries(vec![
            entry(0.0, "100", "01 00 00 00 00 00 00 00"),
            entry(2.0, "100", "02 00 00 00 00 00 00 00"),
        ]);

        let mut engine = PlaybackEngine::new(session);
        assert!(engine.start(injector.clone(), None));
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert!(!engine.start(injector, None), "second start must be rejected");
        engine.stop();
        assert_eq!(engine.state(), PlaybackState::Stopped);
    }

    #[test]
    fn stop_interrupts_a_long_delay() {
        let (queue, injector) = test_injector(64);
        let session = PlaybackSession::from_entries(vec![
            entry(0.0, "100", "01 00 00 00 00 00 00 00"),
            entry(4.0, "100", "02 00 00 00 00 00 00 00"),
        ]);

        let mut engine = PlaybackEngine::new(session);
        assert!(engine.start(injector, None));
        thread::sleep(Duration::from_millis(50));

        let start = Instant::now();
        engine.stop();
        assert!(start.elapsed() < Duration::from_secs(1), "stop was not prompt");
        assert_eq!(engine.state(), PlaybackState::Stopped);
        // only the first entry made it out
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn looping_restarts_without_leaving_playing() {
        let (queue, injector) = test_injector(256);
        let session = PlaybackSession::from_entries(vec![
            entry(0.0, "100", "01 00 00 00 00 00 00 00"),
            entry(0.001, "200", "02 00 00 00 00 00 00 00"),
        ])
        .with_loop(true);

        let mut engine = PlaybackEngine::new(session);
        assert!(engine.start(injector, None));
        thread::sleep(Duration::from_millis(200));
        assert_eq!(engine.state(), PlaybackState::Playing);
        engine.stop();

        assert!(queue.len() > 2, "loop should have replayed the session repeatedly");
    }

    #[test]
    fn retransmit_reencodes_entries_outward() {
        let (_queue, injector) = test_injector(64);
        let mock = MockTransport::new();
        let transmitter = Transmitter::new(shared(mock.clone()));

        let session = PlaybackSession::from_entries(vec![
            entry(0.0, "7DF", "02 01 0C 00 00 00 00 00"),
        ])
        .with_speed(0.0)
        .with_retransmit(true);

        let mut engine = PlaybackEngine::new(session);
        assert!(engine.start(injector, Some(transmitter)));
        engine.wait();

        let written = String::from_utf8(mock.written()).unwrap();
        assert_eq!(written, "SEND:7DF|02 01 0C 00 00 00 00 00\n");
    }

    #[test]
    fn empty_session_completes_immediately() {
        let (_queue, injector) = test_injector(4);
        let mut engine = PlaybackEngine::new(PlaybackSession::from_entries(Vec::new()));
        assert!(engine.start(injector, None));
        engine.wait();
        assert_eq!(engine.state(), PlaybackState::Completed);
    }
}
