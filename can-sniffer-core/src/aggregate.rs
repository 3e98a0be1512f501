//! Keyed live state and the append-only session log
//!
//! The store keeps two views of the traffic, the same split the rest of the
//! pack uses for CAN traces: per-id latest state for the live monitor, and
//! an ordered log of every accepted frame for recording and replay.
//!
//! Ownership: the store is mutated only by the processing thread, after the
//! filter pipeline has accepted a frame. Presentation gets copy-out
//! snapshots and never touches the live entries.

use crate::session::SessionEntry;
use crate::types::{Frame, PAYLOAD_LEN};
use std::collections::HashMap;

/// Live state for one distinct source identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedSource {
    /// Most recent accepted frame for this id.
    pub last_frame: Frame,
    /// Per byte position, the capture time of the last observed change.
    /// `None` until that position first differs from a prior value.
    pub last_change: [Option<f64>; PAYLOAD_LEN],
    /// Capture time of the first frame seen for this id.
    pub first_seen: f64,
}

/// Per-id aggregation plus the ordered session log.
#[derive(Debug, Default)]
pub struct AggregationStore {
    sources: HashMap<String, AggregatedSource>,
    session_log: Vec<SessionEntry>,
}

impl AggregationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an accepted frame into the live state and append it to the log.
    ///
    /// First frame for an id creates the entry with `first_seen` from the
    /// frame and no change marks; a value is not a change against itself.
    /// Later frames mark `last_change` for every byte position that differs
    /// from the previous payload, and always overwrite `last_frame`.
    pub fn apply(&mut self, frame: Frame) {
        self.session_log.push(SessionEntry::from_frame(&frame));

        match self.sources.get_mut(&frame.id) {
            Some(source) => {
                for (i, byte) in frame.payload.iter().enumerate() {
                    if *byte != source.last_frame.payload[i] {
                        source.last_change[i] = Some(frame.capture_time);
                    }
                }
                source.last_frame = frame;
            }
            None => {
                let first_seen = frame.capture_time;
                self.sources.insert(
                    frame.id.clone(),
                    AggregatedSource {
                        last_frame: frame,
                        last_change: [None; PAYLOAD_LEN],
                        first_seen,
                    },
                );
            }
        }
    }

    /// Clear the live per-id state; with `also_statistics` the session log
    /// is cleared too.
    ///
    /// The two flavors stay separate on purpose: clearing the monitor view
    /// must not discard a capture in progress, while starting a fresh
    /// recording clears both (the engine restarts the session clock
    /// alongside).
    pub fn reset(&mut self, also_statistics: bool) {
        self.sources.clear();
        if also_statistics {
            self.session_log.clear();
        }
    }

    /// Last accepted payload for `id`, used by the hide-unchanged filter.
    pub fn last_payload(&self, id: &str) -> Option<&[u8; PAYLOAD_LEN]> {
        self.sources.get(id).map(|s| &s.last_frame.payload)
    }

    pub fn source(&self, id: &str) -> Option<&AggregatedSource> {
        self.sources.get(id)
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Copy out every live entry. The result is unordered; sorting is a
    /// view concern.
    pub fn snapshot(&self) -> Vec<AggregatedSource> {
        self.sources.values().cloned().collect()
    }

    /// The accepted frames in arrival order.
    pub fn session_log(&self) -> &[SessionEntry] {
        &self.session_log
    }

    pub fn log_len(&self) -> usize {
        self.session_log.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: &str, payload: [u8; 8], at: f64) -> Frame {
        Frame {
            id: id.to_string(),
            rtr: false,
            ide: false,
            dlc: 8,
            payload,
            capture_time: at,
        }
    }

    #[test]
    fn first_frame_creates_source_without_change_marks() {
        let mut store = AggregationStore::new();
        store.apply(frame("7DF", [1, 2, 3, 4, 5, 6, 7, 8], 0.5));

        let source = store.source("7DF").unwrap();
        assert_eq!(source.first_seen, 0.5);
        assert_eq!(source.last_change, [None; 8]);
        assert_eq!(store.log_len(), 1);
    }

    #[test]
    fn identical_frame_marks_no_changes() {
        let mut store = AggregationStore::new();
        store.apply(frame("7DF", [1, 2, 3, 0, 0, 0, 0, 0], 0.0));
        store.apply(frame("7DF", [1, 2, 3, 0, 0, 0, 0, 0], 1.0));

        let source = store.source("7DF").unwrap();
        assert_eq!(source.last_change, [None; 8]);
        assert_eq!(source.last_frame.capture_time, 1.0);
        assert_eq!(store.log_len(), 2);
    }

    #[test]
    fn changed_byte_positions_are_stamped() {
        let mut store = AggregationStore::new();
        store.apply(frame("7DF", [0x02, 0x01, 0x0C, 0, 0, 0, 0, 0], 0.0));
        store.apply(frame("7DF", [0x02, 0x01, 0x0D, 0, 0, 0, 0, 0], 2.5));

        let source = store.source("7DF").unwrap();
        assert_eq!(source.last_frame.payload[2], 0x0D);
        assert_eq!(source.last_change[2], Some(2.5));
        for i in [0usize, 1, 3, 4, 5, 6, 7] {
            assert_eq!(source.last_change[i], None, "byte {} should be unchanged", i);
        }
    }

    #[test]
    fn sources_are_keyed_independently() {
        let mut store = AggregationStore::new();
        store.apply(frame("100", [1; 8], 0.0));
        store.apply(frame("200", [2; 8], 0.1));
        assert_eq!(store.source_count(), 2);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn reset_keeps_log_unless_statistics_requested() {
        let mut store = AggregationStore::new();
        store.apply(frame("100", [1; 8], 0.0));
        store.apply(frame("200", [2; 8], 0.1));

        store.reset(false);
        assert_eq!(store.source_count(), 0);
        assert_eq!(store.log_len(), 2, "live-view reset must keep the capture");

        store.reset(true);
        assert_eq!(store.log_len(), 0);
    }

    #[test]
    fn session_log_preserves_arrival_order() {
        let mut store = AggregationStore::new();
        store.apply(frame("300", [3; 8], 0.3));
        store.apply(frame("100", [1; 8], 0.1));
        store.apply(frame("200", [2; 8], 0.2));

        let ids: Vec<&str> = store.session_log().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["300", "100", "200"]);
    }
}
