//! Frame filter pipeline
//!
//! An ordered chain of independently toggleable predicates, evaluated once
//! per frame before aggregation. A frame survives only if every enabled
//! predicate passes. Predicates read the aggregation store (for the
//! hide-unchanged comparison) but never mutate it, and each one is O(1),
//! since the pipeline runs on the processing thread's hot path.
//!
//! Settings are replaced as a whole snapshot behind an `Arc`, so the
//! consumer never observes a half-updated configuration.

use crate::aggregate::AggregationStore;
use crate::types::{Frame, PAYLOAD_LEN};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// One immutable filter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Inclusive DLC lower bound.
    #[serde(default)]
    pub dlc_min: u8,
    /// Inclusive DLC upper bound.
    #[serde(default = "default_dlc_max")]
    pub dlc_max: u8,
    /// Only ids in this set pass; an empty set admits everything.
    #[serde(default)]
    pub allow_ids: HashSet<String>,
    /// Ids in this set never pass.
    #[serde(default)]
    pub deny_ids: HashSet<String>,
    /// Drop frames whose payload equals the last accepted payload for the id.
    #[serde(default)]
    pub hide_unchanged: bool,
    /// Drop frames whose payload is all zeroes.
    #[serde(default)]
    pub hide_all_zero: bool,
}

fn default_dlc_max() -> u8 {
    PAYLOAD_LEN as u8
}

impl Default for FilterSettings {
    fn default() -> Self {
        FilterSettings {
            dlc_min: 0,
            dlc_max: default_dlc_max(),
            allow_ids: HashSet::new(),
            deny_ids: HashSet::new(),
            hide_unchanged: false,
            hide_all_zero: false,
        }
    }
}

impl FilterSettings {
    /// Run the full predicate chain. `true` means the frame reaches
    /// aggregation.
    pub fn accepts(&self, frame: &Frame, store: &AggregationStore) -> bool {
        if frame.dlc < self.dlc_min || frame.dlc > self.dlc_max {
            return false;
        }
        if !self.allow_ids.is_empty() && !self.allow_ids.contains(&frame.id) {
            return false;
        }
        if self.deny_ids.contains(&frame.id) {
            return false;
        }
        if self.hide_unchanged {
            if let Some(previous) = store.last_payload(&frame.id) {
                if *previous == frame.payload {
                    return false;
                }
            }
        }
        if self.hide_all_zero && frame.is_all_zero() {
            return false;
        }
        true
    }
}

/// Holder for the active settings snapshot.
///
/// `replace` swaps the whole configuration atomically; `load` hands the
/// consumer a cheap `Arc` clone to evaluate against, so no lock is held
/// while frames are processed.
pub struct FilterControl {
    current: Mutex<Arc<FilterSettings>>,
}

impl FilterControl {
    pub fn new(settings: FilterSettings) -> Self {
        FilterControl {
            current: Mutex::new(Arc::new(settings)),
        }
    }

    pub fn replace(&self, settings: FilterSettings) {
        *self.current.lock() = Arc::new(settings);
    }

    pub fn load(&self) -> Arc<FilterSettings> {
        self.current.lock().clone()
    }
}

impl Default for FilterControl {
    fn default() -> Self {
        FilterControl::new(FilterSettings::default())
    }
}
