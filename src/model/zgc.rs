//! ZGC self-reported statistics and pauseless-collector extras.
//!
//! ZGC periodically prints a fixed-width statistics table. Each row carries
//! Avg/Max pairs over the last 10 seconds, 10 minutes, 10 hours and the whole
//! run, plus a unit column. Rows are keyed by `"name unit"` (for example
//! `"System: Java Threads threads"` or `"Memory: Allocation Rate MB/s"`).

use std::collections::BTreeMap;

use serde::Serialize;

use crate::stats::DoubleData;
use crate::util::{MB, MS2S, UNKNOWN_DOUBLE, UNKNOWN_INT, known_double, known_int};

pub const ALLOCATION_RATE_KEY: &str = "Memory: Allocation Rate MB/s";

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ZStatItem {
    pub avg10s: f64,
    pub max10s: f64,
    pub avg10m: f64,
    pub max10m: f64,
    pub avg10h: f64,
    pub max10h: f64,
    pub avg_total: f64,
    pub max_total: f64,
}

/// One statistics snapshot.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ZStatistics {
    pub start_time: f64,
    items: BTreeMap<String, ZStatItem>,
}

impl ZStatistics {
    pub fn new(start_time: f64) -> Self {
        Self {
            start_time,
            items: BTreeMap::new(),
        }
    }

    pub fn put(&mut self, key: String, item: ZStatItem) {
        self.items.insert(key, item);
    }

    pub fn get(&self, key: &str) -> Option<&ZStatItem> {
        self.items.get(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }
}

/// An application thread stalled waiting for the collector to free memory.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZAllocationStall {
    pub thread: String,
    pub start_time: f64,
    pub duration: f64,
}

/// The collector gave up: an allocating thread hit OutOfMemory.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZOutOfMemory {
    pub thread: String,
    pub start_time: f64,
}

/// Heap size that would have absorbed the observed allocation burst:
/// average used-at-cycle-start plus one average cycle's worth of allocation
/// at the 10-second peak rate.
pub fn recommended_max_heap_size(
    statistics: &[ZStatistics],
    avg_pre_used: i64,
    avg_cycle_ms: f64,
) -> i64 {
    let Some(last) = statistics.last() else {
        return UNKNOWN_INT;
    };
    let Some(rate) = last.get(ALLOCATION_RATE_KEY) else {
        return UNKNOWN_INT;
    };
    if !known_int(avg_pre_used) || !known_double(avg_cycle_ms) {
        return UNKNOWN_INT;
    }
    avg_pre_used + (avg_cycle_ms / MS2S * rate.max10s * MB as f64) as i64
}

/// Average pre-used total and cycle duration over ZGC collection events,
/// inputs to [`recommended_max_heap_size`].
pub fn cycle_averages(events: &[crate::event::GCEvent]) -> (i64, f64) {
    use crate::event::{GCEventType, Generation};
    let mut used = DoubleData::new();
    let mut cycle = DoubleData::new();
    for e in events {
        if e.event_type != GCEventType::ZGarbageCollection {
            continue;
        }
        let pre = e.memory_item(Generation::Total).pre_used;
        if known_int(pre) {
            used.add(pre as f64);
        }
        if known_double(e.duration) {
            cycle.add(e.duration);
        }
    }
    let avg_used = if used.n() == 0 {
        UNKNOWN_INT
    } else {
        used.average() as i64
    };
    let avg_cycle = if cycle.n() == 0 {
        UNKNOWN_DOUBLE
    } else {
        cycle.average()
    };
    (avg_used, avg_cycle)
}
