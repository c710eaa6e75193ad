//! Windowed time-series views over a derived model.
//!
//! Callers pick one of a fixed set of time spans and a point of interest;
//! the window clamps to what the log actually covers. Rate-like series
//! (allocation, reclamation, promotion) are bucketed; point-like series
//! (pause, heap occupancy) are emitted per event.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::event::{GCEventType, Generation, PauseKind};
use crate::util::{MS2S, known_double, known_int};

use super::{GCModel, ModelError};

/// Allowed window spans in milliseconds: 5 min, 1 h, 3 h, 12 h, 3 d.
pub const GRAPH_SPANS: [f64; 5] = [300_000.0, 3_600_000.0, 10_800_000.0, 43_200_000.0, 259_200_000.0];

/// Bucket width for each span, same order as [`GRAPH_SPANS`].
const BUCKET_MILLIS: [f64; 5] = [1_000.0, 30_000.0, 60_000.0, 120_000.0, 600_000.0];

pub fn bucket_millis(span: f64) -> Option<f64> {
    GRAPH_SPANS
        .iter()
        .position(|s| *s == span)
        .map(|i| BUCKET_MILLIS[i])
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphView {
    pub start_time: f64,
    pub end_time: f64,
    pub bucket_millis: f64,
    /// Label → (time, value) points.
    pub series: BTreeMap<&'static str, Vec<[f64; 2]>>,
}

impl GCModel {
    /// Clamp the requested window around `time_point` into the log's range.
    pub fn decide_graph_window(&self, span: f64, time_point: f64) -> (f64, f64) {
        let model_start = if known_double(self.start_time) {
            self.start_time
        } else {
            0.0
        };
        let model_end = if known_double(self.end_time) {
            self.end_time
        } else {
            model_start
        };
        if span >= model_end - model_start {
            return (model_start, model_end);
        }
        let mut start = (time_point - span / 2.0).max(model_start);
        let mut end = start + span;
        if end > model_end {
            end = model_end;
            start = (end - span).max(model_start);
        }
        (start, end)
    }

    /// Build one of the named time-series views. An unknown key or span is a
    /// programming error on this call, reported as `Err`.
    pub fn graph_view(
        &self,
        key: &str,
        span: f64,
        time_point: f64,
    ) -> Result<GraphView, ModelError> {
        let bucket = bucket_millis(span)
            .ok_or_else(|| ModelError::new(format!("unsupported graph span {span}")))?;
        let (start, end) = self.decide_graph_window(span, time_point);
        let series = match key {
            "count" => self.count_series(start, end, bucket),
            "pause" => self.pause_series(start, end),
            "heap" => self.heap_series(start, end),
            "metaspace" => self.metaspace_series(start, end),
            "alloRec" => self.rate_series(start, end, bucket, &["allocation", "reclamation"]),
            "promotion" => self.rate_series(start, end, bucket, &["promotion"]),
            "gccycle" => self.gccycle_series(start, end),
            other => {
                return Err(ModelError::new(format!("unsupported graph type {other}")));
            }
        };
        Ok(GraphView {
            start_time: start,
            end_time: end,
            bucket_millis: bucket,
            series,
        })
    }

    fn in_window(start: f64, end: f64, t: f64) -> bool {
        known_double(t) && t >= start && t <= end
    }

    fn count_series(
        &self,
        start: f64,
        end: f64,
        bucket: f64,
    ) -> BTreeMap<&'static str, Vec<[f64; 2]>> {
        let mut buckets: BTreeMap<&'static str, BTreeMap<i64, f64>> = BTreeMap::new();
        for event in self.gc_events() {
            let label = match event.event_type {
                GCEventType::YoungGC | GCEventType::G1YoungMixedGC => "youngGC",
                GCEventType::FullGC => "fullGC",
                ty if ty.is_old_gc() => "oldGC",
                _ => continue,
            };
            if !Self::in_window(start, end, event.start_time) {
                continue;
            }
            let slot = ((event.start_time - start) / bucket) as i64;
            *buckets.entry(label).or_default().entry(slot).or_default() += 1.0;
        }
        buckets
            .into_iter()
            .map(|(label, slots)| {
                let points = slots
                    .into_iter()
                    .map(|(slot, n)| [start + slot as f64 * bucket, n])
                    .collect();
                (label, points)
            })
            .collect()
    }

    fn pause_series(&self, start: f64, end: f64) -> BTreeMap<&'static str, Vec<[f64; 2]>> {
        let mut series: BTreeMap<&'static str, Vec<[f64; 2]>> = BTreeMap::new();
        for event in self.gc_events() {
            if !Self::in_window(start, end, event.start_time) || !known_double(event.pause) {
                continue;
            }
            let label = match event.event_type.pause_kind() {
                PauseKind::Pause => match event.event_type {
                    GCEventType::FullGC => "fullGC",
                    _ => "youngGC",
                },
                PauseKind::Partial => "concurrentCycle",
                PauseKind::Concurrent => continue,
            };
            series
                .entry(label)
                .or_default()
                .push([event.start_time, event.pause]);
        }
        series
    }

    fn heap_series(&self, start: f64, end: f64) -> BTreeMap<&'static str, Vec<[f64; 2]>> {
        let mut series: BTreeMap<&'static str, Vec<[f64; 2]>> = BTreeMap::new();
        for event in self.gc_events() {
            let t = event.end_time();
            if !Self::in_window(start, end, t) {
                continue;
            }
            for (label, generation) in [
                ("young", Generation::Young),
                ("old", Generation::Old),
                ("humongous", Generation::Humongous),
                ("total", Generation::Total),
            ] {
                let item = event.memory_item(generation);
                if known_int(item.post_used) {
                    series
                        .entry(label)
                        .or_default()
                        .push([t, item.post_used as f64]);
                }
            }
        }
        series
    }

    fn metaspace_series(&self, start: f64, end: f64) -> BTreeMap<&'static str, Vec<[f64; 2]>> {
        let mut series: BTreeMap<&'static str, Vec<[f64; 2]>> = BTreeMap::new();
        for event in self.gc_events() {
            let t = event.end_time();
            if !Self::in_window(start, end, t) {
                continue;
            }
            let item = event.memory_item(Generation::Metaspace);
            if known_int(item.post_used) {
                series
                    .entry("metaspace")
                    .or_default()
                    .push([t, item.post_used as f64]);
            }
        }
        series
    }

    /// Bytes/second, summed per bucket.
    fn rate_series(
        &self,
        start: f64,
        end: f64,
        bucket: f64,
        labels: &[&'static str],
    ) -> BTreeMap<&'static str, Vec<[f64; 2]>> {
        let mut buckets: BTreeMap<&'static str, BTreeMap<i64, f64>> = BTreeMap::new();
        for event in self.gc_events() {
            if !Self::in_window(start, end, event.start_time) {
                continue;
            }
            let slot = ((event.start_time - start) / bucket) as i64;
            for label in labels {
                let value = match *label {
                    "allocation" => event.allocation,
                    "reclamation" => event.reclamation,
                    "promotion" => event.promotion,
                    _ => continue,
                };
                if known_int(value) {
                    *buckets.entry(label).or_default().entry(slot).or_default() +=
                        value as f64;
                }
            }
        }
        buckets
            .into_iter()
            .map(|(label, slots)| {
                let points = slots
                    .into_iter()
                    .map(|(slot, sum)| {
                        [start + slot as f64 * bucket, sum / (bucket / MS2S)]
                    })
                    .collect();
                (label, points)
            })
            .collect()
    }

    /// Cycle durations for concurrent collectors (duty-cycle view).
    fn gccycle_series(&self, start: f64, end: f64) -> BTreeMap<&'static str, Vec<[f64; 2]>> {
        let mut series: BTreeMap<&'static str, Vec<[f64; 2]>> = BTreeMap::new();
        for event in self.gc_events() {
            if event.event_type.pause_kind() != PauseKind::Partial {
                continue;
            }
            if !Self::in_window(start, end, event.start_time) || !known_double(event.duration) {
                continue;
            }
            series
                .entry("gccycle")
                .or_default()
                .push([event.start_time, event.duration]);
        }
        series
    }
}
