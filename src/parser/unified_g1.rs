//! G1 parser for unified logging (JDK 9+, `-Xlog:gc*`).
//!
//! A young or full pause logs a start line, phase report lines, region and
//! metaspace transitions, a completion line with the heap transition and the
//! pause duration, and a CPU line; all carry the same gcid. A concurrent
//! cycle interleaves with young pauses under its own gcid, so routing is by
//! id throughout.

use crate::event::{GCEvent, GCEventType, GCSpecialSituation, Generation, MemoryItem};
use crate::model::{CollectorType, GCModel, LogStyle};
use crate::util::{MB, UNKNOWN_INT, known_double, known_int};
use crate::vmoptions::VmOptions;

use super::decorators::{LogClock, parse_unified, strip_gcid};
use super::shared::{
    paren_groups, parse_cpu_time, parse_mem_change, parse_mem_size, parse_region_change,
    parse_unified_safepoint, split_title, trailing_duration,
};
use super::{EventBook, GCLogParser, ParseError, ProgressListener};

/// Young pause qualifiers that are not causes.
const YOUNG_QUALIFIERS: [&str; 5] = [
    "Normal",
    "Mixed",
    "Prepare Mixed",
    "Concurrent Start",
    "Concurrent End",
];

pub struct UnifiedG1Parser {
    book: EventBook,
    clock: LogClock,
    /// Region rows seen before the region size is known, per gcid.
    pending_regions: Vec<(i64, Generation, i64, i64, i64)>,
}

impl UnifiedG1Parser {
    pub fn new() -> Self {
        Self {
            book: EventBook::new(),
            clock: LogClock::new(),
            pending_regions: Vec::new(),
        }
    }

    fn handle_line(&mut self, line: &str, model: &mut GCModel) {
        if let Some(flags) = line.split_once("CommandLine flags: ").map(|(_, f)| f) {
            model.vm_options = Some(VmOptions::parse(flags));
            return;
        }
        let Some(parsed) = parse_unified(line) else {
            return;
        };
        let time = self.clock.observe(parsed.uptime, parsed.wallclock);
        if !known_double(model.reference_timestamp) && known_double(self.clock.reference) {
            model.reference_timestamp = self.clock.reference;
        }

        if parsed.tags.contains("safepoint") {
            if let Some(sp) = parse_unified_safepoint(parsed.rest, time) {
                model.add_safepoint(sp);
            }
            return;
        }

        let payload = parsed.rest;
        if let Some(size) = payload
            .strip_prefix("Heap region size: ")
            .or_else(|| payload.strip_prefix("Heap Region Size: "))
        {
            if let Some(bytes) = parse_mem_size(size) {
                model.heap_region_size = bytes;
            }
            return;
        }

        let (gcid, payload) = strip_gcid(payload);
        let Some(gcid) = gcid else {
            return;
        };
        self.handle_event_line(gcid, payload, time, model);
    }

    fn handle_event_line(&mut self, gcid: i64, payload: &str, time: f64, model: &mut GCModel) {
        if let Some(rest) = payload.strip_prefix("Using ") {
            Self::record_workers(rest, model);
            return;
        }
        if payload == "To-space exhausted" {
            self.book
                .get_or_open(gcid, GCEventType::YoungGC)
                .add_special_situation(GCSpecialSituation::ToSpaceExhausted);
            return;
        }
        if payload.starts_with("User=") {
            if let Some(cpu) = parse_cpu_time(payload)
                && let Some(event) = self.book.get(gcid)
            {
                event.cpu_time = Some(cpu);
            }
            return;
        }
        if let Some((label, value)) = payload.split_once(": ")
            && let Some(generation) = region_generation(label.trim_start())
        {
            if let Some((pre, post, cap)) = parse_region_change(value.trim()) {
                if known_int(model.heap_region_size) {
                    let item = region_item(generation, pre, post, cap, model.heap_region_size);
                    self.book
                        .get_or_open(gcid, GCEventType::YoungGC)
                        .update_memory_item(item);
                } else {
                    self.pending_regions.push((gcid, generation, pre, post, cap));
                }
            }
            return;
        }
        if let Some(value) = payload.strip_prefix("Metaspace: ") {
            if let Some((pre, post, cap)) = parse_mem_change(value) {
                self.book
                    .get_or_open(gcid, GCEventType::YoungGC)
                    .update_memory_item(MemoryItem::new(Generation::Metaspace, pre, post, cap));
            }
            return;
        }

        let (title, tail) = split_title(payload);
        let groups = paren_groups(title);
        let head = title.split('(').next().unwrap_or(title).trim_end();

        // Pause phase reports: "Pre Evacuate Collection Set: 0.1ms" and
        // full GC "Phase 1: Mark live objects 49.000ms".
        if let Some((name, value)) = payload.split_once(": ")
            && let Some(ty) = pause_phase_type(name.trim_start())
            && let Some(duration) = trailing_duration(value)
        {
            let mut phase = GCEvent::new(ty);
            phase.duration = duration;
            self.book
                .get_or_open(gcid, GCEventType::YoungGC)
                .add_phase(phase);
            return;
        }
        if let Some(name) = head.strip_prefix("Phase ")
            && let Some((_, phase_name)) = name.split_once(": ")
            && let Some(ty) = full_phase_type(phase_name)
        {
            let event = self.book.get_or_open(gcid, GCEventType::FullGC);
            match trailing_duration(payload) {
                Some(duration) => {
                    if let Some(phase) = event.last_phase_of_type_mut(ty) {
                        phase.duration = duration;
                    } else {
                        let mut phase = GCEvent::new(ty);
                        phase.start_time = time - duration;
                        phase.duration = duration;
                        event.add_phase(phase);
                    }
                }
                None => {
                    let mut phase = GCEvent::new(ty);
                    phase.start_time = time;
                    event.add_phase(phase);
                }
            }
            return;
        }

        match head {
            "Pause Young" => {
                let ty = if groups.iter().any(|g| g.contains("Mixed")) {
                    GCEventType::G1YoungMixedGC
                } else {
                    GCEventType::YoungGC
                };
                let cause = groups
                    .iter()
                    .find(|g| !YOUNG_QUALIFIERS.contains(g))
                    .map(|g| g.to_string());
                self.top_level_line(gcid, ty, cause, tail, time, model);
            }
            "Pause Full" => {
                let cause = groups.first().map(|g| g.to_string());
                self.top_level_line(gcid, GCEventType::FullGC, cause, tail, time, model);
            }
            "Concurrent Cycle" | "Concurrent Undo Cycle" => {
                self.top_level_line(gcid, GCEventType::G1ConcurrentCycle, None, tail, time, model);
            }
            "Pause Remark" => {
                self.cycle_phase_line(gcid, GCEventType::G1Remark, tail, time);
            }
            "Pause Cleanup" => {
                self.cycle_phase_line(gcid, GCEventType::G1Cleanup, tail, time);
            }
            other => {
                if let Some(ty) = concurrent_phase_type(other) {
                    self.cycle_phase_line(gcid, ty, tail, time);
                }
            }
        }
    }

    fn top_level_line(
        &mut self,
        gcid: i64,
        ty: GCEventType,
        cause: Option<String>,
        tail: &str,
        time: f64,
        model: &mut GCModel,
    ) {
        let duration = trailing_duration(tail);
        let heap = tail
            .split_whitespace()
            .find(|t| t.contains("->"))
            .and_then(parse_mem_change);
        let event = self.book.get_or_open(gcid, ty);
        event.event_type = ty;
        if event.cause.is_none() {
            event.cause = cause;
        }
        match duration {
            None => {
                // start line
                if !known_double(event.start_time) {
                    event.start_time = time;
                }
            }
            Some(d) => {
                event.duration = d;
                if !known_double(event.start_time) {
                    event.start_time = time - d;
                }
                if let Some((pre, post, cap)) = heap {
                    event.update_memory_item(MemoryItem::new(Generation::Total, pre, post, cap));
                }
                self.resolve_pending_regions(gcid, model);
            }
        }
    }

    fn cycle_phase_line(&mut self, gcid: i64, ty: GCEventType, tail: &str, time: f64) {
        let event = self.book.get_or_open(gcid, GCEventType::G1ConcurrentCycle);
        match trailing_duration(tail) {
            None => {
                let mut phase = GCEvent::new(ty);
                phase.start_time = time;
                event.add_phase(phase);
            }
            Some(duration) => {
                if let Some(phase) = event.last_phase_of_type_mut(ty) {
                    phase.duration = duration;
                    if !known_double(phase.start_time) {
                        phase.start_time = time - duration;
                    }
                } else {
                    let mut phase = GCEvent::new(ty);
                    phase.start_time = time - duration;
                    phase.duration = duration;
                    event.add_phase(phase);
                }
            }
        }
    }

    /// Without an explicit region size line, derive it from the first
    /// completed pause: used-before divided by the occupied region count,
    /// rounded to the nearest power of two in megabytes.
    fn resolve_pending_regions(&mut self, gcid: i64, model: &mut GCModel) {
        if self.pending_regions.is_empty() {
            return;
        }
        if !known_int(model.heap_region_size) {
            let Some(event) = self.book.get(gcid) else {
                return;
            };
            let total = event.memory_item(Generation::Total);
            let pre_count: i64 = self
                .pending_regions
                .iter()
                .filter(|(id, ..)| *id == gcid)
                .map(|(_, _, pre, ..)| *pre)
                .sum();
            if !known_int(total.pre_used) || pre_count <= 0 {
                return;
            }
            let ratio = total.pre_used as f64 / pre_count as f64 / MB as f64;
            model.heap_region_size = nearest_pow2_mb(ratio) * MB;
        }
        let region_size = model.heap_region_size;
        for (id, generation, pre, post, cap) in std::mem::take(&mut self.pending_regions) {
            if let Some(event) = self.book.get(id) {
                event.update_memory_item(region_item(generation, pre, post, cap, region_size));
            }
        }
    }

    fn record_workers(rest: &str, model: &mut GCModel) {
        // "8 workers of 8 for evacuation"
        let Some((_, pool)) = rest.split_once(" of ") else {
            return;
        };
        let Some(n) = pool
            .split_whitespace()
            .next()
            .and_then(|t| t.parse::<i64>().ok())
        else {
            return;
        };
        if rest.contains("for marking") {
            model.concurrent_thread = model.concurrent_thread.max(n);
        } else {
            model.parallel_thread = model.parallel_thread.max(n);
        }
    }
}

impl Default for UnifiedG1Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl GCLogParser for UnifiedG1Parser {
    fn collector(&self) -> CollectorType {
        CollectorType::G1
    }

    fn style(&self) -> LogStyle {
        LogStyle::Unified
    }

    fn parse(
        &mut self,
        input: &str,
        listener: &mut dyn ProgressListener,
    ) -> Result<GCModel, ParseError> {
        listener.begin_task("Parsing G1 log");
        let mut model = GCModel::new(CollectorType::G1, LogStyle::Unified);
        let total = input.len().max(1);
        let mut seen = 0usize;
        for line in input.lines() {
            seen += line.len() + 1;
            self.handle_line(line, &mut model);
            listener.worked((seen * 100 / total) as u32);
        }
        for event in std::mem::replace(&mut self.book, EventBook::new()).into_events() {
            model.add_event(event);
        }
        Ok(model)
    }
}

fn region_generation(label: &str) -> Option<Generation> {
    match label {
        "Eden regions" => Some(Generation::Eden),
        "Survivor regions" => Some(Generation::Survivor),
        "Old regions" => Some(Generation::Old),
        "Humongous regions" => Some(Generation::Humongous),
        _ => None,
    }
}

fn region_item(
    generation: Generation,
    pre: i64,
    post: i64,
    cap: i64,
    region_size: i64,
) -> MemoryItem {
    MemoryItem::new(
        generation,
        pre * region_size,
        post * region_size,
        if cap == UNKNOWN_INT {
            UNKNOWN_INT
        } else {
            cap * region_size
        },
    )
}

fn pause_phase_type(name: &str) -> Option<GCEventType> {
    match name {
        "Pre Evacuate Collection Set" => Some(GCEventType::PreEvacuateCollectionSet),
        "Evacuate Collection Set" => Some(GCEventType::EvacuateCollectionSet),
        "Post Evacuate Collection Set" => Some(GCEventType::PostEvacuateCollectionSet),
        "Other" => Some(GCEventType::OtherPhase),
        "Reference Processing" => Some(GCEventType::ReferenceProcessing),
        "Code Root Scanning" => Some(GCEventType::CodeRootScanning),
        _ => None,
    }
}

fn full_phase_type(name: &str) -> Option<GCEventType> {
    match name {
        "Mark live objects" => Some(GCEventType::MarkLiveObjects),
        "Prepare for compaction" | "Compute new object addresses" => {
            Some(GCEventType::ComputeNewObjectAddresses)
        }
        "Adjust pointers" => Some(GCEventType::AdjustPointers),
        "Compact heap" | "Move objects" => Some(GCEventType::MoveObjects),
        _ => None,
    }
}

fn concurrent_phase_type(head: &str) -> Option<GCEventType> {
    match head {
        "Concurrent Clear Claimed Marks" => Some(GCEventType::G1ConcurrentClearClaimedMarks),
        "Concurrent Scan Root Regions" => Some(GCEventType::G1ConcurrentScanRootRegions),
        "Concurrent Mark" => Some(GCEventType::G1ConcurrentMark),
        "Concurrent Rebuild Remembered Sets" => {
            Some(GCEventType::G1ConcurrentRebuildRememberedSets)
        }
        "Concurrent Cleanup for Next Mark" => Some(GCEventType::G1ConcurrentCleanupForNextMark),
        "Concurrent Create Live Data" => Some(GCEventType::G1ConcurrentCreateLiveData),
        _ => None,
    }
}

fn nearest_pow2_mb(ratio: f64) -> i64 {
    let mut best = 1i64;
    let mut best_dist = f64::INFINITY;
    let mut candidate = 1i64;
    while candidate <= 512 {
        let dist = (ratio - candidate as f64).abs();
        if dist < best_dist {
            best_dist = dist;
            best = candidate;
        }
        candidate *= 2;
    }
    best
}
