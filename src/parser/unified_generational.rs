//! Serial, Parallel and CMS parser for unified logging (JDK 9+).
//!
//! The three collectors share the generational line shapes and differ only
//! in their generation row labels, full GC phase names and, for CMS, the
//! old-generation cycle. A full collection triggered inside a young one
//! logs as a nested `Pause Full` with its own gcid; the surrounding young
//! event is a wrapper and is dropped.

use std::collections::HashSet;

use crate::event::{GCEvent, GCEventType, Generation, MemoryItem};
use crate::model::{CollectorType, GCModel, LogStyle};
use crate::util::known_double;
use crate::vmoptions::VmOptions;

use super::decorators::{LogClock, parse_unified, strip_gcid};
use super::shared::{
    paren_groups, parse_cpu_time, parse_mem_change, parse_unified_safepoint, split_title,
    trailing_duration,
};
use super::{EventBook, GCLogParser, ParseError, ProgressListener};

pub struct UnifiedGenerationalParser {
    collector: CollectorType,
    book: EventBook,
    clock: LogClock,
    /// The young pause currently between its start and completion lines.
    open_young: Option<i64>,
    /// Young gcids that turned out to wrap a full collection.
    wrappers: HashSet<i64>,
}

impl UnifiedGenerationalParser {
    pub fn new(collector: CollectorType) -> Self {
        Self {
            collector,
            book: EventBook::new(),
            clock: LogClock::new(),
            open_young: None,
            wrappers: HashSet::new(),
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

        let (gcid, payload) = strip_gcid(parsed.rest);
        let Some(gcid) = gcid else {
            return;
        };
        self.handle_event_line(gcid, payload, time, model);
    }

    fn handle_event_line(&mut self, gcid: i64, payload: &str, time: f64, model: &mut GCModel) {
        if let Some(rest) = payload.strip_prefix("Using ") {
            record_workers(rest, model);
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
            && let Some(generation) = generation_row(label.trim_start())
        {
            if let Some((pre, post, cap)) = parse_mem_change(value) {
                self.book
                    .get_or_open(gcid, GCEventType::YoungGC)
                    .update_memory_item(MemoryItem::new(generation, pre, post, cap));
            }
            return;
        }

        let (title, tail) = split_title(payload);
        let groups = paren_groups(title);
        let head = title.split('(').next().unwrap_or(title).trim_end();

        // Serial-style numbered full GC phases.
        if let Some(name) = head.strip_prefix("Phase ")
            && let Some((_, phase_name)) = name.split_once(": ")
            && let Some(ty) = numbered_phase_type(phase_name)
        {
            self.full_phase_line(gcid, ty, payload, time);
            return;
        }
        // Parallel full GC phases carry bare names.
        if let Some(ty) = parallel_phase_type(head) {
            self.full_phase_line(gcid, ty, payload, time);
            return;
        }
        if self.collector == CollectorType::CMS
            && let Some(ty) = cms_phase_type(head)
        {
            self.cms_phase_line(gcid, ty, tail, time);
            return;
        }

        match head {
            "Pause Young" => {
                let cause = groups.first().map(|g| g.to_string());
                let completed = self.top_level_line(gcid, GCEventType::YoungGC, cause, tail, time);
                if completed {
                    if self.wrappers.remove(&gcid) {
                        self.book.discard(gcid);
                    }
                    if self.open_young == Some(gcid) {
                        self.open_young = None;
                    }
                } else {
                    self.open_young = Some(gcid);
                }
            }
            "Pause Full" => {
                if let Some(young) = self.open_young
                    && young != gcid
                {
                    self.wrappers.insert(young);
                }
                let cause = groups.first().map(|g| g.to_string());
                self.top_level_line(gcid, GCEventType::FullGC, cause, tail, time);
            }
            _ => {}
        }
    }

    /// Returns true when the line was a completion line.
    fn top_level_line(
        &mut self,
        gcid: i64,
        ty: GCEventType,
        cause: Option<String>,
        tail: &str,
        time: f64,
    ) -> bool {
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
                if !known_double(event.start_time) {
                    event.start_time = time;
                }
                false
            }
            Some(d) => {
                event.duration = d;
                if !known_double(event.start_time) {
                    event.start_time = time - d;
                }
                if let Some((pre, post, cap)) = heap {
                    event.update_memory_item(MemoryItem::new(Generation::Total, pre, post, cap));
                }
                true
            }
        }
    }

    fn full_phase_line(&mut self, gcid: i64, ty: GCEventType, payload: &str, time: f64) {
        let event = self.book.get_or_open(gcid, GCEventType::FullGC);
        match trailing_duration(payload) {
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
            None => {
                let mut phase = GCEvent::new(ty);
                phase.start_time = time;
                event.add_phase(phase);
            }
        }
    }

    fn cms_phase_line(&mut self, gcid: i64, ty: GCEventType, tail: &str, time: f64) {
        let event = self
            .book
            .get_or_open(gcid, GCEventType::CMSConcurrentMarkSwept);
        if !known_double(event.start_time) {
            event.start_time = time;
        }
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
}

impl GCLogParser for UnifiedGenerationalParser {
    fn collector(&self) -> CollectorType {
        self.collector
    }

    fn style(&self) -> LogStyle {
        LogStyle::Unified
    }

    fn parse(
        &mut self,
        input: &str,
        listener: &mut dyn ProgressListener,
    ) -> Result<GCModel, ParseError> {
        listener.begin_task("Parsing generational log");
        let mut model = GCModel::new(self.collector, LogStyle::Unified);
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

fn record_workers(rest: &str, model: &mut GCModel) {
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

fn generation_row(label: &str) -> Option<Generation> {
    match label {
        "DefNew" | "ParNew" | "PSYoungGen" => Some(Generation::Young),
        "Tenured" | "CMS" | "ParOldGen" | "PSOldGen" => Some(Generation::Old),
        "Metaspace" => Some(Generation::Metaspace),
        _ => None,
    }
}

fn numbered_phase_type(name: &str) -> Option<GCEventType> {
    match name {
        "Mark live objects" => Some(GCEventType::MarkLiveObjects),
        "Compute new object addresses" => Some(GCEventType::ComputeNewObjectAddresses),
        "Adjust pointers" => Some(GCEventType::AdjustPointers),
        "Move objects" => Some(GCEventType::MoveObjects),
        _ => None,
    }
}

fn parallel_phase_type(head: &str) -> Option<GCEventType> {
    match head {
        "Marking Phase" => Some(GCEventType::MarkingPhase),
        "Summary Phase" => Some(GCEventType::SummaryPhase),
        "Adjust Roots" => Some(GCEventType::AdjustRoots),
        "Compaction Phase" => Some(GCEventType::CompactionPhase),
        "Post Compact" => Some(GCEventType::PostCompact),
        _ => None,
    }
}

fn cms_phase_type(head: &str) -> Option<GCEventType> {
    match head {
        "Pause Initial Mark" => Some(GCEventType::CMSInitialMark),
        "Concurrent Mark" => Some(GCEventType::CMSConcurrentMark),
        "Concurrent Preclean" => Some(GCEventType::CMSConcurrentPreclean),
        "Concurrent Abortable Preclean" => Some(GCEventType::CMSConcurrentAbortablePreclean),
        "Pause Remark" => Some(GCEventType::CMSFinalRemark),
        "Concurrent Sweep" => Some(GCEventType::CMSConcurrentSweep),
        "Concurrent Reset" => Some(GCEventType::CMSConcurrentReset),
        _ => None,
    }
}
