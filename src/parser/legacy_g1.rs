//! G1 parser for legacy logging (JDK 8, `-XX:+PrintGCDetails`).
//!
//! Pause lines carry their qualifiers as parenthesized groups:
//!
//! ```text
//! 3.960: [GC pause (G1 Evacuation Pause) (young), 0.0232809 secs]
//!    [Eden: 512.0M(512.0M)->0.0B(512.0M) Survivors: 0.0B->64.0M Heap: 512.0M(10.0G)->64.7M(10.0G)]
//!  [Times: user=0.08 sys=0.02, real=0.02 secs]
//! ```
//!
//! The per-generation detail and CPU lines follow their pause on separate
//! lines, so the parser keeps a cursor to the last stop-the-world event.
//! An `(initial-mark)` young pause opens the concurrent cycle; the cycle
//! closes at `concurrent-cleanup-end`.

use crate::event::{GCEvent, GCEventType, GCSpecialSituation, Generation, MemoryItem};
use crate::model::{CollectorType, GCModel, LogStyle};
use crate::util::{UNKNOWN_DOUBLE, known_double};
use crate::vmoptions::VmOptions;

use super::decorators::{LogClock, parse_legacy};
use super::shared::{
    paren_groups, parse_cpu_time, parse_duration, parse_legacy_safepoint, parse_mem_change,
};
use super::{GCLogParser, ParseError, ProgressListener};

/// Pause qualifiers that are not causes.
const PAUSE_QUALIFIERS: [&str; 4] = ["young", "mixed", "initial-mark", "to-space exhausted"];

pub struct LegacyG1Parser {
    clock: LogClock,
    events: Vec<GCEvent>,
    /// Index of the event the next detail or `[Times: ...]` line belongs to.
    last_stw: Option<usize>,
    cycle: Option<GCEvent>,
}

impl LegacyG1Parser {
    pub fn new() -> Self {
        Self {
            clock: LogClock::new(),
            events: Vec::new(),
            last_stw: None,
            cycle: None,
        }
    }

    fn handle_line(&mut self, line: &str, model: &mut GCModel) {
        if let Some((_, flags)) = line.split_once("CommandLine flags: ") {
            model.vm_options = Some(VmOptions::parse(flags));
            return;
        }
        let parsed = parse_legacy(line);
        let time = self.clock.observe(parsed.uptime, parsed.wallclock);
        if !known_double(model.reference_timestamp) && known_double(self.clock.reference) {
            model.reference_timestamp = self.clock.reference;
        }

        let rest = parsed.rest.trim_start();
        if rest.starts_with("Total time for which application threads") {
            if let Some(sp) = parse_legacy_safepoint(rest, time) {
                model.add_safepoint(sp);
            }
            return;
        }
        if rest.starts_with("[Eden:") {
            self.detail_line(rest);
            return;
        }
        if rest.starts_with("[Times:") {
            if let Some(cpu) = parse_cpu_time(rest)
                && let Some(idx) = self.last_stw
            {
                self.events[idx].cpu_time = Some(cpu);
            }
            return;
        }
        let Some(body) = rest.strip_prefix('[') else {
            return;
        };
        let body = body.trim_end_matches(']');

        if let Some(tail) = body.strip_prefix("GC pause") {
            self.pause_line(tail, body, time);
        } else if let Some(tail) = body.strip_prefix("GC concurrent-") {
            self.concurrent_line(tail, time, model);
        } else if body.starts_with("GC remark") {
            self.cycle_pause_phase(GCEventType::G1Remark, body, time);
            self.last_stw = None;
        } else if body.starts_with("GC cleanup") {
            self.cycle_pause_phase(GCEventType::G1Cleanup, body, time);
            self.last_stw = None;
        } else if let Some(tail) = body.strip_prefix("Full GC") {
            let mut event = GCEvent::new(GCEventType::FullGC);
            event.start_time = time;
            event.cause = paren_groups(tail).first().map(|g| g.to_string());
            event.duration = body
                .rsplit(',')
                .next()
                .and_then(parse_duration)
                .unwrap_or(UNKNOWN_DOUBLE);
            if let Some((pre, post, cap)) = tail
                .split_whitespace()
                .map(|t| t.trim_end_matches(','))
                .find(|t| t.contains("->"))
                .and_then(parse_mem_change)
            {
                event.update_memory_item(MemoryItem::new(Generation::Total, pre, post, cap));
            }
            self.events.push(event);
            self.last_stw = Some(self.events.len() - 1);
        }
    }

    fn pause_line(&mut self, tail: &str, body: &str, time: f64) {
        let groups = paren_groups(tail);
        let mixed = groups.contains(&"mixed");
        let mut event = GCEvent::new(if mixed {
            GCEventType::G1YoungMixedGC
        } else {
            GCEventType::YoungGC
        });
        event.start_time = time;
        event.cause = groups
            .iter()
            .find(|g| !PAUSE_QUALIFIERS.contains(&g.trim()))
            .map(|g| g.to_string());
        event.duration = body
            .rsplit(',')
            .next()
            .and_then(parse_duration)
            .unwrap_or(UNKNOWN_DOUBLE);
        if groups.contains(&"to-space exhausted") {
            event.add_special_situation(GCSpecialSituation::ToSpaceExhausted);
        }
        if groups.contains(&"initial-mark") {
            let cycle = self.cycle.get_or_insert_with(|| {
                GCEvent::new(GCEventType::G1ConcurrentCycle)
            });
            cycle.start_time = time;
        }
        self.events.push(event);
        self.last_stw = Some(self.events.len() - 1);
    }

    /// `root-region-scan-start`, `mark-end, 1.0897678 secs` and friends.
    fn concurrent_line(&mut self, tail: &str, time: f64, model: &mut GCModel) {
        let name_end = tail
            .find(|c: char| c == ',' || c == ' ')
            .unwrap_or(tail.len());
        let name = &tail[..name_end];
        if let Some(phase_name) = name.strip_suffix("-start") {
            if let Some(ty) = concurrent_phase_type(phase_name) {
                let mut phase = GCEvent::new(ty);
                phase.start_time = time;
                self.cycle_mut(time).add_phase(phase);
            }
            return;
        }
        let Some(phase_name) = name.strip_suffix("-end") else {
            return;
        };
        let Some(ty) = concurrent_phase_type(phase_name) else {
            return;
        };
        let duration = tail
            .rsplit(',')
            .next()
            .and_then(parse_duration)
            .unwrap_or(UNKNOWN_DOUBLE);
        let cycle = self.cycle_mut(time);
        if let Some(phase) = cycle.last_phase_of_type_mut(ty) {
            phase.duration = duration;
            if !known_double(phase.start_time) && known_double(duration) {
                phase.start_time = time - duration;
            }
        } else {
            let mut phase = GCEvent::new(ty);
            phase.start_time = if known_double(duration) {
                time - duration
            } else {
                time
            };
            phase.duration = duration;
            cycle.add_phase(phase);
        }
        if ty == GCEventType::G1ConcurrentCleanupForNextMark
            && let Some(cycle) = self.cycle.take()
        {
            model.add_event(cycle);
        }
    }

    /// The remark and cleanup pauses belong to the concurrent cycle.
    fn cycle_pause_phase(&mut self, ty: GCEventType, body: &str, time: f64) {
        let duration = body
            .rsplit(',')
            .next()
            .and_then(parse_duration)
            .unwrap_or(UNKNOWN_DOUBLE);
        let mut phase = GCEvent::new(ty);
        phase.start_time = time;
        phase.duration = duration;
        self.cycle_mut(time).add_phase(phase);
    }

    fn cycle_mut(&mut self, start_time: f64) -> &mut GCEvent {
        self.cycle.get_or_insert_with(|| {
            let mut event = GCEvent::new(GCEventType::G1ConcurrentCycle);
            event.start_time = start_time;
            event
        })
    }

    /// `[Eden: A(Ac)->B(Bc) Survivors: A->B Heap: A(Ac)->B(Bc)]`
    fn detail_line(&mut self, rest: &str) {
        let Some(idx) = self.last_stw else {
            return;
        };
        let inner = rest.trim_start_matches('[').trim_end_matches(']');
        for (label, generation) in [
            ("Eden:", Generation::Eden),
            ("Survivors:", Generation::Survivor),
            ("Heap:", Generation::Total),
        ] {
            let Some(pos) = inner.find(label) else {
                continue;
            };
            let value = inner[pos + label.len()..].trim_start();
            if let Some((pre, post, cap)) = value
                .split_whitespace()
                .next()
                .and_then(parse_mem_change)
            {
                self.events[idx].update_memory_item(MemoryItem::new(generation, pre, post, cap));
            }
        }
    }
}

impl Default for LegacyG1Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl GCLogParser for LegacyG1Parser {
    fn collector(&self) -> CollectorType {
        CollectorType::G1
    }

    fn style(&self) -> LogStyle {
        LogStyle::Legacy
    }

    fn parse(
        &mut self,
        input: &str,
        listener: &mut dyn ProgressListener,
    ) -> Result<GCModel, ParseError> {
        listener.begin_task("Parsing G1 log");
        let mut model = GCModel::new(CollectorType::G1, LogStyle::Legacy);
        let total = input.len().max(1);
        let mut seen = 0usize;
        for line in input.lines() {
            seen += line.len() + 1;
            self.handle_line(line, &mut model);
            listener.worked((seen * 100 / total) as u32);
        }
        for event in self.events.drain(..) {
            model.add_event(event);
        }
        if let Some(cycle) = self.cycle.take() {
            model.add_event(cycle);
        }
        Ok(model)
    }
}

fn concurrent_phase_type(name: &str) -> Option<GCEventType> {
    match name {
        "root-region-scan" => Some(GCEventType::G1ConcurrentScanRootRegions),
        "mark" => Some(GCEventType::G1ConcurrentMark),
        "cleanup" => Some(GCEventType::G1ConcurrentCleanupForNextMark),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::NoopProgressListener;
    use crate::util::{GB, MB};

    fn parse(log: &str) -> GCModel {
        let mut parser = LegacyG1Parser::new();
        let mut model = parser.parse(log, &mut NoopProgressListener).unwrap();
        model.calculate_derived_info().unwrap();
        model
    }

    #[test]
    fn young_pause_with_detail_and_times() {
        let log = "\
3.960: [GC pause (G1 Evacuation Pause) (young), 0.0232809 secs]
   [Eden: 512.0M(512.0M)->0.0B(512.0M) Survivors: 0.0B->64.0M Heap: 512.0M(10.0G)->64.7M(10.0G)]
 [Times: user=0.08 sys=0.02, real=0.02 secs]
";
        let model = parse(log);
        assert_eq!(model.gc_events().len(), 1);
        let young = &model.gc_events()[0];
        assert_eq!(young.event_type, GCEventType::YoungGC);
        assert_eq!(young.cause.as_deref(), Some("G1 Evacuation Pause"));
        assert_eq!(young.start_time, 3_960.0);
        assert!((young.duration - 23.2809).abs() < 1e-9);
        assert_eq!(young.memory_item(Generation::Eden).pre_used, 512 * MB);
        assert_eq!(young.memory_item(Generation::Survivor).post_used, 64 * MB);
        assert_eq!(young.memory_item(Generation::Total).total, 10 * GB);
        assert_eq!(young.cpu_time.unwrap().user, 80.0);
    }

    #[test]
    fn initial_mark_opens_the_concurrent_cycle() {
        let log = "\
29.211: [GC pause (G1 Humongous Allocation) (young) (initial-mark), 0.0261704 secs]
29.238: [GC concurrent-root-region-scan-start]
29.242: [GC concurrent-root-region-scan-end, 0.0030584 secs]
29.242: [GC concurrent-mark-start]
30.332: [GC concurrent-mark-end, 1.0897678 secs]
30.332: [GC remark 30.332: [Finalize Marking, 0.0007422 secs] 30.333: [GC ref-proc, 0.0001841 secs], 0.0090032 secs]
30.341: [GC cleanup 1790M->1304M(10G), 0.0048760 secs]
30.342: [GC concurrent-cleanup-start]
30.342: [GC concurrent-cleanup-end, 0.0000754 secs]
";
        let model = parse(log);
        assert_eq!(model.gc_events().len(), 2);

        let young = &model.gc_events()[0];
        assert_eq!(young.event_type, GCEventType::YoungGC);
        assert_eq!(young.cause.as_deref(), Some("G1 Humongous Allocation"));

        let cycle = &model.gc_events()[1];
        assert_eq!(cycle.event_type, GCEventType::G1ConcurrentCycle);
        assert_eq!(cycle.start_time, 29_211.0);
        assert_eq!(cycle.phases.len(), 5);
        let mark = cycle
            .last_phase_of_type(GCEventType::G1ConcurrentMark)
            .unwrap();
        assert_eq!(mark.start_time, 29_242.0);
        assert!((mark.duration - 1_089.7678).abs() < 1e-9);
        // Cycle pause is remark plus cleanup.
        assert!((cycle.pause - (9.0032 + 4.876)).abs() < 1e-9);
        // Cycle runs until the concurrent cleanup finishes.
        assert!((cycle.duration - (30_342.0754 - 29_211.0)).abs() < 1e-6);
    }

    #[test]
    fn mixed_pause_and_to_space_exhaustion() {
        let log = "\
167.214: [GC pause (G1 Evacuation Pause) (mixed), 0.0212277 secs]
170.500: [GC pause (G1 Evacuation Pause) (young) (to-space exhausted), 0.4413696 secs]
";
        let model = parse(log);
        assert_eq!(model.gc_events().len(), 2);
        assert_eq!(model.gc_events()[0].event_type, GCEventType::G1YoungMixedGC);
        let exhausted = &model.gc_events()[1];
        assert!(exhausted.has_special_situation(GCSpecialSituation::ToSpaceExhausted));
    }

    #[test]
    fn full_gc_line() {
        let log = "\
200.123: [Full GC (System.gc())  2683M->1642M(10G), 4.1462928 secs]
";
        let model = parse(log);
        assert_eq!(model.gc_events().len(), 1);
        let full = &model.gc_events()[0];
        assert_eq!(full.event_type, GCEventType::FullGC);
        assert_eq!(full.cause.as_deref(), Some("System.gc()"));
        assert!((full.duration - 4_146.2928).abs() < 1e-9);
        assert_eq!(full.memory_item(Generation::Total).pre_used, 2_683 * MB);
        assert_eq!(full.memory_item(Generation::Total).total, 10 * GB);
    }
}
