//! Serial, Parallel and CMS parser for legacy logging (JDK 8 and older,
//! `-XX:+PrintGCDetails`).
//!
//! Legacy collections log as one bracketed line per event, with generation
//! clauses nested inside:
//!
//! ```text
//! 675.110: [GC (Allocation Failure) 675.110: [ParNew: 1922432K->174720K(1922432K),
//! 0.1691241 secs] 2100204K->374933K(4019584K), 0.1706065 secs] [Times: ...]
//! ```
//!
//! CMS additionally interleaves concurrent phase fragments, sometimes glued
//! into the middle of another event's line. Fragments are lifted out before
//! the bracket walk and folded into the open old-generation cycle.

use crate::event::{GCEvent, GCEventType, GCSpecialSituation, Generation, MemoryItem};
use crate::model::{CollectorType, GCModel, LogStyle};
use crate::util::{MS2S, UNKNOWN_DOUBLE, known_double};
use crate::vmoptions::VmOptions;

use super::decorators::{LogClock, parse_legacy};
use super::shared::{parse_cpu_time, parse_duration, parse_legacy_safepoint, parse_mem_change,
    parse_mem_size, paren_groups};
use super::{GCLogParser, ParseError, ProgressListener};

pub struct LegacyGenerationalParser {
    collector: CollectorType,
    clock: LogClock,
    /// Open old-generation cycle, CMS only.
    cycle: Option<GCEvent>,
}

impl LegacyGenerationalParser {
    pub fn new(collector: CollectorType) -> Self {
        Self {
            collector,
            clock: LogClock::new(),
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

        if parsed.rest.starts_with("Total time for which application threads") {
            if let Some(sp) = parse_legacy_safepoint(parsed.rest, time) {
                model.add_safepoint(sp);
            }
            return;
        }

        let (cleaned, fragments) = extract_cms_fragments(parsed.rest);
        for (frag_time, frag) in fragments {
            let frag_time = if known_double(frag_time) { frag_time } else { time };
            self.handle_cms_fragment(&frag, frag_time, model);
        }

        let cleaned = cleaned.trim_start();
        if cleaned.starts_with('[') {
            self.handle_event(cleaned, time, model);
        }
    }

    /// A `CMS-concurrent-*` fragment, brackets already stripped.
    fn handle_cms_fragment(&mut self, inner: &str, time: f64, model: &mut GCModel) {
        let Some(name) = inner.strip_prefix("CMS-concurrent-") else {
            return;
        };
        if let Some(phase_name) = name.strip_suffix("-start") {
            if let Some(ty) = concurrent_phase_type(phase_name) {
                let mut phase = GCEvent::new(ty);
                phase.start_time = time;
                self.cycle_mut(time).add_phase(phase);
            }
            return;
        }
        let Some((phase_name, timings)) = name.split_once(':') else {
            return;
        };
        let Some(ty) = concurrent_phase_type(phase_name) else {
            return;
        };
        // "0.534/0.538 secs" is cpu/wall; the wall time is the duration.
        let wall = timings
            .trim()
            .trim_end_matches(" secs")
            .split('/')
            .nth(1)
            .and_then(|w| w.parse::<f64>().ok())
            .map(|w| w * MS2S);
        let Some(duration) = wall else {
            return;
        };
        let cycle = self.cycle_mut(time - duration);
        if let Some(phase) = cycle.last_phase_of_type_mut(ty) {
            phase.duration = duration;
            if !known_double(phase.start_time) {
                phase.start_time = time - duration;
            }
        } else {
            let mut phase = GCEvent::new(ty);
            phase.start_time = time - duration;
            phase.duration = duration;
            cycle.add_phase(phase);
        }
        if ty == GCEventType::CMSConcurrentReset {
            self.close_cycle(model);
        }
    }

    fn cycle_mut(&mut self, start_time: f64) -> &mut GCEvent {
        self.cycle.get_or_insert_with(|| {
            let mut event = GCEvent::new(GCEventType::CMSConcurrentMarkSwept);
            event.start_time = start_time;
            event
        })
    }

    fn close_cycle(&mut self, model: &mut GCModel) {
        if let Some(cycle) = self.cycle.take() {
            model.add_event(cycle);
        }
    }

    /// One bracketed collection line, fragments already removed.
    fn handle_event(&mut self, cleaned: &str, time: f64, model: &mut GCModel) {
        let Some(close) = matching_bracket(cleaned, 0) else {
            return;
        };
        let body = &cleaned[1..close];
        let groups = nested_groups(body);
        let header_end = groups.first().map(|g| g.prefix_start).unwrap_or(body.len());
        let header = &body[..header_end];
        if !header.trim_start().starts_with("GC") && !header.trim_start().starts_with("Full GC") {
            return;
        }
        let cause = paren_groups(header)
            .into_iter()
            .find(|g| !g.is_empty())
            .map(str::to_string);

        match cause.as_deref() {
            Some("CMS Initial Mark") => {
                self.initial_mark_line(body, &groups, time);
                return;
            }
            Some("CMS Final Remark") => {
                self.final_remark_line(body, &groups, time);
                return;
            }
            _ => {}
        }

        let is_full = header.trim_start().starts_with("Full GC");
        let mut event = GCEvent::new(if is_full {
            GCEventType::FullGC
        } else {
            GCEventType::YoungGC
        });
        event.start_time = time;
        event.cause = cause;
        event.duration = body
            .rsplit(',')
            .next()
            .and_then(parse_duration)
            .unwrap_or(UNKNOWN_DOUBLE);

        if let Some((pre, post, cap)) = depth_zero_mem_change(body) {
            event.update_memory_item(MemoryItem::new(Generation::Total, pre, post, cap));
        }
        for group in &groups {
            self.generation_clause(&body[group.open + 1..group.close], &mut event);
        }
        if cleaned.contains("[Times:")
            && let Some(cpu) = parse_cpu_time(cleaned)
        {
            event.cpu_time = Some(cpu);
        }
        model.add_event(event);
    }

    /// `[Label: A->B(C), d secs]` or `[Label (marker): A->B(C), ...]`.
    fn generation_clause(&mut self, inner: &str, event: &mut GCEvent) {
        let Some((label, value)) = inner.split_once(':') else {
            return;
        };
        if label.contains("promotion failed") {
            event.add_special_situation(GCSpecialSituation::PromotionFailed);
        }
        if label.contains("concurrent mode failure") {
            event.add_special_situation(GCSpecialSituation::ConcurrentModeFailure);
        }
        let Some(generation) = generation_of(label) else {
            return;
        };
        let change = value
            .split_whitespace()
            .find(|t| t.contains("->"))
            .map(|t| t.trim_end_matches([',', ']']))
            .and_then(parse_mem_change);
        if let Some((pre, post, cap)) = change {
            event.update_memory_item(MemoryItem::new(generation, pre, post, cap));
        } else if let Some((used, cap)) = parse_occupancy(value) {
            // Occupancy form, `1152303K(2097152K)`, logged by the CMS
            // initial mark and remark clauses.
            let mut item = MemoryItem::unknown(generation);
            item.pre_used = used;
            item.total = cap;
            event.update_memory_item(item);
        }
    }

    /// `[GC (CMS Initial Mark) [1 CMS-initial-mark: used(cap)] heap(cap), d secs]`
    fn initial_mark_line(&mut self, body: &str, groups: &[NestedGroup], time: f64) {
        let duration = body
            .rsplit(',')
            .next()
            .and_then(parse_duration)
            .unwrap_or(UNKNOWN_DOUBLE);
        let mut phase = GCEvent::new(GCEventType::CMSInitialMark);
        phase.start_time = time;
        phase.duration = duration;

        let cycle = self.cycle_mut(time);
        cycle.start_time = time;
        for group in groups {
            let inner = &body[group.open + 1..group.close];
            if let Some((label, value)) = inner.split_once(':')
                && label.contains("CMS-initial-mark")
                && let Some((used, cap)) = parse_occupancy(value)
            {
                let mut item = MemoryItem::unknown(Generation::Old);
                item.pre_used = used;
                item.total = cap;
                cycle.update_memory_item(item);
            }
        }
        cycle.add_phase(phase);
    }

    /// The final remark line nests the rescan and reference/class clauses;
    /// they become sub-phases of the remark pause.
    fn final_remark_line(&mut self, body: &str, groups: &[NestedGroup], time: f64) {
        let duration = body
            .rsplit(',')
            .next()
            .and_then(parse_duration)
            .unwrap_or(UNKNOWN_DOUBLE);
        let mut remark = GCEvent::new(GCEventType::CMSFinalRemark);
        remark.start_time = time;
        remark.duration = duration;

        for group in groups {
            let inner = &body[group.open + 1..group.close];
            if inner.contains(':') {
                // YG occupancy and 1 CMS-remark clauses carry no timing.
                continue;
            }
            let Some((name, tail)) = inner.rsplit_once(',') else {
                continue;
            };
            let Some(ty) = remark_step_type(name.trim()) else {
                continue;
            };
            let Some(step_duration) = parse_duration(tail) else {
                continue;
            };
            let mut step = GCEvent::new(ty);
            step.start_time = if known_double(group.prefix_time) {
                group.prefix_time
            } else {
                time
            };
            step.duration = step_duration;
            remark.add_phase(step);
        }
        self.cycle_mut(time).add_phase(remark);
    }
}

impl GCLogParser for LegacyGenerationalParser {
    fn collector(&self) -> CollectorType {
        self.collector
    }

    fn style(&self) -> LogStyle {
        LogStyle::Legacy
    }

    fn parse(
        &mut self,
        input: &str,
        listener: &mut dyn ProgressListener,
    ) -> Result<GCModel, ParseError> {
        listener.begin_task("Parsing generational log");
        let mut model = GCModel::new(self.collector, LogStyle::Legacy);
        let total = input.len().max(1);
        let mut seen = 0usize;
        for line in input.lines() {
            seen += line.len() + 1;
            self.handle_line(line, &mut model);
            listener.worked((seen * 100 / total) as u32);
        }
        // An aborted cycle still carries its completed phases.
        self.close_cycle(&mut model);
        Ok(model)
    }
}

fn concurrent_phase_type(name: &str) -> Option<GCEventType> {
    match name {
        "mark" => Some(GCEventType::CMSConcurrentMark),
        "preclean" => Some(GCEventType::CMSConcurrentPreclean),
        "abortable-preclean" => Some(GCEventType::CMSConcurrentAbortablePreclean),
        "sweep" => Some(GCEventType::CMSConcurrentSweep),
        "reset" => Some(GCEventType::CMSConcurrentReset),
        _ => None,
    }
}

fn remark_step_type(name: &str) -> Option<GCEventType> {
    if name.starts_with("Rescan") {
        return Some(GCEventType::Rescan);
    }
    match name {
        "weak refs processing" => Some(GCEventType::WeakRefsProcessing),
        "class unloading" => Some(GCEventType::ClassUnloading),
        "scrub symbol table" => Some(GCEventType::ScrubSymbolTable),
        "scrub string table" => Some(GCEventType::ScrubStringTable),
        _ => None,
    }
}

fn generation_of(label: &str) -> Option<Generation> {
    let label = label.trim();
    if label.starts_with("ParNew") || label.starts_with("DefNew") || label.starts_with("PSYoungGen")
    {
        Some(Generation::Young)
    } else if label.starts_with("Tenured")
        || label.starts_with("ParOldGen")
        || label.starts_with("PSOldGen")
        || label.starts_with("CMS")
    {
        Some(Generation::Old)
    } else if label.starts_with("Metaspace") || label.starts_with("Perm") {
        Some(Generation::Metaspace)
    } else {
        None
    }
}

/// The whole-heap transition of an event body, read outside any nested
/// generation clause.
fn depth_zero_mem_change(body: &str) -> Option<(i64, i64, i64)> {
    let mut outside = String::with_capacity(body.len());
    let mut depth = 0usize;
    for c in body.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => outside.push(c),
            _ => {}
        }
    }
    outside
        .split_whitespace()
        .map(|t| t.trim_end_matches([',', ']']))
        .find_map(|t| t.contains("->").then(|| parse_mem_change(t)).flatten())
}

/// `"1152303K(2097152K)"` to `(used, capacity)`.
fn parse_occupancy(s: &str) -> Option<(i64, i64)> {
    let s = s.split_whitespace().next()?.trim_end_matches([',', ']']);
    let (used, rest) = s.split_once('(')?;
    let cap = rest.strip_suffix(')')?;
    Some((parse_mem_size(used)?, parse_mem_size(cap)?))
}

fn matching_bracket(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in s.bytes().enumerate().skip(open) {
        match b {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

struct NestedGroup {
    open: usize,
    close: usize,
    /// Where the group starts once its glued `675.110: ` prefix is included.
    prefix_start: usize,
    /// Uptime carried by the glued prefix, ms.
    prefix_time: f64,
}

/// Depth-one bracket groups of a body, with any uptime prefix glued to
/// their opening bracket.
fn nested_groups(body: &str) -> Vec<NestedGroup> {
    let mut out = Vec::new();
    let mut i = 0;
    while let Some(pos) = body[i..].find('[') {
        let open = i + pos;
        let Some(close) = matching_bracket(body, open) else {
            break;
        };
        let (prefix_start, prefix_time) = glued_prefix(body, open);
        out.push(NestedGroup {
            open,
            close,
            prefix_start,
            prefix_time,
        });
        i = close + 1;
    }
    out
}

/// Scan back from an opening bracket over a glued `675.110: ` uptime
/// prefix. Returns the prefix start and its time in ms.
fn glued_prefix(s: &str, open: usize) -> (usize, f64) {
    let bytes = s.as_bytes();
    let mut j = open;
    while j > 0 {
        let b = bytes[j - 1];
        if b.is_ascii_digit() || b == b'.' || b == b':' || b == b' ' {
            j -= 1;
        } else {
            break;
        }
    }
    let candidate = s[j..open].trim();
    if let Some(sec) = candidate
        .strip_suffix(':')
        .and_then(|v| v.parse::<f64>().ok())
    {
        (j, sec * MS2S)
    } else {
        (open, UNKNOWN_DOUBLE)
    }
}

/// Lift `[CMS-concurrent-*]` fragments (and their glued uptime prefixes)
/// out of a line. Returns the cleaned line and the fragments with their
/// own times.
fn extract_cms_fragments(rest: &str) -> (String, Vec<(f64, String)>) {
    let mut cleaned = String::with_capacity(rest.len());
    let mut fragments = Vec::new();
    let mut i = 0;
    while let Some(pos) = rest[i..].find("[CMS-concurrent-") {
        let open = i + pos;
        let Some(len) = rest[open..].find(']') else {
            break;
        };
        let close = open + len;
        let (prefix_start, prefix_time) = glued_prefix(rest, open);
        let keep = prefix_start.max(i);
        cleaned.push_str(&rest[i..keep]);
        fragments.push((prefix_time, rest[open + 1..close].to_string()));
        i = close + 1;
    }
    cleaned.push_str(&rest[i..]);
    (cleaned, fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::NoopProgressListener;
    use crate::util::KB;

    fn parse(collector: CollectorType, log: &str) -> GCModel {
        let mut parser = LegacyGenerationalParser::new(collector);
        let mut model = parser.parse(log, &mut NoopProgressListener).unwrap();
        model.calculate_derived_info().unwrap();
        model
    }

    #[test]
    fn serial_young_line() {
        let log = "\
0.226: [GC (Allocation Failure) 0.226: [DefNew: 69952K->8704K(78656K), 0.0266447 secs] 69952K->23276K(253440K), 0.0267099 secs] [Times: user=0.02 sys=0.01, real=0.03 secs]
";
        let model = parse(CollectorType::Serial, log);
        assert_eq!(model.gc_events().len(), 1);
        let young = &model.gc_events()[0];
        assert_eq!(young.event_type, GCEventType::YoungGC);
        assert_eq!(young.cause.as_deref(), Some("Allocation Failure"));
        assert_eq!(young.start_time, 226.0);
        assert!((young.duration - 26.7099).abs() < 1e-9);
        assert_eq!(young.memory_item(Generation::Young).pre_used, 69_952 * KB);
        assert_eq!(young.memory_item(Generation::Total).post_used, 23_276 * KB);
        assert_eq!(young.cpu_time.unwrap().real, 30.0);
    }

    #[test]
    fn parallel_full_gc_line() {
        let log = "\
2.650: [Full GC (Ergonomics) [PSYoungGen: 10728K->0K(114688K)] [ParOldGen: 126K->10650K(262144K)] 10854K->10650K(376832K), [Metaspace: 15149K->15149K(1062912K)], 0.0831963 secs] [Times: user=0.44 sys=0.01, real=0.08 secs]
";
        let model = parse(CollectorType::Parallel, log);
        assert_eq!(model.gc_events().len(), 1);
        let full = &model.gc_events()[0];
        assert_eq!(full.event_type, GCEventType::FullGC);
        assert_eq!(full.cause.as_deref(), Some("Ergonomics"));
        assert!((full.duration - 83.1963).abs() < 1e-9);
        assert_eq!(full.memory_item(Generation::Young).post_used, 0);
        assert_eq!(full.memory_item(Generation::Old).post_used, 10_650 * KB);
        assert_eq!(full.memory_item(Generation::Metaspace).total, 1_062_912 * KB);
        assert_eq!(full.memory_item(Generation::Total).total, 376_832 * KB);
    }

    #[test]
    fn cms_cycle_collects_all_phases() {
        let log = "\
675.110: [GC (Allocation Failure) 675.110: [ParNew: 1922432K->174720K(1922432K), 0.1691241 secs] 2100204K->374933K(4019584K), 0.1706065 secs] [Times: user=0.61 sys=0.02, real=0.17 secs]
675.461: [GC (CMS Initial Mark) [1 CMS-initial-mark: 1152303K(2097152K)] 1200040K(4019584K), 0.0825507 secs] [Times: user=0.28 sys=0.00, real=0.08 secs]
675.551: [CMS-concurrent-mark-start]
676.085: [CMS-concurrent-mark: 0.521/0.534 secs] [Times: user=1.68 sys=0.05, real=0.53 secs]
676.085: [CMS-concurrent-preclean-start]
676.097: [CMS-concurrent-preclean: 0.011/0.012 secs]
676.097: [CMS-concurrent-abortable-preclean-start]
CMS: abort preclean due to time 681.043: [CMS-concurrent-abortable-preclean: 4.340/4.946 secs]
681.046: [GC (CMS Final Remark) [YG occupancy: 633220 K (1922432 K)]681.046: [Rescan (parallel) , 0.3247499 secs]681.371: [weak refs processing, 0.0000506 secs]681.371: [class unloading, 0.0012108 secs]681.372: [scrub symbol table, 0.0014569 secs]681.374: [scrub string table, 0.0001905 secs][1 CMS-remark: 1152303K(2097152K)] 1785523K(4019584K), 0.4397038 secs] [Times: user=1.70 sys=0.01, real=0.44 secs]
681.486: [CMS-concurrent-sweep-start]
684.590: [CMS-concurrent-sweep: 3.102/3.104 secs]
684.590: [CMS-concurrent-reset-start]
684.598: [CMS-concurrent-reset: 0.008/0.008 secs]
Total time for which application threads were stopped: 0.4406278 seconds, Stopping threads took: 0.0000077 seconds
";
        let model = parse(CollectorType::CMS, log);
        assert_eq!(model.gc_events().len(), 2);

        let young = &model.gc_events()[0];
        assert_eq!(young.event_type, GCEventType::YoungGC);
        assert_eq!(young.memory_item(Generation::Young).total, 1_922_432 * KB);

        let cycle = &model.gc_events()[1];
        assert_eq!(cycle.event_type, GCEventType::CMSConcurrentMarkSwept);
        assert_eq!(cycle.start_time, 675_461.0);
        assert_eq!(cycle.phases.len(), 7);
        assert_eq!(cycle.memory_item(Generation::Old).pre_used, 1_152_303 * KB);

        let mark = cycle
            .last_phase_of_type(GCEventType::CMSConcurrentMark)
            .unwrap();
        assert_eq!(mark.start_time, 675_551.0);
        assert!((mark.duration - 534.0).abs() < 1e-9);

        let remark = cycle
            .last_phase_of_type(GCEventType::CMSFinalRemark)
            .unwrap();
        assert!((remark.duration - 439.7038).abs() < 1e-9);
        assert_eq!(remark.phases.len(), 5);
        let rescan = remark.last_phase_of_type(GCEventType::Rescan).unwrap();
        assert_eq!(rescan.start_time, 681_046.0);
        assert!((rescan.duration - 324.7499).abs() < 1e-9);

        // Cycle pause is initial mark plus final remark.
        assert!((cycle.pause - (82.5507 + 439.7038)).abs() < 1e-9);
        // Cycle runs until the reset finishes.
        assert!((cycle.duration - (684_598.0 - 675_461.0)).abs() < 1e-9);

        assert_eq!(model.safepoints().len(), 1);
        assert!((model.safepoints()[0].time_to_enter - 0.0077).abs() < 1e-9);
    }

    #[test]
    fn full_log_with_two_cycles() {
        let log = "\
675.110: [GC (Allocation Failure) 675.110: [ParNew: 1922432K->174720K(1922432K), 0.1691241 secs] 2100204K->374933K(4019584K), 0.1706065 secs]
675.461: [GC (CMS Initial Mark) [1 CMS-initial-mark: 1152303K(2097152K)] 1200040K(4019584K), 0.0825507 secs]
675.551: [CMS-concurrent-mark-start]
676.085: [CMS-concurrent-mark: 0.521/0.534 secs]
676.085: [CMS-concurrent-preclean-start]
676.097: [CMS-concurrent-preclean: 0.011/0.012 secs]
676.097: [CMS-concurrent-abortable-preclean-start]
CMS: abort preclean due to time 681.043: [CMS-concurrent-abortable-preclean: 4.340/4.946 secs]
681.046: [GC (CMS Final Remark) [YG occupancy: 633220 K (1922432 K)]681.046: [Rescan (parallel) , 0.3247499 secs]681.371: [weak refs processing, 0.0000506 secs]681.371: [class unloading, 0.0012108 secs]681.372: [scrub symbol table, 0.0014569 secs]681.374: [scrub string table, 0.0001905 secs][1 CMS-remark: 1152303K(2097152K)] 1785523K(4019584K), 0.4397038 secs]
681.486: [CMS-concurrent-sweep-start]
684.590: [CMS-concurrent-sweep: 3.102/3.104 secs]
684.590: [CMS-concurrent-reset-start]
684.598: [CMS-concurrent-reset: 0.008/0.008 secs]
690.000: [GC (Allocation Failure) 690.000: [ParNew: 1922432K->170000K(1922432K), 0.1500000 secs] 2000000K->380000K(4019584K), 0.1510000 secs]
700.000: [GC (Allocation Failure) 700.000: [ParNew: 1922432K->168000K(1922432K), 0.1400000 secs] 1990000K->390000K(4019584K), 0.1410000 secs]
710.000: [GC (CMS Initial Mark) [1 CMS-initial-mark: 1300000K(2097152K)] 1400000K(4019584K), 0.0500000 secs]
710.100: [CMS-concurrent-mark-start]
711.000: [CMS-concurrent-mark: 0.850/0.900 secs]
711.000: [CMS-concurrent-preclean-start]
711.050: [CMS-concurrent-preclean: 0.045/0.050 secs]
711.050: [CMS-concurrent-abortable-preclean-start]
713.000: [CMS-concurrent-abortable-preclean: 1.900/1.950 secs]
713.010: [GC (CMS Final Remark) [YG occupancy: 700000 K (1922432 K)]713.010: [Rescan (parallel) , 0.1500000 secs]713.160: [weak refs processing, 0.0001000 secs]713.160: [class unloading, 0.0010000 secs]713.162: [scrub symbol table, 0.0012000 secs]713.163: [scrub string table, 0.0002000 secs][1 CMS-remark: 1300000K(2097152K)] 1800000K(4019584K), 0.2000000 secs]
713.300: [CMS-concurrent-sweep-start]
716.000: [CMS-concurrent-sweep: 2.650/2.700 secs]
716.000: [CMS-concurrent-reset-start]
716.010: [CMS-concurrent-reset: 0.010/0.010 secs]
725.000: [GC (Allocation Failure) 725.000: [ParNew: 1922432K->160000K(1922432K), 0.1300000 secs] 1980000K->400000K(4019584K), 0.1310000 secs]
1046.349: [GC (Allocation Failure) 1046.349: [ParNew (promotion failed): 1922432K->1922432K(1922432K), 1.5094221 secs] 3826543K->3850333K(4019584K), 1.5095815 secs]
1050.000: [Full GC (System.gc()) 1050.000: [CMS: 1800000K->900000K(2097152K), 3.2000000 secs] 2500000K->1000000K(4019584K), [Metaspace: 72745K->72745K(1118208K)], 3.2100000 secs]
1100.000: [GC (Allocation Failure) 1100.000: [ParNew: 1922432K->150000K(1922432K), 0.1200000 secs] 1970000K->410000K(4019584K), 0.1210000 secs]
1200.000: [GC (Allocation Failure) 1200.000: [ParNew: 1922432K->140000K(1922432K), 0.1100000 secs] 1960000K->420000K(4019584K), 0.1110000 secs]
Total time for which application threads were stopped: 0.4406278 seconds, Stopping threads took: 0.0000077 seconds
";
        let model = parse(CollectorType::CMS, log);
        assert_eq!(model.gc_events().len(), 10);

        let cycles: Vec<_> = model
            .gc_events()
            .iter()
            .filter(|e| e.event_type == GCEventType::CMSConcurrentMarkSwept)
            .collect();
        assert_eq!(cycles.len(), 2);
        for cycle in &cycles {
            assert_eq!(cycle.phases.len(), 7);
            let remark = cycle
                .last_phase_of_type(GCEventType::CMSFinalRemark)
                .unwrap();
            assert_eq!(remark.phases.len(), 5);
        }

        let full = model
            .gc_events()
            .iter()
            .find(|e| e.event_type == GCEventType::FullGC)
            .unwrap();
        assert_eq!(full.cause.as_deref(), Some("System.gc()"));
        assert_eq!(full.memory_item(Generation::Old).post_used, 900_000 * KB);

        assert_eq!(model.safepoints().len(), 1);
        assert!((model.safepoints()[0].time_to_enter - 0.0077).abs() < 1e-9);
    }

    #[test]
    fn concurrent_mode_failure_completes_the_mark_fragment() {
        let log = "\
714.000: [GC (CMS Initial Mark) [1 CMS-initial-mark: 2034154K(2097152K)] 2099561K(4019584K), 0.0421234 secs]
714.050: [CMS-concurrent-mark-start]
714.319: [Full GC (Allocation Failure) 714.319: [CMS714.860: [CMS-concurrent-mark: 0.534/0.538 secs] (concurrent mode failure): 2034154K->1051300K(2097152K), 4.8157386 secs] 2099561K->1051300K(4019584K), [Metaspace: 72745K->72745K(1118208K)], 4.8162155 secs] [Times: user=4.81 sys=0.01, real=4.82 secs]
";
        let model = parse(CollectorType::CMS, log);
        assert_eq!(model.gc_events().len(), 2);

        let full = model
            .gc_events()
            .iter()
            .find(|e| e.event_type == GCEventType::FullGC)
            .unwrap();
        assert!(full.has_special_situation(GCSpecialSituation::ConcurrentModeFailure));
        assert_eq!(full.memory_item(Generation::Old).post_used, 1_051_300 * KB);
        assert_eq!(full.memory_item(Generation::Total).pre_used, 2_099_561 * KB);
        assert!((full.duration - 4_816.2155).abs() < 1e-9);

        // The aborted cycle keeps its completed mark phase.
        let cycle = model
            .gc_events()
            .iter()
            .find(|e| e.event_type == GCEventType::CMSConcurrentMarkSwept)
            .unwrap();
        let mark = cycle
            .last_phase_of_type(GCEventType::CMSConcurrentMark)
            .unwrap();
        assert_eq!(mark.start_time, 714_050.0);
        assert!((mark.duration - 538.0).abs() < 1e-9);
    }

    #[test]
    fn promotion_failure_is_flagged() {
        let log = "\
1046.349: [GC (Allocation Failure) 1046.349: [ParNew (promotion failed): 1922432K->1922432K(1922432K), 1.5094221 secs] 3826543K->3850333K(4019584K), 1.5095815 secs]
";
        let model = parse(CollectorType::CMS, log);
        let young = &model.gc_events()[0];
        assert!(young.has_special_situation(GCSpecialSituation::PromotionFailed));
        assert_eq!(young.memory_item(Generation::Young).post_used, 1_922_432 * KB);
    }
}
