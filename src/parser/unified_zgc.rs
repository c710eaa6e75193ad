//! ZGC parser (unified logging only; ZGC never had a legacy format).
//!
//! A collection cycle logs a start line, ten phase lines, a metaspace line,
//! a four-column heap accounting table and a completion line without a
//! duration token; the cycle duration is the gap between the start and
//! completion line times. Statistics snapshots, allocation stalls and
//! out-of-memory reports sit outside the cycle and carry no gcid.

use crate::event::{GCEvent, GCEventType, Generation, MemoryItem};
use crate::model::{
    CollectorType, GCModel, LogStyle, ZAllocationStall, ZOutOfMemory, ZStatItem, ZStatistics,
};
use crate::util::{UNKNOWN_INT, known_double, known_int};
use crate::vmoptions::VmOptions;

use super::decorators::{LogClock, parse_unified, strip_gcid};
use super::shared::{
    paren_groups, parse_mem_size, parse_unified_safepoint, split_title, trailing_duration,
};
use super::{EventBook, GCLogParser, ParseError, ProgressListener};

pub struct UnifiedZGCParser {
    book: EventBook,
    clock: LogClock,
}

impl UnifiedZGCParser {
    pub fn new() -> Self {
        Self {
            book: EventBook::new(),
            clock: LogClock::new(),
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
        if parsed.tags.contains("stats") {
            self.handle_stats_line(parsed.rest, time, model);
            return;
        }

        let payload = parsed.rest;
        if payload.contains("Garbage Collection Statistics") {
            model.z_statistics.push(ZStatistics::new(time));
            return;
        }
        if let Some(rest) = payload.strip_prefix("Allocation Stall (") {
            if let Some((thread, tail)) = rest.split_once(')') {
                let duration = trailing_duration(tail).unwrap_or(0.0);
                model.allocation_stalls.push(ZAllocationStall {
                    thread: thread.to_string(),
                    start_time: time - duration,
                    duration,
                });
            }
            return;
        }
        if let Some(rest) = payload.strip_prefix("Out Of Memory (") {
            if let Some((thread, _)) = rest.split_once(')') {
                model.out_of_memories.push(ZOutOfMemory {
                    thread: thread.to_string(),
                    start_time: time,
                });
            }
            return;
        }

        let (gcid, payload) = strip_gcid(payload);
        let Some(gcid) = gcid else {
            return;
        };
        self.handle_cycle_line(gcid, payload, time);
    }

    fn handle_cycle_line(&mut self, gcid: i64, payload: &str, time: f64) {
        if let Some(value) = payload.strip_prefix("Metaspace: ") {
            let event = self.book.get_or_open(gcid, GCEventType::ZGarbageCollection);
            event.update_memory_item(parse_metaspace_usage(value));
            return;
        }
        if let Some((label, values)) = payload.trim_start().split_once(':')
            && matches!(
                label.trim(),
                "Capacity" | "Used" | "Allocated" | "Reclaimed"
            )
        {
            let columns = parse_table_columns(values);
            let event = self.book.get_or_open(gcid, GCEventType::ZGarbageCollection);
            apply_table_row(event, label.trim(), &columns);
            return;
        }

        let (title, tail) = split_title(payload);
        let head = title.split('(').next().unwrap_or(title).trim_end();

        if let Some(ty) = z_phase_type(head) {
            if let Some(duration) = trailing_duration(payload) {
                let mut phase = GCEvent::new(ty);
                phase.start_time = time - duration;
                phase.duration = duration;
                self.book
                    .get_or_open(gcid, GCEventType::ZGarbageCollection)
                    .add_phase(phase);
            }
            return;
        }

        if head == "Garbage Collection" {
            let cause = paren_groups(title).first().map(|g| g.to_string());
            let event = self.book.get_or_open(gcid, GCEventType::ZGarbageCollection);
            if event.cause.is_none() {
                event.cause = cause;
            }
            if tail.is_empty() && !known_double(event.start_time) {
                // start line
                event.start_time = time;
            } else if known_double(event.start_time) {
                // completion line carries no duration token
                event.duration = time - event.start_time;
            }
        }
    }

    fn handle_stats_line(&mut self, payload: &str, time: f64, model: &mut GCModel) {
        if payload.contains("Garbage Collection Statistics") {
            model.z_statistics.push(ZStatistics::new(time));
            return;
        }
        let Some((key, item)) = parse_stats_row(payload) else {
            return;
        };
        if model.z_statistics.is_empty() {
            model.z_statistics.push(ZStatistics::new(time));
        }
        if let Some(snapshot) = model.z_statistics.last_mut() {
            snapshot.put(key, item);
        }
    }
}

impl Default for UnifiedZGCParser {
    fn default() -> Self {
        Self::new()
    }
}

impl GCLogParser for UnifiedZGCParser {
    fn collector(&self) -> CollectorType {
        CollectorType::ZGC
    }

    fn style(&self) -> LogStyle {
        LogStyle::Unified
    }

    fn parse(
        &mut self,
        input: &str,
        listener: &mut dyn ProgressListener,
    ) -> Result<GCModel, ParseError> {
        listener.begin_task("Parsing ZGC log");
        let mut model = GCModel::new(CollectorType::ZGC, LogStyle::Unified);
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

/// `"125M used, 128M committed, 130M reserved"`; committed doubles as the
/// capacity.
fn parse_metaspace_usage(value: &str) -> MemoryItem {
    let mut used = UNKNOWN_INT;
    let mut committed = UNKNOWN_INT;
    for part in value.split(',') {
        let part = part.trim();
        if let Some(size) = part.strip_suffix(" used") {
            used = parse_mem_size(size).unwrap_or(UNKNOWN_INT);
        } else if let Some(size) = part.strip_suffix(" committed") {
            committed = parse_mem_size(size).unwrap_or(UNKNOWN_INT);
        }
    }
    MemoryItem::new(Generation::Metaspace, UNKNOWN_INT, used, committed)
}

/// One row of the heap accounting table. Columns are Mark Start, Mark End,
/// Relocate Start, Relocate End, High, Low; `-` marks an empty cell and
/// `(nn%)` annotations are skipped.
fn parse_table_columns(values: &str) -> Vec<i64> {
    let mut out = Vec::new();
    for token in values.split_whitespace() {
        if token == "-" {
            out.push(UNKNOWN_INT);
        } else if token.starts_with('(') {
            // percentage annotation
        } else if let Some(size) = parse_mem_size(token) {
            out.push(size);
        }
    }
    out
}

fn apply_table_row(event: &mut GCEvent, label: &str, columns: &[i64]) {
    if columns.len() < 4 {
        return;
    }
    match label {
        "Capacity" => {
            event.update_memory_item(MemoryItem::new(
                Generation::Total,
                UNKNOWN_INT,
                UNKNOWN_INT,
                columns[0],
            ));
        }
        "Used" => {
            event.update_memory_item(MemoryItem::new(
                Generation::Total,
                columns[0],
                columns[3],
                UNKNOWN_INT,
            ));
        }
        "Allocated" => {
            if known_int(columns[3]) {
                event.allocation = columns[3];
            }
        }
        "Reclaimed" => {
            if known_int(columns[3]) {
                event.reclamation = columns[3];
            }
        }
        _ => {}
    }
}

fn z_phase_type(head: &str) -> Option<GCEventType> {
    match head {
        "Pause Mark Start" => Some(GCEventType::ZPauseMarkStart),
        "Concurrent Mark" => Some(GCEventType::ZConcurrentMark),
        "Pause Mark End" => Some(GCEventType::ZPauseMarkEnd),
        "Concurrent Process Non-Strong References" => {
            Some(GCEventType::ZConcurrentNonstrongReferences)
        }
        "Concurrent Reset Relocation Set" => Some(GCEventType::ZConcurrentResetRelocationSet),
        "Concurrent Destroy Detached Pages" => Some(GCEventType::ZConcurrentDestroyDetachedPages),
        "Concurrent Select Relocation Set" => Some(GCEventType::ZConcurrentSelectRelocationSet),
        "Concurrent Prepare Relocation Set" => Some(GCEventType::ZConcurrentPrepareRelocationSet),
        "Pause Relocate Start" => Some(GCEventType::ZPauseRelocateStart),
        "Concurrent Relocate" => Some(GCEventType::ZConcurrentRelocate),
        _ => None,
    }
}

/// One statistics row: a label, four `Avg / Max` pairs, and a unit.
fn parse_stats_row(payload: &str) -> Option<(String, ZStatItem)> {
    let tokens: Vec<&str> = payload.split_whitespace().collect();
    // label(>=1) + 4 pairs of "a / b" (12 tokens) + unit
    if tokens.len() < 14 {
        return None;
    }
    let unit = tokens[tokens.len() - 1];
    let pairs = &tokens[tokens.len() - 13..tokens.len() - 1];
    let mut values = [0.0f64; 8];
    for i in 0..4 {
        if pairs[i * 3 + 1] != "/" {
            return None;
        }
        values[i * 2] = pairs[i * 3].parse().ok()?;
        values[i * 2 + 1] = pairs[i * 3 + 2].parse().ok()?;
    }
    let name = tokens[..tokens.len() - 13].join(" ");
    if name.is_empty() {
        return None;
    }
    Some((
        format!("{} {}", name, unit),
        ZStatItem {
            avg10s: values[0],
            max10s: values[1],
            avg10m: values[2],
            max10m: values[3],
            avg10h: values[4],
            max10h: values[5],
            avg_total: values[6],
            max_total: values[7],
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::KpiType;
    use crate::model::zgc::{cycle_averages, recommended_max_heap_size};
    use crate::parser::NoopProgressListener;
    use crate::util::{MB, GB};

    fn cycle_log() -> String {
        let mut log = String::from(
            "\
[7.000s][info][gc,start   ] GC(374) Garbage Collection (Proactive)
[7.002s][info][gc,phases  ] GC(374) Pause Mark Start 0.053ms
[7.312s][info][gc,phases  ] GC(374) Concurrent Mark 306.720ms
[7.312s][info][gc,phases  ] GC(374) Pause Mark End 0.033ms
[7.313s][info][gc,phases  ] GC(374) Concurrent Process Non-Strong References 0.214ms
[7.313s][info][gc,phases  ] GC(374) Concurrent Reset Relocation Set 0.066ms
[7.313s][info][gc,phases  ] GC(374) Concurrent Destroy Detached Pages 0.001ms
[7.316s][info][gc,phases  ] GC(374) Concurrent Select Relocation Set 3.433ms
[7.316s][info][gc,phases  ] GC(374) Concurrent Prepare Relocation Set 0.052ms
[7.317s][info][gc,phases  ] GC(374) Pause Relocate Start 0.240ms
[7.352s][info][gc,phases  ] GC(374) Concurrent Relocate 35.465ms
[7.355s][info][gc,metaspace] GC(374) Metaspace: 125M used, 128M committed, 130M reserved
[7.355s][info][gc,heap    ] GC(374)                Mark Start          Mark End        Relocate Start      Relocate End           High               Low
[7.355s][info][gc,heap    ] GC(374)  Capacity:     4096M (100%)       4096M (100%)       4096M (100%)       4096M (100%)       4096M (100%)       4096M (100%)
[7.355s][info][gc,heap    ] GC(374)      Used:     3924M (96%)        3934M (96%)        3930M (96%)        1328M (32%)        3934M (96%)        1328M (32%)
[7.355s][info][gc,heap    ] GC(374) Allocated:         -                10M (0%)           8M (0%)          202M (5%)            -                  -
[7.355s][info][gc,heap    ] GC(374) Reclaimed:         -                 -                20M (0%)         4200M (103%)          -                  -
[7.356s][info][gc         ] GC(374) Garbage Collection (Proactive) 3924M(96%)->1328M(32%)
[8.000s][info][gc         ] Allocation Stall (worker-7) 234.000ms
[8.100s][info][gc         ] Out Of Memory (worker-9)
[10.000s][info][gc,stats  ] === Garbage Collection Statistics =======================================================================================================================
[10.000s][info][gc,stats  ]   Collector: Garbage Collection Cycle    356.000 / 356.000     356.000 / 356.000     356.000 / 356.000     356.000 / 356.000    ms
[10.000s][info][gc,stats  ]      Memory: Allocation Rate             35.000 / 648.000      35.000 / 648.000      112.000 / 830.000     112.000 / 830.000    MB/s
[10.000s][info][gc,stats  ]      System: Java Threads                911.000 / 911.000     910.000 / 911.000     901.000 / 913.000     901.000 / 913.000    threads
",
        );
        for i in 0..69 {
            log.push_str(&format!(
                "[10.000s][info][gc,stats  ]      Filler: Row {:02}                      1.000 / 2.000         1.000 / 2.000         1.000 / 2.000         1.000 / 2.000        ops/s\n",
                i
            ));
        }
        log
    }

    fn parsed_model() -> GCModel {
        let mut parser = UnifiedZGCParser::new();
        let mut model = parser
            .parse(&cycle_log(), &mut NoopProgressListener)
            .unwrap();
        model.calculate_derived_info().unwrap();
        model
    }

    #[test]
    fn cycle_duration_spans_start_to_completion() {
        let model = parsed_model();
        assert_eq!(model.gc_events().len(), 1);
        let cycle = &model.gc_events()[0];
        assert_eq!(cycle.event_type, GCEventType::ZGarbageCollection);
        assert_eq!(cycle.gcid, 374);
        assert_eq!(cycle.cause.as_deref(), Some("Proactive"));
        assert_eq!(cycle.start_time, 7_000.0);
        assert!((cycle.duration - 356.0).abs() < 1e-9);
        assert_eq!(cycle.phases.len(), 10);
        // Pause contribution is the three pause phases only.
        assert!((cycle.pause - (0.053 + 0.033 + 0.240)).abs() < 1e-9);
    }

    #[test]
    fn heap_table_fills_memory_and_rates() {
        let model = parsed_model();
        let cycle = &model.gc_events()[0];
        let total = cycle.memory_item(Generation::Total);
        assert_eq!(total.pre_used, 3924 * MB);
        assert_eq!(total.post_used, 1328 * MB);
        assert_eq!(total.total, 4096 * MB);
        assert_eq!(cycle.allocation, 202 * MB);
        assert_eq!(cycle.reclamation, 4200 * MB);

        let metaspace = cycle.memory_item(Generation::Metaspace);
        assert_eq!(metaspace.post_used, 125 * MB);
        assert_eq!(metaspace.total, 128 * MB);
    }

    #[test]
    fn statistics_snapshot_is_complete() {
        let model = parsed_model();
        assert_eq!(model.z_statistics.len(), 1);
        let stats = &model.z_statistics[0];
        assert_eq!(stats.len(), 72);
        let threads = stats.get("System: Java Threads threads").unwrap();
        assert_eq!(threads.max10s, 911.0);
        assert_eq!(threads.max10h, 913.0);
        let cycle = stats.get("Collector: Garbage Collection Cycle ms").unwrap();
        assert_eq!(cycle.avg_total, 356.0);
    }

    #[test]
    fn stalls_and_out_of_memory_are_side_lists() {
        let model = parsed_model();
        assert_eq!(model.allocation_stalls.len(), 1);
        let stall = &model.allocation_stalls[0];
        assert_eq!(stall.thread, "worker-7");
        assert!((stall.duration - 234.0).abs() < 1e-9);
        assert!((stall.start_time - (8_000.0 - 234.0)).abs() < 1e-9);

        assert_eq!(model.out_of_memories.len(), 1);
        assert_eq!(model.out_of_memories[0].thread, "worker-9");
    }

    #[test]
    fn object_creation_speed_prefers_self_reported_rate() {
        let model = parsed_model();
        // avg_total of the allocation rate row, in bytes/second.
        assert_eq!(
            model.kpi(KpiType::ObjectCreationSpeed),
            112.0 * MB as f64
        );
    }

    #[test]
    fn heap_recommendation_uses_cycle_averages() {
        let model = parsed_model();
        let (avg_used, avg_cycle) = cycle_averages(model.gc_events());
        assert_eq!(avg_used, 3924 * MB);
        let recommended =
            recommended_max_heap_size(&model.z_statistics, avg_used, avg_cycle);
        // 3924M + 0.356s * 648 MB/s
        assert_eq!(
            recommended,
            3924 * MB + (0.356 * 648.0 * MB as f64) as i64
        );
        assert!(recommended < 8 * GB);
    }
}
