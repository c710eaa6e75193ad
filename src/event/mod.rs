//! The GC event tree.
//!
//! A [`GCEvent`] is one pause, cycle or sub-phase reconstructed from the log.
//! Top-level events own their phases; phases are appended during parsing and
//! never reordered. Timing fields stay at the UNKNOWN sentinel until the
//! model's derived-info pipeline fills them in.

pub mod event_type;
pub mod memory;

pub use event_type::{GCEventType, PauseKind};
pub use memory::{CANONICAL_GENERATIONS, Generation, MemoryItem};

use serde::Serialize;

use crate::util::{
    UNKNOWN_DOUBLE, UNKNOWN_INT, format_bytes, format_millis, known_double, known_int,
};

/// Abnormal condition co-reported with a pause that is not its cause.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum GCSpecialSituation {
    ToSpaceExhausted,
    PromotionFailed,
    ConcurrentModeFailure,
}

impl GCSpecialSituation {
    pub fn name(&self) -> &'static str {
        match self {
            GCSpecialSituation::ToSpaceExhausted => "To-space Exhausted",
            GCSpecialSituation::PromotionFailed => "Promotion Failed",
            GCSpecialSituation::ConcurrentModeFailure => "Concurrent Mode Failure",
        }
    }
}

/// (user, sys, real) CPU time of one collection, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CpuTime {
    pub user: f64,
    pub sys: f64,
    pub real: f64,
}

/// One stop of all application threads, tracked separately from GC events.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Safepoint {
    pub start_time: f64,
    pub duration: f64,
    pub time_to_enter: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct GCEvent {
    pub gcid: i64,
    pub event_type: GCEventType,
    /// Milliseconds since log start.
    pub start_time: f64,
    pub duration: f64,
    pub cause: Option<String>,
    pub special_situations: Vec<GCSpecialSituation>,
    pub phases: Vec<GCEvent>,
    pub memory_items: Vec<MemoryItem>,
    pub cpu_time: Option<CpuTime>,

    // Derived by the model pipeline, UNKNOWN until then.
    /// Absolute wall-clock milliseconds, when a reference timestamp is known.
    pub timestamp: f64,
    /// Gap since the previous event of the same logical type.
    pub interval: f64,
    /// STW-visible time of this event.
    pub pause: f64,
    pub promotion: i64,
    pub allocation: i64,
    pub reclamation: i64,
}

impl GCEvent {
    pub fn new(event_type: GCEventType) -> Self {
        Self {
            gcid: UNKNOWN_INT,
            event_type,
            start_time: UNKNOWN_DOUBLE,
            duration: UNKNOWN_DOUBLE,
            cause: None,
            special_situations: Vec::new(),
            phases: Vec::new(),
            memory_items: Vec::new(),
            cpu_time: None,
            timestamp: UNKNOWN_DOUBLE,
            interval: UNKNOWN_DOUBLE,
            pause: UNKNOWN_DOUBLE,
            promotion: UNKNOWN_INT,
            allocation: UNKNOWN_INT,
            reclamation: UNKNOWN_INT,
        }
    }

    pub fn end_time(&self) -> f64 {
        if known_double(self.start_time) && known_double(self.duration) {
            self.start_time + self.duration
        } else {
            UNKNOWN_DOUBLE
        }
    }

    pub fn add_phase(&mut self, phase: GCEvent) {
        self.phases.push(phase);
    }

    /// The LAST phase of the given type. Phase types that repeat within one
    /// parent log a provisional and then a final measurement; the final one
    /// wins.
    pub fn last_phase_of_type(&self, ty: GCEventType) -> Option<&GCEvent> {
        self.phases.iter().rev().find(|p| p.event_type == ty)
    }

    pub fn last_phase_of_type_mut(&mut self, ty: GCEventType) -> Option<&mut GCEvent> {
        self.phases.iter_mut().rev().find(|p| p.event_type == ty)
    }

    /// Memory item for a generation; never absent (null-object semantics).
    pub fn memory_item(&self, generation: Generation) -> MemoryItem {
        self.memory_items
            .iter()
            .find(|i| i.generation == generation)
            .copied()
            .unwrap_or_else(|| MemoryItem::unknown(generation))
    }

    /// Install or replace the item for `item.generation`.
    pub fn set_memory_item(&mut self, item: MemoryItem) {
        match self
            .memory_items
            .iter_mut()
            .find(|i| i.generation == item.generation)
        {
            Some(existing) => *existing = item,
            None => self.memory_items.push(item),
        }
    }

    /// Like [`set_memory_item`], but known fields of an existing item win.
    pub fn update_memory_item(&mut self, item: MemoryItem) {
        match self
            .memory_items
            .iter_mut()
            .find(|i| i.generation == item.generation)
        {
            Some(existing) => existing.update_if_absent(&item),
            None => self.memory_items.push(item),
        }
    }

    pub fn has_special_situation(&self, situation: GCSpecialSituation) -> bool {
        self.special_situations.contains(&situation)
    }

    pub fn add_special_situation(&mut self, situation: GCSpecialSituation) {
        if !self.has_special_situation(situation) {
            self.special_situations.push(situation);
        }
    }

    /// Single-line human-readable rendering used by the cached detail list.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        if known_double(self.start_time) {
            out.push_str(&format!("{:.3}s ", self.start_time / 1000.0));
        }
        if known_int(self.gcid) {
            out.push_str(&format!("GC({}) ", self.gcid));
        }
        out.push_str(self.event_type.name());
        if let Some(cause) = &self.cause {
            out.push_str(&format!(" ({})", cause));
        }
        for s in &self.special_situations {
            out.push_str(&format!(" [{}]", s.name()));
        }
        let total = self.memory_item(Generation::Total);
        if !total.is_empty() {
            out.push_str(&format!(
                " {}->{}({})",
                format_bytes(total.pre_used),
                format_bytes(total.post_used),
                format_bytes(total.total)
            ));
        }
        if known_double(self.duration) {
            out.push_str(&format!(" {}", format_millis(self.duration)));
        }
        if let Some(cpu) = &self.cpu_time {
            out.push_str(&format!(
                " [User={:.0}ms Sys={:.0}ms Real={:.0}ms]",
                cpu.user, cpu.sys, cpu.real
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::MB;

    #[test]
    fn end_time_needs_both_fields() {
        let mut e = GCEvent::new(GCEventType::YoungGC);
        assert_eq!(e.end_time(), UNKNOWN_DOUBLE);
        e.start_time = 7000.0;
        assert_eq!(e.end_time(), UNKNOWN_DOUBLE);
        e.duration = 123.0;
        assert_eq!(e.end_time(), 7123.0);
    }

    #[test]
    fn last_phase_of_type_wins() {
        let mut cycle = GCEvent::new(GCEventType::G1ConcurrentCycle);
        let mut provisional = GCEvent::new(GCEventType::G1ConcurrentMark);
        provisional.duration = 100.0;
        let mut fin = GCEvent::new(GCEventType::G1ConcurrentMark);
        fin.duration = 390.951;
        cycle.add_phase(provisional);
        cycle.add_phase(fin);
        let got = cycle
            .last_phase_of_type(GCEventType::G1ConcurrentMark)
            .unwrap();
        assert_eq!(got.duration, 390.951);
    }

    #[test]
    fn memory_item_lookup_never_fails() {
        let mut e = GCEvent::new(GCEventType::YoungGC);
        assert!(e.memory_item(Generation::Humongous).is_empty());
        e.set_memory_item(MemoryItem::new(Generation::Survivor, 0, 3 * MB, 3 * MB));
        assert_eq!(e.memory_item(Generation::Survivor).post_used, 3 * MB);
    }

    #[test]
    fn describe_renders_one_line() {
        let mut e = GCEvent::new(GCEventType::YoungGC);
        e.gcid = 0;
        e.start_time = 1000.0;
        e.duration = 10.709;
        e.cause = Some("Metadata GC Threshold".to_string());
        e.set_memory_item(MemoryItem::new(Generation::Total, 19 * MB, 4 * MB, 64 * MB));
        let line = e.describe();
        assert!(line.contains("Young GC"));
        assert!(line.contains("Metadata GC Threshold"));
        assert!(line.contains("19.0M->4.0M(64.0M)"));
        assert!(line.contains("10.709ms"));
    }
}
