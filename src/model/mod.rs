//! The whole-log aggregate and its derived-metric pipeline.
//!
//! A parser fills a [`GCModel`] with events, then the owner calls
//! [`GCModel::calculate_derived_info`] exactly once. The pipeline stages run
//! in a fixed order; later stages read fields earlier stages wrote, and the
//! event list is immutable afterwards.

pub mod graph;
pub mod zgc;

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::warn;

use crate::diagnoser::{GlobalDiagnoseInfo, GlobalDiagnoser};
use crate::event::{
    GCEvent, GCEventType, Generation, MemoryItem, PauseKind, Safepoint,
};
use crate::stats::{DoubleData, IntData};
use crate::util::{
    MS2S, MB, UNKNOWN_DOUBLE, UNKNOWN_INT, known_double, known_int, minus_int,
    minus_int_lenient, zero_if_unknown_int,
};
use crate::vmoptions::VmOptions;

pub use zgc::{ZAllocationStall, ZOutOfMemory, ZStatItem, ZStatistics};

/// Model start time snaps to zero when the first event begins within this
/// many milliseconds of the log start.
const START_TIME_ZERO_THRESHOLD: f64 = 60_000.0;

// ============================================================
// Collector / style / KPI vocabulary
// ============================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorType {
    Serial,
    Parallel,
    CMS,
    G1,
    ZGC,
    Unknown,
}

impl CollectorType {
    pub fn name(&self) -> &'static str {
        match self {
            CollectorType::Serial => "Serial GC",
            CollectorType::Parallel => "Parallel GC",
            CollectorType::CMS => "CMS GC",
            CollectorType::G1 => "G1 GC",
            CollectorType::ZGC => "ZGC",
            CollectorType::Unknown => "Unknown GC",
        }
    }

    pub fn is_generational(&self) -> bool {
        !matches!(self, CollectorType::ZGC | CollectorType::Unknown)
    }

    pub fn is_pauseless(&self) -> bool {
        matches!(self, CollectorType::ZGC)
    }

    /// Generation sizing is meaningless for region-based collectors.
    pub fn has_fixed_generation_sizes(&self) -> bool {
        matches!(
            self,
            CollectorType::Serial | CollectorType::Parallel | CollectorType::CMS
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStyle {
    Legacy,
    Unified,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum KpiType {
    Throughput,
    MaxPause,
    YoungGCIntervalAvg,
    YoungGCIntervalMin,
    YoungGCPauseAvg,
    YoungGCPauseMax,
    OldGCIntervalAvg,
    OldGCIntervalMin,
    FullGCIntervalAvg,
    FullGCIntervalMin,
    FullGCPauseAvg,
    FullGCPauseMax,
    PromotionAvg,
    PromotionMax,
    PromotionSpeed,
    ObjectCreationSpeed,
    GCDurationPercentage,
}

impl KpiType {
    pub const ALL: [KpiType; 17] = [
        KpiType::Throughput,
        KpiType::MaxPause,
        KpiType::YoungGCIntervalAvg,
        KpiType::YoungGCIntervalMin,
        KpiType::YoungGCPauseAvg,
        KpiType::YoungGCPauseMax,
        KpiType::OldGCIntervalAvg,
        KpiType::OldGCIntervalMin,
        KpiType::FullGCIntervalAvg,
        KpiType::FullGCIntervalMin,
        KpiType::FullGCPauseAvg,
        KpiType::FullGCPauseMax,
        KpiType::PromotionAvg,
        KpiType::PromotionMax,
        KpiType::PromotionSpeed,
        KpiType::ObjectCreationSpeed,
        KpiType::GCDurationPercentage,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            KpiType::Throughput => "throughput",
            KpiType::MaxPause => "maxPause",
            KpiType::YoungGCIntervalAvg => "youngGCIntervalAvg",
            KpiType::YoungGCIntervalMin => "youngGCIntervalMin",
            KpiType::YoungGCPauseAvg => "youngGCPauseAvg",
            KpiType::YoungGCPauseMax => "youngGCPauseMax",
            KpiType::OldGCIntervalAvg => "oldGCIntervalAvg",
            KpiType::OldGCIntervalMin => "oldGCIntervalMin",
            KpiType::FullGCIntervalAvg => "fullGCIntervalAvg",
            KpiType::FullGCIntervalMin => "fullGCIntervalMin",
            KpiType::FullGCPauseAvg => "fullGCPauseAvg",
            KpiType::FullGCPauseMax => "fullGCPauseMax",
            KpiType::PromotionAvg => "promotionAvg",
            KpiType::PromotionMax => "promotionMax",
            KpiType::PromotionSpeed => "promotionSpeed",
            KpiType::ObjectCreationSpeed => "objectCreationSpeed",
            KpiType::GCDurationPercentage => "gcDurationPercentage",
        }
    }
}

// ============================================================
// Derived tables
// ============================================================

#[derive(Clone, Debug, Serialize)]
pub struct CauseStatistics {
    pub cause: String,
    pub count: usize,
    pub avg_pause: f64,
    pub max_pause: f64,
    pub total_pause: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PhaseStatistics {
    pub name: &'static str,
    pub count: usize,
    pub avg_duration: f64,
    pub max_duration: f64,
    pub total_duration: f64,
    pub avg_interval: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct BasicInfo {
    pub collector: &'static str,
    pub log_style: LogStyle,
    pub duration: f64,
    pub vm_options: Option<String>,
    pub parallel_thread: i64,
    pub concurrent_thread: i64,
    pub young_gen_size: i64,
    pub old_gen_size: i64,
    pub heap_size: i64,
    pub metaspace_size: i64,
}

/// Predicate set for the paged detail view.
#[derive(Clone, Debug, Default)]
pub struct EventDetailFilter {
    pub event_type: Option<GCEventType>,
    pub cause: Option<String>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub min_pause: Option<f64>,
}

impl EventDetailFilter {
    fn matches(&self, event: &GCEvent) -> bool {
        if let Some(ty) = self.event_type
            && event.event_type != ty
        {
            return false;
        }
        if let Some(cause) = &self.cause
            && event.cause.as_deref() != Some(cause.as_str())
        {
            return false;
        }
        if let Some(start) = self.start_time
            && known_double(event.start_time)
            && event.start_time < start
        {
            return false;
        }
        if let Some(end) = self.end_time
            && known_double(event.start_time)
            && event.start_time > end
        {
            return false;
        }
        if let Some(min_pause) = self.min_pause
            && zero_if_unknown_double_local(event.pause) < min_pause
        {
            return false;
        }
        true
    }
}

fn zero_if_unknown_double_local(v: f64) -> f64 {
    if known_double(v) { v } else { 0.0 }
}

// ============================================================
// Errors
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ModelError {
    pub message: String,
}

impl ModelError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Model error: {}", self.message)
    }
}

impl std::error::Error for ModelError {}

// ============================================================
// GCModel
// ============================================================

#[derive(Debug)]
pub struct GCModel {
    collector: CollectorType,
    log_style: LogStyle,
    events: Vec<GCEvent>,
    /// Trailing events cut off mid-parse; excluded from `gc_events` but still
    /// visible in the all-events view.
    incomplete_events: Vec<GCEvent>,
    safepoints: Vec<Safepoint>,

    pub reference_timestamp: f64,
    pub start_time: f64,
    pub end_time: f64,
    pub parallel_thread: i64,
    pub concurrent_thread: i64,
    pub heap_region_size: i64,
    pub vm_options: Option<VmOptions>,

    pub z_statistics: Vec<ZStatistics>,
    pub allocation_stalls: Vec<ZAllocationStall>,
    pub out_of_memories: Vec<ZOutOfMemory>,

    derived: bool,
    cause_statistics: Vec<CauseStatistics>,
    phase_statistics: Vec<PhaseStatistics>,
    kpis: BTreeMap<KpiType, f64>,
    basic_info: Option<BasicInfo>,
    event_details: Vec<String>,
    diagnosis: Option<GlobalDiagnoseInfo>,
}

impl GCModel {
    pub fn new(collector: CollectorType, log_style: LogStyle) -> Self {
        Self {
            collector,
            log_style,
            events: Vec::new(),
            incomplete_events: Vec::new(),
            safepoints: Vec::new(),
            reference_timestamp: UNKNOWN_DOUBLE,
            start_time: UNKNOWN_DOUBLE,
            end_time: UNKNOWN_DOUBLE,
            parallel_thread: UNKNOWN_INT,
            concurrent_thread: UNKNOWN_INT,
            heap_region_size: UNKNOWN_INT,
            vm_options: None,
            z_statistics: Vec::new(),
            allocation_stalls: Vec::new(),
            out_of_memories: Vec::new(),
            derived: false,
            cause_statistics: Vec::new(),
            phase_statistics: Vec::new(),
            kpis: BTreeMap::new(),
            basic_info: None,
            event_details: Vec::new(),
            diagnosis: None,
        }
    }

    pub fn collector(&self) -> CollectorType {
        self.collector
    }

    pub fn log_style(&self) -> LogStyle {
        self.log_style
    }

    pub fn add_event(&mut self, event: GCEvent) {
        self.events.push(event);
    }

    pub fn add_safepoint(&mut self, safepoint: Safepoint) {
        self.safepoints.push(safepoint);
    }

    /// Complete top-level events, sorted by start time once derived.
    pub fn gc_events(&self) -> &[GCEvent] {
        &self.events
    }

    pub fn gc_events_mut(&mut self) -> &mut Vec<GCEvent> {
        &mut self.events
    }

    pub fn safepoints(&self) -> &[Safepoint] {
        &self.safepoints
    }

    /// Every event the parser saw: top-level events, their phases
    /// (recursively) and dropped incomplete events.
    pub fn all_events(&self) -> Vec<&GCEvent> {
        fn visit<'a>(e: &'a GCEvent, out: &mut Vec<&'a GCEvent>) {
            out.push(e);
            for p in &e.phases {
                visit(p, out);
            }
        }
        let mut out = Vec::new();
        for e in &self.events {
            visit(e, &mut out);
        }
        for e in &self.incomplete_events {
            visit(e, &mut out);
        }
        out
    }

    pub fn duration(&self) -> f64 {
        if known_double(self.start_time) && known_double(self.end_time) {
            self.end_time - self.start_time
        } else {
            UNKNOWN_DOUBLE
        }
    }

    pub fn kpi(&self, kpi: KpiType) -> f64 {
        self.kpis.get(&kpi).copied().unwrap_or(UNKNOWN_DOUBLE)
    }

    pub fn kpi_summary(&self) -> BTreeMap<&'static str, f64> {
        KpiType::ALL
            .iter()
            .map(|k| (k.name(), self.kpi(*k)))
            .collect()
    }

    pub fn cause_statistics(&self) -> &[CauseStatistics] {
        &self.cause_statistics
    }

    pub fn phase_statistics(&self) -> &[PhaseStatistics] {
        &self.phase_statistics
    }

    pub fn basic_info(&self) -> Option<&BasicInfo> {
        self.basic_info.as_ref()
    }

    pub fn diagnosis(&self) -> Option<&GlobalDiagnoseInfo> {
        self.diagnosis.as_ref()
    }

    /// Paged detail view over the cached per-event renderings.
    /// Returns (matching count, page of detail lines).
    pub fn event_details(
        &self,
        filter: &EventDetailFilter,
        page: usize,
        page_size: usize,
    ) -> (usize, Vec<String>) {
        let matching: Vec<&String> = self
            .events
            .iter()
            .zip(self.event_details.iter())
            .filter(|(e, _)| filter.matches(e))
            .map(|(_, d)| d)
            .collect();
        let total = matching.len();
        let details = matching
            .into_iter()
            .skip(page * page_size)
            .take(page_size)
            .cloned()
            .collect();
        (total, details)
    }

    // ============================================================
    // Derived-info pipeline
    // ============================================================

    pub fn calculate_derived_info(&mut self) -> Result<(), ModelError> {
        // Recomputation would double-count the aggregation tables.
        if self.derived {
            return Ok(());
        }
        self.derived = true;

        if self.collector == CollectorType::Unknown {
            return Err(ModelError::new("unsupported collector type"));
        }

        self.filter_invalid_events();
        self.auto_decide_start_end_time();
        self.decide_and_fix_event_info();
        self.collector_pre_pass();
        self.calculate_timestamps();
        self.calculate_intervals();
        self.calculate_pauses();
        self.calculate_memory_info();
        self.calculate_cause_info();
        self.calculate_phase_info();
        self.calculate_event_details();
        self.calculate_basic_info();
        self.calculate_kpi();
        self.diagnose();
        Ok(())
    }

    /// An event has a usable end when its own timing is complete or its last
    /// phase's is.
    fn event_known_end(event: &GCEvent) -> f64 {
        let own = event.end_time();
        if known_double(own) {
            return own;
        }
        event
            .phases
            .iter()
            .rev()
            .map(GCEvent::end_time)
            .find(|e| known_double(*e))
            .unwrap_or(UNKNOWN_DOUBLE)
    }

    fn filter_invalid_events(&mut self) {
        let mut kept = Vec::with_capacity(self.events.len());
        for event in self.events.drain(..) {
            if known_double(Self::event_known_end(&event)) {
                kept.push(event);
            } else {
                self.incomplete_events.push(event);
            }
        }
        self.events = kept;
    }

    fn auto_decide_start_end_time(&mut self) {
        self.events.sort_by(|a, b| {
            a.start_time
                .partial_cmp(&b.start_time)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if self.events.is_empty() {
            return;
        }
        if !known_double(self.start_time) {
            let first = self.events[0].start_time;
            self.start_time = if first < START_TIME_ZERO_THRESHOLD {
                0.0
            } else {
                first
            };
        }
        if !known_double(self.end_time) {
            let mut end = UNKNOWN_DOUBLE;
            for e in &self.events {
                let e_end = Self::event_known_end(e);
                if known_double(e_end) && (!known_double(end) || e_end > end) {
                    end = e_end;
                }
            }
            self.end_time = end;
        }
    }

    fn decide_and_fix_event_info(&mut self) {
        fn fix(event: &mut GCEvent) {
            if event.cause.as_deref() == Some("System.gc") {
                event.cause = Some("System.gc()".to_string());
            }
            // Backfill a phase duration from the next phase's start.
            for i in 0..event.phases.len() {
                if !known_double(event.phases[i].duration)
                    && known_double(event.phases[i].start_time)
                    && i + 1 < event.phases.len()
                    && known_double(event.phases[i + 1].start_time)
                {
                    let d = event.phases[i + 1].start_time - event.phases[i].start_time;
                    if d >= 0.0 {
                        event.phases[i].duration = d;
                    }
                }
                fix(&mut event.phases[i]);
            }
            // Backfill a parent duration from its last phase's end.
            if !known_double(event.duration) && known_double(event.start_time) {
                let last_end = event
                    .phases
                    .iter()
                    .rev()
                    .map(GCEvent::end_time)
                    .find(|e| known_double(*e));
                if let Some(end) = last_end
                    && end >= event.start_time
                {
                    event.duration = end - event.start_time;
                }
            }
        }
        for event in &mut self.events {
            fix(event);
        }
    }

    fn collector_pre_pass(&mut self) {
        if self.collector.is_pauseless() {
            self.z_statistics.sort_by(|a, b| {
                a.start_time
                    .partial_cmp(&b.start_time)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }

    fn calculate_timestamps(&mut self) {
        if !known_double(self.reference_timestamp) {
            return;
        }
        let reference = self.reference_timestamp;
        fn stamp(event: &mut GCEvent, reference: f64) {
            if known_double(event.start_time) {
                event.timestamp = reference + event.start_time;
            }
            for p in &mut event.phases {
                stamp(p, reference);
            }
        }
        for event in &mut self.events {
            stamp(event, reference);
        }
    }

    fn calculate_intervals(&mut self) {
        let mut last_end: HashMap<GCEventType, f64> = HashMap::new();
        let mut last_phase_end: HashMap<GCEventType, f64> = HashMap::new();
        for event in &mut self.events {
            let key = event.event_type.interval_key();
            if let Some(&prev) = last_end.get(&key)
                && known_double(event.start_time)
            {
                event.interval = (event.start_time - prev).max(0.0);
            }
            let end = Self::event_known_end(event);
            if known_double(end) {
                last_end.insert(key, end);
            }
            for phase in &mut event.phases {
                let pkey = phase.event_type;
                if let Some(&prev) = last_phase_end.get(&pkey)
                    && known_double(phase.start_time)
                {
                    phase.interval = (phase.start_time - prev).max(0.0);
                }
                let pend = phase.end_time();
                if known_double(pend) {
                    last_phase_end.insert(pkey, pend);
                }
            }
        }
    }

    fn calculate_pauses(&mut self) {
        fn pause_of(event: &GCEvent) -> f64 {
            match event.event_type.pause_kind() {
                PauseKind::Pause => event.duration,
                PauseKind::Partial => {
                    let mut sum = 0.0;
                    let mut any = false;
                    for p in &event.phases {
                        if p.event_type.pause_kind() == PauseKind::Pause
                            && known_double(p.duration)
                        {
                            sum += p.duration;
                            any = true;
                        }
                    }
                    if any { sum } else { 0.0 }
                }
                PauseKind::Concurrent => 0.0,
            }
        }
        for event in &mut self.events {
            event.pause = pause_of(event);
            for phase in &mut event.phases {
                phase.pause = pause_of(phase);
            }
        }
    }

    fn calculate_memory_info(&mut self) {
        // Phases first, so a parent can read what its phases reported.
        fn infer(event: &mut GCEvent) {
            for phase in &mut event.phases {
                infer(phase);
            }
            let eden = event.memory_item(Generation::Eden);
            let survivor = event.memory_item(Generation::Survivor);
            let mut young = event
                .memory_item(Generation::Young)
                .merge_if_present(&eden)
                .merge_if_present(&survivor);
            let mut old = event.memory_item(Generation::Old);
            let humongous = event.memory_item(Generation::Humongous);
            let mut total = event.memory_item(Generation::Total);

            // total = young ⊕ old ⊕ humongous
            total.update_if_absent(
                &MemoryItem::unknown(Generation::Total)
                    .merge_if_present(&young)
                    .merge_if_present(&old)
                    .merge_if_present(&humongous),
            );
            // young = total ⊖ old ⊖ humongous. The sibling must be known;
            // only humongous is treated as zero when absent.
            young.update_if_absent(&retag(
                total.subtract(&old).subtract_if_present(&humongous),
                Generation::Young,
            ));
            // old = total ⊖ young ⊖ humongous
            old.update_if_absent(&retag(
                total.subtract(&young).subtract_if_present(&humongous),
                Generation::Old,
            ));

            for item in [young, old, total] {
                if !item.is_empty() {
                    event.set_memory_item(item);
                }
            }

            if !known_int(event.reclamation) {
                event.reclamation = total.memory_reduction();
            }
            if event.event_type.is_young_gc()
                && event.event_type != GCEventType::G1YoungMixedGC
            {
                let moved = minus_int(young.memory_reduction(), total.memory_reduction());
                event.promotion = minus_int_lenient(moved, humongous.memory_reduction());
            }
        }

        let mut last_total_post: i64 = 0;
        for event in &mut self.events {
            infer(event);
            let total = event.memory_item(Generation::Total);
            if known_int(total.pre_used) {
                event.allocation =
                    zero_if_unknown_int(event.allocation) + (total.pre_used - last_total_post);
            }
            if known_int(total.post_used) {
                last_total_post = total.post_used;
            }
        }
    }

    fn calculate_cause_info(&mut self) {
        let mut table: BTreeMap<String, DoubleData> = BTreeMap::new();
        for event in &self.events {
            let pause = zero_if_unknown_double_local(event.pause);
            if let Some(cause) = &event.cause {
                let family = if event.event_type.is_full_gc() {
                    Some("Full GC")
                } else if event.event_type.is_young_gc() {
                    Some("Young GC")
                } else {
                    None
                };
                if let Some(family) = family {
                    table
                        .entry(format!("{} - {}", family, cause))
                        .or_default()
                        .add(pause);
                }
            }
            for situation in &event.special_situations {
                table
                    .entry(situation.name().to_string())
                    .or_default()
                    .add(pause);
            }
        }
        let mut causes: Vec<CauseStatistics> = table
            .into_iter()
            .map(|(cause, data)| CauseStatistics {
                cause,
                count: data.n(),
                avg_pause: data.average(),
                max_pause: data.max(),
                total_pause: data.sum(),
            })
            .collect();
        causes.sort_by(|a, b| {
            b.total_pause
                .partial_cmp(&a.total_pause)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.cause_statistics = causes;
    }

    fn calculate_phase_info(&mut self) {
        struct PhaseAgg {
            duration: DoubleData,
            interval: DoubleData,
            pause: DoubleData,
        }
        let mut table: BTreeMap<GCEventType, PhaseAgg> = BTreeMap::new();
        let mut add = |table: &mut BTreeMap<GCEventType, PhaseAgg>, e: &GCEvent| {
            let agg = table.entry(e.event_type).or_insert_with(|| PhaseAgg {
                duration: DoubleData::new(),
                interval: DoubleData::new(),
                pause: DoubleData::new(),
            });
            if known_double(e.duration) {
                agg.duration.add(e.duration);
            }
            if known_double(e.interval) {
                agg.interval.add(e.interval);
            }
            if known_double(e.pause) {
                agg.pause.add(e.pause);
            }
        };

        let mut old_interval = DoubleData::new();
        let mut old_pause = DoubleData::new();
        let mut pauseless_duration = 0.0;
        for event in &self.events {
            add(&mut table, event);
            if event.event_type.is_old_gc() {
                if known_double(event.interval) {
                    old_interval.add(event.interval);
                }
                if known_double(event.pause) {
                    old_pause.add(event.pause);
                }
            }
            if event.event_type == GCEventType::ZGarbageCollection
                && known_double(event.duration)
            {
                pauseless_duration += event.duration;
            }
            for phase in &event.phases {
                add(&mut table, phase);
            }
        }

        // KPIs fall out of the same pass; no second scan over the events.
        if let Some(young) = table.get(&GCEventType::YoungGC) {
            self.kpis
                .insert(KpiType::YoungGCIntervalAvg, young.interval.average());
            self.kpis
                .insert(KpiType::YoungGCIntervalMin, young.interval.min());
            self.kpis
                .insert(KpiType::YoungGCPauseAvg, young.pause.average());
            self.kpis.insert(KpiType::YoungGCPauseMax, young.pause.max());
        }
        if let Some(full) = table.get(&GCEventType::FullGC) {
            self.kpis
                .insert(KpiType::FullGCIntervalAvg, full.interval.average());
            self.kpis
                .insert(KpiType::FullGCIntervalMin, full.interval.min());
            self.kpis.insert(KpiType::FullGCPauseAvg, full.pause.average());
            self.kpis.insert(KpiType::FullGCPauseMax, full.pause.max());
        }
        if old_interval.n() > 0 {
            self.kpis
                .insert(KpiType::OldGCIntervalAvg, old_interval.average());
            self.kpis
                .insert(KpiType::OldGCIntervalMin, old_interval.min());
        }
        if self.collector.is_pauseless() {
            let duration = self.duration();
            if known_double(duration) && duration > 0.0 {
                self.kpis.insert(
                    KpiType::GCDurationPercentage,
                    (pauseless_duration / duration * 100.0).min(100.0),
                );
            }
        }

        let mut phases: Vec<PhaseStatistics> = table
            .into_iter()
            .map(|(ty, agg)| PhaseStatistics {
                name: ty.name(),
                count: agg.duration.n(),
                avg_duration: agg.duration.average(),
                max_duration: agg.duration.max(),
                total_duration: agg.duration.sum(),
                avg_interval: agg.interval.average(),
            })
            .collect();
        phases.sort_by(|a, b| {
            b.total_duration
                .partial_cmp(&a.total_duration)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.phase_statistics = phases;
    }

    fn calculate_event_details(&mut self) {
        self.event_details = self.events.iter().map(GCEvent::describe).collect();
    }

    fn calculate_basic_info(&mut self) {
        let mut young = IntData::new();
        let mut old = IntData::new();
        let mut heap = IntData::new();
        for event in &self.events {
            let y = event.memory_item(Generation::Young).total;
            if known_int(y) {
                young.add(y);
            }
            let o = event.memory_item(Generation::Old).total;
            if known_int(o) {
                old.add(o);
            }
            let h = event.memory_item(Generation::Total).total;
            if known_int(h) {
                heap.add(h);
            }
        }
        let fixed_generations = self.collector.has_fixed_generation_sizes();
        let metaspace_size = self
            .vm_options
            .as_ref()
            .map(|o| o.max_metaspace_size())
            .unwrap_or(UNKNOWN_INT);
        self.basic_info = Some(BasicInfo {
            collector: self.collector.name(),
            log_style: self.log_style,
            duration: self.duration(),
            vm_options: self.vm_options.as_ref().map(|o| o.raw().to_string()),
            parallel_thread: self.parallel_thread,
            concurrent_thread: self.concurrent_thread,
            young_gen_size: if fixed_generations {
                avg_or_unknown(&young)
            } else {
                UNKNOWN_INT
            },
            old_gen_size: if fixed_generations {
                avg_or_unknown(&old)
            } else {
                UNKNOWN_INT
            },
            heap_size: avg_or_unknown(&heap),
            metaspace_size,
        });
    }

    fn calculate_kpi(&mut self) {
        let duration = self.duration();

        let mut pause_sum = 0.0;
        let mut max_pause = DoubleData::new();
        for event in &self.events {
            match event.event_type.pause_kind() {
                PauseKind::Pause => {
                    if known_double(event.duration) {
                        pause_sum += event.duration;
                        max_pause.add(event.duration);
                    }
                }
                PauseKind::Partial => {
                    for phase in &event.phases {
                        if phase.event_type.pause_kind() == PauseKind::Pause
                            && known_double(phase.duration)
                        {
                            pause_sum += phase.duration;
                            max_pause.add(phase.duration);
                        }
                    }
                }
                PauseKind::Concurrent => {}
            }
        }
        if known_double(duration) && duration > 0.0 {
            self.kpis
                .insert(KpiType::Throughput, 1.0 - pause_sum / duration);
        }
        self.kpis.insert(KpiType::MaxPause, max_pause.max());

        let mut promotion = IntData::new();
        for event in &self.events {
            if known_int(event.promotion) {
                promotion.add(event.promotion);
            }
        }
        if promotion.n() > 0 {
            self.kpis
                .insert(KpiType::PromotionAvg, promotion.average());
            self.kpis
                .insert(KpiType::PromotionMax, promotion.max() as f64);
            if known_double(duration) && duration > 0.0 {
                self.kpis.insert(
                    KpiType::PromotionSpeed,
                    promotion.sum() as f64 / duration * MS2S,
                );
            }
        }

        // The pauseless collector self-reports an allocation rate; prefer it
        // over the coarser derived per-event allocation.
        let self_reported = self
            .z_statistics
            .last()
            .and_then(|s| s.get(zgc::ALLOCATION_RATE_KEY))
            .map(|item| item.avg_total * MB as f64);
        match self_reported {
            Some(rate) => {
                self.kpis.insert(KpiType::ObjectCreationSpeed, rate);
            }
            None => {
                let mut allocation = IntData::new();
                for event in &self.events {
                    if known_int(event.allocation) {
                        allocation.add(event.allocation);
                    }
                }
                if allocation.n() > 0 && known_double(duration) && duration > 0.0 {
                    self.kpis.insert(
                        KpiType::ObjectCreationSpeed,
                        allocation.sum() as f64 / duration * MS2S,
                    );
                }
            }
        }
    }

    fn diagnose(&mut self) {
        let diagnoser = GlobalDiagnoser::new();
        match diagnoser.diagnose(self, None) {
            Ok(info) => self.diagnosis = Some(info),
            Err(e) => {
                // Diagnosis must never fail the pipeline.
                warn!(error = %e, "diagnosis failed, continuing without it");
            }
        }
    }
}

fn retag(mut item: MemoryItem, generation: Generation) -> MemoryItem {
    item.generation = generation;
    item
}

fn avg_or_unknown(data: &IntData) -> i64 {
    if data.n() == 0 {
        UNKNOWN_INT
    } else {
        data.average() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::GCSpecialSituation;
    use crate::util::{GB, KB};

    fn event(
        ty: GCEventType,
        start: f64,
        duration: f64,
        cause: Option<&str>,
    ) -> GCEvent {
        let mut e = GCEvent::new(ty);
        e.start_time = start;
        e.duration = duration;
        e.cause = cause.map(str::to_string);
        e
    }

    fn simple_model(events: Vec<GCEvent>) -> GCModel {
        let mut model = GCModel::new(CollectorType::G1, LogStyle::Unified);
        for e in events {
            model.add_event(e);
        }
        model
    }

    #[test]
    fn unknown_collector_is_fatal() {
        let mut model = GCModel::new(CollectorType::Unknown, LogStyle::Unified);
        assert!(model.calculate_derived_info().is_err());
    }

    #[test]
    fn empty_model_has_unknown_kpis() {
        let mut model = GCModel::new(CollectorType::G1, LogStyle::Unified);
        model.calculate_derived_info().unwrap();
        for kpi in KpiType::ALL {
            assert_eq!(model.kpi(kpi), UNKNOWN_DOUBLE, "{}", kpi.name());
        }
        assert!(model.cause_statistics().is_empty());
    }

    #[test]
    fn trailing_incomplete_event_is_dropped_but_counted() {
        let mut model = simple_model(vec![
            event(GCEventType::YoungGC, 1000.0, 10.0, None),
            event(GCEventType::YoungGC, 2000.0, UNKNOWN_DOUBLE, None),
        ]);
        model.calculate_derived_info().unwrap();
        assert_eq!(model.gc_events().len(), 1);
        assert_eq!(model.all_events().len(), 2);
    }

    #[test]
    fn start_snaps_to_zero_and_end_is_last_event_end() {
        let mut model = simple_model(vec![
            event(GCEventType::YoungGC, 1000.0, 11.0, None),
            event(GCEventType::FullGC, 7000.0, 123.0, None),
        ]);
        model.calculate_derived_info().unwrap();
        assert_eq!(model.start_time, 0.0);
        assert_eq!(model.end_time, 7123.0);
        assert_eq!(model.duration(), 7123.0);
    }

    #[test]
    fn start_not_zeroed_for_late_logs() {
        let mut model = simple_model(vec![event(
            GCEventType::YoungGC,
            100_000.0,
            10.0,
            None,
        )]);
        model.calculate_derived_info().unwrap();
        assert_eq!(model.start_time, 100_000.0);
    }

    #[test]
    fn system_gc_cause_is_normalized() {
        let mut model = simple_model(vec![event(
            GCEventType::FullGC,
            1000.0,
            50.0,
            Some("System.gc"),
        )]);
        model.calculate_derived_info().unwrap();
        assert_eq!(
            model.gc_events()[0].cause.as_deref(),
            Some("System.gc()")
        );
    }

    #[test]
    fn parent_duration_backfilled_from_last_phase() {
        let mut cycle = event(GCEventType::G1ConcurrentCycle, 2000.0, UNKNOWN_DOUBLE, None);
        cycle.add_phase(event(GCEventType::G1Remark, 2401.0, 2.381, None));
        cycle.add_phase(event(GCEventType::G1Cleanup, 2404.0, 0.094, None));
        let mut model = simple_model(vec![cycle]);
        model.calculate_derived_info().unwrap();
        let got = &model.gc_events()[0];
        assert!((got.duration - 404.094).abs() < 1e-9);
        // Partial event pause is the sum of its pause phases.
        assert!((got.pause - (2.381 + 0.094)).abs() < 1e-9);
    }

    #[test]
    fn intervals_collapse_young_variants() {
        let mut model = simple_model(vec![
            event(GCEventType::YoungGC, 1000.0, 10.0, None),
            event(GCEventType::G1YoungMixedGC, 3010.0, 20.0, None),
            event(GCEventType::YoungGC, 5030.0, 10.0, None),
        ]);
        model.calculate_derived_info().unwrap();
        let events = model.gc_events();
        assert_eq!(events[0].interval, UNKNOWN_DOUBLE);
        assert_eq!(events[1].interval, 2000.0);
        assert_eq!(events[2].interval, 2000.0);
    }

    #[test]
    fn timestamps_from_reference() {
        let mut model = simple_model(vec![event(GCEventType::YoungGC, 2.0, 10.0, None)]);
        model.reference_timestamp = 1_620_271_516_508.0;
        model.calculate_derived_info().unwrap();
        assert_eq!(model.gc_events()[0].timestamp, 1_620_271_516_510.0);
    }

    #[test]
    fn memory_inference_and_promotion() {
        let mut young_gc = event(GCEventType::YoungGC, 1000.0, 10.0, None);
        young_gc.set_memory_item(MemoryItem::new(
            Generation::Young,
            1_922_432 * KB,
            174_720 * KB,
            1_922_432 * KB,
        ));
        young_gc.set_memory_item(MemoryItem::new(
            Generation::Total,
            3_557_775 * KB,
            1_858_067 * KB,
            4_019_584 * KB,
        ));
        let mut model = GCModel::new(CollectorType::CMS, LogStyle::Legacy);
        model.add_event(young_gc);
        model.calculate_derived_info().unwrap();
        let e = &model.gc_events()[0];
        // old = total - young
        let old = e.memory_item(Generation::Old);
        assert_eq!(old.pre_used, (3_557_775 - 1_922_432) * KB);
        assert_eq!(old.total, (4_019_584 - 1_922_432) * KB);
        // promotion = young reduction - total reduction
        let young_red = (1_922_432 - 174_720) * KB;
        let total_red = (3_557_775 - 1_858_067) * KB;
        assert_eq!(e.promotion, young_red - total_red);
        // reclamation = total reduction
        assert_eq!(e.reclamation, total_red);
        // first event allocation counts from zero
        assert_eq!(e.allocation, 3_557_775 * KB);
    }

    #[test]
    fn memory_inference_recurses_into_phases() {
        let mut full = event(GCEventType::FullGC, 1000.0, 200.0, None);
        full.set_memory_item(MemoryItem::new(Generation::Total, 4 * GB, GB, 4 * GB));
        let mut phase = event(GCEventType::CMSFinalRemark, 1000.0, 50.0, None);
        phase.set_memory_item(MemoryItem::new(Generation::Young, GB, GB, 2 * GB));
        phase.set_memory_item(MemoryItem::new(Generation::Old, 2 * GB, 2 * GB, 2 * GB));
        full.add_phase(phase);
        let mut model = GCModel::new(CollectorType::CMS, LogStyle::Legacy);
        model.add_event(full);
        model.calculate_derived_info().unwrap();
        let phase = model.gc_events()[0]
            .last_phase_of_type(GCEventType::CMSFinalRemark)
            .unwrap();
        // phase total = young + old
        let total = phase.memory_item(Generation::Total);
        assert_eq!(total.pre_used, 3 * GB);
        assert_eq!(total.post_used, 3 * GB);
        assert_eq!(total.total, 4 * GB);
        assert_eq!(phase.reclamation, 0);
        // The parent's own items are untouched by the phase's.
        let parent_total = model.gc_events()[0].memory_item(Generation::Total);
        assert_eq!(parent_total.pre_used, 4 * GB);
    }

    #[test]
    fn mixed_gc_skips_promotion() {
        let mut mixed = event(GCEventType::G1YoungMixedGC, 1000.0, 10.0, None);
        mixed.set_memory_item(MemoryItem::new(Generation::Young, GB, 0, GB));
        mixed.set_memory_item(MemoryItem::new(Generation::Total, 2 * GB, GB, 4 * GB));
        let mut model = simple_model(vec![mixed]);
        model.calculate_derived_info().unwrap();
        assert_eq!(model.gc_events()[0].promotion, UNKNOWN_INT);
    }

    #[test]
    fn cause_table_includes_special_situations() {
        let mut young = event(
            GCEventType::YoungGC,
            1000.0,
            10.0,
            Some("Metadata GC Threshold"),
        );
        young.add_special_situation(GCSpecialSituation::ToSpaceExhausted);
        let full = event(GCEventType::FullGC, 3000.0, 100.0, Some("System.gc()"));
        let mut model = simple_model(vec![young, full]);
        model.calculate_derived_info().unwrap();
        let causes: Vec<&str> = model
            .cause_statistics()
            .iter()
            .map(|c| c.cause.as_str())
            .collect();
        assert!(causes.contains(&"Young GC - Metadata GC Threshold"));
        assert!(causes.contains(&"Full GC - System.gc()"));
        assert!(causes.contains(&"To-space Exhausted"));
        // Sorted by total pause descending.
        assert_eq!(causes[0], "Full GC - System.gc()");
    }

    #[test]
    fn throughput_and_max_pause() {
        let mut cycle = event(GCEventType::G1ConcurrentCycle, 2000.0, 501.0, None);
        cycle.add_phase(event(GCEventType::G1Remark, 2401.0, 2.381, None));
        cycle.add_phase(event(GCEventType::G1ConcurrentMark, 2010.0, 390.951, None));
        let mut model = simple_model(vec![
            event(GCEventType::YoungGC, 1000.0, 11.0, None),
            cycle,
            event(GCEventType::FullGC, 7000.0, 123.0, None),
        ]);
        model.calculate_derived_info().unwrap();
        // Pause time: young 11 + full 123 + remark 2.381; concurrent mark is free.
        let pause_sum = 11.0 + 123.0 + 2.381;
        let expected = 1.0 - pause_sum / 7123.0;
        assert!((model.kpi(KpiType::Throughput) - expected).abs() < 1e-9);
        assert_eq!(model.kpi(KpiType::MaxPause), 123.0);
        // Sanity: pause sum never exceeds the model duration.
        assert!(pause_sum <= model.duration());
    }

    #[test]
    fn derived_info_is_not_recomputed() {
        let mut model = simple_model(vec![event(
            GCEventType::YoungGC,
            1000.0,
            10.0,
            Some("Allocation Failure"),
        )]);
        model.calculate_derived_info().unwrap();
        let causes_before = model.cause_statistics()[0].count;
        model.calculate_derived_info().unwrap();
        assert_eq!(model.cause_statistics()[0].count, causes_before);
        assert_eq!(model.cause_statistics().len(), 1);
    }

    #[test]
    fn detail_view_filters_and_pages() {
        let mut model = simple_model(vec![
            event(GCEventType::YoungGC, 1000.0, 10.0, Some("Allocation Failure")),
            event(GCEventType::YoungGC, 2000.0, 300.0, Some("Allocation Failure")),
            event(GCEventType::FullGC, 3000.0, 500.0, Some("Ergonomics")),
        ]);
        model.calculate_derived_info().unwrap();

        let all = EventDetailFilter::default();
        let (total, page) = model.event_details(&all, 0, 2);
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);

        let full_only = EventDetailFilter {
            event_type: Some(GCEventType::FullGC),
            ..Default::default()
        };
        let (total, page) = model.event_details(&full_only, 0, 10);
        assert_eq!(total, 1);
        assert!(page[0].contains("Full GC"));

        let slow = EventDetailFilter {
            min_pause: Some(100.0),
            ..Default::default()
        };
        let (total, _) = model.event_details(&slow, 0, 10);
        assert_eq!(total, 2);
    }

    #[test]
    fn basic_info_skips_generation_sizes_for_g1() {
        let mut young = event(GCEventType::YoungGC, 1000.0, 10.0, None);
        young.set_memory_item(MemoryItem::new(Generation::Young, GB, 0, GB));
        young.set_memory_item(MemoryItem::new(Generation::Total, 2 * GB, GB, 4 * GB));
        let mut model = simple_model(vec![young]);
        model.calculate_derived_info().unwrap();
        let info = model.basic_info().unwrap();
        assert_eq!(info.young_gen_size, UNKNOWN_INT);
        assert_eq!(info.heap_size, 4 * GB);
    }
}
