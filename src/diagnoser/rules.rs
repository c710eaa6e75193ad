//! The rule registry and the suggestion generator.

use crate::event::GCEventType;
use crate::model::{GCModel, KpiType};
use crate::util::{GB, MB, known_double};

use super::{AbnormalKind, AbnormalPoint, DiagnoseContext, DiagnoseRule, Severity};

pub fn all_rules() -> Vec<Box<dyn DiagnoseRule>> {
    vec![
        Box::new(FullGCRule),
        Box::new(LongYoungGCPauseRule),
        Box::new(FrequentYoungGCRule),
        Box::new(AllocationStallRule),
        Box::new(OutOfMemoryRule),
    ]
}

const METASPACE_CAUSES: [&str; 3] = [
    "Metadata GC Threshold",
    "Metadata GC Clear Soft References",
    "Last ditch collection",
];

const HEAP_CAUSES: [&str; 6] = [
    "Allocation Failure",
    "Ergonomics",
    "G1 Evacuation Pause",
    "G1 Humongous Allocation",
    "GCLocker Initiated GC",
    "Concurrent Mode Failure",
];

// ============================================================
// FullGCRule
// ============================================================

/// Full collections are the single most expensive thing a generational
/// collector does; classify each one by what forced it.
pub struct FullGCRule;

impl DiagnoseRule for FullGCRule {
    fn id(&self) -> &'static str {
        "full_gc"
    }

    fn diagnose(&self, ctx: &DiagnoseContext) -> Result<Vec<AbnormalPoint>, String> {
        let mut points = Vec::new();
        for event in ctx.model.gc_events() {
            if !event.event_type.is_full_gc() || !ctx.contains(event.start_time) {
                continue;
            }
            let Some(cause) = event.cause.as_deref() else {
                continue;
            };
            let (kind, severity) = if METASPACE_CAUSES.contains(&cause) {
                (AbnormalKind::MetaspaceFullGC, Severity::Ultra)
            } else if HEAP_CAUSES.contains(&cause) {
                (AbnormalKind::HeapMemoryFullGC, Severity::Ultra)
            } else if cause == "System.gc()" {
                (AbnormalKind::SystemGC, Severity::High)
            } else {
                continue;
            };
            points.push(AbnormalPoint {
                kind,
                severity,
                start_time: event.start_time,
                end_time: event.end_time(),
            });
        }
        Ok(points)
    }
}

// ============================================================
// LongYoungGCPauseRule
// ============================================================

const LONG_YOUNG_PAUSE_MILLIS: f64 = 1_000.0;

pub struct LongYoungGCPauseRule;

impl DiagnoseRule for LongYoungGCPauseRule {
    fn id(&self) -> &'static str {
        "long_young_gc_pause"
    }

    fn diagnose(&self, ctx: &DiagnoseContext) -> Result<Vec<AbnormalPoint>, String> {
        let mut points = Vec::new();
        for event in ctx.model.gc_events() {
            if event.event_type.is_young_gc()
                && ctx.contains(event.start_time)
                && known_double(event.pause)
                && event.pause > LONG_YOUNG_PAUSE_MILLIS
            {
                points.push(AbnormalPoint {
                    kind: AbnormalKind::LongYoungGCPause,
                    severity: Severity::Medium,
                    start_time: event.start_time,
                    end_time: event.end_time(),
                });
            }
        }
        Ok(points)
    }
}

// ============================================================
// FrequentYoungGCRule
// ============================================================

const FREQUENT_YOUNG_INTERVAL_MILLIS: f64 = 1_000.0;

pub struct FrequentYoungGCRule;

impl DiagnoseRule for FrequentYoungGCRule {
    fn id(&self) -> &'static str {
        "frequent_young_gc"
    }

    fn diagnose(&self, ctx: &DiagnoseContext) -> Result<Vec<AbnormalPoint>, String> {
        let mut points = Vec::new();
        for event in ctx.model.gc_events() {
            if event.event_type.is_young_gc()
                && ctx.contains(event.start_time)
                && known_double(event.interval)
                && event.interval < FREQUENT_YOUNG_INTERVAL_MILLIS
            {
                points.push(AbnormalPoint {
                    kind: AbnormalKind::FrequentYoungGC,
                    severity: Severity::Low,
                    start_time: event.start_time,
                    end_time: event.end_time(),
                });
            }
        }
        Ok(points)
    }
}

// ============================================================
// AllocationStallRule
// ============================================================

pub struct AllocationStallRule;

impl DiagnoseRule for AllocationStallRule {
    fn id(&self) -> &'static str {
        "allocation_stall"
    }

    fn diagnose(&self, ctx: &DiagnoseContext) -> Result<Vec<AbnormalPoint>, String> {
        let mut points = Vec::new();
        for stall in &ctx.model.allocation_stalls {
            if ctx.contains(stall.start_time) {
                points.push(AbnormalPoint {
                    kind: AbnormalKind::AllocationStall,
                    severity: Severity::High,
                    start_time: stall.start_time,
                    end_time: stall.start_time + stall.duration.max(0.0),
                });
            }
        }
        Ok(points)
    }
}

// ============================================================
// OutOfMemoryRule
// ============================================================

pub struct OutOfMemoryRule;

impl DiagnoseRule for OutOfMemoryRule {
    fn id(&self) -> &'static str {
        "out_of_memory"
    }

    fn diagnose(&self, ctx: &DiagnoseContext) -> Result<Vec<AbnormalPoint>, String> {
        let mut points = Vec::new();
        for oom in &ctx.model.out_of_memories {
            if ctx.contains(oom.start_time) {
                points.push(AbnormalPoint {
                    kind: AbnormalKind::OutOfMemory,
                    severity: Severity::Ultra,
                    start_time: oom.start_time,
                    end_time: oom.start_time,
                });
            }
        }
        Ok(points)
    }
}

// ============================================================
// Suggestions
// ============================================================

const HIGH_PROMOTION_BYTES_PER_SEC: f64 = (50 * MB) as f64;
const HIGH_ALLOCATION_BYTES_PER_SEC: f64 = GB as f64;

/// Turn the dominant problem into actionable advice, keyed to the KPIs the
/// finished model observed.
pub fn suggestions_for(kind: AbnormalKind, model: &GCModel) -> Vec<String> {
    let mut out = Vec::new();
    match kind {
        AbnormalKind::MetaspaceFullGC => {
            out.push("Enlarge the metaspace (-XX:MaxMetaspaceSize).".to_string());
            out.push(
                "Check for class loader leaks if metaspace keeps growing after class loading settles."
                    .to_string(),
            );
        }
        AbnormalKind::HeapMemoryFullGC => {
            let promotion = model.kpi(KpiType::PromotionSpeed);
            if known_double(promotion) && promotion > HIGH_PROMOTION_BYTES_PER_SEC {
                out.push(
                    "Promotion speed is high; enlarge the young generation so short-lived objects die there."
                        .to_string(),
                );
            }
            let allocation = model.kpi(KpiType::ObjectCreationSpeed);
            if known_double(allocation) && allocation > HIGH_ALLOCATION_BYTES_PER_SEC {
                out.push(
                    "Object creation speed is high; reduce allocation pressure or enlarge the heap."
                        .to_string(),
                );
            }
            out.push("Enlarge the heap (-Xmx).".to_string());
            out.push("Check for memory leaks with a heap dump.".to_string());
        }
        AbnormalKind::SystemGC => {
            let disabled = model
                .vm_options
                .as_ref()
                .map(|o| o.disable_explicit_gc())
                .unwrap_or(false);
            if !disabled {
                out.push(
                    "Disable explicitly requested collections (-XX:+DisableExplicitGC) or find the System.gc() caller."
                        .to_string(),
                );
            } else {
                out.push("Find the caller that forces collections.".to_string());
            }
        }
        AbnormalKind::LongYoungGCPause => {
            out.push("Shrink the young generation or tune the pause target.".to_string());
            out.push("Check GC worker thread count against available cores.".to_string());
        }
        AbnormalKind::FrequentYoungGC => {
            out.push("Enlarge the young generation.".to_string());
            out.push("Reduce allocation pressure.".to_string());
        }
        AbnormalKind::AllocationStall => {
            out.push(
                "Allocation outpaces concurrent collection; enlarge the heap or add concurrent GC threads."
                    .to_string(),
            );
        }
        AbnormalKind::OutOfMemory => {
            out.push("Increase the maximum heap size (-Xmx).".to_string());
            out.push("Take a heap dump on OOM and look for leaks.".to_string());
        }
    }
    out
}
