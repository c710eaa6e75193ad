//! Rule-based diagnosis over a finished model.
//!
//! Rules scan the event list once and report abnormal points. All findings
//! go into a history map; separately the most serious findings are merged
//! into incident windows: occurrences within 60 seconds of each other are
//! one incident, and the three longest incidents plus suggestions for the
//! dominant problem make up the result.

pub mod rules;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::model::GCModel;
use crate::util::known_double;

/// Findings this close together (or closer) belong to one incident.
const MERGE_GAP_MILLIS: f64 = 60_000.0;

// ============================================================
// Core types
// ============================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Ultra,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AbnormalKind {
    MetaspaceFullGC,
    HeapMemoryFullGC,
    SystemGC,
    LongYoungGCPause,
    FrequentYoungGC,
    AllocationStall,
    OutOfMemory,
}

impl AbnormalKind {
    pub fn name(&self) -> &'static str {
        match self {
            AbnormalKind::MetaspaceFullGC => "Full GC caused by full metaspace",
            AbnormalKind::HeapMemoryFullGC => "Full GC caused by exhausted heap",
            AbnormalKind::SystemGC => "Explicitly requested GC",
            AbnormalKind::LongYoungGCPause => "Long young GC pause",
            AbnormalKind::FrequentYoungGC => "Frequent young GC",
            AbnormalKind::AllocationStall => "Allocation stall",
            AbnormalKind::OutOfMemory => "Out of memory",
        }
    }
}

/// One finding. Produced and consumed within a single `diagnose` call.
#[derive(Clone, Copy, Debug)]
pub struct AbnormalPoint {
    pub kind: AbnormalKind,
    pub severity: Severity,
    pub start_time: f64,
    pub end_time: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Diagnosis result consumed by the service layer.
#[derive(Clone, Debug, Serialize)]
pub struct GlobalDiagnoseInfo {
    /// The dominant problem, absent when nothing abnormal was found.
    pub problem: Option<AbnormalKind>,
    pub seriousness: Severity,
    /// Up to three merged incident windows, longest first.
    pub time_ranges: Vec<TimeRange>,
    pub suggestions: Vec<String>,
    /// Every finding, keyed by problem name, values are occurrence starts.
    pub history: BTreeMap<&'static str, Vec<f64>>,
}

pub struct DiagnoseContext<'a> {
    pub model: &'a GCModel,
    /// Restrict the scan; `None` covers the whole log.
    pub range: Option<TimeRange>,
}

impl DiagnoseContext<'_> {
    pub fn contains(&self, time: f64) -> bool {
        match self.range {
            Some(r) => time >= r.start && time <= r.end,
            None => true,
        }
    }
}

pub trait DiagnoseRule: Send + Sync {
    fn id(&self) -> &'static str;
    fn diagnose(&self, ctx: &DiagnoseContext) -> Result<Vec<AbnormalPoint>, String>;
}

// ============================================================
// Diagnoser
// ============================================================

pub struct GlobalDiagnoser {
    rules: Vec<Box<dyn DiagnoseRule>>,
}

impl Default for GlobalDiagnoser {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalDiagnoser {
    pub fn new() -> Self {
        Self {
            rules: rules::all_rules(),
        }
    }

    pub fn diagnose(
        &self,
        model: &GCModel,
        range: Option<TimeRange>,
    ) -> Result<GlobalDiagnoseInfo, String> {
        let ctx = DiagnoseContext { model, range };

        let mut history: BTreeMap<&'static str, Vec<f64>> = BTreeMap::new();
        let mut most_serious: Vec<AbnormalPoint> = Vec::new();
        let mut max_severity = Severity::None;

        for rule in &self.rules {
            let points = match rule.diagnose(&ctx) {
                Ok(points) => points,
                Err(e) => {
                    // One bad rule must not corrupt the whole diagnosis.
                    warn!(rule = rule.id(), error = %e, "diagnosis rule failed, skipping");
                    continue;
                }
            };
            for point in points {
                history
                    .entry(point.kind.name())
                    .or_default()
                    .push(point.start_time);
                if point.severity > max_severity {
                    max_severity = point.severity;
                    most_serious.clear();
                    most_serious.push(point);
                } else if point.severity == max_severity && point.severity > Severity::None {
                    most_serious.push(point);
                }
            }
        }

        let merged = merge_time_ranges(&mut most_serious);
        let problem = longest_problem(&most_serious, &merged);
        let suggestions = match problem {
            Some(kind) => rules::suggestions_for(kind, model),
            None => Vec::new(),
        };
        let mut top: Vec<TimeRange> = merged;
        top.sort_by(|a, b| {
            b.duration()
                .partial_cmp(&a.duration())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        top.truncate(3);

        Ok(GlobalDiagnoseInfo {
            problem,
            seriousness: max_severity,
            time_ranges: top,
            suggestions,
            history,
        })
    }
}

/// Merge the most-serious findings into incident windows: sort by start,
/// extend the running window while the next finding's end (its start when
/// the end is unknown) lies within the boundary `max(window end) + 60 s`.
/// A finding that starts inside the window but ends past the boundary
/// opens a new incident.
fn merge_time_ranges(points: &mut [AbnormalPoint]) -> Vec<TimeRange> {
    points.sort_by(|a, b| {
        a.start_time
            .partial_cmp(&b.start_time)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut merged: Vec<TimeRange> = Vec::new();
    let mut boundary = f64::NEG_INFINITY;
    for point in points.iter() {
        let end = if known_double(point.end_time) {
            point.end_time.max(point.start_time)
        } else {
            point.start_time
        };
        if let Some(last) = merged.last_mut()
            && end <= boundary
        {
            last.end = last.end.max(end);
        } else {
            merged.push(TimeRange {
                start: point.start_time,
                end,
            });
        }
        boundary = boundary.max(end + MERGE_GAP_MILLIS);
    }
    merged
}

/// The kind of the finding that starts the longest merged range.
fn longest_problem(points: &[AbnormalPoint], merged: &[TimeRange]) -> Option<AbnormalKind> {
    let longest = merged.iter().max_by(|a, b| {
        a.duration()
            .partial_cmp(&b.duration())
            .unwrap_or(std::cmp::Ordering::Equal)
    })?;
    points
        .iter()
        .find(|p| p.start_time >= longest.start && p.start_time <= longest.end)
        .map(|p| p.kind)
}
