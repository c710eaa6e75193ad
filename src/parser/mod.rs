//! Log parsers: one line-driven state machine per (collector, style) pair.
//!
//! All parsers funnel into the shared event/model API: they build
//! [`GCEvent`] trees, attach memory items and CPU time, and populate a
//! [`GCModel`]. Unrecognized lines are skipped, never fatal; a truncated
//! final event survives into the model and is filtered by the pipeline.

pub mod decorators;
pub mod legacy_g1;
pub mod legacy_generational;
pub mod shared;
pub mod unified_g1;
pub mod unified_generational;
pub mod unified_zgc;

use std::collections::HashMap;
use std::io::BufRead;

use crate::event::{GCEvent, GCEventType};
use crate::model::{CollectorType, GCModel, LogStyle};

// ============================================================
// Errors
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::new(format!("io: {e}"))
    }
}

// ============================================================
// Progress reporting
// ============================================================

/// Fire-and-forget progress sink; must never block parsing.
pub trait ProgressListener {
    fn begin_task(&mut self, _name: &str) {}
    fn sub_task(&mut self, _name: &str) {}
    fn worked(&mut self, _percent: u32) {}
}

pub struct NoopProgressListener;

impl ProgressListener for NoopProgressListener {}

// ============================================================
// Parser trait and factory
// ============================================================

pub trait GCLogParser {
    fn collector(&self) -> CollectorType;
    fn style(&self) -> LogStyle;
    fn parse(
        &mut self,
        input: &str,
        listener: &mut dyn ProgressListener,
    ) -> Result<GCModel, ParseError>;
}

/// Select a parser for an explicitly known (collector, style) pair.
pub fn parser_for(
    collector: CollectorType,
    style: LogStyle,
) -> Result<Box<dyn GCLogParser>, ParseError> {
    match (collector, style) {
        (CollectorType::G1, LogStyle::Unified) => {
            Ok(Box::new(unified_g1::UnifiedG1Parser::new()))
        }
        (CollectorType::G1, LogStyle::Legacy) => {
            Ok(Box::new(legacy_g1::LegacyG1Parser::new()))
        }
        (CollectorType::ZGC, LogStyle::Unified) => {
            Ok(Box::new(unified_zgc::UnifiedZGCParser::new()))
        }
        (
            c @ (CollectorType::Serial | CollectorType::Parallel | CollectorType::CMS),
            LogStyle::Unified,
        ) => Ok(Box::new(
            unified_generational::UnifiedGenerationalParser::new(c),
        )),
        (
            c @ (CollectorType::Serial | CollectorType::Parallel | CollectorType::CMS),
            LogStyle::Legacy,
        ) => Ok(Box::new(
            legacy_generational::LegacyGenerationalParser::new(c),
        )),
        (collector, style) => Err(ParseError::new(format!(
            "no parser for {:?} in {:?} style",
            collector, style
        ))),
    }
}

/// Thin first-lines heuristic for callers that do not know the pair.
pub fn detect(sample: &str) -> (CollectorType, LogStyle) {
    let style = if sample
        .lines()
        .take(100)
        .any(|l| decorators::parse_unified(l).is_some())
    {
        LogStyle::Unified
    } else {
        LogStyle::Legacy
    };

    let head: String = sample.lines().take(500).collect::<Vec<_>>().join("\n");
    let collector = if head.contains("Pause Mark Start")
        || head.contains("The Z Garbage Collector")
        || head.contains("Pause Relocate Start")
    {
        CollectorType::ZGC
    } else if head.contains("CMS") || head.contains("ParNew") {
        CollectorType::CMS
    } else if head.contains("PSYoungGen")
        || head.contains("ParOldGen")
        || head.contains("UseParallelGC")
    {
        CollectorType::Parallel
    } else if head.contains("G1") || head.contains("region size") || head.contains("regions:") {
        CollectorType::G1
    } else if head.contains("DefNew") || head.contains("Tenured") || head.contains("UseSerialGC") {
        CollectorType::Serial
    } else {
        CollectorType::Unknown
    };
    (collector, style)
}

/// Read a whole log, pick a parser and run it.
pub fn parse_log(mut reader: impl BufRead) -> Result<GCModel, ParseError> {
    let mut input = String::new();
    reader.read_to_string(&mut input)?;
    let (collector, style) = detect(&input);
    let mut parser = parser_for(collector, style)?;
    parser.parse(&input, &mut NoopProgressListener)
}

// ============================================================
// Event bookkeeping shared by the unified parsers
// ============================================================

/// Ordered top-level events under construction, routed by gcid. Two
/// concurrently logged cycles interleave their lines; each line must reach
/// the correct event by id, not by adjacency.
pub(crate) struct EventBook {
    events: Vec<GCEvent>,
    by_gcid: HashMap<i64, usize>,
}

impl EventBook {
    pub(crate) fn new() -> Self {
        Self {
            events: Vec::new(),
            by_gcid: HashMap::new(),
        }
    }

    pub(crate) fn open(&mut self, gcid: i64, ty: GCEventType) -> &mut GCEvent {
        let mut event = GCEvent::new(ty);
        event.gcid = gcid;
        self.events.push(event);
        self.by_gcid.insert(gcid, self.events.len() - 1);
        self.events.last_mut().unwrap()
    }

    pub(crate) fn get(&mut self, gcid: i64) -> Option<&mut GCEvent> {
        let idx = *self.by_gcid.get(&gcid)?;
        self.events.get_mut(idx)
    }

    pub(crate) fn get_or_open(&mut self, gcid: i64, ty: GCEventType) -> &mut GCEvent {
        match self.by_gcid.get(&gcid).copied() {
            Some(idx) => &mut self.events[idx],
            None => self.open(gcid, ty),
        }
    }

    /// Drop an event that turned out to be a wrapper around another one.
    pub(crate) fn discard(&mut self, gcid: i64) {
        if let Some(idx) = self.by_gcid.remove(&gcid) {
            self.events.remove(idx);
            for slot in self.by_gcid.values_mut() {
                if *slot > idx {
                    *slot -= 1;
                }
            }
        }
    }

    pub(crate) fn into_events(self) -> Vec<GCEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_style_and_collector() {
        let unified_g1 = "[0.202s][info][gc,init] Heap region size: 1M\n";
        assert_eq!(detect(unified_g1), (CollectorType::G1, LogStyle::Unified));

        let legacy_cms =
            "675.110: [GC (Allocation Failure) 675.110: [ParNew: 1922432K->174720K(1922432K), 0.1691241 secs]\n";
        assert_eq!(detect(legacy_cms), (CollectorType::CMS, LogStyle::Legacy));

        let unified_zgc = "[7.000s][info][gc,phases] GC(374) Pause Mark Start 0.053ms\n";
        assert_eq!(detect(unified_zgc), (CollectorType::ZGC, LogStyle::Unified));
    }

    #[test]
    fn factory_rejects_unknown() {
        assert!(parser_for(CollectorType::Unknown, LogStyle::Unified).is_err());
        assert!(parser_for(CollectorType::ZGC, LogStyle::Legacy).is_err());
    }

    #[test]
    fn event_book_routes_by_gcid() {
        let mut book = EventBook::new();
        book.open(2, GCEventType::YoungGC).start_time = 100.0;
        book.open(3, GCEventType::FullGC).start_time = 150.0;
        book.get(2).unwrap().duration = 10.0;
        book.discard(2);
        let events = book.into_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, GCEventType::FullGC);
    }
}
