//! Line decorators: the bracketed prefixes of unified logging and the
//! time prefixes of legacy logging.
//!
//! Unified lines look like
//! `[2021-05-06T11:25:16.508+0800][0.202s][info][gc,start] GC(0) ...`;
//! any decorator may be configured away, so every bracket is classified
//! independently. Legacy lines carry `675.110: ` uptime prefixes, datestamp
//! prefixes, or both.

use chrono::DateTime;

use crate::util::{MS2S, UNKNOWN_DOUBLE, known_double};

const WALLCLOCK_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

// ============================================================
// Unified decorators
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnifiedLine<'a> {
    /// Milliseconds since JVM start, `UNKNOWN_DOUBLE` when not logged.
    pub uptime: f64,
    /// Epoch milliseconds, `UNKNOWN_DOUBLE` when not logged.
    pub wallclock: f64,
    /// The tag-set decorator, e.g. `gc,phases`. Empty when not logged.
    pub tags: &'a str,
    /// Payload after the decorators.
    pub rest: &'a str,
}

/// Split a unified line into decorators and payload. Returns `None` for
/// lines that do not carry unified decorators, which is also the style
/// detection criterion.
pub fn parse_unified(line: &str) -> Option<UnifiedLine<'_>> {
    let mut uptime = UNKNOWN_DOUBLE;
    let mut wallclock = UNKNOWN_DOUBLE;
    let mut tags = "";
    let mut saw_marker = false;
    let mut rest = line;

    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            break;
        };
        let inner = stripped[..close].trim();

        if let Some(ms) = parse_uptime(inner) {
            uptime = ms;
            saw_marker = true;
        } else if let Ok(dt) = DateTime::parse_from_str(inner, WALLCLOCK_FORMAT) {
            wallclock = dt.timestamp_millis() as f64;
            saw_marker = true;
        } else if matches!(inner, "info" | "debug" | "trace" | "warning" | "error") {
            saw_marker = true;
        } else if inner.chars().all(|c| c.is_ascii_digit()) {
            // pid or tid decorator
        } else if saw_marker && is_tag_set(inner) {
            tags = &stripped[..close];
        } else {
            break;
        }
        rest = &stripped[close + 1..];
    }

    if !saw_marker {
        return None;
    }
    Some(UnifiedLine {
        uptime,
        wallclock,
        tags,
        rest: rest.strip_prefix(' ').unwrap_or(rest),
    })
}

fn parse_uptime(token: &str) -> Option<f64> {
    if let Some(v) = token.strip_suffix("ms") {
        v.trim().parse::<f64>().ok()
    } else if let Some(v) = token.strip_suffix("ns") {
        v.trim().parse::<f64>().ok().map(|n| n / 1_000_000.0)
    } else if let Some(v) = token.strip_suffix('s') {
        v.trim().parse::<f64>().ok().map(|s| s * MS2S)
    } else {
        None
    }
}

fn is_tag_set(inner: &str) -> bool {
    !inner.is_empty()
        && inner
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == ',' || c == ' ')
}

/// Strip a `GC(374) ` prefix from a unified payload.
pub fn strip_gcid(payload: &str) -> (Option<i64>, &str) {
    let Some(inner) = payload.strip_prefix("GC(") else {
        return (None, payload);
    };
    let Some(close) = inner.find(')') else {
        return (None, payload);
    };
    let Ok(gcid) = inner[..close].parse::<i64>() else {
        return (None, payload);
    };
    let rest = &inner[close + 1..];
    (Some(gcid), rest.strip_prefix(' ').unwrap_or(rest))
}

/// Derives per-line times and the wallclock reference from whatever time
/// decorators a log carries. With an uptime the line time is the uptime;
/// with only wallclocks, times are measured from the first line's
/// wallclock.
#[derive(Debug, Clone, Copy)]
pub struct LogClock {
    /// Wallclock epoch ms matching line time zero.
    pub reference: f64,
    base_wallclock: f64,
}

impl LogClock {
    pub fn new() -> Self {
        Self {
            reference: UNKNOWN_DOUBLE,
            base_wallclock: UNKNOWN_DOUBLE,
        }
    }

    /// Line time in milliseconds since JVM start (or since the first line).
    pub fn observe(&mut self, uptime: f64, wallclock: f64) -> f64 {
        if known_double(uptime) {
            if known_double(wallclock) && !known_double(self.reference) {
                self.reference = wallclock - uptime;
            }
            return uptime;
        }
        if known_double(wallclock) {
            if !known_double(self.base_wallclock) {
                self.base_wallclock = wallclock;
                self.reference = wallclock;
            }
            return wallclock - self.base_wallclock;
        }
        UNKNOWN_DOUBLE
    }
}

impl Default for LogClock {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// Legacy prefixes
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegacyLine<'a> {
    pub uptime: f64,
    pub wallclock: f64,
    pub rest: &'a str,
}

/// Strip leading `uptime: ` and/or `datestamp: ` prefixes from a legacy
/// line. Lines without a prefix come back unchanged with both times
/// unknown.
pub fn parse_legacy(line: &str) -> LegacyLine<'_> {
    let mut uptime = UNKNOWN_DOUBLE;
    let mut wallclock = UNKNOWN_DOUBLE;
    let mut rest = line;

    while !(known_double(uptime) && known_double(wallclock)) {
        let Some(pos) = rest.find(": ") else {
            break;
        };
        let token = &rest[..pos];
        if token.len() > 40 || token.contains('[') || token.contains(' ') {
            break;
        }
        if let Ok(dt) = DateTime::parse_from_str(token, WALLCLOCK_FORMAT) {
            wallclock = dt.timestamp_millis() as f64;
        } else if let Ok(sec) = token.parse::<f64>() {
            uptime = sec * MS2S;
        } else {
            break;
        }
        rest = &rest[pos + 2..];
    }

    LegacyLine {
        uptime,
        wallclock,
        rest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unified_full_decorator_set() {
        let line = "[2021-05-06T11:25:16.508+0800][0.202s][info][gc,start] GC(0) Pause Young (Normal) (G1 Evacuation Pause)";
        let parsed = parse_unified(line).unwrap();
        assert_eq!(parsed.uptime, 202.0);
        assert_eq!(parsed.wallclock, 1620271516508.0);
        assert_eq!(parsed.tags, "gc,start");
        assert!(parsed.rest.starts_with("GC(0) Pause Young"));
    }

    #[test]
    fn unified_uptime_only() {
        let parsed = parse_unified("[7.006s][info][gc,phases] GC(374) Pause Mark Start 0.053ms").unwrap();
        assert_eq!(parsed.uptime, 7_006.0);
        assert_eq!(parsed.wallclock, UNKNOWN_DOUBLE);
        let (gcid, rest) = strip_gcid(parsed.rest);
        assert_eq!(gcid, Some(374));
        assert_eq!(rest, "Pause Mark Start 0.053ms");
    }

    #[test]
    fn unified_millisecond_uptime() {
        let parsed = parse_unified("[12345ms][info][gc] GC(9) Pause Young (Normal) 10.709ms").unwrap();
        assert_eq!(parsed.uptime, 12_345.0);
    }

    #[test]
    fn undecorated_line_is_not_unified() {
        assert!(parse_unified("675.110: [GC (Allocation Failure)").is_none());
        assert!(parse_unified("Java HotSpot(TM) 64-Bit Server VM").is_none());
    }

    #[test]
    fn legacy_uptime_prefix() {
        let parsed = parse_legacy("675.110: [GC (Allocation Failure) 675.110: [ParNew: 1922432K->174720K(1922432K), 0.1691241 secs]");
        assert_eq!(parsed.uptime, 675_110.0);
        assert!(parsed.rest.starts_with("[GC (Allocation Failure)"));
    }

    #[test]
    fn legacy_datestamp_and_uptime_prefix() {
        let parsed = parse_legacy("2021-09-25T15:49:03.345+0800: 3.960: [GC pause (G1 Evacuation Pause) (young)");
        assert_eq!(parsed.uptime, 3_960.0);
        assert_eq!(parsed.wallclock, 1632556143345.0);
        assert!(parsed.rest.starts_with("[GC pause"));
    }

    #[test]
    fn legacy_datestamp_only_prefix() {
        let parsed = parse_legacy("2021-12-07T11:18:11.688+0800: [GC (Allocation Failure)");
        assert_eq!(parsed.uptime, UNKNOWN_DOUBLE);
        assert_eq!(parsed.wallclock, 1638847091688.0);
    }

    #[test]
    fn clock_prefers_uptime_and_computes_reference() {
        let mut clock = LogClock::new();
        let line = parse_unified("[2021-05-06T11:25:16.508+0800][0.202s][info][gc] Using G1").unwrap();
        assert_eq!(clock.observe(line.uptime, line.wallclock), 202.0);
        assert_eq!(clock.reference, 1620271516508.0 - 202.0);
    }

    #[test]
    fn clock_falls_back_to_first_wallclock() {
        let mut clock = LogClock::new();
        let a = parse_unified("[2021-05-06T11:25:16.508+0800][info][gc] Using G1").unwrap();
        let b = parse_unified("[2021-05-06T11:25:17.508+0800][info][gc] GC(0) Pause Young (Normal) (G1 Evacuation Pause)").unwrap();
        assert_eq!(clock.observe(a.uptime, a.wallclock), 0.0);
        assert_eq!(clock.observe(b.uptime, b.wallclock), 1_000.0);
        assert_eq!(clock.reference, 1620271516508.0);
    }

    #[test]
    fn prose_colon_is_not_a_prefix() {
        let parsed =
            parse_legacy("Total time for which application threads were stopped: 0.0001215 seconds");
        assert_eq!(parsed.uptime, UNKNOWN_DOUBLE);
        assert!(parsed.rest.starts_with("Total time"));
    }
}
