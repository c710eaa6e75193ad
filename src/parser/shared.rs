//! Fragment helpers shared by all parsers: sizes, size transitions,
//! durations, CPU time lines and safepoint lines.

use crate::event::{CpuTime, Safepoint};
use crate::util::{KB, MB, GB, MS2S, UNKNOWN_DOUBLE, UNKNOWN_INT, known_double};

// ============================================================
// Sizes
// ============================================================

/// `"19M"`, `"1922432K"`, `"0.0B"`, `"3938.5M"` to bytes.
pub fn parse_mem_size(s: &str) -> Option<i64> {
    let s = s.trim();
    let split = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.' || *c == '-'))
        .map(|(i, _)| i)?;
    let value: f64 = s[..split].parse().ok()?;
    let mult = match s[split..].trim() {
        "B" | "b" => 1,
        "K" | "KB" | "k" | "kb" => KB,
        "M" | "MB" | "m" | "mb" => MB,
        "G" | "GB" | "g" | "gb" => GB,
        _ => return None,
    };
    Some((value * mult as f64).round() as i64)
}

/// `"A->B(C)"` or `"A(Ac)->B(Bc)"` to `(pre, post, capacity)`.
///
/// When both sides carry a capacity the post-collection one wins.
pub fn parse_mem_change(s: &str) -> Option<(i64, i64, i64)> {
    let (left, right) = s.trim().split_once("->")?;
    let (pre, pre_cap) = parse_size_with_capacity(left)?;
    let (post, post_cap) = parse_size_with_capacity(right)?;
    let cap = if post_cap != UNKNOWN_INT {
        post_cap
    } else {
        pre_cap
    };
    Some((pre, post, cap))
}

fn parse_size_with_capacity(s: &str) -> Option<(i64, i64)> {
    let s = s.trim();
    if let Some((used, rest)) = s.split_once('(') {
        let cap = rest.strip_suffix(')')?;
        Some((parse_mem_size(used)?, parse_mem_size(cap)?))
    } else {
        Some((parse_mem_size(s)?, UNKNOWN_INT))
    }
}

// ============================================================
// Durations
// ============================================================

/// A duration token to milliseconds: `"10.709ms"`, `"0.0563085 secs"`,
/// `"7700 ns"`, `"1.5s"`.
pub fn parse_duration(s: &str) -> Option<f64> {
    let s = s.trim().trim_end_matches(|c| c == ']' || c == ',');
    for (suffix, factor) in [
        ("ms", 1.0),
        ("ns", 1.0 / 1_000_000.0),
        ("us", 1.0 / 1_000.0),
        ("secs", MS2S),
        ("sec", MS2S),
        ("seconds", MS2S),
        ("s", MS2S),
    ] {
        if let Some(v) = s.strip_suffix(suffix)
            && let Ok(value) = v.trim().parse::<f64>()
        {
            return Some(value * factor);
        }
    }
    None
}

/// First number following `label` in `s`, in milliseconds per
/// [`parse_duration`].
pub fn duration_after(s: &str, label: &str) -> Option<f64> {
    let idx = s.find(label)? + label.len();
    let rest = s[idx..].trim_start();
    let end = rest
        .find(|c: char| c == ',' || c == ']' || c == '(')
        .unwrap_or(rest.len());
    parse_duration(&rest[..end])
}

// ============================================================
// CPU time
// ============================================================

/// `"user=0.04 sys=0.01, real=0.01 secs"` (legacy `[Times: ...]`) or
/// `"User=0.04s Sys=0.01s Real=0.01s"` (unified `gc,cpu`).
pub fn parse_cpu_time(s: &str) -> Option<CpuTime> {
    let lower = s.to_ascii_lowercase();
    let user = seconds_after(&lower, "user=")?;
    let sys = seconds_after(&lower, "sys=")?;
    let real = seconds_after(&lower, "real=")?;
    Some(CpuTime {
        user: user * MS2S,
        sys: sys * MS2S,
        real: real * MS2S,
    })
}

fn seconds_after(s: &str, label: &str) -> Option<f64> {
    let idx = s.find(label)? + label.len();
    let rest = &s[idx..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

// ============================================================
// Payload shape
// ============================================================

/// Split an event payload into its title and the measurement tail. The
/// title ends at the first token that is a size transition or a duration,
/// e.g. `"Pause Young (Normal) (G1 Evacuation Pause) 19M->4M(64M) 10.709ms"`
/// splits before `19M->4M(64M)`.
pub fn split_title(payload: &str) -> (&str, &str) {
    for (idx, token) in payload.split_whitespace().map(|t| {
        // offset of this token within the payload
        (t.as_ptr() as usize - payload.as_ptr() as usize, t)
    }) {
        if token.contains("->") || parse_duration(token).is_some() {
            return (payload[..idx].trim_end(), &payload[idx..]);
        }
    }
    (payload.trim_end(), "")
}

/// Parenthesized groups of a title, left to right. Balanced, so a
/// `(System.gc())` cause comes back whole.
pub fn paren_groups(title: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let bytes = title.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'(' {
            i += 1;
            continue;
        }
        let mut depth = 1usize;
        let mut j = i + 1;
        while j < bytes.len() && depth > 0 {
            match bytes[j] {
                b'(' => depth += 1,
                b')' => depth -= 1,
                _ => {}
            }
            j += 1;
        }
        if depth != 0 {
            break;
        }
        out.push(&title[i + 1..j - 1]);
        i = j;
    }
    out
}

/// The duration at the end of a payload, if any.
pub fn trailing_duration(payload: &str) -> Option<f64> {
    let last = payload.split_whitespace().last()?;
    if last.starts_with('(') {
        return None;
    }
    parse_duration(last)
}

/// A region-count transition like `"10->0(9)"` (counts, not sizes).
pub fn parse_region_change(s: &str) -> Option<(i64, i64, i64)> {
    let s = s.trim();
    let (left, right) = s.split_once("->")?;
    let pre: i64 = left.trim().parse().ok()?;
    let (post, cap) = if let Some((post, rest)) = right.split_once('(') {
        (
            post.trim().parse().ok()?,
            rest.strip_suffix(')')?.trim().parse().ok()?,
        )
    } else {
        (right.trim().parse().ok()?, UNKNOWN_INT)
    };
    Some((pre, post, cap))
}

// ============================================================
// Safepoints
// ============================================================

/// Legacy application-stopped-time line. `line_time` is the line's own
/// time, which marks the end of the pause.
pub fn parse_legacy_safepoint(rest: &str, line_time: f64) -> Option<Safepoint> {
    let payload = rest.strip_prefix("Total time for which application threads were stopped: ")?;
    let duration = parse_duration(payload.split(',').next()?)?;
    let time_to_enter = payload
        .split_once("Stopping threads took: ")
        .and_then(|(_, t)| parse_duration(t))
        .unwrap_or(UNKNOWN_DOUBLE);
    let start_time = if known_double(line_time) {
        line_time - duration
    } else {
        UNKNOWN_DOUBLE
    };
    Some(Safepoint {
        start_time,
        duration,
        time_to_enter,
    })
}

/// Unified `safepoint` tag line, e.g.
/// `Safepoint "G1CollectForAllocation", Time since last: 387578224 ns,
/// Reaching safepoint: 7700 ns, At safepoint: 120000 ns, Total: 127700 ns`.
pub fn parse_unified_safepoint(rest: &str, line_time: f64) -> Option<Safepoint> {
    if !rest.starts_with("Safepoint \"") {
        return None;
    }
    let time_to_enter = duration_after(rest, "Reaching safepoint:")?;
    let duration = duration_after(rest, "Total:")?;
    let start_time = if known_double(line_time) {
        line_time - duration
    } else {
        UNKNOWN_DOUBLE
    };
    Some(Safepoint {
        start_time,
        duration,
        time_to_enter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_in_all_units() {
        assert_eq!(parse_mem_size("19M"), Some(19 * MB));
        assert_eq!(parse_mem_size("1922432K"), Some(1922432 * KB));
        assert_eq!(parse_mem_size("0.0B"), Some(0));
        assert_eq!(parse_mem_size("3938.5M"), Some((3938.5 * MB as f64) as i64));
        assert_eq!(parse_mem_size("2G"), Some(2 * GB));
        assert_eq!(parse_mem_size("oops"), None);
    }

    #[test]
    fn size_transitions() {
        assert_eq!(parse_mem_change("19M->4M(64M)"), Some((19 * MB, 4 * MB, 64 * MB)));
        assert_eq!(
            parse_mem_change("1922432K(2095744K)->174720K(2095744K)"),
            Some((1922432 * KB, 174720 * KB, 2095744 * KB))
        );
        assert_eq!(parse_mem_change("3M->3M"), Some((3 * MB, 3 * MB, UNKNOWN_INT)));
        assert_eq!(parse_mem_change("junk"), None);
    }

    #[test]
    fn durations_in_all_units() {
        assert_eq!(parse_duration("10.709ms"), Some(10.709));
        assert_eq!(parse_duration("0.0563085 secs"), Some(56.3085));
        assert_eq!(parse_duration("7700 ns"), Some(0.0077));
        assert_eq!(parse_duration("0.1691241 secs]"), Some(169.1241));
    }

    #[test]
    fn cpu_time_line() {
        let cpu = parse_cpu_time("user=0.04 sys=0.01, real=0.01 secs").unwrap();
        assert_eq!(cpu.user, 40.0);
        assert_eq!(cpu.sys, 10.0);
        assert_eq!(cpu.real, 10.0);

        let cpu = parse_cpu_time("User=0.04s Sys=0.01s Real=0.01s").unwrap();
        assert_eq!(cpu.user, 40.0);
    }

    #[test]
    fn title_splits_before_measurements() {
        let (title, tail) =
            split_title("Pause Young (Normal) (G1 Evacuation Pause) 19M->4M(64M) 10.709ms");
        assert_eq!(title, "Pause Young (Normal) (G1 Evacuation Pause)");
        assert!(tail.starts_with("19M->4M(64M)"));
        assert_eq!(
            paren_groups(title),
            vec!["Normal", "G1 Evacuation Pause"]
        );
        assert_eq!(
            paren_groups("Pause Full (System.gc())"),
            vec!["System.gc()"]
        );

        let (title, tail) = split_title("Concurrent Mark (2.010s)");
        assert_eq!(title, "Concurrent Mark (2.010s)");
        assert_eq!(tail, "");
    }

    #[test]
    fn trailing_durations() {
        assert_eq!(
            trailing_duration("Pause Young (Normal) (G1 Evacuation Pause) 19M->4M(64M) 10.709ms"),
            Some(10.709)
        );
        assert_eq!(trailing_duration("Pause Young (Normal) (G1 Evacuation Pause)"), None);
        assert_eq!(trailing_duration("Concurrent Mark (2.010s)"), None);
    }

    #[test]
    fn region_transitions() {
        assert_eq!(parse_region_change("10->0(9)"), Some((10, 0, 9)));
        assert_eq!(parse_region_change("2->4"), Some((2, 4, UNKNOWN_INT)));
        assert_eq!(parse_region_change("2->4M"), None);
    }

    #[test]
    fn legacy_safepoint_line() {
        let sp = parse_legacy_safepoint(
            "Total time for which application threads were stopped: 0.0001215 seconds, Stopping threads took: 0.0000077 seconds",
            675_110.0,
        )
        .unwrap();
        assert!((sp.duration - 0.1215).abs() < 1e-9);
        assert!((sp.time_to_enter - 0.0077).abs() < 1e-9);
        assert!((sp.start_time - (675_110.0 - 0.1215)).abs() < 1e-9);
    }

    #[test]
    fn unified_safepoint_line() {
        let sp = parse_unified_safepoint(
            "Safepoint \"G1CollectForAllocation\", Time since last: 387578224 ns, Reaching safepoint: 7700 ns, At safepoint: 120000 ns, Total: 127700 ns",
            1_000.0,
        )
        .unwrap();
        assert!((sp.time_to_enter - 0.0077).abs() < 1e-9);
        assert!((sp.duration - 0.1277).abs() < 1e-9);
    }
}
