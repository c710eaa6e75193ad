//! Shared constants and small helpers.
//!
//! Every timing field in the crate is milliseconds stored as `f64` and every
//! memory size is bytes stored as `i64`. Fields that were never measured hold
//! the UNKNOWN sentinel rather than zero, so that a missing value can never be
//! mistaken for a measured one.

/// Sentinel for a millisecond value that was never measured.
pub const UNKNOWN_DOUBLE: f64 = -1.0;
/// Sentinel for a byte count (or other integer) that was never measured.
pub const UNKNOWN_INT: i64 = -1;

pub const MS2S: f64 = 1000.0;

pub const KB: i64 = 1024;
pub const MB: i64 = 1024 * 1024;
pub const GB: i64 = 1024 * 1024 * 1024;

pub fn known_double(v: f64) -> bool {
    v != UNKNOWN_DOUBLE
}

pub fn known_int(v: i64) -> bool {
    v != UNKNOWN_INT
}

pub fn zero_if_unknown_int(v: i64) -> i64 {
    if known_int(v) { v } else { 0 }
}

pub fn zero_if_unknown_double(v: f64) -> f64 {
    if known_double(v) { v } else { 0.0 }
}

/// Sum that propagates UNKNOWN: the result is known only when both operands are.
pub fn plus_int(a: i64, b: i64) -> i64 {
    if known_int(a) && known_int(b) {
        a + b
    } else {
        UNKNOWN_INT
    }
}

/// Lenient sum: an UNKNOWN operand is treated as absent, not poisonous.
pub fn plus_int_lenient(a: i64, b: i64) -> i64 {
    match (known_int(a), known_int(b)) {
        (true, true) => a + b,
        (true, false) => a,
        (false, true) => b,
        (false, false) => UNKNOWN_INT,
    }
}

/// Difference that propagates UNKNOWN.
pub fn minus_int(a: i64, b: i64) -> i64 {
    if known_int(a) && known_int(b) {
        a - b
    } else {
        UNKNOWN_INT
    }
}

/// Lenient difference: an UNKNOWN subtrahend subtracts nothing; an UNKNOWN
/// minuend stays UNKNOWN.
pub fn minus_int_lenient(a: i64, b: i64) -> i64 {
    if !known_int(a) {
        return UNKNOWN_INT;
    }
    if !known_int(b) { a } else { a - b }
}

/// Render a byte count the way GC logs do (K/M/G with one decimal at most).
pub fn format_bytes(bytes: i64) -> String {
    if !known_int(bytes) {
        return "unknown".to_string();
    }
    if bytes >= GB {
        format!("{:.1}G", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}M", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{}K", bytes / KB)
    } else {
        format!("{}B", bytes)
    }
}

/// Render a millisecond duration for event details.
pub fn format_millis(ms: f64) -> String {
    if !known_double(ms) {
        return "unknown".to_string();
    }
    if ms >= 1000.0 {
        format!("{:.3}s", ms / 1000.0)
    } else {
        format!("{:.3}ms", ms)
    }
}
