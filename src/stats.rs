//! Streaming numeric accumulators.
//!
//! `DoubleData` and `IntData` collect count/sum/min/max over a sample stream
//! without keeping the samples. Empty accumulators report the UNKNOWN
//! sentinel, never zero and never NaN, so downstream formulas can tell
//! "no samples" from "measured zero".

use crate::util::{UNKNOWN_DOUBLE, UNKNOWN_INT};

#[derive(Debug, Clone, Default)]
pub struct DoubleData {
    n: usize,
    sum: f64,
    min: f64,
    max: f64,
}

impl DoubleData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, x: f64) {
        if self.n == 0 {
            self.min = x;
            self.max = x;
        } else {
            self.min = self.min.min(x);
            self.max = self.max.max(x);
        }
        self.sum += x;
        self.n += 1;
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn sum(&self) -> f64 {
        if self.n == 0 { UNKNOWN_DOUBLE } else { self.sum }
    }

    pub fn min(&self) -> f64 {
        if self.n == 0 { UNKNOWN_DOUBLE } else { self.min }
    }

    pub fn max(&self) -> f64 {
        if self.n == 0 { UNKNOWN_DOUBLE } else { self.max }
    }

    pub fn average(&self) -> f64 {
        if self.n == 0 {
            UNKNOWN_DOUBLE
        } else {
            self.sum / self.n as f64
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntData {
    n: usize,
    sum: i64,
    min: i64,
    max: i64,
}

impl IntData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, x: i64) {
        if self.n == 0 {
            self.min = x;
            self.max = x;
        } else {
            self.min = self.min.min(x);
            self.max = self.max.max(x);
        }
        self.sum += x;
        self.n += 1;
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn sum(&self) -> i64 {
        if self.n == 0 { UNKNOWN_INT } else { self.sum }
    }

    pub fn min(&self) -> i64 {
        if self.n == 0 { UNKNOWN_INT } else { self.min }
    }

    pub fn max(&self) -> i64 {
        if self.n == 0 { UNKNOWN_INT } else { self.max }
    }

    pub fn average(&self) -> f64 {
        if self.n == 0 {
            UNKNOWN_DOUBLE
        } else {
            self.sum as f64 / self.n as f64
        }
    }
}
