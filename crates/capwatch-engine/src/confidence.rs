//! Sampling confidence intervals.
//!
//! Adaptively sampled datasets return an estimate plus interval bounds per
//! row. Partitions of the same population (rows of one response, zones of
//! one account) combine by plain summation of estimates and bounds, which
//! keeps the combiner associative and order-independent for the fan-out
//! layer. The single derived `confidence_percent` is what operators see.

use serde::{Deserialize, Serialize};

/// Combined sampling interval for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Central estimate of the true value.
    pub estimate: f64,
    /// Lower interval bound.
    pub lower: f64,
    /// Upper interval bound.
    pub upper: f64,
    /// Rows actually sampled to produce the estimate.
    pub sample_size: u64,
    /// Backend judgment that the sample was large enough to trust.
    pub is_valid: bool,
    /// Confidence level the bounds were computed at, e.g. 0.95.
    pub level: f64,
    /// Derived 0-99 quality score; higher means a tighter interval.
    pub confidence_percent: f64,
}

impl ConfidenceInterval {
    /// Build an interval, deriving `confidence_percent` from the bounds.
    pub fn new(
        estimate: f64,
        lower: f64,
        upper: f64,
        sample_size: u64,
        is_valid: bool,
        level: f64,
    ) -> Self {
        Self {
            estimate,
            lower,
            upper,
            sample_size,
            is_valid,
            level,
            confidence_percent: confidence_percent(estimate, lower, upper),
        }
    }
}

/// Map interval width relative to the estimate onto a 0-99 scale.
///
/// 100 minus half the relative spread in percent, clamped to `[0, 99]`.
/// A zero or non-finite estimate reads as "nothing was sampled away" and
/// scores the maximum 99; the score never reaches 100 because sampled data
/// is never exact.
pub fn confidence_percent(estimate: f64, lower: f64, upper: f64) -> f64 {
    if estimate == 0.0 || !estimate.is_finite() {
        return 99.0;
    }
    let half_spread_pct = (upper - lower) / estimate * 100.0 / 2.0;
    let score = 100.0 - half_spread_pct;
    if !score.is_finite() {
        return 99.0;
    }
    score.clamp(0.0, 99.0)
}

/// Combine per-partition intervals into one. Estimates, bounds, and sample
/// sizes add; validity is the conjunction; the level is taken from the
/// first partition (all partitions are queried at the same level). Returns
/// `None` for an empty slice, meaning no sampled partition reported at all.
pub fn combine(partitions: &[ConfidenceInterval]) -> Option<ConfidenceInterval> {
    let first = partitions.first()?;
    let mut estimate = 0.0;
    let mut lower = 0.0;
    let mut upper = 0.0;
    let mut sample_size = 0u64;
    let mut is_valid = true;
    for part in partitions {
        estimate += part.estimate;
        lower += part.lower;
        upper += part.upper;
        sample_size = sample_size.saturating_add(part.sample_size);
        is_valid &= part.is_valid;
    }
    Some(ConfidenceInterval::new(
        estimate,
        lower,
        upper,
        sample_size,
        is_valid,
        first.level,
    ))
}
