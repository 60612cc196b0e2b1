//! Aggregate statistics over confidence values.
//!
//! The scalar helpers return `None` for empty input so callers can decide
//! between skipping an item and writing an empty table cell.

use serde::Serialize;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let v = sorted(values);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        Some((v[mid - 1] + v[mid]) / 2.0)
    } else {
        Some(v[mid])
    }
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

/// Percentile in `[0, 100]` with linear interpolation between closest ranks.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=100.0).contains(&q) {
        return None;
    }
    let v = sorted(values);
    let pos = q / 100.0 * (v.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(v[lo] + (v[hi] - v[lo]) * frac)
}

/// Sample standard deviation (n - 1 denominator); needs two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Shortest round-trip form, always carrying a fractional part.
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

fn count_where(values: &[f64], pred: impl Fn(f64) -> bool) -> usize {
    values.iter().filter(|&&v| pred(v)).count()
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ConfidenceSummary {
    pub peptide_length: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// `[50, 60)`
    pub band_50: usize,
    /// `[60, 70)`
    pub band_60: usize,
    /// `[70, 80)`
    pub band_70: usize,
    /// `[80, 90)`
    pub band_80: usize,
    /// `>= 90`
    pub band_90: usize,
    pub over_80: usize,
    /// Residues above 60, counted as confidently placed.
    pub count_tp: usize,
    /// Residues below 25, counted as likely disordered.
    pub count_fp: usize,
}

impl ConfidenceSummary {
    pub fn from_values(values: &[f64]) -> Self {
        let band = |lo: f64, hi: f64| count_where(values, |v| lo <= v && v < hi);
        ConfidenceSummary {
            peptide_length: values.len(),
            mean: mean(values),
            median: median(values),
            min: min(values),
            max: max(values),
            band_50: band(50.0, 60.0),
            band_60: band(60.0, 70.0),
            band_70: band(70.0, 80.0),
            band_80: band(80.0, 90.0),
            band_90: count_where(values, |v| v >= 90.0),
            over_80: count_where(values, |v| v >= 80.0),
            count_tp: count_where(values, |v| v > 60.0),
            count_fp: count_where(values, |v| v < 25.0),
        }
    }
}
