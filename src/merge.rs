//! Merging proteins predicted as two overlapping halves.
//!
//! Long proteins are predicted as an `A` half and a `B` half that share a
//! window of residues: the tail of `A` covers the same residues as the head
//! of `B`. The merged profile keeps `A` up to the window, takes the higher
//! confidence of the two predictions inside it, and continues with `B`.

use crate::error::{PlddtError, Result};
use crate::stats;

pub const OVERLAP_SIZE: usize = 100;
pub const OVERLAP_PLDDT_DIFF_WARN: f64 = 20.0;

#[derive(Clone, Debug, PartialEq)]
pub struct SplitMerge {
    pub merged: Vec<f64>,
    /// Residues actually compared; shorter halves shrink the window.
    pub overlap: usize,
    /// Mean absolute difference between the halves inside the window.
    pub mean_diff: f64,
}

impl SplitMerge {
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.mean_diff > threshold
    }

    pub fn mean(&self) -> f64 {
        stats::mean(&self.merged).unwrap_or(f64::NAN)
    }
}

pub fn merge_split(a: &[f64], b: &[f64], overlap_size: usize) -> Result<SplitMerge> {
    if a.is_empty() || b.is_empty() {
        return Err(PlddtError::InvalidInput(
            "both halves of a split prediction need residues".into(),
        ));
    }

    let overlap = overlap_size.min(a.len()).min(b.len());
    let (a_head, a_tail) = a.split_at(a.len() - overlap);
    let (b_head, b_rest) = b.split_at(overlap);

    let mean_diff = if overlap == 0 {
        0.0
    } else {
        a_tail
            .iter()
            .zip(b_head)
            .map(|(x, y)| (x - y).abs())
            .sum::<f64>()
            / overlap as f64
    };

    let mut merged = Vec::with_capacity(a.len() + b.len() - overlap);
    merged.extend_from_slice(a_head);
    merged.extend(a_tail.iter().zip(b_head).map(|(x, y)| x.max(*y)));
    merged.extend_from_slice(b_rest);

    Ok(SplitMerge {
        merged,
        overlap,
        mean_diff,
    })
}
