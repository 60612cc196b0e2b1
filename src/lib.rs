//! Batch tools around structure-prediction confidence (pLDDT).
//!
//! - [`fasta`]: FASTA sequences to predictor batch JSON.
//! - [`chunk`]: split batch JSON into fixed-size files.
//! - [`harvest`]: per-residue pLDDT statistics for every mmCIF under a tree.
//! - [`gather`]: mean pLDDT per protein across species datasets, merging
//!   proteins predicted in two overlapping halves ([`merge`]).
//! - [`profile`]: histogram and kernel-density profiles of the gathered means.

use std::path::PathBuf;

pub mod chunk;
pub mod error;
pub mod fasta;
pub mod gather;
pub mod harvest;
pub mod merge;
pub mod profile;
pub mod residue;
pub mod stats;
pub mod structure;

#[cfg(feature = "python")]
mod python;

pub use chunk::{ChunkConfig, run_chunk};
pub use error::{PlddtError, Result};
pub use fasta::fasta_to_json;
pub use gather::{GatherConfig, run_gather};
pub use harvest::{HarvestConfig, run_harvest};
pub use merge::{SplitMerge, merge_split};
pub use profile::{ProfileConfig, run_profile};
pub use stats::ConfidenceSummary;

pub const BASE_DIR_ENV: &str = "PLDDT_BASE_DIR";

/// Dataset root for `gather`: `$PLDDT_BASE_DIR`, else the working directory.
pub fn default_base_path() -> PathBuf {
    if let Ok(val) = std::env::var(BASE_DIR_ENV) {
        PathBuf::from(val)
    } else {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }
}
