//! Mean pLDDT per protein across a tree of prediction datasets.
//!
//! The expected layout is
//! `<base>/<dataset>/<name>_all_one/<protein>/<seed>/predictions/<model>.cif`.
//! Datasets whose name ends in `_split` hold proteins predicted in two halves
//! under `<protein>_A` and `<protein>_B`; those are merged with
//! [`merge_split`] before averaging. Datasets are independent, so they are
//! processed on a rayon pool and their results are only combined at the end.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{PlddtError, Result};
use crate::merge::{OVERLAP_PLDDT_DIFF_WARN, OVERLAP_SIZE, merge_split};
use crate::residue::residue_plddt_ordered;
use crate::stats;

pub const DEFAULT_SEED_DIR: &str = "seed_101";
pub const DEFAULT_OUTPUT: &str = "plddt_all_values.csv";
const PROGRESS_EVERY: usize = 50;

#[derive(Clone, Debug)]
pub struct GatherConfig {
    pub base_dir: PathBuf,
    pub output: PathBuf,
    pub overlap_size: usize,
    pub warn_diff: f64,
    pub seed_dir: String,
    /// `None` uses one worker per CPU.
    pub threads: Option<usize>,
    pub use_mmap: bool,
}

impl GatherConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        GatherConfig {
            base_dir,
            output: PathBuf::from(DEFAULT_OUTPUT),
            overlap_size: OVERLAP_SIZE,
            warn_diff: OVERLAP_PLDDT_DIFF_WARN,
            seed_dir: DEFAULT_SEED_DIR.to_string(),
            threads: None,
            use_mmap: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DatasetResult {
    pub name: String,
    pub proteins: Vec<(String, f64)>,
}

#[derive(Debug, Serialize)]
struct GatherRow<'a> {
    #[serde(rename = "Species")]
    species: &'a str,
    #[serde(rename = "Protein_ID")]
    protein_id: &'a str,
    #[serde(rename = "Mean_pLDDT")]
    mean_plddt: f64,
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Sub-directories sorted by name.
fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

pub fn find_all_one(dataset: &Path) -> Result<Option<PathBuf>> {
    Ok(sorted_subdirs(dataset)?
        .into_iter()
        .find(|p| dir_name(p).ends_with("_all_one")))
}

pub fn find_structure_file(predictions_dir: &Path) -> Result<Option<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(predictions_dir)? {
        let path = entry?.path();
        let name = dir_name(&path);
        if path.is_file() && (name.ends_with(".cif") || name.ends_with(".pdb")) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files.into_iter().next())
}

/// Sorted unique protein ids from `<id>_A` / `<id>_B` directory names.
pub fn split_protein_ids(all_one: &Path) -> Result<Vec<String>> {
    let mut ids: Vec<String> = sorted_subdirs(all_one)?
        .iter()
        .map(|p| dir_name(p))
        .filter(|n| n.ends_with("_A") || n.ends_with("_B"))
        .map(|n| n[..n.len() - 2].to_string())
        .collect();
    ids.sort();
    ids.dedup();
    Ok(ids)
}

fn predictions_dir(all_one: &Path, protein_dir: &str, seed_dir: &str) -> PathBuf {
    all_one.join(protein_dir).join(seed_dir).join("predictions")
}

fn load_half(
    all_one: &Path,
    protein_dir: &str,
    config: &GatherConfig,
) -> Result<Option<Vec<f64>>> {
    let dir = predictions_dir(all_one, protein_dir, &config.seed_dir);
    if !dir.is_dir() {
        return Ok(None);
    }
    let Some(file) = find_structure_file(&dir)? else {
        return Ok(None);
    };
    let residues = residue_plddt_ordered(&file, config.use_mmap)?;
    Ok(if residues.is_empty() { None } else { Some(residues) })
}

fn log_progress(dataset: &str, idx: usize, total: usize) {
    if idx % PROGRESS_EVERY == 0 {
        info!("{dataset}: {idx}/{total} processed");
    }
}

fn merge_protein(
    dataset: &str,
    protein_id: &str,
    all_one: &Path,
    config: &GatherConfig,
) -> Result<Option<f64>> {
    let Some(a) = load_half(all_one, &format!("{protein_id}_A"), config)? else {
        return Ok(None);
    };
    let Some(b) = load_half(all_one, &format!("{protein_id}_B"), config)? else {
        return Ok(None);
    };
    let merge = merge_split(&a, &b, config.overlap_size)?;
    if merge.exceeds(config.warn_diff) {
        warn!(
            "{dataset} | {protein_id}: large pLDDT mismatch in overlap (mean Δ={:.1} over {} residues)",
            merge.mean_diff, merge.overlap
        );
    }
    Ok(Some(merge.mean()))
}

fn collect_split(name: &str, all_one: &Path, config: &GatherConfig) -> Result<Vec<(String, f64)>> {
    let ids = split_protein_ids(all_one)?;
    info!("{name}: found {} split proteins", ids.len());

    let mut proteins = Vec::new();
    for (idx, protein_id) in ids.iter().enumerate() {
        let outcome = merge_protein(name, protein_id, all_one, config);

        match outcome {
            Ok(Some(mean)) => proteins.push((protein_id.clone(), mean)),
            Ok(None) => {}
            Err(err) => warn!("{protein_id}: split processing failed ({err})"),
        }
        log_progress(name, idx + 1, ids.len());
    }
    Ok(proteins)
}

fn collect_plain(name: &str, all_one: &Path, config: &GatherConfig) -> Result<Vec<(String, f64)>> {
    let protein_dirs: Vec<String> = sorted_subdirs(all_one)?.iter().map(|p| dir_name(p)).collect();
    info!("{name}: found {} proteins", protein_dirs.len());

    let mut proteins = Vec::new();
    for (idx, protein_id) in protein_dirs.iter().enumerate() {
        match load_half(all_one, protein_id, config) {
            Ok(Some(residues)) => {
                if let Some(mean) = stats::mean(&residues) {
                    proteins.push((protein_id.clone(), mean));
                }
            }
            Ok(None) => {}
            Err(err) => warn!("Could not read {protein_id}: {err}"),
        }
        log_progress(name, idx + 1, protein_dirs.len());
    }
    Ok(proteins)
}

/// Never fails: problems are logged and yield an empty result.
pub fn collect_dataset(dataset: &Path, config: &GatherConfig) -> DatasetResult {
    let name = dir_name(dataset);
    info!("[START] Processing dataset: {name}");

    let collected = find_all_one(dataset).and_then(|all_one| match all_one {
        None => {
            info!("[SKIP] {name}: no *_all_one directory");
            Ok(Vec::new())
        }
        Some(dir) if name.ends_with("_split") => collect_split(&name, &dir, config),
        Some(dir) => collect_plain(&name, &dir, config),
    });

    let proteins = collected.unwrap_or_else(|err| {
        warn!("{name}: dataset could not be read ({err})");
        Vec::new()
    });
    info!("[DONE] Finished dataset: {name} ({} proteins)", proteins.len());
    DatasetResult { name, proteins }
}

pub fn collect_all(datasets: &[PathBuf], config: &GatherConfig) -> Result<Vec<DatasetResult>> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = config.threads {
        builder = builder.num_threads(n);
    }
    let pool = builder
        .build()
        .map_err(|e| PlddtError::InvalidInput(format!("cannot start worker pool: {e}")))?;
    info!("Using {} workers", pool.current_num_threads());

    Ok(pool.install(|| {
        datasets
            .par_iter()
            .map(|d| collect_dataset(d, config))
            .collect()
    }))
}

pub fn write_table<W: std::io::Write>(writer: W, results: &[DatasetResult]) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut rows = 0;
    for result in results {
        for (protein_id, mean_plddt) in &result.proteins {
            wtr.serialize(GatherRow {
                species: &result.name,
                protein_id,
                mean_plddt: *mean_plddt,
            })?;
            rows += 1;
        }
    }
    if rows == 0 {
        wtr.write_record(["Species", "Protein_ID", "Mean_pLDDT"])?;
    }
    wtr.flush()?;
    Ok(rows)
}

/// Returns the number of protein rows written.
pub fn run_gather(config: &GatherConfig) -> Result<usize> {
    let datasets = sorted_subdirs(&config.base_dir)?;
    let names: Vec<String> = datasets.iter().map(|d| dir_name(d)).collect();
    info!("Datasets found: {names:?}");
    if datasets.is_empty() {
        warn!("No datasets under {}", config.base_dir.display());
        return Ok(0);
    }

    let results: Vec<DatasetResult> = collect_all(&datasets, config)?
        .into_iter()
        .filter(|r| !r.proteins.is_empty())
        .collect();

    let file = fs::File::create(&config.output)?;
    let rows = write_table(std::io::BufWriter::new(file), &results)?;
    info!(
        "Saved {rows} mean pLDDT values to CSV: {}",
        config.output.display()
    );
    Ok(rows)
}
