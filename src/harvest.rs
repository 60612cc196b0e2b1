use std::fs;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

use crate::error::{PlddtError, Result};
use crate::residue::harvest_residues;
use crate::stats::{ConfidenceSummary, format_float};
use crate::structure::parse_structure;

pub const HARVEST_COLUMNS: [&str; 16] = [
    "gene_name",
    "peptide_length",
    "residue_plddt",
    "residue_plddt_mean",
    "residue_plddt_median",
    "residue_plddt_min",
    "residue_plddt_max",
    "residue_plddt_50",
    "residue_plddt_60",
    "residue_plddt_70",
    "residue_plddt_80",
    "residue_plddt_90",
    "total_residue_plddt_over_80",
    "residue_plddt_count_tp",
    "residue_plddt_count_fp",
    "sequence",
];

#[derive(Clone, Debug)]
pub struct HarvestConfig {
    pub directory: PathBuf,
    pub output_prefix: String,
    /// Lower-case extensions without the dot.
    pub extensions: Vec<String>,
    pub use_mmap: bool,
    pub progress: bool,
}

impl HarvestConfig {
    pub fn new(directory: PathBuf, output_prefix: String) -> Self {
        HarvestConfig {
            directory,
            output_prefix,
            extensions: vec!["cif".to_string()],
            use_mmap: false,
            progress: true,
        }
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.tsv", self.output_prefix))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HarvestRecord {
    pub gene_name: String,
    pub sequence: String,
    pub residue_plddt: Vec<f64>,
    pub summary: ConfidenceSummary,
}

impl HarvestRecord {
    pub fn to_row(&self) -> Vec<String> {
        let s = &self.summary;
        vec![
            self.gene_name.clone(),
            s.peptide_length.to_string(),
            format_list(&self.residue_plddt),
            format_opt(s.mean),
            format_opt(s.median),
            format_opt(s.min),
            format_opt(s.max),
            s.band_50.to_string(),
            s.band_60.to_string(),
            s.band_70.to_string(),
            s.band_80.to_string(),
            s.band_90.to_string(),
            s.over_80.to_string(),
            s.count_tp.to_string(),
            s.count_fp.to_string(),
            self.sequence.clone(),
        ]
    }
}

fn format_opt(value: Option<f64>) -> String {
    value.map(format_float).unwrap_or_default()
}

fn format_list(values: &[f64]) -> String {
    let items: Vec<String> = values.iter().copied().map(format_float).collect();
    format!("[{}]", items.join(", "))
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| extensions.iter().any(|x| *x == e))
}

/// Recursive search sorted by path.
pub fn find_structure_files(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(PlddtError::InvalidInput(format!(
            "{} is not a directory",
            root.display()
        )));
    }
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else if has_extension(&path, extensions) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

pub fn harvest_file(path: &Path, use_mmap: bool) -> Result<HarvestRecord> {
    let atoms = parse_structure(path, use_mmap)?;
    let residues = harvest_residues(&atoms);
    let residue_plddt: Vec<f64> = residues.iter().map(|r| r.plddt).collect();
    Ok(HarvestRecord {
        gene_name: path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string(),
        sequence: residues.iter().map(|r| r.one_letter).collect(),
        summary: ConfidenceSummary::from_values(&residue_plddt),
        residue_plddt,
    })
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("|{bar:50}| {percent}% {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("█░-"));
    }
    pb
}

/// Returns the number of rows written; zero when nothing was found.
pub fn run_harvest(config: &HarvestConfig) -> Result<usize> {
    info!("Searching for structure files in {} ...", config.directory.display());
    let files = find_structure_files(&config.directory, &config.extensions)?;
    info!(
        "Found {} structure files under {}",
        files.len(),
        config.directory.display()
    );
    if files.is_empty() {
        warn!("No structure files found. Check your directory structure and path.");
        return Ok(0);
    }

    let output = config.output_path();
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&output)?;
    writer.write_record(HARVEST_COLUMNS)?;

    let pb = progress_bar(files.len(), config.progress);
    let mut rows = 0;
    for path in &files {
        match harvest_file(path, config.use_mmap) {
            Ok(record) => {
                writer.write_record(record.to_row())?;
                rows += 1;
            }
            Err(err) => {
                pb.suspend(|| warn!("Could not read {}: {}", path.display(), err));
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    writer.flush()?;

    info!(
        "Done! Harvested {rows} of {} files. Results saved to {}",
        files.len(),
        output.display()
    );
    Ok(rows)
}
