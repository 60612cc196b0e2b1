//! Distribution profiles of per-protein mean pLDDT, one per species.
//!
//! Three tables are produced from the `gather` CSV: step-histogram densities,
//! Gaussian KDE curves on a grid shared by all species (Scott factor applied
//! to the sample standard deviation), and Gaussian KDE curves on each
//! species' own support using the robust Scott bandwidth
//! `1.059 * min(std, IQR / 1.349) * n^(-1/5)`.

use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Deserialize;

use crate::error::{PlddtError, Result};
use crate::stats::{self, format_float};

pub const DEFAULT_BINS: usize = 40;
pub const DEFAULT_GRID_POINTS: usize = 400;
const SUPPORT_CUT: f64 = 3.0;
const MIN_SUPPORT_POINTS: usize = 512;

#[derive(Clone, Debug)]
pub struct ProfileConfig {
    pub input: PathBuf,
    pub output_prefix: String,
    pub bins: usize,
    pub grid_points: usize,
}

#[derive(Debug, Deserialize)]
struct GatherRecord {
    #[serde(rename = "Species")]
    species: String,
    #[serde(rename = "Mean_pLDDT")]
    mean_plddt: f64,
}

/// Species in order of first appearance.
pub type SpeciesValues = Vec<(String, Vec<f64>)>;

pub fn read_gather_table(path: &Path) -> Result<SpeciesValues> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut groups: SpeciesValues = Vec::new();
    for record in reader.deserialize() {
        let record: GatherRecord = record?;
        match groups.iter().position(|(s, _)| *s == record.species) {
            Some(i) => groups[i].1.push(record.mean_plddt),
            None => groups.push((record.species, vec![record.mean_plddt])),
        }
    }
    Ok(groups)
}

pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            let mut points: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            points[n - 1] = end;
            points
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    /// `bins + 1` edges.
    pub edges: Vec<f64>,
    pub density: Vec<f64>,
}

/// Equal-width bins over the data range; the last bin is closed. A
/// constant sample spans `value ± 0.5`. Values on an interior edge go to the
/// bin that edge opens, checked against the stored edges.
pub fn histogram_density(values: &[f64], bins: usize) -> Result<Histogram> {
    if bins == 0 {
        return Err(PlddtError::InvalidInput("histogram needs at least one bin".into()));
    }
    let (Some(mut lo), Some(mut hi)) = (stats::min(values), stats::max(values)) else {
        return Err(PlddtError::InvalidInput("histogram of an empty sample".into()));
    };
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }

    let edges = linspace(lo, hi, bins + 1);
    let scale = bins as f64 / (hi - lo);
    let mut counts = vec![0usize; bins];
    for &v in values {
        let mut k = (((v - lo) * scale) as usize).min(bins - 1);
        if v < edges[k] {
            k -= 1;
        } else if k + 1 < bins && v >= edges[k + 1] {
            k += 1;
        }
        counts[k] += 1;
    }

    let n = values.len() as f64;
    let density = (0..bins)
        .map(|k| counts[k] as f64 / (n * (edges[k + 1] - edges[k])))
        .collect();
    Ok(Histogram { edges, density })
}

#[derive(Clone, Debug)]
pub struct GaussianKde {
    samples: Vec<f64>,
    bandwidth: f64,
}

impl GaussianKde {
    pub fn with_bandwidth(samples: &[f64], bandwidth: f64) -> Result<Self> {
        if samples.len() < 2 {
            return Err(PlddtError::InvalidInput(
                "kernel density needs at least two values".into(),
            ));
        }
        if !(bandwidth.is_finite() && bandwidth > 0.0) {
            return Err(PlddtError::InvalidInput(format!(
                "kernel bandwidth must be positive, got {bandwidth}"
            )));
        }
        Ok(GaussianKde {
            samples: samples.to_vec(),
            bandwidth,
        })
    }

    /// Scott's factor `n^(-1/5)` times the sample standard deviation.
    pub fn scott(samples: &[f64]) -> Result<Self> {
        let std = stats::sample_std(samples).unwrap_or(0.0);
        let factor = (samples.len() as f64).powf(-0.2);
        Self::with_bandwidth(samples, std * factor)
    }

    /// `1.059 * A * n^(-1/5)` with `A = min(std, IQR / 1.349)`; `A = std`
    /// when the IQR is zero.
    pub fn robust_scott(samples: &[f64]) -> Result<Self> {
        let std = stats::sample_std(samples).unwrap_or(0.0);
        let iqr = match (stats::percentile(samples, 75.0), stats::percentile(samples, 25.0)) {
            (Some(q3), Some(q1)) => (q3 - q1) / 1.349,
            _ => 0.0,
        };
        let spread = if iqr > 0.0 { std.min(iqr) } else { std };
        let bw = 1.059 * spread * (samples.len() as f64).powf(-0.2);
        Self::with_bandwidth(samples, bw)
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let h = self.bandwidth;
        let norm = 1.0 / ((2.0 * PI).sqrt() * h * self.samples.len() as f64);
        self.samples
            .iter()
            .map(|xi| {
                let z = (x - xi) / h;
                (-0.5 * z * z).exp()
            })
            .sum::<f64>()
            * norm
    }

    pub fn evaluate_grid(&self, grid: &[f64]) -> Vec<f64> {
        grid.iter().map(|&x| self.evaluate(x)).collect()
    }

    /// `[min - 3h, max + 3h]` with a power-of-two number of points, at
    /// least 512.
    pub fn support(&self) -> Vec<f64> {
        let lo = stats::min(&self.samples).unwrap_or(0.0) - SUPPORT_CUT * self.bandwidth;
        let hi = stats::max(&self.samples).unwrap_or(0.0) + SUPPORT_CUT * self.bandwidth;
        let n = self.samples.len().max(MIN_SUPPORT_POINTS).next_power_of_two();
        linspace(lo, hi, n)
    }
}

fn tsv_writer(path: &Path, header: &[&str]) -> Result<csv::Writer<std::fs::File>> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    writer.write_record(header)?;
    Ok(writer)
}

fn write_curve(
    writer: &mut csv::Writer<std::fs::File>,
    species: &str,
    grid: &[f64],
    density: &[f64],
) -> Result<()> {
    for (x, y) in grid.iter().zip(density) {
        writer.write_record([species.to_string(), format_float(*x), format_float(*y)])?;
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProfileOutputs {
    pub histogram: PathBuf,
    pub kde_shared: PathBuf,
    pub kde_support: PathBuf,
}

impl ProfileOutputs {
    pub fn for_prefix(prefix: &str) -> Self {
        ProfileOutputs {
            histogram: PathBuf::from(format!("{prefix}_hist.tsv")),
            kde_shared: PathBuf::from(format!("{prefix}_kde_shared.tsv")),
            kde_support: PathBuf::from(format!("{prefix}_kde_support.tsv")),
        }
    }
}

pub fn run_profile(config: &ProfileConfig) -> Result<ProfileOutputs> {
    let groups = read_gather_table(&config.input)?;
    let species: Vec<&str> = groups.iter().map(|(s, _)| s.as_str()).collect();
    info!("Loaded species: {species:?}");

    let all: Vec<f64> = groups.iter().flat_map(|(_, v)| v.iter().copied()).collect();
    let (Some(lo), Some(hi)) = (stats::min(&all), stats::max(&all)) else {
        return Err(PlddtError::InvalidInput(format!(
            "{} contains no values",
            config.input.display()
        )));
    };
    let shared_grid = linspace(lo, hi, config.grid_points);

    let outputs = ProfileOutputs::for_prefix(&config.output_prefix);
    let hist_header = ["species", "bin_left", "bin_right", "density"];
    let mut hist = tsv_writer(&outputs.histogram, &hist_header)?;
    let mut shared = tsv_writer(&outputs.kde_shared, &["species", "x", "density"])?;
    let mut support = tsv_writer(&outputs.kde_support, &["species", "x", "density"])?;

    for (name, values) in &groups {
        let h = histogram_density(values, config.bins)?;
        for (k, d) in h.density.iter().enumerate() {
            hist.write_record([
                name.clone(),
                format_float(h.edges[k]),
                format_float(h.edges[k + 1]),
                format_float(*d),
            ])?;
        }

        match GaussianKde::scott(values) {
            Ok(kde) => {
                let density = kde.evaluate_grid(&shared_grid);
                write_curve(&mut shared, name, &shared_grid, &density)?;
            }
            Err(err) => warn!("{name}: shared-grid density skipped ({err})"),
        }
        match GaussianKde::robust_scott(values) {
            Ok(kde) => {
                let grid = kde.support();
                write_curve(&mut support, name, &grid, &kde.evaluate_grid(&grid))?;
            }
            Err(err) => warn!("{name}: support density skipped ({err})"),
        }
    }

    hist.flush()?;
    shared.flush()?;
    support.flush()?;
    info!(
        "Profiles written: {}, {}, {}",
        outputs.histogram.display(),
        outputs.kde_shared.display(),
        outputs.kde_support.display()
    );
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn linspace_endpoints() {
        assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(linspace(3.0, 9.0, 1), vec![3.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn histogram_integrates_to_one() {
        let values = [1.0, 2.0, 2.0, 3.0, 4.0];
        let h = histogram_density(&values, 3).unwrap();
        assert_eq!(h.edges.len(), 4);
        let width = h.edges[1] - h.edges[0];
        let area: f64 = h.density.iter().map(|d| d * width).sum();
        assert!((area - 1.0).abs() < 1e-12);
        // 4.0 sits on the closed right edge of the last bin.
        assert!((h.density[2] * width * 5.0 - 2.0).abs() < 1e-12);
    }

    #[test]
    fn values_on_interior_edges_open_their_bin() {
        let edges = linspace(0.1, 0.7, 7);
        let h = histogram_density(&edges, 6).unwrap();
        assert_eq!(h.edges, edges);
        let counts: Vec<f64> = (0..6)
            .map(|k| (h.density[k] * 7.0 * (h.edges[k + 1] - h.edges[k])).round())
            .collect();
        assert_eq!(counts, vec![1.0, 1.0, 1.0, 1.0, 1.0, 2.0]);
    }

    #[test]
    fn histogram_of_constant_sample() {
        let h = histogram_density(&[7.0, 7.0], 2).unwrap();
        assert_eq!(h.edges, vec![6.5, 7.0, 7.5]);
        assert_eq!(h.density, vec![0.0, 2.0]);
        assert!(histogram_density(&[], 2).is_err());
    }

    #[test]
    fn kde_bandwidth_rules() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        let std = stats::sample_std(&v).unwrap();
        let factor = 5f64.powf(-0.2);

        let scott = GaussianKde::scott(&v).unwrap();
        assert!((scott.bandwidth() - std * factor).abs() < 1e-12);

        // IQR / 1.349 is below the sample std here.
        let robust = GaussianKde::robust_scott(&v).unwrap();
        assert!((robust.bandwidth() - 1.059 * (2.0 / 1.349) * factor).abs() < 1e-12);
    }

    #[test]
    fn kde_rejects_degenerate_samples() {
        assert!(GaussianKde::scott(&[1.0]).is_err());
        assert!(GaussianKde::scott(&[2.0, 2.0]).is_err());
    }

    #[test]
    fn kde_density_is_normalised() {
        let kde = GaussianKde::with_bandwidth(&[0.0, 1.0], 0.5).unwrap();
        let grid = kde.support();
        assert_eq!(grid.len(), 512);
        let dx = grid[1] - grid[0];
        let area: f64 = kde.evaluate_grid(&grid).iter().sum::<f64>() * dx;
        assert!((area - 1.0).abs() < 5e-3);
        assert!((kde.evaluate(0.0) - kde.evaluate(1.0)).abs() < 1e-12);
    }

    #[test]
    fn run_profile_writes_three_tables() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("plddt_all_values.csv");
        let table = "Species,Protein_ID,Mean_pLDDT\n\
            human,P1,70.0\nhuman,P2,80.0\nhuman,P3,90.0\nyeast,Y1,55.0\n";
        fs::write(&input, table).unwrap();

        let prefix = dir.path().join("plddt").to_string_lossy().into_owned();
        let outputs = run_profile(&ProfileConfig {
            input,
            output_prefix: prefix,
            bins: 4,
            grid_points: 10,
        })
        .unwrap();

        let hist = fs::read_to_string(&outputs.histogram).unwrap();
        assert_eq!(hist.lines().count(), 1 + 4 + 4);
        assert_eq!(hist.lines().nth(1).unwrap(), "human\t70.0\t75.0\t0.06666666666666667");

        // yeast has a single value, so only human gets curves.
        let shared = fs::read_to_string(&outputs.kde_shared).unwrap();
        assert_eq!(shared.lines().count(), 1 + 10);
        assert!(shared.lines().skip(1).all(|l| l.starts_with("human\t")));

        let support = fs::read_to_string(&outputs.kde_support).unwrap();
        assert_eq!(support.lines().count(), 1 + 512);
    }

    #[test]
    fn gather_table_keeps_first_appearance_order() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("t.csv");
        fs::write(&input, "Species,Protein_ID,Mean_pLDDT\nz,a,1.0\na,b,2.0\nz,c,3.0\n").unwrap();
        let groups = read_gather_table(&input).unwrap();
        assert_eq!(
            groups,
            vec![("z".to_string(), vec![1.0, 3.0]), ("a".to_string(), vec![2.0])]
        );
    }
}
