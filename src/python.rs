//! Python bindings, built with `--features python`.

use std::path::PathBuf;

use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;

use crate::error::PlddtError;
use crate::stats::ConfidenceSummary;

fn to_py_err(err: PlddtError) -> PyErr {
    match err {
        PlddtError::Io(e) => PyIOError::new_err(e.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

/// Per-residue mean pLDDT in file order.
#[pyfunction]
#[pyo3(signature = (path, use_mmap = false))]
fn residue_plddt(path: PathBuf, use_mmap: bool) -> PyResult<Vec<f64>> {
    crate::residue::residue_plddt_ordered(&path, use_mmap).map_err(to_py_err)
}

/// Merge two halves; returns `(merged, overlap, mean_diff)`.
#[pyfunction]
#[pyo3(signature = (a, b, overlap = crate::merge::OVERLAP_SIZE))]
fn merge_split(a: Vec<f64>, b: Vec<f64>, overlap: usize) -> PyResult<(Vec<f64>, usize, f64)> {
    let m = crate::merge::merge_split(&a, &b, overlap).map_err(to_py_err)?;
    Ok((m.merged, m.overlap, m.mean_diff))
}

/// Summary statistics as a JSON string.
#[pyfunction]
fn summarize(values: Vec<f64>) -> PyResult<String> {
    serde_json::to_string(&ConfidenceSummary::from_values(&values))
        .map_err(|e| PyValueError::new_err(e.to_string()))
}

#[pymodule]
fn plddt(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(residue_plddt, m)?)?;
    m.add_function(wrap_pyfunction!(merge_split, m)?)?;
    m.add_function(wrap_pyfunction!(summarize, m)?)?;
    Ok(())
}
