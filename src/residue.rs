//! Per-residue confidence from atom sites.
//!
//! Two groupings exist. [`harvest_residues`] walks polymer residues only and
//! keeps the residue identity, which the harvest table needs for the
//! sequence column. The `ordered_*` functions group every atom row in file
//! order and yield just the confidence values, which is what the split-merge
//! pipeline consumes.

use std::path::Path;

use crate::error::{PlddtError, Result};
use crate::stats;
use crate::structure::{AtomSite, LabelSeq, RecordKind, StructureFormat, parse_structure};

#[derive(Clone, Debug, PartialEq)]
pub struct ResidueConfidence {
    pub model: u32,
    pub chain: String,
    pub res_seq: i32,
    pub res_name: String,
    pub one_letter: char,
    pub plddt: f64,
}

pub fn three_to_one(res_name: &str) -> Option<char> {
    let c = match res_name {
        "ALA" => 'A',
        "ARG" => 'R',
        "ASN" => 'N',
        "ASP" => 'D',
        "CYS" => 'C',
        "GLN" => 'Q',
        "GLU" => 'E',
        "GLY" => 'G',
        "HIS" => 'H',
        "ILE" => 'I',
        "LEU" => 'L',
        "LYS" => 'K',
        "MET" => 'M',
        "PHE" => 'F',
        "PRO" => 'P',
        "SER" => 'S',
        "THR" => 'T',
        "TRP" => 'W',
        "TYR" => 'Y',
        "VAL" => 'V',
        _ => return None,
    };
    Some(c)
}

type ResidueKey<'a> = (u32, &'a str, i32, Option<char>, RecordKind);

fn residue_key(atom: &AtomSite) -> ResidueKey<'_> {
    (atom.model, &atom.chain, atom.res_seq, atom.ins_code, atom.kind)
}

/// Splits atoms into runs of consecutive rows sharing a key.
fn runs_by<'a, K, F>(atoms: &'a [AtomSite], key: F) -> Vec<&'a [AtomSite]>
where
    K: PartialEq,
    F: Fn(&'a AtomSite) -> K,
{
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=atoms.len() {
        if i == atoms.len() || key(&atoms[i]) != key(&atoms[start]) {
            if i > start {
                runs.push(&atoms[start..i]);
            }
            start = i;
        }
    }
    runs
}

/// Standard amino-acid residues of every model; HETATM residues are skipped.
/// Of the alternate locations sharing an atom name, the one with the highest
/// occupancy counts, the earliest on ties.
pub fn harvest_residues(atoms: &[AtomSite]) -> Vec<ResidueConfidence> {
    let mut residues = Vec::new();
    for run in runs_by(atoms, residue_key) {
        let first = &run[0];
        if first.kind == RecordKind::Hetatm {
            continue;
        }
        let Some(one_letter) = three_to_one(&first.res_name) else {
            continue;
        };

        let b_values: Vec<f64> = select_alternates(run).iter().map(|a| a.b_factor).collect();
        let Some(plddt) = stats::mean(&b_values) else {
            continue;
        };

        residues.push(ResidueConfidence {
            model: first.model,
            chain: first.chain.clone(),
            res_seq: first.res_seq,
            res_name: first.res_name.clone(),
            one_letter,
            plddt,
        });
    }
    residues
}

/// One atom per name, in order of first appearance.
fn select_alternates(run: &[AtomSite]) -> Vec<&AtomSite> {
    let mut chosen: Vec<&AtomSite> = Vec::with_capacity(run.len());
    for atom in run {
        match chosen.iter().position(|c| c.atom_name == atom.atom_name) {
            Some(i) if atom.occupancy > chosen[i].occupancy => chosen[i] = atom,
            Some(_) => {}
            None => chosen.push(atom),
        }
    }
    chosen
}

/// Groups `_atom_site` rows by `(label_asym_id, label_seq_id)` as they appear.
/// A `.` sequence id counts as 0, so each non-polymer group of a chain forms
/// one residue. A `?` or non-integer id makes the file unusable.
pub fn ordered_residues_cif(atoms: &[AtomSite]) -> Result<Vec<f64>> {
    if let Some(bad) = atoms.iter().find(|a| a.label_seq == LabelSeq::Unknown) {
        return Err(PlddtError::Parse(format!(
            "atom_site row for {} in chain {} has no integer label_seq_id",
            bad.res_name, bad.label_asym
        )));
    }
    Ok(runs_by(atoms, |a| (a.label_asym.as_str(), a.label_seq.number().unwrap_or(0)))
        .into_iter()
        .filter_map(|run| stats::mean(&b_factors(run)))
        .collect())
}

/// Every residue of every model and chain, hetero groups included.
pub fn ordered_residues_pdb(atoms: &[AtomSite]) -> Vec<f64> {
    runs_by(atoms, residue_key)
        .into_iter()
        .filter_map(|run| stats::mean(&b_factors(run)))
        .collect()
}

fn b_factors(run: &[AtomSite]) -> Vec<f64> {
    run.iter().map(|a| a.b_factor).collect()
}

pub fn residue_plddt_ordered(path: &Path, use_mmap: bool) -> Result<Vec<f64>> {
    let atoms = parse_structure(path, use_mmap)?;
    match StructureFormat::from_path(path) {
        StructureFormat::Mmcif => ordered_residues_cif(&atoms),
        StructureFormat::Pdb => Ok(ordered_residues_pdb(&atoms)),
    }
}
