//! FASTA protein sequences to predictor batch JSON.
//!
//! Every FASTA record becomes one prediction job holding a single protein
//! chain. The job name is the UniProt accession when the header follows the
//! `db|ACCESSION|ENTRY` convention, otherwise the first header token.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FastaRecord {
    pub header: String,
    pub sequence: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProteinChain {
    pub sequence: String,
    pub count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEntry {
    pub protein_chain: ProteinChain,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionJob {
    pub sequences: Vec<ChainEntry>,
    pub name: String,
}

impl PredictionJob {
    pub fn single_chain(name: String, sequence: String) -> Self {
        PredictionJob {
            sequences: vec![ChainEntry {
                protein_chain: ProteinChain { sequence, count: 1 },
            }],
            name,
        }
    }
}

pub fn extract_accession(header: &str) -> String {
    let header = header.trim_start_matches('>').trim();
    let parts: Vec<&str> = header.split('|').collect();
    if parts.len() >= 3 {
        return parts[1].trim().to_string();
    }
    header
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_string()
}

/// Records without any sequence line are dropped, as are lines before the
/// first header.
pub fn read_fasta<R: BufRead>(reader: R) -> Result<Vec<FastaRecord>> {
    let mut records = Vec::new();
    let mut header: Option<String> = None;
    let mut seq = String::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('>') {
            if let Some(h) = header.take() {
                if !seq.is_empty() {
                    records.push(FastaRecord {
                        header: h,
                        sequence: std::mem::take(&mut seq),
                    });
                }
            }
            header = Some(line.to_string());
            seq.clear();
        } else if header.is_some() {
            seq.push_str(line);
        }
    }

    if let Some(h) = header {
        if !seq.is_empty() {
            records.push(FastaRecord {
                header: h,
                sequence: seq,
            });
        }
    }

    Ok(records)
}

pub fn to_prediction_jobs(records: Vec<FastaRecord>) -> Vec<PredictionJob> {
    records
        .into_iter()
        .map(|r| PredictionJob::single_chain(extract_accession(&r.header), r.sequence))
        .collect()
}

/// Serialise jobs as a JSON array with the given indent width.
pub fn write_jobs_json<W, T>(writer: W, jobs: &T, indent: usize) -> Result<()>
where
    W: Write,
    T: Serialize + ?Sized,
{
    let indent = vec![b' '; indent];
    let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
    let mut ser = serde_json::Serializer::with_formatter(writer, formatter);
    jobs.serialize(&mut ser)?;
    Ok(())
}

pub fn fasta_to_json(input: &Path, output: &Path) -> Result<usize> {
    let reader = BufReader::new(File::open(input)?);
    let jobs = to_prediction_jobs(read_fasta(reader)?);

    let mut out = BufWriter::new(File::create(output)?);
    write_jobs_json(&mut out, &jobs, 4)?;
    out.flush()?;

    info!(
        "JSON written: {} sequences -> {}",
        jobs.len(),
        output.display()
    );
    Ok(jobs.len())
}
