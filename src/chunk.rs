use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde_json::Value;

use crate::error::{PlddtError, Result};
use crate::fasta::write_jobs_json;

pub const DEFAULT_CHUNK_SIZE: usize = 100;

#[derive(Clone, Debug)]
pub struct ChunkConfig {
    pub input: PathBuf,
    pub out_dir: Option<PathBuf>,
    pub prefix: Option<String>,
    pub size: usize,
}

/// Chunk file names are `<prefix>_chunk_<k>.json`, `k` counted from 1.
pub fn chunk_path(out_dir: &Path, prefix: &str, index: usize) -> PathBuf {
    out_dir.join(format!("{prefix}_chunk_{index}.json"))
}

pub fn chunk_jobs(input: &Path, out_dir: &Path, prefix: &str, size: usize) -> Result<Vec<PathBuf>> {
    if size == 0 {
        return Err(PlddtError::InvalidInput("chunk size must be at least 1".into()));
    }

    let data: Value = serde_json::from_reader(BufReader::new(File::open(input)?))?;
    let Value::Array(items) = data else {
        return Err(PlddtError::Parse(format!(
            "{} does not contain a JSON array",
            input.display()
        )));
    };

    fs::create_dir_all(out_dir)?;
    let mut written = Vec::new();
    for (k, chunk) in items.chunks(size).enumerate() {
        let path = chunk_path(out_dir, prefix, k + 1);
        let mut out = BufWriter::new(File::create(&path)?);
        write_jobs_json(&mut out, chunk, 2)?;
        out.flush()?;
        debug!("wrote {} jobs to {}", chunk.len(), path.display());
        written.push(path);
    }

    info!("Created {} JSON chunks from {} jobs", written.len(), items.len());
    Ok(written)
}

pub fn run_chunk(config: &ChunkConfig) -> Result<Vec<PathBuf>> {
    let prefix = match &config.prefix {
        Some(p) => p.clone(),
        None => config
            .input
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("jobs")
            .to_string(),
    };
    let out_dir = match &config.out_dir {
        Some(d) => d.clone(),
        None => config
            .input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    chunk_jobs(&config.input, &out_dir, &prefix, config.size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_array(dir: &Path, n: usize) -> PathBuf {
        let items: Vec<Value> = (0..n).map(|i| serde_json::json!({ "name": i })).collect();
        let path = dir.join("ALL_human.json");
        fs::write(&path, serde_json::to_string(&items).unwrap()).unwrap();
        path
    }

    #[test]
    fn splits_into_fixed_size_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_array(dir.path(), 250);
        let paths = chunk_jobs(&input, dir.path(), "ALL_human", 100).unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths[2].ends_with("ALL_human_chunk_3.json"));

        let last: Vec<Value> =
            serde_json::from_str(&fs::read_to_string(&paths[2]).unwrap()).unwrap();
        assert_eq!(last.len(), 50);
        assert_eq!(last[0]["name"], 200);
    }

    #[test]
    fn exact_multiple_has_no_trailing_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_array(dir.path(), 200);
        let paths = chunk_jobs(&input, dir.path(), "x", 100).unwrap();
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn empty_array_writes_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_array(dir.path(), 0);
        let out = dir.path().join("chunks");
        let paths = chunk_jobs(&input, &out, "ALL_human", 100).unwrap();
        assert!(paths.is_empty());
        assert!(!chunk_path(&out, "ALL_human", 1).exists());
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn rejects_zero_size_and_non_array() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_array(dir.path(), 3);
        assert!(matches!(
            chunk_jobs(&input, dir.path(), "x", 0),
            Err(PlddtError::InvalidInput(_))
        ));

        let obj = dir.path().join("obj.json");
        fs::write(&obj, "{\"a\": 1}").unwrap();
        assert!(matches!(
            chunk_jobs(&obj, dir.path(), "x", 10),
            Err(PlddtError::Parse(_))
        ));
    }

    #[test]
    fn run_chunk_defaults_prefix_to_stem() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_array(dir.path(), 5);
        let config = ChunkConfig {
            input,
            out_dir: None,
            prefix: None,
            size: 2,
        };
        let paths = run_chunk(&config).unwrap();
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[0], dir.path().join("ALL_human_chunk_1.json"));
    }
}
