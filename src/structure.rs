//! Atom-site parsing for PDB and mmCIF coordinate files.
//!
//! Only the fields needed for confidence harvesting are kept: residue
//! identity, alternate location and the B-factor column, where structure
//! predictors store per-atom pLDDT.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use memmap2::MmapOptions;

use crate::error::{PlddtError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Atom,
    Hetatm,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AtomSite {
    pub model: u32,
    pub kind: RecordKind,
    pub atom_name: String,
    pub alt_loc: Option<char>,
    pub res_name: String,
    /// Author chain id (`auth_asym_id`, or PDB column 22).
    pub chain: String,
    /// Label chain id; equals `chain` for PDB input.
    pub label_asym: String,
    /// Author residue number.
    pub res_seq: i32,
    /// `label_seq_id`; [`LabelSeq::Unknown`] for PDB input.
    pub label_seq: LabelSeq,
    pub ins_code: Option<char>,
    /// 1.0 when the column is absent.
    pub occupancy: f64,
    pub b_factor: f64,
}

/// An mmCIF `label_seq_id` value, keeping the two CIF null markers apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelSeq {
    Number(i32),
    /// `.`, written for non-polymer rows such as ligands, ions and water.
    Inapplicable,
    /// `?`, a missing column, or a value that is not an integer.
    Unknown,
}

impl LabelSeq {
    fn from_token(token: Option<&str>) -> Self {
        match token {
            Some(".") => LabelSeq::Inapplicable,
            Some(v) => v.parse().map_or(LabelSeq::Unknown, LabelSeq::Number),
            None => LabelSeq::Unknown,
        }
    }

    pub fn number(self) -> Option<i32> {
        match self {
            LabelSeq::Number(n) => Some(n),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StructureFormat {
    Pdb,
    Mmcif,
}

impl StructureFormat {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if ext == "cif" || ext == "mmcif" {
            StructureFormat::Mmcif
        } else {
            StructureFormat::Pdb
        }
    }
}

pub fn parse_structure(path: &Path, use_mmap: bool) -> Result<Vec<AtomSite>> {
    let format = StructureFormat::from_path(path);
    if use_mmap {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and dropped before returning.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        return match format {
            StructureFormat::Mmcif => {
                let text = std::str::from_utf8(&mmap)
                    .map_err(|e| PlddtError::Parse(format!("mmCIF is not UTF-8: {e}")))?;
                parse_mmcif_str(text)
            }
            StructureFormat::Pdb => parse_pdb_bytes(&mmap),
        };
    }

    let mut reader = BufReader::new(File::open(path)?);
    match format {
        StructureFormat::Mmcif => parse_mmcif(&mut reader),
        StructureFormat::Pdb => parse_pdb(&mut reader),
    }
}

fn field(line: &[u8], start: usize, end: usize) -> &str {
    if start >= line.len() {
        return "";
    }
    let end = end.min(line.len());
    std::str::from_utf8(&line[start..end]).unwrap_or("")
}

fn blank_to_none(c: u8) -> Option<char> {
    if c == b' ' { None } else { Some(c as char) }
}

/// Tracks `MODEL`/`ENDMDL` records while scanning lines.
struct PdbScan {
    model: u32,
    seen_model: bool,
    atoms: Vec<AtomSite>,
}

impl PdbScan {
    fn new() -> Self {
        PdbScan {
            model: 1,
            seen_model: false,
            atoms: Vec::new(),
        }
    }

    fn line(&mut self, line: &[u8]) -> Result<()> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.len() < 6 {
            return Ok(());
        }

        let record = &line[..6];
        if record == b"MODEL " {
            let n = field(line, 10, 14).trim().parse::<u32>();
            self.model = match n {
                Ok(n) => n,
                Err(_) if self.seen_model => self.model + 1,
                Err(_) => 1,
            };
            self.seen_model = true;
            return Ok(());
        }

        let kind = match record {
            b"ATOM  " => RecordKind::Atom,
            b"HETATM" => RecordKind::Hetatm,
            _ => return Ok(()),
        };
        if line.len() < 54 {
            return Ok(());
        }

        let res_seq = field(line, 22, 26).trim().parse::<i32>().map_err(|e| {
            PlddtError::Parse(format!("bad residue number {:?}: {e}", field(line, 22, 26)))
        })?;
        let chain = field(line, 21, 22).trim().to_string();
        let occupancy = field(line, 54, 60).trim().parse::<f64>().unwrap_or(1.0);
        let b_factor = field(line, 60, 66).trim().parse::<f64>().unwrap_or(0.0);

        self.atoms.push(AtomSite {
            model: self.model,
            kind,
            atom_name: field(line, 12, 16).trim().to_string(),
            alt_loc: blank_to_none(line[16]),
            res_name: field(line, 17, 20).trim().to_ascii_uppercase(),
            label_asym: chain.clone(),
            chain,
            res_seq,
            label_seq: LabelSeq::Unknown,
            ins_code: line.get(26).copied().and_then(blank_to_none),
            occupancy,
            b_factor,
        });
        Ok(())
    }
}

pub fn parse_pdb<R: BufRead>(reader: &mut R) -> Result<Vec<AtomSite>> {
    let mut scan = PdbScan::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        let bytes_read = reader.read_until(b'\n', &mut line)?;
        if bytes_read == 0 {
            break;
        }
        let trimmed = line.strip_suffix(b"\n").unwrap_or(&line[..]);
        scan.line(trimmed)?;
    }
    Ok(scan.atoms)
}

pub fn parse_pdb_bytes(bytes: &[u8]) -> Result<Vec<AtomSite>> {
    let mut scan = PdbScan::new();
    for line in bytes.split(|&b| b == b'\n') {
        scan.line(line)?;
    }
    Ok(scan.atoms)
}

pub fn parse_mmcif<R: Read>(reader: &mut R) -> Result<Vec<AtomSite>> {
    let mut input = String::new();
    reader.read_to_string(&mut input)?;
    parse_mmcif_str(&input)
}

fn is_null(value: &str) -> bool {
    value == "." || value == "?"
}

fn starts_new_section(token: &str) -> bool {
    token == "loop_"
        || token.starts_with('_')
        || token.starts_with("data_")
        || token.starts_with("save_")
        || token == "stop_"
}

/// Column positions within the `_atom_site` loop.
struct AtomSiteColumns {
    count: usize,
    group: Option<usize>,
    atom: Option<usize>,
    alt: Option<usize>,
    comp: usize,
    label_asym: usize,
    auth_asym: Option<usize>,
    label_seq: Option<usize>,
    auth_seq: Option<usize>,
    ins_code: Option<usize>,
    model: Option<usize>,
    occupancy: Option<usize>,
    b_iso: usize,
}

impl AtomSiteColumns {
    fn locate(cols: &[&str]) -> Result<Self> {
        let find = |name: &str| {
            cols.iter()
                .position(|c| c.strip_prefix("_atom_site.") == Some(name))
        };
        let require = |name: &str| {
            find(name).ok_or_else(|| {
                PlddtError::Parse(format!("mmCIF _atom_site loop has no {name} column"))
            })
        };
        Ok(AtomSiteColumns {
            count: cols.len(),
            group: find("group_PDB"),
            atom: find("label_atom_id").or_else(|| find("auth_atom_id")),
            alt: find("label_alt_id"),
            comp: require("label_comp_id")?,
            label_asym: require("label_asym_id")?,
            auth_asym: find("auth_asym_id"),
            label_seq: find("label_seq_id"),
            auth_seq: find("auth_seq_id"),
            ins_code: find("pdbx_PDB_ins_code"),
            model: find("pdbx_PDB_model_num"),
            occupancy: find("occupancy"),
            b_iso: require("B_iso_or_equiv")?,
        })
    }

    fn row(&self, row: &[&str]) -> Result<AtomSite> {
        let opt = |idx: Option<usize>| idx.map(|k| row[k]).filter(|v| !is_null(v));
        let first_char = |idx: Option<usize>| opt(idx).and_then(|v| v.chars().next());

        let kind = match opt(self.group) {
            Some("HETATM") => RecordKind::Hetatm,
            _ => RecordKind::Atom,
        };
        let label_asym = row[self.label_asym].to_string();
        let label_seq = LabelSeq::from_token(self.label_seq.map(|k| row[k]));
        let res_seq = match opt(self.auth_seq).and_then(|v| v.parse::<i32>().ok()) {
            Some(n) => n,
            None => match label_seq {
                LabelSeq::Number(n) => n,
                LabelSeq::Inapplicable => 0,
                LabelSeq::Unknown => {
                    return Err(PlddtError::Parse(format!(
                        "atom_site row without residue number in chain {label_asym}"
                    )));
                }
            },
        };
        let b_raw = row[self.b_iso];
        let b_factor = b_raw
            .parse::<f64>()
            .map_err(|e| PlddtError::Parse(format!("bad B_iso_or_equiv {b_raw:?}: {e}")))?;

        Ok(AtomSite {
            model: opt(self.model)
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(1),
            kind,
            atom_name: opt(self.atom).unwrap_or("").to_string(),
            alt_loc: first_char(self.alt),
            res_name: row[self.comp].to_ascii_uppercase(),
            chain: opt(self.auth_asym).unwrap_or(label_asym.as_str()).to_string(),
            label_asym,
            res_seq,
            label_seq,
            ins_code: first_char(self.ins_code),
            occupancy: opt(self.occupancy)
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(1.0),
            b_factor,
        })
    }
}

pub fn parse_mmcif_str(input: &str) -> Result<Vec<AtomSite>> {
    let tokens = tokenize_cif(input);
    let mut idx = 0;
    while idx < tokens.len() {
        if tokens[idx] != "loop_" {
            idx += 1;
            continue;
        }
        idx += 1;
        let start = idx;
        while idx < tokens.len() && tokens[idx].starts_with('_') {
            idx += 1;
        }
        let cols = &tokens[start..idx];
        if !cols.iter().any(|c| c.starts_with("_atom_site.")) {
            continue;
        }

        let columns = AtomSiteColumns::locate(cols)?;
        let mut atoms = Vec::new();
        while idx + columns.count <= tokens.len() && !starts_new_section(tokens[idx]) {
            let row = &tokens[idx..idx + columns.count];
            atoms.push(columns.row(row)?);
            idx += columns.count;
        }
        return Ok(atoms);
    }

    Err(PlddtError::Parse("no _atom_site loop found".into()))
}

/// Splits CIF text into value tokens, dropping comments and quotes.
pub fn tokenize_cif(input: &str) -> Vec<&str> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut at_line_start = true;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            if c == b'\n' {
                at_line_start = true;
            }
            i += 1;
            continue;
        }

        if c == b'#' {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        if c == b';' && at_line_start {
            let start = i + 1;
            let mut j = start;
            let mut end = None;
            while j < bytes.len() {
                if bytes[j] == b'\n' && bytes.get(j + 1) == Some(&b';') {
                    end = Some(j);
                    break;
                }
                j += 1;
            }
            if let Some(end_pos) = end {
                tokens.push(input[start..end_pos].trim_end_matches('\r'));
                i = end_pos + 2;
                at_line_start = false;
                continue;
            }
        }

        // A closing quote only counts when followed by whitespace.
        if c == b'\'' || c == b'"' {
            let start = i + 1;
            let mut j = start;
            while j < bytes.len() {
                if bytes[j] == c
                    && bytes.get(j + 1).is_none_or(|b| b.is_ascii_whitespace())
                {
                    break;
                }
                j += 1;
            }
            tokens.push(&input[start..j.min(bytes.len())]);
            i = j + 1;
            at_line_start = false;
            continue;
        }

        let start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        tokens.push(&input[start..i]);
        at_line_start = false;
    }

    tokens
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    pub(crate) const CIF: &str = "\
data_test
#
_entry.id test
loop_
_atom_site.group_PDB
_atom_site.id
_atom_site.type_symbol
_atom_site.label_atom_id
_atom_site.label_alt_id
_atom_site.label_comp_id
_atom_site.label_asym_id
_atom_site.label_seq_id
_atom_site.Cartn_x
_atom_site.Cartn_y
_atom_site.Cartn_z
_atom_site.B_iso_or_equiv
_atom_site.auth_seq_id
_atom_site.auth_asym_id
_atom_site.pdbx_PDB_model_num
ATOM   1 N N   . MET A 1 0.0 0.0 0.0 80.00 1 A 1
ATOM   2 C CA  . MET A 1 1.0 0.0 0.0 90.00 1 A 1
ATOM   3 N N   . LYS A 2 2.0 0.0 0.0 40.00 2 A 1
HETATM 4 O O   . HOH B . 3.0 0.0 0.0 10.00 101 B 1
#
";

    #[test]
    fn tokenizer_handles_quotes_and_text_fields() {
        let text = "_a 'it''s ok' \"x y\"\n;multi\nline\n;\nend # comment\n";
        let tokens = tokenize_cif(text);
        assert_eq!(tokens, vec!["_a", "it''s ok", "x y", "multi\nline", "end"]);
    }

    #[test]
    fn parse_mmcif_atom_site_loop() {
        let atoms = parse_mmcif_str(CIF).unwrap();
        assert_eq!(atoms.len(), 4);
        assert_eq!(atoms[0].res_name, "MET");
        assert_eq!(atoms[1].b_factor, 90.0);
        assert_eq!(atoms[2].label_seq, LabelSeq::Number(2));
        assert_eq!(atoms[3].kind, RecordKind::Hetatm);
        assert_eq!(atoms[3].label_seq, LabelSeq::Inapplicable);
        assert_eq!(atoms[3].occupancy, 1.0);
        assert_eq!(atoms[3].res_seq, 101);
        assert_eq!(atoms[3].chain, "B");
    }

    #[test]
    fn label_seq_keeps_null_kinds_apart() {
        assert_eq!(LabelSeq::from_token(Some("12")), LabelSeq::Number(12));
        assert_eq!(LabelSeq::from_token(Some(".")), LabelSeq::Inapplicable);
        assert_eq!(LabelSeq::from_token(Some("?")), LabelSeq::Unknown);
        assert_eq!(LabelSeq::from_token(Some("1A")), LabelSeq::Unknown);
        assert_eq!(LabelSeq::from_token(None), LabelSeq::Unknown);
    }

    #[test]
    fn parse_mmcif_requires_b_factor_column() {
        let cif = "data_x\nloop_\n_atom_site.label_comp_id\n_atom_site.label_asym_id\nALA A\n";
        assert!(matches!(parse_mmcif_str(cif), Err(PlddtError::Parse(_))));
        assert!(matches!(parse_mmcif_str("data_x\n_entry.id x\n"), Err(PlddtError::Parse(_))));
    }

    #[test]
    fn parse_pdb_models_and_hetatm() {
        let pdb = b"\
MODEL        1
ATOM      1  N   ALA A   1      11.104  13.207   2.100  1.00 70.00           N
ATOM      2  CA AALA A   1      11.504  13.607   2.500  0.50 80.00           C
HETATM    3  O   HOH A 101      11.904  14.007   2.900  1.00 20.00           O
ENDMDL
MODEL        2
ATOM      4  N   GLY B   5A     12.304  14.407   3.300  1.00 60.00           N
ENDMDL
END
";
        let mut reader = Cursor::new(pdb.as_ref());
        let atoms = parse_pdb(&mut reader).unwrap();
        assert_eq!(atoms.len(), 4);
        assert_eq!(atoms[1].alt_loc, Some('A'));
        assert_eq!(atoms[1].atom_name, "CA");
        assert_eq!(atoms[1].occupancy, 0.5);
        assert_eq!(atoms[2].kind, RecordKind::Hetatm);
        assert_eq!(atoms[3].model, 2);
        assert_eq!(atoms[3].ins_code, Some('A'));
        assert_eq!(atoms[3].b_factor, 60.0);

        assert_eq!(parse_pdb_bytes(pdb).unwrap(), atoms);
    }

    #[test]
    fn parse_pdb_skips_short_lines_and_rejects_bad_resseq() {
        let short = b"ATOM      1  N   ALA A   1      11.104\n";
        assert!(parse_pdb_bytes(short).unwrap().is_empty());

        let bad =
            b"ATOM      1  N   ALA A   X      11.104  13.207   2.100  1.00 70.00           N\n";
        assert!(matches!(parse_pdb_bytes(bad), Err(PlddtError::Parse(_))));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(StructureFormat::from_path(Path::new("a/b.CIF")), StructureFormat::Mmcif);
        assert_eq!(StructureFormat::from_path(Path::new("a/b.pdb")), StructureFormat::Pdb);
        assert_eq!(StructureFormat::from_path(Path::new("a/b")), StructureFormat::Pdb);
    }
}
