use std::fs;
use std::path::Path;
use std::process::Command;

fn plddt() -> Command {
    Command::new(env!("CARGO_BIN_EXE_plddt"))
}

fn write_cif(path: &Path, values: &[f64]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut cif = String::from(
        "data_model\n#\nloop_\n\
_atom_site.group_PDB\n\
_atom_site.id\n\
_atom_site.label_atom_id\n\
_atom_site.label_comp_id\n\
_atom_site.label_asym_id\n\
_atom_site.label_seq_id\n\
_atom_site.auth_seq_id\n\
_atom_site.B_iso_or_equiv\n",
    );
    for (i, b) in values.iter().enumerate() {
        cif.push_str(&format!("ATOM {} CA ALA A {} {} {:.2}\n", i + 1, i + 1, i + 1, b));
    }
    cif.push_str("#\n");
    fs::write(path, cif).unwrap();
}

#[test]
fn fasta2json_and_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let fasta = dir.path().join("human.fasta");
    let mut text = String::new();
    for i in 0..5 {
        text.push_str(&format!(">sp|P{i:05}|PROT{i}_HUMAN desc\nMKV\nLLA\n"));
    }
    fs::write(&fasta, text).unwrap();
    let json = dir.path().join("ALL_human.json");

    let status = plddt()
        .arg("fasta2json")
        .arg(&fasta)
        .arg(&json)
        .status()
        .expect("failed to run plddt");
    assert!(status.success());

    let jobs: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(jobs.as_array().unwrap().len(), 5);
    assert_eq!(jobs[0]["name"], "P00000");
    assert_eq!(jobs[0]["sequences"][0]["proteinChain"]["sequence"], "MKVLLA");

    let status = plddt()
        .args(["chunk", "--size", "2"])
        .arg(&json)
        .status()
        .expect("failed to run plddt");
    assert!(status.success());
    assert!(dir.path().join("ALL_human_chunk_3.json").exists());
    assert!(!dir.path().join("ALL_human_chunk_4.json").exists());
}

#[test]
fn harvest_writes_tsv() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("run");
    write_cif(&root.join("x/seed_1/predictions/GENE_A.cif"), &[95.0, 85.0, 20.0]);
    let prefix = dir.path().join("harvest");

    let status = plddt()
        .args(["-q", "harvest", "-d"])
        .arg(&root)
        .arg("-o")
        .arg(&prefix)
        .status()
        .expect("failed to run plddt");
    assert!(status.success());

    let tsv = fs::read_to_string(dir.path().join("harvest.tsv")).unwrap();
    let row: Vec<&str> = tsv.lines().nth(1).unwrap().split('\t').collect();
    assert_eq!(row[0], "GENE_A");
    assert_eq!(row[1], "3");
    assert_eq!(row[2], "[95.0, 85.0, 20.0]");
    assert_eq!(row[3], "66.66666666666667");
    assert_eq!(row[11], "1");
    assert_eq!(row[14], "1");
    assert_eq!(row[15], "AAA");
}

#[test]
fn gather_merges_split_dataset() {
    let base = tempfile::tempdir().unwrap();
    let pred = |dataset: &str, all_one: &str, protein: &str| {
        base.path()
            .join(dataset)
            .join(all_one)
            .join(protein)
            .join("seed_101/predictions/model.cif")
    };
    write_cif(&pred("human", "human_all_one", "P1"), &[80.0, 60.0]);
    write_cif(&pred("fly_split", "fly_all_one", "F1_A"), &[10.0, 20.0, 30.0, 40.0]);
    write_cif(&pred("fly_split", "fly_all_one", "F1_B"), &[35.0, 50.0, 60.0]);

    let out = base.path().join("plddt_all_values.csv");
    let status = plddt()
        .args(["gather", "--overlap", "2", "-j", "2", "-o"])
        .arg(&out)
        .env("PLDDT_BASE_DIR", base.path())
        .status()
        .expect("failed to run plddt");
    assert!(status.success());

    let csv = fs::read_to_string(&out).unwrap();
    assert_eq!(
        csv,
        "Species,Protein_ID,Mean_pLDDT\nfly_split,F1,35.0\nhuman,P1,70.0\n"
    );

    let status = plddt()
        .arg("profile")
        .arg(&out)
        .arg("-o")
        .arg(base.path().join("prof"))
        .status()
        .expect("failed to run plddt");
    assert!(status.success());
    assert!(base.path().join("prof_hist.tsv").exists());
    assert!(base.path().join("prof_kde_shared.tsv").exists());
}

#[test]
fn missing_input_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let status = plddt()
        .args(["-q", "fasta2json"])
        .arg(dir.path().join("absent.fasta"))
        .arg(dir.path().join("out.json"))
        .status()
        .expect("failed to run plddt");
    assert!(!status.success());
}
