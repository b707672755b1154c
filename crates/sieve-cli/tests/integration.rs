use sieve_cli::export::context::{ExportContext, NoAnnotations};
use sieve_cli::export::progress::WaitingHandler;
use sieve_cli::export::{ExportOutcome, ExportWriter, ReportSection, Settings};
use sieve_core::identification::{
    IdentificationStore, Identifications, MatchLevel, MemoryStore, PeptideMatch, ProteinMatch,
    SpectrumMatch,
};
use sieve_core::snapshot::{Overrides, ValidationSnapshot, Validator};
use sieve_core::Error;
use std::borrow::Cow;
use std::sync::atomic::{AtomicUsize, Ordering};

fn psm(key: &str, peptide: &str, score: f64, decoy: bool) -> SpectrumMatch {
    SpectrumMatch {
        key: key.into(),
        spectrum_file: "run.mzML".into(),
        spectrum_title: format!("{}.scan", key),
        peptide: peptide.into(),
        charge: 2,
        precursor_mz: 500.25,
        retention_time: 12.5,
        mass_error_ppm: 1.5,
        decoy,
        score,
        starred: false,
        hidden: false,
    }
}

fn peptide(key: &str, psms: Vec<String>) -> PeptideMatch {
    PeptideMatch {
        key: key.into(),
        sequence: "PEPTIDEK".into(),
        modifications: vec![],
        proteins: vec!["P1".into()],
        decoy: false,
        score: 1.0,
        psms,
        starred: false,
        hidden: false,
    }
}

fn protein(key: &str, peptides: Vec<String>) -> ProteinMatch {
    ProteinMatch {
        key: key.into(),
        accessions: vec![format!("{}_ACC", key)],
        main_accession: None,
        decoy: false,
        score: 1.0,
        peptides,
        inference: Default::default(),
        starred: false,
        hidden: false,
    }
}

/// `n` PSMs of a single peptide, the ones at `decoys` flagged as decoys
fn flat_store(n: usize, decoys: &[usize]) -> MemoryStore {
    let keys = (0..n).map(|ix| format!("s{}", ix)).collect::<Vec<_>>();
    let spectrum_matches = keys
        .iter()
        .enumerate()
        .map(|(ix, key)| psm(key, "pep", (n - ix) as f64, decoys.contains(&ix)))
        .collect();
    let ids = Identifications {
        proteins: vec![],
        peptides: vec![peptide("pep", keys)],
        spectrum_matches,
    };
    MemoryStore::new(ids).unwrap()
}

/// Five proteins, the last of which has three peptides
fn nested_store() -> MemoryStore {
    let mut proteins = Vec::new();
    let mut peptides = Vec::new();
    for ix in 1..=5 {
        let children = match ix {
            5 => vec!["e1", "e2", "e3"],
            _ => vec![],
        };
        for child in &children {
            peptides.push(peptide(child, vec![]));
        }
        proteins.push(protein(
            &format!("prot{}", ix),
            children.into_iter().map(String::from).collect(),
        ));
    }
    let ids = Identifications {
        proteins,
        peptides,
        spectrum_matches: vec![],
    };
    MemoryStore::new(ids).unwrap()
}

fn export(
    section: &ReportSection,
    store: &dyn IdentificationStore,
    snapshot: &ValidationSnapshot,
    settings: &Settings,
    progress: &dyn WaitingHandler,
) -> (ExportOutcome, Vec<String>) {
    let ctx = ExportContext {
        store,
        snapshot,
        annotations: &NoAnnotations,
        surrounding_aas: settings.surrounding_aas,
    };
    let mut writer = ExportWriter::new(vec![], settings.separator);
    let outcome = section
        .write(None, &ctx, settings, &mut writer, progress)
        .unwrap();
    let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
    (outcome, out.lines().map(String::from).collect())
}

const NONE: [&str; 0] = [];

#[test]
fn flat_report() {
    let store = flat_store(4, &[]);
    let section =
        ReportSection::new(&NONE, &NONE, &["spectrum_title", "score", "precursor"]).unwrap();
    let (outcome, lines) = export(
        &section,
        &store,
        &ValidationSnapshot::default(),
        &Settings::default(),
        &(),
    );

    assert_eq!(outcome, ExportOutcome::Completed { rows: 4 });
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "\tSpectrum Title\tPrecursor m/z\tRT\tScore");
    assert_eq!(lines[1], "1\ts0.scan\t500.25\t12.5\t4.0");
    for line in &lines {
        assert_eq!(line.split('\t').count(), 5);
    }
    assert!(lines[4].starts_with("4\t"));

    let settings = Settings {
        indexes: false,
        header: false,
        ..Default::default()
    };
    let (_, lines) = export(&section, &store, &ValidationSnapshot::default(), &settings, &());
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[3], "s3.scan\t500.25\t12.5\t1.0");
    for line in &lines {
        assert_eq!(line.split('\t').count(), 4);
    }
}

#[test]
fn nested_indexes() {
    let store = nested_store();
    let section = ReportSection::new(&["accession"], &["sequence"], &NONE).unwrap();
    let (outcome, lines) = export(
        &section,
        &store,
        &ValidationSnapshot::default(),
        &Settings::default(),
        &(),
    );

    assert_eq!(outcome, ExportOutcome::Completed { rows: 8 });
    let indexes = lines[1..]
        .iter()
        .map(|line| line.split('\t').next().unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(indexes, vec!["1", "2", "3", "4", "5", "5.1", "5.2", "5.3"]);
    assert_eq!(lines[5], "5\tprot5_ACC");
    assert_eq!(lines[6], "5.1\tPEPTIDEK");
}

#[test]
fn header_only_at_top_level() {
    let store = nested_store();
    let section = ReportSection::new(&["accession"], &["sequence"], &NONE).unwrap();
    let (_, lines) = export(
        &section,
        &store,
        &ValidationSnapshot::default(),
        &Settings::default(),
        &(),
    );
    assert_eq!(lines[0], "\tMain Accession");
    assert_eq!(lines.iter().filter(|l| l.starts_with('\t')).count(), 1);

    let settings = Settings {
        header: false,
        indexes: false,
        ..Default::default()
    };
    let (_, lines) = export(&section, &store, &ValidationSnapshot::default(), &settings, &());
    assert_eq!(lines.len(), 8);
    assert_eq!(lines[0], "prot1_ACC");
    assert_eq!(lines[7], "PEPTIDEK");
}

/// Cancels once `limit` entities were started
struct CancelAfter {
    limit: usize,
    count: AtomicUsize,
}

impl WaitingHandler for CancelAfter {
    fn increment(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn is_canceled(&self) -> bool {
        self.count.load(Ordering::Relaxed) >= self.limit
    }
}

#[test]
fn cancellation() {
    let store = flat_store(1000, &[]);
    let section = ReportSection::new(&NONE, &NONE, &["spectrum_title"]).unwrap();
    let progress = CancelAfter {
        limit: 137,
        count: AtomicUsize::new(0),
    };
    let (outcome, lines) = export(
        &section,
        &store,
        &ValidationSnapshot::default(),
        &Settings::default(),
        &progress,
    );

    assert_eq!(outcome, ExportOutcome::Canceled { rows: 137 });
    assert_eq!(lines.len(), 138);
    assert_eq!(lines[137], "137\ts136.scan");
}

#[test]
fn unknown_feature() {
    let store = flat_store(2, &[]);
    let section = ReportSection::new(&NONE, &NONE, &["spectrum_title", "rainbow"]).unwrap();
    let (_, lines) = export(
        &section,
        &store,
        &ValidationSnapshot::default(),
        &Settings::default(),
        &(),
    );
    assert_eq!(lines[0], "\tSpectrum Title\trainbow");
    assert_eq!(lines[1], "1\ts0.scan\tNot implemented");
    assert_eq!(lines[2], "2\ts1.scan\tNot implemented");
}

#[test]
fn decoys_and_validation_filters() {
    let store = flat_store(5, &[1, 3]);
    let section = ReportSection::new(&NONE, &NONE, &["spectrum_title", "decoy"]).unwrap();
    let empty = ValidationSnapshot::default();

    let (outcome, lines) = export(&section, &store, &empty, &Settings::default(), &());
    assert_eq!(outcome.rows(), 3);
    // Filtered rows do not consume an index
    assert_eq!(lines[1..], ["1\ts0.scan\t0", "2\ts2.scan\t0", "3\ts4.scan\t0"]);

    let settings = Settings {
        include_decoys: true,
        ..Default::default()
    };
    let (outcome, lines) = export(&section, &store, &empty, &settings, &());
    assert_eq!(outcome.rows(), 5);
    assert_eq!(lines[2], "2\ts1.scan\t1");

    // Nothing is validated before validation ran
    let settings = Settings {
        validated_only: true,
        ..Default::default()
    };
    let (outcome, _) = export(&section, &store, &empty, &settings, &());
    assert_eq!(outcome.rows(), 0);

    let store = flat_store(5, &[]);
    let snapshot = Validator::default()
        .validate(&store, &Overrides::default())
        .unwrap();
    let (outcome, _) = export(&section, &store, &snapshot, &settings, &());
    assert_eq!(outcome.rows(), 5);
}

#[test]
fn bridged_protein_psm_report() {
    let ids = Identifications {
        proteins: vec![protein("prot1", vec!["pep".into()])],
        peptides: vec![peptide("pep", vec!["s0".into(), "s1".into()])],
        spectrum_matches: vec![psm("s0", "pep", 2.0, false), psm("s1", "pep", 1.0, false)],
    };
    let store = MemoryStore::new(ids).unwrap();
    let section = ReportSection::new(&["accession"], &NONE, &["spectrum_title"]).unwrap();
    let (outcome, lines) = export(
        &section,
        &store,
        &ValidationSnapshot::default(),
        &Settings::default(),
        &(),
    );
    assert_eq!(outcome.rows(), 4);
    assert_eq!(
        lines,
        vec![
            "\tMain Accession",
            "1\tprot1_ACC",
            "1.1",
            "1.1.1\ts0.scan",
            "1.1.2\ts1.scan",
        ]
    );
}

#[test]
fn bridged_report_without_indexes() {
    let ids = Identifications {
        proteins: vec![protein("prot1", vec!["pep".into()])],
        peptides: vec![peptide("pep", vec!["s0".into(), "s1".into()])],
        spectrum_matches: vec![psm("s0", "pep", 2.0, false), psm("s1", "pep", 1.0, false)],
    };
    let store = MemoryStore::new(ids).unwrap();
    let section = ReportSection::new(&["accession"], &NONE, &["spectrum_title"]).unwrap();
    let settings = Settings {
        indexes: false,
        header: false,
        ..Default::default()
    };
    let (outcome, lines) = export(
        &section,
        &store,
        &ValidationSnapshot::default(),
        &settings,
        &(),
    );
    assert_eq!(outcome, ExportOutcome::Completed { rows: 3 });
    assert_eq!(lines, vec!["prot1_ACC", "s0.scan", "s1.scan"]);
}

/// Fails to read the spectrum match `broken`
struct BrokenStore {
    inner: MemoryStore,
    broken: String,
}

impl IdentificationStore for BrokenStore {
    fn keys(&self, level: MatchLevel) -> Result<Vec<String>, Error> {
        self.inner.keys(level)
    }

    fn protein(&self, key: &str) -> Result<Cow<'_, ProteinMatch>, Error> {
        self.inner.protein(key)
    }

    fn peptide(&self, key: &str) -> Result<Cow<'_, PeptideMatch>, Error> {
        self.inner.peptide(key)
    }

    fn spectrum_match(&self, key: &str) -> Result<Cow<'_, SpectrumMatch>, Error> {
        if key == self.broken {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "unreadable match",
            )));
        }
        self.inner.spectrum_match(key)
    }
}

#[test]
fn store_failure_keeps_written_rows() {
    let store = BrokenStore {
        inner: flat_store(10, &[]),
        broken: "s3".into(),
    };
    let section = ReportSection::new(&NONE, &NONE, &["spectrum_title"]).unwrap();
    let snapshot = ValidationSnapshot::default();
    let settings = Settings::default();
    let ctx = ExportContext {
        store: &store,
        snapshot: &snapshot,
        annotations: &NoAnnotations,
        surrounding_aas: settings.surrounding_aas,
    };
    let mut writer = ExportWriter::new(vec![], settings.separator);
    let result = section.write(None, &ctx, &settings, &mut writer, &());
    assert!(result.is_err());
    assert_eq!(writer.rows(), 3);

    let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
    assert_eq!(
        out.lines().collect::<Vec<_>>(),
        vec!["\tSpectrum Title", "1\ts0.scan", "2\ts1.scan", "3\ts2.scan"]
    );
}

#[test]
fn run_project() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path();

    let ids = Identifications {
        proteins: vec![protein("prot1", vec!["pep".into()])],
        peptides: vec![peptide("pep", vec!["s0".into(), "s1".into(), "s2".into()])],
        spectrum_matches: vec![
            psm("s0", "pep", 3.0, false),
            psm("s1", "pep", 2.0, true),
            psm("s2", "pep", 1.0, false),
        ],
    };
    let ids_path = dir.join("identifications.json");
    std::fs::write(&ids_path, serde_json::to_vec(&ids)?)?;

    let config = serde_json::json!({
        "identifications": ids_path,
        "output_directory": dir,
        "manual_validation": [{"level": "psm", "key": "s2", "validation": "doubtful"}],
    });
    let input: sieve_cli::input::Input = serde_json::from_value(config)?;
    let search = sieve_cli::runner::Runner::new(input.build()?)?.run()?;

    let names = search
        .output_paths
        .iter()
        .filter_map(|p| std::path::Path::new(p).file_name())
        .filter_map(|p| p.to_str())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            "proteins.tsv",
            "peptides.tsv",
            "psms.tsv",
            "validation.tsv",
            "results.json"
        ]
    );

    let psms = std::fs::read_to_string(dir.join("psms.tsv"))?;
    let lines = psms.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 3);
    assert!(lines[2].starts_with("2\t"));
    assert!(lines[2].ends_with("\tDoubtful"));

    let validation = std::fs::read_to_string(dir.join("validation.tsv"))?;
    assert!(validation.starts_with("\tParameter\tValue\n"));
    assert!(validation.contains("Charge 2 PSMs FDR Limit"));
    Ok(())
}
