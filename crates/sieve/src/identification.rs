//! Protein, peptide and spectrum identifications, and the key-addressed
//! interface used to read them.
//!
//! Matches are produced upstream (search engine, protein inference) and are
//! treated as immutable here. Validation only ever *reads* them through
//! [`IdentificationStore`], so a paginated, disk-backed store can be swapped in
//! for the [`MemoryStore`] used by the command line tool.

use crate::Error;
use fnv::FnvHashMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::Write;
use std::path::Path;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchLevel {
    Protein,
    Peptide,
    Psm,
}

impl MatchLevel {
    /// Next level down the protein -> peptide -> PSM hierarchy
    pub fn child(self) -> Option<MatchLevel> {
        match self {
            MatchLevel::Protein => Some(MatchLevel::Peptide),
            MatchLevel::Peptide => Some(MatchLevel::Psm),
            MatchLevel::Psm => None,
        }
    }
}

impl std::fmt::Display for MatchLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchLevel::Protein => f.write_str("protein"),
            MatchLevel::Peptide => f.write_str("peptide"),
            MatchLevel::Psm => f.write_str("PSM"),
        }
    }
}

/// Protein inference class of a protein group
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProteinInference {
    Single,
    Related,
    RelatedAndUnrelated,
    Unrelated,
}

impl Default for ProteinInference {
    fn default() -> Self {
        Self::Single
    }
}

impl std::fmt::Display for ProteinInference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProteinInference::Single => f.write_str("Single Protein"),
            ProteinInference::Related => f.write_str("Related Proteins"),
            ProteinInference::RelatedAndUnrelated => {
                f.write_str("Related and Unrelated Proteins")
            }
            ProteinInference::Unrelated => f.write_str("Unrelated Proteins"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    pub name: String,
    /// 1-based residue position, 0 for the N-terminus
    pub position: usize,
    pub mass: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProteinMatch {
    pub key: String,
    /// Accessions of every protein in the group
    pub accessions: Vec<String>,
    #[serde(default)]
    pub main_accession: Option<String>,
    #[serde(default)]
    pub decoy: bool,
    /// Higher is more confident
    pub score: f64,
    /// Keys of the peptide matches supporting this group
    #[serde(default)]
    pub peptides: Vec<String>,
    #[serde(default)]
    pub inference: ProteinInference,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub hidden: bool,
}

impl ProteinMatch {
    /// Representative accession of the group
    pub fn main_accession(&self) -> &str {
        self.main_accession
            .as_deref()
            .or_else(|| self.accessions.first().map(String::as_str))
            .unwrap_or(&self.key)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeptideMatch {
    pub key: String,
    pub sequence: String,
    #[serde(default)]
    pub modifications: Vec<Modification>,
    /// Accessions of every protein this sequence maps to
    #[serde(default)]
    pub proteins: Vec<String>,
    #[serde(default)]
    pub decoy: bool,
    pub score: f64,
    /// Keys of the spectrum matches supporting this peptide
    #[serde(default)]
    pub psms: Vec<String>,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub hidden: bool,
}

impl PeptideMatch {
    /// Sorted, deduplicated names of the variable modifications carried
    pub fn variable_modifications(&self) -> Vec<&str> {
        self.modifications
            .iter()
            .map(|m| m.name.as_str())
            .sorted()
            .dedup()
            .collect()
    }

    /// Name of the peptide validation bucket: peptides carrying the same set
    /// of modifications are validated together
    pub fn modification_profile(&self) -> String {
        match self.modifications.is_empty() {
            true => "Unmodified".into(),
            false => self.variable_modifications().join(", "),
        }
    }

    /// Sequence with modification masses inlined, e.g. `[+42.0106]-PEM[+15.9949]K`
    pub fn modified_sequence(&self) -> String {
        let mut s = String::with_capacity(self.sequence.len() + 10 * self.modifications.len());
        let mass = |s: &mut String, m: f32| {
            if m.is_sign_positive() {
                let _ = write!(s, "[+{}]", m);
            } else {
                let _ = write!(s, "[{}]", m);
            }
        };
        for m in self.modifications.iter().filter(|m| m.position == 0) {
            mass(&mut s, m.mass);
            s.push('-');
        }
        for (ix, residue) in self.sequence.chars().enumerate() {
            s.push(residue);
            for m in self.modifications.iter().filter(|m| m.position == ix + 1) {
                mass(&mut s, m.mass);
            }
        }
        s
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpectrumMatch {
    pub key: String,
    pub spectrum_file: String,
    pub spectrum_title: String,
    /// Key of the matched peptide
    pub peptide: String,
    pub charge: u8,
    #[serde(default)]
    pub precursor_mz: f64,
    #[serde(default)]
    pub retention_time: f64,
    #[serde(default)]
    pub mass_error_ppm: f64,
    #[serde(default)]
    pub decoy: bool,
    pub score: f64,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub hidden: bool,
}

/// Read access to the identifications of a project.
///
/// Lookups are key-addressed and may block on I/O. Callers announce the keys
/// they are about to visit with [`IdentificationStore::load_matches`] so that
/// paginated implementations can fetch them in one batch.
pub trait IdentificationStore: Send + Sync {
    /// Keys of every match at `level`, in iteration order
    fn keys(&self, level: MatchLevel) -> Result<Vec<String>, Error>;

    /// Prefetch a batch of matches
    fn load_matches(&self, _level: MatchLevel, _keys: &[String]) -> Result<(), Error> {
        Ok(())
    }

    fn protein(&self, key: &str) -> Result<Cow<'_, ProteinMatch>, Error>;

    fn peptide(&self, key: &str) -> Result<Cow<'_, PeptideMatch>, Error>;

    fn spectrum_match(&self, key: &str) -> Result<Cow<'_, SpectrumMatch>, Error>;

    /// Keys of the children of match `key` at `level`: peptides of a protein,
    /// PSMs of a peptide
    fn child_keys(&self, level: MatchLevel, key: &str) -> Result<Vec<String>, Error> {
        match level {
            MatchLevel::Protein => Ok(self.protein(key)?.peptides.clone()),
            MatchLevel::Peptide => Ok(self.peptide(key)?.psms.clone()),
            MatchLevel::Psm => Ok(Vec::new()),
        }
    }
}

/// Serialized form of a project's identifications
#[derive(Default, Debug, Serialize, Deserialize)]
pub struct Identifications {
    #[serde(default)]
    pub proteins: Vec<ProteinMatch>,
    #[serde(default)]
    pub peptides: Vec<PeptideMatch>,
    #[serde(default)]
    pub spectrum_matches: Vec<SpectrumMatch>,
}

#[derive(Default)]
pub struct MemoryStore {
    proteins: Vec<ProteinMatch>,
    peptides: Vec<PeptideMatch>,
    psms: Vec<SpectrumMatch>,
    protein_ix: FnvHashMap<String, usize>,
    peptide_ix: FnvHashMap<String, usize>,
    psm_ix: FnvHashMap<String, usize>,
}

fn index<T>(
    items: &[T],
    level: MatchLevel,
    key: impl Fn(&T) -> &str,
) -> Result<FnvHashMap<String, usize>, Error> {
    let mut map = FnvHashMap::default();
    for (ix, item) in items.iter().enumerate() {
        if map.insert(key(item).to_string(), ix).is_some() {
            return Err(Error::DuplicateMatch {
                level,
                key: key(item).into(),
            });
        }
    }
    Ok(map)
}

impl MemoryStore {
    /// Index a set of identifications, checking that every key is unique and
    /// that every parent -> child reference resolves
    pub fn new(identifications: Identifications) -> Result<Self, Error> {
        let Identifications {
            proteins,
            peptides,
            spectrum_matches,
        } = identifications;

        let protein_ix = index(&proteins, MatchLevel::Protein, |p| p.key.as_str())?;
        let peptide_ix = index(&peptides, MatchLevel::Peptide, |p| p.key.as_str())?;
        let psm_ix = index(&spectrum_matches, MatchLevel::Psm, |p| p.key.as_str())?;

        for protein in &proteins {
            if let Some(missing) = protein.peptides.iter().find(|k| !peptide_ix.contains_key(*k)) {
                return Err(Error::InvalidReference {
                    level: MatchLevel::Protein,
                    key: protein.key.clone(),
                    reference: missing.clone(),
                });
            }
        }
        for peptide in &peptides {
            if let Some(missing) = peptide.psms.iter().find(|k| !psm_ix.contains_key(*k)) {
                return Err(Error::InvalidReference {
                    level: MatchLevel::Peptide,
                    key: peptide.key.clone(),
                    reference: missing.clone(),
                });
            }
        }
        for psm in &spectrum_matches {
            if !peptide_ix.contains_key(&psm.peptide) {
                return Err(Error::InvalidReference {
                    level: MatchLevel::Psm,
                    key: psm.key.clone(),
                    reference: psm.peptide.clone(),
                });
            }
        }

        log::info!(
            "indexed {} proteins, {} peptides, {} PSMs",
            proteins.len(),
            peptides.len(),
            spectrum_matches.len()
        );

        Ok(Self {
            proteins,
            peptides,
            psms: spectrum_matches,
            protein_ix,
            peptide_ix,
            psm_ix,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::new(crate::read_json(path)?)
    }

    fn missing(level: MatchLevel, key: &str) -> Error {
        Error::MissingMatch {
            level,
            key: key.into(),
        }
    }
}

impl IdentificationStore for MemoryStore {
    fn keys(&self, level: MatchLevel) -> Result<Vec<String>, Error> {
        Ok(match level {
            MatchLevel::Protein => self.proteins.iter().map(|p| p.key.clone()).collect(),
            MatchLevel::Peptide => self.peptides.iter().map(|p| p.key.clone()).collect(),
            MatchLevel::Psm => self.psms.iter().map(|p| p.key.clone()).collect(),
        })
    }

    fn protein(&self, key: &str) -> Result<Cow<'_, ProteinMatch>, Error> {
        self.protein_ix
            .get(key)
            .map(|&ix| Cow::Borrowed(&self.proteins[ix]))
            .ok_or_else(|| Self::missing(MatchLevel::Protein, key))
    }

    fn peptide(&self, key: &str) -> Result<Cow<'_, PeptideMatch>, Error> {
        self.peptide_ix
            .get(key)
            .map(|&ix| Cow::Borrowed(&self.peptides[ix]))
            .ok_or_else(|| Self::missing(MatchLevel::Peptide, key))
    }

    fn spectrum_match(&self, key: &str) -> Result<Cow<'_, SpectrumMatch>, Error> {
        self.psm_ix
            .get(key)
            .map(|&ix| Cow::Borrowed(&self.psms[ix]))
            .ok_or_else(|| Self::missing(MatchLevel::Psm, key))
    }
}
