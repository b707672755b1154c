//! Everything a feature resolver may look at besides the entity itself.

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use sieve_core::identification::{IdentificationStore, MatchLevel};
use sieve_core::mass;
use sieve_core::snapshot::{MatchParameters, ValidationSnapshot};
use sieve_core::Error;
use std::path::Path;

/// An annotation the provider has no value for
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Unavailable;

pub type Lookup<T> = Result<T, Unavailable>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoTerm {
    pub accession: String,
    pub description: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SpectrumCounting {
    Nsaf,
    Empai,
}

/// Protein and gene annotations, and statistics computed outside of this
/// crate. Every lookup may come back [`Unavailable`].
pub trait AnnotationProvider: Send + Sync {
    fn description(&self, _accession: &str) -> Lookup<String> {
        Err(Unavailable)
    }

    fn gene_name(&self, _accession: &str) -> Lookup<String> {
        Err(Unavailable)
    }

    fn ensembl_gene_id(&self, _gene_name: &str) -> Lookup<String> {
        Err(Unavailable)
    }

    fn chromosome(&self, _gene_name: &str) -> Lookup<String> {
        Err(Unavailable)
    }

    fn go_terms(&self, _accession: &str) -> Lookup<Vec<GoTerm>> {
        Err(Unavailable)
    }

    fn sequence(&self, _accession: &str) -> Lookup<String> {
        Err(Unavailable)
    }

    /// Molecular weight in kDa, derived from the sequence unless known
    fn molecular_weight(&self, accession: &str) -> Lookup<f64> {
        self.sequence(accession)
            .and_then(|seq| mass::molecular_weight(&seq).ok_or(Unavailable))
    }

    /// Fraction of the protein that can be observed at all, `[0, 1]`
    fn observable_coverage(&self, _protein_key: &str) -> Lookup<f64> {
        Err(Unavailable)
    }

    fn spectrum_counting(&self, _protein_key: &str, _method: SpectrumCounting) -> Lookup<f64> {
        Err(Unavailable)
    }

    fn confident_ptms(&self, _protein_key: &str) -> Lookup<String> {
        Err(Unavailable)
    }

    fn other_ptms(&self, _protein_key: &str) -> Lookup<String> {
        Err(Unavailable)
    }

    /// Like [`Self::confident_ptms`], restricted to phosphorylations
    fn confident_phosphosites(&self, _protein_key: &str) -> Lookup<String> {
        Err(Unavailable)
    }

    fn other_phosphosites(&self, _protein_key: &str) -> Lookup<String> {
        Err(Unavailable)
    }

    /// Number of supporting peptides not explained by the digestion enzyme
    fn non_enzymatic_peptides(&self, _protein_key: &str) -> Lookup<usize> {
        Err(Unavailable)
    }
}

/// Provider without any annotations
pub struct NoAnnotations;

impl AnnotationProvider for NoAnnotations {}

#[derive(Default, Debug, Serialize, Deserialize)]
pub struct ProteinAnnotation {
    pub description: Option<String>,
    pub gene_name: Option<String>,
    pub sequence: Option<String>,
    /// kDa
    pub molecular_weight: Option<f64>,
    #[serde(default)]
    pub go_terms: Vec<GoTerm>,
}

#[derive(Default, Debug, Serialize, Deserialize)]
pub struct GeneAnnotation {
    pub ensembl_id: Option<String>,
    pub chromosome: Option<String>,
}

#[derive(Default, Debug, Serialize, Deserialize)]
pub struct ProteinMatchAnnotation {
    pub observable_coverage: Option<f64>,
    pub nsaf: Option<f64>,
    pub empai: Option<f64>,
    pub confident_ptms: Option<String>,
    pub other_ptms: Option<String>,
    pub confident_phosphosites: Option<String>,
    pub other_phosphosites: Option<String>,
    pub non_enzymatic: Option<usize>,
}

/// Annotations read from a JSON file
#[derive(Default, Debug, Serialize, Deserialize)]
pub struct Annotations {
    /// By accession
    #[serde(default)]
    pub proteins: FnvHashMap<String, ProteinAnnotation>,
    /// By gene name
    #[serde(default)]
    pub genes: FnvHashMap<String, GeneAnnotation>,
    /// By protein match key
    #[serde(default)]
    pub protein_matches: FnvHashMap<String, ProteinMatchAnnotation>,
}

impl Annotations {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let annotations: Annotations = sieve_core::read_json(path)?;
        log::info!(
            "loaded annotations for {} proteins, {} genes",
            annotations.proteins.len(),
            annotations.genes.len()
        );
        Ok(annotations)
    }

    fn protein<T>(
        &self,
        accession: &str,
        f: impl Fn(&ProteinAnnotation) -> Option<T>,
    ) -> Lookup<T> {
        self.proteins.get(accession).and_then(f).ok_or(Unavailable)
    }

    fn gene<T>(&self, gene: &str, f: impl Fn(&GeneAnnotation) -> Option<T>) -> Lookup<T> {
        self.genes.get(gene).and_then(f).ok_or(Unavailable)
    }

    fn protein_match<T>(
        &self,
        key: &str,
        f: impl Fn(&ProteinMatchAnnotation) -> Option<T>,
    ) -> Lookup<T> {
        self.protein_matches.get(key).and_then(f).ok_or(Unavailable)
    }
}

impl AnnotationProvider for Annotations {
    fn description(&self, accession: &str) -> Lookup<String> {
        self.protein(accession, |p| p.description.clone())
    }

    fn gene_name(&self, accession: &str) -> Lookup<String> {
        self.protein(accession, |p| p.gene_name.clone())
    }

    fn ensembl_gene_id(&self, gene_name: &str) -> Lookup<String> {
        self.gene(gene_name, |g| g.ensembl_id.clone())
    }

    fn chromosome(&self, gene_name: &str) -> Lookup<String> {
        self.gene(gene_name, |g| g.chromosome.clone())
    }

    fn go_terms(&self, accession: &str) -> Lookup<Vec<GoTerm>> {
        self.protein(accession, |p| Some(p.go_terms.clone()))
    }

    fn sequence(&self, accession: &str) -> Lookup<String> {
        self.protein(accession, |p| p.sequence.clone())
    }

    fn molecular_weight(&self, accession: &str) -> Lookup<f64> {
        self.protein(accession, |p| p.molecular_weight).or_else(|_| {
            self.sequence(accession)
                .and_then(|seq| mass::molecular_weight(&seq).ok_or(Unavailable))
        })
    }

    fn observable_coverage(&self, protein_key: &str) -> Lookup<f64> {
        self.protein_match(protein_key, |p| p.observable_coverage)
    }

    fn spectrum_counting(&self, protein_key: &str, method: SpectrumCounting) -> Lookup<f64> {
        self.protein_match(protein_key, |p| match method {
            SpectrumCounting::Nsaf => p.nsaf,
            SpectrumCounting::Empai => p.empai,
        })
    }

    fn confident_ptms(&self, protein_key: &str) -> Lookup<String> {
        self.protein_match(protein_key, |p| p.confident_ptms.clone())
    }

    fn other_ptms(&self, protein_key: &str) -> Lookup<String> {
        self.protein_match(protein_key, |p| p.other_ptms.clone())
    }

    fn confident_phosphosites(&self, protein_key: &str) -> Lookup<String> {
        self.protein_match(protein_key, |p| p.confident_phosphosites.clone())
    }

    fn other_phosphosites(&self, protein_key: &str) -> Lookup<String> {
        self.protein_match(protein_key, |p| p.other_phosphosites.clone())
    }

    fn non_enzymatic_peptides(&self, protein_key: &str) -> Lookup<usize> {
        self.protein_match(protein_key, |p| p.non_enzymatic)
    }
}

/// Read-only view of a project handed to every resolver
pub struct ExportContext<'a> {
    pub store: &'a dyn IdentificationStore,
    pub snapshot: &'a ValidationSnapshot,
    pub annotations: &'a dyn AnnotationProvider,
    /// Residues reported on either side of a peptide
    pub surrounding_aas: usize,
}

impl<'a> ExportContext<'a> {
    pub fn parameters(&self, level: MatchLevel, key: &str) -> Option<&'a MatchParameters> {
        self.snapshot.parameters(level, key)
    }

    pub fn is_validated(&self, level: MatchLevel, key: &str) -> bool {
        self.snapshot.is_validated(level, key)
    }
}

/// 1-based start of every occurrence of `peptide` in `protein`, overlapping
/// occurrences included
pub fn peptide_starts(protein: &str, peptide: &str) -> Vec<usize> {
    if peptide.is_empty() || peptide.len() > protein.len() {
        return Vec::new();
    }
    protein
        .as_bytes()
        .windows(peptide.len())
        .enumerate()
        .filter(|(_, w)| *w == peptide.as_bytes())
        .map(|(ix, _)| ix + 1)
        .collect()
}

/// Percentage of `protein` covered by at least one of `peptides`
pub fn sequence_coverage<'p>(protein: &str, peptides: impl IntoIterator<Item = &'p str>) -> f64 {
    if protein.is_empty() {
        return 0.0;
    }
    let mut covered = vec![false; protein.len()];
    for peptide in peptides {
        for start in peptide_starts(protein, peptide) {
            covered[start - 1..start - 1 + peptide.len()]
                .iter_mut()
                .for_each(|c| *c = true);
        }
    }
    100.0 * covered.iter().filter(|&&c| c).count() as f64 / protein.len() as f64
}
