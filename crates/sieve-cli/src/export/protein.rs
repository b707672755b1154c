use super::context::{sequence_coverage, ExportContext, GoTerm, SpectrumCounting};
use super::features::{Cell, ExportFeature, Resolver};
use fnv::FnvHashSet;
use itertools::Itertools;
use sieve_core::identification::{MatchLevel, ProteinMatch};
use sieve_core::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProteinFeature {
    Accession,
    ProteinDescription,
    EnsemblGeneId,
    GeneName,
    Chromosome,
    GoAccession,
    GoDescription,
    OtherProteins,
    ProteinGroup,
    Descriptions,
    Confidence,
    ConfidentPtms,
    OtherPtms,
    ConfidentPhosphosites,
    OtherPhosphosites,
    Coverage,
    PossibleCoverage,
    Decoy,
    Hidden,
    Mw,
    NonEnzymatic,
    Pi,
    Peptides,
    Psms,
    ValidatedPeptides,
    UniquePeptides,
    ValidatedPsms,
    Score,
    RawScore,
    SpectrumCountingNsaf,
    SpectrumCountingEmpai,
    Starred,
    Validated,
}

use ProteinFeature::*;

impl ExportFeature for ProteinFeature {
    type Entity = ProteinMatch;

    const ALL: &'static [Self] = &[
        Accession,
        ProteinDescription,
        EnsemblGeneId,
        GeneName,
        Chromosome,
        GoAccession,
        GoDescription,
        OtherProteins,
        ProteinGroup,
        Descriptions,
        Confidence,
        ConfidentPtms,
        OtherPtms,
    ConfidentPhosphosites,
    OtherPhosphosites,
        Coverage,
        PossibleCoverage,
        Decoy,
        Hidden,
        Mw,
    NonEnzymatic,
        Pi,
        Peptides,
        Psms,
        ValidatedPeptides,
        UniquePeptides,
        ValidatedPsms,
        Score,
    RawScore,
        SpectrumCountingNsaf,
        SpectrumCountingEmpai,
        Starred,
        Validated,
    ];

    fn name(self) -> &'static str {
        match self {
            Accession => "accession",
            ProteinDescription => "protein_description",
            EnsemblGeneId => "ensembl_gene_id",
            GeneName => "gene_name",
            Chromosome => "chromosome",
            GoAccession => "go_accession",
            GoDescription => "go_description",
            OtherProteins => "other_proteins",
            ProteinGroup => "protein_group",
            Descriptions => "descriptions",
            Confidence => "confidence",
            ConfidentPtms => "confident_ptms",
            OtherPtms => "other_ptms",
            ConfidentPhosphosites => "confident_phosphosites",
            OtherPhosphosites => "other_phosphosites",
            Coverage => "coverage",
            PossibleCoverage => "possible_coverage",
            Decoy => "decoy",
            Hidden => "hidden",
            Mw => "mw",
            NonEnzymatic => "non_enzymatic",
            Pi => "pi",
            Peptides => "peptides",
            Psms => "psms",
            ValidatedPeptides => "validated_peptides",
            UniquePeptides => "unique_peptides",
            ValidatedPsms => "validated_psms",
            Score => "score",
            RawScore => "raw_score",
            SpectrumCountingNsaf => "spectrum_counting_nsaf",
            SpectrumCountingEmpai => "spectrum_counting_empai",
            Starred => "starred",
            Validated => "validated",
        }
    }

    fn titles(self) -> &'static [&'static str] {
        match self {
            Accession => &["Main Accession"],
            ProteinDescription => &["Description"],
            EnsemblGeneId => &["Ensembl Gene ID"],
            GeneName => &["Gene Name"],
            Chromosome => &["Chromosome"],
            GoAccession => &["GO Accession"],
            GoDescription => &["GO Description"],
            OtherProteins => &["Other Proteins"],
            ProteinGroup => &["Protein Group"],
            Descriptions => &["Descriptions"],
            Confidence => &["Confidence [%]"],
            ConfidentPtms => &["Confident PTMs"],
            OtherPtms => &["Other PTMs"],
            ConfidentPhosphosites => &["Confident Phosphosites"],
            OtherPhosphosites => &["Other Phosphosites"],
            Coverage => &["Coverage [%]"],
            PossibleCoverage => &["Possible Coverage [%]"],
            Decoy => &["Decoy"],
            Hidden => &["Hidden"],
            Mw => &["MW [kDa]"],
            NonEnzymatic => &["#Non-Enzymatic Peptides"],
            Pi => &["Protein Inference"],
            Peptides => &["#Peptides"],
            Psms => &["#PSMs"],
            ValidatedPeptides => &["#Validated Peptides"],
            UniquePeptides => &["#Unique Peptides"],
            ValidatedPsms => &["#Validated PSMs"],
            Score => &["Score"],
            RawScore => &["Raw Score"],
            SpectrumCountingNsaf => &["Spectrum Counting NSAF"],
            SpectrumCountingEmpai => &["Spectrum Counting emPAI"],
            Starred => &["Starred"],
            Validated => &["Validation"],
        }
    }

    fn resolver(self) -> Resolver<ProteinMatch> {
        match self {
            Accession => |p, _| Ok(p.main_accession().into()),
            ProteinDescription => |p, ctx| {
                Ok(ctx
                    .annotations
                    .description(p.main_accession())
                    .unwrap_or_default()
                    .into())
            },
            EnsemblGeneId => |p, ctx| {
                Ok(gene(p, ctx, |gene| ctx.annotations.ensembl_gene_id(gene).ok()).into())
            },
            GeneName => |p, ctx| Ok(gene(p, ctx, |gene| Some(gene.to_string())).into()),
            Chromosome => {
                |p, ctx| Ok(gene(p, ctx, |gene| ctx.annotations.chromosome(gene).ok()).into())
            }
            GoAccession => |p, ctx| Ok(go_terms(p, ctx, |t| t.accession)),
            GoDescription => |p, ctx| Ok(go_terms(p, ctx, |t| t.description)),
            OtherProteins => |p, _| {
                let main = p.main_accession();
                Ok(Cell::List(
                    p.accessions
                        .iter()
                        .filter(|a| a.as_str() != main)
                        .cloned()
                        .collect(),
                ))
            },
            ProteinGroup => |p, _| Ok(Cell::List(p.accessions.clone())),
            Descriptions => |p, ctx| {
                // Follows the sorted accessions
                Ok(p.accessions
                    .iter()
                    .sorted()
                    .dedup()
                    .map(|a| ctx.annotations.description(a).unwrap_or_default())
                    .join(", ")
                    .into())
            },
            Confidence => |p, ctx| {
                Ok(ctx
                    .parameters(MatchLevel::Protein, &p.key)
                    .map(|params| Cell::float(params.confidence))
                    .unwrap_or_else(Cell::empty))
            },
            ConfidentPtms => {
                |p, ctx| Ok(ctx.annotations.confident_ptms(&p.key).unwrap_or_default().into())
            }
            OtherPtms => |p, ctx| Ok(ctx.annotations.other_ptms(&p.key).unwrap_or_default().into()),
            ConfidentPhosphosites => |p, ctx| {
                Ok(ctx
                    .annotations
                    .confident_phosphosites(&p.key)
                    .unwrap_or_default()
                    .into())
            },
            OtherPhosphosites => |p, ctx| {
                Ok(ctx
                    .annotations
                    .other_phosphosites(&p.key)
                    .unwrap_or_default()
                    .into())
            },
            Coverage => |p, ctx| {
                let sequence = match ctx.annotations.sequence(p.main_accession()) {
                    Ok(sequence) => sequence,
                    Err(_) => return Ok(Cell::empty()),
                };
                let mut validated = Vec::new();
                for key in &p.peptides {
                    if ctx.is_validated(MatchLevel::Peptide, key) {
                        validated.push(ctx.store.peptide(key)?.sequence.clone());
                    }
                }
                let coverage = sequence_coverage(&sequence, validated.iter().map(String::as_str));
                Ok(Cell::percent(coverage))
            },
            PossibleCoverage => |p, ctx| {
                Ok(ctx
                    .annotations
                    .observable_coverage(&p.key)
                    .map(|c| Cell::percent(100.0 * c))
                    .unwrap_or_else(|_| Cell::empty()))
            },
            Decoy => |p, _| Ok(Cell::flag(p.decoy)),
            Hidden => |p, _| Ok(Cell::flag(p.hidden)),
            Mw => |p, ctx| {
                Ok(ctx
                    .annotations
                    .molecular_weight(p.main_accession())
                    .map(Cell::float)
                    .unwrap_or_else(|_| Cell::empty()))
            },
            NonEnzymatic => |p, ctx| {
                Ok(ctx
                    .annotations
                    .non_enzymatic_peptides(&p.key)
                    .map(Cell::int)
                    .unwrap_or_else(|_| Cell::empty()))
            },
            Pi => |p, _| Ok(p.inference.to_string().into()),
            Peptides => |p, _| Ok(Cell::int(p.peptides.len())),
            Psms => |p, ctx| Ok(Cell::int(psms(p, ctx, false)?)),
            ValidatedPeptides => |p, ctx| {
                let n = p
                    .peptides
                    .iter()
                    .filter(|k| ctx.is_validated(MatchLevel::Peptide, k))
                    .count();
                Ok(Cell::int(n))
            },
            UniquePeptides => |p, ctx| {
                let mut n = 0;
                for key in &p.peptides {
                    if ctx.store.peptide(key)?.proteins.len() == 1 {
                        n += 1;
                    }
                }
                Ok(Cell::int(n))
            },
            ValidatedPsms => |p, ctx| Ok(Cell::int(psms(p, ctx, true)?)),
            Score => |p, _| Ok(Cell::float(p.score)),
            RawScore => |p, _| Ok(Cell::float(raw_score(p.score))),
            SpectrumCountingNsaf => {
                |p, ctx| Ok(spectrum_counting(p, ctx, SpectrumCounting::Nsaf))
            }
            SpectrumCountingEmpai => {
                |p, ctx| Ok(spectrum_counting(p, ctx, SpectrumCounting::Empai))
            }
            Starred => |p, _| Ok(Cell::flag(p.starred)),
            Validated => |p, ctx| {
                Ok(ctx
                    .snapshot
                    .level(MatchLevel::Protein, &p.key)
                    .to_string()
                    .into())
            },
        }
    }
}

/// Protein scores are `-10·log10(p)`; this is `p`
pub fn raw_score(score: f64) -> f64 {
    10f64.powf(-score / 10.0)
}

/// Gene-level lookups are only meaningful for target proteins
fn gene(
    protein: &ProteinMatch,
    ctx: &ExportContext<'_>,
    f: impl Fn(&str) -> Option<String>,
) -> String {
    if protein.decoy {
        return String::new();
    }
    ctx.annotations
        .gene_name(protein.main_accession())
        .ok()
        .and_then(|gene| f(&gene))
        .unwrap_or_default()
}

fn go_terms(
    protein: &ProteinMatch,
    ctx: &ExportContext<'_>,
    f: fn(GoTerm) -> String,
) -> Cell {
    if protein.decoy {
        return Cell::empty();
    }
    let terms = ctx
        .annotations
        .go_terms(protein.main_accession())
        .unwrap_or_default();
    Cell::List(terms.into_iter().map(f).collect())
}

/// Distinct spectrum matches supporting the protein
fn psms(
    protein: &ProteinMatch,
    ctx: &ExportContext<'_>,
    validated_only: bool,
) -> Result<usize, Error> {
    let mut seen = FnvHashSet::default();
    for peptide in &protein.peptides {
        for psm in ctx.store.child_keys(MatchLevel::Peptide, peptide)? {
            if !validated_only || ctx.is_validated(MatchLevel::Psm, &psm) {
                seen.insert(psm);
            }
        }
    }
    Ok(seen.len())
}

fn spectrum_counting(
    protein: &ProteinMatch,
    ctx: &ExportContext<'_>,
    method: SpectrumCounting,
) -> Cell {
    ctx.annotations
        .spectrum_counting(&protein.key, method)
        .map(Cell::float)
        .unwrap_or_else(|_| Cell::empty())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::export::context::{
        Annotations, NoAnnotations, ProteinAnnotation, ProteinMatchAnnotation,
    };
    use csv::ByteRecord;
    use sieve_core::identification::{Identifications, MemoryStore};
    use sieve_core::snapshot::ValidationSnapshot;

    fn protein() -> ProteinMatch {
        ProteinMatch {
            key: "grp".into(),
            accessions: vec!["P2".into(), "P1".into(), "P2".into()],
            main_accession: Some("P1".into()),
            decoy: false,
            score: 20.0,
            peptides: vec![],
            inference: Default::default(),
            starred: false,
            hidden: false,
        }
    }

    #[test]
    fn annotated_features() {
        let mut annotations = Annotations::default();
        for (accession, description) in [("P1", "Actin"), ("P2", "Myosin")] {
            annotations.proteins.insert(
                accession.into(),
                ProteinAnnotation {
                    description: Some(description.into()),
                    ..Default::default()
                },
            );
        }
        annotations.protein_matches.insert(
            "grp".into(),
            ProteinMatchAnnotation {
                confident_phosphosites: Some("S12, T40".into()),
                non_enzymatic: Some(2),
                ..Default::default()
            },
        );
        let store = MemoryStore::new(Identifications::default()).unwrap();
        let snapshot = ValidationSnapshot::default();
        let ctx = ExportContext {
            store: &store,
            snapshot: &snapshot,
            annotations: &annotations,
            surrounding_aas: 1,
        };

        let protein = protein();
        let cell = |f: ProteinFeature| {
            let mut record = ByteRecord::new();
            f.resolver()(&protein, &ctx).unwrap().push_into(&mut record);
            String::from_utf8(record[0].to_vec()).unwrap()
        };
        // Repeated accessions are listed once, in the same order in both columns
        assert_eq!(cell(ProteinGroup), "P1, P2");
        assert_eq!(cell(Descriptions), "Actin, Myosin");
        assert_eq!(cell(ConfidentPhosphosites), "S12, T40");
        assert_eq!(cell(OtherPhosphosites), "");
        assert_eq!(cell(NonEnzymatic), "2");
        assert_eq!(cell(Score), "20.0");

        let ctx = ExportContext {
            annotations: &NoAnnotations,
            ..ctx
        };
        let cell = |f: ProteinFeature| match f.resolver()(&protein, &ctx).unwrap() {
            Cell::Text(s) => s,
            other => panic!("{:?}", other),
        };
        assert_eq!(cell(NonEnzymatic), "");
        assert_eq!(cell(Descriptions), ", ");
    }

    #[test]
    fn raw_scores() {
        assert_eq!(raw_score(0.0), 1.0);
        assert!((raw_score(20.0) - 0.01).abs() < 1e-12);
        assert!((raw_score(13.0) - 0.0501187).abs() < 1e-6);
        assert_eq!(raw_score(f64::INFINITY), 0.0);
    }
}
