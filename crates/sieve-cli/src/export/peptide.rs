use super::context::{peptide_starts, ExportContext};
use super::features::{Cell, ExportFeature, Resolver};
use itertools::Itertools;
use sieve_core::identification::{MatchLevel, PeptideMatch};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeptideFeature {
    Accessions,
    ProteinDescriptions,
    Sequence,
    ModifiedSequence,
    VariableModifications,
    Position,
    AasBefore,
    AasAfter,
    Psms,
    ValidatedPsms,
    Score,
    Confidence,
    Decoy,
    Hidden,
    Starred,
    Validated,
}

use PeptideFeature::*;

impl ExportFeature for PeptideFeature {
    type Entity = PeptideMatch;

    const ALL: &'static [Self] = &[
        Accessions,
        ProteinDescriptions,
        Sequence,
        ModifiedSequence,
        VariableModifications,
        Position,
        AasBefore,
        AasAfter,
        Psms,
        ValidatedPsms,
        Score,
        Confidence,
        Decoy,
        Hidden,
        Starred,
        Validated,
    ];

    fn name(self) -> &'static str {
        match self {
            Accessions => "accessions",
            ProteinDescriptions => "protein_descriptions",
            Sequence => "sequence",
            ModifiedSequence => "modified_sequence",
            VariableModifications => "variable_modifications",
            Position => "position",
            AasBefore => "aas_before",
            AasAfter => "aas_after",
            Psms => "psms",
            ValidatedPsms => "validated_psms",
            Score => "score",
            Confidence => "confidence",
            Decoy => "decoy",
            Hidden => "hidden",
            Starred => "starred",
            Validated => "validated",
        }
    }

    fn titles(self) -> &'static [&'static str] {
        match self {
            Accessions => &["Protein(s)"],
            ProteinDescriptions => &["Description(s)"],
            Sequence => &["Sequence"],
            ModifiedSequence => &["Modified Sequence"],
            VariableModifications => &["Variable Modifications"],
            Position => &["Position"],
            AasBefore => &["AAs Before"],
            AasAfter => &["AAs After"],
            Psms => &["#PSMs"],
            ValidatedPsms => &["#Validated PSMs"],
            Score => &["Score"],
            Confidence => &["Confidence [%]"],
            Decoy => &["Decoy"],
            Hidden => &["Hidden"],
            Starred => &["Starred"],
            Validated => &["Validation"],
        }
    }

    fn resolver(self) -> Resolver<PeptideMatch> {
        match self {
            Accessions => |p, _| Ok(Cell::List(p.proteins.clone())),
            ProteinDescriptions => |p, ctx| {
                Ok(p.proteins
                    .iter()
                    .sorted()
                    .dedup()
                    .map(|a| ctx.annotations.description(a).unwrap_or_default())
                    .join(", ")
                    .into())
            },
            Sequence => |p, _| Ok(p.sequence.as_str().into()),
            ModifiedSequence => |p, _| Ok(p.modified_sequence().into()),
            VariableModifications => |p, _| {
                Ok(Cell::List(
                    p.variable_modifications()
                        .into_iter()
                        .map(String::from)
                        .collect(),
                ))
            },
            Position => |p, ctx| Ok(per_protein(p, ctx, |_, start, _| start.to_string())),
            AasBefore => |p, ctx| {
                Ok(per_protein(p, ctx, |protein, start, n| {
                    let end = start - 1;
                    protein.get(end.saturating_sub(n)..end).unwrap_or_default().to_string()
                }))
            },
            AasAfter => |p, ctx| {
                let len = p.sequence.len();
                Ok(per_protein(p, ctx, move |protein, start, n| {
                    let begin = (start - 1 + len).min(protein.len());
                    let end = (begin + n).min(protein.len());
                    protein.get(begin..end).unwrap_or_default().to_string()
                }))
            },
            Psms => |p, _| Ok(Cell::int(p.psms.len())),
            ValidatedPsms => |p, ctx| {
                let n = p
                    .psms
                    .iter()
                    .filter(|k| ctx.is_validated(MatchLevel::Psm, k))
                    .count();
                Ok(Cell::int(n))
            },
            Score => |p, _| Ok(Cell::float(p.score)),
            Confidence => |p, ctx| {
                Ok(ctx
                    .parameters(MatchLevel::Peptide, &p.key)
                    .map(|params| Cell::float(params.confidence))
                    .unwrap_or_else(Cell::empty))
            },
            Decoy => |p, _| Ok(Cell::flag(p.decoy)),
            Hidden => |p, _| Ok(Cell::flag(p.hidden)),
            Starred => |p, _| Ok(Cell::flag(p.starred)),
            Validated => |p, ctx| {
                Ok(ctx
                    .snapshot
                    .level(MatchLevel::Peptide, &p.key)
                    .to_string()
                    .into())
            },
        }
    }
}

/// One value per occurrence of the peptide in each of its proteins, as
/// `P1 (a, b); P2 (c)`. Proteins without a known sequence are skipped.
fn per_protein(
    peptide: &PeptideMatch,
    ctx: &ExportContext<'_>,
    f: impl Fn(&str, usize, usize) -> String,
) -> Cell {
    peptide
        .proteins
        .iter()
        .sorted()
        .dedup()
        .filter_map(|accession| {
            let protein = ctx.annotations.sequence(accession).ok()?;
            let values = peptide_starts(&protein, &peptide.sequence)
                .into_iter()
                .map(|start| f(&protein, start, ctx.surrounding_aas))
                .collect::<Vec<_>>();
            match values.is_empty() {
                true => None,
                false => Some(format!("{} ({})", accession, values.join(", "))),
            }
        })
        .join("; ")
        .into()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::export::context::{Annotations, ProteinAnnotation};
    use sieve_core::identification::{Identifications, MemoryStore};
    use sieve_core::snapshot::ValidationSnapshot;

    #[test]
    fn surrounding_residues() {
        let peptide = PeptideMatch {
            key: "a".into(),
            sequence: "AA".into(),
            modifications: vec![],
            proteins: vec!["P2".into(), "P1".into(), "P3".into()],
            decoy: false,
            score: 1.0,
            psms: vec![],
            starred: false,
            hidden: false,
        };
        let mut annotations = Annotations::default();
        for (accession, sequence) in [("P1", "MKAAAK"), ("P2", "AAK")] {
            annotations.proteins.insert(
                accession.into(),
                ProteinAnnotation {
                    sequence: Some(sequence.into()),
                    ..Default::default()
                },
            );
        }
        let store = MemoryStore::new(Identifications::default()).unwrap();
        let snapshot = ValidationSnapshot::default();
        let ctx = ExportContext {
            store: &store,
            snapshot: &snapshot,
            annotations: &annotations,
            surrounding_aas: 2,
        };

        let cell = |f: PeptideFeature| match f.resolver()(&peptide, &ctx).unwrap() {
            Cell::Text(s) => s,
            other => panic!("{:?}", other),
        };
        assert_eq!(cell(Position), "P1 (3, 4); P2 (1)");
        assert_eq!(cell(AasBefore), "P1 (MK, KA); P2 ()");
        assert_eq!(cell(AasAfter), "P1 (AK, K); P2 (K)");
    }

    #[test]
    fn descriptions_follow_accessions() {
        let peptide = PeptideMatch {
            key: "a".into(),
            sequence: "AA".into(),
            modifications: vec![],
            proteins: vec!["P2".into(), "P1".into(), "P2".into()],
            decoy: false,
            score: 1.0,
            psms: vec![],
            starred: false,
            hidden: false,
        };
        let mut annotations = Annotations::default();
        annotations.proteins.insert(
            "P2".into(),
            ProteinAnnotation {
                description: Some("Myosin".into()),
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

        let mut record = csv::ByteRecord::new();
        for f in [Accessions, ProteinDescriptions] {
            f.resolver()(&peptide, &ctx).unwrap().push_into(&mut record);
        }
        assert_eq!(record, csv::ByteRecord::from(vec!["P1, P2", ", Myosin"]));
    }
}
