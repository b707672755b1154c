use super::features::{Cell, ExportFeature, Resolver};
use sieve_core::identification::{MatchLevel, SpectrumMatch};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PsmFeature {
    Proteins,
    Sequence,
    ModifiedSequence,
    SpectrumFile,
    SpectrumTitle,
    Precursor,
    IdentificationCharge,
    MassError,
    Score,
    Confidence,
    Decoy,
    Hidden,
    Starred,
    Validated,
}

use PsmFeature::*;

impl ExportFeature for PsmFeature {
    type Entity = SpectrumMatch;

    const ALL: &'static [Self] = &[
        Proteins,
        Sequence,
        ModifiedSequence,
        SpectrumFile,
        SpectrumTitle,
        Precursor,
        IdentificationCharge,
        MassError,
        Score,
        Confidence,
        Decoy,
        Hidden,
        Starred,
        Validated,
    ];

    fn name(self) -> &'static str {
        match self {
            Proteins => "proteins",
            Sequence => "sequence",
            ModifiedSequence => "modified_sequence",
            SpectrumFile => "spectrum_file",
            SpectrumTitle => "spectrum_title",
            Precursor => "precursor",
            IdentificationCharge => "identification_charge",
            MassError => "mass_error",
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
            Proteins => &["Protein(s)"],
            Sequence => &["Sequence"],
            ModifiedSequence => &["Modified Sequence"],
            SpectrumFile => &["Spectrum File"],
            SpectrumTitle => &["Spectrum Title"],
            Precursor => &["Precursor m/z", "RT"],
            IdentificationCharge => &["Identification Charge"],
            MassError => &["Precursor m/z Error [ppm]"],
            Score => &["Score"],
            Confidence => &["Confidence [%]"],
            Decoy => &["Decoy"],
            Hidden => &["Hidden"],
            Starred => &["Starred"],
            Validated => &["Validation"],
        }
    }

    fn resolver(self) -> Resolver<SpectrumMatch> {
        match self {
            Proteins => |s, ctx| Ok(Cell::List(ctx.store.peptide(&s.peptide)?.proteins.clone())),
            Sequence => |s, ctx| Ok(ctx.store.peptide(&s.peptide)?.sequence.as_str().into()),
            ModifiedSequence => {
                |s, ctx| Ok(ctx.store.peptide(&s.peptide)?.modified_sequence().into())
            }
            SpectrumFile => |s, _| Ok(s.spectrum_file.as_str().into()),
            SpectrumTitle => |s, _| Ok(s.spectrum_title.as_str().into()),
            Precursor => |s, _| {
                Ok(Cell::Columns(vec![
                    ryu::Buffer::new().format(s.precursor_mz).into(),
                    ryu::Buffer::new().format(s.retention_time).into(),
                ]))
            },
            IdentificationCharge => |s, _| Ok(format!("{}+", s.charge).into()),
            MassError => |s, _| Ok(Cell::float(s.mass_error_ppm)),
            Score => |s, _| Ok(Cell::float(s.score)),
            Confidence => |s, ctx| {
                Ok(ctx
                    .parameters(MatchLevel::Psm, &s.key)
                    .map(|params| Cell::float(params.confidence))
                    .unwrap_or_else(Cell::empty))
            },
            Decoy => |s, _| Ok(Cell::flag(s.decoy)),
            Hidden => |s, _| Ok(Cell::flag(s.hidden)),
            Starred => |s, _| Ok(Cell::flag(s.starred)),
            Validated => |s, ctx| {
                Ok(ctx
                    .snapshot
                    .level(MatchLevel::Psm, &s.key)
                    .to_string()
                    .into())
            },
        }
    }
}
