//! `Parameter` / `Value` summary of every validation group.

use super::features::{round, NOT_IMPLEMENTED};
use super::{ExportOutcome, ExportWriter, Settings};
use csv::ByteRecord;
use sieve_core::snapshot::ValidationSnapshot;
use sieve_core::target_decoy::{Reliability, TargetDecoyResults};
use std::io::Write;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValidationFeature {
    /// Smallest resolvable percentage of the target population
    Accuracy,
    Confidence,
    Fdr,
    Fnr,
    Pep,
    TotalTp,
    Validated,
    Reliable,
}

impl ValidationFeature {
    pub const ALL: &'static [Self] = &[
        ValidationFeature::Accuracy,
        ValidationFeature::Confidence,
        ValidationFeature::Fdr,
        ValidationFeature::Fnr,
        ValidationFeature::Pep,
        ValidationFeature::TotalTp,
        ValidationFeature::Validated,
        ValidationFeature::Reliable,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ValidationFeature::Accuracy => "accuracy",
            ValidationFeature::Confidence => "confidence",
            ValidationFeature::Fdr => "fdr",
            ValidationFeature::Fnr => "fnr",
            ValidationFeature::Pep => "pep",
            ValidationFeature::TotalTp => "total_tp",
            ValidationFeature::Validated => "validated",
            ValidationFeature::Reliable => "reliable",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ValidationFeature::Accuracy => "Accuracy",
            ValidationFeature::Confidence => "Confidence Limit",
            ValidationFeature::Fdr => "FDR Limit",
            ValidationFeature::Fnr => "FNR Limit",
            ValidationFeature::Pep => "PEP Limit",
            ValidationFeature::TotalTp => "Total TP",
            ValidationFeature::Validated => "#Validated",
            ValidationFeature::Reliable => "Decoys",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    pub fn value(self, results: &TargetDecoyResults) -> String {
        let percent = |x: f64| format!("{} %", ryu::Buffer::new().format(round(x, 2)));
        match self {
            ValidationFeature::Accuracy => percent(results.min_achievable_percent()),
            ValidationFeature::Confidence => percent(results.confidence_limit),
            ValidationFeature::Fdr => percent(results.fdr_limit),
            ValidationFeature::Fnr => percent(results.fnr_limit),
            ValidationFeature::Pep => percent(results.pep_limit),
            ValidationFeature::TotalTp => itoa::Buffer::new().format(results.n_tp_total).into(),
            ValidationFeature::Validated => itoa::Buffer::new().format(results.n).into(),
            ValidationFeature::Reliable => match results.reliability {
                Reliability::Stable => "Sufficient".into(),
                Reliability::Sparse => "Few".into(),
                Reliability::NoDecoys => "None".into(),
            },
        }
    }
}

/// The configured rows of the validation summary
pub struct ValidationSection {
    features: Vec<Result<ValidationFeature, String>>,
}

impl ValidationSection {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        let mut features = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                ValidationFeature::parse(name).ok_or_else(|| name.to_string())
            })
            .collect::<Vec<_>>();
        // Known features in declared order, unknown ones last
        features.sort_by(|a, b| match (a, b) {
            (Ok(a), Ok(b)) => a.cmp(b),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => std::cmp::Ordering::Equal,
        });
        features.dedup();

        let unknown = features
            .iter()
            .filter_map(|f| f.as_ref().err())
            .map(String::as_str)
            .collect::<Vec<_>>();
        if !unknown.is_empty() {
            log::warn!(
                "unknown validation features will be written as `{}`: {}",
                NOT_IMPLEMENTED,
                unknown.join(", ")
            );
        }
        Self { features }
    }

    /// One row per feature and group, grouped by feature
    pub fn write<W: Write>(
        &self,
        snapshot: &ValidationSnapshot,
        settings: &Settings,
        writer: &mut ExportWriter<W>,
    ) -> anyhow::Result<ExportOutcome> {
        if settings.header {
            writer.write_header(settings.indexes, ["Parameter", "Value"])?;
        }
        let mut line = 1usize;
        let mut record = ByteRecord::new();
        let mut row = |parameter: &str, value: &str, writer: &mut ExportWriter<W>| {
            record.clear();
            if settings.indexes {
                record.push_field(itoa::Buffer::new().format(line).as_bytes());
            }
            record.push_field(parameter.as_bytes());
            record.push_field(value.as_bytes());
            line += 1;
            writer.write_row(&record)
        };

        for feature in &self.features {
            match feature {
                Ok(feature) => {
                    for (group, map) in snapshot.maps() {
                        let parameter = format!("{} {}", group, feature.title());
                        row(&parameter, &feature.value(&map.results), &mut *writer)?;
                    }
                }
                Err(name) => row(name.as_str(), NOT_IMPLEMENTED, &mut *writer)?,
            }
        }
        writer.flush()?;
        Ok(ExportOutcome::Completed {
            rows: writer.rows(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn results() -> TargetDecoyResults {
        TargetDecoyResults {
            desired_fdr: 1.0,
            confidence_limit: 87.654,
            fdr_limit: 0.994,
            fnr_limit: 12.0,
            pep_limit: 12.346,
            n_tp_total: 300,
            n: 303,
            n_max: 400,
            reliability: Reliability::Stable,
        }
    }

    #[test]
    fn values() {
        let r = results();
        assert_eq!(ValidationFeature::Accuracy.value(&r), "0.25 %");
        assert_eq!(ValidationFeature::Confidence.value(&r), "87.65 %");
        assert_eq!(ValidationFeature::Fdr.value(&r), "0.99 %");
        assert_eq!(ValidationFeature::Pep.value(&r), "12.35 %");
        assert_eq!(ValidationFeature::TotalTp.value(&r), "300");
        assert_eq!(ValidationFeature::Validated.value(&r), "303");
        assert_eq!(ValidationFeature::Reliable.value(&r), "Sufficient");
    }

    #[test]
    fn empty_snapshot() {
        let section = ValidationSection::new(&["fdr", "nonsense", "accuracy"]);
        let mut writer = ExportWriter::new(vec![], b'\t');
        let outcome = section
            .write(&ValidationSnapshot::default(), &Settings::default(), &mut writer)
            .unwrap();
        assert_eq!(outcome, ExportOutcome::Completed { rows: 1 });
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(out, "\tParameter\tValue\n1\tnonsense\tNot implemented\n");
    }
}
