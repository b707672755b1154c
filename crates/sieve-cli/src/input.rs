use crate::export;
use anyhow::{ensure, Context};
use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use sieve_core::identification::MatchLevel;
use sieve_core::snapshot::Validator;
use sieve_core::target_decoy::{FdrStrategy, Parameters, SmoothingWindow};
use sieve_core::validation::{LevelThresholds, Thresholds, ValidationLevel};
use std::path::PathBuf;

#[derive(Serialize)]
/// Actual run parameters - may include overrides or default values not set by user
pub struct Search {
    pub version: String,
    pub identifications: String,
    pub annotations: Option<String>,
    pub validation: ValidationSettings,
    pub export: ExportSettings,
    pub manual_validation: Vec<ManualValidation>,
    pub output_paths: Vec<String>,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

#[derive(Deserialize)]
/// Input parameters deserialized from JSON file
pub struct Input {
    identifications: Option<String>,
    annotations: Option<String>,
    output_directory: Option<String>,
    validation: Option<ValidationOptions>,
    export: Option<ExportOptions>,
    manual_validation: Option<Vec<ManualValidation>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ManualValidation {
    pub level: MatchLevel,
    pub key: String,
    pub validation: ValidationLevel,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ThresholdOptions {
    fdr: Option<f64>,
    doubtful_fdr: Option<f64>,
}

impl From<ThresholdOptions> for Thresholds {
    fn from(value: ThresholdOptions) -> Self {
        let default = Thresholds::default();
        let fdr = value.fdr.unwrap_or(default.fdr).clamp(0.0, 100.0);
        let mut doubtful_fdr = value
            .doubtful_fdr
            .unwrap_or(default.doubtful_fdr)
            .clamp(0.0, 100.0);
        if doubtful_fdr < fdr {
            log::warn!(
                "doubtful_fdr ({}) is lower than fdr ({}), no match will be doubtful",
                doubtful_fdr,
                fdr
            );
            doubtful_fdr = fdr;
        }
        if fdr > 10.0 {
            log::warn!("fdr of {}% is higher than expected", fdr);
        }
        Thresholds { fdr, doubtful_fdr }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ValidationOptions {
    strategy: Option<FdrStrategy>,
    min_decoys: Option<usize>,
    window: Option<SmoothingWindow>,
    protein: Option<ThresholdOptions>,
    peptide: Option<ThresholdOptions>,
    psm: Option<ThresholdOptions>,
}

#[derive(Serialize, Copy, Clone, Debug, Default, PartialEq)]
pub struct ValidationSettings {
    pub parameters: Parameters,
    pub thresholds: LevelThresholds,
}

impl ValidationSettings {
    pub fn validator(&self, batch_size: usize) -> Validator {
        Validator {
            parameters: self.parameters,
            thresholds: self.thresholds,
            batch_size,
        }
    }
}

impl From<ValidationOptions> for ValidationSettings {
    fn from(value: ValidationOptions) -> Self {
        let default = Parameters::default();
        let window = value.window.unwrap_or(default.window);
        match window {
            SmoothingWindow::Auto {
                decoys_per_window: 0,
            }
            | SmoothingWindow::Fixed { half_width: 0 } => {
                log::warn!("validation.window of zero width, PEP will follow single bins")
            }
            _ => {}
        }
        let parameters = Parameters {
            strategy: value.strategy.unwrap_or(default.strategy),
            min_decoys: value.min_decoys.unwrap_or(default.min_decoys),
            window,
        };
        let thresholds = LevelThresholds {
            protein: value.protein.unwrap_or_default().into(),
            peptide: value.peptide.unwrap_or_default().into(),
            psm: value.psm.unwrap_or_default().into(),
        };
        ValidationSettings {
            parameters,
            thresholds,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReportOptions {
    pub file: String,
    #[serde(default)]
    pub protein: Vec<String>,
    #[serde(default)]
    pub peptide: Vec<String>,
    #[serde(default)]
    pub psm: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ExportOptions {
    separator: Option<String>,
    indexes: Option<bool>,
    header: Option<bool>,
    validated_only: Option<bool>,
    include_decoys: Option<bool>,
    batch_size: Option<usize>,
    surrounding_aas: Option<usize>,
    reports: Option<Vec<ReportOptions>>,
    validation_features: Option<Vec<String>>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ExportSettings {
    #[serde(flatten)]
    pub settings: export::Settings,
    pub reports: Vec<ReportOptions>,
    pub validation_features: Vec<String>,
}

fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl ExportSettings {
    pub fn default_reports() -> Vec<ReportOptions> {
        vec![
            ReportOptions {
                file: "proteins.tsv".into(),
                protein: names(&[
                    "accession",
                    "protein_description",
                    "gene_name",
                    "protein_group",
                    "mw",
                    "pi",
                    "peptides",
                    "validated_peptides",
                    "unique_peptides",
                    "psms",
                    "validated_psms",
                    "coverage",
                    "score",
                    "confidence",
                    "decoy",
                    "validated",
                ]),
                peptide: Vec::new(),
                psm: Vec::new(),
            },
            ReportOptions {
                file: "peptides.tsv".into(),
                protein: Vec::new(),
                peptide: names(&[
                    "accessions",
                    "sequence",
                    "modified_sequence",
                    "variable_modifications",
                    "position",
                    "aas_before",
                    "aas_after",
                    "psms",
                    "validated_psms",
                    "score",
                    "confidence",
                    "decoy",
                    "validated",
                ]),
                psm: Vec::new(),
            },
            ReportOptions {
                file: "psms.tsv".into(),
                protein: Vec::new(),
                peptide: Vec::new(),
                psm: names(&[
                    "proteins",
                    "sequence",
                    "modified_sequence",
                    "spectrum_file",
                    "spectrum_title",
                    "precursor",
                    "identification_charge",
                    "mass_error",
                    "score",
                    "confidence",
                    "decoy",
                    "validated",
                ]),
            },
        ]
    }
}

impl TryFrom<ExportOptions> for ExportSettings {
    type Error = anyhow::Error;

    fn try_from(value: ExportOptions) -> anyhow::Result<Self> {
        let default = export::Settings::default();
        let separator = match value.separator {
            Some(s) => {
                ensure!(
                    s.len() == 1 && s.is_ascii(),
                    "`export.separator` must be a single ASCII character, got `{}`",
                    s.escape_default()
                );
                s.as_bytes()[0]
            }
            None => default.separator,
        };
        if separator == b'"' || separator == b'\n' {
            log::warn!("`export.separator` collides with quoting, cells may be hard to read");
        }

        let batch_size = value.batch_size.unwrap_or(default.batch_size);
        ensure!(batch_size > 0, "`export.batch_size` must be positive");

        let reports = value.reports.unwrap_or_else(Self::default_reports);
        for report in &reports {
            if report.protein.is_empty() && report.peptide.is_empty() && report.psm.is_empty() {
                log::warn!("report `{}` has no features and will be skipped", report.file);
            }
        }

        let validation_features = value.validation_features.unwrap_or_else(|| {
            crate::export::validation::ValidationFeature::ALL
                .iter()
                .map(|f| f.name().to_string())
                .collect()
        });

        Ok(ExportSettings {
            settings: export::Settings {
                separator,
                indexes: value.indexes.unwrap_or(default.indexes),
                header: value.header.unwrap_or(default.header),
                validated_only: value.validated_only.unwrap_or(default.validated_only),
                include_decoys: value.include_decoys.unwrap_or(default.include_decoys),
                batch_size,
                surrounding_aas: value.surrounding_aas.unwrap_or(default.surrounding_aas),
            },
            reports,
            validation_features,
        })
    }
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .context("`parameters` must be set")?;
        let mut input = Input::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(identifications) = matches.get_one::<String>("identifications") {
            log::trace!("overriding `identifications` parameter.");
            input.identifications = Some(identifications.into());
        }
        if let Some(annotations) = matches.get_one::<String>("annotations") {
            log::trace!("overriding `annotations` parameter.");
            input.annotations = Some(annotations.into());
        }

        ensure!(
            input.identifications.is_some(),
            "`identifications` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        sieve_core::read_json(path.as_ref()).map_err(anyhow::Error::from)
    }

    pub fn build(self) -> anyhow::Result<Search> {
        let identifications = self
            .identifications
            .context("`identifications` must be provided")?;

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path).with_context(|| {
                    format!("Failed to create output directory `{}`", path.display())
                })?;
                path
            }
            None => std::env::current_dir()?,
        };

        let export = self.export.unwrap_or_default().try_into()?;

        Ok(Search {
            version: clap::crate_version!().into(),
            identifications,
            annotations: self.annotations,
            validation: self.validation.unwrap_or_default().into(),
            export,
            manual_validation: self.manual_validation.unwrap_or_default(),
            output_paths: Vec::new(),
            output_directory,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() -> anyhow::Result<()> {
        let input: Input = serde_json::from_str(r#"{"identifications": "ids.json"}"#)?;
        let search = input.build()?;
        assert_eq!(search.validation, ValidationSettings::default());
        assert_eq!(search.export.settings, export::Settings::default());
        assert_eq!(search.export.reports.len(), 3);
        assert_eq!(search.export.validation_features.len(), 8);
        Ok(())
    }

    #[test]
    fn options() -> anyhow::Result<()> {
        let json = r#"{
            "identifications": "ids.json",
            "validation": {
                "strategy": "concatenated",
                "window": {"fixed": {"half_width": 3}},
                "psm": {"fdr": 5.0, "doubtful_fdr": 1.0}
            },
            "export": {"separator": ",", "indexes": false, "reports": []},
            "manual_validation": [{"level": "psm", "key": "s1", "validation": "confident"}]
        }"#;
        let input: Input = serde_json::from_str(json)?;
        let search = input.build()?;
        let validation = search.validation;
        assert_eq!(validation.parameters.strategy, FdrStrategy::Concatenated);
        assert_eq!(
            validation.parameters.window,
            SmoothingWindow::Fixed { half_width: 3 }
        );
        assert_eq!(validation.thresholds.psm.doubtful_fdr, 5.0);
        assert_eq!(validation.thresholds.protein, Thresholds::default());
        assert_eq!(search.export.settings.separator, b',');
        assert!(!search.export.settings.indexes);
        assert!(search.export.reports.is_empty());
        assert_eq!(
            search.manual_validation,
            vec![ManualValidation {
                level: MatchLevel::Psm,
                key: "s1".into(),
                validation: ValidationLevel::Confident
            }]
        );
        Ok(())
    }

    #[test]
    fn invalid_separator() {
        let input: Input =
            serde_json::from_str(r#"{"identifications": "x", "export": {"separator": "ab"}}"#)
                .unwrap();
        assert!(input.build().is_err());
    }
}
