use super::export::context::{AnnotationProvider, Annotations, NoAnnotations};
use super::input::Search;
use anyhow::Context;
use log::info;
use sieve_core::identification::{IdentificationStore, MatchLevel, MemoryStore};
use sieve_core::snapshot::ValidationState;
use sieve_core::validation::ValidationLevel;
use std::path::PathBuf;
use std::time::Instant;

pub struct Runner {
    pub parameters: Search,
    pub store: MemoryStore,
    pub annotations: Box<dyn AnnotationProvider>,
    pub state: ValidationState,
    start: Instant,
}

impl Runner {
    pub fn new(parameters: Search) -> anyhow::Result<Self> {
        let start = Instant::now();

        let store = MemoryStore::load(&parameters.identifications).with_context(|| {
            format!(
                "Failed to read identifications from `{}`",
                parameters.identifications
            )
        })?;
        info!(
            "loaded {} proteins, {} peptides, {} PSMs in {:#?}",
            store.keys(MatchLevel::Protein)?.len(),
            store.keys(MatchLevel::Peptide)?.len(),
            store.keys(MatchLevel::Psm)?.len(),
            start.elapsed()
        );

        let annotations: Box<dyn AnnotationProvider> = match &parameters.annotations {
            Some(path) => Box::new(
                Annotations::load(path)
                    .with_context(|| format!("Failed to read annotations from `{}`", path))?,
            ),
            None => Box::new(NoAnnotations),
        };

        let validator = parameters
            .validation
            .validator(parameters.export.settings.batch_size);

        Ok(Self {
            parameters,
            store,
            annotations,
            state: ValidationState::new(validator),
            start,
        })
    }

    // Create a path for `file_name` in the specified output directory, if it exists,
    // otherwise, write to current directory
    pub(crate) fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        let mut path = self.parameters.output_directory.clone();
        path.push(file_name.as_ref());
        path
    }

    /// Validate, apply manual validation, and write every configured report.
    /// Returns the run parameters, including the paths written to.
    pub fn run(mut self) -> anyhow::Result<Search> {
        let snapshot = self.state.recompute(&self.store)?;
        for level in [MatchLevel::Protein, MatchLevel::Peptide, MatchLevel::Psm] {
            let counts = snapshot.counts(level);
            let count = |l| counts.get(&l).copied().unwrap_or(0);
            info!(
                "{} level: {} confident, {} doubtful, {} not validated",
                level,
                count(ValidationLevel::Confident),
                count(ValidationLevel::Doubtful),
                count(ValidationLevel::NotValidated),
            );
        }

        for manual in &self.parameters.manual_validation {
            log::trace!(
                "manual validation of {} `{}`: {}",
                manual.level,
                manual.key,
                manual.validation
            );
            self.state
                .set_manual(manual.level, &manual.key, manual.validation);
        }

        log::trace!("writing outputs");
        let paths = self.write_reports()?;
        self.parameters.output_paths.extend(paths);
        let path = self.write_validation()?;
        self.parameters.output_paths.push(path);

        let path = self.make_path("results.json");
        self.parameters
            .output_paths
            .push(path.display().to_string());
        let bytes = serde_json::to_vec_pretty(&self.parameters)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;

        info!("finished in {}ms", self.start.elapsed().as_millis());
        Ok(self.parameters)
    }
}
