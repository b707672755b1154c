use crate::export::context::ExportContext;
use crate::export::progress::LogProgress;
use crate::export::validation::ValidationSection;
use crate::export::{ExportOutcome, ExportWriter, ReportSection};
use crate::input::ReportOptions;
use crate::runner::Runner;
use anyhow::Context;
use rayon::prelude::*;
use sieve_core::identification::IdentificationStore;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

impl Runner {
    pub fn write_report(&self, report: &ReportOptions) -> anyhow::Result<Option<String>> {
        let section = match ReportSection::new(
            report.protein.as_slice(),
            report.peptide.as_slice(),
            report.psm.as_slice(),
        ) {
            Some(section) => section,
            None => return Ok(None),
        };
        let path = self.make_path(&report.file);

        let snapshot = self.state.snapshot();
        let ctx = ExportContext {
            store: &self.store,
            snapshot: &snapshot,
            annotations: self.annotations.as_ref(),
            surrounding_aas: self.parameters.export.settings.surrounding_aas,
        };
        let settings = &self.parameters.export.settings;
        let total = self.store.keys(section.level())?.len();
        let progress = LogProgress::new(&report.file, total);

        // Rows are streamed to disk: whatever was written before a failure stays
        let mut wtr = ExportWriter::new(create(&path)?, settings.separator);
        let outcome = section
            .write(None, &ctx, settings, &mut wtr, &progress)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;
        if let ExportOutcome::Canceled { rows } = outcome {
            log::warn!("{}: export canceled after {} rows", report.file, rows);
        }
        log::info!("- {}: {} rows", report.file, outcome.rows());

        wtr.into_inner()?.flush()?;
        Ok(Some(path.display().to_string()))
    }

    /// Reports are independent of each other and written in parallel
    pub fn write_reports(&self) -> anyhow::Result<Vec<String>> {
        let paths = self
            .parameters
            .export
            .reports
            .par_iter()
            .map(|report| self.write_report(report))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(paths.into_iter().flatten().collect())
    }

    pub fn write_validation(&self) -> anyhow::Result<String> {
        let path = self.make_path("validation.tsv");
        let section = ValidationSection::new(self.parameters.export.validation_features.as_slice());
        let settings = &self.parameters.export.settings;

        let mut wtr = ExportWriter::new(create(&path)?, settings.separator);
        section
            .write(&self.state.snapshot(), settings, &mut wtr)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;

        wtr.into_inner()?.flush()?;
        Ok(path.display().to_string())
    }
}

fn create(path: &Path) -> anyhow::Result<BufWriter<File>> {
    let file =
        File::create(path).with_context(|| format!("Failed to create `{}`", path.display()))?;
    Ok(BufWriter::new(file))
}
