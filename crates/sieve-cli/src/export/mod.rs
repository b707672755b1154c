//! Hierarchical protein -> peptide -> PSM reports.
//!
//! A [`ReportSection`] writes one row per accepted entity, followed
//! depth-first by the rows of its children in the nested section. Rows can be
//! indexed: `1, 2, ...` at the top level, `2.1, 2.2, ...` below row `2`.

pub mod context;
pub mod features;
pub mod peptide;
pub mod progress;
pub mod protein;
pub mod psm;
pub mod validation;

use context::ExportContext;
use csv::ByteRecord;
use features::{Entity, ExportFeature, Section};
use peptide::PeptideFeature;
use progress::WaitingHandler;
use protein::ProteinFeature;
use psm::PsmFeature;
use serde::{Deserialize, Serialize};
use sieve_core::identification::MatchLevel;
use sieve_core::Error;
use std::io::Write;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub separator: u8,
    /// Prefix every row with its index
    pub indexes: bool,
    pub header: bool,
    pub validated_only: bool,
    pub include_decoys: bool,
    /// Number of matches requested from the store at once
    pub batch_size: usize,
    /// Residues reported on either side of a peptide
    pub surrounding_aas: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            separator: b'\t',
            indexes: true,
            header: true,
            validated_only: false,
            include_decoys: false,
            batch_size: 1000,
            surrounding_aas: 1,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    Completed { rows: usize },
    /// Stopped early; every row written before is complete
    Canceled { rows: usize },
}

impl ExportOutcome {
    pub fn rows(self) -> usize {
        match self {
            ExportOutcome::Completed { rows } | ExportOutcome::Canceled { rows } => rows,
        }
    }
}

/// Delimited output, counting the data rows written
pub struct ExportWriter<W: Write> {
    inner: csv::Writer<W>,
    rows: usize,
}

impl<W: Write> ExportWriter<W> {
    pub fn new(writer: W, separator: u8) -> Self {
        let inner = csv::WriterBuilder::new()
            .delimiter(separator)
            .flexible(true)
            .from_writer(writer);
        Self { inner, rows: 0 }
    }

    pub fn write_header<'a, I: IntoIterator<Item = &'a str>>(
        &mut self,
        indexes: bool,
        titles: I,
    ) -> csv::Result<()> {
        let mut record = ByteRecord::new();
        if indexes {
            record.push_field(b"");
        }
        for title in titles {
            record.push_field(title.as_bytes());
        }
        self.inner.write_byte_record(&record)
    }

    pub fn write_row(&mut self, record: &ByteRecord) -> csv::Result<()> {
        self.inner.write_byte_record(record)?;
        self.rows += 1;
        Ok(())
    }

    /// Data rows written so far, headers excluded
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> anyhow::Result<W> {
        self.inner
            .into_inner()
            .map_err(|e| anyhow::anyhow!("failed to flush report: {}", e.error()))
    }
}

/// The columns of one section, independent of the entity type
trait Columns: Send + Sync {
    fn level(&self) -> MatchLevel;

    fn titles(&self) -> Vec<&str>;

    fn is_empty(&self) -> bool;

    /// Append the cells of entity `key` to `record`, or return `false` if the
    /// entity is filtered out
    fn row(
        &self,
        key: &str,
        ctx: &ExportContext<'_>,
        settings: &Settings,
        record: &mut ByteRecord,
    ) -> Result<bool, Error>;
}

impl<F: ExportFeature> Columns for Section<F> {
    fn level(&self) -> MatchLevel {
        F::Entity::LEVEL
    }

    fn titles(&self) -> Vec<&str> {
        Section::titles(self)
    }

    fn is_empty(&self) -> bool {
        Section::is_empty(self)
    }

    fn row(
        &self,
        key: &str,
        ctx: &ExportContext<'_>,
        settings: &Settings,
        record: &mut ByteRecord,
    ) -> Result<bool, Error> {
        let entity = F::Entity::fetch(ctx.store, key)?;
        if entity.is_decoy() && !settings.include_decoys {
            return Ok(false);
        }
        if settings.validated_only && !ctx.is_validated(F::Entity::LEVEL, entity.key()) {
            return Ok(false);
        }
        self.push_cells(&entity, ctx, record)?;
        Ok(true)
    }
}

/// Features of one entity type, and optionally the section of its children
pub struct ReportSection {
    columns: Box<dyn Columns>,
    nested: Option<Box<ReportSection>>,
}

impl ReportSection {
    /// Build a report from configured feature names. The highest level with
    /// features becomes the top section; lower levels nest below it, with an
    /// empty peptide section bridging proteins and PSMs if needed. Returns
    /// `None` if no feature is configured at all.
    pub fn new<S: AsRef<str>>(protein: &[S], peptide: &[S], psm: &[S]) -> Option<Self> {
        let psms = (!psm.is_empty()).then(|| Self::leaf(Section::<PsmFeature>::new(psm)));
        let peptides = match (peptide.is_empty(), psms) {
            (true, None) => None,
            (true, Some(psms)) if protein.is_empty() => Some(psms),
            (_, psms) => Some(ReportSection {
                columns: Box::new(Section::<PeptideFeature>::new(peptide)),
                nested: psms.map(Box::new),
            }),
        };
        match (protein.is_empty(), peptides) {
            (true, peptides) => peptides,
            (false, peptides) => Some(ReportSection {
                columns: Box::new(Section::<ProteinFeature>::new(protein)),
                nested: peptides.map(Box::new),
            }),
        }
    }

    fn leaf<C: Columns + 'static>(columns: C) -> Self {
        Self {
            columns: Box::new(columns),
            nested: None,
        }
    }

    pub fn level(&self) -> MatchLevel {
        self.columns.level()
    }

    pub fn nested(&self) -> Option<&ReportSection> {
        self.nested.as_deref()
    }

    /// Number of cells of every row of this section, index excluded
    pub fn width(&self) -> usize {
        self.columns.titles().len()
    }

    pub fn titles(&self) -> Vec<&str> {
        self.columns.titles()
    }

    /// Write the section for `keys`, or for every match of the section's level
    /// if `keys` is `None`. Cancellation is checked before each entity.
    pub fn write<W: Write>(
        &self,
        keys: Option<Vec<String>>,
        ctx: &ExportContext<'_>,
        settings: &Settings,
        writer: &mut ExportWriter<W>,
        progress: &dyn WaitingHandler,
    ) -> anyhow::Result<ExportOutcome> {
        progress.set_indeterminate(true);
        if settings.header {
            writer.write_header(settings.indexes, self.titles())?;
        }
        let keys = match keys {
            Some(keys) => keys,
            None => ctx.store.keys(self.level())?,
        };
        progress.set_indeterminate(false);

        let mut line = 1;
        let mut record = ByteRecord::new();
        for batch in keys.chunks(settings.batch_size.max(1)) {
            ctx.store.load_matches(self.level(), batch)?;
            for key in batch {
                if progress.is_canceled() {
                    writer.flush()?;
                    log::info!("export canceled after {} rows", writer.rows());
                    return Ok(ExportOutcome::Canceled {
                        rows: writer.rows(),
                    });
                }
                progress.increment();
                let index = line.to_string();
                if self.write_entity(key, &index, ctx, settings, writer, &mut record)? {
                    line += 1;
                }
            }
        }
        writer.flush()?;
        Ok(ExportOutcome::Completed {
            rows: writer.rows(),
        })
    }

    /// Write one entity row and its nested rows. Returns `false` if the
    /// entity was filtered out.
    fn write_entity<W: Write>(
        &self,
        key: &str,
        index: &str,
        ctx: &ExportContext<'_>,
        settings: &Settings,
        writer: &mut ExportWriter<W>,
        record: &mut ByteRecord,
    ) -> anyhow::Result<bool> {
        record.clear();
        if settings.indexes {
            record.push_field(index.as_bytes());
        }
        if !self.columns.row(key, ctx, settings, record)? {
            return Ok(false);
        }
        // A section without columns only holds the index of its children
        if !self.columns.is_empty() || settings.indexes {
            writer.write_row(record)?;
        }

        if let Some(nested) = &self.nested {
            let children = ctx.store.child_keys(self.level(), key)?;
            nested.write_children(&children, index, ctx, settings, writer, record)?;
        }
        Ok(true)
    }

    /// Children are written without a header, indexed `prefix.1`, `prefix.2`..
    fn write_children<W: Write>(
        &self,
        keys: &[String],
        prefix: &str,
        ctx: &ExportContext<'_>,
        settings: &Settings,
        writer: &mut ExportWriter<W>,
        record: &mut ByteRecord,
    ) -> anyhow::Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        ctx.store.load_matches(self.level(), keys)?;
        let mut counter = 1;
        for key in keys {
            let index = format!("{}.{}", prefix, counter);
            if self.write_entity(key, &index, ctx, settings, writer, record)? {
                counter += 1;
            }
        }
        Ok(())
    }
}
