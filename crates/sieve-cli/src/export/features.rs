//! Report columns: closed sets of named features, each with its titles and a
//! resolver computing its cells for one entity.

use super::context::ExportContext;
use csv::ByteRecord;
use itertools::Itertools;
use sieve_core::identification::{
    IdentificationStore, MatchLevel, PeptideMatch, ProteinMatch, SpectrumMatch,
};
use sieve_core::Error;
use std::borrow::Cow;

/// Cell written for feature tags nobody knows how to resolve
pub const NOT_IMPLEMENTED: &str = "Not implemented";

/// Separator of multi-valued cells
pub const LIST_SEPARATOR: &str = ", ";

/// Value of one feature for one entity
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Text(String),
    /// Written sorted alphabetically, joined with `", "`
    List(Vec<String>),
    /// One cell per title of a multi-column feature
    Columns(Vec<String>),
}

impl Cell {
    pub fn empty() -> Self {
        Cell::Text(String::new())
    }

    pub fn flag(value: bool) -> Self {
        let value = match value {
            true => "1",
            false => "0",
        };
        Cell::Text(value.into())
    }

    pub fn int(value: usize) -> Self {
        Cell::Text(itoa::Buffer::new().format(value).into())
    }

    pub fn float(value: f64) -> Self {
        Cell::Text(ryu::Buffer::new().format(value).into())
    }

    /// Percentage rounded to two decimals
    pub fn percent(value: f64) -> Self {
        Cell::float(round(value, 2))
    }

    pub fn push_into(self, record: &mut ByteRecord) {
        match self {
            Cell::Text(s) => record.push_field(s.as_bytes()),
            Cell::List(values) => {
                let joined = values.iter().sorted().dedup().join(LIST_SEPARATOR);
                record.push_field(joined.as_bytes())
            }
            Cell::Columns(values) => {
                for value in values {
                    record.push_field(value.as_bytes());
                }
            }
        }
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.into())
    }
}

pub fn round(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Something a report row is written for
pub trait Entity: Clone {
    const LEVEL: MatchLevel;

    fn fetch<'s>(store: &'s dyn IdentificationStore, key: &str) -> Result<Cow<'s, Self>, Error>;

    fn key(&self) -> &str;

    fn is_decoy(&self) -> bool;
}

impl Entity for ProteinMatch {
    const LEVEL: MatchLevel = MatchLevel::Protein;

    fn fetch<'s>(store: &'s dyn IdentificationStore, key: &str) -> Result<Cow<'s, Self>, Error> {
        store.protein(key)
    }

    fn key(&self) -> &str {
        &self.key
    }

    fn is_decoy(&self) -> bool {
        self.decoy
    }
}

impl Entity for PeptideMatch {
    const LEVEL: MatchLevel = MatchLevel::Peptide;

    fn fetch<'s>(store: &'s dyn IdentificationStore, key: &str) -> Result<Cow<'s, Self>, Error> {
        store.peptide(key)
    }

    fn key(&self) -> &str {
        &self.key
    }

    fn is_decoy(&self) -> bool {
        self.decoy
    }
}

impl Entity for SpectrumMatch {
    const LEVEL: MatchLevel = MatchLevel::Psm;

    fn fetch<'s>(store: &'s dyn IdentificationStore, key: &str) -> Result<Cow<'s, Self>, Error> {
        store.spectrum_match(key)
    }

    fn key(&self) -> &str {
        &self.key
    }

    fn is_decoy(&self) -> bool {
        self.decoy
    }
}

pub type Resolver<E> = fn(&E, &ExportContext<'_>) -> Result<Cell, Error>;

/// A closed set of report columns for one kind of entity. Declaration order
/// (`Ord`) is the order columns are written in.
pub trait ExportFeature: Copy + Ord + std::fmt::Debug + Send + Sync + 'static {
    type Entity: Entity;

    const ALL: &'static [Self];

    /// Name used in configuration files
    fn name(self) -> &'static str;

    /// Column titles, one per cell written
    fn titles(self) -> &'static [&'static str];

    fn resolver(self) -> Resolver<Self::Entity>;

    fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }
}

enum Column<F: ExportFeature> {
    Known {
        feature: F,
        resolve: Resolver<F::Entity>,
    },
    /// Configured, but not a feature of this section
    Unknown(String),
}

/// The configured columns of one section, with their resolvers looked up
/// once
pub struct Section<F: ExportFeature> {
    columns: Vec<Column<F>>,
}

impl<F: ExportFeature> Section<F> {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        let mut known = Vec::new();
        let mut unknown = Vec::new();
        for name in names {
            let name = name.as_ref();
            match F::parse(name) {
                Some(feature) => known.push(feature),
                None => unknown.push(name.to_string()),
            }
        }
        known.sort();
        known.dedup();

        if !unknown.is_empty() {
            log::warn!(
                "unknown {} export features will be written as `{}`: {}",
                F::Entity::LEVEL,
                NOT_IMPLEMENTED,
                unknown.join(", ")
            );
        }

        let columns = known
            .into_iter()
            .map(|feature| Column::Known {
                feature,
                resolve: feature.resolver(),
            })
            .chain(unknown.into_iter().map(Column::Unknown))
            .collect();
        Self { columns }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn features(&self) -> impl Iterator<Item = F> + '_ {
        self.columns.iter().filter_map(|c| match c {
            Column::Known { feature, .. } => Some(*feature),
            Column::Unknown(_) => None,
        })
    }

    pub fn titles(&self) -> Vec<&str> {
        self.columns
            .iter()
            .flat_map(|c| match c {
                Column::Known { feature, .. } => feature.titles().to_vec(),
                Column::Unknown(name) => vec![name.as_str()],
            })
            .collect()
    }

    pub fn push_cells(
        &self,
        entity: &F::Entity,
        ctx: &ExportContext<'_>,
        record: &mut ByteRecord,
    ) -> Result<(), Error> {
        for column in &self.columns {
            match column {
                Column::Known { resolve, .. } => resolve(entity, ctx)?.push_into(record),
                Column::Unknown(_) => record.push_field(NOT_IMPLEMENTED.as_bytes()),
            }
        }
        Ok(())
    }
}
