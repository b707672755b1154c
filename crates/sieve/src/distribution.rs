//! Per-group target/decoy score distributions.
//!
//! Every match contributes one observation to exactly one statistically
//! independent group: all proteins share a group, peptides are grouped by
//! modification profile and PSMs by charge state. Within a group observations
//! are ranked by score, *higher is more confident*, with ties broken by match
//! key so that rankings (and everything derived from them) are reproducible.

use crate::identification::MatchLevel;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// A statistically independent population of scores
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum GroupKey {
    Protein,
    /// Peptides sharing a modification profile
    Peptide(String),
    /// PSMs of a given precursor charge
    Psm(u8),
}

impl GroupKey {
    pub fn level(&self) -> MatchLevel {
        match self {
            GroupKey::Protein => MatchLevel::Protein,
            GroupKey::Peptide(_) => MatchLevel::Peptide,
            GroupKey::Psm(_) => MatchLevel::Psm,
        }
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupKey::Protein => f.write_str("Proteins"),
            GroupKey::Peptide(profile) => write!(f, "{} Peptides", profile),
            GroupKey::Psm(charge) => write!(f, "Charge {} PSMs", charge),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub score: f64,
    pub decoy: bool,
    pub match_id: String,
}

/// An observation at its position in the ranking
#[derive(Clone, Debug, PartialEq)]
pub struct Ranked {
    pub score: f64,
    pub decoy: bool,
    pub match_id: String,
    /// Targets ranked at or above this observation
    pub targets: usize,
    /// Decoys ranked at or above this observation
    pub decoys: usize,
}

/// Collects observations for every group until all matches of a project are
/// loaded
#[derive(Default, Debug)]
pub struct ScoreTracker {
    groups: BTreeMap<GroupKey, Vec<Observation>>,
}

impl ScoreTracker {
    pub fn add_point<S: Into<String>>(
        &mut self,
        group: GroupKey,
        score: f64,
        decoy: bool,
        match_id: S,
    ) {
        let match_id = match_id.into();
        let score = match score.is_nan() {
            true => {
                log::warn!(
                    "{}: match `{}` has an undefined score, ranking it last",
                    group,
                    match_id
                );
                f64::NEG_INFINITY
            }
            false => score,
        };
        self.groups.entry(group).or_default().push(Observation {
            score,
            decoy,
            match_id,
        });
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupKey> {
        self.groups.keys()
    }

    /// Ranked observations of a single group
    pub fn ordered_scores(&self, group: &GroupKey) -> Option<ScoreDistribution> {
        self.groups
            .get(group)
            .map(|obs| ScoreDistribution::new(obs.clone()))
    }

    /// Rank every group. Groups are independent, so they are sorted in parallel
    pub fn into_distributions(self) -> BTreeMap<GroupKey, ScoreDistribution> {
        self.groups
            .into_par_iter()
            .map(|(group, obs)| (group, ScoreDistribution::new(obs)))
            .collect()
    }
}

/// A half-open range `[start, end)` of ranked observations sharing a score bin
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScoreBin {
    pub start: usize,
    pub end: usize,
    /// Highest score in the bin
    pub best: f64,
    /// Lowest score in the bin
    pub worst: f64,
}

impl ScoreBin {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    fn absorb(&mut self, next: &ScoreBin) {
        debug_assert_eq!(self.end, next.start);
        self.end = next.end;
        self.worst = next.worst;
    }
}

/// Observations of one group, ranked from most to least confident
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScoreDistribution {
    ranked: Vec<Ranked>,
}

impl ScoreDistribution {
    pub fn new(mut observations: Vec<Observation>) -> Self {
        // Stable, and totally ordered on (score, key): identical input always
        // yields an identical ranking
        observations.par_sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.match_id.cmp(&b.match_id))
        });

        let mut targets = 0;
        let mut decoys = 0;
        let ranked = observations
            .into_iter()
            .map(|obs| {
                match obs.decoy {
                    true => decoys += 1,
                    false => targets += 1,
                }
                Ranked {
                    score: obs.score,
                    decoy: obs.decoy,
                    match_id: obs.match_id,
                    targets,
                    decoys,
                }
            })
            .collect();

        Self { ranked }
    }

    /// Iterate over the ranking, most confident first. May be called any
    /// number of times
    pub fn iter(&self) -> std::slice::Iter<'_, Ranked> {
        self.ranked.iter()
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    /// Size of the target population
    pub fn targets(&self) -> usize {
        self.ranked.last().map(|r| r.targets).unwrap_or(0)
    }

    pub fn decoys(&self) -> usize {
        self.ranked.last().map(|r| r.decoys).unwrap_or(0)
    }

    /// (targets, decoys) ranked strictly above position `ix`, `ix <= len`
    pub fn counts_before(&self, ix: usize) -> (usize, usize) {
        match ix {
            0 => (0, 0),
            _ => {
                let r = &self.ranked[ix - 1];
                (r.targets, r.decoys)
            }
        }
    }

    /// Runs of identical scores. Observations sharing a score can never be
    /// separated by a threshold, so they form the finest possible bins
    pub fn bins(&self) -> Vec<ScoreBin> {
        let mut bins: Vec<ScoreBin> = Vec::new();
        for (ix, r) in self.ranked.iter().enumerate() {
            match bins.last_mut() {
                Some(bin) if bin.worst == r.score => bin.end = ix + 1,
                _ => bins.push(ScoreBin {
                    start: ix,
                    end: ix + 1,
                    best: r.score,
                    worst: r.score,
                }),
            }
        }
        bins
    }
}

/// Merge adjacent bins until each holds at least `min_size` observations.
/// A short remainder at the least confident end is folded into the last full
/// bin.
pub fn coarsen(bins: &[ScoreBin], min_size: usize) -> Vec<ScoreBin> {
    let mut merged: Vec<ScoreBin> = Vec::new();
    let mut pending: Option<ScoreBin> = None;
    for bin in bins {
        let acc = match pending.take() {
            Some(mut acc) => {
                acc.absorb(bin);
                acc
            }
            None => *bin,
        };
        if acc.len() >= min_size {
            merged.push(acc);
        } else {
            pending = Some(acc);
        }
    }
    if let Some(rest) = pending {
        match merged.last_mut() {
            Some(last) => last.absorb(&rest),
            None => merged.push(rest),
        }
    }
    merged
}
