//! Target-decoy estimation of FDR, FNR and posterior error probabilities.
//!
//! A group's ranked scores are cut into bins (runs of tied scores, coarsened
//! when decoys are scarce). For every bin we know the cumulative number of
//! targets `T` and decoys `D` ranked at or above it, which yields the FDR, and
//! the local decoy density in a window around it, which yields the PEP.
//!
//! Elias & Gygi, 2007 [https://pubmed.ncbi.nlm.nih.gov/17327847/]
//! Käll, 2008 [https://pubmed.ncbi.nlm.nih.gov/18052118/]

use crate::distribution::{coarsen, GroupKey, ScoreDistribution};
use serde::{Deserialize, Serialize};

/// How decoy hits relate to false target hits
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FdrStrategy {
    /// Targets and decoys searched separately: `FDR = D / (T + D)`
    Separate,
    /// One concatenated target-decoy database, where every decoy hit stands
    /// for a second, hidden, false target hit: `FDR = 2D / (T + D)`
    Concatenated,
}

impl FdrStrategy {
    /// Estimated percentage of false entries among `targets + decoys`
    pub fn fdr(self, targets: usize, decoys: usize) -> f64 {
        let n = targets + decoys;
        if n == 0 {
            return 0.0;
        }
        let false_hits = match self {
            FdrStrategy::Separate => decoys as f64,
            FdrStrategy::Concatenated => 2.0 * decoys as f64,
        };
        (100.0 * false_hits / n as f64).min(100.0)
    }
}

/// Width of the sliding window used to estimate local decoy density
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingWindow {
    /// Size the window so it is expected to contain `decoys_per_window` decoys
    Auto { decoys_per_window: usize },
    /// Fixed number of observations on either side of a bin
    Fixed { half_width: usize },
}

impl SmoothingWindow {
    pub fn half_width(self, observations: usize, decoys: usize) -> usize {
        match self {
            SmoothingWindow::Fixed { half_width } => half_width,
            SmoothingWindow::Auto { .. } if decoys == 0 => 0,
            SmoothingWindow::Auto { decoys_per_window } => {
                let width = decoys_per_window.saturating_mul(observations);
                width.saturating_add(2 * decoys - 1) / (2 * decoys)
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    pub strategy: FdrStrategy,
    /// Groups with fewer decoys than this have their score bins coarsened
    pub min_decoys: usize,
    pub window: SmoothingWindow,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            strategy: FdrStrategy::Separate,
            min_decoys: 10,
            window: SmoothingWindow::Auto {
                decoys_per_window: 5,
            },
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    Stable,
    /// Few decoys; bins were coarsened
    Sparse,
    /// No decoys at all; FDR and PEP are reported as 0 but mean nothing
    NoDecoys,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct CurvePoint {
    /// Highest score in the bin
    pub best_score: f64,
    /// Lowest score in the bin
    pub worst_score: f64,
    /// Targets in the bin
    pub bin_targets: usize,
    /// Targets ranked at or above the end of the bin
    pub targets: usize,
    /// Decoys ranked at or above the end of the bin
    pub decoys: usize,
    /// Posterior error probability, percent
    pub pep: f64,
    /// FDR when accepting everything up to the end of this bin, percent
    pub fdr: f64,
}

impl CurvePoint {
    pub fn confidence(&self) -> f64 {
        100.0 - self.pep
    }
}

/// Immutable summary of a group at a desired FDR
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct TargetDecoyResults {
    pub desired_fdr: f64,
    /// Lowest confidence accepted, percent
    pub confidence_limit: f64,
    pub fdr_limit: f64,
    pub fnr_limit: f64,
    pub pep_limit: f64,
    /// Targets accepted
    pub n_tp_total: usize,
    /// Entries accepted, targets and decoys
    pub n: usize,
    /// Size of the target population
    pub n_max: usize,
    pub reliability: Reliability,
}

impl TargetDecoyResults {
    /// Smallest non-zero percentage of the target population that can be
    /// resolved, `100 / n_max`
    pub fn min_achievable_percent(&self) -> f64 {
        match self.n_max {
            0 => 0.0,
            n => 100.0 / n as f64,
        }
    }

    /// Does the operating point accept anything?
    pub fn accepts_any(&self) -> bool {
        self.n > 0
    }

    pub fn is_reliable(&self) -> bool {
        self.reliability != Reliability::NoDecoys
    }
}

/// Confidence, PEP and FDR along a group's ranking
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TargetDecoyCurve {
    points: Vec<CurvePoint>,
    reliability: Reliability,
    targets: usize,
    decoys: usize,
}

impl TargetDecoyCurve {
    pub fn build(distribution: &ScoreDistribution, parameters: &Parameters) -> Self {
        let n = distribution.len();
        let targets = distribution.targets();
        let decoys = distribution.decoys();

        let reliability = match decoys {
            0 => Reliability::NoDecoys,
            d if d < parameters.min_decoys => Reliability::Sparse,
            _ => Reliability::Stable,
        };

        let bins = match reliability {
            // Aim for roughly one decoy per bin
            Reliability::Sparse => coarsen(&distribution.bins(), (n + decoys - 1) / decoys),
            _ => distribution.bins(),
        };
        let half_width = parameters.window.half_width(n, decoys);
        let strategy = parameters.strategy;

        let mut points = bins
            .iter()
            .map(|bin| {
                let (t_start, _) = distribution.counts_before(bin.start);
                let (t_end, d_end) = distribution.counts_before(bin.end);

                let (pep, fdr) = match reliability {
                    Reliability::NoDecoys => (0.0, 0.0),
                    _ => {
                        // The window always covers the whole bin
                        let center = bin.start + (bin.len() - 1) / 2;
                        let lo = bin.start.min(center.saturating_sub(half_width));
                        let hi = bin
                            .end
                            .max(center.saturating_add(half_width).saturating_add(1).min(n));
                        let (t_lo, d_lo) = distribution.counts_before(lo);
                        let (t_hi, d_hi) = distribution.counts_before(hi);
                        (
                            strategy.fdr(t_hi - t_lo, d_hi - d_lo),
                            strategy.fdr(t_end, d_end),
                        )
                    }
                };

                CurvePoint {
                    best_score: bin.best,
                    worst_score: bin.worst,
                    bin_targets: t_end - t_start,
                    targets: t_end,
                    decoys: d_end,
                    pep,
                    fdr,
                }
            })
            .collect::<Vec<_>>();

        // Make PEP monotonically increasing down the ranking, removing noise
        // inversions
        points.iter_mut().fold(0.0f64, |acc, point| {
            point.pep = acc.max(point.pep);
            point.pep
        });

        Self {
            points,
            reliability,
            targets,
            decoys,
        }
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    pub fn reliability(&self) -> Reliability {
        self.reliability
    }

    /// Curve point covering `score`
    pub fn point(&self, score: f64) -> Option<&CurvePoint> {
        let ix = self
            .points
            .partition_point(|p| p.worst_score.total_cmp(&score).is_gt());
        self.points.get(ix).or_else(|| self.points.last())
    }

    /// Posterior error probability, percent, implied by `score`
    pub fn pep(&self, score: f64) -> f64 {
        self.point(score).map(|p| p.pep).unwrap_or(100.0)
    }

    pub fn confidence(&self, score: f64) -> f64 {
        100.0 - self.pep(score)
    }

    /// Locate the operating point for `desired_fdr` (percent): scanning from
    /// the most confident bin, stop at the first bin exceeding the desired
    /// FDR and accept everything above it.
    pub fn results(&self, desired_fdr: f64) -> TargetDecoyResults {
        let cutoff = self
            .points
            .iter()
            .position(|p| p.fdr > desired_fdr)
            .unwrap_or(self.points.len());

        let true_positives = |points: &[CurvePoint]| {
            points
                .iter()
                .map(|p| p.bin_targets as f64 * (1.0 - p.pep / 100.0))
                .sum::<f64>()
        };
        let tp_all = true_positives(&self.points);
        let tp_accepted = true_positives(&self.points[..cutoff]);
        let fnr_limit = match tp_all > 0.0 {
            true => (100.0 * (tp_all - tp_accepted) / tp_all).max(0.0),
            false => 0.0,
        };

        match cutoff.checked_sub(1).map(|ix| &self.points[ix]) {
            Some(point) => TargetDecoyResults {
                desired_fdr,
                confidence_limit: point.confidence(),
                fdr_limit: point.fdr,
                fnr_limit,
                pep_limit: point.pep,
                n_tp_total: point.targets,
                n: point.targets + point.decoys,
                n_max: self.targets,
                reliability: self.reliability,
            },
            None => TargetDecoyResults {
                desired_fdr,
                confidence_limit: 100.0,
                fdr_limit: 0.0,
                fnr_limit,
                pep_limit: 0.0,
                n_tp_total: 0,
                n: 0,
                n_max: self.targets,
                reliability: self.reliability,
            },
        }
    }
}

/// Compute the target-decoy results of a single group
pub fn compute(
    group: &GroupKey,
    distribution: &ScoreDistribution,
    parameters: &Parameters,
    desired_fdr: f64,
) -> TargetDecoyResults {
    let curve = TargetDecoyCurve::build(distribution, parameters);
    let results = curve.results(desired_fdr);
    log::debug!(
        "{}: {} of {} targets accepted at {}% FDR ({} decoys, {:?})",
        group,
        results.n_tp_total,
        results.n_max,
        desired_fdr,
        curve.decoys,
        curve.reliability
    );
    results
}
