use crate::distribution::GroupKey;
use crate::identification::MatchLevel;
use crate::target_decoy::{TargetDecoyCurve, TargetDecoyResults};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    NotValidated,
    Doubtful,
    Confident,
}

impl ValidationLevel {
    pub fn is_validated(self) -> bool {
        self != ValidationLevel::NotValidated
    }
}

impl std::fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationLevel::NotValidated => f.write_str("Not Validated"),
            ValidationLevel::Doubtful => f.write_str("Doubtful"),
            ValidationLevel::Confident => f.write_str("Confident"),
        }
    }
}

/// Validation of a single match
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MatchValidation {
    /// Level reported for the match
    pub level: ValidationLevel,
    /// Level implied by the curve, kept even when overridden
    pub automatic: ValidationLevel,
    pub manual_override: bool,
}

impl MatchValidation {
    pub fn automatic(level: ValidationLevel) -> Self {
        Self {
            level,
            automatic: level,
            manual_override: false,
        }
    }

    pub fn manual(level: ValidationLevel, automatic: ValidationLevel) -> Self {
        Self {
            level,
            automatic,
            manual_override: true,
        }
    }
}

/// FDR thresholds (percent) for one match level
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Matches at or above the operating point for this FDR are confident
    pub fdr: f64,
    /// Wider FDR; matches between the two operating points are doubtful
    pub doubtful_fdr: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            fdr: 1.0,
            doubtful_fdr: 5.0,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelThresholds {
    pub protein: Thresholds,
    pub peptide: Thresholds,
    pub psm: Thresholds,
}

impl LevelThresholds {
    pub fn level(&self, level: MatchLevel) -> Thresholds {
        match level {
            MatchLevel::Protein => self.protein,
            MatchLevel::Peptide => self.peptide,
            MatchLevel::Psm => self.psm,
        }
    }

    pub fn group(&self, group: &GroupKey) -> Thresholds {
        self.level(group.level())
    }
}

/// Assigns validation levels from a group's curve and its two operating
/// points
pub struct Classifier<'a> {
    pub curve: &'a TargetDecoyCurve,
    pub confident: &'a TargetDecoyResults,
    pub doubtful: &'a TargetDecoyResults,
}

impl<'a> Classifier<'a> {
    /// Level implied by a posterior error probability (percent). An operating
    /// point that accepts nothing validates nothing.
    pub fn automatic_level(&self, pep: f64) -> ValidationLevel {
        if self.confident.accepts_any() && pep <= self.confident.pep_limit {
            ValidationLevel::Confident
        } else if self.doubtful.accepts_any() && pep <= self.doubtful.pep_limit {
            ValidationLevel::Doubtful
        } else {
            ValidationLevel::NotValidated
        }
    }

    pub fn classify(&self, score: f64, manual: Option<ValidationLevel>) -> MatchValidation {
        let automatic = self.automatic_level(self.curve.pep(score));
        match manual {
            Some(level) => MatchValidation::manual(level, automatic),
            None => MatchValidation::automatic(automatic),
        }
    }
}
