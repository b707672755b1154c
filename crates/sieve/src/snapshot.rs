//! Validation of a whole project, published as immutable snapshots.
//!
//! A [`Validator`] pass reads every match from the store, ranks the scores of
//! each group, computes one [`TargetDecoyMap`] per group and classifies every
//! match. [`ValidationState`] swaps whole snapshots behind an `Arc`: a reader
//! holding a snapshot keeps seeing it unchanged while a new one is computed.

use crate::distribution::{GroupKey, ScoreDistribution, ScoreTracker};
use crate::identification::{IdentificationStore, MatchLevel};
use crate::target_decoy::{self, TargetDecoyCurve, TargetDecoyResults};
use crate::validation::{
    Classifier, LevelThresholds, MatchValidation, Thresholds, ValidationLevel,
};
use crate::Error;
use fnv::FnvHashMap;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

/// Curve and operating points of one group
#[derive(Clone, Debug)]
pub struct TargetDecoyMap {
    pub distribution: ScoreDistribution,
    pub curve: TargetDecoyCurve,
    /// Operating point at the confident FDR
    pub results: TargetDecoyResults,
    /// Operating point at the doubtful FDR
    pub doubtful: TargetDecoyResults,
}

impl TargetDecoyMap {
    pub fn new(
        distribution: ScoreDistribution,
        parameters: &target_decoy::Parameters,
        thresholds: Thresholds,
    ) -> Self {
        let curve = TargetDecoyCurve::build(&distribution, parameters);
        let results = curve.results(thresholds.fdr);
        let doubtful = curve.results(thresholds.doubtful_fdr);
        Self {
            distribution,
            curve,
            results,
            doubtful,
        }
    }

    pub fn classifier(&self) -> Classifier<'_> {
        Classifier {
            curve: &self.curve,
            confident: &self.results,
            doubtful: &self.doubtful,
        }
    }
}

/// Validation derived for a single match
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchParameters {
    pub group: GroupKey,
    pub score: f64,
    /// Posterior error probability, percent
    pub pep: f64,
    pub confidence: f64,
    pub validation: MatchValidation,
}

/// Manual validation levels, by match
pub type Overrides = FnvHashMap<(MatchLevel, String), ValidationLevel>;

#[derive(Clone, Debug, Default)]
pub struct ValidationSnapshot {
    maps: BTreeMap<GroupKey, Arc<TargetDecoyMap>>,
    proteins: FnvHashMap<String, MatchParameters>,
    peptides: FnvHashMap<String, MatchParameters>,
    psms: FnvHashMap<String, MatchParameters>,
}

impl ValidationSnapshot {
    /// Every group, proteins first, then peptide profiles, then charges
    pub fn maps(&self) -> impl Iterator<Item = (&GroupKey, &TargetDecoyMap)> {
        self.maps.iter().map(|(k, v)| (k, v.as_ref()))
    }

    pub fn map(&self, group: &GroupKey) -> Option<&TargetDecoyMap> {
        self.maps.get(group).map(Arc::as_ref)
    }

    fn level_mut(&mut self, level: MatchLevel) -> &mut FnvHashMap<String, MatchParameters> {
        match level {
            MatchLevel::Protein => &mut self.proteins,
            MatchLevel::Peptide => &mut self.peptides,
            MatchLevel::Psm => &mut self.psms,
        }
    }

    pub fn parameters(&self, level: MatchLevel, key: &str) -> Option<&MatchParameters> {
        match level {
            MatchLevel::Protein => self.proteins.get(key),
            MatchLevel::Peptide => self.peptides.get(key),
            MatchLevel::Psm => self.psms.get(key),
        }
    }

    /// Reported validation level, `NotValidated` for unknown matches
    pub fn level(&self, level: MatchLevel, key: &str) -> ValidationLevel {
        self.parameters(level, key)
            .map(|p| p.validation.level)
            .unwrap_or(ValidationLevel::NotValidated)
    }

    pub fn is_validated(&self, level: MatchLevel, key: &str) -> bool {
        self.level(level, key).is_validated()
    }

    /// Number of matches at `level` per reported validation level
    pub fn counts(&self, level: MatchLevel) -> BTreeMap<ValidationLevel, usize> {
        let params = match level {
            MatchLevel::Protein => &self.proteins,
            MatchLevel::Peptide => &self.peptides,
            MatchLevel::Psm => &self.psms,
        };
        let mut counts = BTreeMap::new();
        for p in params.values() {
            *counts.entry(p.validation.level).or_insert(0) += 1;
        }
        counts
    }

    fn apply_override(&mut self, level: MatchLevel, key: &str, manual: Option<ValidationLevel>) {
        match self.level_mut(level).get_mut(key) {
            Some(params) => {
                let automatic = params.validation.automatic;
                params.validation = match manual {
                    Some(manual) => MatchValidation::manual(manual, automatic),
                    None => MatchValidation::automatic(automatic),
                };
            }
            None => log::warn!("cannot override validation of unknown {} `{}`", level, key),
        }
    }
}

/// Runs the full validation pass over a project
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Validator {
    pub parameters: target_decoy::Parameters,
    pub thresholds: LevelThresholds,
    /// Number of matches requested from the store at once
    pub batch_size: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            parameters: target_decoy::Parameters::default(),
            thresholds: LevelThresholds::default(),
            batch_size: 1000,
        }
    }
}

struct Scored {
    level: MatchLevel,
    key: String,
    group: GroupKey,
    score: f64,
}

impl Validator {
    /// Read every match, recording its score in the tracker
    fn collect(
        &self,
        store: &dyn IdentificationStore,
        tracker: &mut ScoreTracker,
    ) -> Result<Vec<Scored>, Error> {
        let batch_size = self.batch_size.max(1);
        let mut scored = Vec::new();
        for level in [MatchLevel::Protein, MatchLevel::Peptide, MatchLevel::Psm] {
            let keys = store.keys(level)?;
            for batch in keys.chunks(batch_size) {
                store.load_matches(level, batch)?;
                for key in batch {
                    let (group, score, decoy) = match level {
                        MatchLevel::Protein => {
                            let p = store.protein(key)?;
                            (GroupKey::Protein, p.score, p.decoy)
                        }
                        MatchLevel::Peptide => {
                            let p = store.peptide(key)?;
                            let profile = p.modification_profile();
                            (GroupKey::Peptide(profile), p.score, p.decoy)
                        }
                        MatchLevel::Psm => {
                            let p = store.spectrum_match(key)?;
                            (GroupKey::Psm(p.charge), p.score, p.decoy)
                        }
                    };
                    tracker.add_point(group.clone(), score, decoy, key.as_str());
                    scored.push(Scored {
                        level,
                        key: key.clone(),
                        group,
                        // Undefined scores rank last
                        score: match score.is_nan() {
                            true => f64::NEG_INFINITY,
                            false => score,
                        },
                    });
                }
            }
        }
        Ok(scored)
    }

    pub fn validate(
        &self,
        store: &dyn IdentificationStore,
        overrides: &Overrides,
    ) -> Result<ValidationSnapshot, Error> {
        let start = Instant::now();
        let mut tracker = ScoreTracker::default();
        let scored = self.collect(store, &mut tracker)?;

        let maps = tracker
            .into_distributions()
            .into_par_iter()
            .map(|(group, distribution)| {
                let thresholds = self.thresholds.group(&group);
                let map = TargetDecoyMap::new(distribution, &self.parameters, thresholds);
                (group, Arc::new(map))
            })
            .collect::<BTreeMap<_, _>>();

        let mut snapshot = ValidationSnapshot {
            maps,
            ..Default::default()
        };

        for Scored {
            level,
            key,
            group,
            score,
        } in scored
        {
            // Every scored match contributed a point to its group
            let map = match snapshot.maps.get(&group) {
                Some(map) => Arc::clone(map),
                None => continue,
            };
            let pep = map.curve.pep(score);
            let manual = overrides.get(&(level, key.clone())).copied();
            let params = MatchParameters {
                group,
                score,
                pep,
                confidence: 100.0 - pep,
                validation: map.classifier().classify(score, manual),
            };
            snapshot.level_mut(level).insert(key, params);
        }

        for (group, map) in snapshot.maps() {
            let results = &map.results;
            log::info!(
                "{}: {} of {} targets validated at {}% FDR, confidence >= {:.2}%",
                group,
                results.n_tp_total,
                results.n_max,
                results.desired_fdr,
                results.confidence_limit
            );
            if !results.is_reliable() {
                log::warn!("{}: no decoys, FDR cannot be estimated", group);
            }
        }
        log::trace!("validation: {}ms", start.elapsed().as_millis());

        Ok(snapshot)
    }
}

/// The current validation of a project, and the manual overrides applied to it
pub struct ValidationState {
    validator: Mutex<Validator>,
    current: RwLock<Arc<ValidationSnapshot>>,
    overrides: Mutex<Overrides>,
}

impl ValidationState {
    pub fn new(validator: Validator) -> Self {
        Self {
            validator: Mutex::new(validator),
            current: RwLock::new(Arc::default()),
            overrides: Mutex::default(),
        }
    }

    /// The latest published snapshot
    pub fn snapshot(&self) -> Arc<ValidationSnapshot> {
        let current = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&current)
    }

    pub fn validator(&self) -> Validator {
        *self.validator.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace thresholds and parameters used by the next recompute
    pub fn set_validator(&self, validator: Validator) {
        *self.validator.lock().unwrap_or_else(|e| e.into_inner()) = validator;
    }

    fn publish(&self, snapshot: ValidationSnapshot) -> Arc<ValidationSnapshot> {
        let snapshot = Arc::new(snapshot);
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = Arc::clone(&snapshot);
        snapshot
    }

    /// Validate the whole project again. Manual overrides are carried over
    pub fn recompute(
        &self,
        store: &dyn IdentificationStore,
    ) -> Result<Arc<ValidationSnapshot>, Error> {
        let mut snapshot = self.validator().validate(store, &Overrides::default())?;

        // Overrides set while validating are applied too
        let overrides = self.overrides.lock().unwrap_or_else(|e| e.into_inner());
        for ((level, key), manual) in overrides.iter() {
            snapshot.apply_override(*level, key, Some(*manual));
        }
        Ok(self.publish(snapshot))
    }

    fn update(&self, level: MatchLevel, key: &str, manual: Option<ValidationLevel>) {
        let mut overrides = self.overrides.lock().unwrap_or_else(|e| e.into_inner());
        match manual {
            Some(manual) => overrides.insert((level, key.to_string()), manual),
            None => overrides.remove(&(level, key.to_string())),
        };
        let mut snapshot = (*self.snapshot()).clone();
        snapshot.apply_override(level, key, manual);
        self.publish(snapshot);
    }

    pub fn set_manual(&self, level: MatchLevel, key: &str, validation: ValidationLevel) {
        self.update(level, key, Some(validation))
    }

    /// Restore the automatic validation level of a match
    pub fn clear_manual(&self, level: MatchLevel, key: &str) {
        self.update(level, key, None)
    }

    pub fn overrides(&self) -> Overrides {
        self.overrides
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::identification::*;

    /// 40 protein -> peptide -> PSM chains with descending scores: 20 targets,
    /// then decoys at every even rank
    fn store() -> MemoryStore {
        let mut ids = Identifications::default();
        for ix in 0..40usize {
            let decoy = ix >= 20 && ix % 2 == 0;
            let score = 100.0 - ix as f64;
            ids.proteins.push(ProteinMatch {
                key: format!("prot{:02}", ix),
                accessions: vec![format!("P{:05}", ix)],
                main_accession: None,
                decoy,
                score,
                peptides: vec![format!("pep{:02}", ix)],
                inference: ProteinInference::Single,
                starred: false,
                hidden: false,
            });
            ids.peptides.push(PeptideMatch {
                key: format!("pep{:02}", ix),
                sequence: "PEPTIDE".into(),
                modifications: vec![],
                proteins: vec![format!("P{:05}", ix)],
                decoy,
                score,
                psms: vec![format!("psm{:02}", ix)],
                starred: false,
                hidden: false,
            });
            ids.spectrum_matches.push(SpectrumMatch {
                key: format!("psm{:02}", ix),
                spectrum_file: "run.mzML".into(),
                spectrum_title: format!("scan={}", ix),
                peptide: format!("pep{:02}", ix),
                charge: 2,
                precursor_mz: 400.0,
                retention_time: 10.0,
                mass_error_ppm: 1.0,
                decoy,
                score,
                starred: false,
                hidden: false,
            });
        }
        MemoryStore::new(ids).unwrap()
    }

    fn validator() -> Validator {
        Validator {
            batch_size: 7,
            ..Default::default()
        }
    }

    #[test]
    fn validate_project() {
        let store = store();
        let snapshot = validator().validate(&store, &Overrides::default()).unwrap();

        let groups = snapshot.maps().map(|(g, _)| g.clone()).collect::<Vec<_>>();
        assert_eq!(
            groups,
            vec![
                GroupKey::Protein,
                GroupKey::Peptide("Unmodified".into()),
                GroupKey::Psm(2)
            ]
        );

        for (_, map) in snapshot.maps() {
            assert_eq!(map.results.n_tp_total, 20);
            assert_eq!(map.results.n_max, 30);
            assert_eq!(map.doubtful.n, 22);
        }

        for level in [MatchLevel::Protein, MatchLevel::Peptide, MatchLevel::Psm] {
            let counts = snapshot.counts(level);
            assert_eq!(counts.get(&ValidationLevel::Confident), Some(&20));
            assert_eq!(counts.get(&ValidationLevel::Doubtful), Some(&2));
        }
        assert_eq!(
            snapshot.level(MatchLevel::Psm, "psm00"),
            ValidationLevel::Confident
        );
        assert_eq!(
            snapshot.level(MatchLevel::Psm, "psm21"),
            ValidationLevel::Doubtful
        );
        assert_eq!(
            snapshot.level(MatchLevel::Psm, "psm39"),
            ValidationLevel::NotValidated
        );
        assert_eq!(
            snapshot.level(MatchLevel::Psm, "unknown"),
            ValidationLevel::NotValidated
        );

        let p = snapshot.parameters(MatchLevel::Peptide, "pep05").unwrap();
        assert_eq!(p.confidence, 100.0 - p.pep);
        assert_eq!(p.score, 95.0);
    }

    #[test]
    fn overrides_during_validation() {
        let store = store();
        let mut overrides = Overrides::default();
        overrides.insert(
            (MatchLevel::Psm, "psm39".into()),
            ValidationLevel::Confident,
        );
        let snapshot = validator().validate(&store, &overrides).unwrap();
        let v = snapshot.parameters(MatchLevel::Psm, "psm39").unwrap().validation;
        assert_eq!(v.level, ValidationLevel::Confident);
        assert_eq!(v.automatic, ValidationLevel::NotValidated);
        assert!(v.manual_override);
        // Only the overridden level is affected
        assert!(!snapshot.is_validated(MatchLevel::Peptide, "pep39"));
    }

    #[test]
    fn manual_override_survives_recompute() {
        let store = store();
        let state = ValidationState::new(validator());
        let first = state.recompute(&store).unwrap();

        state.set_manual(MatchLevel::Psm, "psm39", ValidationLevel::Confident);
        assert!(state.snapshot().is_validated(MatchLevel::Psm, "psm39"));
        // Published snapshots are never modified
        assert!(!first.is_validated(MatchLevel::Psm, "psm39"));

        let mut stricter = validator();
        stricter.thresholds.psm = Thresholds {
            fdr: 0.5,
            doubtful_fdr: 1.0,
        };
        state.set_validator(stricter);
        let second = state.recompute(&store).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(
            second.level(MatchLevel::Psm, "psm21"),
            ValidationLevel::NotValidated
        );
        let v = second.parameters(MatchLevel::Psm, "psm39").unwrap().validation;
        assert_eq!(v.level, ValidationLevel::Confident);
        assert!(v.manual_override);

        state.clear_manual(MatchLevel::Psm, "psm39");
        assert!(state.overrides().is_empty());
        assert_eq!(
            state.snapshot().level(MatchLevel::Psm, "psm39"),
            ValidationLevel::NotValidated
        );
    }

    #[test]
    fn recompute_is_deterministic() {
        let store = store();
        let a = validator().validate(&store, &Overrides::default()).unwrap();
        let b = validator().validate(&store, &Overrides::default()).unwrap();
        for level in [MatchLevel::Protein, MatchLevel::Peptide, MatchLevel::Psm] {
            for key in store.keys(level).unwrap() {
                assert_eq!(a.parameters(level, &key), b.parameters(level, &key));
            }
        }
    }
}
