use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::workflows::applications::domain::JobId;

/// Required sum of all criterion weights.
pub const WEIGHT_TOTAL: i64 = 100;
pub const MAX_WEIGHT: i32 = 100;

/// Matching criteria a job can weight when CVs are scored against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringCriterion {
    RoleMatch,
    Experience,
    ProgrammingLanguage,
    KeyResponsibilities,
    Certificates,
    LanguageSkills,
    SoftSkills,
    TechnicalSkills,
}

impl ScoringCriterion {
    pub const ALL: [ScoringCriterion; 8] = [
        ScoringCriterion::RoleMatch,
        ScoringCriterion::Experience,
        ScoringCriterion::ProgrammingLanguage,
        ScoringCriterion::KeyResponsibilities,
        ScoringCriterion::Certificates,
        ScoringCriterion::LanguageSkills,
        ScoringCriterion::SoftSkills,
        ScoringCriterion::TechnicalSkills,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ScoringCriterion::RoleMatch => "Role match",
            ScoringCriterion::Experience => "Experience",
            ScoringCriterion::ProgrammingLanguage => "Programming language",
            ScoringCriterion::KeyResponsibilities => "Key responsibilities",
            ScoringCriterion::Certificates => "Certificates",
            ScoringCriterion::LanguageSkills => "Language skills",
            ScoringCriterion::SoftSkills => "Soft skills",
            ScoringCriterion::TechnicalSkills => "Technical skills",
        }
    }

    const fn default_weight(self) -> i32 {
        match self {
            ScoringCriterion::RoleMatch | ScoringCriterion::Experience => 20,
            ScoringCriterion::ProgrammingLanguage | ScoringCriterion::KeyResponsibilities => 15,
            ScoringCriterion::Certificates | ScoringCriterion::LanguageSkills => 5,
            ScoringCriterion::SoftSkills | ScoringCriterion::TechnicalSkills => 10,
        }
    }
}

/// Weight per criterion. Criteria without an entry weigh zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreWeightSet {
    weights: BTreeMap<ScoringCriterion, i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightValidation {
    pub valid: bool,
    pub total: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub out_of_range: Vec<ScoringCriterion>,
}

impl ScoreWeightSet {
    pub fn new(weights: BTreeMap<ScoringCriterion, i32>) -> Self {
        Self { weights }
    }

    /// Preset used when a job is authored.
    pub fn defaults() -> Self {
        ScoringCriterion::ALL
            .iter()
            .map(|criterion| (*criterion, criterion.default_weight()))
            .collect()
    }

    pub fn distribute_equally() -> Self {
        Self::distribute_equally_across(&ScoringCriterion::ALL)
    }

    /// Split the total evenly; the remainder goes one point at a time to the leading
    /// criteria so the sum is exact.
    pub fn distribute_equally_across(criteria: &[ScoringCriterion]) -> Self {
        let mut unique: Vec<ScoringCriterion> = Vec::with_capacity(criteria.len());
        for criterion in criteria {
            if !unique.contains(criterion) {
                unique.push(*criterion);
            }
        }
        if unique.is_empty() {
            return Self::default();
        }

        let count = unique.len() as i64;
        let base = WEIGHT_TOTAL / count;
        let remainder = WEIGHT_TOTAL % count;

        unique
            .into_iter()
            .enumerate()
            .map(|(index, criterion)| {
                let extra = i64::from((index as i64) < remainder);
                (criterion, (base + extra) as i32)
            })
            .collect()
    }

    pub fn get(&self, criterion: ScoringCriterion) -> i32 {
        self.weights.get(&criterion).copied().unwrap_or(0)
    }

    pub fn set(&mut self, criterion: ScoringCriterion, weight: i32) {
        self.weights.insert(criterion, weight);
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScoringCriterion, i32)> + '_ {
        self.weights.iter().map(|(criterion, weight)| (*criterion, *weight))
    }

    pub fn total(&self) -> i64 {
        self.weights.values().map(|weight| i64::from(*weight)).sum()
    }

    pub fn validate(&self) -> WeightValidation {
        let out_of_range: Vec<ScoringCriterion> = self
            .weights
            .iter()
            .filter(|(_, weight)| !(0..=MAX_WEIGHT).contains(*weight))
            .map(|(criterion, _)| *criterion)
            .collect();
        let total = self.total();

        WeightValidation {
            valid: out_of_range.is_empty() && total == WEIGHT_TOTAL,
            total,
            out_of_range,
        }
    }
}

/// Check a weight map: every value in `0..=100` and an exact total of 100.
pub fn validate_weights(weights: &ScoreWeightSet) -> WeightValidation {
    weights.validate()
}

impl FromIterator<(ScoringCriterion, i32)> for ScoreWeightSet {
    fn from_iter<I: IntoIterator<Item = (ScoringCriterion, i32)>>(iter: I) -> Self {
        Self {
            weights: iter.into_iter().collect(),
        }
    }
}

/// Job configuration persistence. Implementations reject invalid weights on their side too.
pub trait JobConfigStore: Send + Sync {
    fn save_scoring(&self, job_id: &JobId, weights: &ScoreWeightSet)
        -> Result<(), JobConfigError>;
    fn load_scoring(&self, job_id: &JobId) -> Result<Option<ScoreWeightSet>, JobConfigError>;
}

#[derive(Debug, thiserror::Error)]
pub enum JobConfigError {
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job configuration rejected: {0}")]
    Rejected(String),
    #[error("job configuration store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("criterion weights must total 100 (currently {total})")]
    WeightMismatch {
        total: i64,
        out_of_range: Vec<ScoringCriterion>,
    },
    #[error(transparent)]
    Store(#[from] JobConfigError),
}

/// Guards job configuration saves behind weight validation.
pub struct JobScoringService<J> {
    store: Arc<J>,
}

impl<J> JobScoringService<J>
where
    J: JobConfigStore + 'static,
{
    pub fn new(store: Arc<J>) -> Self {
        Self { store }
    }

    pub fn save(
        &self,
        job_id: &JobId,
        weights: &ScoreWeightSet,
    ) -> Result<WeightValidation, ScoringError> {
        let validation = weights.validate();
        if !validation.valid {
            warn!(job_id = %job_id, total = validation.total, "scoring weights rejected");
            return Err(ScoringError::WeightMismatch {
                total: validation.total,
                out_of_range: validation.out_of_range,
            });
        }

        self.store.save_scoring(job_id, weights)?;
        info!(job_id = %job_id, "scoring weights saved");
        Ok(validation)
    }

    /// Stored weights, or the authoring preset for jobs that never saved any.
    pub fn load(&self, job_id: &JobId) -> Result<ScoreWeightSet, ScoringError> {
        Ok(self
            .store
            .load_scoring(job_id)?
            .unwrap_or_else(ScoreWeightSet::defaults))
    }
}
