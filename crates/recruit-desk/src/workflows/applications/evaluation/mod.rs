mod panel;

pub use panel::{EvaluationPanel, PanelMode};

use serde::{Deserialize, Serialize};

use super::domain::{ApplicationRecord, ApplicationStatus, Decision, EvaluationSubmission};

/// Decision stage of an application, independent of the lock flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStage {
    Undecided,
    Accepted,
    Rejected,
}

impl EvaluationStage {
    pub const fn from_result(result: Option<Decision>) -> Self {
        match result {
            None => EvaluationStage::Undecided,
            Some(Decision::Accept) => EvaluationStage::Accepted,
            Some(Decision::Reject) => EvaluationStage::Rejected,
        }
    }

    pub const fn result(self) -> Option<Decision> {
        match self {
            EvaluationStage::Undecided => None,
            EvaluationStage::Accepted => Some(Decision::Accept),
            EvaluationStage::Rejected => Some(Decision::Reject),
        }
    }

    pub const fn status(self) -> ApplicationStatus {
        ApplicationStatus::from_result(self.result())
    }
}

/// Tagged evaluation state: `{Undecided|Accepted|Rejected} x {locked, note_only}`.
///
/// `locked` mirrors a closed job and freezes everything. `note_only` mirrors an already
/// delivered result email and freezes the decision while leaving the note editable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationState {
    pub stage: EvaluationStage,
    pub locked: bool,
    pub note_only: bool,
}

impl EvaluationState {
    pub fn of(record: &ApplicationRecord) -> Self {
        Self {
            stage: EvaluationStage::from_result(record.result),
            locked: record.job_closed(),
            note_only: record.email_sent,
        }
    }

    /// Validate a submission against the current state and return the state it leads to.
    pub fn transition(
        &self,
        submission: &EvaluationSubmission,
    ) -> Result<EvaluationState, EvaluationError> {
        if self.locked {
            return Err(EvaluationError::JobClosed);
        }

        let requested = EvaluationStage::from_result(submission.result);
        if self.note_only && requested != self.stage {
            return Err(EvaluationError::AlreadyNotified);
        }

        Ok(EvaluationState {
            stage: requested,
            ..*self
        })
    }

    pub fn panel(&self) -> EvaluationPanel {
        EvaluationPanel::for_state(self)
    }
}

/// Business-rule rejection of an evaluation save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error("job is closed; evaluation can no longer be changed")]
    JobClosed,
    #[error("result email already sent; only the note can be changed")]
    AlreadyNotified,
}

impl EvaluationError {
    pub const fn code(self) -> &'static str {
        match self {
            EvaluationError::JobClosed => "job_closed",
            EvaluationError::AlreadyNotified => "already_notified",
        }
    }
}
