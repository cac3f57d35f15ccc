use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use super::super::domain::ApplicationRecord;

/// Why a result email may not be sent for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    #[error("job is closed")]
    JobClosed,
    #[error("no decision has been recorded")]
    NoDecision,
    #[error("result email already sent")]
    AlreadySent,
}

/// Outcome of the notification gate. Serializes as `{ "allowed": bool, "reason"?: .. }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Blocked(BlockReason),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed)
    }

    pub fn reason(&self) -> Option<BlockReason> {
        match self {
            GateDecision::Allowed => None,
            GateDecision::Blocked(reason) => Some(*reason),
        }
    }
}

impl Serialize for GateDecision {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("GateDecision", 2)?;
        state.serialize_field("allowed", &self.is_allowed())?;
        match self.reason() {
            Some(reason) => state.serialize_field("reason", &reason)?,
            None => state.skip_field("reason")?,
        }
        state.end()
    }
}

/// Pure gate over `(job_status, result, email_sent)`. Callers must feed it a record fetched
/// right before the send; a value captured at selection time may be stale.
pub fn can_notify(record: &ApplicationRecord) -> GateDecision {
    if record.job_closed() {
        return GateDecision::Blocked(BlockReason::JobClosed);
    }
    if record.result.is_none() {
        return GateDecision::Blocked(BlockReason::NoDecision);
    }
    if record.email_sent {
        return GateDecision::Blocked(BlockReason::AlreadySent);
    }
    GateDecision::Allowed
}
