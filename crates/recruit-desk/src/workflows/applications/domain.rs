use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for submitted applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Identifies the person behind one or more applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicantId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ApplicantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of the job an application targets. Owned by the job approval workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Approved,
    Closed,
    Rejected,
}

impl JobStatus {
    pub const fn label(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Approved => "approved",
            JobStatus::Closed => "closed",
            JobStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(JobStatus::Pending),
            "approved" => Some(JobStatus::Approved),
            "closed" => Some(JobStatus::Closed),
            "rejected" => Some(JobStatus::Rejected),
            _ => None,
        }
    }
}

/// Hire/reject decision recorded by HR. Absence of a decision is modelled as `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    #[serde(alias = "accepted")]
    Accept,
    #[serde(alias = "rejected")]
    Reject,
}

impl Decision {
    pub const fn from_flag(flag: bool) -> Self {
        if flag {
            Decision::Accept
        } else {
            Decision::Reject
        }
    }

    pub const fn as_flag(self) -> bool {
        matches!(self, Decision::Accept)
    }

    /// Status an application carries once this decision is recorded.
    pub const fn status(self) -> ApplicationStatus {
        match self {
            Decision::Accept => ApplicationStatus::Accepted,
            Decision::Reject => ApplicationStatus::Rejected,
        }
    }
}

/// Display status derived from the recorded decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    New,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::New => "new",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub const fn from_result(result: Option<Decision>) -> Self {
        match result {
            None => ApplicationStatus::New,
            Some(decision) => decision.status(),
        }
    }
}

/// One applicant's submission to one job along with its evaluation and notification state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub applicant_id: ApplicantId,
    pub applicant_name: String,
    pub applicant_email: String,
    pub job_id: JobId,
    pub job_title: String,
    pub job_status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, with = "result_flag")]
    pub result: Option<Decision>,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub email_sent: bool,
}

impl ApplicationRecord {
    pub fn status(&self) -> ApplicationStatus {
        ApplicationStatus::from_result(self.result)
    }

    pub fn job_closed(&self) -> bool {
        self.job_status == JobStatus::Closed
    }
}

/// HR input for an evaluation save: the full note plus the tri-state decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationSubmission {
    #[serde(default)]
    pub note: String,
    #[serde(default, with = "result_flag")]
    pub result: Option<Decision>,
}

/// Keeps the `null | true | false` wire shape used by the HR console for `result`.
pub(crate) mod result_flag {
    use super::Decision;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S>(value: &Option<Decision>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(decision) => serializer.serialize_bool(decision.as_flag()),
            None => serializer.serialize_none(),
        }
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Decision>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let flag = Option::<bool>::deserialize(deserializer)?;
        Ok(flag.map(Decision::from_flag))
    }
}
