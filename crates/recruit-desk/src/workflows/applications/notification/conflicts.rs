use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{
    ApplicantId, ApplicationId, ApplicationRecord, ApplicationStatus, Decision, JobId,
};

/// What a conflicting applicant will experience if the batch goes out as selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictImpact {
    WillReceiveBatchEmail,
    WillNotReceiveEmail,
}

impl ConflictImpact {
    pub const fn label(self) -> &'static str {
        match self {
            ConflictImpact::WillReceiveBatchEmail => "will receive the batch's email",
            ConflictImpact::WillNotReceiveEmail => "will not receive any email in this batch",
        }
    }
}

/// One application in a conflicting applicant's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictApplication {
    pub application_id: ApplicationId,
    pub job_id: JobId,
    pub job_title: String,
    pub status: ApplicationStatus,
    pub note: String,
    pub submitted_at: DateTime<Utc>,
    pub email_sent: bool,
    pub in_batch: bool,
}

/// Applicant whose applications disagree in derived status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantConflict {
    pub applicant_id: ApplicantId,
    pub applicant_name: String,
    /// Most recent first.
    pub applications: Vec<ConflictApplication>,
    pub impact: ConflictImpact,
    pub impact_label: String,
}

impl ApplicantConflict {
    pub fn in_batch(&self) -> impl Iterator<Item = &ConflictApplication> {
        self.applications.iter().filter(|app| app.in_batch)
    }

    pub fn outside_batch(&self) -> impl Iterator<Item = &ConflictApplication> {
        self.applications.iter().filter(|app| !app.in_batch)
    }

    pub fn statuses(&self) -> BTreeSet<ApplicationStatus> {
        self.applications.iter().map(|app| app.status).collect()
    }
}

/// Warning payload for a bulk send. The batch is passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub outcome: Decision,
    pub conflicts: Vec<ApplicantConflict>,
    pub batch: Vec<ApplicationRecord>,
}

impl ConflictReport {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn conflict_for(&self, applicant_id: &ApplicantId) -> Option<&ApplicantConflict> {
        self.conflicts
            .iter()
            .find(|conflict| &conflict.applicant_id == applicant_id)
    }
}

/// Flag applicants in `batch` whose full history holds more than one derived status.
///
/// `all_history` should contain every record of every applicant in the batch; batch records
/// missing from it are folded in so the grouping always covers the batch itself.
pub fn detect_conflicts(
    batch: Vec<ApplicationRecord>,
    all_history: &[ApplicationRecord],
    outcome: Decision,
) -> ConflictReport {
    let batch_ids: HashSet<&ApplicationId> = batch.iter().map(|record| &record.id).collect();

    let mut applicant_order: Vec<&ApplicantId> = Vec::new();
    for record in &batch {
        if !applicant_order.contains(&&record.applicant_id) {
            applicant_order.push(&record.applicant_id);
        }
    }

    let mut groups: HashMap<&ApplicantId, Vec<&ApplicationRecord>> = HashMap::new();
    let mut seen: HashSet<&ApplicationId> = HashSet::new();
    for record in all_history.iter().chain(batch.iter()) {
        if !applicant_order.contains(&&record.applicant_id) || !seen.insert(&record.id) {
            continue;
        }
        groups.entry(&record.applicant_id).or_default().push(record);
    }

    let target = outcome.status();
    let mut conflicts = Vec::new();

    for applicant_id in applicant_order {
        let Some(records) = groups.get(applicant_id) else {
            continue;
        };
        if records.len() < 2 {
            continue;
        }

        let statuses: BTreeSet<ApplicationStatus> =
            records.iter().map(|record| record.status()).collect();
        if statuses.len() < 2 {
            continue;
        }

        let mut applications: Vec<ConflictApplication> = records
            .iter()
            .map(|record| ConflictApplication {
                application_id: record.id.clone(),
                job_id: record.job_id.clone(),
                job_title: record.job_title.clone(),
                status: record.status(),
                note: record.note.clone(),
                submitted_at: record.submitted_at,
                email_sent: record.email_sent,
                in_batch: batch_ids.contains(&record.id),
            })
            .collect();
        applications.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));

        let impact = if applications
            .iter()
            .any(|app| app.in_batch && app.status == target)
        {
            ConflictImpact::WillReceiveBatchEmail
        } else {
            ConflictImpact::WillNotReceiveEmail
        };

        conflicts.push(ApplicantConflict {
            applicant_id: applicant_id.clone(),
            applicant_name: records[0].applicant_name.clone(),
            applications,
            impact,
            impact_label: impact.label().to_string(),
        });
    }

    ConflictReport {
        outcome,
        conflicts,
        batch,
    }
}
