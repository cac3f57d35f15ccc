use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::super::domain::{ApplicantId, ApplicationId, ApplicationRecord, Decision, JobId};
use super::super::repository::{
    ApplicationStore, FailedDelivery, MailTransport, PriorResultEmail, RepositoryError,
    SendClaim, TemplateError, TemplateId, TemplateStore, TransportError,
};
use super::conflicts::{detect_conflicts, ConflictReport};
use super::gate::{can_notify, BlockReason, GateDecision};

/// Orchestrates single and bulk result-email sends on top of the gate and conflict detector.
pub struct NotificationDispatcher<S, T, M> {
    store: Arc<S>,
    templates: Arc<T>,
    transport: Arc<M>,
}

/// Whether the single-send action should be offered for an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationEligibility {
    pub application_id: ApplicationId,
    pub gate: GateDecision,
    /// Result email already delivered to this applicant for this job, on any record.
    pub prior: Option<PriorResultEmail>,
    pub can_send: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SingleSendReceipt {
    pub application_id: ApplicationId,
    pub template_id: TemplateId,
    pub subject: String,
    pub record: ApplicationRecord,
    /// False when the email went out but the store could not record it. The send claim stays
    /// held, so later attempts for the same applicant and job are refused.
    pub recorded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSendRequest {
    pub application_ids: Vec<ApplicationId>,
    pub template_id: TemplateId,
    /// Decision every record in the batch is expected to carry.
    pub outcome: Decision,
    #[serde(default)]
    pub acknowledge_conflicts: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotFound,
    JobClosed,
    NoDecision,
    AlreadySent,
    OutcomeMismatch,
    PreviouslyNotified,
    SendInProgress,
    DuplicateRecipient,
    DeclinedByTransport,
}

impl From<BlockReason> for SkipReason {
    fn from(reason: BlockReason) -> Self {
        match reason {
            BlockReason::JobClosed => SkipReason::JobClosed,
            BlockReason::NoDecision => SkipReason::NoDecision,
            BlockReason::AlreadySent => SkipReason::AlreadySent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub application_id: ApplicationId,
    pub reason: SkipReason,
}

/// Per-record outcome of a bulk send. `succeeded`, `failed` and `skipped` are disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSendReport {
    pub template_id: TemplateId,
    pub outcome: Decision,
    pub succeeded: Vec<ApplicationId>,
    pub failed: Vec<FailedDelivery>,
    pub skipped: Vec<SkippedRecord>,
}

impl BulkSendReport {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Ids to resubmit when retrying only the failed subset.
    pub fn failed_ids(&self) -> Vec<ApplicationId> {
        self.failed
            .iter()
            .map(|failure| failure.application_id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BulkSendOutcome {
    /// Conflicting histories were found and not yet acknowledged. Nothing was sent.
    ConfirmationRequired(ConflictReport),
    Completed(BulkSendReport),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("result email blocked: {0}")]
    Blocked(BlockReason),
    #[error("applicant already received a result email for this job on {}", .0.sent_at)]
    PreviouslyNotified(PriorResultEmail),
    #[error("a result email for this applicant and job is already being sent via {0}")]
    SendInProgress(ApplicationId),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl<S, T, M> NotificationDispatcher<S, T, M>
where
    S: ApplicationStore + 'static,
    T: TemplateStore + 'static,
    M: MailTransport + 'static,
{
    pub fn new(store: Arc<S>, templates: Arc<T>, transport: Arc<M>) -> Self {
        Self {
            store,
            templates,
            transport,
        }
    }

    fn fetch(&self, id: &ApplicationId) -> Result<ApplicationRecord, DispatchError> {
        self.store
            .get_application(id)?
            .ok_or_else(|| DispatchError::NotFound(id.clone()))
    }

    pub fn eligibility(
        &self,
        application_id: &ApplicationId,
    ) -> Result<NotificationEligibility, DispatchError> {
        let record = self.fetch(application_id)?;
        let gate = can_notify(&record);
        let prior = self
            .store
            .prior_result_email(&record.applicant_id, &record.job_id)?;
        let can_send = gate.is_allowed() && prior.is_none();

        Ok(NotificationEligibility {
            application_id: record.id,
            gate,
            prior,
            can_send,
        })
    }

    /// Send one result email. The (applicant, job) pair is claimed before the transport call,
    /// so a concurrent send for the same pair is refused instead of mailed twice. A failed
    /// transport call releases the claim and leaves the record untouched, so the call can
    /// simply be repeated.
    pub fn send_single(
        &self,
        application_id: &ApplicationId,
        template_id: &TemplateId,
    ) -> Result<SingleSendReceipt, DispatchError> {
        let record = self.fetch(application_id)?;

        if let GateDecision::Blocked(reason) = can_notify(&record) {
            warn!(application_id = %record.id, ?reason, "single send blocked by gate");
            return Err(DispatchError::Blocked(reason));
        }

        match self
            .store
            .claim_result_send(&record.applicant_id, &record.job_id, &record.id)?
        {
            SendClaim::Acquired => {}
            SendClaim::AlreadySent(prior) => {
                warn!(
                    application_id = %record.id,
                    template_id = %prior.template_id,
                    "applicant already notified for this job"
                );
                return Err(DispatchError::PreviouslyNotified(prior));
            }
            SendClaim::Held { by } => {
                warn!(application_id = %record.id, held_by = %by, "result email already in flight");
                return Err(DispatchError::SendInProgress(by));
            }
        }

        let rendered = match self.templates.render_preview(&record.id, template_id) {
            Ok(rendered) => rendered,
            Err(err) => {
                self.release(&record);
                return Err(err.into());
            }
        };

        if let Err(err) = self.transport.send_one(&record.id, template_id) {
            warn!(application_id = %record.id, error = %err, "result email delivery failed");
            self.release(&record);
            return Err(err.into());
        }

        let (record, recorded) = match self
            .store
            .mark_email_sent(&record.id, template_id, Utc::now())
        {
            Ok(updated) => {
                info!(application_id = %updated.id, template_id = %template_id, "result email sent");
                (updated, true)
            }
            Err(err) => {
                error!(
                    application_id = %record.id,
                    error = %err,
                    "delivered email could not be recorded; send claim kept"
                );
                (record, false)
            }
        };

        Ok(SingleSendReceipt {
            application_id: record.id.clone(),
            template_id: template_id.clone(),
            subject: rendered.subject,
            record,
            recorded,
        })
    }

    fn release(&self, record: &ApplicationRecord) {
        if let Err(err) =
            self.store
                .release_result_send(&record.applicant_id, &record.job_id, &record.id)
        {
            warn!(application_id = %record.id, error = %err, "send claim could not be released");
        }
    }

    fn release_all<'a>(&self, records: impl IntoIterator<Item = &'a ApplicationRecord>) {
        for record in records {
            self.release(record);
        }
    }

    /// Load the selected records plus the full history of every applicant among them and
    /// run the conflict detector. Unknown ids are left out of the batch.
    pub fn review_batch(
        &self,
        application_ids: &[ApplicationId],
        outcome: Decision,
    ) -> Result<ConflictReport, DispatchError> {
        let (batch, _) = self.load_batch(application_ids)?;
        self.review_loaded(batch, outcome)
    }

    fn review_loaded(
        &self,
        batch: Vec<ApplicationRecord>,
        outcome: Decision,
    ) -> Result<ConflictReport, DispatchError> {
        let mut applicants: Vec<&ApplicantId> = Vec::new();
        for record in &batch {
            if !applicants.contains(&&record.applicant_id) {
                applicants.push(&record.applicant_id);
            }
        }

        let mut history = Vec::new();
        for applicant_id in applicants {
            history.extend(self.store.applications_by_applicant(applicant_id)?);
        }

        Ok(detect_conflicts(batch, &history, outcome))
    }

    fn load_batch(
        &self,
        application_ids: &[ApplicationId],
    ) -> Result<(Vec<ApplicationRecord>, Vec<SkippedRecord>), DispatchError> {
        let mut seen = HashSet::new();
        let mut batch = Vec::new();
        let mut missing = Vec::new();

        for id in application_ids {
            if !seen.insert(id) {
                continue;
            }
            match self.store.get_application(id)? {
                Some(record) => batch.push(record),
                None => missing.push(SkippedRecord {
                    application_id: id.clone(),
                    reason: SkipReason::NotFound,
                }),
            }
        }

        Ok((batch, missing))
    }

    /// Bulk send. Conflicts must be acknowledged before any transport call is issued;
    /// without acknowledgment the conflict report is handed back and nothing is sent.
    pub fn send_bulk(&self, request: &BulkSendRequest) -> Result<BulkSendOutcome, DispatchError> {
        let (batch, mut skipped) = self.load_batch(&request.application_ids)?;
        let report = self.review_loaded(batch, request.outcome)?;

        if report.has_conflicts() && !request.acknowledge_conflicts {
            info!(
                conflicts = report.conflicts.len(),
                batch = report.batch.len(),
                "bulk send paused for conflict confirmation"
            );
            return Ok(BulkSendOutcome::ConfirmationRequired(report));
        }

        let target = request.outcome.status();
        let mut recipients: HashSet<(ApplicantId, JobId)> = HashSet::new();
        let mut claimed: Vec<ApplicationRecord> = Vec::new();

        for record in report.batch {
            if let GateDecision::Blocked(reason) = can_notify(&record) {
                skipped.push(SkippedRecord {
                    application_id: record.id,
                    reason: reason.into(),
                });
                continue;
            }
            if record.status() != target {
                skipped.push(SkippedRecord {
                    application_id: record.id,
                    reason: SkipReason::OutcomeMismatch,
                });
                continue;
            }
            if !recipients.insert((record.applicant_id.clone(), record.job_id.clone())) {
                skipped.push(SkippedRecord {
                    application_id: record.id,
                    reason: SkipReason::DuplicateRecipient,
                });
                continue;
            }

            let claim = match self.store.claim_result_send(
                &record.applicant_id,
                &record.job_id,
                &record.id,
            ) {
                Ok(claim) => claim,
                Err(err) => {
                    self.release_all(&claimed);
                    return Err(err.into());
                }
            };
            match claim {
                SendClaim::Acquired => claimed.push(record),
                SendClaim::AlreadySent(_) => skipped.push(SkippedRecord {
                    application_id: record.id,
                    reason: SkipReason::PreviouslyNotified,
                }),
                SendClaim::Held { .. } => skipped.push(SkippedRecord {
                    application_id: record.id,
                    reason: SkipReason::SendInProgress,
                }),
            }
        }

        let mut bulk = BulkSendReport {
            template_id: request.template_id.clone(),
            outcome: request.outcome,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped,
        };

        if claimed.is_empty() {
            info!(skipped = bulk.skipped.len(), "bulk send had no eligible records");
            return Ok(BulkSendOutcome::Completed(bulk));
        }

        let attempt: Vec<ApplicationId> = claimed.iter().map(|record| record.id.clone()).collect();
        match self.transport.send_many(&attempt, &request.template_id) {
            Ok(delivery) => {
                let delivered: HashSet<&ApplicationId> = delivery.delivered.iter().collect();
                let declined: HashSet<&ApplicationId> = delivery.skipped.iter().collect();
                let failures: HashMap<&ApplicationId, &FailedDelivery> = delivery
                    .failed
                    .iter()
                    .map(|failure| (&failure.application_id, failure))
                    .collect();

                for id in &attempt {
                    if delivered.contains(id) {
                        bulk.succeeded.push(id.clone());
                    } else if let Some(failure) = failures.get(id) {
                        bulk.failed.push((*failure).clone());
                    } else if declined.contains(id) {
                        bulk.skipped.push(SkippedRecord {
                            application_id: id.clone(),
                            reason: SkipReason::DeclinedByTransport,
                        });
                    } else {
                        bulk.failed.push(FailedDelivery {
                            application_id: id.clone(),
                            error: "no delivery status reported".to_string(),
                        });
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, attempted = attempt.len(), "bulk transport call failed");
                bulk.failed = attempt
                    .iter()
                    .map(|id| FailedDelivery {
                        application_id: id.clone(),
                        error: err.to_string(),
                    })
                    .collect();
            }
        }

        let succeeded: HashSet<&ApplicationId> = bulk.succeeded.iter().collect();
        self.release_all(
            claimed
                .iter()
                .filter(|record| !succeeded.contains(&record.id)),
        );

        let sent_at = Utc::now();
        for id in &bulk.succeeded {
            if let Err(err) = self
                .store
                .mark_email_sent(id, &request.template_id, sent_at)
            {
                error!(
                    application_id = %id,
                    error = %err,
                    "delivered email could not be recorded; send claim kept"
                );
            }
        }

        info!(
            succeeded = bulk.succeeded.len(),
            failed = bulk.failed.len(),
            skipped = bulk.skipped.len(),
            template_id = %request.template_id,
            "bulk send finished"
        );

        Ok(BulkSendOutcome::Completed(bulk))
    }
}
