use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ApplicantId, ApplicationId, ApplicationRecord, Decision, EvaluationSubmission, JobId,
};

/// Storage abstraction over the job/application API so the workflow can be exercised in
/// isolation.
pub trait ApplicationStore: Send + Sync {
    fn get_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError>;

    fn update_evaluation(
        &self,
        id: &ApplicationId,
        submission: &EvaluationSubmission,
    ) -> Result<ApplicationRecord, RepositoryError>;

    /// Flags the record as notified, remembers which template reached the applicant and
    /// turns any held send claim for the pair into the prior-send record.
    fn mark_email_sent(
        &self,
        id: &ApplicationId,
        template_id: &TemplateId,
        sent_at: DateTime<Utc>,
    ) -> Result<ApplicationRecord, RepositoryError>;

    fn applications_by_applicant(
        &self,
        applicant_id: &ApplicantId,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError>;

    fn applications_for_job(&self, job_id: &JobId)
        -> Result<Vec<ApplicationRecord>, RepositoryError>;

    /// Whether any result email already reached this applicant for this job, across all of
    /// their records for it.
    fn prior_result_email(
        &self,
        applicant_id: &ApplicantId,
        job_id: &JobId,
    ) -> Result<Option<PriorResultEmail>, RepositoryError>;

    /// Reserve the (applicant, job) pair for one result email. Compare-and-set: while a claim
    /// is held or a prior send exists, every other caller is refused.
    fn claim_result_send(
        &self,
        applicant_id: &ApplicantId,
        job_id: &JobId,
        application_id: &ApplicationId,
    ) -> Result<SendClaim, RepositoryError>;

    /// Drop a claim taken by `application_id` after a delivery that did not happen.
    fn release_result_send(
        &self,
        applicant_id: &ApplicantId,
        job_id: &JobId,
        application_id: &ApplicationId,
    ) -> Result<(), RepositoryError>;
}

/// Answer of [`ApplicationStore::claim_result_send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendClaim {
    Acquired,
    /// Another send for the same applicant and job holds the reservation.
    Held { by: ApplicationId },
    AlreadySent(PriorResultEmail),
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemplateId(pub String);

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result email delivered earlier for an (applicant, job) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorResultEmail {
    pub template_id: TemplateId,
    pub sent_at: DateTime<Utc>,
}

/// Email template metadata as listed by the template store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: TemplateId,
    pub name: String,
    /// Decision the template is written for, when it is outcome specific.
    #[serde(default)]
    pub outcome: Option<Decision>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

/// Template listing and rendering collaborator.
pub trait TemplateStore: Send + Sync {
    fn list_templates(&self) -> Result<Vec<EmailTemplate>, TemplateError>;

    fn render_preview(
        &self,
        application_id: &ApplicationId,
        template_id: &TemplateId,
    ) -> Result<RenderedEmail, TemplateError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template {0} not found")]
    UnknownTemplate(TemplateId),
    #[error("template rendering failed: {0}")]
    Render(String),
}

/// Outbound mail collaborator. Delivery, SMTP and retries on its side are opaque here.
pub trait MailTransport: Send + Sync {
    fn send_one(
        &self,
        application_id: &ApplicationId,
        template_id: &TemplateId,
    ) -> Result<(), TransportError>;

    fn send_many(
        &self,
        application_ids: &[ApplicationId],
        template_id: &TemplateId,
    ) -> Result<BatchDelivery, TransportError>;
}

/// Per-record result of one `send_many` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDelivery {
    pub delivered: Vec<ApplicationId>,
    pub failed: Vec<FailedDelivery>,
    /// Records the mail service declined on its own authority.
    pub skipped: Vec<ApplicationId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDelivery {
    pub application_id: ApplicationId,
    pub error: String,
}

/// Retryable transport failure. Never accompanied by a state change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("mail transport timed out")]
    Timeout,
    #[error("mail transport unavailable: {0}")]
    Unavailable(String),
    #[error("mail transport rejected request: {0}")]
    Rejected(String),
}
