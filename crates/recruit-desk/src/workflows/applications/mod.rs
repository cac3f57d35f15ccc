//! Application evaluation and result-notification workflow.
//!
//! HR records a decision and note per application, then notifies applicants one at a time
//! or in bulk. Every side effect re-reads the record first and runs it through the
//! notification gate; bulk sends additionally stop for confirmation when an applicant's
//! history disagrees with the batch.

pub mod domain;
pub mod evaluation;
pub mod import;
pub mod notification;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    ApplicantId, ApplicationId, ApplicationRecord, ApplicationStatus, Decision,
    EvaluationSubmission, JobId, JobStatus,
};
pub use evaluation::{EvaluationError, EvaluationPanel, EvaluationStage, EvaluationState, PanelMode};
pub use import::{ApplicationImport, ApplicationImportError};
pub use notification::{
    can_notify, detect_conflicts, ApplicantConflict, BlockReason, BulkSendOutcome,
    BulkSendReport, BulkSendRequest, ConflictImpact, ConflictReport, DispatchError,
    GateDecision, NotificationDispatcher, NotificationEligibility, SingleSendReceipt,
    SkipReason, SkippedRecord,
};
pub use repository::{
    ApplicationStore, BatchDelivery, EmailTemplate, FailedDelivery, MailTransport,
    PriorResultEmail, RenderedEmail, RepositoryError, SendClaim, TemplateError, TemplateId,
    TemplateStore, TransportError,
};
pub use router::application_router;
pub use service::{ApplicationView, ApplicationWorkflowService, WorkflowError};
