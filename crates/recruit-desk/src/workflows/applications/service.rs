use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::domain::{
    ApplicationId, ApplicationRecord, ApplicationStatus, Decision, EvaluationSubmission, JobId,
};
use super::evaluation::{EvaluationError, EvaluationPanel, EvaluationState};
use super::notification::{
    BulkSendOutcome, BulkSendRequest, ConflictReport, DispatchError, NotificationDispatcher,
    NotificationEligibility, SingleSendReceipt,
};
use super::repository::{
    ApplicationStore, EmailTemplate, MailTransport, RenderedEmail, RepositoryError,
    TemplateError, TemplateId, TemplateStore,
};

/// Service composing the application store, the evaluation state machine and the
/// notification dispatcher.
pub struct ApplicationWorkflowService<S, T, M> {
    store: Arc<S>,
    templates: Arc<T>,
    dispatcher: NotificationDispatcher<S, T, M>,
}

/// Application plus the evaluation form state the HR console renders for it.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationView {
    #[serde(flatten)]
    pub record: ApplicationRecord,
    pub status: ApplicationStatus,
    pub evaluation: EvaluationPanel,
}

impl ApplicationView {
    pub fn of(record: ApplicationRecord) -> Self {
        let evaluation = EvaluationState::of(&record).panel();
        Self {
            status: record.status(),
            record,
            evaluation,
        }
    }
}

impl<S, T, M> ApplicationWorkflowService<S, T, M>
where
    S: ApplicationStore + 'static,
    T: TemplateStore + 'static,
    M: MailTransport + 'static,
{
    pub fn new(store: Arc<S>, templates: Arc<T>, transport: Arc<M>) -> Self {
        let dispatcher = NotificationDispatcher::new(store.clone(), templates.clone(), transport);
        Self {
            store,
            templates,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher<S, T, M> {
        &self.dispatcher
    }

    fn fetch(&self, id: &ApplicationId) -> Result<ApplicationRecord, WorkflowError> {
        self.store
            .get_application(id)?
            .ok_or_else(|| WorkflowError::NotFound(id.clone()))
    }

    pub fn get(&self, id: &ApplicationId) -> Result<ApplicationView, WorkflowError> {
        self.fetch(id).map(ApplicationView::of)
    }

    /// Record HR's note and decision. The record is re-read first so the state machine runs
    /// against current server state rather than whatever the form was rendered from.
    pub fn submit_evaluation(
        &self,
        id: &ApplicationId,
        submission: EvaluationSubmission,
    ) -> Result<ApplicationRecord, WorkflowError> {
        let record = self.fetch(id)?;
        let state = EvaluationState::of(&record);

        if let Err(err) = state.transition(&submission) {
            warn!(application_id = %id, error = %err, "evaluation rejected");
            return Err(err.into());
        }

        let updated = self.store.update_evaluation(id, &submission)?;
        info!(
            application_id = %id,
            status = updated.status().label(),
            "evaluation recorded"
        );
        Ok(updated)
    }

    pub fn notification_eligibility(
        &self,
        id: &ApplicationId,
    ) -> Result<NotificationEligibility, WorkflowError> {
        Ok(self.dispatcher.eligibility(id)?)
    }

    pub fn send_single(
        &self,
        id: &ApplicationId,
        template_id: &TemplateId,
    ) -> Result<SingleSendReceipt, WorkflowError> {
        Ok(self.dispatcher.send_single(id, template_id)?)
    }

    pub fn detect_conflicts(
        &self,
        application_ids: &[ApplicationId],
        outcome: Decision,
    ) -> Result<ConflictReport, WorkflowError> {
        Ok(self.dispatcher.review_batch(application_ids, outcome)?)
    }

    pub fn send_bulk(&self, request: &BulkSendRequest) -> Result<BulkSendOutcome, WorkflowError> {
        Ok(self.dispatcher.send_bulk(request)?)
    }

    pub fn templates(&self) -> Result<Vec<EmailTemplate>, WorkflowError> {
        Ok(self.templates.list_templates()?)
    }

    pub fn preview(
        &self,
        id: &ApplicationId,
        template_id: &TemplateId,
    ) -> Result<RenderedEmail, WorkflowError> {
        let record = self.fetch(id)?;
        Ok(self.templates.render_preview(&record.id, template_id)?)
    }

    /// Applications of a job carrying the given outcome, the pool HR picks a bulk batch from.
    pub fn batch_candidates(
        &self,
        job_id: &JobId,
        outcome: Option<Decision>,
    ) -> Result<Vec<ApplicationRecord>, WorkflowError> {
        let mut records = self.store.applications_for_job(job_id)?;
        if let Some(outcome) = outcome {
            let target = outcome.status();
            records.retain(|record| record.status() == target);
        }
        records.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(records)
    }
}

/// Error raised by the application workflow service.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}
