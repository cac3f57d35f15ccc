use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::applications::domain::{
    ApplicantId, ApplicationId, ApplicationRecord, Decision, EvaluationSubmission, JobId,
    JobStatus,
};
use crate::workflows::applications::evaluation::EvaluationState;
use crate::workflows::applications::repository::{
    ApplicationStore, BatchDelivery, EmailTemplate, FailedDelivery, MailTransport,
    PriorResultEmail, RenderedEmail, RepositoryError, SendClaim, TemplateError, TemplateId,
    TemplateStore, TransportError,
};
use crate::workflows::applications::service::ApplicationWorkflowService;

pub(super) type TestService = ApplicationWorkflowService<MemoryStore, MemoryTemplates, MemoryTransport>;

pub(super) fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn app_id(raw: &str) -> ApplicationId {
    ApplicationId(raw.to_string())
}

pub(super) fn accept_template() -> TemplateId {
    TemplateId("offer-letter".to_string())
}

pub(super) fn reject_template() -> TemplateId {
    TemplateId("regret-letter".to_string())
}

/// Undecided application to an approved job.
pub(super) fn record(id: &str, applicant: &str, job: &str) -> ApplicationRecord {
    ApplicationRecord {
        id: app_id(id),
        applicant_id: ApplicantId(applicant.to_string()),
        applicant_name: format!("Applicant {applicant}"),
        applicant_email: format!("{applicant}@example.com"),
        job_id: JobId(job.to_string()),
        job_title: format!("Role {job}"),
        job_status: JobStatus::Approved,
        submitted_at: at(1),
        result: None,
        note: String::new(),
        email_sent: false,
    }
}

pub(super) fn decided(
    id: &str,
    applicant: &str,
    job: &str,
    decision: Decision,
) -> ApplicationRecord {
    ApplicationRecord {
        result: Some(decision),
        ..record(id, applicant, job)
    }
}

pub(super) fn submission(note: &str, result: Option<Decision>) -> EvaluationSubmission {
    EvaluationSubmission {
        note: note.to_string(),
        result,
    }
}

pub(super) fn build_service(
    records: Vec<ApplicationRecord>,
) -> (TestService, Arc<MemoryStore>, Arc<MemoryTransport>) {
    let store = Arc::new(MemoryStore::with_records(records));
    let templates = Arc::new(MemoryTemplates::default());
    let transport = Arc::new(MemoryTransport::default());
    let service = ApplicationWorkflowService::new(store.clone(), templates, transport.clone());
    (service, store, transport)
}

/// Application store that enforces the evaluation rules on its own side, like the real API.
#[derive(Default)]
pub(super) struct MemoryStore {
    records: Mutex<BTreeMap<ApplicationId, ApplicationRecord>>,
    sent: Mutex<HashMap<(ApplicantId, JobId), PriorResultEmail>>,
    claims: Mutex<HashMap<(ApplicantId, JobId), ApplicationId>>,
    fail_next_mark: AtomicBool,
}

impl MemoryStore {
    pub(super) fn with_records(records: Vec<ApplicationRecord>) -> Self {
        let store = Self::default();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Records flagged as sent are remembered as notified with a legacy template.
    pub(super) fn insert(&self, record: ApplicationRecord) {
        if record.email_sent {
            self.sent
                .lock()
                .expect("sent mutex poisoned")
                .entry((record.applicant_id.clone(), record.job_id.clone()))
                .or_insert(PriorResultEmail {
                    template_id: TemplateId("legacy".to_string()),
                    sent_at: record.submitted_at,
                });
        }
        self.records
            .lock()
            .expect("store mutex poisoned")
            .insert(record.id.clone(), record);
    }

    pub(super) fn record(&self, id: &str) -> ApplicationRecord {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .get(&app_id(id))
            .cloned()
            .expect("record seeded")
    }

    pub(super) fn close_job(&self, job: &str) {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        for record in guard.values_mut() {
            if record.job_id.0 == job {
                record.job_status = JobStatus::Closed;
            }
        }
    }

    /// The next `mark_email_sent` call fails as if the API timed out.
    pub(super) fn fail_next_mark(&self) {
        self.fail_next_mark.store(true, Ordering::SeqCst);
    }

    pub(super) fn held_claims(&self) -> usize {
        self.claims.lock().expect("claims mutex poisoned").len()
    }

    pub(super) fn sent_count(&self) -> usize {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .values()
            .filter(|record| record.email_sent)
            .count()
    }
}

impl ApplicationStore for MemoryStore {
    fn get_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("store mutex poisoned")
            .get(id)
            .cloned())
    }

    fn update_evaluation(
        &self,
        id: &ApplicationId,
        submission: &EvaluationSubmission,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        EvaluationState::of(record)
            .transition(submission)
            .map_err(|_| RepositoryError::Conflict)?;
        record.result = submission.result;
        record.note = submission.note.clone();
        Ok(record.clone())
    }

    fn mark_email_sent(
        &self,
        id: &ApplicationId,
        template_id: &TemplateId,
        sent_at: DateTime<Utc>,
    ) -> Result<ApplicationRecord, RepositoryError> {
        if self.fail_next_mark.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("timeout".to_string()));
        }
        let mut guard = self.records.lock().expect("store mutex poisoned");
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if record.email_sent {
            return Err(RepositoryError::Conflict);
        }
        record.email_sent = true;
        let key = (record.applicant_id.clone(), record.job_id.clone());
        let mut sent = self.sent.lock().expect("sent mutex poisoned");
        self.claims.lock().expect("claims mutex poisoned").remove(&key);
        sent.entry(key).or_insert(PriorResultEmail {
            template_id: template_id.clone(),
            sent_at,
        });
        Ok(record.clone())
    }

    fn applications_by_applicant(
        &self,
        applicant_id: &ApplicantId,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("store mutex poisoned")
            .values()
            .filter(|record| &record.applicant_id == applicant_id)
            .cloned()
            .collect())
    }

    fn applications_for_job(
        &self,
        job_id: &JobId,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("store mutex poisoned")
            .values()
            .filter(|record| &record.job_id == job_id)
            .cloned()
            .collect())
    }

    fn prior_result_email(
        &self,
        applicant_id: &ApplicantId,
        job_id: &JobId,
    ) -> Result<Option<PriorResultEmail>, RepositoryError> {
        Ok(self
            .sent
            .lock()
            .expect("sent mutex poisoned")
            .get(&(applicant_id.clone(), job_id.clone()))
            .cloned())
    }

    fn claim_result_send(
        &self,
        applicant_id: &ApplicantId,
        job_id: &JobId,
        application_id: &ApplicationId,
    ) -> Result<SendClaim, RepositoryError> {
        let key = (applicant_id.clone(), job_id.clone());
        let sent = self.sent.lock().expect("sent mutex poisoned");
        if let Some(prior) = sent.get(&key) {
            return Ok(SendClaim::AlreadySent(prior.clone()));
        }
        let mut claims = self.claims.lock().expect("claims mutex poisoned");
        if let Some(holder) = claims.get(&key) {
            return Ok(SendClaim::Held { by: holder.clone() });
        }
        claims.insert(key, application_id.clone());
        Ok(SendClaim::Acquired)
    }

    fn release_result_send(
        &self,
        applicant_id: &ApplicantId,
        job_id: &JobId,
        application_id: &ApplicationId,
    ) -> Result<(), RepositoryError> {
        let key = (applicant_id.clone(), job_id.clone());
        let mut claims = self.claims.lock().expect("claims mutex poisoned");
        if claims.get(&key) == Some(application_id) {
            claims.remove(&key);
        }
        Ok(())
    }
}

pub(super) struct UnavailableStore;

impl ApplicationStore for UnavailableStore {
    fn get_application(
        &self,
        _id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("api offline".to_string()))
    }

    fn update_evaluation(
        &self,
        _id: &ApplicationId,
        _submission: &EvaluationSubmission,
    ) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("api offline".to_string()))
    }

    fn mark_email_sent(
        &self,
        _id: &ApplicationId,
        _template_id: &TemplateId,
        _sent_at: DateTime<Utc>,
    ) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("api offline".to_string()))
    }

    fn applications_by_applicant(
        &self,
        _applicant_id: &ApplicantId,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("api offline".to_string()))
    }

    fn applications_for_job(
        &self,
        _job_id: &JobId,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("api offline".to_string()))
    }

    fn prior_result_email(
        &self,
        _applicant_id: &ApplicantId,
        _job_id: &JobId,
    ) -> Result<Option<PriorResultEmail>, RepositoryError> {
        Err(RepositoryError::Unavailable("api offline".to_string()))
    }

    fn claim_result_send(
        &self,
        _applicant_id: &ApplicantId,
        _job_id: &JobId,
        _application_id: &ApplicationId,
    ) -> Result<SendClaim, RepositoryError> {
        Err(RepositoryError::Unavailable("api offline".to_string()))
    }

    fn release_result_send(
        &self,
        _applicant_id: &ApplicantId,
        _job_id: &JobId,
        _application_id: &ApplicationId,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("api offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryTemplates;

impl TemplateStore for MemoryTemplates {
    fn list_templates(&self) -> Result<Vec<EmailTemplate>, TemplateError> {
        Ok(vec![
            EmailTemplate {
                id: accept_template(),
                name: "Offer letter".to_string(),
                outcome: Some(Decision::Accept),
            },
            EmailTemplate {
                id: reject_template(),
                name: "Regret letter".to_string(),
                outcome: Some(Decision::Reject),
            },
        ])
    }

    fn render_preview(
        &self,
        application_id: &ApplicationId,
        template_id: &TemplateId,
    ) -> Result<RenderedEmail, TemplateError> {
        let template = self
            .list_templates()?
            .into_iter()
            .find(|template| &template.id == template_id)
            .ok_or_else(|| TemplateError::UnknownTemplate(template_id.clone()))?;
        Ok(RenderedEmail {
            subject: format!("{} ({application_id})", template.name),
            body: format!("Dear applicant, regarding application {application_id}."),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum TransportCall {
    One(ApplicationId),
    Many(Vec<ApplicationId>),
}

/// Scripted mail transport recording every call it receives.
#[derive(Default)]
pub(super) struct MemoryTransport {
    calls: Mutex<Vec<TransportCall>>,
    failing: Mutex<HashSet<ApplicationId>>,
    declining: Mutex<HashSet<ApplicationId>>,
    outage: Mutex<Option<TransportError>>,
    latency: Mutex<Option<Duration>>,
}

impl MemoryTransport {
    pub(super) fn fail_for(&self, id: &str) {
        self.failing
            .lock()
            .expect("transport mutex poisoned")
            .insert(app_id(id));
    }

    pub(super) fn decline(&self, id: &str) {
        self.declining
            .lock()
            .expect("transport mutex poisoned")
            .insert(app_id(id));
    }

    pub(super) fn go_offline(&self, err: TransportError) {
        *self.outage.lock().expect("transport mutex poisoned") = Some(err);
    }

    pub(super) fn recover(&self) {
        self.failing.lock().expect("transport mutex poisoned").clear();
        *self.outage.lock().expect("transport mutex poisoned") = None;
    }

    /// Every call sleeps this long before delivering, widening the window between two sends.
    pub(super) fn slow_down(&self, latency: Duration) {
        *self.latency.lock().expect("transport mutex poisoned") = Some(latency);
    }

    pub(super) fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().expect("transport mutex poisoned").clone()
    }

    fn outage(&self) -> Option<TransportError> {
        self.outage.lock().expect("transport mutex poisoned").clone()
    }

    fn wait(&self) {
        let latency = *self.latency.lock().expect("transport mutex poisoned");
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }
    }
}

impl MailTransport for MemoryTransport {
    fn send_one(
        &self,
        application_id: &ApplicationId,
        _template_id: &TemplateId,
    ) -> Result<(), TransportError> {
        self.calls
            .lock()
            .expect("transport mutex poisoned")
            .push(TransportCall::One(application_id.clone()));
        self.wait();
        if let Some(err) = self.outage() {
            return Err(err);
        }
        if self
            .failing
            .lock()
            .expect("transport mutex poisoned")
            .contains(application_id)
        {
            return Err(TransportError::Timeout);
        }
        Ok(())
    }

    fn send_many(
        &self,
        application_ids: &[ApplicationId],
        _template_id: &TemplateId,
    ) -> Result<BatchDelivery, TransportError> {
        self.calls
            .lock()
            .expect("transport mutex poisoned")
            .push(TransportCall::Many(application_ids.to_vec()));
        self.wait();
        if let Some(err) = self.outage() {
            return Err(err);
        }

        let failing = self.failing.lock().expect("transport mutex poisoned");
        let declining = self.declining.lock().expect("transport mutex poisoned");
        let mut delivery = BatchDelivery::default();
        for id in application_ids {
            if failing.contains(id) {
                delivery.failed.push(FailedDelivery {
                    application_id: id.clone(),
                    error: "451 mailbox temporarily unavailable".to_string(),
                });
            } else if declining.contains(id) {
                delivery.skipped.push(id.clone());
            } else {
                delivery.delivered.push(id.clone());
            }
        }
        Ok(delivery)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
