use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use recruit_desk::error::AppError;
use recruit_desk::workflows::applications::{
    ApplicantId, ApplicationId, ApplicationImport, ApplicationRecord, ApplicationStore,
    BatchDelivery, Decision, EmailTemplate, EvaluationState, EvaluationSubmission, FailedDelivery,
    JobId, MailTransport, PriorResultEmail, RenderedEmail, RepositoryError, SendClaim,
    TemplateError, TemplateId, TemplateStore, TransportError,
};
use recruit_desk::workflows::jobs::{
    CatalogError, JobCatalog, JobConfigError, JobConfigStore, JobSummary, ScoreWeightSet,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Applications loaded when no CSV export is supplied.
pub(crate) const SEED_APPLICATIONS: &str = include_str!("../data/applications.csv");

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> RepositoryError {
    RepositoryError::Unavailable("application store lock poisoned".to_string())
}

#[derive(Default)]
struct SendLedger {
    sent: HashMap<(ApplicantId, JobId), PriorResultEmail>,
    claims: HashMap<(ApplicantId, JobId), ApplicationId>,
}

/// Application store backed by process memory. Applies the same evaluation and send checks
/// the hosted API enforces.
#[derive(Default)]
pub(crate) struct InMemoryApplicationStore {
    records: Mutex<BTreeMap<ApplicationId, ApplicationRecord>>,
    ledger: Mutex<SendLedger>,
}

impl InMemoryApplicationStore {
    pub(crate) fn from_records(records: Vec<ApplicationRecord>) -> Self {
        let mut by_id = BTreeMap::new();
        let mut ledger = SendLedger::default();
        for record in records {
            if record.email_sent {
                ledger
                    .sent
                    .entry((record.applicant_id.clone(), record.job_id.clone()))
                    .or_insert(PriorResultEmail {
                        template_id: TemplateId("imported".to_string()),
                        sent_at: record.submitted_at,
                    });
            }
            by_id.insert(record.id.clone(), record);
        }
        Self {
            records: Mutex::new(by_id),
            ledger: Mutex::new(ledger),
        }
    }

    fn records(
        &self,
    ) -> Result<MutexGuard<'_, BTreeMap<ApplicationId, ApplicationRecord>>, RepositoryError> {
        self.records.lock().map_err(poisoned)
    }

    pub(crate) fn all(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Ok(self.records()?.values().cloned().collect())
    }
}

impl ApplicationStore for InMemoryApplicationStore {
    fn get_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Ok(self.records()?.get(id).cloned())
    }

    fn update_evaluation(
        &self,
        id: &ApplicationId,
        submission: &EvaluationSubmission,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records()?;
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
        let mut guard = self.records()?;
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if record.email_sent {
            return Err(RepositoryError::Conflict);
        }
        let key = (record.applicant_id.clone(), record.job_id.clone());
        let mut ledger = self.ledger.lock().map_err(poisoned)?;
        record.email_sent = true;
        ledger.claims.remove(&key);
        ledger.sent.entry(key).or_insert(PriorResultEmail {
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
            .records()?
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
            .records()?
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
            .ledger
            .lock()
            .map_err(poisoned)?
            .sent
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
        let mut ledger = self.ledger.lock().map_err(poisoned)?;
        if let Some(prior) = ledger.sent.get(&key) {
            return Ok(SendClaim::AlreadySent(prior.clone()));
        }
        if let Some(holder) = ledger.claims.get(&key) {
            return Ok(SendClaim::Held { by: holder.clone() });
        }
        ledger.claims.insert(key, application_id.clone());
        Ok(SendClaim::Acquired)
    }

    fn release_result_send(
        &self,
        applicant_id: &ApplicantId,
        job_id: &JobId,
        application_id: &ApplicationId,
    ) -> Result<(), RepositoryError> {
        let key = (applicant_id.clone(), job_id.clone());
        let mut ledger = self.ledger.lock().map_err(poisoned)?;
        if ledger.claims.get(&key) == Some(application_id) {
            ledger.claims.remove(&key);
        }
        Ok(())
    }
}

struct TemplateDefinition {
    meta: EmailTemplate,
    subject: &'static str,
    body: &'static str,
}

/// Built-in result templates rendered against the application store.
pub(crate) struct StaticTemplateStore {
    store: Arc<InMemoryApplicationStore>,
    templates: Vec<TemplateDefinition>,
}

impl StaticTemplateStore {
    pub(crate) fn new(store: Arc<InMemoryApplicationStore>) -> Self {
        let definition = |id: &str,
                          name: &str,
                          outcome: Option<Decision>,
                          subject: &'static str,
                          body: &'static str| TemplateDefinition {
            meta: EmailTemplate {
                id: TemplateId(id.to_string()),
                name: name.to_string(),
                outcome,
            },
            subject,
            body,
        };

        Self {
            store,
            templates: vec![
                definition(
                    "offer-standard",
                    "Offer",
                    Some(Decision::Accept),
                    "Your application for {job_title}",
                    "Hi {applicant_name},\n\nWe are happy to let you know that you have been selected for {job_title}. Our team will reach out with next steps.",
                ),
                definition(
                    "regret-standard",
                    "Regret",
                    Some(Decision::Reject),
                    "Your application for {job_title}",
                    "Hi {applicant_name},\n\nThank you for applying to {job_title}. After careful review we will not be moving forward with your application.",
                ),
            ],
        }
    }
}

impl TemplateStore for StaticTemplateStore {
    fn list_templates(&self) -> Result<Vec<EmailTemplate>, TemplateError> {
        Ok(self
            .templates
            .iter()
            .map(|template| template.meta.clone())
            .collect())
    }

    fn render_preview(
        &self,
        application_id: &ApplicationId,
        template_id: &TemplateId,
    ) -> Result<RenderedEmail, TemplateError> {
        let template = self
            .templates
            .iter()
            .find(|template| &template.meta.id == template_id)
            .ok_or_else(|| TemplateError::UnknownTemplate(template_id.clone()))?;
        let record = self
            .store
            .get_application(application_id)
            .map_err(|err| TemplateError::Render(err.to_string()))?
            .ok_or_else(|| TemplateError::Render(format!("application {application_id} not found")))?;

        let fill = |text: &str| {
            text.replace("{applicant_name}", &record.applicant_name)
                .replace("{job_title}", &record.job_title)
        };

        Ok(RenderedEmail {
            subject: fill(template.subject),
            body: fill(template.body),
        })
    }
}

/// Transport that logs every delivery and keeps an outbox. Addresses listed in `bounces`
/// fail in batches, which lets the demo show a partial bulk send.
#[derive(Default)]
pub(crate) struct LoggingMailTransport {
    outbox: Mutex<Vec<(ApplicationId, TemplateId)>>,
    bounces: Mutex<HashSet<ApplicationId>>,
}

impl LoggingMailTransport {
    pub(crate) fn bounce(&self, id: ApplicationId) {
        if let Ok(mut bounces) = self.bounces.lock() {
            bounces.insert(id);
        }
    }

    pub(crate) fn clear_bounces(&self) {
        if let Ok(mut bounces) = self.bounces.lock() {
            bounces.clear();
        }
    }

    pub(crate) fn delivered(&self) -> usize {
        self.outbox.lock().map(|outbox| outbox.len()).unwrap_or(0)
    }
}

impl MailTransport for LoggingMailTransport {
    fn send_one(
        &self,
        application_id: &ApplicationId,
        template_id: &TemplateId,
    ) -> Result<(), TransportError> {
        let mut outbox = self
            .outbox
            .lock()
            .map_err(|_| TransportError::Unavailable("outbox lock poisoned".to_string()))?;
        outbox.push((application_id.clone(), template_id.clone()));
        info!(application_id = %application_id, template_id = %template_id, "mail queued");
        Ok(())
    }

    fn send_many(
        &self,
        application_ids: &[ApplicationId],
        template_id: &TemplateId,
    ) -> Result<BatchDelivery, TransportError> {
        let bounces = self
            .bounces
            .lock()
            .map_err(|_| TransportError::Unavailable("bounce list lock poisoned".to_string()))?;
        let mut outbox = self
            .outbox
            .lock()
            .map_err(|_| TransportError::Unavailable("outbox lock poisoned".to_string()))?;

        let mut delivery = BatchDelivery::default();
        for id in application_ids {
            if bounces.contains(id) {
                delivery.failed.push(FailedDelivery {
                    application_id: id.clone(),
                    error: "recipient mailbox unavailable".to_string(),
                });
                continue;
            }
            outbox.push((id.clone(), template_id.clone()));
            delivery.delivered.push(id.clone());
        }

        info!(
            template_id = %template_id,
            delivered = delivery.delivered.len(),
            failed = delivery.failed.len(),
            "mail batch queued"
        );
        Ok(delivery)
    }
}

/// Job configuration kept in memory for the jobs present in the application store.
pub(crate) struct InMemoryJobConfigStore {
    known_jobs: HashSet<JobId>,
    weights: Mutex<HashMap<JobId, ScoreWeightSet>>,
}

impl InMemoryJobConfigStore {
    pub(crate) fn new(known_jobs: HashSet<JobId>) -> Self {
        Self {
            known_jobs,
            weights: Mutex::new(HashMap::new()),
        }
    }
}

impl JobConfigStore for InMemoryJobConfigStore {
    fn save_scoring(&self, job_id: &JobId, weights: &ScoreWeightSet) -> Result<(), JobConfigError> {
        if !self.known_jobs.contains(job_id) {
            return Err(JobConfigError::NotFound(job_id.clone()));
        }
        let validation = weights.validate();
        if !validation.valid {
            return Err(JobConfigError::Rejected(format!(
                "weights total {} instead of 100",
                validation.total
            )));
        }
        self.weights
            .lock()
            .map_err(|_| JobConfigError::Unavailable("config lock poisoned".to_string()))?
            .insert(job_id.clone(), weights.clone());
        Ok(())
    }

    fn load_scoring(&self, job_id: &JobId) -> Result<Option<ScoreWeightSet>, JobConfigError> {
        if !self.known_jobs.contains(job_id) {
            return Err(JobConfigError::NotFound(job_id.clone()));
        }
        Ok(self
            .weights
            .lock()
            .map_err(|_| JobConfigError::Unavailable("config lock poisoned".to_string()))?
            .get(job_id)
            .cloned())
    }
}

/// Job catalog derived from the job fields carried on application records.
pub(crate) struct StoreBackedCatalog {
    store: Arc<InMemoryApplicationStore>,
}

impl StoreBackedCatalog {
    pub(crate) fn new(store: Arc<InMemoryApplicationStore>) -> Self {
        Self { store }
    }
}

impl JobCatalog for StoreBackedCatalog {
    fn fetch_job(&self, job_id: &JobId) -> Result<Option<JobSummary>, CatalogError> {
        let records = self
            .store
            .applications_for_job(job_id)
            .map_err(|err| CatalogError::Unavailable(err.to_string()))?;
        Ok(records.into_iter().next().map(|record| JobSummary {
            id: record.job_id,
            title: record.job_title,
            status: record.job_status,
        }))
    }
}

/// Every collaborator the workflow needs, wired against one shared application store.
pub(crate) struct Backends {
    pub(crate) store: Arc<InMemoryApplicationStore>,
    pub(crate) templates: Arc<StaticTemplateStore>,
    pub(crate) transport: Arc<LoggingMailTransport>,
    pub(crate) job_config: Arc<InMemoryJobConfigStore>,
    pub(crate) catalog: Arc<StoreBackedCatalog>,
}

impl Backends {
    pub(crate) fn from_records(records: Vec<ApplicationRecord>) -> Self {
        let known_jobs: HashSet<JobId> = records.iter().map(|record| record.job_id.clone()).collect();
        let store = Arc::new(InMemoryApplicationStore::from_records(records));

        Self {
            templates: Arc::new(StaticTemplateStore::new(store.clone())),
            transport: Arc::new(LoggingMailTransport::default()),
            job_config: Arc::new(InMemoryJobConfigStore::new(known_jobs)),
            catalog: Arc::new(StoreBackedCatalog::new(store.clone())),
            store,
        }
    }
}

/// Applications from `path`, or the bundled seed export when no path is given.
pub(crate) fn load_applications(path: Option<&Path>) -> Result<Vec<ApplicationRecord>, AppError> {
    let records = match path {
        Some(path) => ApplicationImport::from_path(path)?,
        None => ApplicationImport::from_reader(SEED_APPLICATIONS.as_bytes())?,
    };
    info!(count = records.len(), "applications loaded");
    Ok(records)
}
