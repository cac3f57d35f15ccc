use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};

use super::domain::{ApplicantId, ApplicationId, ApplicationRecord, Decision, JobId, JobStatus};

/// Loads application records from an HR console CSV export.
pub struct ApplicationImport;

#[derive(Debug, thiserror::Error)]
pub enum ApplicationImportError {
    #[error("failed to open application export: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse application export: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: invalid {field} '{value}'")]
    InvalidField {
        row: usize,
        field: &'static str,
        value: String,
    },
}

impl ApplicationImport {
    pub fn from_path<P: AsRef<Path>>(
        path: P,
    ) -> Result<Vec<ApplicationRecord>, ApplicationImportError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<ApplicationRecord>, ApplicationImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut records = Vec::new();

        for (index, row) in csv_reader.deserialize::<ApplicationRow>().enumerate() {
            let row = row?;
            records.push(row.into_record(index + 1)?);
        }

        Ok(records)
    }
}

#[derive(Debug, Deserialize)]
struct ApplicationRow {
    #[serde(rename = "Application ID")]
    application_id: String,
    #[serde(rename = "Applicant ID")]
    applicant_id: String,
    #[serde(rename = "Applicant Name")]
    applicant_name: String,
    #[serde(rename = "Applicant Email")]
    applicant_email: String,
    #[serde(rename = "Job ID")]
    job_id: String,
    #[serde(rename = "Job Title")]
    job_title: String,
    #[serde(rename = "Job Status")]
    job_status: String,
    #[serde(rename = "Submitted At")]
    submitted_at: String,
    #[serde(rename = "Result", default, deserialize_with = "empty_string_as_none")]
    result: Option<String>,
    #[serde(rename = "Note", default)]
    note: String,
    #[serde(rename = "Email Sent", default, deserialize_with = "empty_string_as_none")]
    email_sent: Option<String>,
}

impl ApplicationRow {
    fn into_record(self, row: usize) -> Result<ApplicationRecord, ApplicationImportError> {
        let invalid = |field: &'static str, value: &str| ApplicationImportError::InvalidField {
            row,
            field,
            value: value.to_string(),
        };

        let job_status =
            JobStatus::parse(&self.job_status).ok_or_else(|| invalid("job status", &self.job_status))?;
        let submitted_at = parse_timestamp(&self.submitted_at)
            .ok_or_else(|| invalid("submitted at", &self.submitted_at))?;
        let result = match self.result.as_deref() {
            None => None,
            Some(raw) => Some(parse_result(raw).ok_or_else(|| invalid("result", raw))?),
        };
        let email_sent = match self.email_sent.as_deref() {
            None => false,
            Some(raw) => parse_flag(raw).ok_or_else(|| invalid("email sent", raw))?,
        };

        Ok(ApplicationRecord {
            id: ApplicationId(self.application_id),
            applicant_id: ApplicantId(self.applicant_id),
            applicant_name: self.applicant_name,
            applicant_email: self.applicant_email,
            job_id: JobId(self.job_id),
            job_title: self.job_title,
            job_status,
            submitted_at,
            result,
            note: self.note,
            email_sent,
        })
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_result(value: &str) -> Option<Decision> {
    match value.trim().to_ascii_lowercase().as_str() {
        "accepted" | "accept" | "true" => Some(Decision::Accept),
        "rejected" | "reject" | "false" => Some(Decision::Reject),
        _ => None,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}
