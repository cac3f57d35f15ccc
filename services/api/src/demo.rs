use crate::infra::{
    load_applications, Backends, InMemoryApplicationStore, LoggingMailTransport,
    StaticTemplateStore,
};
use clap::Args;
use recruit_desk::error::AppError;
use recruit_desk::workflows::applications::{
    ApplicationId, ApplicationStatus, ApplicationWorkflowService, BulkSendOutcome,
    BulkSendReport, BulkSendRequest, ConflictReport, Decision, EvaluationSubmission, JobId,
    TemplateId, WorkflowError,
};
use recruit_desk::workflows::jobs::{validate_weights, ScoreWeightSet};
use std::path::PathBuf;

type DemoService =
    ApplicationWorkflowService<InMemoryApplicationStore, StaticTemplateStore, LoggingMailTransport>;

const DEMO_APPLICATION: &str = "app-1001";
const BULK_JOB: &str = "job-backend";
const OFFER_TEMPLATE: &str = "offer-standard";
const REGRET_TEMPLATE: &str = "regret-standard";
const BOUNCED_APPLICATION: &str = "app-1003";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Application CSV export to run the walkthrough against. Defaults to the bundled seed.
    #[arg(long)]
    pub(crate) applications_csv: Option<PathBuf>,
    /// Skip the bulk notification portion of the demo.
    #[arg(long)]
    pub(crate) skip_bulk: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        applications_csv,
        skip_bulk,
    } = args;

    let records = load_applications(applications_csv.as_deref())?;
    println!("Loaded {} applications", records.len());

    let backends = Backends::from_records(records);
    let service: DemoService = ApplicationWorkflowService::new(
        backends.store.clone(),
        backends.templates.clone(),
        backends.transport.clone(),
    );

    println!("\nEvaluation and single send");
    run_single_walkthrough(&service, &ApplicationId(DEMO_APPLICATION.to_string()));

    if !skip_bulk {
        println!("\nBulk rejection for {}", BULK_JOB);
        run_bulk_walkthrough(&service, &backends.transport);
    }

    println!("\nScoring weights");
    print_weights("Default weights", &ScoreWeightSet::defaults());
    print_weights("Equal distribution", &ScoreWeightSet::distribute_equally());

    println!(
        "\nMail transport delivered {} result emails",
        backends.transport.delivered()
    );
    Ok(())
}

fn run_single_walkthrough(service: &DemoService, id: &ApplicationId) {
    let view = match service.get(id) {
        Ok(view) => view,
        Err(err) => {
            println!("  Application unavailable: {}", err);
            return;
        }
    };
    println!(
        "- {} ({}) for {}: status {}, form {:?}",
        view.record.applicant_name,
        id,
        view.record.job_title,
        view.status.label(),
        view.evaluation.mode
    );

    match service.notification_eligibility(id) {
        Ok(eligibility) => match eligibility.gate.reason() {
            Some(reason) => println!("  Send action hidden before evaluation: {}", reason),
            None => println!("  Send action offered"),
        },
        Err(err) => println!("  Eligibility unavailable: {}", err),
    }

    let submission = EvaluationSubmission {
        note: "Strong system design interview".to_string(),
        result: Some(Decision::Accept),
    };
    match service.submit_evaluation(id, submission) {
        Ok(record) => println!(
            "  Evaluation recorded -> {} ({})",
            record.status().label(),
            record.note
        ),
        Err(err) => {
            println!("  Evaluation rejected: {}", err);
            return;
        }
    }

    let template = TemplateId(OFFER_TEMPLATE.to_string());
    match service.preview(id, &template) {
        Ok(rendered) => println!("  Preview subject: {}", rendered.subject),
        Err(err) => println!("  Preview unavailable: {}", err),
    }

    match service.send_single(id, &template) {
        Ok(receipt) => println!(
            "  Sent '{}' via {} (email_sent={})",
            receipt.subject, receipt.template_id, receipt.record.email_sent
        ),
        Err(err) => println!("  Send failed: {}", err),
    }

    match service.send_single(id, &template) {
        Ok(_) => println!("  Second send unexpectedly went out"),
        Err(err) => println!("  Second send refused: {}", err),
    }

    let change = EvaluationSubmission {
        note: "Changed mind".to_string(),
        result: Some(Decision::Reject),
    };
    match service.submit_evaluation(id, change) {
        Ok(_) => println!("  Decision changed after notification"),
        Err(WorkflowError::Evaluation(err)) => {
            println!("  Decision change refused ({}): {}", err.code(), err)
        }
        Err(err) => println!("  Decision change failed: {}", err),
    }

    let note_only = EvaluationSubmission {
        note: "Offer accepted by phone".to_string(),
        result: Some(Decision::Accept),
    };
    match service.submit_evaluation(id, note_only) {
        Ok(record) => println!("  Note updated after notification: {}", record.note),
        Err(err) => println!("  Note update failed: {}", err),
    }
}

fn run_bulk_walkthrough(service: &DemoService, transport: &LoggingMailTransport) {
    let candidates = match service.batch_candidates(
        &JobId(BULK_JOB.to_string()),
        Some(Decision::Reject),
    ) {
        Ok(candidates) => candidates,
        Err(err) => {
            println!("  Candidate lookup failed: {}", err);
            return;
        }
    };
    println!("- {} rejected applications selected", candidates.len());
    for record in &candidates {
        println!(
            "    - {} {} (email_sent={})",
            record.id, record.applicant_name, record.email_sent
        );
    }

    let mut request = BulkSendRequest {
        application_ids: candidates.into_iter().map(|record| record.id).collect(),
        template_id: TemplateId(REGRET_TEMPLATE.to_string()),
        outcome: Decision::Reject,
        acknowledge_conflicts: false,
    };

    match service.send_bulk(&request) {
        Ok(BulkSendOutcome::ConfirmationRequired(report)) => print_conflicts(&report),
        Ok(BulkSendOutcome::Completed(report)) => {
            println!("  No conflicts found");
            print_report(&report);
            return;
        }
        Err(err) => {
            println!("  Bulk send failed: {}", err);
            return;
        }
    }

    transport.bounce(ApplicationId(BOUNCED_APPLICATION.to_string()));
    request.acknowledge_conflicts = true;
    println!("  Conflicts acknowledged, sending");
    let report = match service.send_bulk(&request) {
        Ok(BulkSendOutcome::Completed(report)) => report,
        Ok(BulkSendOutcome::ConfirmationRequired(_)) => {
            println!("  Bulk send still awaiting confirmation");
            return;
        }
        Err(err) => {
            println!("  Bulk send failed: {}", err);
            return;
        }
    };
    print_report(&report);

    if report.is_complete() {
        return;
    }

    transport.clear_bounces();
    request.application_ids = report.failed_ids();
    println!("  Retrying {} failed deliveries", request.application_ids.len());
    match service.send_bulk(&request) {
        Ok(BulkSendOutcome::Completed(report)) => print_report(&report),
        Ok(BulkSendOutcome::ConfirmationRequired(_)) => {
            println!("  Retry awaiting confirmation")
        }
        Err(err) => println!("  Retry failed: {}", err),
    }
}

fn print_conflicts(report: &ConflictReport) {
    println!(
        "  Confirmation required: {} applicants hold mixed results",
        report.conflicts.len()
    );
    for conflict in &report.conflicts {
        println!(
            "    - {} {}",
            conflict.applicant_name,
            conflict.impact.label()
        );
        for application in &conflict.applications {
            let marker = if application.in_batch { "*" } else { " " };
            println!(
                "      {} {} {}: {}{}",
                marker,
                application.application_id,
                application.job_title,
                application.status.label(),
                if application.status == ApplicationStatus::New {
                    " (awaiting evaluation)"
                } else {
                    ""
                }
            );
        }
    }
}

fn print_report(report: &BulkSendReport) {
    println!(
        "  Sent {} / failed {} / skipped {}",
        report.succeeded.len(),
        report.failed.len(),
        report.skipped.len()
    );
    for failure in &report.failed {
        println!("    - failed {}: {}", failure.application_id, failure.error);
    }
    for skipped in &report.skipped {
        println!("    - skipped {}: {:?}", skipped.application_id, skipped.reason);
    }
}

fn print_weights(title: &str, weights: &ScoreWeightSet) {
    let validation = validate_weights(weights);
    println!(
        "- {} (total {}, valid={})",
        title, validation.total, validation.valid
    );
    for (criterion, weight) in weights.iter() {
        println!("    - {}: {}", criterion.label(), weight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_against_bundled_seed() {
        run_demo(DemoArgs::default()).expect("demo completes");
    }

    #[test]
    fn missing_export_surfaces_import_error() {
        let err = run_demo(DemoArgs {
            applications_csv: Some(PathBuf::from("/nonexistent/applications.csv")),
            skip_bulk: true,
        })
        .expect_err("missing file");
        assert!(matches!(err, AppError::Import(_)));
    }
}
