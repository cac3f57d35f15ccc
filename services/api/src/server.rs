use crate::cli::ServeArgs;
use crate::infra::{load_applications, AppState, Backends};
use crate::routes::workflow_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use recruit_desk::config::AppConfig;
use recruit_desk::error::AppError;
use recruit_desk::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let records = load_applications(args.applications_csv.as_deref())?;
    let backends = Backends::from_records(records);

    let app = workflow_routes(&backends, config.workflow.job_cache_ttl())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        job_cache_ttl_secs = config.workflow.job_cache_ttl_secs,
        "recruiting workflow service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
