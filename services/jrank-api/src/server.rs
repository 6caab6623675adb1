use crate::cli::ServeArgs;
use crate::infra::{build_scoring_service, AppState};
use crate::routes::with_criteria_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use jrank_engine::config::AppConfig;
use jrank_engine::error::AppError;
use jrank_engine::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(rules) = args.rules.take() {
        config.engine.rules_path = Some(rules);
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let (scoring_service, report) = build_scoring_service(&config.engine)?;
    for rejected in &report.rejected {
        warn!(rule_id = %rejected.rule_id, defect = %rejected.defect, "rule not loaded");
    }

    let app = with_criteria_routes(Arc::new(scoring_service))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        reference_offset = %config.engine.reference_offset,
        rules = report.accepted,
        "jrank criteria engine ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
