use crate::cli::ServeArgs;
use crate::infra::{sample_service, AppState};
use crate::routes::with_distribution_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use review_engine::config::AppConfig;
use review_engine::distribution::{AdmissionReview, MemoryItemStore, ReviewDistributionService};
use review_engine::error::AppError;
use review_engine::telemetry;
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
    if let Some(size) = args.batch_size.take().filter(|size| *size > 0) {
        config.distribution.default_batch_size = size.min(config.distribution.max_batch_size);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let service = if args.sample_phase {
        let (service, phase) = sample_service(2)?;
        info!(phase = %phase, "sample phase seeded");
        service
    } else {
        ReviewDistributionService::new(Arc::new(MemoryItemStore::new()), AdmissionReview)
    };

    let app = with_distribution_routes(Arc::new(service), config.distribution)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "review dispatch ready");

    axum::serve(listener, app).await?;
    Ok(())
}
