use crate::cli::ServeArgs;
use crate::demo::seed_demo_candidates;
use crate::infra::{AppState, InMemoryCandidateStore, LoopbackStageExecutor};
use crate::routes::with_pipeline_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use product_pipeline::config::AppConfig;
use product_pipeline::error::AppError;
use product_pipeline::telemetry;
use product_pipeline::workflows::pipeline::PipelineService;
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

    let store = Arc::new(InMemoryCandidateStore::default());
    if args.seed_demo {
        let seeded = seed_demo_candidates(&store);
        info!(candidates = seeded.len(), "demo candidates seeded");
    }
    let executor = Arc::new(LoopbackStageExecutor::new(store.clone()));
    let pipeline = config.pipeline.clone();
    let service = Arc::new(PipelineService::new(
        store,
        executor,
        pipeline.orchestrator,
        pipeline.scorecard,
    ));

    let app = with_pipeline_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "product pipeline ready");

    axum::serve(listener, app).await?;
    Ok(())
}
