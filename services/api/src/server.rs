use crate::cli::ServeArgs;
use crate::infra::{AppState, LogSink};
use crate::routes::with_registrar_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use registrar::config::AppConfig;
use registrar::error::AppError;
use registrar::registry::{
    EnrollmentService, MemoryStore, RegistrarPolicy, RolePermissionGate, SettlementEngine,
};
use registrar::telemetry;
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

    // The in-memory store serves until the durable backend is wired in;
    // catalog rows arrive through the demo seeding or an upstream loader.
    let store = Arc::new(MemoryStore::new());
    crate::demo::seed_catalog(&store, config.registrar.term);

    let sink = Arc::new(LogSink);
    let gate: Arc<RolePermissionGate> =
        Arc::new(RolePermissionGate::new(config.registrar.maintenance));
    let policy = RegistrarPolicy::new(config.registrar.lock_wait(), config.registrar.term);

    let service = Arc::new(EnrollmentService::new(
        store.clone(),
        sink.clone(),
        gate.clone(),
        policy.clone(),
    ));
    let engine = Arc::new(SettlementEngine::new(store, sink, gate, policy));

    let app = with_registrar_routes(service, engine)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, term = %config.registrar.term.label(), "registrar service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
