use crate::cli::ServeArgs;
use crate::infra::{seed_demo, AfipClients, AppState};
use crate::routes::{with_api_routes, ApiServices};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use cpe_billing::billing::{CatalogService, InvoiceService};
use cpe_billing::config::AppConfig;
use cpe_billing::error::AppError;
use cpe_billing::store::InMemoryStore;
use cpe_billing::telemetry;
use cpe_billing::trips::CpeService;
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

    let store = Arc::new(InMemoryStore::new());
    if args.seed_demo {
        let client = seed_demo(&store)?;
        info!(client_id = client.id, "demo client seeded");
    }

    let afip = AfipClients::from_config(&config.afip)?;
    let services = ApiServices {
        catalog: Arc::new(CatalogService::new(store.clone())),
        invoices: Arc::new(InvoiceService::new(
            store.clone(),
            afip.wsfe,
            config.afip.qr_base_url.clone(),
        )),
        waybills: Arc::new(CpeService::new(store, afip.wscpe)),
        padron: afip.padron,
    };

    let app = with_api_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        homologation = config.afip.homologation,
        cuit = %config.afip.cuit,
        "cpe billing back office ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
