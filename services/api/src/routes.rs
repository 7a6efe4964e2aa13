use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json, Router};
use serde_json::json;
use std::sync::Arc;

use cpe_billing::afip::{CaeAuthority, PadronClient};
use cpe_billing::billing::{
    catalog_router, invoice_router, padron_router, CatalogService, InvoiceService,
};
use cpe_billing::trips::{cpe_router, CpeService, TripStore, WaybillSource};

/// Services behind the public API.
pub(crate) struct ApiServices<S, A, W> {
    pub(crate) catalog: Arc<CatalogService<S>>,
    pub(crate) invoices: Arc<InvoiceService<S, A>>,
    pub(crate) waybills: Arc<CpeService<S, W>>,
    pub(crate) padron: Arc<PadronClient>,
}

pub(crate) fn with_api_routes<S, A, W>(services: ApiServices<S, A, W>) -> Router
where
    S: TripStore + 'static,
    A: CaeAuthority + 'static,
    W: WaybillSource + 'static,
{
    catalog_router(services.catalog)
        .merge(invoice_router(services.invoices))
        .merge(cpe_router(services.waybills))
        .merge(padron_router(services.padron))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
