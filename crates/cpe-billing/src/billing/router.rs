use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use tracing::{debug, error};

use super::catalog::{CatalogError, CatalogService};
use super::repository::BillingStore;
use super::service::{InvoiceService, InvoiceServiceError};
use super::validation::{
    ClientPayload, EmitInvoicePayload, ProductPayload, ProviderPayload, INVALID_BODY,
    NON_FIELD_ERRORS,
};
use crate::afip::padron::{PadronClient, PadronError};
use crate::afip::wsfe::{CaeAuthority, FeError};

/// `POST /api/facturas/emitir/` and `GET /api/facturas/`.
pub fn invoice_router<S, A>(service: Arc<InvoiceService<S, A>>) -> Router
where
    S: BillingStore + 'static,
    A: CaeAuthority + 'static,
{
    Router::new()
        .route("/api/facturas/emitir/", post(emit_handler::<S, A>))
        .route("/api/facturas/", get(list_invoices_handler::<S, A>))
        .with_state(service)
}

/// Clients, providers and products.
pub fn catalog_router<S>(service: Arc<CatalogService<S>>) -> Router
where
    S: BillingStore + 'static,
{
    Router::new()
        .route(
            "/api/clientes/",
            get(list_clients_handler::<S>).post(create_client_handler::<S>),
        )
        .route(
            "/api/clientes/:id/",
            get(client_handler::<S>)
                .put(replace_client_handler::<S>)
                .patch(patch_client_handler::<S>),
        )
        .route(
            "/api/proveedores/",
            get(list_providers_handler::<S>).post(create_provider_handler::<S>),
        )
        .route(
            "/api/productos/",
            get(list_products_handler::<S>).post(create_product_handler::<S>),
        )
        .route(
            "/api/productos/:id/",
            get(product_handler::<S>)
                .put(replace_product_handler::<S>)
                .patch(patch_product_handler::<S>)
                .delete(delete_product_handler::<S>),
        )
        .with_state(service)
}

/// `GET /api/padron/:cuit/` backed by the A13 registry.
pub fn padron_router(client: Arc<PadronClient>) -> Router {
    Router::new()
        .route("/api/padron/:cuit/", get(padron_handler))
        .with_state(client)
}

pub(crate) fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, axum::Json(json!({ "detail": message.into() }))).into_response()
}

pub(crate) fn internal_error(err: &dyn std::error::Error) -> Response {
    error!(error = %err, "request failed");
    let payload = json!({ "error": err.to_string() });
    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: T) -> Response {
    (status, axum::Json(body)).into_response()
}

/// Typed request body, or its rejection in the `non_field_errors` shape.
pub(crate) fn accept<T>(body: Result<axum::Json<T>, JsonRejection>) -> Result<T, Response> {
    body.map(|axum::Json(payload)| payload).map_err(|rejection| {
        debug!(error = %rejection.body_text(), "request body rejected");
        json_response(StatusCode::BAD_REQUEST, json!({ NON_FIELD_ERRORS: [INVALID_BODY] }))
    })
}

pub(crate) async fn emit_handler<S, A>(
    State(service): State<Arc<InvoiceService<S, A>>>,
    payload: Result<axum::Json<EmitInvoicePayload>, JsonRejection>,
) -> Response
where
    S: BillingStore + 'static,
    A: CaeAuthority + 'static,
{
    let payload = match accept(payload) {
        Ok(payload) => payload,
        Err(rejected) => return rejected,
    };
    match service.emit(&payload).await {
        Ok(invoice) => json_response(StatusCode::CREATED, invoice),
        Err(InvoiceServiceError::Validation(errors)) => {
            json_response(StatusCode::BAD_REQUEST, errors)
        }
        Err(err @ InvoiceServiceError::ClientNotFound(_)) => {
            detail(StatusCode::NOT_FOUND, err.to_string())
        }
        Err(InvoiceServiceError::Afip(err)) if err.is_invalid_request() => json_response(
            StatusCode::BAD_REQUEST,
            json!({ NON_FIELD_ERRORS: [err.to_string()] }),
        ),
        Err(InvoiceServiceError::Afip(err)) => afip_failure(&err),
        Err(other) => internal_error(&other),
    }
}

fn afip_failure(err: &FeError) -> Response {
    tracing::warn!(error = %err, "AFIP rejected the invoice");
    match err {
        FeError::MissingCae { observations } if !observations.is_empty() => json_response(
            StatusCode::BAD_GATEWAY,
            json!({ "detail": err.to_string(), "observations": observations }),
        ),
        _ => detail(StatusCode::BAD_GATEWAY, err.to_string()),
    }
}

pub(crate) async fn list_invoices_handler<S, A>(
    State(service): State<Arc<InvoiceService<S, A>>>,
) -> Response
where
    S: BillingStore + 'static,
    A: CaeAuthority + 'static,
{
    match service.invoices() {
        Ok(invoices) => json_response(StatusCode::OK, invoices),
        Err(err) => internal_error(&err),
    }
}

fn catalog_failure(err: CatalogError) -> Response {
    match err {
        CatalogError::Validation(errors) => json_response(StatusCode::BAD_REQUEST, errors),
        CatalogError::NotFound => detail(StatusCode::NOT_FOUND, "No encontrado."),
        CatalogError::Repository(err) => internal_error(&err),
    }
}

fn catalog_response<T: serde::Serialize>(
    status: StatusCode,
    result: Result<T, CatalogError>,
) -> Response {
    match result {
        Ok(body) => json_response(status, body),
        Err(err) => catalog_failure(err),
    }
}

pub(crate) async fn list_clients_handler<S>(
    State(service): State<Arc<CatalogService<S>>>,
) -> Response
where
    S: BillingStore + 'static,
{
    catalog_response(StatusCode::OK, service.clients())
}

pub(crate) async fn create_client_handler<S>(
    State(service): State<Arc<CatalogService<S>>>,
    payload: Result<axum::Json<ClientPayload>, JsonRejection>,
) -> Response
where
    S: BillingStore + 'static,
{
    match accept(payload) {
        Ok(payload) => catalog_response(StatusCode::CREATED, service.create_client(&payload)),
        Err(rejected) => rejected,
    }
}

pub(crate) async fn client_handler<S>(
    State(service): State<Arc<CatalogService<S>>>,
    Path(id): Path<u64>,
) -> Response
where
    S: BillingStore + 'static,
{
    catalog_response(StatusCode::OK, service.client(id))
}

pub(crate) async fn replace_client_handler<S>(
    State(service): State<Arc<CatalogService<S>>>,
    Path(id): Path<u64>,
    payload: Result<axum::Json<ClientPayload>, JsonRejection>,
) -> Response
where
    S: BillingStore + 'static,
{
    match accept(payload) {
        Ok(payload) => catalog_response(StatusCode::OK, service.update_client(id, &payload, false)),
        Err(rejected) => rejected,
    }
}

pub(crate) async fn patch_client_handler<S>(
    State(service): State<Arc<CatalogService<S>>>,
    Path(id): Path<u64>,
    payload: Result<axum::Json<ClientPayload>, JsonRejection>,
) -> Response
where
    S: BillingStore + 'static,
{
    match accept(payload) {
        Ok(payload) => catalog_response(StatusCode::OK, service.update_client(id, &payload, true)),
        Err(rejected) => rejected,
    }
}

pub(crate) async fn list_providers_handler<S>(
    State(service): State<Arc<CatalogService<S>>>,
) -> Response
where
    S: BillingStore + 'static,
{
    catalog_response(StatusCode::OK, service.providers())
}

pub(crate) async fn create_provider_handler<S>(
    State(service): State<Arc<CatalogService<S>>>,
    payload: Result<axum::Json<ProviderPayload>, JsonRejection>,
) -> Response
where
    S: BillingStore + 'static,
{
    match accept(payload) {
        Ok(payload) => catalog_response(StatusCode::CREATED, service.create_provider(&payload)),
        Err(rejected) => rejected,
    }
}

pub(crate) async fn list_products_handler<S>(
    State(service): State<Arc<CatalogService<S>>>,
) -> Response
where
    S: BillingStore + 'static,
{
    catalog_response(StatusCode::OK, service.products())
}

pub(crate) async fn create_product_handler<S>(
    State(service): State<Arc<CatalogService<S>>>,
    payload: Result<axum::Json<ProductPayload>, JsonRejection>,
) -> Response
where
    S: BillingStore + 'static,
{
    match accept(payload) {
        Ok(payload) => catalog_response(StatusCode::CREATED, service.create_product(&payload)),
        Err(rejected) => rejected,
    }
}

pub(crate) async fn product_handler<S>(
    State(service): State<Arc<CatalogService<S>>>,
    Path(id): Path<u64>,
) -> Response
where
    S: BillingStore + 'static,
{
    catalog_response(StatusCode::OK, service.product(id))
}

pub(crate) async fn replace_product_handler<S>(
    State(service): State<Arc<CatalogService<S>>>,
    Path(id): Path<u64>,
    payload: Result<axum::Json<ProductPayload>, JsonRejection>,
) -> Response
where
    S: BillingStore + 'static,
{
    match accept(payload) {
        Ok(payload) => catalog_response(StatusCode::OK, service.update_product(id, &payload, false)),
        Err(rejected) => rejected,
    }
}

pub(crate) async fn patch_product_handler<S>(
    State(service): State<Arc<CatalogService<S>>>,
    Path(id): Path<u64>,
    payload: Result<axum::Json<ProductPayload>, JsonRejection>,
) -> Response
where
    S: BillingStore + 'static,
{
    match accept(payload) {
        Ok(payload) => catalog_response(StatusCode::OK, service.update_product(id, &payload, true)),
        Err(rejected) => rejected,
    }
}

pub(crate) async fn delete_product_handler<S>(
    State(service): State<Arc<CatalogService<S>>>,
    Path(id): Path<u64>,
) -> Response
where
    S: BillingStore + 'static,
{
    match service.delete_product(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => catalog_failure(err),
    }
}

pub(crate) async fn padron_handler(
    State(client): State<Arc<PadronClient>>,
    Path(cuit): Path<String>,
) -> Response {
    match client.lookup(&cuit).await {
        Ok(Some(persona)) => json_response(StatusCode::OK, persona),
        Ok(None) => detail(
            StatusCode::NOT_FOUND,
            format!("El CUIT {cuit} no figura en el padrón A13."),
        ),
        Err(err @ PadronError::InvalidCuit(_)) => detail(StatusCode::BAD_REQUEST, err.to_string()),
        Err(err) => {
            tracing::warn!(error = %err, "padron lookup failed");
            detail(StatusCode::BAD_GATEWAY, err.to_string())
        }
    }
}
