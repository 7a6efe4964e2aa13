use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use super::reconcile::to_decimal;
use super::repository::TripStore;
use super::service::{CpeService, CpeServiceError, WaybillSource};
use crate::afip::wscpe::{CpeError, CpeErrorCode};
use crate::billing::router::{accept, detail, internal_error};
use crate::billing::validation::{Input, Scalar};
use crate::billing::{FieldErrors, TariffPayload};

/// Waybill consultation, listings, tariffs and per-vehicle statistics.
pub fn cpe_router<S, W>(service: Arc<CpeService<S, W>>) -> Router
where
    S: TripStore + 'static,
    W: WaybillSource + 'static,
{
    Router::new()
        .route("/api/cpe/consultar/", post(consult_handler::<S, W>))
        .route("/api/envios/", get(list_handler::<S, W>))
        .route("/api/clientes/:id/cpe/", get(client_cpe_handler::<S, W>))
        .route("/api/cpe/:id/tarifa/", patch(tariff_handler::<S, W>))
        .route(
            "/api/estadisticas/dominios/",
            get(domain_statistics_handler::<S, W>),
        )
        .with_state(service)
}

fn status_for(code: &CpeErrorCode) -> StatusCode {
    match code {
        CpeErrorCode::AfipUnavailable | CpeErrorCode::InvalidResponse => StatusCode::BAD_GATEWAY,
        CpeErrorCode::TokenExpired => StatusCode::UNAUTHORIZED,
        CpeErrorCode::InvalidCtg => StatusCode::NOT_FOUND,
        CpeErrorCode::Afip(_) | CpeErrorCode::Unspecified => StatusCode::BAD_REQUEST,
    }
}

fn afip_failure(err: &CpeError) -> Response {
    tracing::warn!(code = %err.code, transient = err.transient, error = %err, "CPE consultation rejected");
    let payload = json!({ "detail": err.message, "code": err.code });
    (status_for(&err.code), axum::Json(payload)).into_response()
}

fn failure(err: CpeServiceError) -> Response {
    match err {
        CpeServiceError::Afip(err) => afip_failure(&err),
        CpeServiceError::Validation(errors) => {
            (StatusCode::BAD_REQUEST, axum::Json(errors)).into_response()
        }
        CpeServiceError::NotFound => detail(StatusCode::NOT_FOUND, "No encontrado."),
        CpeServiceError::Repository(err) => internal_error(&err),
    }
}

/// Body of `POST /api/cpe/consultar/`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ConsultPayload {
    nro_ctg: Input<Scalar>,
    peso_bruto_descarga: Input<Scalar>,
}

impl ConsultPayload {
    /// `nro_ctg` (string or number, non-blank) and an optional fallback weight.
    fn request(&self) -> Result<(String, Option<Decimal>), FieldErrors> {
        let mut errors = FieldErrors::default();
        let ctg = match &self.nro_ctg {
            Input::Given(Scalar::Text(text)) => text.trim().to_string(),
            Input::Given(Scalar::Number(number)) => number.to_string(),
            _ => String::new(),
        };
        if ctg.is_empty() {
            errors.add("nro_ctg", "Este campo es requerido.");
        }

        let weight = match &self.peso_bruto_descarga {
            Input::Missing | Input::Null => None,
            Input::Given(Scalar::Text(text)) if text.trim().is_empty() => None,
            Input::Given(value) => {
                let text = match value {
                    Scalar::Text(text) => text.clone(),
                    Scalar::Number(number) => number.to_string(),
                    Scalar::Other(other) => other.to_string(),
                };
                match to_decimal(&text) {
                    Some(weight) => Some(weight),
                    None => {
                        errors.add("peso_bruto_descarga", "Se requiere un número válido.");
                        None
                    }
                }
            }
        };

        if errors.is_empty() {
            Ok((ctg, weight))
        } else {
            Err(errors)
        }
    }
}

pub(crate) async fn consult_handler<S, W>(
    State(service): State<Arc<CpeService<S, W>>>,
    payload: Result<axum::Json<ConsultPayload>, JsonRejection>,
) -> Response
where
    S: TripStore + 'static,
    W: WaybillSource + 'static,
{
    let payload = match accept(payload) {
        Ok(payload) => payload,
        Err(rejected) => return rejected,
    };
    let (ctg, weight) = match payload.request() {
        Ok(request) => request,
        Err(errors) => return (StatusCode::BAD_REQUEST, axum::Json(errors)).into_response(),
    };
    match service.consult(&ctg, weight).await {
        Ok(cpe) => (StatusCode::OK, axum::Json(cpe)).into_response(),
        Err(err) => failure(err),
    }
}

pub(crate) async fn list_handler<S, W>(State(service): State<Arc<CpeService<S, W>>>) -> Response
where
    S: TripStore + 'static,
    W: WaybillSource + 'static,
{
    match service.waybills() {
        Ok(rows) => (StatusCode::OK, axum::Json(rows)).into_response(),
        Err(err) => failure(err),
    }
}

pub(crate) async fn client_cpe_handler<S, W>(
    State(service): State<Arc<CpeService<S, W>>>,
    Path(client_id): Path<u64>,
) -> Response
where
    S: TripStore + 'static,
    W: WaybillSource + 'static,
{
    match service.client_waybills(client_id) {
        Ok(rows) => (StatusCode::OK, axum::Json(rows)).into_response(),
        Err(err) => failure(err),
    }
}

pub(crate) async fn tariff_handler<S, W>(
    State(service): State<Arc<CpeService<S, W>>>,
    Path(id): Path<u64>,
    payload: Result<axum::Json<TariffPayload>, JsonRejection>,
) -> Response
where
    S: TripStore + 'static,
    W: WaybillSource + 'static,
{
    let payload = match accept(payload) {
        Ok(payload) => payload,
        Err(rejected) => return rejected,
    };
    match service.set_tariff(id, &payload) {
        Ok(row) => (StatusCode::OK, axum::Json(row)).into_response(),
        Err(err) => failure(err),
    }
}

pub(crate) async fn domain_statistics_handler<S, W>(
    State(service): State<Arc<CpeService<S, W>>>,
) -> Response
where
    S: TripStore + 'static,
    W: WaybillSource + 'static,
{
    match service.domain_statistics() {
        Ok(stats) => (StatusCode::OK, axum::Json(stats)).into_response(),
        Err(err) => failure(err),
    }
}
