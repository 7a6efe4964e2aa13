#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use cpe_billing::afip::{
    CaeAuthority, CaeOutcome, CaeRequest, FeError, SoapRequest, SoapResponse, SoapTransport,
    TransportError,
};

/// Transport answering every call with the same canned result.
pub struct CannedTransport {
    reply: Result<SoapResponse, TransportError>,
    pub requests: Mutex<Vec<SoapRequest>>,
}

impl CannedTransport {
    pub fn body(body: &str) -> Arc<Self> {
        Self::with(Ok(SoapResponse {
            status: 200,
            body: body.to_string(),
        }))
    }

    pub fn failing(error: TransportError) -> Arc<Self> {
        Self::with(Err(error))
    }

    fn with(reply: Result<SoapResponse, TransportError>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SoapTransport for CannedTransport {
    async fn call(&self, request: SoapRequest) -> Result<SoapResponse, TransportError> {
        self.requests.lock().expect("requests mutex").push(request);
        self.reply.clone()
    }
}

/// WSFE stand-in authorizing every voucher with sequential numbers.
pub struct FakeAuthority {
    pub enabled: Vec<u32>,
    pub requests: Mutex<Vec<CaeRequest>>,
}

impl FakeAuthority {
    pub fn new(enabled: &[u32]) -> Arc<Self> {
        Arc::new(Self {
            enabled: enabled.to_vec(),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn last_request(&self) -> CaeRequest {
        self.requests
            .lock()
            .expect("requests mutex")
            .last()
            .cloned()
            .expect("a CAE request was made")
    }
}

#[async_trait]
impl CaeAuthority for FakeAuthority {
    fn issuer_cuit(&self) -> &str {
        "30716004720"
    }

    async fn enabled_voucher_types(&self, _pto_vta: u32) -> Result<Vec<u32>, FeError> {
        Ok(self.enabled.clone())
    }

    async fn request_cae(&self, request: &CaeRequest) -> Result<CaeOutcome, FeError> {
        request.resolve(chrono::NaiveDate::from_ymd_opt(2024, 2, 1).expect("date"))?;
        let mut requests = self.requests.lock().expect("requests mutex");
        requests.push(request.clone());
        Ok(CaeOutcome {
            cae: "74123456789012".to_string(),
            cae_due: "20240211".to_string(),
            cbte_nro: requests.len() as u64,
            pto_vta: request.pto_vta,
            cbte_tipo: request.cbte_tipo,
            xml: "<FECAESolicitarResponse/>".to_string(),
            observations: Vec::new(),
            events: Vec::new(),
        })
    }
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}
