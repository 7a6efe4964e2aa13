//! WSCPE waybill consultation (`consultarCPEAutomotor`).

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{error, info};

use super::redact;
use super::soap::{escape_text, SoapRequest, SoapTransport};
use super::wsaa::{AfipService, CredentialProvider, Credentials, WsaaError};
use super::xml::{element_to_value, find_element, find_first_text, parse_document};

pub const WSCPE_NAMESPACE: &str = "https://serviciosjava.afip.gob.ar/wscpe/";
pub const CONSULT_ACTION: &str = "https://serviciosjava.afip.gob.ar/wscpe/consultarCPEAutomotor";

const CODE_KEYS: &[&str] = &["codigo", "code", "faultcode"];
const MESSAGE_KEYS: &[&str] = &["mensaje", "descripcion", "faultstring", "detalle", "detail"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpeErrorCode {
    AfipUnavailable,
    TokenExpired,
    InvalidCtg,
    InvalidResponse,
    /// Code reported by AFIP that has no dedicated handling.
    Afip(String),
    /// AFIP reported an error without any code.
    Unspecified,
}

impl CpeErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::AfipUnavailable => "AFIP_UNAVAILABLE",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidCtg => "INVALID_CTG",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::Afip(code) => code,
            Self::Unspecified => "AFIP_ERROR",
        }
    }
}

impl fmt::Display for CpeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CpeErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CpeError {
    pub code: CpeErrorCode,
    pub message: String,
    /// Retrying later may succeed.
    pub transient: bool,
}

impl CpeError {
    pub fn new(code: CpeErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            transient: false,
        }
    }

    fn unavailable() -> Self {
        Self {
            code: CpeErrorCode::AfipUnavailable,
            message: "No fue posible contactar al servicio de AFIP".to_string(),
            transient: true,
        }
    }
}

impl From<WsaaError> for CpeError {
    fn from(err: WsaaError) -> Self {
        Self {
            code: CpeErrorCode::AfipUnavailable,
            message: format!("No fue posible obtener credenciales de AFIP: {err}"),
            transient: matches!(err, WsaaError::Transport(_)),
        }
    }
}

pub fn consult_envelope(credentials: &Credentials, cuit_representada: &str, nro_ctg: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:wsc="{WSCPE_NAMESPACE}">
  <soapenv:Header/>
  <soapenv:Body>
    <wsc:ConsultarCPEAutomotorReq>
      <auth>
        <token>{token}</token>
        <sign>{sign}</sign>
        <cuitRepresentada>{cuit}</cuitRepresentada>
      </auth>
      <solicitud>
        <nroCTG>{ctg}</nroCTG>
      </solicitud>
    </wsc:ConsultarCPEAutomotorReq>
  </soapenv:Body>
</soapenv:Envelope>"#,
        token = escape_text(&credentials.token),
        sign = escape_text(&credentials.sign),
        cuit = escape_text(cuit_representada),
        ctg = escape_text(nro_ctg),
    )
}

/// Map well-known AFIP messages onto stable codes.
pub fn normalize_error_code(code: Option<&str>, message: &str) -> CpeErrorCode {
    let message = message.to_lowercase();
    if message.contains("token") && message.contains("expir") {
        return CpeErrorCode::TokenExpired;
    }
    if message.contains("ctg")
        && ["no existe", "inexist", "inválid", "invalid"]
            .iter()
            .any(|needle| message.contains(needle))
    {
        return CpeErrorCode::InvalidCtg;
    }
    match code.map(str::trim).filter(|code| !code.is_empty()) {
        Some(code) => CpeErrorCode::Afip(code.to_string()),
        None => CpeErrorCode::Unspecified,
    }
}

fn error_from(container: &Value) -> Option<CpeError> {
    let message = find_first_text(container, MESSAGE_KEYS)?;
    let code = find_first_text(container, CODE_KEYS);
    Some(CpeError::new(
        normalize_error_code(code.as_deref(), &message),
        message,
    ))
}

/// Error reported inside a `respuesta` block, looking only at error-like top-level entries.
fn respuesta_error(respuesta: &Map<String, Value>) -> Option<CpeError> {
    respuesta
        .iter()
        .filter(|(key, _)| {
            let key = key.to_lowercase();
            key.contains("error") || key.contains("fault")
        })
        .find_map(|(_, value)| error_from(value))
}

/// Extract the normalized `respuesta` tree, turning faults and reported errors into [`CpeError`].
pub fn parse_consult_response(body: &str) -> Result<Value, CpeError> {
    let doc = parse_document(body).map_err(|err| {
        CpeError::new(
            CpeErrorCode::InvalidResponse,
            format!("Respuesta inválida del WS CPE: {err}"),
        )
    })?;
    let root = doc.root_element();

    if let Some(fault) = find_element(root, "Fault") {
        let payload = element_to_value(fault);
        return Err(error_from(&payload).unwrap_or_else(|| {
            CpeError::new(CpeErrorCode::Unspecified, "Respuesta de error de AFIP")
        }));
    }

    let respuesta = find_element(root, "respuesta").ok_or_else(|| {
        CpeError::new(CpeErrorCode::InvalidResponse, "Respuesta inválida del WS CPE")
    })?;

    match element_to_value(respuesta) {
        Value::Object(map) => match respuesta_error(&map) {
            Some(err) => Err(err),
            None => Ok(Value::Object(map)),
        },
        _ => Err(CpeError::new(
            CpeErrorCode::InvalidResponse,
            "Respuesta inválida del WS CPE",
        )),
    }
}

pub struct WscpeClient {
    endpoint: String,
    cuit_representada: String,
    transport: Arc<dyn SoapTransport>,
    credentials: Arc<dyn CredentialProvider>,
}

impl WscpeClient {
    pub fn new(
        endpoint: impl Into<String>,
        cuit_representada: impl Into<String>,
        transport: Arc<dyn SoapTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            cuit_representada: cuit_representada.into(),
            transport,
            credentials,
        }
    }

    /// Consult a waybill by CTG and return its normalized `respuesta`.
    pub async fn consult(&self, nro_ctg: &str) -> Result<Value, CpeError> {
        let credentials = self.credentials.credentials(AfipService::Wscpe).await?;
        let secrets = [credentials.token.as_str(), credentials.sign.as_str()];
        let body = consult_envelope(&credentials, &self.cuit_representada, nro_ctg);

        info!(
            event = "afip.cpe.consulta.request",
            nro_ctg,
            payload = %redact(&body, &secrets),
            "consulting CPE"
        );

        let response = match self
            .transport
            .call(SoapRequest {
                url: self.endpoint.clone(),
                action: CONSULT_ACTION.to_string(),
                body,
            })
            .await
        {
            Ok(response) => response,
            Err(err) => {
                error!(
                    event = "afip.cpe.consulta.error",
                    nro_ctg,
                    error = %err,
                    payload = %redact(err.body().unwrap_or_default(), &secrets),
                    "CPE consultation failed"
                );
                return Err(CpeError::unavailable());
            }
        };

        info!(
            event = "afip.cpe.consulta.response",
            nro_ctg,
            status_code = response.status,
            payload = %redact(&response.body, &secrets),
            "CPE response received"
        );

        parse_consult_response(&response.body)
    }
}
