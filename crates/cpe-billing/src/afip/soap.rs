use std::time::Duration;

use async_trait::async_trait;
use roxmltree::Document;

use super::xml::{descendant_text, find_element};

/// One SOAP 1.1 call: target URL, `SOAPAction` header and the envelope body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapRequest {
    pub url: String,
    pub action: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status} from SOAP endpoint")]
    Status { status: u16, body: String },
}

impl TransportError {
    /// Body returned alongside an HTTP error, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            TransportError::Status { body, .. } => Some(body.as_str()),
            TransportError::Network(_) => None,
        }
    }
}

/// Outbound SOAP seam so clients can be exercised against canned envelopes.
#[async_trait]
pub trait SoapTransport: Send + Sync {
    async fn call(&self, request: SoapRequest) -> Result<SoapResponse, TransportError>;
}

/// reqwest-backed transport used in production.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SoapTransport for HttpTransport {
    async fn call(&self, request: SoapRequest) -> Result<SoapResponse, TransportError> {
        tracing::debug!(url = %request.url, action = %request.action, "posting SOAP envelope");

        let response = self
            .client
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", request.action.as_str())
            .body(request.body)
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;

        // SOAP faults travel with HTTP 500; callers inspect the envelope before giving up.
        if status.is_success() || (status.as_u16() == 500 && body.contains("Fault")) {
            Ok(SoapResponse {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(TransportError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// `faultcode` / `faultstring` pair from a SOAP envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    pub code: Option<String>,
    pub message: String,
}

pub fn soap_fault(doc: &Document<'_>) -> Option<SoapFault> {
    let fault = find_element(doc.root_element(), "Fault")?;
    let code = descendant_text(fault, "faultcode");
    let message = descendant_text(fault, "faultstring")
        .unwrap_or_else(|| "SOAP fault without faultstring".to_string());
    Some(SoapFault { code, message })
}

/// Escape a value interpolated into an envelope as element text.
pub fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::afip::xml::parse_document;

    #[test]
    fn soap_fault_reads_code_and_message() {
        let body = r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
            <soapenv:Body><soapenv:Fault>
              <faultcode>soap:Client</faultcode><faultstring>Token expirado</faultstring>
            </soapenv:Fault></soapenv:Body></soapenv:Envelope>"#;
        let doc = parse_document(body).expect("parse");
        let fault = soap_fault(&doc).expect("fault present");
        assert_eq!(fault.code.as_deref(), Some("soap:Client"));
        assert_eq!(fault.message, "Token expirado");
    }

    #[test]
    fn escape_text_handles_markup() {
        assert_eq!(escape_text("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&apos;");
        assert_eq!(escape_text("PD94bWw+=="), "PD94bWw+==");
    }
}
