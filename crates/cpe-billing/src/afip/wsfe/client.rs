use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::request::{cae_envelope, last_authorized_envelope, voucher_types_envelope};
use super::response::{parse_cae_response, parse_last_authorized, parse_voucher_types};
use super::{CaeAuthority, CaeOutcome, CaeRequest, FeError, WSFE_NAMESPACE};
use crate::afip::only_digits;
use crate::afip::soap::{SoapRequest, SoapTransport};
use crate::afip::wsaa::{argentina_offset, AfipService, CredentialProvider};

/// WSFEv1 client bound to one issuer CUIT.
pub struct WsfeClient {
    endpoint: String,
    cuit: String,
    transport: Arc<dyn SoapTransport>,
    credentials: Arc<dyn CredentialProvider>,
}

impl WsfeClient {
    pub fn new(
        endpoint: impl Into<String>,
        cuit: impl Into<String>,
        transport: Arc<dyn SoapTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            cuit: cuit.into(),
            transport,
            credentials,
        }
    }

    async fn post(&self, operation: &str, body: String) -> Result<String, FeError> {
        let response = self
            .transport
            .call(SoapRequest {
                url: self.endpoint.clone(),
                action: format!("{WSFE_NAMESPACE}{operation}"),
                body,
            })
            .await?;
        Ok(response.body)
    }

    pub async fn last_authorized(&self, pto_vta: u32, cbte_tipo: u32) -> Result<u64, FeError> {
        let credentials = self.credentials.credentials(AfipService::Wsfe).await?;
        let body = last_authorized_envelope(&credentials, &self.cuit, pto_vta, cbte_tipo);
        let response = self.post("FECompUltimoAutorizado", body).await?;
        parse_last_authorized(&response)
    }

    pub async fn voucher_types(&self, pto_vta: u32) -> Result<Vec<u32>, FeError> {
        let credentials = self.credentials.credentials(AfipService::Wsfe).await?;
        let body = voucher_types_envelope(&credentials, &self.cuit);
        let response = self.post("FEParamGetTiposCbte", body).await?;
        parse_voucher_types(&response, &self.cuit, pto_vta)
    }
}

#[async_trait]
impl CaeAuthority for WsfeClient {
    fn issuer_cuit(&self) -> &str {
        &self.cuit
    }

    async fn enabled_voucher_types(&self, pto_vta: u32) -> Result<Vec<u32>, FeError> {
        self.voucher_types(pto_vta).await
    }

    async fn request_cae(&self, request: &CaeRequest) -> Result<CaeOutcome, FeError> {
        if only_digits(&request.cuit) != only_digits(&self.cuit) {
            return Err(FeError::IssuerMismatch {
                expected: self.cuit.clone(),
                requested: request.cuit.clone(),
            });
        }
        let today = Utc::now().with_timezone(&argentina_offset()).date_naive();
        let voucher = request.resolve(today)?;

        let cbte_nro = match request.cbte_nro {
            Some(number) => number,
            None => self.last_authorized(voucher.pto_vta, voucher.cbte_tipo).await? + 1,
        };
        debug!(pto_vta = voucher.pto_vta, cbte_tipo = voucher.cbte_tipo, cbte_nro, "requesting CAE");

        let credentials = self.credentials.credentials(AfipService::Wsfe).await?;
        let body = cae_envelope(&credentials, &self.cuit, &voucher, cbte_nro);
        let response = self.post("FECAESolicitar", body).await?;

        match parse_cae_response(&response, cbte_nro, voucher.pto_vta, voucher.cbte_tipo) {
            Ok(outcome) => {
                info!(
                    event = "afip.wsfe.cae",
                    pto_vta = outcome.pto_vta,
                    cbte_tipo = outcome.cbte_tipo,
                    cbte_nro = outcome.cbte_nro,
                    cae_due = %outcome.cae_due,
                    "voucher authorized"
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(event = "afip.wsfe.cae", cbte_nro, error = %err, "voucher not authorized");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Mutex;

    use rust_decimal::Decimal;

    use super::*;
    use crate::afip::soap::{SoapResponse, TransportError};
    use crate::afip::wsaa::StaticCredentials;
    use crate::afip::wsfe::fixtures::{cae_approved, last_authorized};

    #[derive(Default)]
    struct ScriptedTransport {
        requests: Mutex<Vec<SoapRequest>>,
    }

    #[async_trait]
    impl SoapTransport for ScriptedTransport {
        async fn call(&self, request: SoapRequest) -> Result<SoapResponse, TransportError> {
            let body = if request.action.ends_with("FECompUltimoAutorizado") {
                last_authorized(41)
            } else {
                cae_approved("70000000000001", 42)
            };
            self.requests.lock().expect("requests lock").push(request);
            Ok(SoapResponse { status: 200, body })
        }
    }

    #[tokio::test]
    async fn next_number_follows_last_authorized() {
        let transport = Arc::new(ScriptedTransport::default());
        let client = WsfeClient::new(
            "https://wsfe.test/service.asmx",
            "30716004720",
            transport.clone(),
            Arc::new(StaticCredentials::new("TOKEN", "SIGN")),
        );
        let request = CaeRequest::new(
            "30716004720",
            3,
            "20123456789",
            Decimal::from_str("150.5").expect("decimal"),
        );

        let outcome = client.request_cae(&request).await.expect("authorized");
        assert_eq!(outcome.cae, "70000000000001");
        assert_eq!(outcome.cbte_nro, 42);

        let requests = transport.requests.lock().expect("requests lock");
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].action,
            "http://ar.gov.afip.dif.FEV1/FECAESolicitar"
        );
        assert!(requests[1].body.contains("<ar:CbteDesde>42</ar:CbteDesde>"));
        assert!(requests[1].body.contains("<ar:ImpTotal>150.50</ar:ImpTotal>"));
        assert!(requests[1].body.contains("<ar:Token>TOKEN</ar:Token>"));
    }

    #[tokio::test]
    async fn explicit_number_skips_lookup() {
        let transport = Arc::new(ScriptedTransport::default());
        let client = WsfeClient::new(
            "https://wsfe.test/service.asmx",
            "30716004720",
            transport.clone(),
            Arc::new(StaticCredentials::new("TOKEN", "SIGN")),
        );
        let mut request = CaeRequest::new("30716004720", 3, "20123456789", Decimal::ONE);
        request.cbte_nro = Some(42);

        client.request_cae(&request).await.expect("authorized");
        assert_eq!(transport.requests.lock().expect("requests lock").len(), 1);
    }

    #[tokio::test]
    async fn vouchers_for_another_issuer_are_refused() {
        let transport = Arc::new(ScriptedTransport::default());
        let client = WsfeClient::new(
            "https://wsfe.test/service.asmx",
            "30716004720",
            transport.clone(),
            Arc::new(StaticCredentials::new("TOKEN", "SIGN")),
        );

        let formatted = CaeRequest::new("30-71600472-0", 3, "20123456789", Decimal::ONE);
        client.request_cae(&formatted).await.expect("same issuer");

        let foreign = CaeRequest::new("20111111112", 3, "20123456789", Decimal::ONE);
        let err = client.request_cae(&foreign).await.expect_err("other issuer");
        assert!(matches!(err, FeError::IssuerMismatch { .. }));
        assert!(err.is_invalid_request());
        assert_eq!(transport.requests.lock().expect("requests lock").len(), 2);
    }
}
