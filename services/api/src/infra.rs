use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use cpe_billing::afip::wsaa::{OpensslSigner, TicketStore};
use cpe_billing::afip::{
    HttpTransport, PadronClient, SoapTransport, WscpeClient, WsaaClient, WsfeClient,
};
use cpe_billing::billing::{Client, ClientRepository, TaxCondition};
use cpe_billing::config::AfipConfig;
use cpe_billing::error::AppError;
use cpe_billing::store::{InMemoryStore, RepositoryError};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// AFIP clients sharing one HTTP transport and one WSAA ticket cache.
pub(crate) struct AfipClients {
    pub(crate) wsaa: Arc<WsaaClient>,
    pub(crate) wsfe: Arc<WsfeClient>,
    pub(crate) wscpe: Arc<WscpeClient>,
    pub(crate) padron: Arc<PadronClient>,
}

impl AfipClients {
    pub(crate) fn from_config(config: &AfipConfig) -> Result<Self, AppError> {
        let transport: Arc<dyn SoapTransport> =
            Arc::new(HttpTransport::new(config.request_timeout)?);
        Ok(Self::with_transport(config, transport))
    }

    pub(crate) fn with_transport(config: &AfipConfig, transport: Arc<dyn SoapTransport>) -> Self {
        let signer = Arc::new(OpensslSigner::new(
            config.openssl_bin.clone(),
            config.certificate.clone(),
            config.private_key.clone(),
        ));
        let wsaa = Arc::new(WsaaClient::new(
            config.endpoints.wsaa.clone(),
            transport.clone(),
            signer,
            TicketStore::new(config.credentials_dir.clone()),
        ));

        Self {
            wsfe: Arc::new(WsfeClient::new(
                config.endpoints.wsfe.clone(),
                config.cuit.clone(),
                transport.clone(),
                wsaa.clone(),
            )),
            wscpe: Arc::new(WscpeClient::new(
                config.endpoints.wscpe.clone(),
                config.cuit_representada.clone(),
                transport.clone(),
                wsaa.clone(),
            )),
            padron: Arc::new(PadronClient::new(
                config.endpoints.padron_a13.clone(),
                config.cuit_representada.clone(),
                transport,
                wsaa.clone(),
            )),
            wsaa,
        }
    }
}

pub(crate) const DEMO_CLIENT_NAME: &str = "Cliente Demo";

/// Add the demo client unless a client with that name already exists.
pub(crate) fn seed_demo(store: &InMemoryStore) -> Result<Client, RepositoryError> {
    if let Some(existing) = store
        .clients()?
        .into_iter()
        .find(|client| client.name == DEMO_CLIENT_NAME)
    {
        return Ok(existing);
    }
    store.insert_client(Client {
        id: 0,
        name: DEMO_CLIENT_NAME.to_string(),
        email: "demo@example.com".to_string(),
        tax_id: "20-12345678-9".to_string(),
        fiscal_address: "Av. Siempre Viva 742, Rosario".to_string(),
        tax_condition: TaxCondition::ConsumidorFinal,
        iva_rate: Client::default_iva_rate(),
    })
}
