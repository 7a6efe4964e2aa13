//! WSAA authentication: login ticket requests, CMS signing, access ticket caching.

mod cache;
mod signer;
mod ticket;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub use cache::TicketStore;
pub use signer::{OpensslSigner, TicketSigner};
pub use ticket::{
    build_ticket_request, login_cms_envelope, parse_login_response, parse_ticket, AccessTicket,
    LOGIN_CMS_ACTION,
};

pub(crate) use ticket::argentina_offset;
#[cfg(test)]
pub(crate) use ticket::fixtures;

use super::soap::{SoapRequest, SoapTransport, TransportError};
use super::xml::XmlError;

/// Services this back office authenticates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AfipService {
    Wsfe,
    Wscpe,
    PadronA13,
}

impl AfipService {
    pub const ALL: [AfipService; 3] = [Self::Wsfe, Self::Wscpe, Self::PadronA13];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wsfe => "wsfe",
            Self::Wscpe => "wscpe",
            Self::PadronA13 => "ws_sr_padron_a13",
        }
    }
}

impl fmt::Display for AfipService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AfipService {
    type Err = WsaaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|service| service.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| WsaaError::UnknownService(value.to_string()))
    }
}

/// Token and sign pair attached to every authenticated AFIP call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub sign: String,
}

impl Credentials {
    pub fn new(token: impl Into<String>, sign: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            sign: sign.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"***")
            .field("sign", &"***")
            .finish()
    }
}

impl From<&AccessTicket> for Credentials {
    fn from(ticket: &AccessTicket) -> Self {
        Self::new(ticket.token.clone(), ticket.sign.clone())
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self, service: AfipService) -> Result<Credentials, WsaaError>;
}

/// Fixed credentials for every service.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>, sign: impl Into<String>) -> Self {
        Self {
            credentials: Credentials::new(token, sign),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self, _service: AfipService) -> Result<Credentials, WsaaError> {
        Ok(self.credentials.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WsaaError {
    #[error("unknown AFIP service `{0}`")]
    UnknownService(String),
    #[error("could not sign login ticket request: {0}")]
    Signing(String),
    #[error("WSAA request failed: {0}")]
    Transport(#[from] TransportError),
    #[error("WSAA returned unreadable XML: {0}")]
    Xml(#[from] XmlError),
    #[error("WSAA fault: {message}")]
    Fault {
        code: Option<String>,
        message: String,
    },
    #[error("WSAA response did not include loginCmsReturn")]
    MissingTicket,
    #[error("WSAA ticket has an empty token or sign")]
    EmptyCredentials,
    #[error("invalid access ticket: {0}")]
    InvalidTicket(String),
    #[error("ticket cache error: {0}")]
    Cache(String),
}

/// WSAA client keeping one valid ticket per service.
///
/// Lookups go memory, then disk cache, then a fresh login. The whole lookup runs under an
/// async mutex: WSAA refuses a second login while a ticket is still valid, so concurrent
/// callers must share the first one.
pub struct WsaaClient {
    endpoint: String,
    transport: Arc<dyn SoapTransport>,
    signer: Arc<dyn TicketSigner>,
    store: TicketStore,
    tickets: Mutex<HashMap<AfipService, AccessTicket>>,
}

impl WsaaClient {
    pub fn new(
        endpoint: impl Into<String>,
        transport: Arc<dyn SoapTransport>,
        signer: Arc<dyn TicketSigner>,
        store: TicketStore,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
            signer,
            store,
            tickets: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &TicketStore {
        &self.store
    }

    /// Valid ticket for `service`, logging in only when no cached one is usable.
    pub async fn ticket(&self, service: AfipService) -> Result<AccessTicket, WsaaError> {
        let mut tickets = self.tickets.lock().await;
        let now = Utc::now();

        if let Some(ticket) = tickets.get(&service).filter(|ticket| ticket.is_valid_at(now)) {
            return Ok(ticket.clone());
        }

        if let Some(ticket) = self.store.load(service).await {
            if ticket.is_valid_at(now) {
                tracing::debug!(service = %service, "using cached access ticket");
                tickets.insert(service, ticket.clone());
                return Ok(ticket);
            }
        }

        let ticket = self.login(service).await?;
        tickets.insert(service, ticket.clone());
        Ok(ticket)
    }

    async fn login(&self, service: AfipService) -> Result<AccessTicket, WsaaError> {
        let request = build_ticket_request(service, Utc::now().with_timezone(&argentina_offset()));
        let cms = self.signer.sign(&request).await?;
        let cms_base64 = base64::engine::general_purpose::STANDARD.encode(cms);

        let response = self
            .transport
            .call(SoapRequest {
                url: self.endpoint.clone(),
                action: LOGIN_CMS_ACTION.to_string(),
                body: login_cms_envelope(&cms_base64),
            })
            .await
            .map_err(|err| {
                warn!(event = "afip.wsaa.login", service = %service, error = %err, "WSAA login failed");
                err
            })?;

        let ticket = parse_login_response(service, &response.body)?;
        let path = self.store.save(&ticket).await?;
        info!(
            event = "afip.wsaa.login",
            service = %service,
            expires_at = %ticket.expires_at,
            cache = %path.display(),
            "obtained access ticket"
        );
        Ok(ticket)
    }
}

#[async_trait]
impl CredentialProvider for WsaaClient {
    async fn credentials(&self, service: AfipService) -> Result<Credentials, WsaaError> {
        self.ticket(service).await.map(|ticket| Credentials::from(&ticket))
    }
}
