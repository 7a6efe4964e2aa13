//! Clients for the AFIP/ARCA SOAP services and the helpers that normalize their responses.

pub mod padron;
pub mod qr;
pub mod soap;
pub mod wsaa;
pub mod wscpe;
pub mod wsfe;
pub mod xml;

pub use padron::{PadronClient, PadronError, PersonaA13};
pub use soap::{HttpTransport, SoapRequest, SoapResponse, SoapTransport, TransportError};
pub use wsaa::{
    AccessTicket, AfipService, CredentialProvider, Credentials, StaticCredentials, WsaaClient,
    WsaaError,
};
pub use wscpe::{CpeError, CpeErrorCode, WscpeClient};
pub use wsfe::{CaeAuthority, CaeOutcome, CaeRequest, FeError, WsfeClient};

/// Keep only ASCII digits; CUITs and document numbers arrive with dashes and spaces.
pub fn only_digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Replace every non-empty secret occurrence with `***` before a payload is logged.
pub fn redact(payload: &str, secrets: &[&str]) -> String {
    secrets
        .iter()
        .filter(|secret| !secret.is_empty())
        .fold(payload.to_string(), |text, secret| text.replace(secret, "***"))
}
