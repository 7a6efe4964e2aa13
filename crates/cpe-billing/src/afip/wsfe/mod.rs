//! WSFEv1 electronic invoicing: voucher types, last authorized number and CAE requests.

mod client;
mod request;
mod response;

use async_trait::async_trait;
use rust_decimal::Decimal;

pub use client::WsfeClient;
pub use request::{
    afip_date, aliquot_id, cae_envelope, is_note, last_authorized_envelope, round_to,
    voucher_types_envelope, AssociatedDocuments, AssociatedPeriod, AssociatedVoucher, CaeRequest,
    ResolvedVoucher, VatLine, DEFAULT_CBTE_TIPO, DEFAULT_CONCEPTO, DEFAULT_DOC_TIPO,
    DEFAULT_RECEPTOR_CONDITION, NOTE_TYPES,
};
pub use response::{
    extract_messages, parse_cae_response, parse_last_authorized, parse_voucher_types, CaeOutcome,
};
#[cfg(test)]
pub(crate) use response::fixtures;

use super::soap::TransportError;
use super::wsaa::WsaaError;
use super::xml::XmlError;

pub const WSFE_NAMESPACE: &str = "http://ar.gov.afip.dif.FEV1/";

/// Something able to authorize vouchers, i.e. WSFE or a stand-in for it.
#[async_trait]
pub trait CaeAuthority: Send + Sync {
    /// CUIT the vouchers are issued under.
    fn issuer_cuit(&self) -> &str;

    async fn enabled_voucher_types(&self, pto_vta: u32) -> Result<Vec<u32>, FeError>;

    async fn request_cae(&self, request: &CaeRequest) -> Result<CaeOutcome, FeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FeError {
    #[error("El número de documento del receptor es obligatorio para solicitar el CAE")]
    MissingDocument,
    #[error("Para Notas de Débito/Crédito debés enviar cbtes_asoc o periodo_asoc")]
    MissingAssociation,
    #[error("alícuota de IVA no soportada: {0}")]
    UnsupportedIvaRate(Decimal),
    #[error("el comprobante es del CUIT {requested} pero el cliente WSFE emite como {expected}")]
    IssuerMismatch { expected: String, requested: String },
    #[error(transparent)]
    Credentials(#[from] WsaaError),
    #[error("WSFE request failed: {0}")]
    Transport(#[from] TransportError),
    #[error("WSFE returned unreadable XML: {0}")]
    Xml(#[from] XmlError),
    #[error("{0}")]
    Fault(String),
    #[error("AFIP devolvió errores: {}", .0.join("; "))]
    Rejected(Vec<String>),
    #[error("AFIP no devolvió un CAE en la respuesta")]
    MissingCae { observations: Vec<String> },
    #[error("AFIP no devolvió tipos de comprobante habilitados para el CUIT {cuit} y punto de venta {pto_vta}")]
    NoVoucherTypes { cuit: String, pto_vta: u32 },
    #[error("AFIP devolvió errores al consultar tipos de comprobante: {}", .0.join("; "))]
    VoucherTypeErrors(Vec<String>),
}

impl FeError {
    /// Errors caused by the request itself rather than by AFIP.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            FeError::MissingDocument
                | FeError::MissingAssociation
                | FeError::UnsupportedIvaRate(_)
                | FeError::IssuerMismatch { .. }
        )
    }
}
