use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::domain::{Invoice, InvoiceMetadata, InvoiceView};
use super::repository::BillingStore;
use super::validation::{EmitInvoiceCommand, EmitInvoicePayload, FieldErrors};
use crate::afip::qr::{qr_link, QrLink, QrPayload, QrVoucher};
use crate::afip::wsaa::argentina_offset;
use crate::afip::wsfe::{AssociatedDocuments, CaeAuthority, CaeOutcome, CaeRequest, FeError};
use crate::store::RepositoryError;

/// Emits invoices against a [`CaeAuthority`] and keeps the authorized vouchers.
pub struct InvoiceService<S, A> {
    store: Arc<S>,
    authority: Arc<A>,
    qr_base_url: String,
}

impl<S, A> InvoiceService<S, A>
where
    S: BillingStore + 'static,
    A: CaeAuthority + 'static,
{
    pub fn new(store: Arc<S>, authority: Arc<A>, qr_base_url: impl Into<String>) -> Self {
        Self {
            store,
            authority,
            qr_base_url: qr_base_url.into(),
        }
    }

    /// Validate, authorize and persist an invoice from a request body.
    pub async fn emit(
        &self,
        payload: &EmitInvoicePayload,
    ) -> Result<InvoiceView, InvoiceServiceError> {
        let command = payload.command()?;
        self.emit_command(command).await
    }

    pub async fn emit_command(
        &self,
        command: EmitInvoiceCommand,
    ) -> Result<InvoiceView, InvoiceServiceError> {
        let client = self
            .store
            .client(command.client_id)?
            .ok_or(InvoiceServiceError::ClientNotFound(command.client_id))?;

        let enabled = self
            .authority
            .enabled_voucher_types(command.pto_vta)
            .await?;
        if !enabled.contains(&command.cbte_tipo) {
            return Err(InvoiceServiceError::Validation(FieldErrors::single(
                "cbte_tipo",
                format!(
                    "El tipo de comprobante {} no está habilitado para el punto de venta {}.",
                    command.cbte_tipo, command.pto_vta
                ),
            )));
        }

        let receptor_condition = command
            .receptor_condition
            .unwrap_or_else(|| client.tax_condition.code());
        let mut request = CaeRequest::new(
            self.authority.issuer_cuit(),
            command.pto_vta,
            command.doc_nro.clone(),
            command.amount,
        );
        request.cbte_tipo = command.cbte_tipo;
        request.doc_tipo = command.doc_tipo;
        request.concepto = command.concepto.unwrap_or(request.concepto);
        request.issue_date = command.issue_date;
        request.service_start = command.service_start;
        request.service_end = command.service_end;
        request.payment_due = command.payment_due;
        request.receptor_condition = Some(receptor_condition);
        request.iva_rate = command.iva_rate.unwrap_or(client.iva_rate);
        request.associated = command.associated.clone();

        let outcome = self.authority.request_cae(&request).await?;
        info!(
            event = "billing.invoice.authorized",
            client_id = client.id,
            pto_vta = outcome.pto_vta,
            cbte_tipo = outcome.cbte_tipo,
            cbte_nro = outcome.cbte_nro,
            "invoice authorized"
        );

        let (cbtes_asoc, periodo_asoc) = match &request.associated {
            Some(AssociatedDocuments::Vouchers(vouchers)) => (Some(vouchers.clone()), None),
            Some(AssociatedDocuments::Period(period)) => (None, Some(period.clone())),
            None => (None, None),
        };
        let metadata = InvoiceMetadata {
            condicion_iva_receptor_id: Some(receptor_condition),
            iva_rate: request.iva_rate.to_string(),
            cbtes_asoc,
            periodo_asoc,
            observations: outcome.observations.clone(),
            events: outcome.events.clone(),
            qr: self.qr_for(&request, &outcome),
        };

        let invoice = self.store.insert_invoice(Invoice {
            id: 0,
            client_id: client.id,
            amount: command.amount,
            pto_vta: outcome.pto_vta,
            cbte_tipo: outcome.cbte_tipo,
            cbte_nro: Some(outcome.cbte_nro),
            cae: Some(outcome.cae.clone()).filter(|cae| !cae.is_empty()),
            cae_due: Some(outcome.cae_due.clone()).filter(|due| !due.is_empty()),
            xml_raw: Some(outcome.xml.clone()).filter(|xml| !xml.is_empty()),
            metadata,
            created_at: Utc::now(),
        })?;

        Ok(invoice.view(Some(&client)))
    }

    pub fn invoices(&self) -> Result<Vec<InvoiceView>, InvoiceServiceError> {
        let invoices = self.store.invoices()?;
        let mut views = Vec::with_capacity(invoices.len());
        for invoice in invoices {
            let client = self.store.client(invoice.client_id)?;
            views.push(invoice.view(client.as_ref()));
        }
        Ok(views)
    }

    fn qr_for(&self, request: &CaeRequest, outcome: &CaeOutcome) -> Option<QrLink> {
        let issue_date = request
            .issue_date
            .unwrap_or_else(|| Utc::now().with_timezone(&argentina_offset()).date_naive());
        let payload = QrPayload::from_voucher(&QrVoucher {
            issue_date,
            issuer_cuit: &request.cuit,
            pto_vta: outcome.pto_vta,
            cbte_tipo: outcome.cbte_tipo,
            cbte_nro: outcome.cbte_nro,
            total: request.amount,
            currency: &request.currency,
            exchange_rate: request.exchange_rate,
            doc_tipo: Some(request.doc_tipo),
            doc_nro: Some(&request.doc_nro),
            cae: Some(outcome.cae.as_str()).filter(|cae| !cae.is_empty()),
        });
        match qr_link(&self.qr_base_url, &payload) {
            Ok(link) => Some(link),
            Err(err) => {
                warn!(error = %err, "could not render invoice QR payload");
                None
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InvoiceServiceError {
    #[error("invalid payload: {0}")]
    Validation(#[from] FieldErrors),
    #[error("Cliente {0} no encontrado.")]
    ClientNotFound(u64),
    #[error(transparent)]
    Afip(#[from] FeError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
