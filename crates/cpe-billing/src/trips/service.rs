use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::info;

use super::domain::{
    CpeAutomotor, CpeInvoiceView, CpeListView, CpeRelations, DomainStat, DomainStatistics, Vehicle,
};
use super::reconcile::{apply_default_tariff, apply_header, waybill_ctg, WaybillFacts};
use super::repository::TripStore;
use crate::afip::wscpe::{CpeError, WscpeClient};
use crate::afip::wsfe::round_to;
use crate::billing::validation::{FieldErrors, TariffPayload};
use crate::billing::{Client, TaxCondition};
use crate::store::RepositoryError;

const TOP_DOMAINS: usize = 10;

/// Where waybill data comes from: WSCPE or a stand-in for it.
#[async_trait]
pub trait WaybillSource: Send + Sync {
    /// Normalized `respuesta` tree for a CTG.
    async fn fetch_waybill(&self, nro_ctg: &str) -> Result<Value, CpeError>;
}

#[async_trait]
impl WaybillSource for WscpeClient {
    async fn fetch_waybill(&self, nro_ctg: &str) -> Result<Value, CpeError> {
        self.consult(nro_ctg).await
    }
}

/// Consults waybills and reconciles them against the billing catalog.
pub struct CpeService<S, W> {
    store: Arc<S>,
    source: Arc<W>,
}

impl<S, W> CpeService<S, W>
where
    S: TripStore + 'static,
    W: WaybillSource + 'static,
{
    pub fn new(store: Arc<S>, source: Arc<W>) -> Self {
        Self { store, source }
    }

    /// Fetch a waybill and upsert it, creating the payer client, product and vehicle
    /// when they are not known yet.
    pub async fn consult(
        &self,
        nro_ctg: &str,
        weight_override: Option<Decimal>,
    ) -> Result<CpeAutomotor, CpeServiceError> {
        let data = self.source.fetch_waybill(nro_ctg).await?;
        let facts = WaybillFacts::extract(&data, weight_override);

        let client = self.payer_client(&facts.client_tax_id)?;
        let provider = match facts.provider_tax_id.as_str() {
            "" => None,
            digits => self.store.provider_by_tax_digits(digits)?,
        };
        let product = self.store.waybill_product(
            facts.product_code.as_deref(),
            facts.product_description.as_deref(),
        )?;
        let vehicle = match &facts.vehicle_domain {
            Some(domain) => Some(self.store.vehicle_for_domain(domain)?),
            None => None,
        };

        let ctg = waybill_ctg(&data, nro_ctg);
        let (cpe, created) = self.store.upsert_cpe(
            &ctg,
            &mut |cpe: &mut CpeAutomotor, created: bool| {
                apply_header(cpe, &data);
                cpe.client_id = client.as_ref().map(|client| client.id);
                cpe.provider_id = provider.as_ref().map(|provider| provider.id);
                cpe.product_id = product.as_ref().map(|product| product.id);
                cpe.vehicle_id = vehicle.as_ref().map(|vehicle| vehicle.id);
                cpe.product_description = facts
                    .product_description
                    .clone()
                    .or_else(|| facts.product_code.clone())
                    .unwrap_or_default();
                cpe.procedencia = facts.procedencia.clone();
                cpe.destino = facts.destino.clone();
                cpe.peso_bruto_descarga = facts.peso_bruto_descarga;
                apply_default_tariff(cpe, created, product.as_ref());
            },
        )?;

        info!(
            event = "cpe.reconciled",
            nro_ctg = %cpe.nro_ctg,
            created,
            client_id = ?cpe.client_id,
            product_id = ?cpe.product_id,
            "waybill stored"
        );
        Ok(cpe)
    }

    /// Waybill summaries, newest emission first; undated ones last.
    pub fn waybills(&self) -> Result<Vec<CpeListView>, CpeServiceError> {
        let mut cpes = self.store.cpes()?;
        cpes.sort_by(newest_first);
        cpes.iter()
            .map(|cpe| {
                let vehicle = self.vehicle(cpe)?;
                Ok(cpe.list_view(vehicle.as_ref()))
            })
            .collect()
    }

    /// Invoice-ready waybills of a client.
    pub fn client_waybills(&self, client_id: u64) -> Result<Vec<CpeInvoiceView>, CpeServiceError> {
        if self.store.client(client_id)?.is_none() {
            return Err(CpeServiceError::NotFound);
        }
        let mut cpes = self.store.cpes_for_client(client_id)?;
        cpes.sort_by(newest_first);
        cpes.iter()
            .map(|cpe| Ok(cpe.invoice_view(&self.relations(cpe)?)))
            .collect()
    }

    pub fn set_tariff(
        &self,
        id: u64,
        payload: &TariffPayload,
    ) -> Result<CpeInvoiceView, CpeServiceError> {
        let tariff = payload.tariff()?;
        let mut cpe = self.store.cpe(id)?.ok_or(CpeServiceError::NotFound)?;
        cpe.tariff = Some(tariff);
        self.store.update_cpe(cpe.clone())?;
        Ok(cpe.invoice_view(&self.relations(&cpe)?))
    }

    /// Top vehicles by number of waybills and by billed total.
    pub fn domain_statistics(&self) -> Result<DomainStatistics, CpeServiceError> {
        #[derive(Default)]
        struct Tally {
            movimientos: u64,
            ctgs: BTreeSet<String>,
            facturacion: Decimal,
        }

        let mut tallies: BTreeMap<u64, Tally> = BTreeMap::new();
        for cpe in self.store.cpes()? {
            let Some(vehicle_id) = cpe.vehicle_id else {
                continue;
            };
            let tally = tallies.entry(vehicle_id).or_default();
            tally.movimientos += 1;
            if !cpe.nro_ctg.is_empty() {
                tally.ctgs.insert(cpe.nro_ctg.clone());
            }
            tally.facturacion += cpe.total_amount().unwrap_or_default();
        }

        let mut stats = Vec::with_capacity(tallies.len());
        for (vehicle_id, tally) in tallies {
            let Some(vehicle) = self.store.vehicle(vehicle_id)? else {
                continue;
            };
            stats.push(DomainStat {
                dominio: vehicle.domain,
                movimientos: tally.movimientos,
                total_ctg: tally.ctgs.len() as u64,
                facturacion: round_to(tally.facturacion, 2),
            });
        }

        let mut by_movements = stats.clone();
        by_movements.sort_by(|a, b| {
            b.movimientos
                .cmp(&a.movimientos)
                .then_with(|| b.facturacion.cmp(&a.facturacion))
                .then_with(|| a.dominio.cmp(&b.dominio))
        });
        by_movements.truncate(TOP_DOMAINS);

        let mut by_billing = stats;
        by_billing.sort_by(|a, b| {
            b.facturacion
                .cmp(&a.facturacion)
                .then_with(|| b.movimientos.cmp(&a.movimientos))
                .then_with(|| a.dominio.cmp(&b.dominio))
        });
        by_billing.truncate(TOP_DOMAINS);

        Ok(DomainStatistics {
            mayores_movimientos: by_movements,
            mayor_facturacion: by_billing,
        })
    }

    fn payer_client(&self, digits: &str) -> Result<Option<Client>, RepositoryError> {
        if digits.is_empty() {
            return Ok(None);
        }
        let candidate = Client {
            id: 0,
            name: format!("Pagador {digits}"),
            email: format!("pagador{digits}@auto.example.com"),
            tax_id: digits.to_string(),
            fiscal_address: String::new(),
            tax_condition: TaxCondition::default(),
            iva_rate: Client::default_iva_rate(),
        };
        let (client, created) = self.store.client_for_tax_digits(digits, candidate)?;
        if created {
            info!(client_id = client.id, tax_id = digits, "payer client created from CPE");
        }
        Ok(Some(client))
    }

    fn vehicle(&self, cpe: &CpeAutomotor) -> Result<Option<Vehicle>, RepositoryError> {
        match cpe.vehicle_id {
            Some(id) => self.store.vehicle(id),
            None => Ok(None),
        }
    }

    fn relations(&self, cpe: &CpeAutomotor) -> Result<CpeRelations, RepositoryError> {
        Ok(CpeRelations {
            client: match cpe.client_id {
                Some(id) => self.store.client(id)?,
                None => None,
            },
            provider: match cpe.provider_id {
                Some(id) => self.store.provider(id)?,
                None => None,
            },
            product: match cpe.product_id {
                Some(id) => self.store.product(id)?,
                None => None,
            },
            vehicle: self.vehicle(cpe)?,
        })
    }
}

fn newest_first(a: &CpeAutomotor, b: &CpeAutomotor) -> Ordering {
    match (a.fecha_emision, b.fecha_emision) {
        (Some(a_date), Some(b_date)) => b_date.cmp(&a_date),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| b.id.cmp(&a.id))
}

#[derive(Debug, thiserror::Error)]
pub enum CpeServiceError {
    #[error(transparent)]
    Afip(#[from] CpeError),
    #[error("invalid payload: {0}")]
    Validation(#[from] FieldErrors),
    #[error("No encontrado.")]
    NotFound,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
