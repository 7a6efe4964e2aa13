use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::afip::wsfe::round_to;
use crate::billing::{Client, Product, Provider};

/// A truck waybill ("carta de porte automotor") as last reported by WSCPE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpeAutomotor {
    pub id: u64,
    /// Unique.
    pub nro_ctg: String,
    pub tipo_carta_porte: Option<String>,
    pub sucursal: Option<i64>,
    pub nro_orden: Option<i64>,
    pub estado: Option<String>,
    pub fecha_emision: Option<DateTime<Utc>>,
    pub fecha_inicio_estado: Option<DateTime<Utc>>,
    pub fecha_vencimiento: Option<DateTime<Utc>>,
    pub observaciones: Option<String>,
    /// Normalized `respuesta` tree.
    pub raw_response: Value,
    pub client_id: Option<u64>,
    pub provider_id: Option<u64>,
    pub product_id: Option<u64>,
    pub vehicle_id: Option<u64>,
    pub product_description: String,
    pub procedencia: String,
    pub destino: String,
    pub peso_bruto_descarga: Option<Decimal>,
    pub tariff: Option<Decimal>,
}

impl CpeAutomotor {
    pub fn new(nro_ctg: impl Into<String>) -> Self {
        Self {
            id: 0,
            nro_ctg: nro_ctg.into(),
            tipo_carta_porte: None,
            sucursal: None,
            nro_orden: None,
            estado: None,
            fecha_emision: None,
            fecha_inicio_estado: None,
            fecha_vencimiento: None,
            observaciones: None,
            raw_response: Value::Object(Default::default()),
            client_id: None,
            provider_id: None,
            product_id: None,
            vehicle_id: None,
            product_description: String::new(),
            procedencia: String::new(),
            destino: String::new(),
            peso_bruto_descarga: None,
            tariff: None,
        }
    }

    /// Tariff times weight; the bare tariff when there is no weight.
    pub fn total_amount(&self) -> Option<Decimal> {
        let tariff = self.tariff?;
        match self.peso_bruto_descarga {
            Some(peso) if !peso.is_zero() => Some(round_to(tariff * peso, 2)),
            _ => Some(tariff),
        }
    }

    pub fn list_view(&self, vehicle: Option<&Vehicle>) -> CpeListView {
        CpeListView {
            id: self.id,
            nro_ctg: self.nro_ctg.clone(),
            tipo_carta_porte: self.tipo_carta_porte.clone(),
            estado: self.estado.clone(),
            fecha_emision: self.fecha_emision,
            fecha_vencimiento: self.fecha_vencimiento,
            sucursal: self.sucursal,
            nro_orden: self.nro_orden,
            vehicle_domain: vehicle.map(|vehicle| vehicle.domain.clone()),
        }
    }

    pub fn invoice_view(&self, related: &CpeRelations) -> CpeInvoiceView {
        CpeInvoiceView {
            id: self.id,
            nro_ctg: self.nro_ctg.clone(),
            fecha_emision: self.fecha_emision,
            nro_orden: self.nro_orden,
            product_description: self.product_description.clone(),
            procedencia: self.procedencia.clone(),
            destino: self.destino.clone(),
            peso_bruto_descarga: self.peso_bruto_descarga,
            tariff: self.tariff,
            total_amount: self.total_amount(),
            client_id: self.client_id,
            client_name: related.client.as_ref().map(|client| client.name.clone()),
            provider_id: self.provider_id,
            provider_name: related.provider.as_ref().map(|provider| provider.name.clone()),
            product_id: self.product_id,
            product_name: related
                .product
                .as_ref()
                .map(|product| product.name.clone())
                .or_else(|| Some(self.product_description.clone()).filter(|d| !d.is_empty())),
            product_code: related
                .product
                .as_ref()
                .and_then(|product| product.afip_code.clone()),
            vehicle_domain: related.vehicle.as_ref().map(|vehicle| vehicle.domain.clone()),
        }
    }
}

/// Entities a waybill points at, loaded for views.
#[derive(Debug, Clone, Default)]
pub struct CpeRelations {
    pub client: Option<Client>,
    pub provider: Option<Provider>,
    pub product: Option<Product>,
    pub vehicle: Option<Vehicle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: u64,
    /// Uppercase alphanumeric plate, unique.
    pub domain: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CpeListView {
    pub id: u64,
    pub nro_ctg: String,
    pub tipo_carta_porte: Option<String>,
    pub estado: Option<String>,
    pub fecha_emision: Option<DateTime<Utc>>,
    pub fecha_vencimiento: Option<DateTime<Utc>>,
    pub sucursal: Option<i64>,
    pub nro_orden: Option<i64>,
    pub vehicle_domain: Option<String>,
}

/// Waybill row ready to be turned into an invoice line.
#[derive(Debug, Clone, Serialize)]
pub struct CpeInvoiceView {
    pub id: u64,
    pub nro_ctg: String,
    pub fecha_emision: Option<DateTime<Utc>>,
    pub nro_orden: Option<i64>,
    pub product_description: String,
    pub procedencia: String,
    pub destino: String,
    pub peso_bruto_descarga: Option<Decimal>,
    pub tariff: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub client_id: Option<u64>,
    pub client_name: Option<String>,
    pub provider_id: Option<u64>,
    pub provider_name: Option<String>,
    pub product_id: Option<u64>,
    pub product_name: Option<String>,
    pub product_code: Option<String>,
    pub vehicle_domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainStat {
    pub dominio: String,
    pub movimientos: u64,
    pub total_ctg: u64,
    pub facturacion: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainStatistics {
    pub mayores_movimientos: Vec<DomainStat>,
    pub mayor_facturacion: Vec<DomainStat>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn decimal(value: &str) -> Decimal {
        Decimal::from_str(value).expect("decimal")
    }

    #[test]
    fn total_amount_multiplies_tariff_by_weight() {
        let mut cpe = CpeAutomotor::new("10100000001");
        assert_eq!(cpe.total_amount(), None);

        cpe.tariff = Some(decimal("12.50"));
        assert_eq!(cpe.total_amount(), Some(decimal("12.50")));

        cpe.peso_bruto_descarga = Some(Decimal::ZERO);
        assert_eq!(cpe.total_amount(), Some(decimal("12.50")));

        cpe.peso_bruto_descarga = Some(decimal("30000"));
        assert_eq!(cpe.total_amount(), Some(decimal("375000.00")));
    }

    #[test]
    fn invoice_view_falls_back_to_description_without_product() {
        let mut cpe = CpeAutomotor::new("10100000002");
        cpe.product_description = "Soja".into();
        let view = cpe.invoice_view(&CpeRelations::default());
        assert_eq!(view.product_name.as_deref(), Some("Soja"));
        assert_eq!(view.product_code, None);
    }
}
