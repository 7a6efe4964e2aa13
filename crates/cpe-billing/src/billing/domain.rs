use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::afip::qr::QrLink;
use crate::afip::wsfe::{AssociatedPeriod, AssociatedVoucher};

/// VAT condition of a client, keyed by the AFIP `CondicionIVAReceptorId` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum TaxCondition {
    ResponsableInscripto,
    Exento,
    #[default]
    ConsumidorFinal,
    Monotributo,
}

impl TaxCondition {
    pub const ALL: [TaxCondition; 4] = [
        Self::ResponsableInscripto,
        Self::Exento,
        Self::ConsumidorFinal,
        Self::Monotributo,
    ];

    pub fn code(self) -> u32 {
        match self {
            Self::ResponsableInscripto => 1,
            Self::Exento => 4,
            Self::ConsumidorFinal => 5,
            Self::Monotributo => 6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ResponsableInscripto => "Responsable Inscripto",
            Self::Exento => "IVA Sujeto Exento",
            Self::ConsumidorFinal => "Consumidor Final",
            Self::Monotributo => "Monotributo",
        }
    }
}

impl TryFrom<u32> for TaxCondition {
    type Error = String;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|condition| condition.code() == code)
            .ok_or_else(|| format!("\"{code}\" no es una elección válida."))
    }
}

impl From<TaxCondition> for u32 {
    fn from(condition: TaxCondition) -> Self {
        condition.code()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub tax_id: String,
    pub fiscal_address: String,
    pub tax_condition: TaxCondition,
    /// VAT rate as a fraction, used for class A/B vouchers.
    pub iva_rate: Decimal,
}

impl Client {
    pub fn default_iva_rate() -> Decimal {
        Decimal::new(21, 2)
    }

    pub fn view(&self) -> ClientView {
        ClientView {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            tax_id: self.tax_id.clone(),
            fiscal_address: self.fiscal_address.clone(),
            tax_condition: self.tax_condition,
            tax_condition_display: self.tax_condition.label(),
            iva_rate: self.iva_rate,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientView {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub tax_id: String,
    pub fiscal_address: String,
    pub tax_condition: TaxCondition,
    pub tax_condition_display: &'static str,
    pub iva_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub tax_id: String,
    pub fiscal_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    /// Unique when present.
    pub afip_code: Option<String>,
    pub default_tariff: Decimal,
}

/// Everything recorded next to an authorized voucher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceMetadata {
    pub condicion_iva_receptor_id: Option<u32>,
    pub iva_rate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cbtes_asoc: Option<Vec<AssociatedVoucher>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periodo_asoc: Option<AssociatedPeriod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr: Option<QrLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: u64,
    pub client_id: u64,
    pub amount: Decimal,
    pub pto_vta: u32,
    pub cbte_tipo: u32,
    pub cbte_nro: Option<u64>,
    pub cae: Option<String>,
    /// `YYYYMMDD`
    pub cae_due: Option<String>,
    pub xml_raw: Option<String>,
    pub metadata: InvoiceMetadata,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn view(&self, client: Option<&Client>) -> InvoiceView {
        InvoiceView {
            id: self.id,
            client: self.client_id,
            client_name: client.map(|client| client.name.clone()),
            client_email: client.map(|client| client.email.clone()),
            amount: self.amount,
            pto_vta: self.pto_vta,
            cbte_tipo: self.cbte_tipo,
            cbte_nro: self.cbte_nro,
            cae: self.cae.clone(),
            cae_due: self.cae_due.clone(),
            created_at: self.created_at,
            metadata: self.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceView {
    pub id: u64,
    pub client: u64,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub amount: Decimal,
    pub pto_vta: u32,
    pub cbte_tipo: u32,
    pub cbte_nro: Option<u64>,
    pub cae: Option<String>,
    pub cae_due: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata: InvoiceMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tax_conditions_round_trip_through_afip_codes() {
        assert_eq!(TaxCondition::try_from(1), Ok(TaxCondition::ResponsableInscripto));
        assert_eq!(TaxCondition::default().code(), 5);
        assert!(TaxCondition::try_from(2).is_err());
        assert_eq!(
            serde_json::to_value(TaxCondition::Monotributo).expect("serialize"),
            serde_json::json!(6)
        );
    }
}
