//! Pure extraction of waybill facts from a normalized WSCPE `respuesta` tree.
//!
//! AFIP is inconsistent about key names across CPE kinds and schema revisions, so every
//! fact is looked up through a list of candidate keys with [`find_first`].

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use super::domain::CpeAutomotor;
use crate::afip::only_digits;
use crate::afip::wsaa::argentina_offset;
use crate::afip::xml::{find_first, find_first_text, scalar_text};
use crate::billing::Product;

pub const CLIENT_TAX_ID_KEYS: &[&str] = &[
    "cuitDestinatario",
    "cuitDestino",
    "cuitDestinatarioFinal",
    "cuitDestinatarioComercial",
    "cuitPagadorFlete",
];
pub const PROVIDER_TAX_ID_KEYS: &[&str] =
    &["cuitTransportista", "cuitInterviniente", "cuitSolicitante"];
pub const PRODUCT_DESCRIPTION_KEYS: &[&str] = &[
    "descripcionProducto",
    "descProducto",
    "descripcionMercaderia",
    "mercaderia",
    "producto",
];
pub const PRODUCT_CODE_KEYS: &[&str] = &["codProducto", "codigoProducto", "idProducto", "codGrano"];
pub const ORIGIN_KEYS: &[&str] = &[
    "procedencia",
    "descripcionOrigen",
    "nombreEstablecimientoOrigen",
    "domicilioOrigen",
];
pub const DESTINATION_KEYS: &[&str] = &[
    "destino",
    "descripcionDestino",
    "nombreEstablecimientoDestino",
    "domicilioDestino",
];
pub const WEIGHT_KEYS: &[&str] = &["pesoBrutoDescarga", "pesoBruto", "pesoBrutoTotal"];
pub const VEHICLE_DOMAIN_KEYS: &[&str] = &[
    "dominio",
    "patente",
    "dominioCamion",
    "dominioCamión",
    "dominioChasis",
    "dominioAcoplado",
    "patenteCamion",
    "patenteChasis",
    "patenteAcoplado",
];

/// Plate reduced to uppercase alphanumerics; `None` when nothing is left.
pub fn normalize_domain(value: &str) -> Option<String> {
    let cleaned: String = value
        .trim()
        .to_uppercase()
        .chars()
        .filter(|ch| ch.is_alphanumeric())
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Decimal from AFIP text, accepting a comma as the decimal separator.
pub fn to_decimal(value: &str) -> Option<Decimal> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let normalized = value.replace(',', ".");
    Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .ok()
}

/// ISO-8601 timestamp with `Z` or an offset, or a naive one taken as Argentina time.
pub fn parse_afip_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%:z") {
        return Some(parsed.with_timezone(&Utc));
    }

    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;
    argentina_offset()
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
}

/// Facts needed to link a waybill to clients, providers, products and vehicles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaybillFacts {
    pub client_tax_id: String,
    pub provider_tax_id: String,
    pub product_description: Option<String>,
    pub product_code: Option<String>,
    pub procedencia: String,
    pub destino: String,
    pub peso_bruto_descarga: Option<Decimal>,
    pub vehicle_domain: Option<String>,
}

impl WaybillFacts {
    /// `weight_override` is used only when AFIP reports no weight.
    pub fn extract(data: &Value, weight_override: Option<Decimal>) -> Self {
        let tax_id = |keys: &[&str]| {
            find_first_text(data, keys)
                .map(|value| only_digits(&value))
                .unwrap_or_default()
        };

        Self {
            client_tax_id: tax_id(CLIENT_TAX_ID_KEYS),
            provider_tax_id: tax_id(PROVIDER_TAX_ID_KEYS),
            product_description: find_first_text(data, PRODUCT_DESCRIPTION_KEYS),
            product_code: find_first_text(data, PRODUCT_CODE_KEYS),
            procedencia: find_first_text(data, ORIGIN_KEYS).unwrap_or_default(),
            destino: find_first_text(data, DESTINATION_KEYS).unwrap_or_default(),
            peso_bruto_descarga: find_first_text(data, WEIGHT_KEYS)
                .and_then(|value| to_decimal(&value))
                .or(weight_override),
            vehicle_domain: find_first_text(data, VEHICLE_DOMAIN_KEYS)
                .and_then(|value| normalize_domain(&value)),
        }
    }
}

/// Copy `cabecera` fields onto the waybill.
pub fn apply_header(cpe: &mut CpeAutomotor, data: &Value) {
    let header = data.get("cabecera").unwrap_or(&Value::Null);
    let text = |key: &str| {
        header
            .get(key)
            .and_then(scalar_text)
            .filter(|value| !value.is_empty())
    };
    let integer = |key: &str| text(key).and_then(|value| value.parse::<i64>().ok());
    let datetime = |key: &str| text(key).and_then(|value| parse_afip_datetime(&value));

    cpe.tipo_carta_porte = text("tipoCartaPorte");
    cpe.sucursal = integer("sucursal");
    cpe.nro_orden = integer("nroOrden");
    cpe.estado = text("estado");
    cpe.fecha_emision = datetime("fechaEmision");
    cpe.fecha_inicio_estado = datetime("fechaInicioEstado");
    cpe.fecha_vencimiento = datetime("fechaVencimiento");
    cpe.observaciones = text("observaciones");
    cpe.raw_response = data.clone();
}

/// CTG the waybill is stored under: `cabecera.nroCTG`, else the one requested.
pub fn waybill_ctg(data: &Value, requested: &str) -> String {
    data.get("cabecera")
        .and_then(|header| find_first(header, &["nroCTG"]))
        .and_then(scalar_text)
        .filter(|ctg| !ctg.is_empty())
        .unwrap_or_else(|| requested.trim().to_string())
}

/// New waybills take the product default tariff; existing ones only when still unset.
pub fn apply_default_tariff(cpe: &mut CpeAutomotor, created: bool, product: Option<&Product>) {
    let Some(default_tariff) = product
        .map(|product| product.default_tariff)
        .filter(|tariff| !tariff.is_zero())
    else {
        return;
    };
    let unset = cpe.tariff.map_or(true, |tariff| tariff.is_zero());
    if created || unset {
        cpe.tariff = Some(default_tariff);
    }
}
