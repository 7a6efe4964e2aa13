//! ARCA invoice QR: compact JSON payload, base64 encoded into the verification URL.

use base64::Engine;
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Number;

use super::only_digits;
use super::wsfe::round_to;

/// Authorization kind: `E` for CAE, `A` for CAEA.
pub const CAE_AUTHORIZATION: &str = "E";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub ver: u8,
    pub fecha: String,
    pub cuit: u64,
    pub pto_vta: u32,
    pub tipo_cmp: u32,
    pub nro_cmp: u64,
    pub importe: Number,
    pub moneda: String,
    pub ctz: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tipo_doc_rec: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nro_doc_rec: Option<u64>,
    pub tipo_cod_aut: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cod_aut: Option<u64>,
}

/// Voucher data printed on the QR.
#[derive(Debug, Clone)]
pub struct QrVoucher<'a> {
    pub issue_date: NaiveDate,
    pub issuer_cuit: &'a str,
    pub pto_vta: u32,
    pub cbte_tipo: u32,
    pub cbte_nro: u64,
    pub total: Decimal,
    pub currency: &'a str,
    pub exchange_rate: Decimal,
    pub doc_tipo: Option<u32>,
    pub doc_nro: Option<&'a str>,
    pub cae: Option<&'a str>,
}

impl QrPayload {
    pub fn from_voucher(voucher: &QrVoucher<'_>) -> Self {
        let total = round_to(voucher.total, 2);
        let importe = if total.fract().is_zero() {
            total.to_i64().map(Number::from)
        } else {
            total.to_f64().and_then(Number::from_f64)
        }
        .unwrap_or_else(|| Number::from(0));

        let nro_doc_rec = voucher
            .doc_nro
            .map(only_digits)
            .and_then(|digits| digits.parse().ok());
        let (tipo_doc_rec, nro_doc_rec) = match (voucher.doc_tipo, nro_doc_rec) {
            (Some(tipo), Some(nro)) => (Some(tipo), Some(nro)),
            _ => (None, None),
        };

        Self {
            ver: 1,
            fecha: voucher.issue_date.format("%Y-%m-%d").to_string(),
            cuit: only_digits(voucher.issuer_cuit).parse().unwrap_or_default(),
            pto_vta: voucher.pto_vta,
            tipo_cmp: voucher.cbte_tipo,
            nro_cmp: voucher.cbte_nro,
            importe,
            moneda: voucher.currency.to_string(),
            ctz: voucher.exchange_rate.to_f64().unwrap_or(1.0),
            tipo_doc_rec,
            nro_doc_rec,
            tipo_cod_aut: CAE_AUTHORIZATION.to_string(),
            cod_aut: voucher.cae.and_then(|cae| only_digits(cae).parse().ok()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrLink {
    pub url: String,
    /// Base64 of the compact JSON, before URL encoding.
    pub payload_b64: String,
}

pub fn qr_link(base_url: &str, payload: &QrPayload) -> Result<QrLink, serde_json::Error> {
    let json = serde_json::to_vec(payload)?;
    let payload_b64 = base64::engine::general_purpose::STANDARD.encode(json);
    let encoded: String = form_urlencoded::byte_serialize(payload_b64.as_bytes()).collect();
    Ok(QrLink {
        url: format!("{base_url}?p={encoded}"),
        payload_b64,
    })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;

    fn voucher(total: &str) -> QrVoucher<'static> {
        QrVoucher {
            issue_date: NaiveDate::from_ymd_opt(2024, 1, 15).expect("date"),
            issuer_cuit: "30-71600472-0",
            pto_vta: 3,
            cbte_tipo: 11,
            cbte_nro: 42,
            total: Decimal::from_str(total).expect("decimal"),
            currency: "PES",
            exchange_rate: Decimal::ONE,
            doc_tipo: Some(80),
            doc_nro: Some("20-12345678-9"),
            cae: Some("74123456789012"),
        }
    }

    #[test]
    fn payload_follows_arca_layout() {
        let payload = QrPayload::from_voucher(&voucher("1500.00"));
        let value = serde_json::to_value(&payload).expect("serialize");

        assert_eq!(
            value,
            json!({
                "ver": 1, "fecha": "2024-01-15", "cuit": 30716004720u64, "ptoVta": 3,
                "tipoCmp": 11, "nroCmp": 42, "importe": 1500, "moneda": "PES", "ctz": 1.0,
                "tipoDocRec": 80, "nroDocRec": 20123456789u64, "tipoCodAut": "E",
                "codAut": 74123456789012u64
            })
        );
        assert_eq!(
            serde_json::to_value(QrPayload::from_voucher(&voucher("150.5"))).expect("serialize")["importe"],
            json!(150.5)
        );
    }

    #[test]
    fn missing_cae_is_omitted_and_link_is_url_encoded() {
        let mut input = voucher("10");
        input.cae = None;
        let payload = QrPayload::from_voucher(&input);
        let link = qr_link("https://www.arca.gob.ar/fe/qr/", &payload).expect("link");

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&link.payload_b64)
            .expect("base64");
        let value: serde_json::Value = serde_json::from_slice(&decoded).expect("json");
        assert!(value.get("codAut").is_none());
        assert!(link.url.starts_with("https://www.arca.gob.ar/fe/qr/?p=eyJ2ZXIiOjEs"));
        assert!(!link.url["https://www.arca.gob.ar/fe/qr/?p=".len()..].contains(|c: char| matches!(c, '+' | '/' | '=')));
    }
}
