use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::FeError;
use crate::afip::only_digits;
use crate::afip::soap::escape_text;
use crate::afip::wsaa::Credentials;

pub const DEFAULT_CBTE_TIPO: u32 = 11;
pub const DEFAULT_CONCEPTO: u32 = 2;
pub const DEFAULT_DOC_TIPO: u32 = 80;
pub const DEFAULT_RECEPTOR_CONDITION: u32 = 5;

/// Debit and credit notes of classes A, B and C.
pub const NOTE_TYPES: [u32; 6] = [2, 3, 7, 8, 12, 13];
/// Class A and B vouchers discriminate VAT.
const VAT_DISCRIMINATING_TYPES: [u32; 6] = [1, 2, 3, 6, 7, 8];

pub fn is_note(cbte_tipo: u32) -> bool {
    NOTE_TYPES.contains(&cbte_tipo)
}

/// Voucher a debit/credit note refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociatedVoucher {
    pub tipo: u32,
    pub pto_vta: u32,
    pub nro: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuit: Option<String>,
    /// `YYYYMMDD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cbte_fch: Option<String>,
}

/// Period a debit/credit note refers to, both ends rendered `YYYYMMDD`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociatedPeriod {
    pub desde: String,
    pub hasta: String,
}

impl AssociatedPeriod {
    pub fn new(desde: NaiveDate, hasta: NaiveDate) -> Self {
        Self {
            desde: afip_date(desde),
            hasta: afip_date(hasta),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociatedDocuments {
    Vouchers(Vec<AssociatedVoucher>),
    Period(AssociatedPeriod),
}

/// Parameters of a single `FECAESolicitar` detail.
#[derive(Debug, Clone, PartialEq)]
pub struct CaeRequest {
    pub cuit: String,
    pub pto_vta: u32,
    pub cbte_tipo: u32,
    pub concepto: u32,
    pub doc_tipo: u32,
    pub doc_nro: String,
    pub amount: Decimal,
    pub issue_date: Option<NaiveDate>,
    pub service_start: Option<NaiveDate>,
    pub service_end: Option<NaiveDate>,
    pub payment_due: Option<NaiveDate>,
    pub currency: String,
    pub exchange_rate: Decimal,
    /// Explicit voucher number; the next free one is used when absent.
    pub cbte_nro: Option<u64>,
    pub receptor_condition: Option<u32>,
    /// VAT rate as a fraction (`0.21`), only used by class A/B vouchers.
    pub iva_rate: Decimal,
    pub associated: Option<AssociatedDocuments>,
}

impl CaeRequest {
    pub fn new(
        cuit: impl Into<String>,
        pto_vta: u32,
        doc_nro: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            cuit: cuit.into(),
            pto_vta,
            cbte_tipo: DEFAULT_CBTE_TIPO,
            concepto: DEFAULT_CONCEPTO,
            doc_tipo: DEFAULT_DOC_TIPO,
            doc_nro: doc_nro.into(),
            amount,
            issue_date: None,
            service_start: None,
            service_end: None,
            payment_due: None,
            currency: "PES".to_string(),
            exchange_rate: Decimal::ONE,
            cbte_nro: None,
            receptor_condition: None,
            iva_rate: Decimal::new(21, 2),
            associated: None,
        }
    }

    /// Fill defaults and compute the amounts that go on the wire.
    pub fn resolve(&self, today: NaiveDate) -> Result<ResolvedVoucher, FeError> {
        let doc_nro = only_digits(&self.doc_nro);
        if doc_nro.is_empty() {
            return Err(FeError::MissingDocument);
        }
        if is_note(self.cbte_tipo) && self.associated.is_none() {
            return Err(FeError::MissingAssociation);
        }

        let issue = self.issue_date.unwrap_or(today);
        let service_start = self.service_start.unwrap_or_else(|| first_day_of_month(issue));
        let service_end = self
            .service_end
            .unwrap_or_else(|| last_day_of_month(service_start));
        let payment_due = self.payment_due.unwrap_or(issue);

        let total = round_to(self.amount, 2);
        let (net, vat) = if VAT_DISCRIMINATING_TYPES.contains(&self.cbte_tipo) {
            let aliquot_id = aliquot_id(self.iva_rate)
                .ok_or(FeError::UnsupportedIvaRate(self.iva_rate))?;
            let net = round_to(total / (Decimal::ONE + self.iva_rate), 2);
            let amount = total - net;
            (
                net,
                Some(VatLine {
                    aliquot_id,
                    base: net,
                    amount,
                }),
            )
        } else {
            (total, None)
        };

        let associated = self.associated.clone().map(|documents| match documents {
            AssociatedDocuments::Vouchers(vouchers) => AssociatedDocuments::Vouchers(
                vouchers
                    .into_iter()
                    .map(|voucher| AssociatedVoucher {
                        cuit: Some(only_digits(voucher.cuit.as_deref().unwrap_or(&self.cuit)))
                            .filter(|cuit| !cuit.is_empty()),
                        ..voucher
                    })
                    .collect(),
            ),
            period => period,
        });

        Ok(ResolvedVoucher {
            pto_vta: self.pto_vta,
            cbte_tipo: self.cbte_tipo,
            concepto: self.concepto,
            doc_tipo: self.doc_tipo,
            doc_nro,
            cbte_fch: afip_date(issue),
            service_from: afip_date(service_start),
            service_to: afip_date(service_end),
            payment_due: afip_date(payment_due),
            total,
            net,
            vat,
            currency: self.currency.clone(),
            exchange_rate: round_to(self.exchange_rate, 3),
            receptor_condition: self.receptor_condition.unwrap_or(DEFAULT_RECEPTOR_CONDITION),
            associated,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VatLine {
    pub aliquot_id: u32,
    pub base: Decimal,
    pub amount: Decimal,
}

/// A [`CaeRequest`] with every default applied, ready to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVoucher {
    pub pto_vta: u32,
    pub cbte_tipo: u32,
    pub concepto: u32,
    pub doc_tipo: u32,
    pub doc_nro: String,
    pub cbte_fch: String,
    pub service_from: String,
    pub service_to: String,
    pub payment_due: String,
    pub total: Decimal,
    pub net: Decimal,
    pub vat: Option<VatLine>,
    pub currency: String,
    pub exchange_rate: Decimal,
    pub receptor_condition: u32,
    pub associated: Option<AssociatedDocuments>,
}

impl ResolvedVoucher {
    pub fn vat_amount(&self) -> Decimal {
        self.vat.as_ref().map_or(round_to(Decimal::ZERO, 2), |line| line.amount)
    }
}

/// AFIP aliquot identifier for a VAT rate expressed as a fraction.
pub fn aliquot_id(rate: Decimal) -> Option<u32> {
    let percent = (rate * Decimal::ONE_HUNDRED).normalize();
    [
        (Decimal::ZERO, 3),
        (Decimal::new(105, 1), 4),
        (Decimal::new(21, 0), 5),
        (Decimal::new(27, 0), 6),
        (Decimal::new(5, 0), 8),
        (Decimal::new(25, 1), 9),
    ]
    .into_iter()
    .find(|(candidate, _)| *candidate == percent)
    .map(|(_, id)| id)
}

/// Round half away from zero and pin the scale so amounts render with fixed decimals.
pub fn round_to(value: Decimal, places: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(places);
    rounded
}

pub fn afip_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

fn first_day_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let anchor = date.with_day(28).unwrap_or(date) + Duration::days(4);
    first_day_of_month(anchor) - Duration::days(1)
}

pub(super) fn auth_block(credentials: &Credentials, cuit: &str) -> String {
    format!(
        "<ar:Auth><ar:Token>{}</ar:Token><ar:Sign>{}</ar:Sign><ar:Cuit>{}</ar:Cuit></ar:Auth>",
        escape_text(&credentials.token),
        escape_text(&credentials.sign),
        escape_text(cuit),
    )
}

pub(super) fn envelope(operation: &str, inner: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:ar="{ns}">
  <soapenv:Header/>
  <soapenv:Body>
    <ar:{operation}>{inner}</ar:{operation}>
  </soapenv:Body>
</soapenv:Envelope>"#,
        ns = super::WSFE_NAMESPACE,
    )
}

pub fn last_authorized_envelope(
    credentials: &Credentials,
    cuit: &str,
    pto_vta: u32,
    cbte_tipo: u32,
) -> String {
    let inner = format!(
        "{}<ar:PtoVta>{pto_vta}</ar:PtoVta><ar:CbteTipo>{cbte_tipo}</ar:CbteTipo>",
        auth_block(credentials, cuit)
    );
    envelope("FECompUltimoAutorizado", &inner)
}

pub fn voucher_types_envelope(credentials: &Credentials, cuit: &str) -> String {
    envelope("FEParamGetTiposCbte", &auth_block(credentials, cuit))
}

pub fn cae_envelope(
    credentials: &Credentials,
    cuit: &str,
    voucher: &ResolvedVoucher,
    cbte_nro: u64,
) -> String {
    let mut detail = format!(
        "<ar:Concepto>{concepto}</ar:Concepto>\
         <ar:DocTipo>{doc_tipo}</ar:DocTipo>\
         <ar:DocNro>{doc_nro}</ar:DocNro>\
         <ar:CbteDesde>{cbte_nro}</ar:CbteDesde>\
         <ar:CbteHasta>{cbte_nro}</ar:CbteHasta>\
         <ar:CbteFch>{cbte_fch}</ar:CbteFch>\
         <ar:ImpTotal>{total}</ar:ImpTotal>\
         <ar:ImpTotConc>0.00</ar:ImpTotConc>\
         <ar:ImpNeto>{net}</ar:ImpNeto>\
         <ar:ImpOpEx>0.00</ar:ImpOpEx>\
         <ar:ImpTrib>0.00</ar:ImpTrib>\
         <ar:ImpIVA>{vat}</ar:ImpIVA>\
         <ar:FchServDesde>{from}</ar:FchServDesde>\
         <ar:FchServHasta>{to}</ar:FchServHasta>\
         <ar:FchVtoPago>{due}</ar:FchVtoPago>\
         <ar:MonId>{currency}</ar:MonId>\
         <ar:MonCotiz>{rate}</ar:MonCotiz>\
         <ar:CondicionIVAReceptorId>{condition}</ar:CondicionIVAReceptorId>",
        concepto = voucher.concepto,
        doc_tipo = voucher.doc_tipo,
        doc_nro = voucher.doc_nro,
        cbte_fch = voucher.cbte_fch,
        total = voucher.total,
        net = voucher.net,
        vat = voucher.vat_amount(),
        from = voucher.service_from,
        to = voucher.service_to,
        due = voucher.payment_due,
        currency = escape_text(&voucher.currency),
        rate = voucher.exchange_rate,
        condition = voucher.receptor_condition,
    );

    if let Some(AssociatedDocuments::Vouchers(vouchers)) = &voucher.associated {
        detail.push_str("<ar:CbtesAsoc>");
        for associated in vouchers {
            detail.push_str(&format!(
                "<ar:CbteAsoc><ar:Tipo>{}</ar:Tipo><ar:PtoVta>{}</ar:PtoVta><ar:Nro>{}</ar:Nro>",
                associated.tipo, associated.pto_vta, associated.nro
            ));
            if let Some(cuit) = &associated.cuit {
                detail.push_str(&format!("<ar:Cuit>{}</ar:Cuit>", escape_text(cuit)));
            }
            if let Some(date) = &associated.cbte_fch {
                detail.push_str(&format!("<ar:CbteFch>{}</ar:CbteFch>", escape_text(date)));
            }
            detail.push_str("</ar:CbteAsoc>");
        }
        detail.push_str("</ar:CbtesAsoc>");
    }

    if let Some(line) = &voucher.vat {
        detail.push_str(&format!(
            "<ar:Iva><ar:AlicIva><ar:Id>{}</ar:Id><ar:BaseImp>{}</ar:BaseImp><ar:Importe>{}</ar:Importe></ar:AlicIva></ar:Iva>",
            line.aliquot_id, line.base, line.amount
        ));
    }

    // FECAEDetRequest is a sequence: PeriodoAsoc closes it, after Iva.
    if let Some(AssociatedDocuments::Period(period)) = &voucher.associated {
        detail.push_str(&format!(
            "<ar:PeriodoAsoc><ar:FchDesde>{}</ar:FchDesde><ar:FchHasta>{}</ar:FchHasta></ar:PeriodoAsoc>",
            escape_text(&period.desde),
            escape_text(&period.hasta)
        ));
    }

    let inner = format!(
        "{auth}<ar:FeCAEReq><ar:FeCabReq><ar:CantReg>1</ar:CantReg><ar:PtoVta>{pto_vta}</ar:PtoVta>\
         <ar:CbteTipo>{cbte_tipo}</ar:CbteTipo></ar:FeCabReq><ar:FeDetReq><ar:FECAEDetRequest>\
         {detail}</ar:FECAEDetRequest></ar:FeDetReq></ar:FeCAEReq>",
        auth = auth_block(credentials, cuit),
        pto_vta = voucher.pto_vta,
        cbte_tipo = voucher.cbte_tipo,
    );
    envelope("FECAESolicitar", &inner)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::afip::xml::{child_text, descendant_text, find_element, parse_document};

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn decimal(value: &str) -> Decimal {
        Decimal::from_str(value).expect("valid decimal")
    }

    #[test]
    fn defaults_follow_the_issue_month() {
        let request = CaeRequest::new("30716004720", 3, "20-12345678-9", decimal("1500.005"));
        let voucher = request.resolve(date("2024-02-10")).expect("resolves");

        assert_eq!(voucher.doc_nro, "20123456789");
        assert_eq!(voucher.cbte_fch, "20240210");
        assert_eq!(voucher.service_from, "20240201");
        assert_eq!(voucher.service_to, "20240229");
        assert_eq!(voucher.payment_due, "20240210");
        assert_eq!(voucher.total.to_string(), "1500.01");
        assert_eq!(voucher.net, voucher.total);
        assert_eq!(voucher.vat_amount().to_string(), "0.00");
        assert_eq!(voucher.exchange_rate.to_string(), "1.000");
        assert_eq!(voucher.receptor_condition, 5);
    }

    #[test]
    fn service_end_defaults_to_end_of_start_month() {
        let mut request = CaeRequest::new("30716004720", 3, "20123456789", decimal("10"));
        request.issue_date = Some(date("2024-03-05"));
        request.service_start = Some(date("2023-12-15"));
        let voucher = request.resolve(date("2024-01-01")).expect("resolves");

        assert_eq!(voucher.service_from, "20231215");
        assert_eq!(voucher.service_to, "20231231");
    }

    #[test]
    fn notes_require_associated_documents_and_a_document_number() {
        let mut request = CaeRequest::new("30716004720", 3, "20123456789", decimal("10"));
        request.cbte_tipo = 13;
        let err = request.resolve(date("2024-01-01")).expect_err("missing association");
        assert_eq!(
            err.to_string(),
            "Para Notas de Débito/Crédito debés enviar cbtes_asoc o periodo_asoc"
        );

        let request = CaeRequest::new("30716004720", 3, "--", decimal("10"));
        assert!(matches!(
            request.resolve(date("2024-01-01")),
            Err(FeError::MissingDocument)
        ));
    }

    #[test]
    fn class_a_vouchers_split_vat() {
        let mut request = CaeRequest::new("30716004720", 1, "30123456789", decimal("121"));
        request.cbte_tipo = 1;
        let voucher = request.resolve(date("2024-01-01")).expect("resolves");

        let line = voucher.vat.clone().expect("vat line");
        assert_eq!(line.aliquot_id, 5);
        assert_eq!(voucher.net.to_string(), "100.00");
        assert_eq!(line.amount.to_string(), "21.00");

        let xml = cae_envelope(&Credentials::new("T", "S"), "30716004720", &voucher, 7);
        assert!(xml.contains("<ar:ImpIVA>21.00</ar:ImpIVA>"));
        assert!(xml.contains("<ar:AlicIva><ar:Id>5</ar:Id><ar:BaseImp>100.00</ar:BaseImp>"));
    }

    #[test]
    fn associated_vouchers_default_to_issuer_cuit() {
        let mut request = CaeRequest::new("30716004720", 3, "20123456789", decimal("50"));
        request.cbte_tipo = 13;
        request.associated = Some(AssociatedDocuments::Vouchers(vec![AssociatedVoucher {
            tipo: 11,
            pto_vta: 3,
            nro: 8,
            cuit: None,
            cbte_fch: Some("20240115".into()),
        }]));
        let voucher = request.resolve(date("2024-01-20")).expect("resolves");
        let xml = cae_envelope(&Credentials::new("T", "S"), "30716004720", &voucher, 9);

        assert!(xml.contains(
            "<ar:CbteAsoc><ar:Tipo>11</ar:Tipo><ar:PtoVta>3</ar:PtoVta><ar:Nro>8</ar:Nro>\
             <ar:Cuit>30716004720</ar:Cuit><ar:CbteFch>20240115</ar:CbteFch></ar:CbteAsoc>"
        ));
        assert!(xml.contains("<ar:CbteDesde>9</ar:CbteDesde><ar:CbteHasta>9</ar:CbteHasta>"));
        assert!(!xml.contains("<ar:Iva>"));
    }

    #[test]
    fn period_association_follows_vat_lines() {
        let mut request = CaeRequest::new("30716004720", 1, "30123456789", decimal("121"));
        request.cbte_tipo = 3;
        request.associated = Some(AssociatedDocuments::Period(AssociatedPeriod::new(
            date("2024-01-01"),
            date("2024-01-31"),
        )));
        let voucher = request.resolve(date("2024-02-05")).expect("resolves");
        let xml = cae_envelope(&Credentials::new("T", "S"), "30716004720", &voucher, 4);

        let iva = xml.find("<ar:Iva>").expect("vat block");
        let period = xml.find("<ar:PeriodoAsoc>").expect("period block");
        assert!(iva < period);
        assert!(xml.contains(
            "<ar:PeriodoAsoc><ar:FchDesde>20240101</ar:FchDesde><ar:FchHasta>20240131</ar:FchHasta></ar:PeriodoAsoc></ar:FECAEDetRequest>"
        ));
    }

    #[test]
    fn voucher_text_is_escaped() {
        let mut request = CaeRequest::new("30716004720", 3, "20123456789", decimal("50"));
        request.cbte_tipo = 13;
        request.currency = "P&<\"S'".into();
        request.associated = Some(AssociatedDocuments::Vouchers(vec![AssociatedVoucher {
            tipo: 11,
            pto_vta: 3,
            nro: 8,
            cuit: Some("30716004720".into()),
            cbte_fch: Some("2024<01>&\"15\"".into()),
        }]));
        let voucher = request.resolve(date("2024-01-20")).expect("resolves");
        let xml = cae_envelope(&Credentials::new("T&<", "S\""), "30716004720", &voucher, 9);

        assert!(xml.contains("<ar:MonId>P&amp;&lt;&quot;S&apos;</ar:MonId>"));
        let document = parse_document(&xml).expect("well-formed envelope");
        let root = document.root_element();
        assert_eq!(descendant_text(root, "MonId").as_deref(), Some("P&<\"S'"));
        let associated = find_element(root, "CbteAsoc").expect("associated voucher");
        assert_eq!(child_text(associated, "CbteFch"), "2024<01>&\"15\"");
        assert_eq!(descendant_text(root, "Token").as_deref(), Some("T&<"));
    }

    #[test]
    fn aliquot_ids_cover_afip_rates() {
        assert_eq!(aliquot_id(decimal("0.21")), Some(5));
        assert_eq!(aliquot_id(decimal("0.105")), Some(4));
        assert_eq!(aliquot_id(decimal("0.025")), Some(9));
        assert_eq!(aliquot_id(Decimal::ZERO), Some(3));
        assert_eq!(aliquot_id(decimal("0.19")), None);
    }
}
