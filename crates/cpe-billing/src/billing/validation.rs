//! Typed request bodies and their validation into field-keyed error maps.
//!
//! Bodies deserialize leniently (every field is an [`Input`] of a loosely typed
//! [`Scalar`]) so that a wrong type becomes a per-field message instead of a rejected
//! body; each payload's validating method then builds the domain value.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};

use super::domain::{Client, Product, Provider, TaxCondition};
use crate::afip::only_digits;
use crate::afip::wsfe::{
    afip_date, is_note, round_to, AssociatedDocuments, AssociatedPeriod, AssociatedVoucher,
    DEFAULT_CBTE_TIPO, DEFAULT_DOC_TIPO,
};

pub const NON_FIELD_ERRORS: &str = "non_field_errors";
pub const INVALID_BODY: &str = "Datos inválidos. Se esperaba un objeto JSON.";

const REQUIRED: &str = "Este campo es requerido.";
const NOT_NULL: &str = "Este campo no puede ser nulo.";
const INVALID_STRING: &str = "No es una cadena válida.";
const INVALID_INTEGER: &str = "Se requiere un número entero válido.";
const INVALID_DECIMAL: &str = "Se requiere un número válido.";
const NEGATIVE: &str = "Asegúrese de que este valor sea mayor o igual a 0.";
const TOO_MANY_DECIMALS: &str = "Asegúrese de que no haya más de 2 decimales.";

/// Validation failures keyed by field name, serialized as `{"field": ["message", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// Keep a field's value, or record why it was rejected.
    fn check<T>(&mut self, field: &str, outcome: Result<Option<T>, String>) -> Option<T> {
        match outcome {
            Ok(value) => value,
            Err(message) => {
                self.add(field, message);
                None
            }
        }
    }

    fn finish(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{field}: {}", messages.join(" ")))
            .collect();
        f.write_str(&rendered.join("; "))
    }
}

impl std::error::Error for FieldErrors {}

/// Accepts `YYYYMMDD` or `YYYY-MM-DD`.
pub fn parse_afip_date(value: &str) -> Result<NaiveDate, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("No puede estar vacío.".to_string());
    }
    ["%Y%m%d", "%Y-%m-%d"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .ok_or_else(|| "Formato de fecha inválido. Usá YYYYMMDD o YYYY-MM-DD.".to_string())
}

/// A body field as sent: absent, explicit `null`, or a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Input<T> {
    Missing,
    Null,
    Given(T),
}

impl<T> Default for Input<T> {
    fn default() -> Self {
        Input::Missing
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Input<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<T>::deserialize(deserializer)?.map_or(Input::Null, Input::Given))
    }
}

impl<T> Input<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Input::Missing)
    }

    /// Parse a sent value. Missing and null are errors only when `required`.
    fn read<U>(
        &self,
        required: bool,
        parse: impl FnOnce(&T) -> Result<U, String>,
    ) -> Result<Option<U>, String> {
        match self {
            Input::Given(value) => parse(value).map(Some),
            Input::Missing if required => Err(REQUIRED.to_string()),
            Input::Null if required => Err(NOT_NULL.to_string()),
            Input::Missing | Input::Null => Ok(None),
        }
    }
}

/// A scalar body value. Numbers may arrive as strings and identifiers as numbers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Number(Number),
    Other(Value),
}

impl Scalar {
    fn text(&self) -> Result<String, String> {
        match self {
            Scalar::Text(text) => Ok(text.clone()),
            Scalar::Number(number) => Ok(number.to_string()),
            Scalar::Other(_) => Err(INVALID_STRING.to_string()),
        }
    }

    fn integer(&self) -> Result<i64, String> {
        let parsed = match self {
            Scalar::Number(number) => number
                .as_i64()
                .or_else(|| number.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Scalar::Text(text) => text.trim().parse().ok(),
            Scalar::Other(_) => None,
        };
        parsed.ok_or_else(|| INVALID_INTEGER.to_string())
    }

    fn unsigned<U: TryFrom<i64>>(&self) -> Result<U, String> {
        U::try_from(self.integer()?).map_err(|_| NEGATIVE.to_string())
    }

    fn decimal(&self) -> Result<Decimal, String> {
        let parsed = match self {
            Scalar::Number(number) => Decimal::from_str(&number.to_string())
                .or_else(|_| Decimal::from_scientific(&number.to_string()))
                .ok(),
            Scalar::Text(text) => Decimal::from_str(text.trim()).ok(),
            Scalar::Other(_) => None,
        };
        parsed.ok_or_else(|| INVALID_DECIMAL.to_string())
    }

    fn date(&self) -> Result<NaiveDate, String> {
        parse_afip_date(&self.text()?)
    }

    /// Trimmed text that must not be blank.
    fn filled(&self, blank_message: &str) -> Result<String, String> {
        let text = self.text()?;
        match text.trim() {
            "" => Err(blank_message.to_string()),
            trimmed => Ok(trimmed.to_string()),
        }
    }
}

/// Money with at most two decimals, rendered with exactly two.
fn money(value: Decimal) -> Result<Decimal, String> {
    if value.normalize().scale() > 2 {
        return Err(TOO_MANY_DECIMALS.to_string());
    }
    Ok(round_to(value, 2))
}

/// Required non-blank text; on PATCH only checked when sent.
fn set_text(
    errors: &mut FieldErrors,
    field: &str,
    input: &Input<Scalar>,
    partial: bool,
    blank_message: &str,
    target: &mut String,
) {
    if partial && input.is_missing() {
        return;
    }
    if let Some(text) = errors.check(field, input.read(true, |value| value.filled(blank_message))) {
        *target = text;
    }
}

const NAME_BLANK: &str = "Ingresá el nombre o razón social del cliente.";
const EMAIL_BLANK: &str = "Ingresá el email de contacto del cliente.";
const TAX_ID_BLANK: &str = "Ingresá el número de CUIT/CUIL del cliente.";
const ADDRESS_BLANK: &str = "Ingresá la dirección fiscal del cliente.";

/// Body of the client create, replace and patch endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientPayload {
    pub name: Input<Scalar>,
    pub email: Input<Scalar>,
    pub tax_id: Input<Scalar>,
    pub fiscal_address: Input<Scalar>,
    pub tax_condition: Input<Scalar>,
    pub iva_rate: Input<Scalar>,
}

impl ClientPayload {
    /// Apply onto `client`. `partial` (PATCH) only validates the fields sent.
    pub fn apply(&self, client: &mut Client, partial: bool) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();

        set_text(&mut errors, "name", &self.name, partial, NAME_BLANK, &mut client.name);
        if !(partial && self.email.is_missing()) {
            let email = self.email.read(true, |value| {
                let email = value.filled(EMAIL_BLANK)?;
                if email.contains('@') {
                    Ok(email)
                } else {
                    Err("Introduzca una dirección de correo electrónico válida.".to_string())
                }
            });
            if let Some(email) = errors.check("email", email) {
                client.email = email;
            }
        }
        set_text(&mut errors, "tax_id", &self.tax_id, partial, TAX_ID_BLANK, &mut client.tax_id);
        set_text(
            &mut errors,
            "fiscal_address",
            &self.fiscal_address,
            partial,
            ADDRESS_BLANK,
            &mut client.fiscal_address,
        );

        let condition = self
            .tax_condition
            .read(false, |value| TaxCondition::try_from(value.unsigned::<u32>()?));
        if let Some(condition) = errors.check("tax_condition", condition) {
            client.tax_condition = condition;
        }
        let rate = self.iva_rate.read(false, |value| {
            let rate = value.decimal()?;
            if rate < Decimal::ZERO || rate >= Decimal::ONE {
                Err("La alícuota debe estar entre 0 y 1 (por ejemplo 0.21).".to_string())
            } else {
                Ok(rate)
            }
        });
        if let Some(rate) = errors.check("iva_rate", rate) {
            client.iva_rate = rate;
        }

        errors.finish()
    }

    pub fn new_client(&self) -> Result<Client, FieldErrors> {
        let mut client = Client {
            id: 0,
            name: String::new(),
            email: String::new(),
            tax_id: String::new(),
            fiscal_address: String::new(),
            tax_condition: TaxCondition::default(),
            iva_rate: Client::default_iva_rate(),
        };
        self.apply(&mut client, false)?;
        Ok(client)
    }
}

/// Body of `POST /api/proveedores/`; only the name is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderPayload {
    pub name: Input<Scalar>,
    pub email: Input<Scalar>,
    pub tax_id: Input<Scalar>,
    pub fiscal_address: Input<Scalar>,
}

impl ProviderPayload {
    pub fn provider(&self) -> Result<Provider, FieldErrors> {
        let mut errors = FieldErrors::default();
        let mut optional = |field: &str, input: &Input<Scalar>| {
            errors
                .check(field, input.read(false, Scalar::text))
                .map(|text| text.trim().to_string())
                .unwrap_or_default()
        };
        let email = optional("email", &self.email);
        let tax_id = optional("tax_id", &self.tax_id);
        let fiscal_address = optional("fiscal_address", &self.fiscal_address);

        let mut name = String::new();
        set_text(
            &mut errors,
            "name",
            &self.name,
            false,
            "Ingresá el nombre del proveedor.",
            &mut name,
        );
        errors.finish()?;

        Ok(Provider {
            id: 0,
            name,
            email,
            tax_id,
            fiscal_address,
        })
    }
}

/// Body of the product create, replace and patch endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductPayload {
    pub name: Input<Scalar>,
    pub afip_code: Input<Scalar>,
    pub default_tariff: Input<Scalar>,
}

impl ProductPayload {
    /// Blank or null codes clear the code; tariffs must not be negative.
    pub fn apply(&self, product: &mut Product, partial: bool) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();

        set_text(
            &mut errors,
            "name",
            &self.name,
            partial,
            "Ingresá el nombre del producto.",
            &mut product.name,
        );
        match &self.afip_code {
            Input::Missing => {}
            Input::Null => product.afip_code = None,
            Input::Given(Scalar::Text(code)) => {
                let code = code.trim();
                product.afip_code = (!code.is_empty()).then(|| code.to_string());
            }
            Input::Given(_) => errors.add("afip_code", INVALID_STRING),
        }
        let tariff = self.default_tariff.read(false, |value| {
            let tariff = value.decimal()?;
            if tariff < Decimal::ZERO {
                return Err("La tarifa predeterminada no puede ser negativa.".to_string());
            }
            money(tariff)
        });
        if let Some(tariff) = errors.check("default_tariff", tariff) {
            product.default_tariff = tariff;
        }

        errors.finish()
    }

    pub fn new_product(&self) -> Result<Product, FieldErrors> {
        let mut product = Product {
            id: 0,
            name: String::new(),
            afip_code: None,
            default_tariff: round_to(Decimal::ZERO, 2),
        };
        self.apply(&mut product, false)?;
        Ok(product)
    }
}

/// Body of `PATCH /api/cpe/:id/tarifa/`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TariffPayload {
    pub tariff: Input<Scalar>,
}

impl TariffPayload {
    pub fn tariff(&self) -> Result<Decimal, FieldErrors> {
        let mut errors = FieldErrors::default();
        let tariff = self.tariff.read(true, |value| {
            let tariff = value.decimal()?;
            if tariff < Decimal::ZERO {
                return Err("La tarifa debe ser mayor o igual a cero.".to_string());
            }
            money(tariff)
        });
        let tariff = errors.check("tariff", tariff);
        errors.finish()?;
        tariff.ok_or_else(|| FieldErrors::single("tariff", INVALID_DECIMAL))
    }
}

/// Validated `POST /api/facturas/emitir/` body.
#[derive(Debug, Clone, PartialEq)]
pub struct EmitInvoiceCommand {
    pub client_id: u64,
    pub amount: Decimal,
    pub pto_vta: u32,
    pub cbte_tipo: u32,
    pub doc_tipo: u32,
    pub doc_nro: String,
    pub receptor_condition: Option<u32>,
    pub concepto: Option<u32>,
    pub issue_date: Option<NaiveDate>,
    pub service_start: Option<NaiveDate>,
    pub service_end: Option<NaiveDate>,
    pub payment_due: Option<NaiveDate>,
    pub iva_rate: Option<Decimal>,
    pub associated: Option<AssociatedDocuments>,
}

/// `POST /api/facturas/emitir/` body as sent. `cbtes_asoc` may be one object or a list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmitInvoicePayload {
    pub client_id: Input<Scalar>,
    pub amount: Input<Scalar>,
    pub pto_vta: Input<Scalar>,
    pub cbte_tipo: Input<Scalar>,
    pub doc_tipo: Input<Scalar>,
    pub doc_nro: Input<Scalar>,
    pub condicion_iva_receptor_id: Input<Scalar>,
    pub concepto: Input<Scalar>,
    pub issue_date: Input<Scalar>,
    pub service_start: Input<Scalar>,
    pub service_end: Input<Scalar>,
    pub payment_due: Input<Scalar>,
    pub iva_rate: Input<Scalar>,
    pub cbtes_asoc: Input<Value>,
    pub periodo_asoc: Input<Value>,
}

impl EmitInvoicePayload {
    pub fn command(&self) -> Result<EmitInvoiceCommand, FieldErrors> {
        let mut errors = FieldErrors::default();

        let client_id = errors.check("client_id", self.client_id.read(true, Scalar::unsigned::<u64>));
        let amount = self.amount.read(true, |value| {
            let amount = money(value.decimal()?)?;
            if amount <= Decimal::ZERO {
                return Err("El importe debe ser mayor a cero.".to_string());
            }
            Ok(amount)
        });
        let amount = errors.check("amount", amount);
        let pto_vta = errors.check("pto_vta", self.pto_vta.read(true, Scalar::unsigned::<u32>));
        let cbte_tipo = errors
            .check("cbte_tipo", self.cbte_tipo.read(false, Scalar::unsigned::<u32>))
            .unwrap_or(DEFAULT_CBTE_TIPO);
        let doc_tipo = errors
            .check("doc_tipo", self.doc_tipo.read(false, Scalar::unsigned::<u32>))
            .unwrap_or(DEFAULT_DOC_TIPO);
        let doc_nro = self
            .doc_nro
            .read(true, |value| value.filled("Este campo no puede estar en blanco."));
        let doc_nro = errors.check("doc_nro", doc_nro);
        let receptor_condition = errors.check(
            "condicion_iva_receptor_id",
            self.condicion_iva_receptor_id.read(false, Scalar::unsigned::<u32>),
        );
        let concepto = errors.check("concepto", self.concepto.read(false, Scalar::unsigned::<u32>));
        let issue_date = errors.check("issue_date", self.issue_date.read(false, Scalar::date));
        let service_start =
            errors.check("service_start", self.service_start.read(false, Scalar::date));
        let service_end = errors.check("service_end", self.service_end.read(false, Scalar::date));
        let payment_due = errors.check("payment_due", self.payment_due.read(false, Scalar::date));
        let iva_rate = errors.check("iva_rate", self.iva_rate.read(false, Scalar::decimal));

        let vouchers = match &self.cbtes_asoc {
            Input::Given(value) => associated_vouchers(value, &mut errors),
            Input::Missing | Input::Null => None,
        };
        let period = match &self.periodo_asoc {
            Input::Given(value) => associated_period(value, &mut errors),
            Input::Missing | Input::Null => None,
        };

        let associated = match (vouchers, period) {
            (Some(vouchers), Some(_)) if !vouchers.is_empty() => {
                errors.add(
                    NON_FIELD_ERRORS,
                    "No podés enviar cbtes_asoc y periodo_asoc al mismo tiempo.",
                );
                None
            }
            (Some(vouchers), _) if !vouchers.is_empty() => {
                Some(AssociatedDocuments::Vouchers(vouchers))
            }
            (_, Some(period)) => Some(AssociatedDocuments::Period(period)),
            _ => None,
        };
        if is_note(cbte_tipo)
            && associated.is_none()
            && !errors.contains("cbtes_asoc")
            && !errors.contains("periodo_asoc")
            && !errors.contains(NON_FIELD_ERRORS)
        {
            errors.add(
                NON_FIELD_ERRORS,
                "Las Notas de Débito/Crédito requieren cbtes_asoc o periodo_asoc.",
            );
        }

        errors.finish()?;

        match (client_id, amount, pto_vta, doc_nro) {
            (Some(client_id), Some(amount), Some(pto_vta), Some(doc_nro)) => {
                Ok(EmitInvoiceCommand {
                    client_id,
                    amount,
                    pto_vta,
                    cbte_tipo,
                    doc_tipo,
                    doc_nro,
                    receptor_condition,
                    concepto,
                    issue_date,
                    service_start,
                    service_end,
                    payment_due,
                    iva_rate,
                    associated,
                })
            }
            _ => Err(FieldErrors::single("client_id", "Se requiere un identificador válido.")),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AssociatedVoucherInput {
    tipo: Input<Scalar>,
    pto_vta: Input<Scalar>,
    nro: Input<Scalar>,
    cuit: Input<Scalar>,
    cbte_fch: Input<Scalar>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AssociatedPeriodInput {
    desde: Input<Scalar>,
    hasta: Input<Scalar>,
}

fn associated_vouchers(value: &Value, errors: &mut FieldErrors) -> Option<Vec<AssociatedVoucher>> {
    const FIELD: &str = "cbtes_asoc";
    const OUT_OF_RANGE: &str =
        "'tipo', 'pto_vta' y 'nro' deben ser mayores o iguales a cero (tipo > 0).";

    let items: Vec<&Value> = match value {
        Value::Object(_) => vec![value],
        Value::Array(items) => items.iter().collect(),
        _ => {
            errors.add(FIELD, "cbtes_asoc debe ser un objeto o una lista de objetos.");
            return None;
        }
    };

    let mut vouchers = Vec::with_capacity(items.len());
    for (position, item) in items.into_iter().enumerate() {
        let input = match item {
            Value::Object(_) => AssociatedVoucherInput::deserialize(item).ok(),
            _ => None,
        };
        let Some(input) = input else {
            errors.add(
                FIELD,
                format!("El elemento en la posición {position} debe ser un objeto."),
            );
            return None;
        };

        if input.tipo.is_missing() || input.pto_vta.is_missing() || input.nro.is_missing() {
            errors.add(
                FIELD,
                "Cada comprobante asociado debe incluir 'tipo', 'pto_vta' y 'nro'.",
            );
            return None;
        }
        let numbers = (
            input.tipo.read(true, Scalar::integer),
            input.pto_vta.read(true, Scalar::integer),
            input.nro.read(true, Scalar::integer),
        );
        let (Ok(Some(tipo)), Ok(Some(pto_vta)), Ok(Some(nro))) = numbers else {
            errors.add(FIELD, "'tipo', 'pto_vta' y 'nro' deben ser numéricos.");
            return None;
        };
        let (Ok(tipo), Ok(pto_vta), Ok(nro)) =
            (u32::try_from(tipo), u32::try_from(pto_vta), u64::try_from(nro))
        else {
            errors.add(FIELD, OUT_OF_RANGE);
            return None;
        };
        if tipo == 0 {
            errors.add(FIELD, OUT_OF_RANGE);
            return None;
        }

        let cuit = input
            .cuit
            .read(false, Scalar::text)
            .ok()
            .flatten()
            .map(|cuit| only_digits(&cuit))
            .filter(|digits| !digits.is_empty());
        let cbte_fch = match input.cbte_fch.read(false, Scalar::date) {
            Ok(date) => date.map(afip_date),
            Err(message) => {
                errors.add("cbtes_asoc.cbte_fch", message);
                return None;
            }
        };

        vouchers.push(AssociatedVoucher {
            tipo,
            pto_vta,
            nro,
            cuit,
            cbte_fch,
        });
    }
    Some(vouchers)
}

fn associated_period(value: &Value, errors: &mut FieldErrors) -> Option<AssociatedPeriod> {
    let input = match value {
        Value::Object(_) => AssociatedPeriodInput::deserialize(value).ok(),
        _ => None,
    };
    let Some(input) = input else {
        errors.add(
            "periodo_asoc",
            "periodo_asoc debe ser un objeto con 'desde' y 'hasta'.",
        );
        return None;
    };
    if input.desde.is_missing() || input.hasta.is_missing() {
        errors.add("periodo_asoc", "Debés enviar 'desde' y 'hasta'.");
        return None;
    }

    let desde = errors.check("periodo_asoc.desde", input.desde.read(true, Scalar::date));
    let hasta = errors.check("periodo_asoc.hasta", input.hasta.read(true, Scalar::date));
    Some(AssociatedPeriod::new(desde?, hasta?))
}

#[cfg(test)]
mod tests {
    use serde::de::DeserializeOwned;
    use serde_json::json;

    use super::*;

    fn payload<T: DeserializeOwned>(body: Value) -> T {
        serde_json::from_value(body).expect("payload shape")
    }

    #[test]
    fn afip_dates_accept_both_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15);
        assert_eq!(parse_afip_date("20240115").ok(), expected);
        assert_eq!(parse_afip_date(" 2024-01-15 ").ok(), expected);
        assert!(parse_afip_date("15/01/2024").is_err());
        assert!(parse_afip_date("").is_err());
    }

    #[test]
    fn inputs_distinguish_missing_null_and_wrong_types() {
        let client: ClientPayload = payload(json!({"name": null, "email": ["x"], "tax_id": 20123}));
        assert_eq!(client.name, Input::Null);
        assert_eq!(client.fiscal_address, Input::Missing);
        assert_eq!(client.tax_id, Input::Given(Scalar::Number(Number::from(20123u64))));

        let errors = client.new_client().expect_err("invalid client");
        assert_eq!(errors.messages("name"), [NOT_NULL.to_string()]);
        assert_eq!(errors.messages("email"), [INVALID_STRING.to_string()]);
        assert_eq!(errors.messages("fiscal_address"), [REQUIRED.to_string()]);
        assert!(!errors.contains("tax_id"));
    }

    #[test]
    fn single_associated_voucher_is_normalized_to_a_list() {
        let command = payload::<EmitInvoicePayload>(json!({
            "client_id": 1, "amount": "100.00", "pto_vta": 3, "cbte_tipo": 13,
            "doc_nro": "20-12345678-9",
            "cbtes_asoc": {"tipo": 11, "pto_vta": 3, "nro": 123, "cuit": "20-12345678-9", "cbte_fch": "2024-01-15"}
        }))
        .command()
        .expect("valid payload");

        assert_eq!(command.doc_tipo, 80);
        assert_eq!(command.amount.to_string(), "100.00");
        assert_eq!(
            command.associated,
            Some(AssociatedDocuments::Vouchers(vec![AssociatedVoucher {
                tipo: 11,
                pto_vta: 3,
                nro: 123,
                cuit: Some("20123456789".into()),
                cbte_fch: Some("20240115".into()),
            }]))
        );
    }

    #[test]
    fn associated_documents_report_their_shape_problems() {
        let base = json!({"client_id": 1, "amount": 10, "pto_vta": 3, "cbte_tipo": 13, "doc_nro": "1"});
        let with = |key: &str, value: Value| {
            let mut body = base.clone();
            body[key] = value;
            payload::<EmitInvoicePayload>(body).command().expect_err("invalid association")
        };

        let errors = with("cbtes_asoc", json!([[11, 3, 1]]));
        assert_eq!(
            errors.messages("cbtes_asoc"),
            ["El elemento en la posición 0 debe ser un objeto.".to_string()]
        );
        let errors = with("cbtes_asoc", json!({"tipo": 11, "pto_vta": 3}));
        assert!(errors.messages("cbtes_asoc")[0].starts_with("Cada comprobante asociado"));
        let errors = with("cbtes_asoc", json!({"tipo": "B", "pto_vta": 3, "nro": 1}));
        assert!(errors.messages("cbtes_asoc")[0].ends_with("deben ser numéricos."));
        let errors = with("cbtes_asoc", json!({"tipo": 11, "pto_vta": 3, "nro": 1, "cbte_fch": "ayer"}));
        assert!(errors.contains("cbtes_asoc.cbte_fch"));
        let errors = with("periodo_asoc", json!({"desde": "20230501"}));
        assert_eq!(errors.messages("periodo_asoc"), ["Debés enviar 'desde' y 'hasta'.".to_string()]);
        let errors = with("periodo_asoc", json!({"desde": "20230501", "hasta": "mayo"}));
        assert!(errors.contains("periodo_asoc.hasta"));
    }

    #[test]
    fn notes_without_association_and_double_association_are_rejected() {
        let errors = payload::<EmitInvoicePayload>(json!({
            "client_id": 1, "amount": "100", "pto_vta": 3, "cbte_tipo": 12, "doc_nro": "20123456789"
        }))
        .command()
        .expect_err("note without association");
        assert!(errors.contains(NON_FIELD_ERRORS));

        let errors = payload::<EmitInvoicePayload>(json!({
            "client_id": 1, "amount": "100", "pto_vta": 3, "cbte_tipo": 13, "doc_nro": "20123456789",
            "cbtes_asoc": [{"tipo": 11, "pto_vta": 3, "nro": 1}],
            "periodo_asoc": {"desde": "20230501", "hasta": "20230531"}
        }))
        .command()
        .expect_err("both associations");
        assert_eq!(
            errors.messages(NON_FIELD_ERRORS),
            ["No podés enviar cbtes_asoc y periodo_asoc al mismo tiempo.".to_string()]
        );
    }

    #[test]
    fn invalid_fields_are_reported_together() {
        let errors = payload::<EmitInvoicePayload>(json!({
            "amount": "10.123", "pto_vta": "x", "doc_nro": " ",
            "cbtes_asoc": [{"tipo": 0, "pto_vta": 1, "nro": 1}]
        }))
        .command()
        .expect_err("invalid payload");

        for field in ["client_id", "amount", "pto_vta", "doc_nro", "cbtes_asoc"] {
            assert!(errors.contains(field), "missing error for {field}: {errors}");
        }
        assert_eq!(errors.messages("amount"), [TOO_MANY_DECIMALS.to_string()]);
    }

    #[test]
    fn client_patch_only_checks_present_fields() {
        let mut client = payload::<ClientPayload>(json!({
            "name": " Cliente ", "email": "c@example.com", "tax_id": "20-12345678-9",
            "fiscal_address": "Calle Falsa 123"
        }))
        .new_client()
        .expect("valid client");
        assert_eq!(client.name, "Cliente");
        assert_eq!(client.tax_condition, TaxCondition::ConsumidorFinal);

        payload::<ClientPayload>(json!({"tax_condition": 1}))
            .apply(&mut client, true)
            .expect("patch");
        assert_eq!(client.tax_condition, TaxCondition::ResponsableInscripto);

        let errors = payload::<ClientPayload>(json!({"name": ""}))
            .apply(&mut client, true)
            .expect_err("blank name");
        assert_eq!(errors.messages("name"), [NAME_BLANK.to_string()]);

        let errors = payload::<ClientPayload>(json!({"name": "x"}))
            .apply(&mut client, false)
            .expect_err("put requires every field");
        assert!(errors.contains("email"));
    }

    #[test]
    fn product_codes_are_cleared_and_tariffs_checked() {
        let mut product =
            payload::<ProductPayload>(json!({"name": "Soja", "afip_code": "SOJ-01", "default_tariff": 200}))
                .new_product()
                .expect("valid product");
        assert_eq!(product.default_tariff.to_string(), "200.00");

        payload::<ProductPayload>(json!({"afip_code": "", "default_tariff": "250.5"}))
            .apply(&mut product, true)
            .expect("patch");
        assert_eq!(product.afip_code, None);
        assert_eq!(product.default_tariff.to_string(), "250.50");

        let errors = payload::<ProductPayload>(json!({"default_tariff": -1}))
            .apply(&mut product, true)
            .expect_err("negative tariff");
        assert!(errors.contains("default_tariff"));
        assert!(payload::<ProductPayload>(json!({"name": "  "})).new_product().is_err());
    }

    #[test]
    fn tariffs_are_required_and_rounded() {
        let tariff = payload::<TariffPayload>(json!({"tariff": 20})).tariff().expect("tariff");
        assert_eq!(tariff.to_string(), "20.00");

        let errors = payload::<TariffPayload>(json!({})).tariff().expect_err("missing");
        assert_eq!(errors.messages("tariff"), [REQUIRED.to_string()]);
        let errors = payload::<TariffPayload>(json!({"tariff": "1.005"})).tariff().expect_err("scale");
        assert_eq!(errors.messages("tariff"), [TOO_MANY_DECIMALS.to_string()]);
    }
}
