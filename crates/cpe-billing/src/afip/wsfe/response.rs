use roxmltree::{Document, Node};
use serde::Serialize;

use super::FeError;
use crate::afip::soap::soap_fault;
use crate::afip::xml::{child_text, descendant_text, parse_document};

/// Authorization returned by `FECAESolicitar`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaeOutcome {
    pub cae: String,
    /// `YYYYMMDD`, empty when AFIP omits it.
    pub cae_due: String,
    pub cbte_nro: u64,
    pub pto_vta: u32,
    pub cbte_tipo: u32,
    #[serde(skip)]
    pub xml: String,
    pub observations: Vec<String>,
    pub events: Vec<String>,
}

/// `Code: Msg` lines for every `tag` node (`Err`, `Obs`, `Evt`).
pub fn extract_messages(doc: &Document<'_>, tag: &str) -> Vec<String> {
    doc.descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == tag)
        .filter_map(|node| {
            let code = child_text(node, "Code");
            let message = child_text(node, "Msg");
            match (code.is_empty(), message.is_empty()) {
                (false, _) => Some(format!("{code}: {message}")),
                (true, false) => Some(message),
                (true, true) => None,
            }
        })
        .collect()
}

fn ensure_no_fault(doc: &Document<'_>) -> Result<(), FeError> {
    match soap_fault(doc) {
        Some(fault) => Err(FeError::Fault(fault.message)),
        None => Ok(()),
    }
}

/// Last authorized number from `FECompUltimoAutorizado`; 0 when the sequence is empty.
pub fn parse_last_authorized(body: &str) -> Result<u64, FeError> {
    let doc = parse_document(body)?;
    ensure_no_fault(&doc)?;
    let errors = extract_messages(&doc, "Err");
    if !errors.is_empty() {
        return Err(FeError::Rejected(errors));
    }
    Ok(descendant_text(doc.root_element(), "CbteNro")
        .and_then(|value| value.parse().ok())
        .unwrap_or(0))
}

/// Enabled voucher type ids from `FEParamGetTiposCbte`.
pub fn parse_voucher_types(body: &str, cuit: &str, pto_vta: u32) -> Result<Vec<u32>, FeError> {
    let doc = parse_document(body)?;
    ensure_no_fault(&doc)?;

    let types: Vec<u32> = doc
        .descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == "CbteTipo")
        .filter_map(|node| child_text(node, "Id").parse().ok())
        .collect();
    if !types.is_empty() {
        return Ok(types);
    }

    let errors = extract_messages(&doc, "Err");
    if errors.is_empty() {
        Err(FeError::NoVoucherTypes {
            cuit: cuit.to_string(),
            pto_vta,
        })
    } else {
        Err(FeError::VoucherTypeErrors(errors))
    }
}

/// Interpret a `FECAESolicitar` response for the voucher that was requested.
pub fn parse_cae_response(
    body: &str,
    requested_nro: u64,
    pto_vta: u32,
    cbte_tipo: u32,
) -> Result<CaeOutcome, FeError> {
    let doc = parse_document(body)?;
    ensure_no_fault(&doc)?;

    let errors = extract_messages(&doc, "Err");
    if !errors.is_empty() {
        return Err(FeError::Rejected(errors));
    }

    let observations = extract_messages(&doc, "Obs");
    let events = extract_messages(&doc, "Evt");
    let root = doc.root_element();

    let Some(cae) = descendant_text(root, "CAE") else {
        return Err(FeError::MissingCae { observations });
    };
    let cae_due = descendant_text(root, "CAEFchVto").unwrap_or_default();
    let cbte_nro = detail_response(root)
        .and_then(|detail| descendant_text(detail, "CbteDesde"))
        .and_then(|value| value.parse().ok())
        .unwrap_or(requested_nro);

    if !observations.is_empty() {
        tracing::warn!(
            cbte_nro,
            observations = %observations.join("; "),
            "AFIP returned observations for the voucher"
        );
    }

    Ok(CaeOutcome {
        cae,
        cae_due,
        cbte_nro,
        pto_vta,
        cbte_tipo,
        xml: body.to_string(),
        observations,
        events,
    })
}

fn detail_response<'a, 'input>(root: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    crate::afip::xml::find_element(root, "FECAEDetResponse")
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn approved_response_yields_outcome() {
        let outcome = parse_cae_response(&cae_approved("74123456789012", 42), 41, 3, 11)
            .expect("approved");

        assert_eq!(outcome.cae, "74123456789012");
        assert_eq!(outcome.cae_due, "20240125");
        assert_eq!(outcome.cbte_nro, 42);
        assert_eq!(outcome.events, vec!["10: Aviso de mantenimiento".to_string()]);
        assert!(outcome.observations.is_empty());
    }

    #[test]
    fn errors_and_missing_cae_are_distinguished() {
        let rejected = r#"<Envelope><Body><FECAESolicitarResult>
            <Errors><Err><Code>10016</Code><Msg>El numero o fecha del comprobante no se corresponde</Msg></Err></Errors>
            </FECAESolicitarResult></Body></Envelope>"#;
        match parse_cae_response(rejected, 1, 3, 11) {
            Err(FeError::Rejected(errors)) => {
                assert_eq!(errors, vec!["10016: El numero o fecha del comprobante no se corresponde"])
            }
            other => panic!("expected rejection, got {other:?}"),
        }

        let observed = r#"<Envelope><Body><FECAEDetResponse><Resultado>R</Resultado><CAE></CAE>
            <Observaciones><Obs><Code>10242</Code><Msg>Condicion IVA receptor invalida</Msg></Obs></Observaciones>
            </FECAEDetResponse></Body></Envelope>"#;
        match parse_cae_response(observed, 1, 3, 11) {
            Err(FeError::MissingCae { observations }) => {
                assert_eq!(observations, vec!["10242: Condicion IVA receptor invalida"])
            }
            other => panic!("expected missing CAE, got {other:?}"),
        }
    }

    #[test]
    fn last_authorized_defaults_to_zero() {
        assert_eq!(parse_last_authorized(&last_authorized(17)).expect("parsed"), 17);
        assert_eq!(
            parse_last_authorized("<Envelope><Body/></Envelope>").expect("parsed"),
            0
        );
    }

    #[test]
    fn voucher_types_report_errors_or_absence() {
        assert_eq!(
            parse_voucher_types(&voucher_types(&[11, 12, 13]), "30716004720", 3).expect("types"),
            vec![11, 12, 13]
        );

        let empty = "<Envelope><Body><ResultGet/></Body></Envelope>";
        let err = parse_voucher_types(empty, "30716004720", 3).expect_err("no types");
        assert!(err.to_string().contains("punto de venta 3"));

        let failing = "<Envelope><Body><Errors><Err><Code>600</Code><Msg>No autorizado</Msg></Err></Errors></Body></Envelope>";
        assert!(matches!(
            parse_voucher_types(failing, "30716004720", 3),
            Err(FeError::VoucherTypeErrors(_))
        ));
    }
}
