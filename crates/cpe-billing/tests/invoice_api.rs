mod common;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::Router;
use base64::Engine;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use common::{send, FakeAuthority};
use cpe_billing::afip::wsfe::{AssociatedDocuments, AssociatedPeriod, AssociatedVoucher};
use cpe_billing::billing::{invoice_router, Client, ClientRepository, InvoiceService, TaxCondition};
use cpe_billing::store::InMemoryStore;

const QR_BASE: &str = "https://www.arca.gob.ar/fe/qr/";

fn app(authority: Arc<FakeAuthority>) -> Router {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert_client(Client {
            id: 0,
            name: "Acopio Norte SA".into(),
            email: "facturas@acopionorte.com.ar".into(),
            tax_id: "30-70000000-7".into(),
            fiscal_address: "Ruta 9 km 300".into(),
            tax_condition: TaxCondition::ResponsableInscripto,
            iva_rate: Client::default_iva_rate(),
        })
        .expect("client");
    invoice_router(Arc::new(InvoiceService::new(store, authority, QR_BASE)))
}

fn emission(extra: Value) -> Value {
    let mut body = json!({
        "client_id": 1,
        "amount": "1210.00",
        "pto_vta": 3,
        "doc_nro": "30-70000000-7",
    });
    if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), extra) {
        body.extend(extra);
    }
    body
}

#[tokio::test]
async fn emitted_invoices_carry_cae_and_qr() {
    let authority = FakeAuthority::new(&[1, 6, 11, 12, 13]);
    let app = app(authority.clone());

    let (status, invoice) = send(&app, Method::POST, "/api/facturas/emitir/", Some(emission(json!({})))).await;
    assert_eq!(status, StatusCode::CREATED, "{invoice}");
    assert_eq!(invoice["cae"], "74123456789012");
    assert_eq!(invoice["cae_due"], "20240211");
    assert_eq!(invoice["cbte_tipo"], 11);
    assert_eq!(invoice["cbte_nro"], 1);
    assert_eq!(invoice["client_name"], "Acopio Norte SA");
    assert_eq!(invoice["amount"], "1210.00");
    assert_eq!(invoice["metadata"]["condicion_iva_receptor_id"], 1);

    let request = authority.last_request();
    assert_eq!(request.cuit, "30716004720");
    assert_eq!(request.doc_tipo, 80);
    assert_eq!(request.receptor_condition, Some(1));
    assert_eq!(request.iva_rate, Decimal::new(21, 2));

    let url = invoice["metadata"]["qr"]["url"].as_str().expect("qr url");
    assert!(url.starts_with("https://www.arca.gob.ar/fe/qr/?p="));
    let encoded = invoice["metadata"]["qr"]["payload_b64"].as_str().expect("payload");
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .expect("base64");
    let payload: Value = serde_json::from_slice(&decoded).expect("qr json");
    assert_eq!(payload["ptoVta"], 3);
    assert_eq!(payload["nroCmp"], 1);
    assert_eq!(payload["nroDocRec"], 30700000007u64);
    assert_eq!(payload["codAut"], 74123456789012u64);

    let (status, listing) = send(&app, Method::GET, "/api/facturas/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing.as_array().map(Vec::len), Some(1));
    assert_eq!(listing[0]["client_email"], "facturas@acopionorte.com.ar");
}

#[tokio::test]
async fn credit_notes_send_normalized_associations() {
    let authority = FakeAuthority::new(&[11, 12, 13]);
    let app = app(authority.clone());

    let (status, invoice) = send(
        &app,
        Method::POST,
        "/api/facturas/emitir/",
        Some(emission(json!({
            "cbte_tipo": 13,
            "cbtes_asoc": {"tipo": "11", "pto_vta": 3, "nro": 123, "cuit": "20-12345678-9", "cbte_fch": "2024-01-15"}
        }))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{invoice}");
    assert_eq!(
        invoice["metadata"]["cbtes_asoc"],
        json!([{"tipo": 11, "pto_vta": 3, "nro": 123, "cuit": "20123456789", "cbte_fch": "20240115"}])
    );
    assert_eq!(
        authority.last_request().associated,
        Some(AssociatedDocuments::Vouchers(vec![AssociatedVoucher {
            tipo: 11,
            pto_vta: 3,
            nro: 123,
            cuit: Some("20123456789".into()),
            cbte_fch: Some("20240115".into()),
        }]))
    );

    let (status, invoice) = send(
        &app,
        Method::POST,
        "/api/facturas/emitir/",
        Some(emission(json!({
            "cbte_tipo": 12,
            "periodo_asoc": {"desde": "2023-05-01", "hasta": "20230531"}
        }))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{invoice}");
    assert_eq!(
        invoice["metadata"]["periodo_asoc"],
        json!({"desde": "20230501", "hasta": "20230531"})
    );
    assert_eq!(
        authority.last_request().associated,
        Some(AssociatedDocuments::Period(AssociatedPeriod {
            desde: "20230501".into(),
            hasta: "20230531".into(),
        }))
    );
}

#[tokio::test]
async fn invalid_emissions_are_rejected() {
    let authority = FakeAuthority::new(&[11, 13]);
    let app = app(authority.clone());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/facturas/emitir/",
        Some(emission(json!({"cbte_tipo": 1}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"cbte_tipo": ["El tipo de comprobante 1 no está habilitado para el punto de venta 3."]})
    );

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/facturas/emitir/",
        Some(emission(json!({"cbte_tipo": 13}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["non_field_errors"],
        json!(["Las Notas de Débito/Crédito requieren cbtes_asoc o periodo_asoc."])
    );

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/facturas/emitir/",
        Some(emission(json!({"client_id": 99}))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].is_string());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/facturas/emitir/",
        Some(emission(json!({"amount": "0", "issue_date": "15/01/2024"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["amount"].is_array());
    assert!(body["issue_date"].is_array());

    assert!(authority.requests.lock().expect("requests").is_empty());
}
