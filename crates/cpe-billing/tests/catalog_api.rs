mod common;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::Router;
use serde_json::json;

use common::send;
use cpe_billing::billing::{catalog_router, CatalogService};
use cpe_billing::store::InMemoryStore;

fn app() -> Router {
    catalog_router(Arc::new(CatalogService::new(Arc::new(InMemoryStore::new()))))
}

#[tokio::test]
async fn products_are_validated_and_keep_codes_unique() {
    let app = app();

    let (status, product) = send(
        &app,
        Method::POST,
        "/api/productos/",
        Some(json!({"name": "Soja", "afip_code": "23", "default_tariff": "150.50"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{product}");
    assert_eq!(product["default_tariff"], "150.50");
    assert_eq!(product["afip_code"], "23");
    let id = product["id"].as_u64().expect("id");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/productos/",
        Some(json!({"name": "   ", "default_tariff": "-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["name"], json!(["Ingresá el nombre del producto."]));
    assert_eq!(
        body["default_tariff"],
        json!(["La tarifa predeterminada no puede ser negativa."])
    );

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/productos/",
        Some(json!({"name": "Maíz", "afip_code": "23"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["afip_code"],
        json!(["Ya existe un producto con este código AFIP."])
    );

    let (status, product) = send(
        &app,
        Method::PATCH,
        &format!("/api/productos/{id}/"),
        Some(json!({"afip_code": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(product["afip_code"].is_null());
    assert_eq!(product["name"], "Soja");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/productos/",
        Some(json!({"name": "Maíz", "afip_code": "23"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["default_tariff"], "0.00");

    let (status, listing) = send(&app, Method::GET, "/api/productos/", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = listing
        .as_array()
        .expect("list")
        .iter()
        .filter_map(|product| product["name"].as_str())
        .collect();
    assert_eq!(names, ["Maíz", "Soja"]);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/productos/{id}/"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = send(&app, Method::GET, &format!("/api/productos/{id}/"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn clients_require_every_field_on_create_and_replace() {
    let app = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/clientes/",
        Some(json!({"name": "", "email": "sin-arroba", "tax_condition": 9})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["name"],
        json!(["Ingresá el nombre o razón social del cliente."])
    );
    assert_eq!(
        body["email"],
        json!(["Introduzca una dirección de correo electrónico válida."])
    );
    assert_eq!(body["tax_id"], json!(["Este campo es requerido."]));
    assert_eq!(body["fiscal_address"], json!(["Este campo es requerido."]));
    assert!(body["tax_condition"].is_array());

    let (status, client) = send(
        &app,
        Method::POST,
        "/api/clientes/",
        Some(json!({
            "name": "Transportes del Sur",
            "email": "admin@tdsur.com.ar",
            "tax_id": "30-71234567-8",
            "fiscal_address": "Av. Siempre Viva 742",
            "tax_condition": 1,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{client}");
    assert_eq!(client["tax_condition"], 1);
    assert_eq!(client["tax_condition_display"], "Responsable Inscripto");
    assert_eq!(client["iva_rate"], "0.21");
    let uri = format!("/api/clientes/{}/", client["id"]);

    let (status, body) = send(
        &app,
        Method::PUT,
        &uri,
        Some(json!({"name": "Transportes del Sur SRL"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["email"].is_array());

    let (status, client) = send(
        &app,
        Method::PATCH,
        &uri,
        Some(json!({"name": "Transportes del Sur SRL", "tax_condition": 6})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(client["name"], "Transportes del Sur SRL");
    assert_eq!(client["email"], "admin@tdsur.com.ar");
    assert_eq!(client["tax_condition_display"], "Monotributo");

    let (status, _) = send(&app, Method::GET, "/api/clientes/99/", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn providers_only_require_a_name() {
    let app = app();

    let (status, body) = send(&app, Method::POST, "/api/proveedores/", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["name"], json!(["Este campo es requerido."]));

    let (status, provider) = send(
        &app,
        Method::POST,
        "/api/proveedores/",
        Some(json!({"name": "Cerealera Pampa", "tax_id": "30-60000000-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(provider["email"], "");

    let (status, listing) = send(&app, Method::GET, "/api/proveedores/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing[0]["name"], "Cerealera Pampa");
}

#[tokio::test]
async fn bodies_are_typed_but_field_errors_stay_per_field() {
    let app = app();

    let (status, body) = send(&app, Method::POST, "/api/productos/", Some(json!("Soja"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["non_field_errors"][0],
        "Datos inválidos. Se esperaba un objeto JSON."
    );

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/clientes/",
        Some(json!({
            "name": ["Acopio"], "email": "a@example.com", "tax_id": 30716004720u64,
            "fiscal_address": null, "tax_condition": "x"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["name"][0], "No es una cadena válida.");
    assert_eq!(body["fiscal_address"][0], "Este campo no puede ser nulo.");
    assert_eq!(body["tax_condition"][0], "Se requiere un número entero válido.");
    assert!(body.get("tax_id").is_none());
}
