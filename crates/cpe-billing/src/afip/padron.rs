//! Padrón A13 taxpayer registry lookups (`getPersona`).

use std::sync::Arc;

use roxmltree::Node;
use serde::Serialize;
use serde_json::{Map, Value};

use super::only_digits;
use super::soap::{escape_text, soap_fault, SoapRequest, SoapTransport, TransportError};
use super::wsaa::{AfipService, CredentialProvider, Credentials, WsaaError};
use super::xml::{child_elements, child_text, find_element, parse_document, XmlError};

pub const PADRON_NAMESPACE: &str = "http://a13.soap.ws.server.puc.sr/";
pub const GET_PERSONA_ACTION: &str = "getPersona";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PadronMetadata {
    #[serde(rename = "fechaHora")]
    pub fecha_hora: String,
    pub servidor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersonaDocument {
    pub tipo: String,
    pub numero: String,
}

/// VAT condition derived from the registry entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConditionSummary {
    pub condition_id: Option<u32>,
    pub condition_text: Option<String>,
    pub source: Option<String>,
}

type Entry = Map<String, Value>;

/// A13 registry entry, as published by AFIP. Nested lists keep only non-empty fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersonaA13 {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PadronMetadata>,
    pub id_persona: String,
    pub tipo_persona: String,
    pub estado_clave: String,
    pub tipo_clave: String,
    pub apellido: String,
    pub nombre: String,
    pub razon_social: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documento: Option<PersonaDocument>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub domicilios: Vec<Entry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub datos_regimen_general: Vec<Entry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub impuestos: Vec<Entry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actividades: Vec<Entry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub monotributo: Vec<Entry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empleador: Option<Entry>,
    pub summary: ConditionSummary,
}

impl PersonaA13 {
    /// Display name: business name, else "apellido nombre".
    pub fn display_name(&self) -> String {
        if !self.razon_social.is_empty() {
            return self.razon_social.clone();
        }
        [self.apellido.as_str(), self.nombre.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn summarize(&self) -> ConditionSummary {
        let from_registry = self
            .datos_regimen_general
            .iter()
            .find_map(|entry| entry.get("idCondicionIva").and_then(Value::as_u64))
            .and_then(|id| u32::try_from(id).ok());

        let (condition_id, source) = match from_registry {
            Some(id) => (Some(id), Some("a13")),
            None if self.razon_social.is_empty() => (Some(5), Some("fallback_razon_social")),
            None => (None, None),
        };

        ConditionSummary {
            condition_id,
            condition_text: condition_id.and_then(condition_text).map(str::to_string),
            source: source.map(str::to_string),
        }
    }
}

fn condition_text(id: u32) -> Option<&'static str> {
    match id {
        1 => Some("Responsable Inscripto"),
        5 => Some("Consumidor Final"),
        6 => Some("Monotributista"),
        _ => None,
    }
}

/// Build an entry from `(output key, source tag)` pairs, dropping blanks and parsing `numeric` keys.
fn entry(node: Node<'_, '_>, fields: &[(&str, &str)], numeric: &[&str]) -> Entry {
    let mut map = Map::new();
    for (key, tag) in fields {
        let text = child_text(node, tag);
        if text.is_empty() {
            continue;
        }
        let value = match text.parse::<u64>() {
            Ok(number) if numeric.contains(key) => Value::from(number),
            _ => Value::String(text),
        };
        map.insert((*key).to_string(), value);
    }
    map
}

fn entries(
    persona: Node<'_, '_>,
    tag: &str,
    fields: &[(&str, &str)],
    numeric: &[&str],
) -> Vec<Entry> {
    child_elements(persona, tag)
        .map(|node| entry(node, fields, numeric))
        .filter(|entry| !entry.is_empty())
        .collect()
}

pub fn get_persona_envelope(credentials: &Credentials, cuit_representada: &str, id_persona: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:a13="{PADRON_NAMESPACE}">
  <soapenv:Header/>
  <soapenv:Body>
    <a13:getPersona>
      <token>{token}</token>
      <sign>{sign}</sign>
      <cuitRepresentada>{cuit}</cuitRepresentada>
      <idPersona>{id}</idPersona>
    </a13:getPersona>
  </soapenv:Body>
</soapenv:Envelope>"#,
        token = escape_text(&credentials.token),
        sign = escape_text(&credentials.sign),
        cuit = escape_text(cuit_representada),
        id = escape_text(id_persona),
    )
}

/// Organize a `getPersonaResponse`. Faults and responses without `persona` yield `None`.
pub fn parse_persona(body: &str) -> Result<Option<PersonaA13>, XmlError> {
    let doc = parse_document(body)?;
    if soap_fault(&doc).is_some() {
        return Ok(None);
    }
    let root = doc.root_element();
    let Some(persona) = find_element(root, "persona") else {
        return Ok(None);
    };

    let metadata = find_element(root, "metadata").map(|node| PadronMetadata {
        fecha_hora: child_text(node, "fechaHora"),
        servidor: child_text(node, "servidor"),
    });

    let doc_tipo = child_text(persona, "tipoDocumento");
    let doc_numero = child_text(persona, "numeroDocumento");
    let documento = (!doc_tipo.is_empty() || !doc_numero.is_empty()).then(|| PersonaDocument {
        tipo: doc_tipo,
        numero: doc_numero,
    });

    let mut data = PersonaA13 {
        metadata,
        id_persona: child_text(persona, "idPersona"),
        tipo_persona: child_text(persona, "tipoPersona"),
        estado_clave: child_text(persona, "estadoClave"),
        tipo_clave: child_text(persona, "tipoClave"),
        apellido: child_text(persona, "apellido"),
        nombre: child_text(persona, "nombre"),
        razon_social: child_text(persona, "razonSocial"),
        documento,
        domicilios: child_elements(persona, "domicilio")
            .map(|node| {
                [
                    ("tipo", "tipoDomicilio"),
                    ("calle", "calle"),
                    ("numero", "numero"),
                    ("piso", "piso"),
                    ("oficinaDptoLocal", "oficinaDptoLocal"),
                    ("direccion", "direccion"),
                    ("localidad", "localidad"),
                    ("codigo_postal", "codigoPostal"),
                    ("id_provincia", "idProvincia"),
                    ("provincia", "descripcionProvincia"),
                    ("estado", "estadoDomicilio"),
                ]
                .into_iter()
                .map(|(key, tag)| (key.to_string(), Value::String(child_text(node, tag))))
                .collect()
            })
            .collect(),
        datos_regimen_general: entries(
            persona,
            "datosRegimenGeneral",
            &[
                ("idCondicionIva", "idCondicionIva"),
                ("periodo", "periodo"),
                ("categoria", "categoria"),
                ("impuesto", "impuesto"),
                ("descripcion", "descripcion"),
            ],
            &["idCondicionIva"],
        ),
        impuestos: entries(
            persona,
            "impTrib",
            &[
                ("idImpuesto", "idImpuesto"),
                ("descripcion", "desc"),
                ("periodo", "periodo"),
                ("estado", "estado"),
            ],
            &["idImpuesto"],
        ),
        actividades: entries(
            persona,
            "actividad",
            &[
                ("idActividad", "idActividad"),
                ("descripcion", "descripcionActividad"),
                ("orden", "orden"),
                ("periodo", "periodo"),
            ],
            &["idActividad", "orden"],
        ),
        monotributo: entries(
            persona,
            "datosMonotributo",
            &[
                ("categoria", "categoriaMonotributo"),
                ("periodo", "periodo"),
                ("impuesto", "impuesto"),
                ("estado", "estado"),
            ],
            &[],
        ),
        empleador: child_elements(persona, "empleador")
            .next()
            .map(|node| entry(node, &[("estado", "estado"), ("periodo", "periodo")], &[])),
        summary: ConditionSummary::default(),
    };
    data.summary = data.summarize();
    Ok(Some(data))
}

#[derive(Debug, thiserror::Error)]
pub enum PadronError {
    #[error("CUIT inválido: {0}")]
    InvalidCuit(String),
    #[error(transparent)]
    Credentials(#[from] WsaaError),
    #[error("Padrón A13 request failed: {0}")]
    Transport(#[from] TransportError),
    #[error("Padrón A13 returned unreadable XML: {0}")]
    Xml(#[from] XmlError),
}

pub struct PadronClient {
    endpoint: String,
    cuit_representada: String,
    transport: Arc<dyn SoapTransport>,
    credentials: Arc<dyn CredentialProvider>,
}

impl PadronClient {
    pub fn new(
        endpoint: impl Into<String>,
        cuit_representada: impl Into<String>,
        transport: Arc<dyn SoapTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            cuit_representada: cuit_representada.into(),
            transport,
            credentials,
        }
    }

    pub async fn lookup(&self, cuit: &str) -> Result<Option<PersonaA13>, PadronError> {
        let id_persona = only_digits(cuit);
        if id_persona.is_empty() {
            return Err(PadronError::InvalidCuit(cuit.to_string()));
        }

        let credentials = self.credentials.credentials(AfipService::PadronA13).await?;
        let response = self
            .transport
            .call(SoapRequest {
                url: self.endpoint.clone(),
                action: GET_PERSONA_ACTION.to_string(),
                body: get_persona_envelope(&credentials, &self.cuit_representada, &id_persona),
            })
            .await?;

        let persona = parse_persona(&response.body)?;
        tracing::debug!(id_persona = %id_persona, found = persona.is_some(), "padron lookup");
        Ok(persona)
    }
}
