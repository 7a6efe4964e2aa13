use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};

use super::{AfipService, WsaaError};
use crate::afip::soap::{escape_text, soap_fault};
use crate::afip::xml::{descendant_text, find_element, parse_document};

pub const LOGIN_CMS_NAMESPACE: &str = "http://wsaa.view.sua.dvadac.desein.afip.gov.ar";
pub const LOGIN_CMS_ACTION: &str = "loginCms";

/// Tickets are renewed this long before AFIP would reject them.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Access ticket (TA) issued by WSAA for one service.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessTicket {
    pub service: AfipService,
    pub token: String,
    pub sign: String,
    pub generated_at: Option<DateTime<FixedOffset>>,
    pub expires_at: DateTime<FixedOffset>,
    /// The `loginTicketResponse` document as received, written verbatim to the cache.
    pub raw: String,
}

impl AccessTicket {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.with_timezone(&Utc) - Duration::seconds(EXPIRY_MARGIN_SECS) > now
    }
}

impl std::fmt::Debug for AccessTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTicket")
            .field("service", &self.service)
            .field("generated_at", &self.generated_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Login ticket request (TRA) valid ten minutes on either side of `now`.
pub fn build_ticket_request(service: AfipService, now: DateTime<FixedOffset>) -> String {
    let generation = (now - Duration::minutes(10)).to_rfc3339();
    let expiration = (now + Duration::minutes(10)).to_rfc3339();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<loginTicketRequest version="1.0">
  <header>
    <uniqueId>{unique_id}</uniqueId>
    <generationTime>{generation}</generationTime>
    <expirationTime>{expiration}</expirationTime>
  </header>
  <service>{service}</service>
</loginTicketRequest>
"#,
        unique_id = now.timestamp(),
        service = service.as_str(),
    )
}

pub fn login_cms_envelope(cms_base64: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
  <soapenv:Header/>
  <soapenv:Body>
    <loginCms xmlns="{LOGIN_CMS_NAMESPACE}">
      <in0>{cms}</in0>
    </loginCms>
  </soapenv:Body>
</soapenv:Envelope>"#,
        cms = escape_text(cms_base64),
    )
}

/// Extract the access ticket embedded (as escaped text) in a `loginCms` response.
pub fn parse_login_response(service: AfipService, body: &str) -> Result<AccessTicket, WsaaError> {
    let doc = parse_document(body)?;
    if let Some(fault) = soap_fault(&doc) {
        return Err(WsaaError::Fault {
            code: fault.code,
            message: fault.message,
        });
    }
    let inner = descendant_text(doc.root_element(), "loginCmsReturn")
        .ok_or(WsaaError::MissingTicket)?;
    parse_ticket(service, &inner)
}

/// Parse a `loginTicketResponse` document, as returned by WSAA or read from the cache.
pub fn parse_ticket(service: AfipService, raw: &str) -> Result<AccessTicket, WsaaError> {
    let doc = parse_document(raw)?;
    let root = doc.root_element();

    let token = descendant_text(root, "token").unwrap_or_default();
    let sign = descendant_text(root, "sign").unwrap_or_default();
    if token.is_empty() || sign.is_empty() {
        return Err(WsaaError::EmptyCredentials);
    }

    let header = find_element(root, "header").unwrap_or(root);
    let expires_at = descendant_text(header, "expirationTime")
        .as_deref()
        .and_then(parse_ticket_time)
        .ok_or_else(|| WsaaError::InvalidTicket("missing or unreadable expirationTime".into()))?;
    let generated_at = descendant_text(header, "generationTime")
        .as_deref()
        .and_then(parse_ticket_time);

    Ok(AccessTicket {
        service,
        token,
        sign,
        generated_at,
        expires_at,
        raw: raw.trim().to_string(),
    })
}

/// WSAA stamps times with an offset; naive values are taken as Argentina time.
fn parse_ticket_time(value: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed);
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    argentina_offset().from_local_datetime(&naive).single()
}

pub(crate) fn argentina_offset() -> FixedOffset {
    FixedOffset::west_opt(3 * 3600).unwrap_or_else(|| Utc.fix())
}


#[cfg(test)]
mod tests {
    use super::fixtures::{login_response, ticket_document};
    use super::*;

    fn at(value: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(value).expect("valid timestamp")
    }

    #[test]
    fn ticket_request_spans_twenty_minutes() {
        let now = at("2024-01-15T12:00:00-03:00");
        let tra = build_ticket_request(AfipService::Wscpe, now);

        assert!(tra.contains("<uniqueId>1705330800</uniqueId>"));
        assert!(tra.contains("<generationTime>2024-01-15T11:50:00-03:00</generationTime>"));
        assert!(tra.contains("<expirationTime>2024-01-15T12:10:00-03:00</expirationTime>"));
        assert!(tra.contains("<service>wscpe</service>"));
    }

    #[test]
    fn login_response_yields_ticket() {
        let body = login_response("TOKEN", "SIGN", "2024-01-15T22:00:00.000-03:00");
        let ticket = parse_login_response(AfipService::Wsfe, &body).expect("ticket");

        assert_eq!(ticket.service, AfipService::Wsfe);
        assert_eq!(ticket.token, "TOKEN");
        assert_eq!(ticket.sign, "SIGN");
        assert_eq!(ticket.expires_at, at("2024-01-15T22:00:00-03:00"));
        assert!(ticket.raw.starts_with("<?xml"));
    }

    #[test]
    fn login_fault_is_reported() {
        let body = r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
            <soapenv:Body><soapenv:Fault><faultcode>ns1:coe.alreadyAuthenticated</faultcode>
            <faultstring>El CEE ya posee un TA valido para el acceso al WSN solicitado</faultstring>
            </soapenv:Fault></soapenv:Body></soapenv:Envelope>"#;

        match parse_login_response(AfipService::Wsfe, body) {
            Err(WsaaError::Fault { code, message }) => {
                assert_eq!(code.as_deref(), Some("ns1:coe.alreadyAuthenticated"));
                assert!(message.contains("TA valido"));
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn missing_return_and_empty_credentials_are_errors() {
        let body = r#"<Envelope><Body><loginCmsResponse/></Body></Envelope>"#;
        assert!(matches!(
            parse_login_response(AfipService::Wsfe, body),
            Err(WsaaError::MissingTicket)
        ));

        let raw = ticket_document("", "SIGN", "2024-01-15T22:00:00-03:00");
        assert!(matches!(
            parse_ticket(AfipService::Wsfe, &raw),
            Err(WsaaError::EmptyCredentials)
        ));
    }

    #[test]
    fn validity_keeps_a_minute_of_margin() {
        let raw = ticket_document("T", "S", "2024-01-15T12:00:00");
        let ticket = parse_ticket(AfipService::PadronA13, &raw).expect("naive expiry parses");
        assert_eq!(ticket.expires_at, at("2024-01-15T12:00:00-03:00"));

        let before = at("2024-01-15T11:58:59-03:00").with_timezone(&Utc);
        let inside_margin = at("2024-01-15T11:59:30-03:00").with_timezone(&Utc);
        assert!(ticket.is_valid_at(before));
        assert!(!ticket.is_valid_at(inside_margin));
    }
}
