use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub afip: AfipConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let format = match env::var("APP_LOG_FORMAT") {
            Ok(value) if value.trim().eq_ignore_ascii_case("full") => LogFormat::Full,
            _ => LogFormat::Compact,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format,
                include_target: environment != AppEnvironment::Production,
            },
            afip: AfipConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Full,
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

/// SOAP endpoints for the AFIP services the back office talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AfipEndpoints {
    pub wsaa: String,
    pub wsfe: String,
    pub wscpe: String,
    pub padron_a13: String,
}

impl AfipEndpoints {
    pub fn production() -> Self {
        Self {
            wsaa: "https://wsaa.afip.gov.ar/ws/services/LoginCms".to_string(),
            wsfe: "https://servicios1.afip.gov.ar/wsfev1/service.asmx".to_string(),
            wscpe: "https://cpea-ws.afip.gob.ar/wscpe/services/soap".to_string(),
            padron_a13: "https://aws.afip.gov.ar/sr-padron/webservices/personaServiceA13"
                .to_string(),
        }
    }

    pub fn homologation() -> Self {
        Self {
            wsaa: "https://wsaahomo.afip.gov.ar/ws/services/LoginCms".to_string(),
            wsfe: "https://wswhomo.afip.gov.ar/wsfev1/service.asmx".to_string(),
            wscpe: "https://fwshomo.afip.gov.ar/wscpe/services/soap".to_string(),
            padron_a13: "https://awshomo.afip.gov.ar/sr-padron/webservices/personaServiceA13"
                .to_string(),
        }
    }
}

/// Credentials, identities and endpoints for the AFIP integration.
#[derive(Debug, Clone)]
pub struct AfipConfig {
    /// CUIT of the issuer; authenticates WSFE calls and goes into invoice QR codes.
    pub cuit: String,
    /// CUIT on whose behalf waybills and registry lookups are queried.
    pub cuit_representada: String,
    pub credentials_dir: PathBuf,
    pub certificate: PathBuf,
    pub private_key: PathBuf,
    pub openssl_bin: String,
    pub homologation: bool,
    pub endpoints: AfipEndpoints,
    pub request_timeout: Duration,
    pub qr_base_url: String,
}

impl AfipConfig {
    pub const DEFAULT_CUIT: &'static str = "30716004720";
    pub const DEFAULT_QR_BASE_URL: &'static str = "https://www.arca.gob.ar/fe/qr/";

    fn from_env() -> Result<Self, ConfigError> {
        let cuit = parse_cuit(
            "AFIP_CUIT",
            &env::var("AFIP_CUIT").unwrap_or_else(|_| Self::DEFAULT_CUIT.to_string()),
        )?;
        let cuit_representada = match env::var("AFIP_CUIT_REPRESENTADA") {
            Ok(value) => parse_cuit("AFIP_CUIT_REPRESENTADA", &value)?,
            Err(_) => cuit.clone(),
        };

        let credentials_dir = PathBuf::from(
            env::var("AFIP_CREDENTIALS_DIR").unwrap_or_else(|_| "secrets".to_string()),
        );
        let certificate = env::var("AFIP_CERTIFICATE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| credentials_dir.join("afip_certificado.pem"));
        let private_key = env::var("AFIP_PRIVATE_KEY")
            .map(PathBuf::from)
            .unwrap_or_else(|_| credentials_dir.join("afip_private.key"));
        let openssl_bin = env::var("AFIP_OPENSSL_BIN").unwrap_or_else(|_| "openssl".to_string());

        let homologation = match env::var("AFIP_HOMOLOGATION") {
            Ok(value) => parse_bool("AFIP_HOMOLOGATION", &value)?,
            Err(_) => false,
        };

        let mut endpoints = if homologation {
            AfipEndpoints::homologation()
        } else {
            AfipEndpoints::production()
        };
        if let Ok(url) = env::var("AFIP_WSAA_URL") {
            endpoints.wsaa = url;
        }
        if let Ok(url) = env::var("AFIP_WSFE_URL") {
            endpoints.wsfe = url;
        }
        if let Ok(url) = env::var("AFIP_WSCPE_URL") {
            endpoints.wscpe = url;
        }
        if let Ok(url) = env::var("AFIP_PADRON_URL") {
            endpoints.padron_a13 = url;
        }

        let timeout_secs = env::var("AFIP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::InvalidTimeout)?;

        let qr_base_url =
            env::var("ARCA_QR_BASE_URL").unwrap_or_else(|_| Self::DEFAULT_QR_BASE_URL.to_string());

        Ok(Self {
            cuit,
            cuit_representada,
            credentials_dir,
            certificate,
            private_key,
            openssl_bin,
            homologation,
            endpoints,
            request_timeout: Duration::from_secs(timeout_secs),
            qr_base_url,
        })
    }
}

fn parse_cuit(variable: &'static str, raw: &str) -> Result<String, ConfigError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 11 {
        Ok(digits)
    } else {
        Err(ConfigError::InvalidCuit {
            variable,
            value: raw.to_string(),
        })
    }
}

fn parse_bool(variable: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            variable,
            value: raw.to_string(),
        }),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidCuit {
        variable: &'static str,
        value: String,
    },
    InvalidFlag {
        variable: &'static str,
        value: String,
    },
    InvalidTimeout,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidCuit { variable, value } => {
                write!(f, "{variable} must hold an 11 digit CUIT, got '{value}'")
            }
            ConfigError::InvalidFlag { variable, value } => {
                write!(f, "{variable} must be true/false, got '{value}'")
            }
            ConfigError::InvalidTimeout => {
                write!(f, "AFIP_TIMEOUT_SECS must be a positive number of seconds")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
