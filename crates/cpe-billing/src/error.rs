use crate::afip::{CpeError, FeError, PadronError, TransportError, WsaaError};
use crate::billing::FieldErrors;
use crate::config::ConfigError;
use crate::store::RepositoryError;
use crate::telemetry::TelemetryError;
use crate::trips::CpeServiceError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Transport(TransportError),
    Credentials(WsaaError),
    Invoicing(FeError),
    Waybill(CpeError),
    Registry(PadronError),
    Storage(RepositoryError),
    Invalid(FieldErrors),
    Output(serde_json::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Transport(err) => write!(f, "AFIP transport error: {}", err),
            AppError::Credentials(err) => write!(f, "WSAA error: {}", err),
            AppError::Invoicing(err) => write!(f, "WSFE error: {}", err),
            AppError::Waybill(err) => write!(f, "WSCPE error [{}]: {}", err.code, err),
            AppError::Registry(err) => write!(f, "padron error: {}", err),
            AppError::Storage(err) => write!(f, "storage error: {}", err),
            AppError::Invalid(err) => write!(f, "invalid input: {}", err),
            AppError::Output(err) => write!(f, "output error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Transport(err) => Some(err),
            AppError::Credentials(err) => Some(err),
            AppError::Invoicing(err) => Some(err),
            AppError::Waybill(err) => Some(err),
            AppError::Registry(err) => Some(err),
            AppError::Storage(err) => Some(err),
            AppError::Invalid(err) => Some(err),
            AppError::Output(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Invalid(_) => StatusCode::BAD_REQUEST,
            AppError::Transport(_)
            | AppError::Credentials(_)
            | AppError::Invoicing(_)
            | AppError::Waybill(_)
            | AppError::Registry(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Storage(_)
            | AppError::Output(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<TransportError> for AppError {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

impl From<WsaaError> for AppError {
    fn from(value: WsaaError) -> Self {
        Self::Credentials(value)
    }
}

impl From<FeError> for AppError {
    fn from(value: FeError) -> Self {
        Self::Invoicing(value)
    }
}

impl From<CpeError> for AppError {
    fn from(value: CpeError) -> Self {
        Self::Waybill(value)
    }
}

impl From<PadronError> for AppError {
    fn from(value: PadronError) -> Self {
        Self::Registry(value)
    }
}

impl From<RepositoryError> for AppError {
    fn from(value: RepositoryError) -> Self {
        Self::Storage(value)
    }
}

impl From<CpeServiceError> for AppError {
    fn from(value: CpeServiceError) -> Self {
        match value {
            CpeServiceError::Afip(err) => Self::Waybill(err),
            CpeServiceError::Validation(errors) => Self::Invalid(errors),
            CpeServiceError::NotFound => Self::Storage(RepositoryError::NotFound),
            CpeServiceError::Repository(err) => Self::Storage(err),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Output(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::afip::CpeErrorCode;

    #[test]
    fn afip_failures_are_bad_gateway() {
        let err = AppError::from(CpeError::new(CpeErrorCode::InvalidCtg, "CTG inexistente"));
        assert_eq!(err.to_string(), "WSCPE error [INVALID_CTG]: CTG inexistente");
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);

        let err = AppError::from(std::io::Error::other("disk"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
