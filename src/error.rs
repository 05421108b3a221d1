use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayErrorKind {
    Configuration,
    Transport,
    HttpStatus,
    PaymentRequired,
    Signing,
    ProtocolViolation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayError {
    pub kind: RelayErrorKind,
    pub message: String,
    pub url: Option<String>,
    pub http_status: Option<u16>,
}

impl RelayError {
    pub fn new(kind: RelayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            url: None,
            http_status: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.url, self.http_status) {
            (Some(url), Some(status)) => {
                write!(f, "{} (status={}, url={})", self.message, status, url)
            }
            (Some(url), None) => write!(f, "{} (url={})", self.message, url),
            (None, Some(status)) => write!(f, "{} (status={})", self.message, status),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RelayError {}

pub fn configuration_error(message: impl Into<String>) -> RelayError {
    RelayError::new(RelayErrorKind::Configuration, message)
}

pub fn protocol_violation(message: impl Into<String>) -> RelayError {
    RelayError::new(RelayErrorKind::ProtocolViolation, message)
}

pub fn payment_required(message: impl Into<String>) -> RelayError {
    RelayError::new(RelayErrorKind::PaymentRequired, message)
}

pub fn signing_error(message: impl Into<String>) -> RelayError {
    RelayError::new(RelayErrorKind::Signing, message)
}

pub fn map_http_status(status: u16, url: &str, body: &[u8]) -> RelayError {
    let excerpt = String::from_utf8_lossy(body)
        .chars()
        .take(240)
        .collect::<String>();

    let mut message = match status {
        402 => "payment was not accepted".to_string(),
        _ => format!("endpoint returned status {}", status),
    };
    if !excerpt.trim().is_empty() {
        message = format!("{}: {}", message, excerpt.trim());
    }

    RelayError::new(RelayErrorKind::HttpStatus, message)
        .with_url(url.to_string())
        .with_http_status(status)
}
