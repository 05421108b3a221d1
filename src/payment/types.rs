use std::time::Duration;

use reqwest::{Method, header::HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelayError, protocol_violation};

pub const DEFAULT_NETWORK: &str = "base";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Relay,
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentProfile {
    pub mode: PaymentMode,
    pub network: String,
    pub relay_url: String,
    pub max_amount_per_request: u128,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub json: Option<Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            json: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            json: Some(body),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Result<Value, RelayError> {
        serde_json::from_slice(&self.body)
            .map_err(|err| protocol_violation(format!("response body is not valid json: {}", err)))
    }
}
