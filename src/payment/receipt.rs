use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde_json::{Value, json};

pub const CLIENT_PAYMENT_HEADER: &str = "x-client-payment";

// Checked in order; the first present, non-empty value wins.
pub const PAYMENT_RESPONSE_HEADERS: [&str; 2] = ["payment-response", "x-payment-response"];

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("decoded bytes are not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("decoded text is not json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentReceipt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_payment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_response: Option<Value>,
}

impl PaymentReceipt {
    pub fn is_empty(&self) -> bool {
        self.client_payment.is_none() && self.payment_response.is_none()
    }

    pub fn settlement_transaction(&self) -> Option<&str> {
        self.payment_response
            .as_ref()
            .and_then(|value| value.get("transaction"))
            .and_then(Value::as_str)
            .filter(|tx| !tx.is_empty())
    }
}

pub fn decode_base64_json(value: &str) -> Result<Value, DecodeError> {
    let bytes = STANDARD.decode(value.trim())?;
    let text = String::from_utf8(bytes)?;
    Ok(serde_json::from_str(&text)?)
}

pub fn decode_payment_response(value: &str) -> Value {
    match decode_base64_json(value) {
        Ok(decoded) => decoded,
        Err(err) => {
            tracing::warn!(
                target: "payment",
                error = %err,
                "payment_response_decode_failed"
            );
            json!({ "raw": value })
        }
    }
}

pub fn extract_payment_info(headers: &HeaderMap) -> PaymentReceipt {
    let client_payment = headers
        .get(CLIENT_PAYMENT_HEADER)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());
    if let Some(client_payment) = &client_payment {
        tracing::info!(target: "payment", client_tx = %client_payment, "client_payment_observed");
    }

    let payment_response = PAYMENT_RESPONSE_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .find(|value| !value.is_empty())
        .map(|value| decode_payment_response(&value));
    if let Some(decoded) = &payment_response {
        tracing::info!(target: "payment", response = %decoded, "payment_response_observed");
    }

    PaymentReceipt {
        client_payment,
        payment_response,
    }
}
