use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value, json};

use crate::{
    error::{RelayError, RelayErrorKind},
    payment::{
        evm::EvmSigner,
        types::{ApiRequest, ApiResponse, PaymentMode, PaymentProfile},
        x402::{PaymentChallenge, sign_payment},
    },
};

const PAYMENT_REQUIRED_STATUS: u16 = 402;

#[async_trait]
pub trait PaymentTransport: Send + Sync {
    async fn send(
        &self,
        profile: &PaymentProfile,
        request: ApiRequest,
    ) -> Result<ApiResponse, RelayError>;
}

pub fn relay_envelope(relay_url: &str, request: &ApiRequest) -> ApiRequest {
    let headers = request
        .headers
        .iter()
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect::<Map<String, Value>>();

    let mut body = json!({
        "api_url": request.url,
        "method": request.method.as_str(),
        "headers": headers,
    });
    if let Some(payload) = &request.json {
        body["payload"] = payload.clone();
    }

    ApiRequest::post_json(relay_url, body)
}

pub struct HttpPayerTransport {
    client: Client,
    signer: Arc<EvmSigner>,
}

impl HttpPayerTransport {
    pub fn new(signer: Arc<EvmSigner>) -> Result<Self, RelayError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| {
                RelayError::new(
                    RelayErrorKind::Configuration,
                    format!("failed to build http client: {}", err),
                )
            })?;
        Ok(Self { client, signer })
    }

    pub fn with_client(client: Client, signer: Arc<EvmSigner>) -> Self {
        Self { client, signer }
    }

    async fn dispatch(
        &self,
        profile: &PaymentProfile,
        request: &ApiRequest,
        payment: Option<(&str, &str)>,
    ) -> Result<ApiResponse, RelayError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);

        if let Some(timeout) = profile.timeout {
            builder = builder.timeout(timeout);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.json {
            builder = builder.json(body);
        }
        if let Some((name, value)) = payment {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(|err| {
            RelayError::new(
                RelayErrorKind::Transport,
                format!("request failed: {}", err),
            )
            .with_url(request.url.clone())
        })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|err| {
                RelayError::new(
                    RelayErrorKind::Transport,
                    format!("failed to read response body: {}", err),
                )
                .with_url(request.url.clone())
                .with_http_status(status)
            })?
            .to_vec();

        tracing::debug!(
            target: "payment",
            url = %request.url,
            status = status,
            body_bytes = body.len(),
            paid = payment.is_some(),
            "http_exchange_completed"
        );

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl PaymentTransport for HttpPayerTransport {
    async fn send(
        &self,
        profile: &PaymentProfile,
        request: ApiRequest,
    ) -> Result<ApiResponse, RelayError> {
        let outbound = match profile.mode {
            PaymentMode::Relay => relay_envelope(&profile.relay_url, &request),
            PaymentMode::Direct => request,
        };
        tracing::debug!(
            target: "payment",
            mode = ?profile.mode,
            url = %outbound.url,
            "payment_request_started"
        );

        let first = self.dispatch(profile, &outbound, None).await?;
        if first.status != PAYMENT_REQUIRED_STATUS {
            return Ok(first);
        }

        let challenge = PaymentChallenge::from_response(&first)
            .map_err(|err| err.with_url(outbound.url.clone()))?;
        let (raw_requirement, requirement) = challenge
            .select(profile)
            .map_err(|err| err.with_url(outbound.url.clone()).with_http_status(402))?;
        let signed = sign_payment(
            &self.signer,
            &challenge,
            &raw_requirement,
            &requirement,
            unix_now(),
        )?;

        self.dispatch(
            profile,
            &outbound,
            Some((signed.header_name, signed.header_value.as_str())),
        )
        .await
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
